//! Configuration management for the corpus lookup server.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::corpus::Consistency;
use crate::engine::Strategy;
use crate::error::{Error, Result};

/// Command-line arguments for the corpus lookup server.
#[derive(Parser, Debug, Clone)]
#[command(name = "corpus-lookup")]
#[command(author = "Corpus Lookup Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "TCP server answering whether a string matches a line of a corpus file")]
pub struct Args {
    /// Path to the corpus file, one record per line
    #[arg(short, long, env = "CORPUS_LOOKUP_CORPUS")]
    pub corpus: PathBuf,

    /// Address to bind the listener to
    #[arg(short, long, default_value = "0.0.0.0", env = "CORPUS_LOOKUP_BIND_ADDRESS")]
    pub bind_address: String,

    /// Port to listen on
    #[arg(short, long, default_value = "9999", env = "CORPUS_LOOKUP_PORT")]
    pub port: u16,

    /// Pending-connection backlog passed to listen(2)
    #[arg(long, default_value = "5", env = "CORPUS_LOOKUP_BACKLOG")]
    pub backlog: u32,

    /// Maximum request payload in bytes
    #[arg(long, default_value = "1024", env = "CORPUS_LOOKUP_MAX_PAYLOAD_SIZE")]
    pub max_payload_size: usize,

    /// Re-read the corpus on every query (false = build once and cache)
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "CORPUS_LOOKUP_REREAD_ON_QUERY"
    )]
    pub reread_on_query: bool,

    /// Matching strategy
    #[arg(short, long, default_value = "linear", env = "CORPUS_LOOKUP_STRATEGY")]
    pub strategy: Strategy,

    /// Per-phase transport timeout in milliseconds (unset = no timeout)
    #[arg(long, env = "CORPUS_LOOKUP_SESSION_TIMEOUT_MS")]
    pub session_timeout_ms: Option<u64>,

    /// Enable TLS on accepted connections
    #[arg(long, env = "CORPUS_LOOKUP_TLS")]
    pub tls: bool,

    /// PEM certificate chain
    #[arg(long, env = "CORPUS_LOOKUP_CERTFILE")]
    pub certfile: Option<PathBuf>,

    /// PEM private key (PKCS#8, PKCS#1 or SEC1; may be encrypted PKCS#8)
    #[arg(long, env = "CORPUS_LOOKUP_KEYFILE")]
    pub keyfile: Option<PathBuf>,

    /// Passphrase for an encrypted private key
    #[arg(long, env = "CORPUS_LOOKUP_KEY_PASSWORD", hide_env_values = true)]
    pub key_password: Option<String>,

    /// Enable per-client rate limiting
    #[arg(long, env = "CORPUS_LOOKUP_RATE_LIMIT")]
    pub rate_limit: bool,

    /// Maximum requests per client within the window
    #[arg(long, default_value = "5", env = "CORPUS_LOOKUP_MAX_REQUESTS")]
    pub max_requests: usize,

    /// Rate limiting window in seconds
    #[arg(long, default_value = "10", env = "CORPUS_LOOKUP_WINDOW_SECS")]
    pub window_secs: u64,

    /// Base backoff in seconds, doubled per consecutive rejection
    #[arg(long, default_value = "1", env = "CORPUS_LOOKUP_BASE_BACKOFF_SECS")]
    pub base_backoff_secs: u64,

    /// Port for the admin HTTP server (health, metrics, rebuild)
    #[arg(long, env = "CORPUS_LOOKUP_ADMIN_PORT")]
    pub admin_port: Option<u16>,

    /// Rebuild the cached index when the corpus file changes
    #[arg(long, env = "CORPUS_LOOKUP_WATCH_CORPUS")]
    pub watch_corpus: bool,

    /// Enable debug logging
    #[arg(short, long, env = "CORPUS_LOOKUP_DEBUG")]
    pub debug: bool,

    /// Log output format
    #[arg(long, default_value = "text", env = "CORPUS_LOOKUP_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// TLS enabled
    pub enabled: bool,
    /// Certificate chain path
    pub certfile: Option<PathBuf>,
    /// Private key path
    pub keyfile: Option<PathBuf>,
    /// Private key passphrase
    #[serde(default, skip_serializing)]
    pub key_password: Option<String>,
}

/// Rate limiter thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Rate limiting enabled
    pub enabled: bool,
    /// Maximum requests within the window
    pub max_requests: usize,
    /// Window length in seconds
    pub window_secs: u64,
    /// Base backoff in seconds
    pub base_backoff_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests: 5,
            window_secs: 10,
            base_backoff_secs: 1,
        }
    }
}

impl RateLimitConfig {
    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Base backoff as a duration.
    pub fn base_backoff(&self) -> Duration {
        Duration::from_secs(self.base_backoff_secs)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Corpus file
    pub corpus: PathBuf,
    /// Bind address
    pub bind_address: String,
    /// Listen port
    pub port: u16,
    /// Listen backlog
    pub backlog: u32,
    /// Maximum request payload
    pub max_payload_size: usize,
    /// Corpus consistency policy
    pub consistency: Consistency,
    /// Matching strategy
    pub strategy: Strategy,
    /// Per-phase transport timeout
    pub session_timeout_ms: Option<u64>,
    /// TLS settings
    pub tls: TlsConfig,
    /// Rate limiter settings
    pub rate_limit: RateLimitConfig,
    /// Admin HTTP port
    pub admin_port: Option<u16>,
    /// Corpus watcher enabled
    pub watch_corpus: bool,
    /// Debug mode
    pub debug: bool,
    /// Log format
    pub log_format: LogFormat,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            corpus: args.corpus,
            bind_address: args.bind_address,
            port: args.port,
            backlog: args.backlog,
            max_payload_size: args.max_payload_size,
            consistency: Consistency::from_reread_flag(args.reread_on_query),
            strategy: args.strategy,
            session_timeout_ms: args.session_timeout_ms,
            tls: TlsConfig {
                enabled: args.tls,
                certfile: args.certfile,
                keyfile: args.keyfile,
                key_password: args.key_password,
            },
            rate_limit: RateLimitConfig {
                enabled: args.rate_limit,
                max_requests: args.max_requests,
                window_secs: args.window_secs,
                base_backoff_secs: args.base_backoff_secs,
            },
            admin_port: args.admin_port,
            watch_corpus: args.watch_corpus,
            debug: args.debug,
            log_format: args.log_format,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            corpus: PathBuf::from("data/200k.txt"),
            bind_address: "0.0.0.0".to_string(),
            port: 9999,
            backlog: 5,
            max_payload_size: 1024,
            consistency: Consistency::Reread,
            strategy: Strategy::Linear,
            session_timeout_ms: None,
            tls: TlsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            admin_port: None,
            watch_corpus: false,
            debug: false,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// The `address:port` pair the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Per-phase transport timeout, if configured.
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_ms.map(Duration::from_millis)
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size == 0 {
            return Err(Error::Config("max_payload_size must be > 0".to_string()));
        }
        if self.backlog == 0 {
            return Err(Error::Config("backlog must be > 0".to_string()));
        }
        if self.tls.enabled && (self.tls.certfile.is_none() || self.tls.keyfile.is_none()) {
            return Err(Error::Config(
                "TLS enabled but certfile or keyfile is missing".to_string(),
            ));
        }
        if self.rate_limit.enabled && self.rate_limit.max_requests == 0 {
            return Err(Error::Config(
                "rate limiting enabled with max_requests = 0".to_string(),
            ));
        }
        Ok(())
    }
}
