//! Error types for the corpus lookup server.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for corpus lookup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the corpus lookup server.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Corpus Errors =====
    #[error("Corpus I/O error: {path}: {source}")]
    CorpusIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ===== Session Errors =====
    #[error("Transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(#[source] std::io::Error),

    #[error("Timeout: {phase} did not complete within {millis} ms")]
    Timeout { phase: &'static str, millis: u64 },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // ===== Startup Errors =====
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // ===== I/O Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a corpus I/O error for the given path.
    pub fn corpus_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CorpusIo {
            path: path.into(),
            source,
        }
    }

    /// Check if this error ends only the current session and leaves the
    /// listener running.
    pub fn is_session_local(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::TlsHandshake(_)
                | Self::Timeout { .. }
                | Self::RateLimited(_)
                | Self::CorpusIo { .. }
                | Self::Internal(_)
        )
    }

    /// Check if this error must abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Tls(_) | Self::Config(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", err))
    }
}
