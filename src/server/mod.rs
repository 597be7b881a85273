//! TCP listener: binds, optionally wraps accepted connections in TLS, and
//! hands every connection to its own session task.
//!
//! # Architecture
//!
//! - `session` - per-connection state machine and wire protocol
//! - `tls` - rustls acceptor/connector construction

pub mod session;
pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info};

use crate::config::Config;
use crate::engine::LookupEngine;
use crate::error::{Error, Result};
use crate::ratelimit::RateLimiter;

pub use session::{handle_connection, serve, SessionContext, SessionState, Verdict};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not
/// spin the loop.
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(50);

/// A bound listener ready to serve sessions.
pub struct Server {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
}

impl Server {
    /// Bind the configured address and prepare the session context.
    ///
    /// TLS setup and bind/listen failures are returned as fatal errors.
    pub async fn bind(config: &Config, engine: Arc<LookupEngine>) -> Result<Self> {
        let tls = if config.tls.enabled {
            Some(tls::build_acceptor(&config.tls)?)
        } else {
            None
        };

        let rate_limiter = config.rate_limit.enabled.then(|| {
            info!(
                "Rate limiting: {} requests per {:?}, base backoff {:?}",
                config.rate_limit.max_requests,
                config.rate_limit.window(),
                config.rate_limit.base_backoff()
            );
            Arc::new(RateLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window(),
                config.rate_limit.base_backoff(),
            ))
        });

        let listener = listen(&config.listen_addr(), config.backlog).await?;
        info!(
            "Server listening on {} with backlog {} and corpus {:?}",
            listener.local_addr()?,
            config.backlog,
            engine.corpus_path()
        );

        let metrics = Arc::clone(engine.metrics());
        Ok(Self {
            listener,
            ctx: Arc::new(SessionContext {
                engine,
                max_payload_size: config.max_payload_size,
                timeout: config.session_timeout(),
                tls,
                rate_limiter,
                metrics,
            }),
        })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    /// Accept connections until the process terminates. Each connection
    /// runs in its own task; in-flight sessions are not drained.
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!("Accepted connection from {}", peer);
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(handle_connection(stream, peer, ctx));
                }
                Err(e) => {
                    error!("Error accepting client connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                }
            }
        }
    }
}

async fn listen(addr: &str, backlog: u32) -> Result<TcpListener> {
    let bind_error = |source: std::io::Error| Error::Bind {
        addr: addr.to_string(),
        source,
    };

    let resolved = tokio::net::lookup_host(addr)
        .await
        .map_err(bind_error)?
        .next()
        .ok_or_else(|| {
            bind_error(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "address resolved to nothing",
            ))
        })?;

    let socket = if resolved.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_error)?;

    socket.set_reuseaddr(true).map_err(bind_error)?;
    socket.bind(resolved).map_err(bind_error)?;
    socket.listen(backlog).map_err(bind_error)
}
