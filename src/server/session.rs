//! Connection handler: one request, one verdict, then close.
//!
//! A session moves through `Accepted -> Reading -> Searching -> Responding
//! -> Closed` and never goes back. Every error raised along the way is
//! typed; [`handle_connection`] is the one place that logs them and turns
//! them into "close without a response".

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, trace, warn};

use crate::corpus::decode_lenient;
use crate::engine::LookupEngine;
use crate::error::{Error, Result};
use crate::metrics::{Metrics, Timer};
use crate::ratelimit::RateLimiter;

pub const EXISTS_RESPONSE: &str = "STRING EXISTS\n";
pub const NOT_FOUND_RESPONSE: &str = "STRING NOT FOUND\n";

/// Session lifecycle. Ordered: a session only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Accepted,
    Reading,
    Searching,
    Responding,
    Closed,
}

/// The answer written to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Exists,
    NotFound,
}

impl Verdict {
    /// The literal response line.
    pub fn as_response(&self) -> &'static str {
        match self {
            Self::Exists => EXISTS_RESPONSE,
            Self::NotFound => NOT_FOUND_RESPONSE,
        }
    }
}

impl From<bool> for Verdict {
    fn from(exists: bool) -> Self {
        if exists {
            Self::Exists
        } else {
            Self::NotFound
        }
    }
}

/// Everything a session needs, shared by all sessions of one listener.
pub struct SessionContext {
    pub engine: Arc<LookupEngine>,
    pub max_payload_size: usize,
    pub timeout: Option<Duration>,
    pub tls: Option<TlsAcceptor>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
    pub metrics: Arc<Metrics>,
}

impl SessionContext {
    /// Plain-TCP context with no timeout and no rate limiting.
    pub fn new(engine: Arc<LookupEngine>, max_payload_size: usize) -> Self {
        let metrics = Arc::clone(engine.metrics());
        Self {
            engine,
            max_payload_size,
            timeout: None,
            tls: None,
            rate_limiter: None,
            metrics,
        }
    }
}

/// Turn a raw payload into a query: lenient UTF-8, trailing NUL padding
/// and surrounding whitespace removed.
pub fn parse_query(payload: &[u8]) -> String {
    decode_lenient(payload)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Run one accepted connection to completion. Never fails: errors are
/// logged here and end only this session.
pub async fn handle_connection(stream: TcpStream, peer: SocketAddr, ctx: Arc<SessionContext>) {
    ctx.metrics.session_started();
    let timer = Timer::start();

    let outcome = match &ctx.tls {
        Some(acceptor) => match within(ctx.timeout, "handshake", acceptor.accept(stream)).await {
            Ok(Ok(tls_stream)) => serve(tls_stream, peer, &ctx).await,
            Ok(Err(e)) => Err(Error::TlsHandshake(e)),
            Err(e) => Err(e),
        },
        None => serve(stream, peer, &ctx).await,
    };

    match outcome {
        Ok(verdict) => debug!(
            "Request from {} handled in {:.3} ms: {}",
            peer,
            timer.elapsed_ms(),
            verdict.as_response().trim_end()
        ),
        Err(e) => {
            ctx.metrics.inc_failed();
            match e {
                Error::TlsHandshake(_) | Error::RateLimited(_) => warn!("Session {}: {}", peer, e),
                Error::Timeout { .. } => error!("Connection from {} timed out: {}", peer, e),
                Error::Transport(_) => error!("Transport error on {}: {}", peer, e),
                _ if e.is_session_local() => error!("Session {} aborted: {}", peer, e),
                _ => error!("Unexpected error handling {}: {}", peer, e),
            }
        }
    }

    ctx.metrics.session_finished();
    info!("Closed client connection from {}", peer);
}

/// Serve one request on an established stream, then shut it down.
///
/// The stream is shut down and dropped whatever the outcome.
pub async fn serve<S>(mut stream: S, peer: SocketAddr, ctx: &SessionContext) -> Result<Verdict>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(peer);
    let result = session.run(&mut stream, ctx).await;

    session.advance(SessionState::Closed);
    match within(ctx.timeout, "shutdown", stream.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => trace!("Shutdown of {} failed: {}", peer, e),
        Err(e) => trace!("Shutdown of {}: {}", peer, e),
    }

    result
}

struct Session {
    peer: SocketAddr,
    state: SessionState,
}

impl Session {
    fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            state: SessionState::Accepted,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        trace!("Session {}: {:?} -> {:?}", self.peer, self.state, next);
        self.state = next;
    }

    async fn run<S>(&mut self, stream: &mut S, ctx: &SessionContext) -> Result<Verdict>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let Some(limiter) = &ctx.rate_limiter {
            let client = self.peer.ip().to_string();
            if !limiter.is_allowed(&client).await {
                ctx.metrics.inc_rate_limited();
                return Err(Error::RateLimited(client));
            }
        }

        self.advance(SessionState::Reading);
        let timer = Timer::start();
        let mut buf = vec![0u8; ctx.max_payload_size];
        let n = within(ctx.timeout, "read", stream.read(&mut buf))
            .await?
            .map_err(Error::Transport)?;
        let query = parse_query(&buf[..n]);
        debug!(
            "Received {} bytes from {} in {:.3} ms",
            n,
            self.peer,
            timer.elapsed_ms()
        );

        self.advance(SessionState::Searching);
        let timer = Timer::start();
        let verdict = Verdict::from(ctx.engine.lookup(&query).await?);
        debug!("Search took {:.3} ms", timer.elapsed_ms());

        self.advance(SessionState::Responding);
        let timer = Timer::start();
        let response = verdict.as_response().as_bytes();
        within(ctx.timeout, "write", async {
            stream.write_all(response).await?;
            stream.flush().await
        })
        .await?
        .map_err(Error::Transport)?;
        ctx.metrics.record_verdict(verdict == Verdict::Exists);
        debug!("Response sent in {:.3} ms", timer.elapsed_ms());

        Ok(verdict)
    }
}

/// Run a transport future under the optional per-phase timeout.
async fn within<F, T>(limit: Option<Duration>, phase: &'static str, fut: F) -> Result<std::io::Result<T>>
where
    F: Future<Output = std::io::Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout {
                phase,
                millis: limit.as_millis() as u64,
            }),
        None => Ok(fut.await),
    }
}
