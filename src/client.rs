//! Query client: connect, send one query, read the verdict line.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::{Error, Result};
use crate::server::session::{EXISTS_RESPONSE, NOT_FOUND_RESPONSE};
use crate::server::Verdict;

/// Responses are one short line; anything longer is not ours.
const MAX_RESPONSE_SIZE: usize = 1024;

/// TLS settings for the client side.
#[derive(Clone)]
pub struct ClientTls {
    pub connector: TlsConnector,
    pub server_name: ServerName<'static>,
}

impl ClientTls {
    pub fn new(connector: TlsConnector, server_name: &str) -> Result<Self> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| Error::Tls(format!("invalid server name {:?}: {}", server_name, e)))?;
        Ok(Self {
            connector,
            server_name,
        })
    }
}

/// Connection options for [`query`].
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub tls: Option<ClientTls>,
    pub timeout: Option<Duration>,
}

/// Send `query` to the server at `addr` and return the raw response.
pub async fn query(addr: &str, query: &str, options: &ClientOptions) -> Result<String> {
    let exchange = async {
        let stream = TcpStream::connect(addr).await.map_err(Error::Transport)?;
        debug!("Connected to {}", addr);

        match &options.tls {
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), stream)
                    .await
                    .map_err(Error::TlsHandshake)?;
                send_and_receive(stream, query).await
            }
            None => send_and_receive(stream, query).await,
        }
    };

    match options.timeout {
        Some(limit) => tokio::time::timeout(limit, exchange)
            .await
            .map_err(|_| Error::Timeout {
                phase: "query",
                millis: limit.as_millis() as u64,
            })?,
        None => exchange.await,
    }
}

/// Send `query` and interpret the response as a verdict.
pub async fn query_verdict(addr: &str, query_text: &str, options: &ClientOptions) -> Result<Verdict> {
    let response = query(addr, query_text, options).await?;
    parse_response(&response)
}

/// Map a response line onto a verdict.
pub fn parse_response(response: &str) -> Result<Verdict> {
    match response {
        EXISTS_RESPONSE => Ok(Verdict::Exists),
        NOT_FOUND_RESPONSE => Ok(Verdict::NotFound),
        "" => Err(Error::Transport(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "server closed the connection without a response",
        ))),
        other => Err(Error::Internal(format!("unexpected response {:?}", other))),
    }
}

async fn send_and_receive<S>(mut stream: S, query: &str) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(query.as_bytes())
        .await
        .map_err(Error::Transport)?;
    stream.flush().await.map_err(Error::Transport)?;

    let mut response = Vec::new();
    let mut limited = (&mut stream).take(MAX_RESPONSE_SIZE as u64);
    limited
        .read_to_end(&mut response)
        .await
        .map_err(Error::Transport)?;

    let response = String::from_utf8_lossy(&response).into_owned();
    debug!("Received from server: {:?}", response);
    Ok(response)
}
