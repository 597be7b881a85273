//! corpus-query binary: send one query to a corpus lookup server

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use corpus_lookup::client::{query, ClientOptions, ClientTls};
use corpus_lookup::server::tls::build_connector;

#[derive(Parser, Debug)]
#[command(name = "corpus-query")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ask a corpus lookup server whether a string is in its corpus")]
struct Args {
    /// The string to look up
    query: String,

    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "9999")]
    port: u16,

    /// Connect over TLS
    #[arg(long)]
    tls: bool,

    /// PEM file with the CA certificate(s) to trust
    #[arg(long, requires = "tls")]
    ca_file: Option<PathBuf>,

    /// Name to verify the server certificate against (defaults to host)
    #[arg(long, requires = "tls")]
    server_name: Option<String>,

    /// Give up after this many milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let tls = if args.tls {
        let ca_file = args
            .ca_file
            .as_deref()
            .context("--tls requires --ca-file")?;
        let connector = build_connector(ca_file)?;
        let server_name = args.server_name.as_deref().unwrap_or(&args.host);
        Some(ClientTls::new(connector, server_name)?)
    } else {
        None
    };

    let options = ClientOptions {
        tls,
        timeout: Some(Duration::from_millis(args.timeout_ms)),
    };

    let addr = format!("{}:{}", args.host, args.port);
    let response = query(&addr, &args.query, &options)
        .await
        .with_context(|| format!("query to {} failed", addr))?;

    if response.is_empty() {
        anyhow::bail!("server at {} closed the connection without a response", addr);
    }
    print!("{}", response);
    Ok(())
}
