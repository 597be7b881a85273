//! Corpus Lookup Server
//!
//! Answers whether a query string matches a line of the corpus file, one
//! query per TCP (optionally TLS) connection.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use corpus_lookup::config::{Args, Config, LogFormat};
use corpus_lookup::corpus::CorpusStore;
use corpus_lookup::engine::LookupEngine;
use corpus_lookup::error::Result;
use corpus_lookup::metrics::Metrics;
use corpus_lookup::server::Server;
use corpus_lookup::watcher::{CorpusWatcher, DEFAULT_DEBOUNCE};
use corpus_lookup::VERSION;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the --debug level
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    let config: Config = args.into();

    if let Err(e) = run(config).await {
        if e.is_fatal() {
            error!("Startup failed: {}", e);
        } else {
            error!("Server stopped: {}", e);
        }
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    config.validate()?;

    info!("Corpus Lookup Server v{}", VERSION);
    info!("Corpus: {:?}", config.corpus);

    let matcher = config.strategy.matcher();
    info!(
        "Strategy: {} ({} semantics), consistency: {}",
        matcher.strategy(),
        matcher.semantics(),
        config.consistency.as_str()
    );

    let engine = Arc::new(LookupEngine::with_metrics(
        matcher,
        CorpusStore::new(&config.corpus),
        config.consistency,
        Metrics::new(),
    ));

    // Build the cached index up front so the first client does not pay for it
    match engine.warm().await {
        Ok(Some(status)) => info!(
            "Index ready: generation {}, {} lines",
            status.generation, status.line_count
        ),
        Ok(None) => {}
        Err(e) => warn!("Initial index build failed, retrying on first query: {}", e),
    }

    if let Some(port) = config.admin_port {
        let engine = Arc::clone(&engine);
        let bind_address = config.bind_address.clone();
        tokio::spawn(async move {
            if let Err(e) = corpus_lookup::http::start_server(&bind_address, port, engine).await {
                error!("Admin HTTP server failed: {}", e);
            }
        });
    }

    let mut watcher = None;
    if config.watch_corpus {
        if engine.uses_cache() {
            let mut corpus_watcher = CorpusWatcher::new(&config.corpus, DEFAULT_DEBOUNCE);
            corpus_watcher.start(Arc::clone(&engine))?;
            watcher = Some(corpus_watcher);
        } else {
            info!("Corpus is reread on every query; watcher not started");
        }
    }

    let server = Server::bind(&config, engine).await?;
    let result = server.run().await;

    if let Some(mut watcher) = watcher {
        watcher.stop();
    }
    result
}
