//! Server Integration Tests
//!
//! These tests bind a real listener on an ephemeral port and talk to it
//! through the query client, over plain TCP and over TLS.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use corpus_lookup::client::{query, query_verdict, ClientOptions, ClientTls};
use corpus_lookup::config::{Config, TlsConfig};
use corpus_lookup::corpus::{Consistency, CorpusStore};
use corpus_lookup::engine::{LookupEngine, Strategy};
use corpus_lookup::server::tls::build_connector;
use corpus_lookup::server::{Server, Verdict};
use corpus_lookup::Error;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn corpus(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn local_config(file: &NamedTempFile, strategy: Strategy, consistency: Consistency) -> Config {
    Config {
        corpus: file.path().to_path_buf(),
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        // Room for every client of the concurrency tests at once.
        backlog: 128,
        strategy,
        consistency,
        session_timeout_ms: Some(5_000),
        ..Config::default()
    }
}

/// Bind and run a server in the background; returns its address.
async fn spawn_server(config: &Config) -> (String, Arc<LookupEngine>) {
    let engine = Arc::new(LookupEngine::new(
        config.strategy.matcher(),
        CorpusStore::new(&config.corpus),
        config.consistency,
    ));
    let server = Server::bind(config, Arc::clone(&engine)).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());
    (addr, engine)
}

fn plain() -> ClientOptions {
    ClientOptions {
        tls: None,
        timeout: Some(Duration::from_secs(5)),
    }
}

#[tokio::test]
async fn test_exact_line_over_tcp() {
    let file = corpus("13;0;23;11;0;16;5;0;\nfoo\n");
    let config = local_config(&file, Strategy::HashSet, Consistency::Reread);
    let (addr, _) = spawn_server(&config).await;

    assert_eq!(
        query(&addr, "13;0;23;11;0;16;5;0;", &plain()).await.unwrap(),
        "STRING EXISTS\n"
    );
    assert_eq!(
        query(&addr, "13;0", &plain()).await.unwrap(),
        "STRING NOT FOUND\n"
    );
}

#[tokio::test]
async fn test_substring_over_tcp() {
    let file = corpus("13;0;23;11;0;16;5;0;\n");
    let config = local_config(&file, Strategy::BoyerMoore, Consistency::Reread);
    let (addr, _) = spawn_server(&config).await;

    assert_eq!(
        query_verdict(&addr, "13;0", &plain()).await.unwrap(),
        Verdict::Exists
    );
    assert_eq!(
        query_verdict(&addr, "99;", &plain()).await.unwrap(),
        Verdict::NotFound
    );
}

#[tokio::test]
async fn test_padded_payload() {
    let file = corpus("foo\n");
    let config = local_config(&file, Strategy::Linear, Consistency::Reread);
    let (addr, _) = spawn_server(&config).await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream.write_all(b"foo\n\0\0\0\0").await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert_eq!(response, "STRING EXISTS\n");
}

#[tokio::test]
async fn test_reread_sees_appended_line() {
    let mut file = corpus("foo\n");
    let config = local_config(&file, Strategy::Kmp, Consistency::Reread);
    let (addr, _) = spawn_server(&config).await;

    assert_eq!(
        query_verdict(&addr, "bar", &plain()).await.unwrap(),
        Verdict::NotFound
    );

    writeln!(file, "bar").unwrap();
    file.flush().unwrap();

    assert_eq!(
        query_verdict(&addr, "bar", &plain()).await.unwrap(),
        Verdict::Exists
    );
}

#[tokio::test]
async fn test_cached_is_stale_until_rebuild() {
    let mut file = corpus("foo\n");
    let config = local_config(&file, Strategy::HashSet, Consistency::Cached);
    let (addr, engine) = spawn_server(&config).await;

    assert_eq!(
        query_verdict(&addr, "foo", &plain()).await.unwrap(),
        Verdict::Exists
    );

    writeln!(file, "bar").unwrap();
    file.flush().unwrap();
    assert_eq!(
        query_verdict(&addr, "bar", &plain()).await.unwrap(),
        Verdict::NotFound
    );

    let status = engine.rebuild().await.unwrap();
    assert_eq!(status.generation, 2);
    assert_eq!(
        query_verdict(&addr, "bar", &plain()).await.unwrap(),
        Verdict::Exists
    );
}

#[tokio::test]
async fn test_concurrent_sessions() {
    let lines: Vec<String> = (0..200).map(|i| format!("{};0;{};", i, i * 7)).collect();
    let file = corpus(&lines.join("\n"));
    let config = local_config(&file, Strategy::Trie, Consistency::Cached);
    let (addr, engine) = spawn_server(&config).await;

    let queries = (0..50).map(|i| {
        let addr = addr.clone();
        async move {
            let text = if i % 2 == 0 {
                format!("{};0;{};", i, i * 7)
            } else {
                format!("missing-{}", i)
            };
            (i, query_verdict(&addr, &text, &plain()).await.unwrap())
        }
    });

    for (i, verdict) in futures::future::join_all(queries).await {
        let expected = if i % 2 == 0 {
            Verdict::Exists
        } else {
            Verdict::NotFound
        };
        assert_eq!(verdict, expected, "query {}", i);
    }

    let snapshot = engine.metrics().snapshot();
    assert_eq!(snapshot.index_builds, 1);
    assert_eq!(snapshot.verdicts_exists + snapshot.verdicts_not_found, 50);
}

#[tokio::test]
async fn test_missing_corpus_answers_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        corpus: dir.path().join("missing.txt"),
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    };
    let (addr, engine) = spawn_server(&config).await;

    assert_eq!(
        query_verdict(&addr, "anything", &plain()).await.unwrap(),
        Verdict::NotFound
    );
    assert_eq!(engine.metrics().snapshot().corpus_load_failures, 1);
}

#[tokio::test]
async fn test_silent_client_does_not_block_others() {
    let file = corpus("foo\n");
    let mut config = local_config(&file, Strategy::Linear, Consistency::Reread);
    config.session_timeout_ms = Some(200);
    let (addr, _) = spawn_server(&config).await;

    // Connects and never sends anything.
    let mut idle = TcpStream::connect(&addr).await.unwrap();

    assert_eq!(
        query_verdict(&addr, "foo", &plain()).await.unwrap(),
        Verdict::Exists
    );

    // The idle session times out and is closed without a response.
    let mut response = Vec::new();
    idle.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_rate_limited_client_is_closed_without_response() {
    let file = corpus("foo\n");
    let mut config = local_config(&file, Strategy::Linear, Consistency::Reread);
    config.rate_limit.enabled = true;
    config.rate_limit.max_requests = 2;
    config.rate_limit.window_secs = 60;
    config.rate_limit.base_backoff_secs = 0;
    let (addr, engine) = spawn_server(&config).await;

    for _ in 0..2 {
        assert_eq!(
            query_verdict(&addr, "foo", &plain()).await.unwrap(),
            Verdict::Exists
        );
    }

    let err = query_verdict(&addr, "foo", &plain()).await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "{:?}", err);
    assert_eq!(engine.metrics().snapshot().rate_limited, 1);
}

fn tls_config(file: &NamedTempFile) -> Config {
    let mut config = local_config(file, Strategy::HashSet, Consistency::Cached);
    config.tls = TlsConfig {
        enabled: true,
        certfile: Some(fixture("server.crt")),
        keyfile: Some(fixture("private.key")),
        key_password: Some("pass".to_string()),
    };
    config
}

fn tls_client() -> ClientOptions {
    let connector = build_connector(&fixture("ca.crt")).unwrap();
    ClientOptions {
        tls: Some(ClientTls::new(connector, "localhost").unwrap()),
        timeout: Some(Duration::from_secs(5)),
    }
}

#[tokio::test]
async fn test_tls_round_trip() {
    let file = corpus("13;0;23;11;0;16;5;0;\n");
    let (addr, _) = spawn_server(&tls_config(&file)).await;

    assert_eq!(
        query(&addr, "13;0;23;11;0;16;5;0;", &tls_client())
            .await
            .unwrap(),
        "STRING EXISTS\n"
    );
    assert_eq!(
        query(&addr, "13;0", &tls_client()).await.unwrap(),
        "STRING NOT FOUND\n"
    );
}

#[tokio::test]
async fn test_plaintext_client_on_tls_listener_fails_alone() {
    let file = corpus("foo\n");
    let (addr, engine) = spawn_server(&tls_config(&file)).await;

    // A plaintext query is not a TLS ClientHello; the handshake fails and
    // the session is closed without a verdict.
    let result = query(&addr, "foo", &plain()).await;
    assert!(!matches!(result.as_deref(), Ok("STRING EXISTS\n")));

    // The listener keeps serving TLS clients.
    assert_eq!(
        query_verdict(&addr, "foo", &tls_client()).await.unwrap(),
        Verdict::Exists
    );
    assert!(engine.metrics().snapshot().sessions_failed >= 1);
}

#[tokio::test]
async fn test_tls_client_rejects_wrong_server_name() {
    let file = corpus("foo\n");
    let (addr, _) = spawn_server(&tls_config(&file)).await;

    let connector = build_connector(&fixture("ca.crt")).unwrap();
    let options = ClientOptions {
        tls: Some(ClientTls::new(connector, "example.com").unwrap()),
        timeout: Some(Duration::from_secs(5)),
    };

    let err = query(&addr, "foo", &options).await.unwrap_err();
    assert!(matches!(err, Error::TlsHandshake(_)), "{:?}", err);
}
