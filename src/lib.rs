//! Corpus Lookup Server
//!
//! A concurrent TCP server that answers one question per connection: does
//! the query string match a line of the reference corpus? The reply is
//! `STRING EXISTS\n` or `STRING NOT FOUND\n`.
//!
//! # Architecture
//!
//! 1. **Corpus Layer** (`corpus`) - loads the corpus file into snapshots
//! 2. **Engine Layer** (`engine`) - matchers and the cache/consistency policy
//! 3. **Server Layer** (`server`) - listener, optional TLS, per-connection sessions
//! 4. **Admission** (`ratelimit`) - per-client sliding window with backoff
//! 5. **Operations** (`http`, `metrics`, `watcher`) - admin endpoints and rebuilds
//!
//! # Matching semantics
//!
//! Every strategy declares whether it matches whole lines or substrings:
//!
//! - `linear`, `kmp`, `boyer-moore`: substring of some line
//! - `hash-set`, `trie`: exact line
//!
//! The same corpus and query can therefore yield different verdicts under
//! different strategies; see [`engine::Semantics`].

pub mod client;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod http;
pub mod metrics;
pub mod ratelimit;
pub mod server;
pub mod watcher;

pub use error::{Error, Result};

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
