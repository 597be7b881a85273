//! Corpus store: point-in-time views of the reference file.
//!
//! A [`CorpusSnapshot`] holds the trimmed lines of the corpus as they were
//! at load time. Whether a snapshot is taken per query or once per process
//! is decided by [`Consistency`]; the engine owns that choice.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::metrics::Timer;

/// Corpus consistency policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Re-read the corpus for every query.
    #[default]
    Reread,
    /// Read the corpus once and reuse it until an explicit rebuild.
    Cached,
}

impl Consistency {
    /// Map the `reread_on_query` switch onto a policy.
    pub fn from_reread_flag(reread_on_query: bool) -> Self {
        if reread_on_query {
            Self::Reread
        } else {
            Self::Cached
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reread => "reread",
            Self::Cached => "cached",
        }
    }
}

/// The corpus lines as read at one instant.
#[derive(Debug, Clone)]
pub struct CorpusSnapshot {
    source: Option<PathBuf>,
    lines: Vec<String>,
}

impl CorpusSnapshot {
    /// Build a snapshot from in-memory lines. Each line is trimmed.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            source: None,
            lines: lines
                .into_iter()
                .map(|line| line.as_ref().trim().to_string())
                .collect(),
        }
    }

    /// An empty corpus. Every lookup against it is a miss.
    pub fn empty() -> Self {
        Self::from_lines(std::iter::empty::<&str>())
    }

    /// Parse raw corpus bytes. Undecodable bytes are dropped.
    pub fn parse(bytes: &[u8]) -> Self {
        let text = decode_lenient(bytes);
        Self::from_lines(text.lines())
    }

    /// Lines in file order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// File the snapshot was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

/// Reads snapshots of one corpus file.
#[derive(Debug, Clone)]
pub struct CorpusStore {
    path: PathBuf,
}

impl CorpusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file into a fresh snapshot.
    ///
    /// Blocking: call from a blocking context.
    pub fn load(&self) -> Result<Arc<CorpusSnapshot>> {
        let timer = Timer::start();
        let bytes = std::fs::read(&self.path).map_err(|e| Error::corpus_io(&self.path, e))?;

        let mut snapshot = CorpusSnapshot::parse(&bytes);
        snapshot.source = Some(self.path.clone());

        debug!(
            "Loaded {} lines from {:?} in {:.3} ms",
            snapshot.len(),
            self.path,
            timer.elapsed_ms()
        );
        Ok(Arc::new(snapshot))
    }
}

/// Decode bytes as UTF-8, skipping any byte sequence that is not valid.
pub fn decode_lenient(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // `valid_up_to` always lands on a char boundary.
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(len) => rest = &after[len..],
                    // Truncated sequence at the end of input.
                    None => return out,
                }
            }
        }
    }
}
