//! Lookup engine: matching strategies over a corpus snapshot.
//!
//! Every strategy implements [`Matcher`] and declares the [`Semantics`] it
//! answers with. The strategies do not agree on what "matches" means:
//!
//! | Strategy      | Semantics  |
//! |---------------|------------|
//! | `linear`      | substring  |
//! | `hash-set`    | exact-line |
//! | `trie`        | exact-line |
//! | `kmp`         | substring  |
//! | `boyer-moore` | substring  |
//!
//! A deployment picks a strategy for the semantics it needs, not only for
//! its cost profile. The server logs the declared semantics at startup.
//!
//! [`LookupEngine`] combines one matcher with a corpus file and a
//! consistency policy.

pub mod boyer_moore;
pub mod hash_set;
pub mod kmp;
pub mod linear;
pub mod lookup;
pub mod trie;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::corpus::CorpusSnapshot;

pub use boyer_moore::BoyerMooreMatcher;
pub use hash_set::HashSetMatcher;
pub use kmp::KmpMatcher;
pub use linear::LinearMatcher;
pub use lookup::{CacheStatus, LookupEngine};
pub use trie::TrieMatcher;

/// What a positive match means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Semantics {
    /// The query equals a whole trimmed line.
    ExactLine,
    /// The query occurs anywhere inside a trimmed line.
    Substring,
}

impl Semantics {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactLine => "exact-line",
            Self::Substring => "substring",
        }
    }
}

impl fmt::Display for Semantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selectable matching strategy.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    Linear,
    HashSet,
    Trie,
    Kmp,
    BoyerMoore,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Linear,
        Strategy::HashSet,
        Strategy::Trie,
        Strategy::Kmp,
        Strategy::BoyerMoore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::HashSet => "hash-set",
            Self::Trie => "trie",
            Self::Kmp => "kmp",
            Self::BoyerMoore => "boyer-moore",
        }
    }

    /// Construct the matcher implementing this strategy.
    pub fn matcher(&self) -> Arc<dyn Matcher> {
        match self {
            Self::Linear => Arc::new(LinearMatcher),
            Self::HashSet => Arc::new(HashSetMatcher),
            Self::Trie => Arc::new(TrieMatcher),
            Self::Kmp => Arc::new(KmpMatcher::new()),
            Self::BoyerMoore => Arc::new(BoyerMooreMatcher),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structure derived from one snapshot that answers membership queries.
///
/// Read-only after construction, so one index can be shared by any number
/// of concurrent sessions.
pub trait CorpusIndex: Send + Sync {
    /// Whether `query` matches, under the owning matcher's semantics.
    fn contains(&self, query: &str) -> bool;
}

/// A matching strategy.
pub trait Matcher: Send + Sync {
    /// Which strategy this is.
    fn strategy(&self) -> Strategy;

    /// The matching semantics this strategy answers with.
    fn semantics(&self) -> Semantics;

    /// Build the derived index for a snapshot.
    fn index(&self, snapshot: Arc<CorpusSnapshot>) -> Box<dyn CorpusIndex>;

    /// Whether the index is kept for the whole process even when the
    /// corpus is re-read per query. A pinned index only changes on an
    /// explicit rebuild.
    fn pins_index(&self) -> bool {
        false
    }

    /// One-shot membership test against a snapshot.
    fn exists(&self, snapshot: &Arc<CorpusSnapshot>, query: &str) -> bool {
        self.index(Arc::clone(snapshot)).contains(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_semantics() {
        let expected = [
            (Strategy::Linear, Semantics::Substring),
            (Strategy::HashSet, Semantics::ExactLine),
            (Strategy::Trie, Semantics::ExactLine),
            (Strategy::Kmp, Semantics::Substring),
            (Strategy::BoyerMoore, Semantics::Substring),
        ];

        for (strategy, semantics) in expected {
            let matcher = strategy.matcher();
            assert_eq!(matcher.strategy(), strategy);
            assert_eq!(matcher.semantics(), semantics, "strategy {}", strategy);
        }
    }

    #[test]
    fn test_only_trie_pins_its_index() {
        for strategy in Strategy::ALL {
            assert_eq!(
                strategy.matcher().pins_index(),
                strategy == Strategy::Trie,
                "strategy {}",
                strategy
            );
        }
    }

    #[test]
    fn test_strategy_serialization() {
        let pairs = [
            (Strategy::Linear, "\"linear\""),
            (Strategy::HashSet, "\"hash-set\""),
            (Strategy::Trie, "\"trie\""),
            (Strategy::Kmp, "\"kmp\""),
            (Strategy::BoyerMoore, "\"boyer-moore\""),
        ];

        for (strategy, expected) in &pairs {
            assert_eq!(serde_json::to_string(strategy).unwrap(), *expected);
            assert_eq!(strategy.to_string(), expected.trim_matches('"'));
        }
    }

    #[test]
    fn test_semantics_display() {
        assert_eq!(Semantics::ExactLine.to_string(), "exact-line");
        assert_eq!(
            serde_json::to_string(&Semantics::Substring).unwrap(),
            "\"substring\""
        );
    }
}
