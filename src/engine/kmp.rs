//! Knuth-Morris-Pratt scan: substring search with a prefix-function table.
//!
//! The query is the pattern. Its failure table depends only on the query,
//! so tables are kept per distinct query value in a bounded cache that
//! outlives individual snapshots.

use dashmap::DashMap;
use std::sync::Arc;

use super::{CorpusIndex, Matcher, Semantics, Strategy};
use crate::corpus::CorpusSnapshot;

/// Default number of cached failure tables.
pub const DEFAULT_TABLE_CACHE_CAPACITY: usize = 4096;

/// Compute the prefix function of `pattern`: `table[i]` is the length of
/// the longest proper prefix of `pattern[..=i]` that is also its suffix.
pub fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0; pattern.len()];
    let mut len = 0;

    for i in 1..pattern.len() {
        while len > 0 && pattern[i] != pattern[len] {
            len = table[len - 1];
        }
        if pattern[i] == pattern[len] {
            len += 1;
        }
        table[i] = len;
    }
    table
}

/// Whether `pattern` occurs in `text`, given its precomputed failure table.
pub fn kmp_find(text: &[u8], pattern: &[u8], table: &[usize]) -> bool {
    if pattern.is_empty() {
        return true;
    }

    let mut matched = 0;
    for &byte in text {
        while matched > 0 && byte != pattern[matched] {
            matched = table[matched - 1];
        }
        if byte == pattern[matched] {
            matched += 1;
            if matched == pattern.len() {
                return true;
            }
        }
    }
    false
}

/// Failure tables keyed by query value.
#[derive(Debug)]
struct TableCache {
    tables: DashMap<String, Arc<[usize]>>,
    capacity: usize,
}

impl TableCache {
    fn get_or_compute(&self, query: &str) -> Arc<[usize]> {
        if let Some(table) = self.tables.get(query) {
            return Arc::clone(table.value());
        }

        let table: Arc<[usize]> = failure_table(query.as_bytes()).into();
        if self.tables.len() < self.capacity {
            self.tables
                .entry(query.to_string())
                .or_insert_with(|| Arc::clone(&table));
            // Racing inserts of distinct queries can overshoot; back ours out.
            if self.tables.len() > self.capacity {
                self.tables.remove(query);
            }
        }
        table
    }
}

/// Precomputes the pattern table once per distinct query, then scans the
/// whole corpus per query.
#[derive(Debug)]
pub struct KmpMatcher {
    tables: Arc<TableCache>,
}

impl Default for KmpMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl KmpMatcher {
    pub fn new() -> Self {
        Self::with_table_capacity(DEFAULT_TABLE_CACHE_CAPACITY)
    }

    /// Keep at most `capacity` failure tables. Queries past the limit get a
    /// table computed for that call only. Concurrent inserts may briefly
    /// exceed the limit; each inserter removes its own entry if they do.
    pub fn with_table_capacity(capacity: usize) -> Self {
        Self {
            tables: Arc::new(TableCache {
                tables: DashMap::new(),
                capacity,
            }),
        }
    }

    /// Number of failure tables currently cached.
    pub fn cached_tables(&self) -> usize {
        self.tables.tables.len()
    }
}

struct KmpIndex {
    snapshot: Arc<CorpusSnapshot>,
    tables: Arc<TableCache>,
}

impl Matcher for KmpMatcher {
    fn strategy(&self) -> Strategy {
        Strategy::Kmp
    }

    fn semantics(&self) -> Semantics {
        Semantics::Substring
    }

    fn index(&self, snapshot: Arc<CorpusSnapshot>) -> Box<dyn CorpusIndex> {
        Box::new(KmpIndex {
            snapshot,
            tables: Arc::clone(&self.tables),
        })
    }
}

impl CorpusIndex for KmpIndex {
    fn contains(&self, query: &str) -> bool {
        let table = self.tables.get_or_compute(query);
        let pattern = query.as_bytes();

        self.snapshot
            .lines()
            .iter()
            .any(|line| kmp_find(line.as_bytes(), pattern, &table))
    }
}
