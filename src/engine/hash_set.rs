//! Hash-set membership: exact equality with a trimmed line.

use std::collections::HashSet;
use std::sync::Arc;

use super::{CorpusIndex, Matcher, Semantics, Strategy};
use crate::corpus::CorpusSnapshot;

/// O(corpus) to build, O(1) average per query. Under reread policy the set
/// is rebuilt for every query.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashSetMatcher;

struct HashSetIndex {
    lines: HashSet<String>,
}

impl Matcher for HashSetMatcher {
    fn strategy(&self) -> Strategy {
        Strategy::HashSet
    }

    fn semantics(&self) -> Semantics {
        Semantics::ExactLine
    }

    fn index(&self, snapshot: Arc<CorpusSnapshot>) -> Box<dyn CorpusIndex> {
        Box::new(HashSetIndex {
            lines: snapshot.lines().iter().cloned().collect(),
        })
    }
}

impl CorpusIndex for HashSetIndex {
    fn contains(&self, query: &str) -> bool {
        self.lines.contains(query)
    }
}
