//! Linear scan: substring containment, line by line.

use std::sync::Arc;

use super::{CorpusIndex, Matcher, Semantics, Strategy};
use crate::corpus::CorpusSnapshot;

/// Tests every line for containment of the query. O(corpus × query).
#[derive(Debug, Default, Clone, Copy)]
pub struct LinearMatcher;

struct LinearIndex {
    snapshot: Arc<CorpusSnapshot>,
}

impl Matcher for LinearMatcher {
    fn strategy(&self) -> Strategy {
        Strategy::Linear
    }

    fn semantics(&self) -> Semantics {
        Semantics::Substring
    }

    fn index(&self, snapshot: Arc<CorpusSnapshot>) -> Box<dyn CorpusIndex> {
        Box::new(LinearIndex { snapshot })
    }
}

impl CorpusIndex for LinearIndex {
    fn contains(&self, query: &str) -> bool {
        self.snapshot
            .lines()
            .iter()
            .any(|line| line.contains(query))
    }
}
