//! Prefix-tree membership: exact equality by traversal.
//!
//! The trie is the one strategy whose index is pinned: once built it is
//! served for the lifetime of the process, under either consistency policy,
//! until [`LookupEngine::rebuild`](super::LookupEngine::rebuild) replaces it.
//! Lines appended to the corpus after the build are not seen before that.

use std::collections::HashMap;
use std::sync::Arc;

use super::{CorpusIndex, Matcher, Semantics, Strategy};
use crate::corpus::CorpusSnapshot;

/// O(query) per lookup after an O(corpus) build.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrieMatcher;

#[derive(Debug, Default)]
struct Node {
    children: HashMap<char, usize>,
    terminal: bool,
}

/// Arena-backed prefix tree over `char`s.
#[derive(Debug)]
pub struct Trie {
    nodes: Vec<Node>,
    words: usize,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
            words: 0,
        }
    }

    pub fn insert(&mut self, word: &str) {
        let mut current = 0;
        for ch in word.chars() {
            current = match self.nodes[current].children.get(&ch) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[current].children.insert(ch, next);
                    next
                }
            };
        }

        let node = &mut self.nodes[current];
        if !node.terminal {
            node.terminal = true;
            self.words += 1;
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        let mut current = 0;
        for ch in word.chars() {
            match self.nodes[current].children.get(&ch) {
                Some(&next) => current = next,
                None => return false,
            }
        }
        self.nodes[current].terminal
    }

    /// Number of distinct words stored.
    pub fn len(&self) -> usize {
        self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words == 0
    }
}

impl<S: AsRef<str>> FromIterator<S> for Trie {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut trie = Trie::new();
        for word in iter {
            trie.insert(word.as_ref());
        }
        trie
    }
}

impl CorpusIndex for Trie {
    fn contains(&self, query: &str) -> bool {
        Trie::contains(self, query)
    }
}

impl Matcher for TrieMatcher {
    fn strategy(&self) -> Strategy {
        Strategy::Trie
    }

    fn semantics(&self) -> Semantics {
        Semantics::ExactLine
    }

    fn index(&self, snapshot: Arc<CorpusSnapshot>) -> Box<dyn CorpusIndex> {
        Box::new(snapshot.lines().iter().collect::<Trie>())
    }

    fn pins_index(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_not_a_member() {
        let trie: Trie = ["13;0;23;11;0;16;5;0;", "13;0;2"].into_iter().collect();

        assert!(trie.contains("13;0;23;11;0;16;5;0;"));
        assert!(trie.contains("13;0;2"));
        assert!(!trie.contains("13;0;"));
        assert!(!trie.contains("13;0;23;11;0;16;5;0;;"));
    }

    #[test]
    fn test_len_counts_distinct_words() {
        let trie: Trie = ["a", "ab", "a", "b"].into_iter().collect();
        assert_eq!(trie.len(), 3);
        assert!(Trie::new().is_empty());
    }

    #[test]
    fn test_empty_word_needs_blank_line() {
        let without: Trie = ["x"].into_iter().collect();
        assert!(!without.contains(""));

        let with: Trie = ["x", ""].into_iter().collect();
        assert!(with.contains(""));
    }

    #[test]
    fn test_multibyte_chars() {
        let trie: Trie = ["naïve", "日本語"].into_iter().collect();
        assert!(trie.contains("日本語"));
        assert!(!trie.contains("日本"));
        assert!(trie.contains("naïve"));
    }
}
