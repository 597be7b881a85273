//! Boyer-Moore scan with bad-character and good-suffix rules.

use std::sync::Arc;

use super::{CorpusIndex, Matcher, Semantics, Strategy};
use crate::corpus::CorpusSnapshot;

/// Skip tables are computed per lookup; nothing is kept between calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoyerMooreMatcher;

/// Precomputed skip tables for one pattern.
#[derive(Debug)]
pub struct BoyerMoore<'p> {
    pattern: &'p [u8],
    bad_char: [isize; 256],
    good_suffix: Vec<usize>,
}

impl<'p> BoyerMoore<'p> {
    pub fn new(pattern: &'p [u8]) -> Self {
        Self {
            pattern,
            bad_char: bad_character_table(pattern),
            good_suffix: good_suffix_table(pattern),
        }
    }

    /// Whether the pattern occurs in `text`. The empty pattern occurs
    /// everywhere.
    pub fn find_in(&self, text: &[u8]) -> bool {
        let m = self.pattern.len();
        let n = text.len();
        if m == 0 {
            return true;
        }
        if m > n {
            return false;
        }

        let mut shift = 0;
        while shift <= n - m {
            let mut j = m;
            while j > 0 && self.pattern[j - 1] == text[shift + j - 1] {
                j -= 1;
            }
            if j == 0 {
                return true;
            }

            let mismatch = j - 1;
            let bad = mismatch as isize - self.bad_char[text[shift + mismatch] as usize];
            let good = self.good_suffix[mismatch + 1];
            shift += (bad.max(1) as usize).max(good);
        }
        false
    }
}

/// Last index of every byte value in the pattern, `-1` when absent.
fn bad_character_table(pattern: &[u8]) -> [isize; 256] {
    let mut table = [-1isize; 256];
    for (i, &byte) in pattern.iter().enumerate() {
        table[byte as usize] = i as isize;
    }
    table
}

/// Strong good-suffix shifts, indexed by the position after the mismatch.
fn good_suffix_table(pattern: &[u8]) -> Vec<usize> {
    let m = pattern.len();
    let mut shift = vec![0usize; m + 1];
    let mut border = vec![0usize; m + 1];

    let mut i = m;
    let mut j = m + 1;
    border[i] = j;
    while i > 0 {
        while j <= m && pattern[i - 1] != pattern[j - 1] {
            if shift[j] == 0 {
                shift[j] = j - i;
            }
            j = border[j];
        }
        i -= 1;
        j -= 1;
        border[i] = j;
    }

    j = border[0];
    for (i, s) in shift.iter_mut().enumerate() {
        if *s == 0 {
            *s = j;
        }
        if i == j {
            j = border[j];
        }
    }
    shift
}

struct BoyerMooreIndex {
    snapshot: Arc<CorpusSnapshot>,
}

impl Matcher for BoyerMooreMatcher {
    fn strategy(&self) -> Strategy {
        Strategy::BoyerMoore
    }

    fn semantics(&self) -> Semantics {
        Semantics::Substring
    }

    fn index(&self, snapshot: Arc<CorpusSnapshot>) -> Box<dyn CorpusIndex> {
        Box::new(BoyerMooreIndex { snapshot })
    }
}

impl CorpusIndex for BoyerMooreIndex {
    fn contains(&self, query: &str) -> bool {
        let searcher = BoyerMoore::new(query.as_bytes());
        self.snapshot
            .lines()
            .iter()
            .any(|line| searcher.find_in(line.as_bytes()))
    }
}
