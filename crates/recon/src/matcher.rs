//! Entity-name suggestions: greedy nearest match per source name using the
//! Ratcliff/Obershelp "gestalt" similarity ratio.
//!
//! Every source name is matched independently. Two source names may receive
//! the same target, and nothing tries to optimise the assignment as a whole;
//! the user edits the result before it becomes the authoritative mapping.

use std::collections::HashMap;

use crate::model::{EntityMapping, Suggestion};

/// Default acceptance threshold for a suggestion.
pub const DEFAULT_CUTOFF: f64 = 0.6;

/// Sequences at least this long get their most popular elements ignored
/// during the longest-match search, as in the classic gestalt matcher.
const AUTOJUNK_MIN_LEN: usize = 200;

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Similarity ratio in [0, 1]: `2·M / (|a| + |b|)` where `M` is the number of
/// characters in matching blocks found by recursively taking the longest
/// common substring.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = SequenceMatcher::new(&a, &b).matching_characters();
    2.0 * matches as f64 / total as f64
}

struct SequenceMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of each element of `b`, ascending.
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> SequenceMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &ch) in b.iter().enumerate() {
            b2j.entry(ch).or_default().push(j);
        }

        if b.len() >= AUTOJUNK_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= limit);
        }

        Self { a, b, b2j }
    }

    /// Longest matching block in `a[alo..ahi]` and `b[blo..bhi]` as
    /// `(i, j, size)`. Ties go to the earliest start in `a`, then in `b`.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let prev = if j > 0 { j2len.get(&(j - 1)).copied().unwrap_or(0) } else { 0 };
                    let k = prev + 1;
                    next.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = next;
        }

        // Popular elements were dropped from b2j; grow the block across them.
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        (best_i, best_j, best_size)
    }

    fn matching_characters(&self) -> usize {
        let mut total = 0;
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.find_longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            total += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }
        total
    }
}

// ---------------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------------

/// Closest target for `source`, if any scores at least `cutoff`.
/// Equal scores go to the lexicographically greatest candidate.
pub fn best_match<'t>(source: &str, targets: &'t [String], cutoff: f64) -> Option<(&'t str, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for target in targets {
        if target.trim().is_empty() {
            continue;
        }
        let score = similarity(target, source);
        if score < cutoff {
            continue;
        }
        let better = match best {
            None => true,
            Some((name, s)) => score > s || (score == s && target.as_str() > name),
        };
        if better {
            best = Some((target.as_str(), score));
        }
    }
    best
}

/// One suggestion per source name, in the order given.
pub fn suggestions_with_scores(sources: &[String], targets: &[String], cutoff: f64) -> Vec<Suggestion> {
    sources
        .iter()
        .map(|source| match best_match(source, targets, cutoff) {
            Some((target, score)) => Suggestion {
                source: source.clone(),
                target: target.to_string(),
                score,
            },
            None => Suggestion {
                source: source.clone(),
                target: String::new(),
                score: 0.0,
            },
        })
        .collect()
}

/// Source name -> best guess (empty when nothing clears the cutoff).
pub fn suggest(sources: &[String], targets: &[String], cutoff: f64) -> EntityMapping {
    let mapping: EntityMapping = suggestions_with_scores(sources, targets, cutoff)
        .into_iter()
        .map(|s| (s.source, s.target))
        .collect();
    log::debug!(
        "suggested {} of {} source names",
        mapping.values().filter(|t| !t.is_empty()).count(),
        mapping.len()
    );
    mapping
}

/// Apply manual overrides on top of suggestions. Overrides always win,
/// including overrides to the empty string. Overrides for names that are not
/// in the source are kept too; they are harmless and survive re-uploads.
pub fn apply_overrides(suggestions: &EntityMapping, overrides: &EntityMapping) -> EntityMapping {
    let mut mapping = suggestions.clone();
    for (source, target) in overrides {
        mapping.insert(source.clone(), target.trim().to_string());
    }
    mapping
}
