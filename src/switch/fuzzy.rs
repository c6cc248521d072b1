//! Subsequence matching against entity titles, with the match segmented into
//! runs the presentation layer can highlight.

use serde::Serialize;

use crate::common::collections::HashMap;

/// A run of consecutive title characters, classified by whether the query
/// consumed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "text")]
pub enum MatchRun {
    Matched(String),
    Unmatched(String),
}

/// Char-position index over one title.
///
/// Positions are char indices, kept sorted by construction, so each query
/// character resolves with one binary search. Matching is leftmost-greedy:
/// deterministic, O(query * log title), and not necessarily the prettiest
/// possible highlighting.
#[derive(Debug, Clone)]
pub struct TitleIndex {
    text: String,
    positions: HashMap<char, Vec<usize>>,
}

fn fold(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

impl TitleIndex {
    pub fn new(text: &str) -> TitleIndex {
        let mut positions: HashMap<char, Vec<usize>> = HashMap::default();
        for (i, ch) in text.chars().enumerate() {
            positions.entry(fold(ch)).or_default().push(i);
        }
        TitleIndex { text: text.to_string(), positions }
    }

    pub fn text(&self) -> &str { &self.text }

    /// Matches `query` as a case-insensitive subsequence of the title.
    ///
    /// Returns the title split into matched/unmatched runs, or `None` when
    /// some query character cannot be placed. An empty query trivially
    /// matches as one unmatched run spanning the whole title.
    pub fn matches(&self, query: &str) -> Option<Vec<MatchRun>> {
        let mut consumed: Vec<usize> = Vec::with_capacity(query.len());
        let mut floor = 0usize;
        for ch in query.chars() {
            let positions = self.positions.get(&fold(ch))?;
            // smallest position strictly after the previous match
            let at = positions.partition_point(|&p| p < floor);
            let &pos = positions.get(at)?;
            consumed.push(pos);
            floor = pos + 1;
        }

        let mut runs: Vec<MatchRun> = Vec::new();
        let mut next = consumed.iter().copied().peekable();
        for (i, ch) in self.text.chars().enumerate() {
            let hit = next.peek() == Some(&i);
            if hit {
                next.next();
            }
            match runs.last_mut() {
                Some(MatchRun::Matched(run)) if hit => run.push(ch),
                Some(MatchRun::Unmatched(run)) if !hit => run.push(ch),
                _ if hit => runs.push(MatchRun::Matched(ch.to_string())),
                _ => runs.push(MatchRun::Unmatched(ch.to_string())),
            }
        }
        Some(runs)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn matched(text: &str) -> MatchRun { MatchRun::Matched(text.to_string()) }

    fn unmatched(text: &str) -> MatchRun { MatchRun::Unmatched(text.to_string()) }

    #[test]
    fn prefix_match_splits_into_two_runs() {
        let runs = TitleIndex::new("island").matches("isla").unwrap();
        assert_eq!(runs, vec![matched("isla"), unmatched("nd")]);
    }

    #[test]
    fn disjoint_characters_fail() {
        assert_eq!(TitleIndex::new("cat").matches("dog"), None);
    }

    #[test]
    fn empty_query_is_one_unmatched_run() {
        let runs = TitleIndex::new("Terminal").matches("").unwrap();
        assert_eq!(runs, vec![unmatched("Terminal")]);
    }

    #[test]
    fn subsequence_does_not_require_contiguity() {
        let runs = TitleIndex::new("window").matches("wnd").unwrap();
        assert_eq!(
            runs,
            vec![matched("w"), unmatched("i"), matched("nd"), unmatched("ow")]
        );
    }

    #[test]
    fn matching_is_case_insensitive_but_preserves_title_case() {
        let runs = TitleIndex::new("Safari").matches("SAF").unwrap();
        assert_eq!(runs, vec![matched("Saf"), unmatched("ari")]);
    }

    #[test]
    fn query_longer_than_title_fails() {
        assert_eq!(TitleIndex::new("ab").matches("abc"), None);
    }

    #[test]
    fn repeated_characters_advance_past_previous_matches() {
        // both 'o's must land on distinct positions
        let runs = TitleIndex::new("foo").matches("oo").unwrap();
        assert_eq!(runs, vec![unmatched("f"), matched("oo")]);
        assert_eq!(TitleIndex::new("fo").matches("oo"), None);
    }

    #[test]
    fn greedy_choice_takes_the_leftmost_position() {
        // 'a' could match either occurrence; the first is taken
        let runs = TitleIndex::new("banana").matches("a").unwrap();
        assert_eq!(runs, vec![unmatched("b"), matched("a"), unmatched("nana")]);
    }
}
