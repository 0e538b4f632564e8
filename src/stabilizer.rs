//! Transcript stabilization.
//!
//! Sliding-window hypotheses are noisy and revisable; this module turns them
//! into a monotonically growing committed transcript plus a volatile pending
//! suffix. Text is committed once the same new suffix has been observed on
//! enough consecutive hypotheses, and committed text is never rewritten.
//! When a hypothesis no longer starts with the committed text (the window
//! outran it, or the engine re-segmented), the longest
//! suffix-of-committed / prefix-of-hypothesis overlap decides where the new
//! content begins.

use log::debug;

/// Outcome of one [`TranscriptStabilizer::update`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilizerUpdate {
    /// Text appended to the committed transcript by this call, if any.
    pub newly_committed: Option<String>,
    /// True when the hypothesis is fully reflected in committed text.
    pub is_stable: bool,
}

pub struct TranscriptStabilizer {
    committed: String,
    pending: String,
    last_pending: String,
    match_count: u32,
    stability_threshold: u32,
    min_prefix_length: usize,
}

impl TranscriptStabilizer {
    pub fn new(stability_threshold: u32, min_prefix_length: usize) -> Self {
        Self {
            committed: String::new(),
            pending: String::new(),
            last_pending: String::new(),
            match_count: 0,
            stability_threshold: stability_threshold.max(1),
            min_prefix_length,
        }
    }

    /// Committed transcript so far. Append-only.
    pub fn committed(&self) -> &str {
        &self.committed
    }

    /// Volatile suffix that has not stabilized yet.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Committed text plus pending suffix, as a partial event shows it.
    pub fn current_text(&self) -> String {
        format!("{}{}", self.committed, self.pending)
    }

    /// Feed the next hypothesis for the current utterance.
    pub fn update(&mut self, hypothesis: &str) -> StabilizerUpdate {
        let hypothesis = hypothesis.trim();

        let new_content = if self.committed.is_empty() {
            hypothesis.to_string()
        } else if let Some(rest) = hypothesis.strip_prefix(self.committed.as_str()) {
            rest.to_string()
        } else {
            // The hypothesis no longer carries the committed prefix. Find
            // where it overlaps the committed tail and keep the remainder.
            let overlap = longest_overlap(&self.committed, hypothesis);
            hypothesis[overlap..].to_string()
        };

        // match_count is the number of consecutive hypotheses that produced
        // this exact suffix.
        if new_content == self.last_pending {
            self.match_count += 1;
        } else {
            self.match_count = 1;
            self.last_pending = new_content.clone();
        }

        let long_enough = new_content.trim().chars().count() >= self.min_prefix_length;
        if !new_content.is_empty() && self.match_count >= self.stability_threshold && long_enough {
            debug!("Committing {:?} after {} matches", new_content, self.match_count);
            self.committed.push_str(&new_content);
            self.pending.clear();
            self.last_pending.clear();
            self.match_count = 0;
            StabilizerUpdate {
                newly_committed: Some(new_content),
                is_stable: true,
            }
        } else {
            let is_stable = new_content.is_empty();
            self.pending = new_content;
            StabilizerUpdate {
                newly_committed: None,
                is_stable,
            }
        }
    }

    /// Unconditionally promote the pending suffix into committed text.
    /// Idempotent when nothing is pending.
    pub fn force_commit(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        debug!("Force-committing {:?}", pending);
        self.committed.push_str(&pending);
        self.last_pending.clear();
        self.match_count = 0;
        Some(pending)
    }

    /// Clear all state for a new utterance.
    pub fn reset(&mut self) {
        self.committed.clear();
        self.pending.clear();
        self.last_pending.clear();
        self.match_count = 0;
    }
}

/// Length in bytes of the longest suffix of `committed` that is a prefix of
/// `hypothesis`. Greedy, longest first; zero when nothing overlaps.
pub(crate) fn longest_overlap(committed: &str, hypothesis: &str) -> usize {
    let max = committed.len().min(hypothesis.len());
    for len in (1..=max).rev() {
        if !hypothesis.is_char_boundary(len) {
            continue;
        }
        let start = committed.len() - len;
        if !committed.is_char_boundary(start) {
            continue;
        }
        if committed[start..] == hypothesis[..len] {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_hypothesis_commits() {
        let mut stabilizer = TranscriptStabilizer::new(2, 3);

        assert!(stabilizer.update("Hello").newly_committed.is_none());
        assert!(stabilizer.update("Hello").newly_committed.is_some());
        let third = stabilizer.update("Hello");

        assert_eq!(stabilizer.committed(), "Hello");
        assert_eq!(stabilizer.pending(), "");
        assert!(third.is_stable);
    }

    #[test]
    fn test_committed_transcript_grows() {
        let mut stabilizer = TranscriptStabilizer::new(2, 3);
        stabilizer.update("Hello");
        stabilizer.update("Hello");
        assert_eq!(stabilizer.committed(), "Hello");

        let first = stabilizer.update("Hello world");
        assert!(first.newly_committed.is_none());
        assert_eq!(stabilizer.pending(), " world");

        let second = stabilizer.update("Hello world");
        assert_eq!(second.newly_committed.as_deref(), Some(" world"));
        assert_eq!(stabilizer.committed(), "Hello world");
    }

    #[test]
    fn test_force_commit_promotes_pending() {
        let mut stabilizer = TranscriptStabilizer::new(2, 3);
        stabilizer.update("Hi");
        assert_eq!(stabilizer.pending(), "Hi");

        assert_eq!(stabilizer.force_commit().as_deref(), Some("Hi"));
        assert_eq!(stabilizer.committed(), "Hi");
        assert_eq!(stabilizer.pending(), "");

        // Idempotent when nothing is pending.
        assert!(stabilizer.force_commit().is_none());
        assert_eq!(stabilizer.committed(), "Hi");
    }

    #[test]
    fn test_short_suffix_below_min_prefix_stays_pending() {
        let mut stabilizer = TranscriptStabilizer::new(2, 3);
        stabilizer.update("Hi");
        stabilizer.update("Hi");
        stabilizer.update("Hi");
        assert_eq!(stabilizer.committed(), "");
        assert_eq!(stabilizer.pending(), "Hi");
    }

    #[test]
    fn test_window_outruns_committed_text() {
        let mut stabilizer = TranscriptStabilizer::new(2, 3);
        stabilizer.update("the quick brown");
        stabilizer.update("the quick brown");
        assert_eq!(stabilizer.committed(), "the quick brown");

        // The sliding window dropped the start of the utterance; the
        // hypothesis now begins inside the committed text.
        let update = stabilizer.update("brown fox jumps");
        assert!(update.newly_committed.is_none());
        assert_eq!(stabilizer.pending(), " fox jumps");

        stabilizer.update("brown fox jumps");
        assert_eq!(stabilizer.committed(), "the quick brown fox jumps");
    }

    #[test]
    fn test_unrelated_hypothesis_never_rewrites_committed() {
        let mut stabilizer = TranscriptStabilizer::new(2, 3);
        stabilizer.update("good morning");
        stabilizer.update("good morning");
        assert_eq!(stabilizer.committed(), "good morning");

        stabilizer.update("completely different");
        assert_eq!(stabilizer.committed(), "good morning");
        assert_eq!(stabilizer.pending(), "completely different");
    }

    #[test]
    fn test_empty_hypothesis_never_commits_empty() {
        let mut stabilizer = TranscriptStabilizer::new(2, 3);
        for _ in 0..5 {
            let update = stabilizer.update("   ");
            assert!(update.newly_committed.is_none());
            assert!(update.is_stable);
        }
        assert_eq!(stabilizer.committed(), "");
    }

    #[test]
    fn test_reset_clears_all_state() {
        let mut stabilizer = TranscriptStabilizer::new(2, 3);
        stabilizer.update("Hello");
        stabilizer.update("Hello");
        stabilizer.update("Hello world");
        stabilizer.reset();
        assert_eq!(stabilizer.committed(), "");
        assert_eq!(stabilizer.pending(), "");
        assert_eq!(stabilizer.current_text(), "");
    }

    #[test]
    fn test_longest_overlap_prefers_longest() {
        assert_eq!(longest_overlap("abcab", "ab"), 2);
        assert_eq!(longest_overlap("hello world", "world peace"), 5);
        assert_eq!(longest_overlap("hello", "xyz"), 0);
    }
}
