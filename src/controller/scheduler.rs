//! Pure scheduling helpers used by the controller driver loop: which
//! sentences the lookahead should fill next, and the retry backoff
//! schedule for a failed synthesis attempt. Kept side-effect free so they
//! can be tested without spinning up threads or a real engine.

use std::time::Duration;

use crate::model::Sentence;

/// Returns up to `depth` sentences, in document order, following
/// `current_index` that are not already represented in `queued_ids`.
/// `current_index` of `None` means nothing has started playing yet, so
/// filling begins from the first sentence.
pub fn next_fill_candidates(
    sentences: &[Sentence],
    current_index: Option<usize>,
    queued_ids: &std::collections::HashSet<u64>,
    depth: usize,
) -> Vec<Sentence> {
    let start = current_index.map(|i| i + 1).unwrap_or(0);
    sentences
        .iter()
        .skip(start)
        .filter(|s| !queued_ids.contains(&s.id))
        .take(depth)
        .cloned()
        .collect()
}

pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_millis(100) }
    }
}

impl RetryPolicy {
    /// `attempt` is zero-based: the delay before the *first* retry (i.e.
    /// after attempt 0 failed) is `base_delay`, doubling each time after.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Range;

    fn sentence(id: u64) -> Sentence {
        let r: Range<usize> = 0..1;
        Sentence::new(id, format!("s{id}"), id as usize, r)
    }

    #[test]
    fn fills_from_start_when_nothing_playing() {
        let sentences: Vec<Sentence> = (0..5).map(sentence).collect();
        let queued = std::collections::HashSet::new();
        let fill = next_fill_candidates(&sentences, None, &queued, 2);
        assert_eq!(fill.iter().map(|s| s.id).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn fills_after_current_index() {
        let sentences: Vec<Sentence> = (0..5).map(sentence).collect();
        let queued = std::collections::HashSet::new();
        let fill = next_fill_candidates(&sentences, Some(1), &queued, 2);
        assert_eq!(fill.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn skips_already_queued_sentences() {
        let sentences: Vec<Sentence> = (0..5).map(sentence).collect();
        let mut queued = std::collections::HashSet::new();
        queued.insert(2);
        let fill = next_fill_candidates(&sentences, Some(0), &queued, 2);
        assert_eq!(fill.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn stops_at_end_of_document() {
        let sentences: Vec<Sentence> = (0..3).map(sentence).collect();
        let queued = std::collections::HashSet::new();
        let fill = next_fill_candidates(&sentences, Some(1), &queued, 5);
        assert_eq!(fill.iter().map(|s| s.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn retry_delay_doubles_each_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn stops_retrying_after_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }
}
