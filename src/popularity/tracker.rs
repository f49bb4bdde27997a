//! Popularity Tracker
//!
//! Keeps a time-decayed popularity score per query key-pattern and derives
//! an elevated replication factor for hot patterns. Scores decay
//! exponentially with the hours elapsed since the pattern was last seen;
//! patterns already above the popularity threshold receive a
//! rich-get-richer bonus so hot and warm keys separate quickly.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

struct TrackerInner {
    scores: HashMap<String, f64>,
    last_access: HashMap<String, Instant>,
}

pub struct PopularityTracker {
    inner: Mutex<TrackerInner>,
    decay_factor: f64,
    threshold: f64,
    base_replication: usize,
    max_replication: usize,
}

impl PopularityTracker {
    pub fn new(
        base_replication: usize,
        max_replication: usize,
        threshold: f64,
        decay_factor: f64,
    ) -> Self {
        tracing::info!(
            "popularity tracker initialized: base={} max={} threshold={} decay={}",
            base_replication,
            max_replication,
            threshold,
            decay_factor
        );

        Self {
            inner: Mutex::new(TrackerInner {
                scores: HashMap::new(),
                last_access: HashMap::new(),
            }),
            decay_factor,
            threshold,
            base_replication,
            max_replication,
        }
    }

    pub fn base_replication(&self) -> usize {
        self.base_replication
    }

    fn decay_multiplier(&self, inner: &TrackerInner, pattern: &str) -> f64 {
        match inner.last_access.get(pattern) {
            Some(last) => {
                let hours = last.elapsed().as_secs_f64() / 3600.0;
                (-self.decay_factor * hours).exp()
            }
            None => 1.0,
        }
    }

    fn decayed_score(&self, inner: &TrackerInner, pattern: &str) -> f64 {
        match inner.scores.get(pattern) {
            Some(&raw) => raw * self.decay_multiplier(inner, pattern),
            None => 0.0,
        }
    }

    /// Records one query against a key pattern. The effective (decayed)
    /// score is computed first; if it already exceeds the threshold the
    /// weight is amplified by `1 + log10(score / threshold)` before being
    /// added, then the access time resets to now.
    pub fn record_query(&self, pattern: &str, weight: f64) {
        let mut inner = self.inner.lock();

        let current = self.decayed_score(&inner, pattern);

        let mut increment = weight;
        if current > self.threshold {
            increment *= 1.0 + (current / self.threshold).log10();
        }

        inner.scores.insert(pattern.to_string(), current + increment);
        inner.last_access.insert(pattern.to_string(), Instant::now());
    }

    /// The current decayed popularity of a pattern; 0 for unseen patterns.
    pub fn popularity(&self, pattern: &str) -> f64 {
        let inner = self.inner.lock();
        self.decayed_score(&inner, pattern)
    }

    /// Replication factor for a pattern: the base factor below the
    /// threshold, otherwise `base + floor(log10(score / threshold))`
    /// capped at the maximum.
    pub fn replication_factor(&self, pattern: &str) -> usize {
        let inner = self.inner.lock();
        let score = self.decayed_score(&inner, pattern);

        if score < self.threshold {
            return self.base_replication;
        }

        let boost = (score / self.threshold).log10() as usize;
        (self.base_replication + boost).min(self.max_replication)
    }

    /// Every tracked pattern with its decayed score, hottest first.
    /// Patterns whose decayed score fell below 0.01 are excluded.
    pub fn all_keys_sorted_by_popularity(&self) -> Vec<(String, f64)> {
        let inner = self.inner.lock();

        let mut entries: Vec<(String, f64)> = inner
            .scores
            .keys()
            .map(|pattern| (pattern.clone(), self.decayed_score(&inner, pattern)))
            .filter(|(_, score)| *score > 0.01)
            .collect();

        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.scores.clear();
        inner.last_access.clear();
    }

    /// Test hook: pretend `hours` have passed since the pattern was last
    /// accessed.
    #[cfg(test)]
    pub(crate) fn backdate(&self, pattern: &str, hours: f64) {
        let mut inner = self.inner.lock();
        if let Some(last) = inner.last_access.get_mut(pattern) {
            *last -= std::time::Duration::from_secs_f64(hours * 3600.0);
        }
    }
}
