//! Adaptive Router
//!
//! Wraps the DART router with query-popularity awareness. Incoming
//! queries feed the popularity tracker (exact patterns at double weight,
//! since they benefit most from local replica placement); key routing then
//! substitutes the tracker's adaptive replication factor for the base
//! one. With adaptive replication disabled the wrapper is
//! indistinguishable from the base router.

use crate::index::pattern::{AffixPattern, split_query};
use crate::routing::router::DartRouter;

use super::tracker::PopularityTracker;

/// Weight applied to exact key patterns when recording popularity.
const EXACT_PATTERN_WEIGHT: f64 = 2.0;

pub struct AdaptiveRouter {
    base: DartRouter,
    tracker: PopularityTracker,
    enabled: bool,
}

impl AdaptiveRouter {
    /// The tracker is passed in explicitly and lives as long as the
    /// router.
    pub fn new(base: DartRouter, tracker: PopularityTracker, enabled: bool) -> Self {
        tracing::info!(
            "adaptive router initialized with adaptive replication {}",
            if enabled { "enabled" } else { "disabled" }
        );

        Self {
            base,
            tracker,
            enabled,
        }
    }

    pub fn base(&self) -> &DartRouter {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut DartRouter {
        &mut self.base
    }

    pub fn tracker(&self) -> &PopularityTracker {
        &self.tracker
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        tracing::info!(
            "adaptive replication {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn record_query(&self, key_pattern: &str, weight: f64) {
        if self.enabled {
            self.tracker.record_query(key_pattern, weight);
        }
    }

    /// Replica set for a key, substituting the popularity-derived
    /// replication factor for the base one.
    pub fn servers_for_key(&self, key: &str) -> Vec<usize> {
        if !self.enabled {
            return self.base.servers_for_key(key);
        }

        let replication_factor = self.tracker.replication_factor(key);
        self.base.servers_for_key_with_factor(key, replication_factor)
    }

    /// Destination set for a query. Records the key portion for
    /// popularity tracking before dispatching on its affix shape.
    pub fn destination_servers(&self, query: &str) -> Vec<usize> {
        let (key_part, _) = split_query(query);

        if self.enabled {
            let weight = if key_part.contains('*') {
                1.0
            } else {
                EXACT_PATTERN_WEIGHT
            };
            self.tracker.record_query(&key_part, weight);
        }

        match AffixPattern::parse(&key_part) {
            AffixPattern::Wildcard => self.base.servers_for_wildcard_query(),
            AffixPattern::Infix(infix) => self.base.servers_for_infix_query(&infix),
            AffixPattern::Suffix(suffix) => self.base.servers_for_suffix_query(&suffix),
            AffixPattern::Prefix(prefix) => self.base.servers_for_prefix_query(&prefix),
            AffixPattern::Exact(key) => self.servers_for_key(&key),
        }
    }

    /// The replication factor the tracker currently assigns to a pattern.
    pub fn replication_factor_for(&self, pattern: &str) -> usize {
        self.tracker.replication_factor(pattern)
    }

    /// Tracked patterns with decayed scores, hottest first.
    pub fn popularity_stats(&self) -> Vec<(String, f64)> {
        self.tracker.all_keys_sorted_by_popularity()
    }
}
