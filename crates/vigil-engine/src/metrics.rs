//! Per-tick performance metrics for the simulation engine.
//!
//! [`TickMetrics`] captures timing and population data for a single tick.

/// Timing and population metrics collected during a single tick.
///
/// All durations are in microseconds. The driver populates these fields
/// after each `step()`; consumers read them from the most recent tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickMetrics {
    /// Wall-clock time for the entire tick, excluding the clock sleep.
    pub total_us: u64,
    /// Time spent draining the action inbox.
    pub drain_us: u64,
    /// Time spent in the generate phase (including spawn append).
    pub generate_us: u64,
    /// Time spent in the next phase.
    pub next_us: u64,
    /// Time spent committing and clearing events.
    pub commit_us: u64,
    /// Time spent building documents and waiting on view workers.
    pub publish_us: u64,
    /// Number of actions drained this tick.
    pub actions: usize,
    /// Number of per-entity generate/next failures this tick.
    pub entity_failures: usize,
    /// Number of entities spawned this tick.
    pub spawned: usize,
    /// Number of destroyed entities removed after publish.
    pub reaped: usize,
    /// Live entities after reaping.
    pub live_entities: usize,
    /// View workers registered after the membership step.
    pub sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metrics_are_zero() {
        let m = TickMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.drain_us, 0);
        assert_eq!(m.publish_us, 0);
        assert_eq!(m.entity_failures, 0);
        assert_eq!(m.live_entities, 0);
    }
}
