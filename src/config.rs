//! Runtime configuration for the per-thread loop.

/// Tunables read by the scheduler and the connection machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Log a warning when a reaction connects to an event type its source
    /// does not declare. Connection strings starting with `!` never warn.
    pub warn_unknown_events: bool,
    /// Log a warning when the loop iterates while a component is still
    /// inside its construction or init hook.
    pub check_active_components: bool,
    /// Upper bound on drain rounds per phase within one iteration. Work
    /// left over after the limit stays queued for the next iteration.
    pub max_drain_rounds: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            warn_unknown_events: true,
            check_active_components: true,
            max_drain_rounds: 10_000,
        }
    }
}

impl LoopConfig {
    pub fn warn_unknown_events(mut self, on: bool) -> Self {
        self.warn_unknown_events = on;
        self
    }

    pub fn check_active_components(mut self, on: bool) -> Self {
        self.check_active_components = on;
        self
    }

    pub fn max_drain_rounds(mut self, rounds: usize) -> Self {
        self.max_drain_rounds = rounds.max(1);
        self
    }
}
