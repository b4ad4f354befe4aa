use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone, Default)]
pub struct TrackerMetrics {
    pub changes: Counter,
    pub pending: Gauge,
}

impl TrackerMetrics {
    /// Register tracker metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register(
            "service_changes",
            "Number of service changes observed",
            self.changes.clone(),
        );
        r.register(
            "service_changes_pending",
            "Number of pending service changes not yet applied",
            self.pending.clone(),
        );
        self
    }
}
