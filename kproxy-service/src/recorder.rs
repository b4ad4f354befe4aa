use kproxy_api::Service;

/// Sink for events about malformed services, typically backed by the
/// cluster's event API. When no recorder is injected the tracker only logs.
pub trait EventRecorder: Send + Sync {
    fn event(&self, service: &Service, reason: &str, message: &str);
}
