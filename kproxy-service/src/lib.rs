mod family;
mod metrics;
mod recorder;
mod service_port;
mod snapshot;
mod tracker;

pub use metrics::TrackerMetrics;
pub use recorder::EventRecorder;
pub use service_port::{BaseServicePort, NamespacedName, ServicePort, ServicePortName};
pub use snapshot::{ApplyResult, ServicesSnapshot};
pub use tracker::{MakeServicePortFn, PortMap, ServiceChangeTracker};
