pub mod database;
pub mod metrics;
pub mod origins;
pub mod probes;
pub mod runtime;

pub use database::{ConnectionState, ConnectionTracker, DatabaseProbe, MongoDb};
pub use metrics::{get_metrics, init_metrics};
pub use origins::OriginAllowlist;
pub use runtime::RuntimeSampler;
