// # speedns-core
//
// Core library for republishing speed-test winners as DNS records.
//
// ## Architecture Overview
//
// - **results**: ranked CSV → endpoint list
// - **source**: which endpoint pool (v4 / v6 / merged) feeds the tool
// - **measure**: argument planning and child-process invocation
// - **zone**: zone name resolution and zone-relative record naming
// - **reconcile**: delete-then-create convergence under the load-balance or
//   rank-mapping policy
// - **coordinator**: single-flight sequencing of a whole run
// - **ZoneApi**: trait for the remote DNS hosting API
//
// Ambient pieces: `config` (persisted run configuration), `store` (crash-safe
// config file), `sink` (serialized run log), `schedule` (cron expressions).

pub mod config;
pub mod coordinator;
pub mod error;
pub mod measure;
pub mod reconcile;
pub mod results;
pub mod schedule;
pub mod sink;
pub mod source;
pub mod store;
pub mod traits;
pub mod zone;

// Re-export core types for convenience
pub use config::{ApiCredentials, DataLayout, IpPool, MeasureConfig, RunConfig};
pub use coordinator::{AbortReason, RunCoordinator, RunOutcome};
pub use error::{Error, Result};
pub use reconcile::{DistributionPolicy, DomainOutcome, ReconcileReport, Reconciler};
pub use schedule::CronSchedule;
pub use sink::{LogChunk, LogSink};
pub use store::ConfigStore;
pub use traits::{DnsRecord, NewRecord, RecordType, ZoneApi, ZoneApiFactory};
pub use zone::{ZoneName, ZoneSource};
