// src/registry/mod.rs
//! Live state: zones, records and backends, queried by the DNS responder
//! and merged in place on reload.

mod backend;
mod gslb;
mod reconcile;
mod record;

pub use backend::{Backend, BackendSummary, HealthSnapshot};
pub use gslb::{Answer, Gslb, GslbBuilder};
pub use reconcile::ReloadSummary;
pub use record::{Record, RecordChanges, RecordSettings};
