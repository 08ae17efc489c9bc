// src/health/mod.rs
mod http;
mod probe;
mod retry;
mod runner;
mod scheduler;
mod tcp;

pub use http::{HttpParams, HttpProbe};
pub use probe::{build_probe, probes_equivalent, HealthCheckSpec, HealthProbe};
pub use retry::{RetryDecision, RetryPolicy};
pub use runner::{ProbeCycleResult, ProbeRunner};
pub use scheduler::{effective_interval, stagger_delays, QueryTracker, Scheduler};
pub use tcp::{TcpParams, TcpProbe};
