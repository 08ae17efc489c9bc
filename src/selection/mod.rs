// src/selection/mod.rs
mod algorithm;
pub mod failover;
pub mod fastest;
pub mod geoip;
pub mod nearest;
pub mod random;
pub mod round_robin;
pub mod weighted;

pub use algorithm::{
    create_selector, AddressFamily, Candidate, SelectionMode, SelectionRequest, Selector,
};
