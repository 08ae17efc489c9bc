// src/lib.rs
pub mod config;
pub mod error;
pub mod geo;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod selection;
