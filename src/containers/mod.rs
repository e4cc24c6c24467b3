//! Container lifecycle: declarations, engine access and their reconciliation.

pub mod engine;
pub mod registry;
pub mod runtime_config;
pub mod store;
