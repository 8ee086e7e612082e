//! Service layer module.
//!
//! Builds the stores, clients and pipeline from configuration and runs it.

pub mod container;

pub use container::ServiceContainer;
