//! notify-router library crate.
//!
//! Consumes notification records from three priority bands, arbitrates between
//! them, applies sliding-window admission control and resolves delivery
//! channels before publishing to the delivery topic.

pub mod admission;
pub mod config;
pub mod database;
pub mod delivery;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod routing;
pub mod scheduler;
pub mod services;

pub use error::{Error, Result};
