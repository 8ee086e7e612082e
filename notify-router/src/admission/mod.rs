//! Sliding-window admission control.
//!
//! Each record is counted against two subjects in a shared counter store:
//! the user, and the (user, event type) pair. A record is admitted only if
//! both counts are below their limits, in which case a marker is recorded
//! in both subjects.

pub mod controller;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use controller::AdmissionController;
pub use memory::InMemoryCounterStore;
pub use redis_store::RedisCounterStore;
pub use store::{CounterStore, Verdict, WindowCheck, WindowDecision};
