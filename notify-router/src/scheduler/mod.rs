//! Band arbitration and the single processing worker.

pub mod deadline;
pub mod service;

pub use deadline::DeadlineArbiter;
pub use service::{PriorityScheduler, RecordHandler};
