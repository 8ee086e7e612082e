//! Value objects.

pub mod channel;
pub mod priority;

pub use priority::Priority;
