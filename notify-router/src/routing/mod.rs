//! Delivery channel resolution.

pub mod resolver;

pub use resolver::ChannelResolver;
