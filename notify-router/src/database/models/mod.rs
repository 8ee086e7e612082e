//! Database models.

pub mod preference;

pub use preference::{ChannelPreferenceDbModel, EventPreferenceDbModel, UserDbModel};
