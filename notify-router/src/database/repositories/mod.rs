//! Repositories.

pub mod memory;
pub mod preference;

pub use memory::InMemoryPreferenceStore;
pub use preference::{PreferenceStore, SqlxPreferenceStore};
