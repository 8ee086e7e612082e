//! Domain types shared by every pipeline stage.

pub mod notification;
pub mod preference;
pub mod value_objects;

pub use notification::{NotificationRecord, ProcessedNotification};
pub use preference::PreferenceMatrix;
pub use value_objects::{Priority, channel};
