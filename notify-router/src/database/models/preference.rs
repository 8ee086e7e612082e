//! Preference rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the `users` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserDbModel {
    pub id: String,
    pub global_opt_in: bool,
}

/// Row of `user_channel_preferences`: the user's global switch for one channel.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChannelPreferenceDbModel {
    pub user_id: String,
    pub channel_name: String,
    pub enabled: bool,
}

/// Row of `user_event_preferences`: one channel of an event type override.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventPreferenceDbModel {
    pub user_id: String,
    pub event_type: String,
    pub channel_name: String,
    pub enabled: bool,
}
