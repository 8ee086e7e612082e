//! Per-user delivery preferences.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A user's preference matrix as returned by the preference store.
///
/// Ordered maps keep resolution output stable across calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceMatrix {
    pub user_id: String,
    /// Whether the user receives any notifications at all.
    pub global_opt_in: bool,
    /// Channel name -> enabled.
    pub channels: BTreeMap<String, bool>,
    /// Event type -> (channel name -> enabled). An entry replaces `channels`
    /// entirely for that event type.
    pub event_types: BTreeMap<String, BTreeMap<String, bool>>,
}

impl PreferenceMatrix {
    /// Matrix for a user with the given channel map and no overrides.
    pub fn new(user_id: impl Into<String>, channels: BTreeMap<String, bool>) -> Self {
        Self {
            user_id: user_id.into(),
            global_opt_in: true,
            channels,
            event_types: BTreeMap::new(),
        }
    }

    pub fn opted_out(mut self) -> Self {
        self.global_opt_in = false;
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>, enabled: bool) -> Self {
        self.channels.insert(channel.into(), enabled);
        self
    }

    pub fn with_event_override<I, S>(mut self, event_type: impl Into<String>, channels: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let map = channels
            .into_iter()
            .map(|(name, enabled)| (name.into(), enabled))
            .collect();
        self.event_types.insert(event_type.into(), map);
        self
    }

    /// The channel map that applies to `event_type`.
    pub fn channels_for(&self, event_type: &str) -> &BTreeMap<String, bool> {
        self.event_types.get(event_type).unwrap_or(&self.channels)
    }
}
