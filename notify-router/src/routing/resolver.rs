//! Resolves the delivery channels for an admitted record.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::Result;
use crate::config::ResolverConfig;
use crate::database::repositories::PreferenceStore;
use crate::domain::{NotificationRecord, PreferenceMatrix, Priority};

pub struct ChannelResolver {
    store: Arc<dyn PreferenceStore>,
    config: ResolverConfig,
}

impl ChannelResolver {
    pub fn new(store: Arc<dyn PreferenceStore>, config: ResolverConfig) -> Self {
        Self { store, config }
    }

    /// Look up the user's preferences and resolve the channel set.
    ///
    /// An empty set is a valid "do not deliver" outcome.
    pub async fn resolve(&self, record: &NotificationRecord) -> Result<BTreeSet<String>> {
        let matrix = self.store.get_preferences(&record.user_id).await?;
        if matrix.is_none() {
            debug!(user_id = %record.user_id, "No stored preferences, using defaults");
        }
        Ok(resolve_with(record, matrix.as_ref(), &self.config))
    }
}

/// Pure resolution over an already fetched matrix.
pub fn resolve_with(
    record: &NotificationRecord,
    matrix: Option<&PreferenceMatrix>,
    config: &ResolverConfig,
) -> BTreeSet<String> {
    let mut channels = match matrix {
        None => enabled(&config.default_channels),
        Some(m) if !m.global_opt_in => return BTreeSet::new(),
        Some(m) => enabled(m.channels_for(&record.event_type)),
    };

    if channels.is_empty() && record.priority == Priority::High {
        channels.insert(config.failsafe_channel.clone());
    }
    channels
}

fn enabled(map: &BTreeMap<String, bool>) -> BTreeSet<String> {
    map.iter()
        .filter(|(_, on)| **on)
        .map(|(name, _)| name.clone())
        .collect()
}
