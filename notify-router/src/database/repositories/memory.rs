//! In-memory preference store for mock mode and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::preference::PreferenceStore;
use crate::domain::{PreferenceMatrix, channel};
use crate::{Error, Result};

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    users: RwLock<HashMap<String, PreferenceMatrix>>,
    /// Returned for users without an entry of their own.
    fallback: Option<PreferenceMatrix>,
    unavailable: RwLock<bool>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that answers every unknown user with a copy of `template`.
    pub fn with_fallback(template: PreferenceMatrix) -> Self {
        Self {
            fallback: Some(template),
            ..Self::default()
        }
    }

    /// Matrix served to every user in mock mode: push and whatsapp enabled
    /// globally, with overrides for security alerts, messages and likes.
    pub fn mock_matrix() -> PreferenceMatrix {
        let channels = [
            (channel::EMAIL, true),
            (channel::IN_APP, true),
            (channel::PUSH, true),
            (channel::WHATSAPP, true),
            (channel::SMS, false),
        ]
        .into_iter()
        .map(|(name, enabled)| (name.to_string(), enabled))
        .collect();

        PreferenceMatrix::new("*", channels)
            .with_event_override(
                "security_alert",
                [
                    (channel::EMAIL, true),
                    (channel::IN_APP, true),
                    (channel::PUSH, true),
                    (channel::WHATSAPP, false),
                    (channel::SMS, false),
                ],
            )
            .with_event_override(
                "message_received",
                [
                    (channel::EMAIL, false),
                    (channel::IN_APP, true),
                    (channel::PUSH, true),
                    (channel::WHATSAPP, true),
                    (channel::SMS, false),
                ],
            )
            .with_event_override(
                "like",
                [
                    (channel::EMAIL, false),
                    (channel::IN_APP, true),
                    (channel::PUSH, false),
                    (channel::WHATSAPP, false),
                    (channel::SMS, false),
                ],
            )
    }

    pub fn insert(&self, matrix: PreferenceMatrix) {
        self.users.write().insert(matrix.user_id.clone(), matrix);
    }

    /// Make every lookup fail, as if the backing database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<PreferenceMatrix>> {
        if *self.unavailable.read() {
            return Err(Error::Database("preference store unavailable".to_string()));
        }
        if let Some(matrix) = self.users.read().get(user_id) {
            return Ok(Some(matrix.clone()));
        }
        Ok(self.fallback.as_ref().map(|template| PreferenceMatrix {
            user_id: user_id.to_string(),
            ..template.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = InMemoryPreferenceStore::new();
        store.insert(PreferenceMatrix::new("u1", BTreeMap::new()).with_channel("sms", true));

        let found = store.get_preferences("u1").await.unwrap().unwrap();
        assert_eq!(found.channels.get("sms"), Some(&true));
        assert!(store.get_preferences("u2").await.unwrap().is_none());

        store.set_unavailable(true);
        assert!(store.get_preferences("u1").await.is_err());
    }

    #[tokio::test]
    async fn test_fallback_answers_unknown_users() {
        let store = InMemoryPreferenceStore::with_fallback(InMemoryPreferenceStore::mock_matrix());
        store.insert(PreferenceMatrix::new("u1", BTreeMap::new()).opted_out());

        assert!(!store.get_preferences("u1").await.unwrap().unwrap().global_opt_in);

        let other = store.get_preferences("u2").await.unwrap().unwrap();
        assert_eq!(other.user_id, "u2");
        assert_eq!(other.channels.get(channel::PUSH), Some(&true));
        assert_eq!(other.channels_for("like").get(channel::EMAIL), Some(&false));
    }
}
