//! Preference repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{ChannelPreferenceDbModel, EventPreferenceDbModel, UserDbModel};
use crate::domain::PreferenceMatrix;

/// Lookup of per-user delivery preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// `Ok(None)` means the user has no stored preferences.
    async fn get_preferences(&self, user_id: &str) -> Result<Option<PreferenceMatrix>>;
}

/// SQLx implementation of [`PreferenceStore`].
pub struct SqlxPreferenceStore {
    pool: SqlitePool,
    /// Base channel map for known users. Stored channel rows overlay it.
    base_channels: BTreeMap<String, bool>,
}

impl SqlxPreferenceStore {
    pub fn new(pool: SqlitePool, base_channels: BTreeMap<String, bool>) -> Self {
        Self {
            pool,
            base_channels,
        }
    }

    pub async fn upsert_user(&self, user_id: &str, global_opt_in: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, global_opt_in) VALUES (?, ?)
            ON CONFLICT(id) DO UPDATE SET global_opt_in = excluded.global_opt_in
            "#,
        )
        .bind(user_id)
        .bind(global_opt_in)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_channel(&self, user_id: &str, channel: &str, enabled: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_channel_preferences (user_id, channel_name, enabled) VALUES (?, ?, ?)
            ON CONFLICT(user_id, channel_name) DO UPDATE SET enabled = excluded.enabled
            "#,
        )
        .bind(user_id)
        .bind(channel)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_event_channel(
        &self,
        user_id: &str,
        event_type: &str,
        channel: &str,
        enabled: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_event_preferences (user_id, event_type, channel_name, enabled)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, event_type, channel_name) DO UPDATE SET enabled = excluded.enabled
            "#,
        )
        .bind(user_id)
        .bind(event_type)
        .bind(channel)
        .bind(enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for SqlxPreferenceStore {
    async fn get_preferences(&self, user_id: &str) -> Result<Option<PreferenceMatrix>> {
        let Some(user) =
            sqlx::query_as::<_, UserDbModel>("SELECT id, global_opt_in FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
        else {
            return Ok(None);
        };

        let channel_rows = sqlx::query_as::<_, ChannelPreferenceDbModel>(
            "SELECT user_id, channel_name, enabled FROM user_channel_preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let event_rows = sqlx::query_as::<_, EventPreferenceDbModel>(
            r#"
            SELECT user_id, event_type, channel_name, enabled
            FROM user_event_preferences
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut matrix = PreferenceMatrix::new(user.id, self.base_channels.clone());
        matrix.global_opt_in = user.global_opt_in;
        for row in channel_rows {
            matrix.channels.insert(row.channel_name, row.enabled);
        }
        for row in event_rows {
            matrix
                .event_types
                .entry(row.event_type)
                .or_default()
                .insert(row.channel_name, row.enabled);
        }

        Ok(Some(matrix))
    }
}
