//! Admission decisions for notification records.

use std::sync::Arc;

use tracing::debug;

use super::store::{CounterStore, WindowCheck, WindowDecision};
use crate::Result;
use crate::config::AdmissionConfig;
use crate::domain::{NotificationRecord, Priority};

/// Counter key for a user subject.
pub fn user_key(user_id: &str) -> String {
    format!("rate:user:{{{}}}", user_id)
}

/// Counter key for a (user, event type) subject. Shares the user's hash tag.
pub fn event_key(user_id: &str, event_type: &str) -> String {
    format!("rate:user:{{{}}}:event:{}", user_id, event_type)
}

/// Decides whether a record may proceed based on recent activity.
pub struct AdmissionController {
    store: Arc<dyn CounterStore>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn CounterStore>, config: AdmissionConfig) -> Self {
        Self { store, config }
    }

    pub fn limit_for(&self, band: Priority) -> u64 {
        self.config.limit_for(band)
    }

    /// `Ok(false)` means rate limited. Store failures are returned as errors.
    pub async fn admit(&self, record: &NotificationRecord) -> Result<bool> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let decision = self.check_at(record, now_ms).await?;
        Ok(decision.verdict.is_admitted())
    }

    /// Run the window check as of `now_ms`.
    pub async fn check_at(&self, record: &NotificationRecord, now_ms: i64) -> Result<WindowDecision> {
        let check = WindowCheck {
            user_key: user_key(&record.user_id),
            event_key: event_key(&record.user_id, &record.event_type),
            member: uuid::Uuid::new_v4().to_string(),
            now_ms,
            window: self.config.window(),
            user_limit: self.limit_for(record.priority),
            event_limit: self.config.cap_for(&record.event_type),
        };

        let decision = self.store.check_and_record(&check).await?;
        if !decision.verdict.is_admitted() {
            debug!(
                record_id = %record.id,
                user_id = %record.user_id,
                event_type = %record.event_type,
                band = %record.priority,
                verdict = decision.verdict.as_str(),
                user_count = decision.user_count,
                event_count = decision.event_count,
                "Rate limit reached"
            );
        }
        Ok(decision)
    }
}
