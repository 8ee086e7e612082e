//! Notification records as they travel through the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Priority;
use crate::{Error, Result};

/// A notification event consumed from one of the band topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Opaque notification identifier.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Event type tag (e.g. `security_alert`, `like`).
    pub event_type: String,
    /// Optional free-text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Arbitrary key/value metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// Creation time, seconds since the Unix epoch.
    #[serde(default)]
    pub created_at: i64,
    /// Priority tag. Overwritten by the reader with its band.
    #[serde(default, deserialize_with = "Priority::deserialize_lenient")]
    pub priority: Priority,
}

impl NotificationRecord {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        event_type: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            event_type: event_type.into(),
            content: None,
            metadata: Map::new(),
            created_at: chrono::Utc::now().timestamp(),
            priority,
        }
    }

    /// Decode a JSON payload and check the required identity fields.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let record: Self = serde_json::from_slice(payload)?;
        record.validate()?;
        Ok(record)
    }

    /// Reject records that cannot be keyed or routed.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("notification ID is required"));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::validation("user ID is required"));
        }
        if self.event_type.trim().is_empty() {
            return Err(Error::validation("event type is required"));
        }
        Ok(())
    }

    /// Stamp the band this record was received on.
    pub fn with_priority(mut self, band: Priority) -> Self {
        self.priority = band;
        self
    }
}

/// A record that passed admission, together with the channels to deliver to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedNotification {
    #[serde(flatten)]
    pub record: NotificationRecord,
    /// Delivery channels in stable order.
    pub channels: Vec<String>,
}

impl ProcessedNotification {
    pub fn new(record: NotificationRecord, channels: impl IntoIterator<Item = String>) -> Self {
        Self {
            record,
            channels: channels.into_iter().collect(),
        }
    }

    /// Partition key on the delivery topic.
    pub fn key(&self) -> &str {
        &self.record.user_id
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_record() {
        let payload = br#"{
            "id": "n-1",
            "user_id": "u1",
            "event_type": "security_alert",
            "content": "new login",
            "metadata": {"ip": "10.0.0.1"},
            "created_at": 1700000000,
            "priority": "high"
        }"#;

        let record = NotificationRecord::decode(payload).unwrap();
        assert_eq!(record.id, "n-1");
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.content.as_deref(), Some("new login"));
        assert_eq!(record.metadata.get("ip"), Some(&Value::from("10.0.0.1")));
        assert_eq!(record.priority, Priority::High);
    }

    #[test]
    fn test_decode_missing_or_unknown_priority() {
        let missing = br#"{"id":"n-1","user_id":"u1","event_type":"like","created_at":1}"#;
        assert_eq!(
            NotificationRecord::decode(missing).unwrap().priority,
            Priority::Low
        );

        let unknown =
            br#"{"id":"n-1","user_id":"u1","event_type":"like","created_at":1,"priority":"urgent"}"#;
        assert_eq!(
            NotificationRecord::decode(unknown).unwrap().priority,
            Priority::Low
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            NotificationRecord::decode(b"not json"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_user() {
        let payload = br#"{"id":"n-1","user_id":"","event_type":"like","created_at":1}"#;
        assert!(matches!(
            NotificationRecord::decode(payload),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_with_priority_overwrites_tag() {
        let record = NotificationRecord::new("n-1", "u1", "like", Priority::High)
            .with_priority(Priority::Low);
        assert_eq!(record.priority, Priority::Low);
    }

    #[test]
    fn test_processed_notification_is_flat() {
        let record = NotificationRecord::new("n-1", "u1", "comment", Priority::Medium);
        let processed = ProcessedNotification::new(record, vec!["email".to_string()]);

        let value: Value = serde_json::from_str(&processed.to_json().unwrap()).unwrap();
        assert_eq!(value["user_id"], "u1");
        assert_eq!(value["priority"], "medium");
        assert_eq!(value["channels"][0], "email");
        assert_eq!(processed.key(), "u1");
    }
}
