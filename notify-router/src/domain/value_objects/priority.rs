//! Priority value object.
//!
//! A priority doubles as the identity of a band: each priority class has its
//! own inbound topic, consumer group and staging buffer.

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

/// Priority class of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Security alerts, payment failures. Always considered first.
    High,
    /// Messages, friend requests, comments.
    Medium,
    /// Likes, follows, newsletters. Unknown event types land here too.
    #[default]
    Low,
}

impl Priority {
    /// All bands, highest first.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// Convert to wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Parse from wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Dense index, 0 for high.
    pub fn index(&self) -> usize {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    /// Get numeric value for sorting (higher = more important).
    pub fn numeric_value(&self) -> i32 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Bands strictly above this one, highest first.
    pub fn higher_bands(&self) -> &'static [Priority] {
        match self {
            Self::High => &[],
            Self::Medium => &[Priority::High],
            Self::Low => &[Priority::High, Priority::Medium],
        }
    }

    /// Deserialize a possibly missing or unknown tag, falling back to the default.
    ///
    /// The reader overwrites the tag with its band anyway, so an inconsistent
    /// upstream value must not turn an otherwise valid record into poison.
    pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(Self::parse).unwrap_or_default())
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric_value().cmp(&other.numeric_value())
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid priority: {}", s))
    }
}
