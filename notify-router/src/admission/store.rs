//! Counter store abstraction.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Outcome of a window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admitted,
    /// The user's count reached the band limit.
    UserLimited,
    /// The (user, event type) count reached the event type cap.
    EventTypeLimited,
}

impl Verdict {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::UserLimited => "user_limited",
            Self::EventTypeLimited => "event_type_limited",
        }
    }
}

/// Decision together with the counts observed before any marker was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    pub verdict: Verdict,
    pub user_count: u64,
    pub event_count: u64,
}

/// One admission check against both subjects.
#[derive(Debug, Clone)]
pub struct WindowCheck {
    pub user_key: String,
    pub event_key: String,
    /// Marker member, unique per check.
    pub member: String,
    /// Current time in milliseconds. Also the score of the new marker.
    pub now_ms: i64,
    pub window: Duration,
    pub user_limit: u64,
    /// `None` when the event type has no cap.
    pub event_limit: Option<u64>,
}

impl WindowCheck {
    /// Markers scored at or below this are outside the window.
    pub fn cutoff_ms(&self) -> i64 {
        self.now_ms - self.window.as_millis() as i64
    }

    /// Keys expire after twice the window when untouched.
    pub fn ttl(&self) -> Duration {
        self.window * 2
    }

    /// Compare observed counts with the limits.
    pub fn judge(&self, user_count: u64, event_count: u64) -> WindowDecision {
        let verdict = if user_count >= self.user_limit {
            Verdict::UserLimited
        } else if self.event_limit.is_some_and(|cap| event_count >= cap) {
            Verdict::EventTypeLimited
        } else {
            Verdict::Admitted
        };
        WindowDecision {
            verdict,
            user_count,
            event_count,
        }
    }
}

/// Sorted-set style store holding timestamped markers per subject key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Remove markers scored at or below `cutoff_ms`. Returns how many were removed.
    async fn remove_older_than(&self, key: &str, cutoff_ms: i64) -> Result<u64>;

    /// Number of markers under `key`.
    async fn count(&self, key: &str) -> Result<u64>;

    /// Add a marker with the given score.
    async fn add(&self, key: &str, member: &str, score_ms: i64) -> Result<()>;

    /// Set the key's time to live.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Purge, count, compare and record as one operation.
    ///
    /// The default runs the primitives one after another, so two concurrent
    /// checks can both observe a count just below the limit. Stores that can
    /// do better override it.
    async fn check_and_record(&self, check: &WindowCheck) -> Result<WindowDecision> {
        let cutoff = check.cutoff_ms();
        self.remove_older_than(&check.user_key, cutoff).await?;
        self.remove_older_than(&check.event_key, cutoff).await?;

        let user_count = self.count(&check.user_key).await?;
        let event_count = self.count(&check.event_key).await?;

        let decision = check.judge(user_count, event_count);
        if !decision.verdict.is_admitted() {
            return Ok(decision);
        }

        let ttl = check.ttl();
        self.add(&check.user_key, &check.member, check.now_ms).await?;
        self.add(&check.event_key, &check.member, check.now_ms).await?;
        self.expire(&check.user_key, ttl).await?;
        self.expire(&check.event_key, ttl).await?;

        Ok(decision)
    }
}
