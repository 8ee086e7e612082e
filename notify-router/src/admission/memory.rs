//! In-memory counter store for mock mode and tests.
//!
//! Expiry is tracked against a logical clock that follows the highest marker
//! score or check time seen so far, so tests can drive time explicitly.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::store::{CounterStore, WindowCheck, WindowDecision};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Subject {
    /// (member, score) pairs.
    markers: Vec<(String, i64)>,
    expires_at_ms: Option<i64>,
}

impl Subject {
    fn purge(&mut self, cutoff_ms: i64) -> u64 {
        let before = self.markers.len();
        self.markers.retain(|(_, score)| *score > cutoff_ms);
        (before - self.markers.len()) as u64
    }

    fn upsert(&mut self, member: &str, score_ms: i64) {
        match self.markers.iter_mut().find(|(m, _)| m == member) {
            Some(entry) => entry.1 = score_ms,
            None => self.markers.push((member.to_string(), score_ms)),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    subjects: HashMap<String, Subject>,
    clock_ms: i64,
    unavailable: bool,
}

impl State {
    fn advance(&mut self, now_ms: i64) {
        self.clock_ms = self.clock_ms.max(now_ms);
        let clock = self.clock_ms;
        self.subjects
            .retain(|_, s| s.expires_at_ms.is_none_or(|at| at > clock));
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(Error::counter_store("counter store unavailable"));
        }
        Ok(())
    }

    fn subject(&mut self, key: &str) -> &mut Subject {
        self.subjects.entry(key.to_string()).or_default()
    }

    fn count(&self, key: &str) -> u64 {
        self.subjects
            .get(key)
            .map_or(0, |s| s.markers.len() as u64)
    }

    fn expire(&mut self, key: &str, ttl: Duration) {
        let at = self.clock_ms + ttl.as_millis() as i64;
        if let Some(subject) = self.subjects.get_mut(key) {
            subject.expires_at_ms = Some(at);
        }
    }
}

/// Counter store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    state: Mutex<State>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `n` markers under `key`, scored at `score_ms`.
    pub fn seed(&self, key: &str, n: usize, score_ms: i64) {
        let mut state = self.state.lock();
        state.advance(score_ms);
        let subject = state.subject(key);
        for _ in 0..n {
            subject.upsert(&uuid::Uuid::new_v4().to_string(), score_ms);
        }
    }

    /// Current marker count without purging.
    pub fn peek(&self, key: &str) -> u64 {
        self.state.lock().count(key)
    }

    /// Expiry deadline of `key` on the logical clock, if set.
    pub fn expires_at(&self, key: &str) -> Option<i64> {
        self.state
            .lock()
            .subjects
            .get(key)
            .and_then(|s| s.expires_at_ms)
    }

    /// Make every operation fail, as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn remove_older_than(&self, key: &str, cutoff_ms: i64) -> Result<u64> {
        let mut state = self.state.lock();
        state.check_available()?;
        Ok(state.subjects.get_mut(key).map_or(0, |s| s.purge(cutoff_ms)))
    }

    async fn count(&self, key: &str) -> Result<u64> {
        let state = self.state.lock();
        state.check_available()?;
        Ok(state.count(key))
    }

    async fn add(&self, key: &str, member: &str, score_ms: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.advance(score_ms);
        state.subject(key).upsert(member, score_ms);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.expire(key, ttl);
        Ok(())
    }

    async fn check_and_record(&self, check: &WindowCheck) -> Result<WindowDecision> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.advance(check.now_ms);

        let cutoff = check.cutoff_ms();
        for key in [&check.user_key, &check.event_key] {
            if let Some(subject) = state.subjects.get_mut(key.as_str()) {
                subject.purge(cutoff);
            }
        }

        let decision = check.judge(state.count(&check.user_key), state.count(&check.event_key));
        if decision.verdict.is_admitted() {
            let ttl = check.ttl();
            for key in [&check.user_key, &check.event_key] {
                state.subject(key).upsert(&check.member, check.now_ms);
                state.expire(key, ttl);
            }
        }

        Ok(decision)
    }
}
