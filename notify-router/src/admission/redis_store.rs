//! Redis-backed counter store.
//!
//! Subjects are sorted sets scored by millisecond timestamps. The combined
//! check runs as a Lua script so concurrent routers cannot both slip under a
//! limit. Both keys of one check share a hash tag and land in the same slot.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::store::{CounterStore, Verdict, WindowCheck, WindowDecision};
use crate::config::CounterStoreConfig;
use crate::{Error, Result};

/// Returns `{code, user_count, event_count}` where code is 0 = admitted,
/// 1 = user limited, 2 = event type limited. An event limit of -1 means no cap.
const CHECK_AND_RECORD_SCRIPT: &str = r#"
local user_key = KEYS[1]
local event_key = KEYS[2]
local cutoff = ARGV[1]
local now = ARGV[2]
local user_limit = tonumber(ARGV[3])
local event_limit = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])
local member = ARGV[6]

redis.call('ZREMRANGEBYSCORE', user_key, '-inf', cutoff)
redis.call('ZREMRANGEBYSCORE', event_key, '-inf', cutoff)

local user_count = redis.call('ZCARD', user_key)
local event_count = redis.call('ZCARD', event_key)

if user_count >= user_limit then
    return {1, user_count, event_count}
end
if event_limit >= 0 and event_count >= event_limit then
    return {2, user_count, event_count}
end

redis.call('ZADD', user_key, now, member)
redis.call('ZADD', event_key, now, member)
redis.call('EXPIRE', user_key, ttl)
redis.call('EXPIRE', event_key, ttl)
return {0, user_count, event_count}
"#;

pub struct RedisCounterStore {
    conn: ConnectionManager,
    script: redis::Script,
}

impl RedisCounterStore {
    /// Connect and verify the server answers.
    pub async fn connect(config: &CounterStoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_info()?)?;
        let store = Self::with_client(client).await?;
        info!(addr = %config.addr, db = config.db, "Connected to counter store");
        Ok(store)
    }

    async fn with_client(client: redis::Client) -> Result<Self> {
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self {
            conn,
            script: redis::Script::new(CHECK_AND_RECORD_SCRIPT),
        })
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

fn decode_reply(reply: &[i64]) -> Result<WindowDecision> {
    let [code, user_count, event_count] = reply else {
        return Err(Error::counter_store(format!(
            "unexpected script reply of length {}",
            reply.len()
        )));
    };
    let verdict = match code {
        0 => Verdict::Admitted,
        1 => Verdict::UserLimited,
        2 => Verdict::EventTypeLimited,
        other => {
            return Err(Error::counter_store(format!(
                "unexpected script verdict {}",
                other
            )));
        }
    };
    Ok(WindowDecision {
        verdict,
        user_count: (*user_count).max(0) as u64,
        event_count: (*event_count).max(0) as u64,
    })
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn remove_older_than(&self, key: &str, cutoff_ms: i64) -> Result<u64> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.zrembyscore(key, "-inf", cutoff_ms).await?;
        Ok(removed)
    }

    async fn count(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.zcard(key).await?;
        Ok(count)
    }

    async fn add(&self, key: &str, member: &str, score_ms: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(key, member, score_ms).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.expire(key, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn check_and_record(&self, check: &WindowCheck) -> Result<WindowDecision> {
        let mut conn = self.conn.clone();
        let event_limit = check.event_limit.map_or(-1, |cap| cap as i64);

        let reply: Vec<i64> = self
            .script
            .key(&check.user_key)
            .key(&check.event_key)
            .arg(check.cutoff_ms())
            .arg(check.now_ms)
            .arg(check.user_limit)
            .arg(event_limit)
            .arg(ttl_secs(check.ttl()))
            .arg(&check.member)
            .invoke_async(&mut conn)
            .await?;

        decode_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reply() {
        let decision = decode_reply(&[0, 3, 1]).unwrap();
        assert_eq!(decision.verdict, Verdict::Admitted);
        assert_eq!(decision.user_count, 3);

        assert_eq!(
            decode_reply(&[2, 5, 20]).unwrap().verdict,
            Verdict::EventTypeLimited
        );
        assert!(decode_reply(&[7, 0, 0]).is_err());
        assert!(decode_reply(&[0, 1]).is_err());
    }

    #[test]
    fn test_ttl_rounds_up_to_one_second() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(7200)), 7200);
    }

    mod live {
        use super::*;
        use crate::admission::controller::{event_key, user_key};
        use crate::admission::store::CounterStore;
        use redis::AsyncCommands;

        const WINDOW: Duration = Duration::from_secs(3600);

        async fn store() -> RedisCounterStore {
            let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
            RedisCounterStore::with_client(redis::Client::open(url).unwrap())
                .await
                .expect("REDIS_URL must point at a running Redis")
        }

        fn check(user: &str, event_type: &str, now_ms: i64, user_limit: u64, cap: Option<u64>) -> WindowCheck {
            WindowCheck {
                user_key: user_key(user),
                event_key: event_key(user, event_type),
                member: uuid::Uuid::new_v4().to_string(),
                now_ms,
                window: WINDOW,
                user_limit,
                event_limit: cap,
            }
        }

        fn unique_user() -> String {
            format!("test-{}", uuid::Uuid::new_v4())
        }

        #[tokio::test]
        #[ignore = "needs a running Redis; set REDIS_URL and run with --ignored"]
        async fn test_script_rejects_at_limit_without_writing() {
            let store = store().await;
            let user = unique_user();
            let now = chrono::Utc::now().timestamp_millis();
            for i in 0..100 {
                store.add(&user_key(&user), &format!("m{}", i), now - 60_000).await.unwrap();
            }

            let decision = store
                .check_and_record(&check(&user, "security_alert", now, 100, None))
                .await
                .unwrap();

            assert_eq!(decision.verdict, Verdict::UserLimited);
            assert_eq!(decision.user_count, 100);
            assert_eq!(store.count(&user_key(&user)).await.unwrap(), 100);
            assert_eq!(store.count(&event_key(&user, "security_alert")).await.unwrap(), 0);
        }

        #[tokio::test]
        #[ignore = "needs a running Redis; set REDIS_URL and run with --ignored"]
        async fn test_script_applies_event_type_cap() {
            let store = store().await;
            let user = unique_user();
            let now = chrono::Utc::now().timestamp_millis();
            for i in 0..20 {
                store.add(&event_key(&user, "like"), &format!("l{}", i), now - 1_000).await.unwrap();
            }

            let like = store
                .check_and_record(&check(&user, "like", now, 100, Some(20)))
                .await
                .unwrap();
            assert_eq!(like.verdict, Verdict::EventTypeLimited);
            assert_eq!(store.count(&event_key(&user, "like")).await.unwrap(), 20);
            assert_eq!(store.count(&user_key(&user)).await.unwrap(), 0);

            let comment = store
                .check_and_record(&check(&user, "comment", now, 100, None))
                .await
                .unwrap();
            assert_eq!(comment.verdict, Verdict::Admitted);
            assert_eq!(store.count(&user_key(&user)).await.unwrap(), 1);
            assert_eq!(store.count(&event_key(&user, "comment")).await.unwrap(), 1);
        }

        #[tokio::test]
        #[ignore = "needs a running Redis; set REDIS_URL and run with --ignored"]
        async fn test_script_purges_at_cutoff_and_sets_expiry() {
            let store = store().await;
            let user = unique_user();
            let now = chrono::Utc::now().timestamp_millis();
            let window_check = check(&user, "comment", now, 2, None);
            let cutoff = window_check.cutoff_ms();
            store.add(&window_check.user_key, "at-cutoff", cutoff).await.unwrap();
            store.add(&window_check.user_key, "inside", cutoff + 1).await.unwrap();

            let decision = store.check_and_record(&window_check).await.unwrap();

            assert_eq!(decision.verdict, Verdict::Admitted);
            assert_eq!(decision.user_count, 1);
            assert_eq!(store.count(&window_check.user_key).await.unwrap(), 2);

            let mut conn = store.conn.clone();
            let ttl: i64 = conn.ttl(&window_check.user_key).await.unwrap();
            assert!(ttl > 0 && ttl <= ttl_secs(WINDOW * 2), "ttl {}", ttl);
        }
    }
}
