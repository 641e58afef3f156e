//! Fixed-window request quotas keyed by client IP + operation prefix.
//!
//! Redis is the source of truth; on Redis failure the limiter degrades to
//! an in-process sharded counter map so sensitive endpoints stay guarded.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct RateLimitService {
    redis_pool: deadpool_redis::Pool,
    local_counters: Arc<DashMap<String, (u64, Instant)>>,
    disabled: bool,
}

impl RateLimitService {
    pub fn new(redis_pool: deadpool_redis::Pool) -> Self {
        Self {
            redis_pool,
            local_counters: Arc::new(DashMap::new()),
            disabled: false,
        }
    }

    /// Test-only construction with rate limiting switched off.
    pub fn disabled(redis_pool: deadpool_redis::Pool) -> Self {
        Self {
            redis_pool,
            local_counters: Arc::new(DashMap::new()),
            disabled: true,
        }
    }

    pub async fn check(
        &self,
        prefix: &str,
        client_id: &str,
        limit: u64,
        window: Duration,
    ) -> Result<()> {
        if self.disabled {
            return Ok(());
        }
        let key = format!("spc:rate:{}:{}", prefix, client_id);

        let allowed = match self.consume_redis_quota(&key, limit, window).await {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::debug!(error = %err, key = %key, "rate limiter falling back to local counters");
                self.consume_local_quota(&key, limit, window)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(AppError::RateLimited {
                prefix: prefix.to_string(),
            })
        }
    }

    async fn consume_redis_quota(&self, key: &str, limit: u64, window: Duration) -> Result<bool> {
        let mut conn = self.redis_pool.get().await?;
        let current: u64 = redis::cmd("INCR").arg(key).query_async(&mut conn).await?;
        if current == 1 {
            let _: () = redis::cmd("EXPIRE")
                .arg(key)
                .arg(window.as_secs())
                .query_async(&mut conn)
                .await?;
        }
        Ok(current <= limit)
    }

    fn consume_local_quota(&self, key: &str, limit: u64, window: Duration) -> bool {
        let now = Instant::now();
        let mut entry = self
            .local_counters
            .entry(key.to_string())
            .or_insert((0, now + window));
        let (count, reset_at) = *entry;
        let (mut count, mut reset_at) = (count, reset_at);
        if now >= reset_at {
            count = 0;
            reset_at = now + window;
        }
        count += 1;
        *entry = (count, reset_at);
        count <= limit
    }
}

/// Resolve a best-effort client identity from connection info + proxy
/// headers.
pub fn client_identifier(headers: &axum::http::HeaderMap, peer_ip: Option<std::net::IpAddr>) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer_ip
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
