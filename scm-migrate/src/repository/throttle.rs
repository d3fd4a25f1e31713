//! Rate limiting and bounded retry as a [`Repository`] decorator.
//!
//! Every call first takes a token from a shared bucket, then runs against the
//! inner repository. Transient failures are retried with exponential backoff
//! until the policy's attempt budget is spent; anything else returns at once.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::{EntityPage, RepoResult, Repository};
use crate::model::{Container, Entity, EntityType};

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Token bucket shared by every call through one decorator.
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens per second; `None` disables limiting.
    rate: Option<f64>,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Allow `requests_per_minute` sustained, with bursts of up to `burst`.
    /// A rate of zero disables limiting.
    pub fn per_minute(requests_per_minute: u32, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        let rate = (requests_per_minute > 0).then(|| f64::from(requests_per_minute) / 60.0);
        Self {
            rate,
            capacity,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::per_minute(0, 1)
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        let Some(rate) = self.rate else {
            return;
        };
        // Waiters queue on the lock, so tokens are handed out in arrival order.
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket, rate);
        if bucket.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - bucket.tokens) / rate);
            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            sleep(wait).await;
            self.refill(&mut bucket, rate);
        }
        bucket.tokens -= 1.0;
    }

    fn refill(&self, bucket: &mut Bucket, rate: f64) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(self.capacity);
        bucket.last = now;
    }
}

/// Exponential backoff with a capped number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; `1` disables retry.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Back-off to wait after `attempt` failed attempts, or `None` once the
    /// budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// Wraps a repository with a [`RateLimiter`] and a [`RetryPolicy`].
#[derive(Debug)]
pub struct ThrottledRepository<R> {
    inner: R,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl<R: Repository> ThrottledRepository<R> {
    pub fn new(inner: R, limiter: RateLimiter, retry: RetryPolicy) -> Self {
        Self {
            inner,
            limiter,
            retry,
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> RepoResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = RepoResult<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => match self.retry.delay_for(attempt) {
                    Some(delay) => {
                        warn!(
                            operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "transient repository error, retrying"
                        );
                        sleep(delay).await;
                    }
                    None => {
                        warn!(operation, attempt, error = %err, "retry budget exhausted");
                        return Err(err);
                    }
                },
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<R: Repository> Repository for ThrottledRepository<R> {
    async fn list_containers(&self) -> RepoResult<Vec<Container>> {
        self.call("list_containers", move || self.inner.list_containers())
            .await
    }

    async fn list_entities(
        &self,
        container: &Container,
        entity_type: EntityType,
        page_token: Option<&str>,
    ) -> RepoResult<EntityPage> {
        self.call("list_entities", move || {
            self.inner.list_entities(container, entity_type, page_token)
        })
        .await
    }

    async fn upsert_entity(&self, entity: &Entity) -> RepoResult<Entity> {
        self.call("upsert_entity", move || self.inner.upsert_entity(entity))
            .await
    }
}
