use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::entity::source::Source;

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default request pacing per provider (requests per second).
pub mod rate_limits {
    /// GitHub: 5000 requests/hour for a token; 10/sec leaves room for bursts.
    pub const GITHUB_DEFAULT_RPS: u32 = 10;
    /// Bitbucket: 1000 requests/hour per user on repository data.
    pub const BITBUCKET_DEFAULT_RPS: u32 = 5;
}

/// Default pacing for a source.
pub fn default_rps_for_source(source: Source) -> u32 {
    match source {
        Source::GitHub => rate_limits::GITHUB_DEFAULT_RPS,
        Source::BitbucketCloud => rate_limits::BITBUCKET_DEFAULT_RPS,
    }
}

/// Proactive request pacing shared by every call a connector makes.
///
/// This only spaces requests out. Throttling responses from the provider are
/// still surfaced as [`super::ConnectorError::RateLimited`].
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a limiter allowing `requests_per_second` (0 is treated as 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until the next request is allowed.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}
