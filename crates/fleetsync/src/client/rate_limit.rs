use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::errors::ClientError;

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default request budgets per external API.
pub mod rate_limits {
    /// Kandji tolerates fairly high request rates.
    pub const DIRECTORY_DEFAULT_RPS: f64 = 10.0;
    /// Cloudflare has stricter limits on the Gateway API.
    pub const COLLECTION_DEFAULT_RPS: f64 = 4.0;
    /// Burst capacity shared by both defaults.
    pub const DEFAULT_BURST: u32 = 5;
}

/// Which external API a request is bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatePool {
    /// The device directory (MDM).
    Directory,
    /// The access-control collection service.
    Collection,
}

/// Steady-state rate and burst capacity for one pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBudget {
    pub requests_per_second: f64,
    pub burst: u32,
}

impl RateBudget {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            requests_per_second,
            burst,
        }
    }

    /// Build a governor quota, rejecting non-positive rates and zero bursts.
    fn quota(self) -> Result<Quota, RateBudgetError> {
        let rps = self.requests_per_second;
        if !rps.is_finite() || rps <= 0.0 {
            return Err(RateBudgetError::InvalidRate(rps));
        }
        let burst = NonZeroU32::new(self.burst).ok_or(RateBudgetError::ZeroBurst)?;
        let period =
            Duration::try_from_secs_f64(1.0 / rps).map_err(|_| RateBudgetError::InvalidRate(rps))?;
        Quota::with_period(period)
            .map(|q| q.allow_burst(burst))
            .ok_or(RateBudgetError::InvalidRate(rps))
    }
}

/// Invalid rate budget configuration.
#[derive(Debug, Error, PartialEq)]
pub enum RateBudgetError {
    #[error("requests per second must be a positive number, got {0}")]
    InvalidRate(f64),

    #[error("burst capacity must be greater than zero")]
    ZeroBurst,
}

/// Two independent token buckets, one per external API.
///
/// Cloning is cheap and clones share the same buckets.
///
/// # Example
///
/// ```ignore
/// use fleetsync::client::{RateBudget, RateGovernor, RatePool};
///
/// let governor = RateGovernor::new(RateBudget::new(10.0, 5), RateBudget::new(4.0, 5))?;
///
/// // Before each API call:
/// governor.acquire(RatePool::Collection, &cancel).await?;
/// ```
#[derive(Clone)]
pub struct RateGovernor {
    directory: Arc<GovernorRateLimiter>,
    collection: Arc<GovernorRateLimiter>,
}

impl RateGovernor {
    /// Create a governor with the given budgets.
    pub fn new(directory: RateBudget, collection: RateBudget) -> Result<Self, RateBudgetError> {
        Ok(Self {
            directory: Arc::new(RateLimiter::direct(directory.quota()?)),
            collection: Arc::new(RateLimiter::direct(collection.quota()?)),
        })
    }

    fn limiter(&self, pool: RatePool) -> &GovernorRateLimiter {
        match pool {
            RatePool::Directory => &self.directory,
            RatePool::Collection => &self.collection,
        }
    }

    /// Wait until a token is available in `pool`.
    ///
    /// Returns [`ClientError::Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, pool: RatePool, cancel: &CancellationToken) -> Result<(), ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            _ = self.limiter(pool).until_ready() => Ok(()),
        }
    }

    /// Take a token from `pool` if one is available right now.
    pub fn try_acquire(&self, pool: RatePool) -> bool {
        self.limiter(pool).check().is_ok()
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        let burst = NonZeroU32::new(rate_limits::DEFAULT_BURST).unwrap_or(NonZeroU32::MIN);
        let quota = |rps: f64| {
            Quota::with_period(Duration::from_secs_f64(1.0 / rps))
                .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
                .allow_burst(burst)
        };
        Self {
            directory: Arc::new(RateLimiter::direct(quota(rate_limits::DIRECTORY_DEFAULT_RPS))),
            collection: Arc::new(RateLimiter::direct(quota(rate_limits::COLLECTION_DEFAULT_RPS))),
        }
    }
}

impl std::fmt::Debug for RateGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGovernor").finish_non_exhaustive()
    }
}
