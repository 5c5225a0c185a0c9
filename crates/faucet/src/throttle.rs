//! HTTP request throttling, independent of the claim rules.

use crate::error::{FaucetError, FaucetResult};
use governor::{
    clock::{Clock as _, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use moka::future::Cache;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Rate limiter using governor crate
type RateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Upper bound on tracked client IPs
const MAX_TRACKED_IPS: u64 = 10_000;

/// Global quota as a multiple of the per-IP quota
const GLOBAL_QUOTA_FACTOR: u32 = 100;

pub struct RequestThrottle {
    global: RateLimiterImpl,
    per_ip: Cache<IpAddr, Arc<RateLimiterImpl>>,
    per_ip_quota: Quota,
    clock: DefaultClock,
}

impl RequestThrottle {
    pub fn per_minute(max_requests_per_minute: u32) -> FaucetResult<Self> {
        let per_ip = NonZeroU32::new(max_requests_per_minute).ok_or_else(|| {
            FaucetError::InvalidConfig("max_requests_per_minute must be positive".into())
        })?;
        let global = per_ip.saturating_mul(
            NonZeroU32::new(GLOBAL_QUOTA_FACTOR).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            global: RateLimiter::direct(Quota::per_minute(global)),
            per_ip: Cache::builder()
                .max_capacity(MAX_TRACKED_IPS)
                .time_to_idle(Duration::from_secs(600))
                .build(),
            per_ip_quota: Quota::per_minute(per_ip),
            clock: DefaultClock::default(),
        })
    }

    /// Admits one request from `ip`, or reports how long to wait.
    pub async fn check(&self, ip: IpAddr) -> FaucetResult<()> {
        if let Err(not_until) = self.global.check() {
            return Err(FaucetError::RateLimitExceeded(self.wait_secs(not_until.wait_time_from(self.clock.now()))));
        }

        let quota = self.per_ip_quota;
        let limiter = self
            .per_ip
            .get_with(ip, async move { Arc::new(RateLimiter::direct(quota)) })
            .await;

        limiter.check().map_err(|not_until| {
            debug!("Request throttled for IP: {}", ip);
            FaucetError::RateLimitExceeded(self.wait_secs(not_until.wait_time_from(self.clock.now())))
        })
    }

    fn wait_secs(&self, wait: Duration) -> u64 {
        wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
    }
}
