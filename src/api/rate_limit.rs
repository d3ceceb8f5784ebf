use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

pub struct RateLimiter {
    capacity: u32,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            capacity: per_minute.max(1),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn try_acquire(&self, ip: IpAddr) -> bool {
        self.try_acquire_at(ip, Instant::now())
    }

    fn try_acquire_at(&self, ip: IpAddr, now: Instant) -> bool {
        let Ok(mut buckets) = self.buckets.lock() else {
            return true;
        };
        let bucket = buckets.entry(ip).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refill = (elapsed.as_secs_f64() * self.capacity as f64 / 60.0) as u32;
        if refill > 0 {
            bucket.tokens = bucket.tokens.saturating_add(refill).min(self.capacity);
            bucket.last_refill = now;
        }

        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.try_acquire(addr.ip()) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Try again later.",
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(last_octet: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last_octet])
    }

    #[test]
    fn bucket_exhausts_at_capacity() {
        let limiter = RateLimiter::new(3);
        let now = Instant::now();
        assert!(limiter.try_acquire_at(addr(1), now));
        assert!(limiter.try_acquire_at(addr(1), now));
        assert!(limiter.try_acquire_at(addr(1), now));
        assert!(!limiter.try_acquire_at(addr(1), now));
    }

    #[test]
    fn bucket_refills_with_elapsed_time() {
        let limiter = RateLimiter::new(60);
        let start = Instant::now();
        for _ in 0..60 {
            assert!(limiter.try_acquire_at(addr(1), start));
        }
        assert!(!limiter.try_acquire_at(addr(1), start));

        // One second at 60/min refills a single token.
        let later = start + Duration::from_secs(1);
        assert!(limiter.try_acquire_at(addr(1), later));
        assert!(!limiter.try_acquire_at(addr(1), later));
    }

    #[test]
    fn addresses_have_independent_buckets() {
        let limiter = RateLimiter::new(1);
        let now = Instant::now();
        assert!(limiter.try_acquire_at(addr(1), now));
        assert!(!limiter.try_acquire_at(addr(1), now));
        assert!(limiter.try_acquire_at(addr(2), now));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        assert!(limiter.try_acquire_at(addr(1), start));

        let much_later = start + Duration::from_secs(3600);
        assert!(limiter.try_acquire_at(addr(1), much_later));
        assert!(limiter.try_acquire_at(addr(1), much_later));
        assert!(!limiter.try_acquire_at(addr(1), much_later));
    }
}
