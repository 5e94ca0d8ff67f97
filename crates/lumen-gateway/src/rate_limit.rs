use chrono::Utc;
use dashmap::DashMap;

/// Fixed-window per-user request counter.
///
/// Windows are aligned to wall-clock minutes; state lives in memory and
/// resets on restart, which is the intended floor (not a billing meter).
pub struct RateLimiter {
    limit: u32,
    windows: DashMap<String, (i64, u32)>,
}

pub struct RateLimited;

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            limit: requests_per_minute.max(1),
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), RateLimited> {
        let minute = Utc::now().timestamp() / 60;
        let mut entry = self.windows.entry(key.to_string()).or_insert((minute, 0));
        let (window, count) = *entry;

        if window != minute {
            *entry = (minute, 1);
            return Ok(());
        }
        if count >= self.limit {
            return Err(RateLimited);
        }
        *entry = (window, count + 1);
        Ok(())
    }

    /// Drop stale windows (periodic sweep).
    pub fn cleanup(&self) {
        let minute = Utc::now().timestamp() / 60;
        self.windows.retain(|_, (window, _)| *window >= minute - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("alice").is_err());
    }

    #[test]
    fn users_have_independent_windows() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("alice").is_ok());
        assert!(limiter.check("bob").is_ok());
        assert!(limiter.check("alice").is_err());
    }
}
