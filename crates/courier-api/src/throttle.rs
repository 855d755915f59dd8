use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window request counter keyed by client address.
/// A limit of zero disables limiting.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a hit for `key`. Returns `false` if the window is already full.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        let queue = hits.entry(key.to_string()).or_default();
        while queue
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            queue.pop_front();
        }

        if queue.len() >= self.limit {
            return false;
        }
        queue.push_back(now);

        // Forget idle clients so the map does not grow without bound
        if hits.len() > 4096 {
            let window = self.window;
            hits.retain(|_, q| q.back().is_some_and(|t| now.duration_since(*t) < window));
        }
        true
    }
}

/// Range of UTC hours during which chat endpoints are closed. `start..end`,
/// wrapping past midnight when `start > end` (e.g. `21-6`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl AccessWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl FromStr for AccessWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("expected START-END, got '{s}'"))?;
        let parse = |v: &str| -> Result<u32, String> {
            let h: u32 = v.trim().parse().map_err(|_| format!("invalid hour '{v}'"))?;
            if h > 23 {
                return Err(format!("hour out of range: {h}"));
            }
            Ok(h)
        };
        Ok(Self {
            start_hour: parse(start)?,
            end_hour: parse(end)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_rejects_after_limit_within_window() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let t0 = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at("1.2.3.4", t0));
        }
        assert!(!limiter.check_at("1.2.3.4", t0 + Duration::from_secs(30)));
        // Other clients are unaffected
        assert!(limiter.check_at("5.6.7.8", t0));
        // Once the window slides past the first hits, requests are allowed again
        assert!(limiter.check_at("1.2.3.4", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn zero_limit_disables() {
        let limiter = RateLimiter::new(0, Duration::from_secs(1));
        for _ in 0..100 {
            assert!(limiter.check("x"));
        }
    }

    #[test]
    fn window_parses_and_wraps() {
        let day: AccessWindow = "6-21".parse().unwrap();
        assert!(day.contains(6));
        assert!(day.contains(20));
        assert!(!day.contains(21));
        assert!(!day.contains(3));

        let night: AccessWindow = "21-6".parse().unwrap();
        assert!(night.contains(23));
        assert!(night.contains(0));
        assert!(!night.contains(6));
        assert!(!night.contains(12));

        assert!("25-3".parse::<AccessWindow>().is_err());
        assert!("nine".parse::<AccessWindow>().is_err());
    }
}
