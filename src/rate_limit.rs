//! C9 rate-limit half: a sliding-window limiter per `(agent, tool
//! category)`, generalizing the teacher's per-IP `RateLimiter` (one
//! `Vec<Instant>` per key, pruned on each check) to per-role multipliers
//! so an `admin` gets more headroom than a `reader` on the same tool.

use crate::room::model::Role;
use crate::tools::ToolCategory;
use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Base requests-per-window for a `worker` role; `reader` gets half,
    /// `admin` gets triple, floored at 1.
    pub core_max: usize,
    pub core_window_secs: u64,
    pub communication_max: usize,
    pub communication_window_secs: u64,
    pub default_max: usize,
    pub default_window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            core_max: 120,
            core_window_secs: 60,
            communication_max: 30,
            communication_window_secs: 60,
            default_max: 60,
            default_window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var("MASC_RATE_LIMIT_CORE")
            && let Ok(n) = val.parse()
        {
            config.core_max = n;
        }
        if let Ok(val) = env::var("MASC_RATE_LIMIT_COMMUNICATION")
            && let Ok(n) = val.parse()
        {
            config.communication_max = n;
        }
        if let Ok(val) = env::var("MASC_RATE_LIMIT_DEFAULT")
            && let Ok(n) = val.parse()
        {
            config.default_max = n;
        }
        config
    }

    fn base_for(&self, category: ToolCategory) -> (usize, u64) {
        match category {
            ToolCategory::Core => (self.core_max, self.core_window_secs),
            ToolCategory::Communication => (self.communication_max, self.communication_window_secs),
            _ => (self.default_max, self.default_window_secs),
        }
    }

    /// reader 0.5x, worker 1x, admin 2x, expressed over a /2 base so the
    /// multiplier stays integral.
    fn role_multiplier_half(role: Role) -> usize {
        match role {
            Role::Reader => 1,
            Role::Worker => 2,
            Role::Admin => 4,
        }
    }

    /// Effective (max, window_secs) for a role calling into a category.
    pub fn effective(&self, category: ToolCategory, role: Role) -> (usize, u64) {
        let (base, window) = self.base_for(category);
        ((base * Self::role_multiplier_half(role) / 2).max(1), window)
    }
}

pub struct RateLimitInfo {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { buckets: Mutex::new(HashMap::new()) }
    }

    /// `key` is typically `"{agent}:{category}"`.
    pub fn check(&self, key: &str, max: usize, window_secs: u64) -> RateLimitInfo {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let window = Duration::from_secs(window_secs);
        let entries = buckets.entry(key.to_string()).or_default();
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() >= max {
            let oldest = entries.iter().min().copied().unwrap_or(now);
            let elapsed = now.duration_since(oldest);
            let retry_after = if elapsed < window { (window - elapsed).as_secs() + 1 } else { 1 };
            return RateLimitInfo { allowed: false, limit: max, remaining: 0, retry_after_secs: retry_after };
        }

        entries.push(now);
        RateLimitInfo { allowed: true, limit: max, remaining: max - entries.len(), retry_after_secs: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_gets_more_headroom_than_reader() {
        let config = RateLimitConfig::default();
        let (reader_max, _) = config.effective(ToolCategory::Core, Role::Reader);
        let (admin_max, _) = config.effective(ToolCategory::Core, Role::Admin);
        assert!(admin_max > reader_max);
    }

    #[test]
    fn exhausts_then_recovers_after_window() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("a:core", 1, 60).allowed);
        let second = limiter.check("a:core", 1, 60);
        assert!(!second.allowed);
        assert!(second.retry_after_secs > 0);
    }
}
