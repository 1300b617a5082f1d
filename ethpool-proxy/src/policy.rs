//! Anti-abuse policy.
//!
//! The dispatcher reports per-IP signals (malformed requests, share
//! outcomes, logins) to a [`Policy`] and acts on its allow/deny verdicts.
//! [`MemoryPolicy`] is the in-process implementation used by the daemon:
//! it keeps counters per IP and bans addresses that cross the configured
//! thresholds until the ban times out.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::PolicyConfig;
use crate::tracing::prelude::*;

/// Allow/deny decisions about miner behaviour, keyed by remote IP.
pub trait Policy: Send + Sync {
    /// Whether `login` may authenticate from `ip`.
    fn apply_login_policy(&self, login: &str, ip: &str) -> bool;

    /// Record a malformed request. Returns false once the IP is banned.
    fn apply_malformed_policy(&self, ip: &str) -> bool;

    /// Record a share outcome. Returns false when the IP exceeded its
    /// invalid-share budget or is banned.
    fn apply_share_policy(&self, ip: &str, valid: bool) -> bool;

    /// Whether the IP is currently banned.
    fn is_banned(&self, ip: &str) -> bool;

    /// Consume a connection token. Returns false when the IP is over its
    /// connection limit.
    fn apply_limit_policy(&self, ip: &str) -> bool;
}

#[derive(Debug)]
struct IpStats {
    malformed: u32,
    valid: u32,
    invalid: u32,
    conn_tokens: i32,
    banned_until: Option<Instant>,
    last_seen: Instant,
}

impl IpStats {
    fn new(conn_tokens: i32, now: Instant) -> Self {
        Self {
            malformed: 0,
            valid: 0,
            invalid: 0,
            conn_tokens,
            banned_until: None,
            last_seen: now,
        }
    }

    fn is_banned(&self, now: Instant) -> bool {
        self.banned_until.is_some_and(|until| now < until)
    }
}

/// In-memory per-IP policy engine.
#[derive(Debug)]
pub struct MemoryPolicy {
    config: PolicyConfig,
    blacklist: HashSet<String>,
    whitelist: HashSet<String>,
    started: Instant,
    stats: Mutex<HashMap<String, IpStats>>,
}

impl MemoryPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        let blacklist = config.blacklist.iter().map(|l| l.to_lowercase()).collect();
        let whitelist = config.whitelist.iter().cloned().collect();
        Self {
            config,
            blacklist,
            whitelist,
            started: Instant::now(),
            stats: Mutex::new(HashMap::new()),
        }
    }

    fn with_stats<R>(&self, ip: &str, now: Instant, f: impl FnOnce(&mut IpStats) -> R) -> R {
        let mut stats = self.stats.lock();
        let entry = stats
            .entry(ip.to_string())
            .or_insert_with(|| IpStats::new(self.config.limits.limit, now));
        entry.last_seen = now;
        f(entry)
    }

    fn ban(&self, ip: &str, stats: &mut IpStats, now: Instant, reason: &str) {
        if self.whitelist.contains(ip) {
            return;
        }
        stats.banned_until = Some(now + self.config.banning.timeout());
        warn!(ip, reason, "Banned IP");
    }

    /// Drop stats for IPs that have been quiet longer than the ban timeout
    /// and whose ban, if any, has expired.
    pub fn reset_expired(&self) -> usize {
        self.reset_expired_at(Instant::now())
    }

    fn reset_expired_at(&self, now: Instant) -> usize {
        let idle = self.config.banning.timeout();
        let mut stats = self.stats.lock();
        let before = stats.len();
        stats.retain(|_, s| s.is_banned(now) || now.duration_since(s.last_seen) < idle);
        let removed = before - stats.len();
        if removed > 0 {
            debug!(removed, remaining = stats.len(), "Reset policy stats");
        }
        removed
    }

    fn apply_login_policy_at(&self, login: &str, ip: &str, now: Instant) -> bool {
        if self.blacklist.contains(&login.to_lowercase()) {
            self.with_stats(ip, now, |s| self.ban(ip, s, now, "blacklisted login"));
            return false;
        }
        !self.is_banned_at(ip, now)
    }

    fn apply_malformed_policy_at(&self, ip: &str, now: Instant) -> bool {
        let banning = &self.config.banning;
        self.with_stats(ip, now, |s| {
            s.malformed += 1;
            if banning.enabled && s.malformed > banning.malformed_limit {
                self.ban(ip, s, now, "malformed requests");
                return false;
            }
            true
        })
    }

    fn apply_share_policy_at(&self, ip: &str, valid: bool, now: Instant) -> bool {
        let banning = &self.config.banning;
        let limits = &self.config.limits;
        self.with_stats(ip, now, |s| {
            // A banned IP gets no credit on connections it already holds.
            if s.is_banned(now) {
                return false;
            }
            if valid {
                s.valid += 1;
                if limits.enabled {
                    s.conn_tokens = s.conn_tokens.saturating_add(limits.limit_jump);
                }
            } else {
                s.invalid += 1;
            }
            if !banning.enabled {
                return true;
            }
            let total = s.valid + s.invalid;
            if total < banning.check_threshold {
                return true;
            }
            let invalid_percent = f64::from(s.invalid) * 100.0 / f64::from(total);
            s.valid = 0;
            s.invalid = 0;
            if invalid_percent >= banning.invalid_percent {
                self.ban(ip, s, now, "invalid share rate");
                return false;
            }
            true
        })
    }

    fn is_banned_at(&self, ip: &str, now: Instant) -> bool {
        self.stats.lock().get(ip).is_some_and(|s| s.is_banned(now))
    }

    fn apply_limit_policy_at(&self, ip: &str, now: Instant) -> bool {
        let limits = &self.config.limits;
        if !limits.enabled || self.whitelist.contains(ip) {
            return true;
        }
        if now.duration_since(self.started) < limits.grace() {
            return true;
        }
        self.with_stats(ip, now, |s| {
            s.conn_tokens -= 1;
            s.conn_tokens >= 0
        })
    }
}

impl Policy for MemoryPolicy {
    fn apply_login_policy(&self, login: &str, ip: &str) -> bool {
        self.apply_login_policy_at(login, ip, Instant::now())
    }

    fn apply_malformed_policy(&self, ip: &str) -> bool {
        self.apply_malformed_policy_at(ip, Instant::now())
    }

    fn apply_share_policy(&self, ip: &str, valid: bool) -> bool {
        self.apply_share_policy_at(ip, valid, Instant::now())
    }

    fn is_banned(&self, ip: &str) -> bool {
        self.is_banned_at(ip, Instant::now())
    }

    fn apply_limit_policy(&self, ip: &str) -> bool {
        self.apply_limit_policy_at(ip, Instant::now())
    }
}

/// How often the daemon should call [`MemoryPolicy::reset_expired`].
pub const RESET_INTERVAL: Duration = Duration::from_secs(60);
