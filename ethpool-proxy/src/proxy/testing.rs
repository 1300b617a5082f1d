//! Test doubles for the dispatcher's collaborators.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::ProxyServer;
use crate::clock::ManualClock;
use crate::config::{DynamicDifficultyConfig, ProxyConfig};
use crate::policy::Policy;
use crate::session::{Job, Session};
use crate::share::{ShareProcessor, ShareRequest, ShareVerdict};
use crate::template::{BlockTemplate, TemplateCell};
use crate::types::Difficulty;

pub const IP: &str = "203.0.113.9";
pub const HEADER: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";
pub const SEED: &str = "0x2222222222222222222222222222222222222222222222222222222222222222";
pub const STARTING_DIFFICULTY: u64 = 1_000;
pub const START_MS: u64 = 1_000_000;

pub fn template(header: &str) -> BlockTemplate {
    BlockTemplate {
        header: header.to_string(),
        seed: SEED.to_string(),
        target: format!("0x{}", "0".repeat(64)),
        height: 42,
        pending_block: None,
    }
}

pub fn valid_params() -> Vec<String> {
    vec![
        "0x00000000deadbeef".to_string(),
        format!("0x{}", "a".repeat(64)),
        format!("0x{}", "0".repeat(64)),
    ]
}

#[derive(Debug)]
struct PolicyState {
    allow_login: bool,
    share_verdict: bool,
    malformed: usize,
    logins: Vec<(String, String)>,
    share_reports: Vec<bool>,
}

/// Policy that records every call and answers as scripted.
#[derive(Debug)]
pub struct CountingPolicy {
    state: Mutex<PolicyState>,
}

impl CountingPolicy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PolicyState {
                allow_login: true,
                share_verdict: true,
                malformed: 0,
                logins: Vec::new(),
                share_reports: Vec::new(),
            }),
        }
    }

    pub fn deny_logins(&self) {
        self.state.lock().allow_login = false;
    }

    pub fn set_share_verdict(&self, allowed: bool) {
        self.state.lock().share_verdict = allowed;
    }

    pub fn malformed(&self) -> usize {
        self.state.lock().malformed
    }

    pub fn logins(&self) -> Vec<(String, String)> {
        self.state.lock().logins.clone()
    }

    pub fn share_reports(&self) -> Vec<bool> {
        self.state.lock().share_reports.clone()
    }
}

impl Policy for CountingPolicy {
    fn apply_login_policy(&self, login: &str, ip: &str) -> bool {
        let mut state = self.state.lock();
        state.logins.push((login.to_string(), ip.to_string()));
        state.allow_login
    }

    fn apply_malformed_policy(&self, _ip: &str) -> bool {
        self.state.lock().malformed += 1;
        true
    }

    fn apply_share_policy(&self, _ip: &str, valid: bool) -> bool {
        let mut state = self.state.lock();
        state.share_reports.push(valid);
        state.share_verdict
    }

    fn is_banned(&self, _ip: &str) -> bool {
        false
    }

    fn apply_limit_policy(&self, _ip: &str) -> bool {
        true
    }
}

/// Owned copy of what the dispatcher passed to the share processor.
#[derive(Debug, Clone)]
pub struct SeenShare {
    pub login: String,
    pub worker_id: String,
    pub ip: String,
    pub difficulty: Difficulty,
    pub header: Option<String>,
    pub params: Vec<String>,
}

/// Share processor returning a fixed verdict.
#[derive(Debug)]
pub struct ScriptedShares {
    verdict: Mutex<ShareVerdict>,
    seen: Mutex<Vec<SeenShare>>,
}

impl ScriptedShares {
    pub fn new() -> Self {
        Self {
            verdict: Mutex::new(ShareVerdict::VALID),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn set_verdict(&self, verdict: ShareVerdict) {
        *self.verdict.lock() = verdict;
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn last(&self) -> Option<SeenShare> {
        self.seen.lock().last().cloned()
    }
}

impl ShareProcessor for ScriptedShares {
    fn process_share(&self, share: &ShareRequest<'_>) -> ShareVerdict {
        self.seen.lock().push(SeenShare {
            login: share.login.to_string(),
            worker_id: share.worker_id.to_string(),
            ip: share.ip.to_string(),
            difficulty: share.difficulty,
            header: share.template.map(|t| t.header.clone()),
            params: vec![
                share.nonce.to_string(),
                share.mix_digest.to_string(),
                share.result.to_string(),
            ],
        });
        *self.verdict.lock()
    }
}

/// A dispatcher wired to test doubles.
pub struct Harness {
    pub server: ProxyServer,
    pub policy: Arc<CountingPolicy>,
    pub shares: Arc<ScriptedShares>,
    pub templates: Arc<TemplateCell>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(DynamicDifficultyConfig::default())
    }

    pub fn with_vardiff(min_submit_rate: u64, max_submit_rate: u64) -> Self {
        Self::build(DynamicDifficultyConfig {
            enabled: true,
            min_submit_rate,
            max_submit_rate,
        })
    }

    fn build(dynamic_difficulty: DynamicDifficultyConfig) -> Self {
        let config = ProxyConfig {
            difficulty: STARTING_DIFFICULTY,
            dynamic_difficulty,
            ..Default::default()
        };
        let policy = Arc::new(CountingPolicy::new());
        let shares = Arc::new(ScriptedShares::new());
        let templates = Arc::new(TemplateCell::new());
        let clock = ManualClock::new(START_MS);
        let server = ProxyServer::new(config, policy.clone(), shares.clone(), templates.clone())
            .with_clock(Arc::new(clock.clone()));
        Self {
            server,
            policy,
            shares,
            templates,
            clock,
        }
    }

    pub fn session(&self) -> (Session, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(16);
        (Session::new(IP, tx), rx)
    }
}
