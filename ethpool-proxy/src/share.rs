//! Share processing contract and the bundled in-memory ledger.
//!
//! The dispatcher hands every syntactically valid submission to a
//! [`ShareProcessor`], which is the single source of truth for whether a
//! share was seen before and whether it meets its target. Implementations
//! must serialize the seen-check per share key across all sessions.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use ruint::aliases::U256;

use crate::template::BlockTemplate;
use crate::tracing::prelude::*;
use crate::types::Difficulty;

/// Everything known about a submitted share.
#[derive(Debug, Clone, Copy)]
pub struct ShareRequest<'a> {
    pub login: &'a str,
    pub worker_id: &'a str,
    pub ip: &'a str,
    /// Share difficulty the session was working at
    pub difficulty: Difficulty,
    pub template: Option<&'a BlockTemplate>,
    pub nonce: &'a str,
    pub mix_digest: &'a str,
    pub result: &'a str,
}

/// What the share processor decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareVerdict {
    pub already_seen: bool,
    pub valid: bool,
}

impl ShareVerdict {
    pub const INVALID: ShareVerdict = ShareVerdict {
        already_seen: false,
        valid: false,
    };
    pub const VALID: ShareVerdict = ShareVerdict {
        already_seen: false,
        valid: true,
    };
    pub const DUPLICATE: ShareVerdict = ShareVerdict {
        already_seen: true,
        valid: true,
    };

    /// True only for a share that should be credited.
    pub fn is_fresh_and_valid(&self) -> bool {
        !self.already_seen && self.valid
    }
}

/// Verifies and records shares.
pub trait ShareProcessor: Send + Sync {
    fn process_share(&self, share: &ShareRequest<'_>) -> ShareVerdict;
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Header the seen set belongs to
    header: String,
    seen: HashSet<(String, String, String)>,
    accepted: HashMap<String, u64>,
}

/// In-memory share ledger.
///
/// Checks the claimed result digest against the share boundary and
/// deduplicates accepted shares per work header. The seen set is dropped
/// whenever work moves to a new header.
#[derive(Debug, Default)]
pub struct ShareLedger {
    state: Mutex<LedgerState>,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepted share count per `login.worker`.
    pub fn accepted(&self, login: &str, worker_id: &str) -> u64 {
        let key = format!("{}.{}", login, worker_id);
        self.state.lock().accepted.get(&key).copied().unwrap_or(0)
    }

    /// Whether a result digest meets the boundary of `difficulty`.
    pub fn meets_target(result: &str, difficulty: Difficulty) -> bool {
        let digits = result.strip_prefix("0x").unwrap_or(result);
        match U256::from_str_radix(digits, 16) {
            Ok(value) => value <= difficulty.boundary(),
            Err(_) => false,
        }
    }
}

impl ShareProcessor for ShareLedger {
    fn process_share(&self, share: &ShareRequest<'_>) -> ShareVerdict {
        let Some(template) = share.template else {
            debug!(login = share.login, "Share without work template");
            return ShareVerdict::INVALID;
        };
        if !Self::meets_target(share.result, share.difficulty) {
            return ShareVerdict::INVALID;
        }

        let mut state = self.state.lock();
        if state.header != template.header {
            state.header.clone_from(&template.header);
            state.seen.clear();
        }
        let key = (
            share.nonce.to_string(),
            share.mix_digest.to_string(),
            share.result.to_string(),
        );
        if !state.seen.insert(key) {
            return ShareVerdict::DUPLICATE;
        }
        *state
            .accepted
            .entry(format!("{}.{}", share.login, share.worker_id))
            .or_default() += 1;
        ShareVerdict::VALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = "0xabcdef0123456789abcdef0123456789abcdef01";

    fn template(header: &str) -> BlockTemplate {
        BlockTemplate {
            header: header.into(),
            seed: format!("0x{}", "1".repeat(64)),
            target: format!("0x{}", "0".repeat(64)),
            height: 100,
            pending_block: None,
        }
    }

    fn request<'a>(template: &'a BlockTemplate, nonce: &'a str, result: &'a str) -> ShareRequest<'a> {
        ShareRequest {
            login: LOGIN,
            worker_id: "rig",
            ip: "127.0.0.1",
            difficulty: Difficulty::new(2),
            template: Some(template),
            nonce,
            mix_digest: result,
            result,
        }
    }

    fn low_result() -> String {
        format!("0x{}", "0".repeat(64))
    }

    #[test]
    fn test_meets_target() {
        let diff = Difficulty::new(2);
        assert!(ShareLedger::meets_target(&format!("0x7{}", "f".repeat(63)), diff));
        assert!(ShareLedger::meets_target(&format!("0x8{}", "0".repeat(63)), diff));
        assert!(!ShareLedger::meets_target(&format!("0x8{}1", "0".repeat(62)), diff));
    }

    #[test]
    fn test_duplicate_detection() {
        let ledger = ShareLedger::new();
        let work = template("0xaa");
        let result = low_result();
        let first = ledger.process_share(&request(&work, "0x0000000000000001", &result));
        let second = ledger.process_share(&request(&work, "0x0000000000000001", &result));
        assert_eq!(first, ShareVerdict::VALID);
        assert_eq!(second, ShareVerdict::DUPLICATE);
        assert_eq!(ledger.accepted(LOGIN, "rig"), 1);
    }

    #[test]
    fn test_new_header_resets_seen_set() {
        let ledger = ShareLedger::new();
        let result = low_result();
        let old = template("0xaa");
        let new = template("0xbb");
        ledger.process_share(&request(&old, "0x0000000000000001", &result));
        let verdict = ledger.process_share(&request(&new, "0x0000000000000001", &result));
        assert_eq!(verdict, ShareVerdict::VALID);
    }

    #[test]
    fn test_invalid_share_is_not_recorded() {
        let ledger = ShareLedger::new();
        let work = template("0xaa");
        let high = format!("0x{}", "f".repeat(64));
        let verdict = ledger.process_share(&request(&work, "0x0000000000000001", &high));
        assert_eq!(verdict, ShareVerdict::INVALID);
        assert_eq!(ledger.accepted(LOGIN, "rig"), 0);
    }

    #[test]
    fn test_no_template_is_invalid() {
        let ledger = ShareLedger::new();
        let work = template("0xaa");
        let result = low_result();
        let mut share = request(&work, "0x0000000000000001", &result);
        share.template = None;
        assert_eq!(ledger.process_share(&share), ShareVerdict::INVALID);
    }
}
