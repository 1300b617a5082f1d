//! Per-connection miner session state.
//!
//! A [`Session`] is owned by the task serving its connection. The transport
//! processes one request at a time per connection, so the mutable fields
//! (difficulty, last share time) are only ever touched from that task and
//! need no locking. Other tasks learn about a session only through its
//! [`SessionId`] in the [`crate::registry::SessionRegistry`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::types::Difficulty;

/// Worker id used when the client sends none or an unacceptable one.
pub const DEFAULT_WORKER_ID: &str = "0";

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A unit of work pushed to a miner: `[header, seed, target]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job(pub String, pub String, pub String);

impl Job {
    pub fn new(header: impl Into<String>, seed: impl Into<String>, target: impl Into<String>) -> Self {
        Self(header.into(), seed.into(), target.into())
    }

    pub fn header(&self) -> &str {
        &self.0
    }

    pub fn seed(&self) -> &str {
        &self.1
    }

    pub fn target(&self) -> &str {
        &self.2
    }
}

/// State of one miner connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    ip: String,
    login: Option<String>,
    worker_id: String,
    /// Current share target as protocol hex.
    difficulty: String,
    /// Monotonic time of the last accepted share; `None` until the first one.
    last_share_ms: Option<u64>,
    jobs: mpsc::Sender<Job>,
}

impl Session {
    /// Create an unauthenticated session for a connection from `ip`.
    ///
    /// Unsolicited jobs are pushed into `jobs`; the transport drains the
    /// receiving end onto the socket.
    pub fn new(ip: impl Into<String>, jobs: mpsc::Sender<Job>) -> Self {
        Self {
            id: SessionId::next(),
            ip: ip.into(),
            login: None,
            worker_id: DEFAULT_WORKER_ID.to_string(),
            difficulty: Difficulty::MIN.to_target_hex(),
            last_share_ms: None,
            jobs,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address used for policy decisions.
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Normalized wallet address, once logged in.
    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Current share target as protocol hex.
    pub fn difficulty(&self) -> &str {
        &self.difficulty
    }

    /// Current share difficulty as an integer.
    pub fn difficulty_value(&self) -> Difficulty {
        Difficulty::from_target_hex(&self.difficulty).unwrap_or(Difficulty::MIN)
    }

    pub fn last_share_ms(&self) -> Option<u64> {
        self.last_share_ms
    }

    pub(crate) fn bind(&mut self, login: String, worker_id: String, difficulty: Difficulty) {
        self.login = Some(login);
        self.worker_id = worker_id;
        self.difficulty = difficulty.to_target_hex();
    }

    pub(crate) fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty.to_target_hex();
    }

    pub(crate) fn record_share(&mut self, now_ms: u64) {
        self.last_share_ms = Some(now_ms);
    }

    /// Queue a job for delivery to the miner without waiting.
    pub fn push_job(&self, job: Job) -> Result<()> {
        self.jobs.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::Protocol("job queue full".into()),
            mpsc::error::TrySendError::Closed(_) => Error::Protocol("connection closed".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_unauthenticated() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new("10.0.0.1", tx);
        assert_eq!(session.login(), None);
        assert_eq!(session.worker_id(), DEFAULT_WORKER_ID);
        assert_eq!(session.last_share_ms(), None);
        assert_eq!(session.ip(), "10.0.0.1");
    }

    #[test]
    fn test_ids_are_unique() {
        let (tx, _rx) = mpsc::channel(1);
        let a = Session::new("10.0.0.1", tx.clone());
        let b = Session::new("10.0.0.1", tx);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_bind_sets_difficulty_hex() {
        let (tx, _rx) = mpsc::channel(1);
        let mut session = Session::new("10.0.0.1", tx);
        session.bind("0xabc".into(), "rig1".into(), Difficulty::new(4));
        assert_eq!(session.login(), Some("0xabc"));
        assert_eq!(session.worker_id(), "rig1");
        assert_eq!(session.difficulty_value(), Difficulty::new(4));
        assert_eq!(session.difficulty(), Difficulty::new(4).to_target_hex());
    }

    #[test]
    fn test_push_job_full_and_closed() {
        let (tx, rx) = mpsc::channel(1);
        let session = Session::new("10.0.0.1", tx);
        assert!(session.push_job(Job::new("0x1", "0x2", "0x3")).is_ok());
        assert!(session.push_job(Job::new("0x1", "0x2", "0x3")).is_err());
        drop(rx);
        assert!(session.push_job(Job::new("0x1", "0x2", "0x3")).is_err());
    }
}
