//! RPC method handlers.

use std::time::Duration;

use super::{ProxyServer, RpcError};
use crate::session::{Job, Session};
use crate::share::ShareRequest;
use crate::template::PendingBlock;
use crate::tracing::{prelude::*, SHARE_LOG};
use crate::validation;

impl ProxyServer {
    /// `eth_submitLogin`: authenticate the session as a wallet address.
    ///
    /// Logging in again on an authenticated session rebinds it.
    pub fn handle_login(
        &self,
        session: &mut Session,
        params: &[String],
        worker: &str,
    ) -> Result<bool, RpcError> {
        let address = params.first().ok_or(RpcError::InvalidParams)?;
        let login = validation::normalize_login(address).ok_or(RpcError::InvalidLogin)?;
        if !self.policy.apply_login_policy(&login, session.ip()) {
            return Err(RpcError::Blacklisted);
        }

        let worker_id = validation::sanitize_worker_id(worker).to_string();
        session.bind(login, worker_id, self.config.starting_difficulty());
        self.registry.register(session.id());
        info!(
            login = session.login().unwrap_or_default(),
            worker = session.worker_id(),
            ip = session.ip(),
            "Stratum miner connected"
        );
        Ok(true)
    }

    /// `eth_getWork`: the current job at the session's difficulty.
    pub fn handle_get_work(&self, session: &Session) -> Result<Job, RpcError> {
        if !self.registry.contains(session.id()) {
            return Err(RpcError::NotSubscribed);
        }
        match self.templates.current_template() {
            Some(t) if !t.header.is_empty() && !self.templates.is_sick() => {
                Ok(Job::new(t.header.clone(), t.seed.clone(), session.difficulty()))
            }
            _ => Err(RpcError::WorkNotReady),
        }
    }

    /// `eth_submitWork` on a stratum connection: submit as the logged-in
    /// address.
    pub fn handle_tcp_submit(
        &self,
        session: &mut Session,
        worker: &str,
        params: &[String],
    ) -> Result<bool, RpcError> {
        if !self.registry.contains(session.id()) {
            return Err(RpcError::NotSubscribed);
        }
        let login = session.login().ok_or(RpcError::NotSubscribed)?.to_string();
        self.handle_submit(session, &login, worker, params)
    }

    /// Validate and account a share for `login`.
    ///
    /// `Ok(false)` is a soft rejection: the share is not credited but the
    /// miner is not punished beyond the policy's bookkeeping.
    pub fn handle_submit(
        &self,
        session: &mut Session,
        login: &str,
        worker: &str,
        params: &[String],
    ) -> Result<bool, RpcError> {
        let worker = validation::sanitize_worker_id(worker);
        let ip = session.ip().to_string();
        let ip = ip.as_str();

        let [nonce, mix_digest, result] = params else {
            self.policy.apply_malformed_policy(ip);
            error!(login, ip, ?params, "Malformed params");
            return Err(RpcError::InvalidParams);
        };
        let (nonce, mix_digest, result) = (nonce.as_str(), mix_digest.as_str(), result.as_str());
        if !validation::is_valid_pow(nonce, mix_digest, result) {
            self.policy.apply_malformed_policy(ip);
            error!(login, ip, ?params, "Malformed PoW result");
            return Err(RpcError::MalformedPow);
        }

        let template = self.templates.current_template();
        let verdict = self.shares.process_share(&ShareRequest {
            login,
            worker_id: worker,
            ip,
            difficulty: session.difficulty_value(),
            template: template.as_deref(),
            nonce,
            mix_digest,
            result,
        });
        let allowed = self.policy.apply_share_policy(ip, verdict.is_fresh_and_valid());

        if verdict.already_seen {
            error!(login, worker, ip, ?params, "Duplicate share");
            error!(target: SHARE_LOG, login, worker, ip, ?params, "Duplicate share");
            return Err(RpcError::DuplicateShare);
        }

        if !verdict.valid {
            error!(login, worker, ip, "Invalid share");
            error!(target: SHARE_LOG, login, worker, ip, "Invalid share");
            if !allowed {
                return Err(RpcError::InvalidShare);
            }
            return Ok(false);
        }
        info!(login, worker, ip, "Valid share");
        info!(target: SHARE_LOG, login, worker, ip, "Valid share");

        if !allowed {
            return Err(RpcError::HighInvalidRate);
        }

        let now = self.clock.now_ms();
        if let (Some(vardiff), Some(last_share)) = (&self.vardiff, session.last_share_ms()) {
            let round = Duration::from_millis(now.saturating_sub(last_share));
            let step = vardiff.retarget(session.difficulty_value(), round);
            session.set_difficulty(step.difficulty);
            info!(
                difficulty = %step.difficulty,
                rate = %step.rate,
                login,
                worker,
                ip,
                "Difficulty adjusted"
            );

            if let Some(t) = template.as_deref() {
                let job = Job::new(t.header.clone(), t.seed.clone(), session.difficulty());
                match session.push_job(job) {
                    Ok(()) => debug!(login, worker, ip, "Sent new job to stratum miner"),
                    Err(e) => error!(login, worker, ip, error = %e, "Job transmit error"),
                }
            }
        }
        session.record_share(now);

        Ok(true)
    }

    /// `eth_getBlockByNumber`: the cached pending block, if any work exists.
    pub fn handle_get_block_by_number(&self) -> Option<PendingBlock> {
        self.templates
            .current_template()
            .and_then(|t| t.pending_block.clone())
    }

    /// Any method the proxy doesn't know.
    pub fn handle_unknown(&self, session: &Session, method: &str) -> RpcError {
        error!(method, ip = session.ip(), "Unknown request method");
        self.policy.apply_malformed_policy(session.ip());
        RpcError::MethodNotFound
    }
}
