//! Stratum session protocol dispatcher.
//!
//! [`ProxyServer`] holds everything the RPC handlers share: the session
//! registry, the policy engine, the share processor, the template source and
//! the retargeting controller. The transport owns each [`Session`] and calls
//! [`ProxyServer::dispatch`] once per request line; handlers run to
//! completion synchronously inside the connection's task.
//!
//! # Session states
//!
//! ```text
//! Unauthenticated --eth_submitLogin--> Authenticated
//!                                        |  eth_getWork
//!                                        |  eth_submitWork   (repeat until
//!                                        |  eth_submitHashrate disconnect)
//! ```
//!
//! Only login (and the informational calls that need no identity) are
//! accepted before authentication.

mod error;
mod handlers;
pub mod messages;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::clock::{Clock, MonotonicClock};
use crate::config::ProxyConfig;
use crate::policy::Policy;
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::share::ShareProcessor;
use crate::template::TemplateSource;
use crate::tracing::prelude::*;
use crate::vardiff::VardiffController;

pub use error::{ErrorReply, RpcError};
pub use messages::{Method, Request, Response};

/// The reply to one request and what the transport should do next.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub response: Response,
    /// Drop the connection once the response is written.
    pub close: bool,
}

/// Shared protocol state for all miner sessions.
pub struct ProxyServer {
    config: ProxyConfig,
    vardiff: Option<VardiffController>,
    registry: Arc<SessionRegistry>,
    policy: Arc<dyn Policy>,
    shares: Arc<dyn ShareProcessor>,
    templates: Arc<dyn TemplateSource>,
    clock: Arc<dyn Clock>,
}

impl ProxyServer {
    pub fn new(
        config: ProxyConfig,
        policy: Arc<dyn Policy>,
        shares: Arc<dyn ShareProcessor>,
        templates: Arc<dyn TemplateSource>,
    ) -> Self {
        let vardiff = config
            .dynamic_difficulty
            .enabled
            .then(|| VardiffController::from_config(&config.dynamic_difficulty));
        Self {
            config,
            vardiff,
            registry: Arc::new(SessionRegistry::new()),
            policy,
            shares,
            templates,
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Replace the clock used to time shares.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> &Arc<dyn Policy> {
        &self.policy
    }

    pub fn templates(&self) -> &Arc<dyn TemplateSource> {
        &self.templates
    }

    /// Forget a session whose connection ended.
    pub fn disconnect(&self, session: &Session) {
        if self.registry.unregister(session.id()) {
            info!(
                session = %session.id(),
                login = session.login().unwrap_or("-"),
                ip = session.ip(),
                "Stratum miner disconnected"
            );
        }
    }

    /// Route one request to its handler.
    pub fn dispatch(&self, session: &mut Session, request: &Request) -> Reply {
        let id = request.id.clone();
        let method = Method::from_name(&request.method);

        let outcome: Result<Value, RpcError> = match method {
            Method::SubmitLogin => self
                .with_string_params(session, request)
                .and_then(|params| self.handle_login(session, &params, &request.worker))
                .map(Value::from),
            Method::GetWork => self
                .handle_get_work(session)
                .map(|job| json!(job)),
            Method::SubmitWork => self
                .with_string_params(session, request)
                .and_then(|params| self.handle_tcp_submit(session, &request.worker, &params))
                .map(Value::from),
            Method::GetBlockByNumber => Ok(json!(self.handle_get_block_by_number())),
            Method::SubmitHashrate => Ok(Value::Bool(true)),
            Method::Unknown(name) => Err(self.handle_unknown(session, &name)),
        };

        match outcome {
            Ok(result) => Reply {
                response: Response::result(id, result),
                close: false,
            },
            Err(err) => Reply {
                response: Response::error(id, err.into()),
                close: err.closes_connection(),
            },
        }
    }

    // Params that aren't a list of strings count as malformed input.
    fn with_string_params(&self, session: &Session, request: &Request) -> Result<Vec<String>, RpcError> {
        request.string_params().ok_or_else(|| {
            self.policy.apply_malformed_policy(session.ip());
            error!(
                ip = session.ip(),
                method = %request.method,
                "Malformed request params"
            );
            RpcError::InvalidParams
        })
    }
}
