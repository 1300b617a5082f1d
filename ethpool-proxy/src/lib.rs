//! Stratum getWork proxy for Ethash mining pools.
//!
//! Miners speak newline-delimited JSON-RPC (`eth_submitLogin`,
//! `eth_getWork`, `eth_submitWork`) to the [`stratum`] listener. The
//! [`proxy`] dispatcher validates their requests, checks shares against each
//! session's difficulty, retargets that difficulty from the observed submit
//! rate, and hands fresh work back. Work itself comes from Ethereum nodes
//! polled by [`upstream`].

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod policy;
pub mod proxy;
pub mod registry;
pub mod session;
pub mod share;
pub mod stratum;
pub mod template;
pub mod tracing;
pub mod types;
pub mod upstream;
pub mod validation;
pub mod vardiff;
