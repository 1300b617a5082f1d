//! Current mining work and upstream health.
//!
//! The upstream poller publishes immutable [`BlockTemplate`] snapshots into a
//! [`TemplateCell`]. Readers clone the `Arc` and never observe a template
//! being modified; a refresh replaces the whole snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Lightweight view of the node's pending block, served to miners asking
/// for the current block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PendingBlock {
    pub number: String,
    pub difficulty: String,
}

/// A mining job as fetched from the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    /// Header hash miners search a nonce for
    pub header: String,
    /// Ethash seed hash
    pub seed: String,
    /// Network (block) target
    pub target: String,
    pub height: u64,
    pub pending_block: Option<PendingBlock>,
}

/// Where the dispatcher gets work from.
pub trait TemplateSource: Send + Sync {
    /// Latest template snapshot, if any has been fetched.
    fn current_template(&self) -> Option<Arc<BlockTemplate>>;

    /// Whether the backing node is considered unhealthy.
    fn is_sick(&self) -> bool;
}

/// Shared cell holding the latest template and upstream health.
#[derive(Debug, Default)]
pub struct TemplateCell {
    template: RwLock<Option<Arc<BlockTemplate>>>,
    sick: AtomicBool,
}

impl TemplateCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot, returning the previous one.
    pub fn publish(&self, template: BlockTemplate) -> Option<Arc<BlockTemplate>> {
        self.template.write().replace(Arc::new(template))
    }

    pub fn set_sick(&self, sick: bool) {
        self.sick.store(sick, Ordering::Release);
    }
}

impl TemplateSource for TemplateCell {
    fn current_template(&self) -> Option<Arc<BlockTemplate>> {
        self.template.read().clone()
    }

    fn is_sick(&self) -> bool {
        self.sick.load(Ordering::Acquire)
    }
}
