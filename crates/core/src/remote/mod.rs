//! Remote execution
//!
//! A native host drives browser-like sessions through [`RemoteDriver`].
//! The remote side answers a small script protocol (see [`script`]):
//! wait for its loader, reset its reporter, run one tree by id, and hand
//! back queued [`Action`]s until a test-complete action carries the
//! remote snapshot home.

pub mod action;
pub mod capabilities;
pub mod host;

pub use action::{key_code, Action, ActionQueue};
pub use capabilities::{select_capabilities, Capability, CapabilityCatalog, Provider};
pub use host::{LoopbackBuilder, LoopbackDriver, RemoteHost};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::Result;

/// Scripts understood by a remote environment
pub mod script {
    /// Async; resolves to the loader error, or null once resources are loaded
    pub const WAIT_FOR_LOADER_IDLE: &str = "smoke.loaderIdle.then(loadError => arguments[0](loadError || null))";
    /// Resets the remote reporter; returns the previous snapshot
    pub const RESET_LOG: &str = "return smoke.logger.reset()";
    /// `(test id, remote options)`; starts the tree and returns a run id
    pub const EXEC: &str = "return smoke.exec(arguments[0], arguments[1])";
    /// Async; resolves to queued actions in wire form
    pub const GET_QUEUED_ACTIONS: &str = "smoke.getQueuedActions().then(actions => arguments[0](actions))";
}

/// A remote browser session
#[async_trait]
pub trait RemoteDriver: Send + Sync {
    /// Load `url` in the session.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Run a script and return its value.
    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// Run a script that reports through a callback and return what it reported.
    async fn execute_async_script(&self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// Perform input actions (keys, clicks) in the session.
    async fn perform_actions(&self, actions: &[Action]) -> Result<()>;

    async fn quit(&self) -> Result<()>;
}

/// Opens a session for one capability
#[async_trait]
pub trait SessionBuilder: Send + Sync {
    async fn build(&self, name: &str, capability: &Capability) -> Result<Arc<dyn RemoteDriver>>;
}
