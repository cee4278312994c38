//! Run configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::remote::capabilities::CapabilityCatalog;
use crate::types::Host;
use crate::Result;

/// Default page a remote session navigates to
pub const DEFAULT_REMOTE_URL: &str =
    "http://localhost:8080/altoviso/bd-smoke/browser-runner.html?remotelyControlled&root=./";

/// Options consumed by the filter, engine and orchestrator.
///
/// Test functions see these through [`CallContext::options`](crate::CallContext::options).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Separator used to join ids into display names
    pub name_separator: String,

    /// Abort the rest of a tree after the first failure
    pub quit_on_first_fail: bool,

    /// Include paths; empty means run everything
    pub include: Vec<Vec<String>>,

    /// Log excluded tests under `EXCLUDED`
    pub log_excludes: bool,

    /// Run selected trees concurrently in local mode
    pub concurrent: bool,

    /// Echo results through tracing
    pub console: bool,

    /// Force remote execution in the default-run policy
    pub remote: bool,

    /// Page loaded by each remote session
    pub remote_url: String,

    /// Opaque options forwarded to the remote environment
    pub remote_options: serde_json::Value,

    /// Capability names to run remotely (`*` for all)
    pub cap: Vec<String>,

    /// Capability preset names
    pub cap_preset: Vec<String>,

    /// Only use capabilities of this provider
    pub provider: Option<String>,

    /// Capability catalog
    pub capabilities: Option<CapabilityCatalog>,

    /// Environment this engine runs in
    pub host: Host,

    /// Queue a test-complete action when a local run finishes
    pub remotely_controlled: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            name_separator: "/".to_string(),
            quit_on_first_fail: false,
            include: Vec::new(),
            log_excludes: true,
            concurrent: false,
            console: true,
            remote: false,
            remote_url: DEFAULT_REMOTE_URL.to_string(),
            remote_options: serde_json::Value::Null,
            cap: Vec::new(),
            cap_preset: Vec::new(),
            provider: None,
            capabilities: None,
            host: Host::Native,
            remotely_controlled: false,
        }
    }
}

impl RunOptions {
    /// Load options from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let options: Self = toml::from_str(&content)?;
            Ok(options)
        } else {
            Ok(Self::default())
        }
    }

    /// Append include paths given in their textual form.
    pub fn add_include(&mut self, value: &str) {
        self.include.extend(parse_include(value));
    }

    /// Whether any remote capability selection was requested
    pub fn wants_capabilities(&self) -> bool {
        !self.cap.is_empty() || !self.cap_preset.is_empty()
    }
}

/// Parse `"A/B;C.D"` into `[["A","B"],["C","D"]]`.
///
/// Entries are separated by `,` or `;`, segments by `.` or `/`; blank
/// segments and entries are dropped.
pub fn parse_include(value: &str) -> Vec<Vec<String>> {
    value
        .split([',', ';'])
        .map(|item| {
            item.split(['.', '/'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .filter(|path| !path.is_empty())
        .collect()
}

/// Split a comma/semicolon separated list.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
