//! Core enums shared across the engine

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// Environment eligibility of a registered test tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    /// Runs on a native host and in a browser
    Both,
    /// Runs only on a native host
    #[serde(alias = "node")]
    NodeOnly,
    /// Runs only in a browser (dispatched remotely from a native host)
    #[serde(alias = "browser")]
    BrowserOnly,
    /// Runs on a native host with a remote driver handed to the test
    Remote,
}

impl Default for TestType {
    fn default() -> Self {
        Self::Both
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestType::Both => write!(f, "both"),
            TestType::NodeOnly => write!(f, "node"),
            TestType::BrowserOnly => write!(f, "browser"),
            TestType::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for TestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(TestType::Both),
            "node" | "node_only" => Ok(TestType::NodeOnly),
            "browser" | "browser_only" => Ok(TestType::BrowserOnly),
            "remote" => Ok(TestType::Remote),
            other => Err(Error::SpecParse(format!("unknown test type \"{}\"", other))),
        }
    }
}

/// The kind of environment the engine is running in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Host {
    /// A native (node-like) process
    Native,
    /// A browser-like environment, typically remotely controlled
    Browser,
}

impl Default for Host {
    fn default() -> Self {
        Self::Native
    }
}

impl Host {
    /// Whether a tree of the given type may run locally on this host.
    pub fn accepts(self, kind: TestType) -> bool {
        match kind {
            TestType::Both => true,
            TestType::NodeOnly => self == Host::Native,
            TestType::BrowserOnly => self == Host::Browser,
            TestType::Remote => false,
        }
    }
}

/// Scheduling phase of a work-stream event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Before,
    BeforeEach,
    Test,
    AfterEach,
    After,
    Finally,
}

impl Phase {
    /// Name used in scaffold-failure reports
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::BeforeEach => "before-each",
            Phase::Test => "test",
            Phase::AfterEach => "after-each",
            Phase::After => "after",
            Phase::Finally => "finally",
        }
    }

    /// Hooks that carry a one-shot "already ran" flag
    pub fn is_one_shot(self) -> bool {
        matches!(self, Phase::Before | Phase::BeforeEach)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_eligibility() {
        assert!(Host::Native.accepts(TestType::Both));
        assert!(Host::Native.accepts(TestType::NodeOnly));
        assert!(!Host::Native.accepts(TestType::BrowserOnly));
        assert!(Host::Browser.accepts(TestType::BrowserOnly));
        assert!(!Host::Browser.accepts(TestType::NodeOnly));
        assert!(!Host::Browser.accepts(TestType::Remote));
    }

    #[test]
    fn test_type_parse() {
        assert_eq!("node".parse::<TestType>().unwrap(), TestType::NodeOnly);
        assert_eq!("remote".parse::<TestType>().unwrap(), TestType::Remote);
        assert!("desktop".parse::<TestType>().is_err());
    }

    #[test]
    fn test_type_deserialize_aliases() {
        let kind: TestType = serde_json::from_str("\"browser\"").unwrap();
        assert_eq!(kind, TestType::BrowserOnly);
        let kind: TestType = serde_json::from_str("\"browser_only\"").unwrap();
        assert_eq!(kind, TestType::BrowserOnly);
    }
}
