//! Smoke Core Library
//!
//! Hierarchical test trees with scaffolds (`before`, `beforeEach`,
//! `afterEach`, `after`, `finally`), include filtering, an execution
//! engine for synchronous and asynchronous functions, and orchestration of
//! local and remote runs.

pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod func;
pub mod remote;
pub mod reporter;
pub mod runner;
pub mod spec;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use config::{parse_include, parse_list, RunOptions};
pub use engine::execute;
pub use error::{Error, Result};
pub use filter::{filter, Filtered, NodeId, PreparedTree};
pub use func::{assert, CallContext, Failure, Func, FuncRef, Outcome, Scratch, TestResult};
pub use remote::{Action, ActionQueue, Capability, CapabilityCatalog, RemoteDriver, RemoteHost, SessionBuilder};
pub use reporter::{category, Entry, Reporter, ReporterOptions, Snapshot, TestRecord, TestStatus, TestUid};
pub use runner::{select, DefaultRun, Instruction, RemoteSummary, RunOutcome, Runner};
pub use spec::{validate, FunctionRegistry, SpecError, Suite, TestEntry, TestNode, TestRegistry};
pub use stream::{Event, WorkStream};
pub use types::{Host, Phase, TestType};

/// Smoke version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default run-configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "smoke.toml";
