//! Run orchestration
//!
//! Selects trees from a pool per an [`Instruction`], then runs them
//! locally (in sequence or concurrently) or remotely, one capability at a
//! time, through the script protocol in [`crate::remote`].

use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RunOptions;
use crate::engine::execute;
use crate::remote::{script, select_capabilities, Action, ActionQueue, Capability, RemoteDriver, SessionBuilder};
use crate::reporter::{category, Entry, Reporter, Snapshot};
use crate::spec::Suite;
use crate::types::{Host, TestType};
use crate::{Error, Result};

const NO_TESTS_HINT: &str = "check for typos in test ids and include paths, and that the selected tests are registered \
     for this environment";

/// Which registered trees to run
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Every eligible tree (`*`)
    All,
    /// Trees whose id matches (`/pattern/`)
    Pattern(Regex),
    /// The tree with this id
    Exact(String),
    /// These trees, regardless of the pool
    Suites(Vec<Suite>),
}

impl FromStr for Instruction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "*" {
            return Ok(Instruction::All);
        }
        match s.strip_prefix('/') {
            Some(pattern) => {
                let pattern = pattern.strip_suffix('/').unwrap_or(pattern);
                Ok(Instruction::Pattern(Regex::new(pattern)?))
            }
            None => Ok(Instruction::Exact(s.to_string())),
        }
    }
}

/// Pick the trees `instruction` names that may run here.
///
/// Remote runs take browser-only, both and remote trees; local runs take
/// what `host` accepts.
pub fn select(pool: &[Suite], instruction: &Instruction, host: Host, remote: bool) -> Vec<Suite> {
    let eligible = |suite: &Suite| {
        if remote {
            matches!(suite.kind, TestType::Both | TestType::BrowserOnly | TestType::Remote)
        } else {
            host.accepts(suite.kind)
        }
    };

    let chosen: Vec<Suite> = match instruction {
        Instruction::All => pool.to_vec(),
        Instruction::Pattern(re) => pool.iter().filter(|s| re.is_match(s.id())).cloned().collect(),
        Instruction::Exact(id) => pool.iter().filter(|s| s.id() == id).cloned().collect(),
        Instruction::Suites(suites) => suites.clone(),
    };
    chosen.into_iter().filter(|s| eligible(s)).collect()
}

/// Snapshot returned by one remote tree (or the session's startup log)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLog {
    pub id: String,
    #[serde(flatten)]
    pub snapshot: Snapshot,
}

/// Remote logs of every capability plus their totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSummary {
    pub logs: Vec<RemoteLog>,
    pub total_count: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub scaffold_fail_count: u64,
}

impl RemoteSummary {
    pub fn new(logs: Vec<RemoteLog>) -> Self {
        let mut summary = Self::default();
        for log in &logs {
            summary.total_count += log.snapshot.total_count;
            summary.pass_count += log.snapshot.pass_count;
            summary.fail_count += log.snapshot.fail_count;
            summary.scaffold_fail_count += log.snapshot.scaffold_fail_count;
        }
        summary.logs = logs;
        summary
    }

    pub fn is_success(&self) -> bool {
        self.fail_count + self.scaffold_fail_count == 0
    }
}

/// What a call to [`Runner::run`] did
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Nothing was selected, or no capability was available
    NothingRun,
    Local(Snapshot),
    Remote(RemoteSummary),
}

/// Result of the default-run policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultRun {
    pub ran_remote: bool,
    /// Local reporter state after the run
    pub local: Snapshot,
    pub remote: Option<RemoteSummary>,
}

impl DefaultRun {
    pub fn is_success(&self) -> bool {
        self.local.is_success() && self.remote.as_ref().map_or(true, RemoteSummary::is_success)
    }
}

/// Runs selected trees against one reporter
#[derive(Clone)]
pub struct Runner {
    /// Shared by every tree of a run
    reporter: Arc<Reporter>,

    options: Arc<RunOptions>,

    /// Receives the test-complete action of remotely controlled runs
    queue: ActionQueue,

    /// Opens remote sessions; remote runs are impossible without one
    sessions: Option<Arc<dyn SessionBuilder>>,
}

impl Runner {
    pub fn new(reporter: Arc<Reporter>, options: RunOptions) -> Self {
        Self {
            reporter,
            options: Arc::new(options),
            queue: ActionQueue::new(),
            sessions: None,
        }
    }

    pub fn with_queue(mut self, queue: ActionQueue) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionBuilder>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    /// Run the trees `instruction` selects from `pool`.
    pub async fn run(&self, pool: &[Suite], instruction: &Instruction, remote: bool) -> RunOutcome {
        let selected = select(pool, instruction, self.options.host, remote);
        if selected.is_empty() {
            self.info(&["run: no tests run", NO_TESTS_HINT]);
            return RunOutcome::NothingRun;
        }

        if !remote {
            self.run_local(&selected).await;
            return RunOutcome::Local(self.reporter.snapshot());
        }

        let capabilities = select_capabilities(
            self.options.capabilities.as_ref(),
            self.options.provider.as_deref(),
            &self.options.cap,
            &self.options.cap_preset,
            &self.reporter,
        );
        if capabilities.is_empty() {
            self.info(&["run: running remote tests, but no capabilities to test"]);
            return RunOutcome::NothingRun;
        }
        RunOutcome::Remote(self.run_remote(&selected, &capabilities).await)
    }

    /// Run trees in this process.
    pub async fn run_local(&self, suites: &[Suite]) {
        if self.options.concurrent {
            join_all(
                suites
                    .iter()
                    .map(|suite| execute(suite, self.reporter.clone(), self.options.clone(), None)),
            )
            .await;
        } else {
            for suite in suites {
                if self.reporter.unexpected() {
                    warn!("Stopping local run before {}: unexpected condition reported", suite.id());
                    break;
                }
                execute(suite, self.reporter.clone(), self.options.clone(), None).await;
            }
        }

        if self.options.remotely_controlled {
            self.queue.push(Action::test_complete(self.reporter.snapshot()));
        }
    }

    /// Run trees remotely, one capability after another.
    pub async fn run_remote(&self, suites: &[Suite], capabilities: &[(String, Capability)]) -> RemoteSummary {
        let mut logs = Vec::new();
        for (name, capability) in capabilities {
            self.log(category::PROGRESS, &[&format!("starting capability:{}", name)]);
            self.run_capability(name, capability, suites, &mut logs).await;
        }
        let summary = RemoteSummary::new(logs);
        info!(
            "Remote run complete: {} tests, {} passed, {} failed, {} scaffold failures",
            summary.total_count, summary.pass_count, summary.fail_count, summary.scaffold_fail_count
        );
        summary
    }

    async fn run_capability(&self, name: &str, capability: &Capability, suites: &[Suite], logs: &mut Vec<RemoteLog>) {
        let Some(sessions) = &self.sessions else {
            self.log(category::ERROR, &[&format!("no session builder configured for capability {}", name)]);
            return;
        };

        let driver = match sessions.build(name, capability).await {
            Ok(driver) => driver,
            Err(err) => {
                self.log(
                    category::ERROR,
                    &["webdriver crashed; it's likely the remote browser has not been shut down", &err.to_string()],
                );
                return;
            }
        };

        if let Err(err) = self.drive(&driver, name, suites, logs).await {
            self.log(category::ERROR, &["remote crashed, capability aborted", &err.to_string()]);
        }
        if let Err(err) = driver.quit().await {
            self.log(
                category::ERROR,
                &["webdriver crashed; it's likely the remote browser has not been shut down", &err.to_string()],
            );
        }
    }

    async fn drive(
        &self,
        driver: &Arc<dyn RemoteDriver>,
        capability: &str,
        suites: &[Suite],
        logs: &mut Vec<RemoteLog>,
    ) -> Result<()> {
        driver.navigate(&self.options.remote_url).await?;

        let load_error = driver.execute_async_script(script::WAIT_FOR_LOADER_IDLE, Vec::new()).await?;
        if !load_error.is_null() && load_error != json!(false) {
            self.log(category::ERROR, &["remote encountered an error loading test resources"]);
            return Err(Error::Session("error loading test resources on remote browser".to_string()));
        }

        let startup = driver.execute_script(script::RESET_LOG, Vec::new()).await?;
        logs.push(RemoteLog {
            id: "startup-log".to_string(),
            snapshot: serde_json::from_value(startup)?,
        });

        for suite in suites {
            if suite.kind == TestType::Remote {
                debug!("Running remote-type tree {} locally with the {} driver", suite.id(), capability);
                execute(suite, self.reporter.clone(), self.options.clone(), Some(driver.clone())).await;
                continue;
            }

            let test_id = format!("{}:{}", capability, suite.id());
            self.log(category::PROGRESS, &[&format!("{}: started", test_id)]);
            driver
                .execute_script(script::EXEC, vec![json!(suite.id()), self.options.remote_options.clone()])
                .await?;

            let snapshot = self.relay_actions(driver.as_ref()).await?;
            if snapshot.pass_count + snapshot.fail_count + snapshot.scaffold_fail_count == 0 {
                self.log(
                    category::WARNING,
                    &[&format!("remote test [{}] did not cause any tests to run", suite.id()), NO_TESTS_HINT],
                );
            }
            self.log(
                category::PROGRESS,
                &[&format!(
                    "[{}] pass: {}, fail: {}, scaffold fail: {}",
                    test_id, snapshot.pass_count, snapshot.fail_count, snapshot.scaffold_fail_count
                )],
            );
            self.reporter.log(
                category::REMOTE_LOG,
                None,
                vec![Entry::from(serde_json::to_value(&snapshot)?)],
                true,
            );
            logs.push(RemoteLog { id: test_id, snapshot });
        }
        Ok(())
    }

    /// Perform queued input actions until the remote run reports completion.
    async fn relay_actions(&self, driver: &dyn RemoteDriver) -> Result<Snapshot> {
        loop {
            let batch = driver.execute_async_script(script::GET_QUEUED_ACTIONS, Vec::new()).await?;
            let mut input = Vec::new();
            let mut actions = Action::batch_from_wire(&batch)?.into_iter();

            while let Some(action) = actions.next() {
                if let Action::TestComplete(snapshot) = action {
                    if actions.next().is_some() {
                        warn!("Actions queued after test completion were dropped");
                    }
                    if !input.is_empty() {
                        driver.perform_actions(&input).await?;
                    }
                    return Ok(*snapshot);
                }
                input.push(action);
            }

            if !input.is_empty() {
                driver.perform_actions(&input).await?;
            }
        }
    }

    /// Decide between a local and a remote run, then run every eligible tree.
    pub async fn run_default(&self, pool: &[Suite]) -> DefaultRun {
        let has = |kinds: &[TestType]| pool.iter().any(|s| kinds.contains(&s.kind));
        let options = &self.options;

        let remote = match options.host {
            Host::Native if options.remote => {
                self.info(&["\"remote\" config option is true, therefore running remote tests"]);
                true
            }
            Host::Native if !options.cap.is_empty() => {
                self.info(&["\"cap\" config option(s) given, therefore running remote tests"]);
                true
            }
            Host::Native if !options.cap_preset.is_empty() => {
                self.info(&["\"capPreset\" config option(s) given, therefore running remote tests"]);
                true
            }
            Host::Native if has(&[TestType::NodeOnly, TestType::Both]) => {
                self.info(&["running native tests"]);
                false
            }
            Host::Native if has(&[TestType::BrowserOnly, TestType::Remote]) => {
                self.info(&["no native tests, but browser and/or remote tests found, therefore running remote tests"]);
                true
            }
            Host::Native => {
                self.info(&["no tests found that can run natively"]);
                return self.default_result(false, None);
            }
            Host::Browser if has(&[TestType::BrowserOnly, TestType::Both]) => {
                self.info(&["running browser tests"]);
                false
            }
            Host::Browser => {
                self.info(&["no tests found that can run on the browser"]);
                return self.default_result(false, None);
            }
        };

        match self.run(pool, &Instruction::All, remote).await {
            RunOutcome::Remote(summary) => self.default_result(true, Some(summary)),
            RunOutcome::NothingRun if remote => {
                self.log(category::UNEXPECTED, &["remote tests did not complete normally"]);
                self.default_result(true, None)
            }
            _ => self.default_result(remote, None),
        }
    }

    fn default_result(&self, ran_remote: bool, remote: Option<RemoteSummary>) -> DefaultRun {
        DefaultRun {
            ran_remote,
            local: self.reporter.snapshot(),
            remote,
        }
    }

    fn log(&self, category: &str, entries: &[&str]) {
        let entries = entries.iter().map(|e| Entry::from(*e)).collect();
        self.reporter.log(category, None, entries, false);
    }

    fn info(&self, entries: &[&str]) {
        self.log(category::INFO, entries);
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("options", &self.options)
            .field("queued", &self.queue.len())
            .field("sessions", &self.sessions.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::Func;
    use crate::reporter::ReporterOptions;
    use crate::spec::{SuiteNode, TestEntry, TestNode};
    use test_case::test_case;

    fn suite(id: &str, kind: TestType) -> Suite {
        Suite {
            root: SuiteNode::leaf(id, Func::sync(|_| Ok(()))),
            kind,
            order: None,
        }
    }

    fn pool() -> Vec<Suite> {
        vec![
            suite("alpha", TestType::Both),
            suite("beta", TestType::NodeOnly),
            suite("gamma", TestType::BrowserOnly),
            suite("delta", TestType::Remote),
            suite("alphabet", TestType::Both),
        ]
    }

    fn ids(suites: &[Suite]) -> Vec<&str> {
        suites.iter().map(Suite::id).collect()
    }

    #[test_case("*", Host::Native, false, &["alpha", "beta", "alphabet"] ; "all native")]
    #[test_case("*", Host::Browser, false, &["alpha", "gamma", "alphabet"] ; "all browser")]
    #[test_case("*", Host::Native, true, &["alpha", "gamma", "delta", "alphabet"] ; "all remote")]
    #[test_case("/^alpha/", Host::Native, false, &["alpha", "alphabet"] ; "pattern")]
    #[test_case("/^alpha", Host::Native, false, &["alpha", "alphabet"] ; "pattern without closing slash")]
    #[test_case("alpha", Host::Native, false, &["alpha"] ; "exact")]
    #[test_case("gamma", Host::Native, false, &[] ; "ineligible exact")]
    fn test_select(instruction: &str, host: Host, remote: bool, expected: &[&str]) {
        let instruction: Instruction = instruction.parse().unwrap();
        assert_eq!(ids(&select(&pool(), &instruction, host, remote)), expected);
    }

    #[test]
    fn test_explicit_suites_instruction() {
        let instruction = Instruction::Suites(vec![suite("own", TestType::Both), suite("skip", TestType::BrowserOnly)]);
        assert_eq!(ids(&select(&pool(), &instruction, Host::Native, false)), vec!["own"]);
    }

    #[test]
    fn test_bad_pattern() {
        assert!(matches!("/(/".parse::<Instruction>(), Err(Error::Pattern(_))));
    }

    #[test]
    fn test_remote_summary_totals() {
        let snapshot = |pass, fail| Snapshot {
            total_count: pass + fail,
            pass_count: pass,
            fail_count: fail,
            ..Default::default()
        };
        let summary = RemoteSummary::new(vec![
            RemoteLog {
                id: "startup-log".to_string(),
                snapshot: snapshot(0, 0),
            },
            RemoteLog {
                id: "chrome:a".to_string(),
                snapshot: snapshot(2, 1),
            },
            RemoteLog {
                id: "firefox:a".to_string(),
                snapshot: snapshot(3, 0),
            },
        ]);
        assert_eq!(summary.total_count, 6);
        assert_eq!(summary.pass_count, 5);
        assert_eq!(summary.fail_count, 1);
        assert!(!summary.is_success());
    }

    #[tokio::test]
    async fn test_nothing_selected_is_informational() {
        let reporter = Arc::new(Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        }));
        let runner = Runner::new(reporter.clone(), RunOptions::default());
        let outcome = runner.run(&pool(), &Instruction::Exact("missing".to_string()), false).await;
        assert!(matches!(outcome, RunOutcome::NothingRun));
        assert!(reporter.get_log(category::INFO).is_some());
        assert_eq!(reporter.fail_count(), 0);
    }

    #[tokio::test]
    async fn test_default_run_without_native_trees_goes_remote() {
        let reporter = Arc::new(Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        }));
        let runner = Runner::new(reporter.clone(), RunOptions::default());
        let pool = vec![suite("gamma", TestType::BrowserOnly)];
        let result = runner.run_default(&pool).await;
        // no capability catalog, so the remote run cannot start
        assert!(result.ran_remote);
        assert!(result.remote.is_none());
        assert!(reporter.unexpected());
    }

    #[tokio::test]
    async fn test_default_run_local() {
        let reporter = Arc::new(Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        }));
        let runner = Runner::new(reporter.clone(), RunOptions::default());
        let nested = TestNode::new("outer").tests(vec![TestEntry::pair("inner", Func::sync(|_| Ok(())))]);
        let nested = crate::spec::validate(&nested, &reporter).unwrap();
        let result = runner.run_default(&[suite("alpha", TestType::Both), nested]).await;
        assert!(!result.ran_remote);
        assert_eq!(result.local.pass_count, 2);
        assert!(result.is_success());
    }
}
