//! Result accumulation
//!
//! The [`Reporter`] counts tests, keeps one record per started test and a
//! map of free-form log categories. It is shared behind an `Arc` by every
//! tree of a run; all mutation happens under a short-lived lock between
//! suspension points, so concurrently running trees never interleave inside
//! a single update.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::RunOptions;
use crate::func::Failure;
use crate::types::Phase;

/// Fixed log categories
pub mod category {
    pub const BAD_TEST_SPEC: &str = "smoke:bad-test-spec";
    pub const BAD_INCLUDE: &str = "smoke:bad-include";
    pub const UNEXPECTED: &str = "smoke:unexpected";
    pub const INFO: &str = "smoke:info";
    pub const PROGRESS: &str = "smoke:progress";
    pub const WARNING: &str = "smoke:warning";
    pub const ERROR: &str = "smoke:error";
    pub const REMOTE_LOG: &str = "smoke:remote-log";
    pub const EXCLUDED: &str = "EXCLUDED";
    pub const SCAFFOLD_FAIL: &str = "SCAFFOLD-FAIL";
    pub const NOTE: &str = "note";
}

/// Handle to one started test record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestUid(u64);

impl TestUid {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestStatus {
    Running,
    Passed { elapsed_ms: f64 },
    Failed { failure: Failure },
}

/// One test's result record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub uid: TestUid,
    pub name: String,
    /// Start time, milliseconds since the Unix epoch
    pub started_at: i64,
    #[serde(flatten)]
    pub status: TestStatus,
}

/// Everything a reporter accumulated since its last reset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub unexpected: bool,
    pub total_count: u64,
    pub pass_count: u64,
    pub fail_count: u64,
    pub scaffold_fail_count: u64,
    #[serde(default)]
    pub results: Vec<TestRecord>,
    #[serde(default)]
    pub logs: BTreeMap<String, Vec<Value>>,
}

impl Snapshot {
    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.fail_count + self.scaffold_fail_count == 0
    }
}

/// One item of a structured log entry
#[derive(Debug, Clone)]
pub enum Entry {
    Text(String),
    Value(Value),
    Failure(Failure),
}

impl From<&str> for Entry {
    fn from(s: &str) -> Self {
        Entry::Text(s.to_string())
    }
}

impl From<String> for Entry {
    fn from(s: String) -> Self {
        Entry::Text(s)
    }
}

impl From<Value> for Entry {
    fn from(v: Value) -> Self {
        Entry::Value(v)
    }
}

impl From<Failure> for Entry {
    fn from(f: Failure) -> Self {
        Entry::Failure(f)
    }
}

impl From<&Failure> for Entry {
    fn from(f: &Failure) -> Self {
        Entry::Failure(f.clone())
    }
}

/// Reporter settings
#[derive(Debug, Clone)]
pub struct ReporterOptions {
    pub name_separator: String,
    pub console: bool,
    pub log_excludes: bool,
}

impl Default for ReporterOptions {
    fn default() -> Self {
        Self {
            name_separator: "/".to_string(),
            console: true,
            log_excludes: true,
        }
    }
}

impl From<&RunOptions> for ReporterOptions {
    fn from(options: &RunOptions) -> Self {
        Self {
            name_separator: options.name_separator.clone(),
            console: options.console,
            log_excludes: options.log_excludes,
        }
    }
}

#[derive(Default)]
struct State {
    id_seed: u64,
    unexpected: bool,
    total_count: u64,
    pass_count: u64,
    fail_count: u64,
    scaffold_fail_count: u64,
    results: Vec<TestRecord>,
    timers: HashMap<TestUid, Instant>,
    logs: BTreeMap<String, Vec<Value>>,
}

impl State {
    fn take_snapshot(&self) -> Snapshot {
        Snapshot {
            unexpected: self.unexpected,
            total_count: self.total_count,
            pass_count: self.pass_count,
            fail_count: self.fail_count,
            scaffold_fail_count: self.scaffold_fail_count,
            results: self.results.clone(),
            logs: self.logs.clone(),
        }
    }

    fn record_mut(&mut self, uid: TestUid) -> Option<&mut TestRecord> {
        let index = usize::try_from(uid.0).ok()?.checked_sub(1)?;
        self.results.get_mut(index)
    }
}

/// Accumulates counts, per-test records and categorized logs
pub struct Reporter {
    options: Mutex<ReporterOptions>,
    state: Mutex<State>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(ReporterOptions::default())
    }
}

impl Reporter {
    pub fn new(options: ReporterOptions) -> Self {
        Self {
            options: Mutex::new(options),
            state: Mutex::new(State::default()),
        }
    }

    pub fn update_options(&self, options: ReporterOptions) {
        *self.options.lock() = options;
    }

    /// Clear everything, returning what was accumulated before.
    pub fn reset(&self) -> Snapshot {
        let mut state = self.state.lock();
        let previous = state.take_snapshot();
        *state = State::default();
        previous
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().take_snapshot()
    }

    pub fn total_count(&self) -> u64 {
        self.state.lock().total_count
    }

    pub fn pass_count(&self) -> u64 {
        self.state.lock().pass_count
    }

    pub fn fail_count(&self) -> u64 {
        self.state.lock().fail_count
    }

    pub fn scaffold_fail_count(&self) -> u64 {
        self.state.lock().scaffold_fail_count
    }

    /// Set once any category ending in `unexpected` is logged
    pub fn unexpected(&self) -> bool {
        self.state.lock().unexpected
    }

    pub fn results(&self) -> Vec<TestRecord> {
        self.state.lock().results.clone()
    }

    pub fn logs(&self) -> BTreeMap<String, Vec<Value>> {
        self.state.lock().logs.clone()
    }

    pub fn get_log(&self, id: &str) -> Option<Vec<Value>> {
        self.state.lock().logs.get(id).cloned()
    }

    /// Join a path of ids into a display name.
    pub fn name(&self, path: &[String]) -> String {
        path.join(&self.options.lock().name_separator)
    }

    pub fn name_of(&self, uid: TestUid) -> Option<String> {
        self.state.lock().record_mut(uid).map(|r| r.name.clone())
    }

    pub fn start_test(&self, context: &[String]) -> TestUid {
        let name = self.name(context);
        let mut state = self.state.lock();
        state.total_count += 1;
        state.id_seed += 1;
        let uid = TestUid(state.id_seed);
        state.results.push(TestRecord {
            uid,
            name,
            started_at: Utc::now().timestamp_millis(),
            status: TestStatus::Running,
        });
        state.timers.insert(uid, Instant::now());
        uid
    }

    pub fn pass_test(&self, uid: TestUid) {
        let console = self.options.lock().console;
        let mut state = self.state.lock();
        state.pass_count += 1;
        let elapsed_ms = state
            .timers
            .remove(&uid)
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or_default();
        if let Some(record) = state.record_mut(uid) {
            record.status = TestStatus::Passed { elapsed_ms };
            if console {
                info!("PASS[{}]", record.name);
            }
        }
    }

    pub fn fail_test(&self, uid: TestUid, failure: &Failure) {
        let console = self.options.lock().console;
        let mut state = self.state.lock();
        state.fail_count += 1;
        state.timers.remove(&uid);
        if let Some(record) = state.record_mut(uid) {
            record.status = TestStatus::Failed {
                failure: failure.clone(),
            };
            if console {
                warn!("FAIL[{}]: {}", record.name, failure);
            }
        }
    }

    /// Record a scaffold failure of the node at `depth` in `context`.
    pub fn fail_scaffold(&self, context: &[String], depth: usize, phase: Phase, failure: &Failure) {
        let end = (depth + 1).min(context.len());
        let scaffold = format!("{}:{}", self.name(&context[..end]), phase);
        self.state.lock().scaffold_fail_count += 1;
        self.log(
            category::SCAFFOLD_FAIL,
            None,
            vec![Entry::from(scaffold.as_str()), Entry::from(failure)],
            true,
        );
        if self.options.lock().console {
            warn!("SCAFFOLD FAIL[{}]: {}", scaffold, failure);
        }
    }

    pub fn exclude_test(&self, context: &[String]) {
        if self.options.lock().log_excludes {
            let name = self.name(context);
            self.log(category::EXCLUDED, None, vec![Entry::Text(name)], false);
        }
    }

    pub fn log_note(&self, note: &str, no_console: bool) {
        self.log(category::NOTE, None, vec![Entry::from(note)], true);
        if self.options.lock().console && !no_console {
            info!("NOTE: {}", note);
        }
    }

    /// Append a structured entry under `category[:sub_id]`.
    ///
    /// A trailing [`Entry::Failure`] is unpacked into its message followed
    /// by its stack frames; a lone non-failure item is stored unwrapped.
    /// Returns the full log id.
    pub fn log(&self, category: &str, sub_id: Option<&str>, mut entries: Vec<Entry>, silent: bool) -> String {
        let id = match sub_id {
            Some(sub) if !sub.is_empty() => format!("{}:{}", category, sub),
            _ => category.to_string(),
        };

        let failure = match entries.last() {
            Some(Entry::Failure(_)) => match entries.pop() {
                Some(Entry::Failure(f)) => Some(f),
                _ => None,
            },
            _ => None,
        };

        let mut values: Vec<Value> = entries.into_iter().map(entry_value).collect();
        let record = match failure {
            Some(f) => {
                values.push(Value::String(f.message));
                values.extend(f.stack.into_iter().map(Value::String));
                Value::Array(values)
            }
            None if values.len() == 1 => values.remove(0),
            None => Value::Array(values),
        };

        let console = self.options.lock().console;
        {
            let mut state = self.state.lock();
            if id.ends_with("unexpected") {
                state.unexpected = true;
            }
            if id.contains("error") {
                state.fail_count += 1;
            }
            state.logs.entry(id.clone()).or_default().push(record.clone());
        }

        if console && !silent {
            info!("LOG[{}] {}", id, render(&record));
        }
        id
    }
}

fn entry_value(entry: Entry) -> Value {
    match entry {
        Entry::Text(s) => Value::String(s),
        Entry::Value(v) => v,
        Entry::Failure(f) => serde_json::json!({ "message": f.message, "stack": f.stack }),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(" | "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> Reporter {
        Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_counts_and_records() {
        let reporter = quiet();
        let path = vec!["root".to_string(), "a".to_string()];
        let a = reporter.start_test(&path);
        let b = reporter.start_test(&["root".to_string(), "b".to_string()]);
        reporter.pass_test(a);
        reporter.fail_test(b, &Failure::new("x"));

        assert_eq!(reporter.total_count(), 2);
        assert_eq!(reporter.pass_count(), 1);
        assert_eq!(reporter.fail_count(), 1);
        assert_eq!(reporter.name_of(a).as_deref(), Some("root/a"));

        let results = reporter.results();
        assert!(matches!(results[0].status, TestStatus::Passed { .. }));
        match &results[1].status {
            TestStatus::Failed { failure } => assert_eq!(failure.message, "x"),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_reset_returns_previous() {
        let reporter = quiet();
        let uid = reporter.start_test(&["t".to_string()]);
        reporter.pass_test(uid);
        let previous = reporter.reset();
        assert_eq!(previous.pass_count, 1);
        assert_eq!(reporter.total_count(), 0);
        assert!(reporter.results().is_empty());
    }

    #[test]
    fn test_log_unpacks_trailing_failure() {
        let reporter = quiet();
        let failure = Failure {
            message: "boom".to_string(),
            stack: vec!["frame 1".to_string()],
        };
        let id = reporter.log("custom", Some("sub"), vec!["context".into(), failure.into()], true);
        assert_eq!(id, "custom:sub");
        let log = reporter.get_log("custom:sub").unwrap();
        assert_eq!(log[0], serde_json::json!(["context", "boom", "frame 1"]));
    }

    #[test]
    fn test_log_single_entry_unwrapped() {
        let reporter = quiet();
        reporter.log(category::INFO, None, vec!["hello".into()], true);
        assert_eq!(reporter.get_log(category::INFO).unwrap()[0], serde_json::json!("hello"));
    }

    #[test]
    fn test_unexpected_and_error_categories() {
        let reporter = quiet();
        reporter.log(category::ERROR, None, vec!["remote crashed".into()], true);
        assert_eq!(reporter.fail_count(), 1);
        assert!(!reporter.unexpected());
        reporter.log(category::UNEXPECTED, None, vec!["internal".into()], true);
        assert!(reporter.unexpected());
    }

    #[test]
    fn test_scaffold_fail_name() {
        let reporter = quiet();
        let context: Vec<String> = ["root", "group", "leaf"].iter().map(|s| s.to_string()).collect();
        reporter.fail_scaffold(&context, 1, Phase::BeforeEach, &Failure::new("bad"));
        assert_eq!(reporter.scaffold_fail_count(), 1);
        let log = reporter.get_log(category::SCAFFOLD_FAIL).unwrap();
        assert_eq!(log[0], serde_json::json!(["root/group:before-each", "bad"]));
    }

    #[test]
    fn test_exclude_gated_by_option() {
        let reporter = Reporter::new(ReporterOptions {
            console: false,
            log_excludes: false,
            ..Default::default()
        });
        reporter.exclude_test(&["root".to_string()]);
        assert!(reporter.get_log(category::EXCLUDED).is_none());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let reporter = quiet();
        let uid = reporter.start_test(&["t".to_string()]);
        reporter.pass_test(uid);
        let json = serde_json::to_value(reporter.snapshot()).unwrap();
        assert_eq!(json["passCount"], 1);
        assert_eq!(json["results"][0]["status"], "passed");
        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_count, 1);
    }
}
