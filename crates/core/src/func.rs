//! Test and scaffold function values
//!
//! A [`Func`] is what a test tree ultimately calls. It may finish
//! synchronously ([`Outcome::Ready`]) or hand back a future
//! ([`Outcome::Pending`]); the engine treats an `Err`, a panic during the
//! call, a panic while polling, and a future resolving to `Err` identically.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::backtrace::BacktraceStatus;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::RunOptions;
use crate::remote::RemoteDriver;
use crate::reporter::{Reporter, TestUid};

/// What a user function returns
pub type TestResult = anyhow::Result<()>;

/// Synchronous value or deferred completion of one call
pub enum Outcome {
    Ready(TestResult),
    Pending(BoxFuture<'static, TestResult>),
}

type Body = dyn Fn(CallContext) -> Outcome + Send + Sync;

/// A named, cloneable test or scaffold function
#[derive(Clone)]
pub struct Func {
    name: Arc<str>,
    body: Arc<Body>,
}

impl Func {
    /// Wrap a function that decides per call whether to finish now or later.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(CallContext) -> Outcome + Send + Sync + 'static,
    {
        Self {
            name: item_name::<F>().into(),
            body: Arc::new(f),
        }
    }

    /// Wrap a function that always completes synchronously.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(CallContext) -> TestResult + Send + Sync + 'static,
    {
        Self {
            name: item_name::<F>().into(),
            body: Arc::new(move |cx| Outcome::Ready(f(cx))),
        }
    }

    /// Wrap a function that returns a future.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        Self {
            name: item_name::<F>().into(),
            body: Arc::new(move |cx| Outcome::Pending(Box::pin(f(cx)))),
        }
    }

    /// Override the derived name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into().into();
        self
    }

    /// Name of the function; empty for closures that were never named.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, cx: CallContext) -> Outcome {
        (self.body)(cx)
    }
}

impl std::fmt::Debug for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Func").field(&self.name).finish()
    }
}

/// Last path segment of a fn item's type name.
///
/// Closures, fn pointers and boxed `dyn Fn` have no usable name; their type
/// name is a signature, so anything that is not a plain identifier is empty.
fn item_name<F>() -> String {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") {
        return String::new();
    }
    let last = full.rsplit("::").next().unwrap_or(full);
    if is_identifier(last) {
        last.to_string()
    } else {
        String::new()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// A function slot in an authored tree.
///
/// Declaratively loaded trees refer to functions by name; a name that did
/// not resolve stays `Unresolved` until validation reports it.
#[derive(Clone, Debug)]
pub enum FuncRef {
    Func(Func),
    Unresolved(String),
}

impl From<Func> for FuncRef {
    fn from(f: Func) -> Self {
        FuncRef::Func(f)
    }
}

/// A recorded failure: message plus stack frames
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    #[serde(default)]
    pub stack: Vec<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Convert a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with a non-string payload".to_string()
        };
        Self {
            message: format!("panicked: {}", message),
            stack: Vec::new(),
        }
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        let mut stack: Vec<String> = err
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {}", cause))
            .collect();
        let backtrace = err.backtrace();
        if backtrace.status() == BacktraceStatus::Captured {
            stack.extend(
                backtrace
                    .to_string()
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from),
            );
        }
        Self {
            message: err.to_string(),
            stack,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Typed scratch space shared by every test and hook of one run of one tree
#[derive(Clone, Default)]
pub struct Scratch {
    slots: Arc<Mutex<HashMap<String, Box<dyn Any + Send>>>>,
}

impl Scratch {
    pub fn insert<T: Any + Send>(&self, key: impl Into<String>, value: T) {
        self.slots.lock().insert(key.into(), Box::new(value));
    }

    /// Clone out a value; `None` when missing or of another type.
    pub fn get<T: Any + Send + Clone>(&self, key: &str) -> Option<T> {
        self.slots
            .lock()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Mutate a value in place.
    pub fn with<T: Any + Send, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut slots = self.slots.lock();
        slots.get_mut(key).and_then(|v| v.downcast_mut::<T>()).map(f)
    }

    pub fn remove<T: Any + Send>(&self, key: &str) -> Option<T> {
        let value = self.slots.lock().remove(key)?;
        value.downcast::<T>().ok().map(|b| *b)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.lock().contains_key(key)
    }
}

/// Receiver handed to every test and scaffold call
#[derive(Clone)]
pub struct CallContext {
    path: Arc<[String]>,
    name: Arc<str>,
    test_uid: Option<TestUid>,
    reporter: Arc<Reporter>,
    options: Arc<RunOptions>,
    driver: Option<Arc<dyn RemoteDriver>>,
    scratch: Scratch,
}

impl CallContext {
    pub(crate) fn new(
        path: Vec<String>,
        test_uid: Option<TestUid>,
        reporter: Arc<Reporter>,
        options: Arc<RunOptions>,
        driver: Option<Arc<dyn RemoteDriver>>,
        scratch: Scratch,
    ) -> Self {
        let name = path.join(&options.name_separator);
        Self {
            path: path.into(),
            name: name.into(),
            test_uid,
            reporter,
            options,
            driver,
            scratch,
        }
    }

    /// Display name of the ancestor chain (`root/group/test`)
    pub fn test_name(&self) -> &str {
        &self.name
    }

    /// Ids from the root down to the current node
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Reporter slot of the running test; `None` inside scaffolds
    pub fn test_uid(&self) -> Option<TestUid> {
        self.test_uid
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Remote driver, present when a remote-type tree runs against a session
    pub fn driver(&self) -> Option<&Arc<dyn RemoteDriver>> {
        self.driver.as_ref()
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }
}

static ASSERT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// The one assertion primitive: fails the calling test when `condition` is false.
pub fn assert(condition: bool, message: &str) -> TestResult {
    bump_assert_count();
    if !condition {
        let message = if message.is_empty() { "fail" } else { message };
        anyhow::bail!("{}", message);
    }
    Ok(())
}

pub fn bump_assert_count() {
    ASSERT_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn assert_count() -> usize {
    ASSERT_COUNT.load(Ordering::Relaxed)
}

pub fn reset_assert_count() {
    ASSERT_COUNT.store(0, Ordering::Relaxed);
}
