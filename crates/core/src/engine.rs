//! Execution engine
//!
//! Drives a [`WorkStream`] to exhaustion. Each event's function is called
//! once; a `Ready` outcome is handled without suspending and a `Pending`
//! one is awaited before the next event is requested, so within a tree no
//! two calls ever overlap.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::RunOptions;
use crate::filter::filter;
use crate::func::{CallContext, Failure, Func, Outcome, Scratch};
use crate::remote::RemoteDriver;
use crate::reporter::{category, Entry, Reporter};
use crate::spec::Suite;
use crate::stream::{Event, WorkStream};
use crate::types::Phase;
use crate::Result;

/// Filter and run one suite, recording everything in `reporter`.
///
/// Never fails: user failures are recorded as results and engine defects
/// are logged under [`category::UNEXPECTED`].
pub async fn execute(
    suite: &Suite,
    reporter: Arc<Reporter>,
    options: Arc<RunOptions>,
    driver: Option<Arc<dyn RemoteDriver>>,
) {
    let filtered = filter(suite, &options.include, &reporter);
    if filtered.error {
        reporter.log(
            category::BAD_TEST_SPEC,
            None,
            vec![
                Entry::from(suite.id()),
                Entry::from("test not run because of errors in test specification"),
            ],
            false,
        );
        return;
    }
    let Some(tree) = filtered.tree else {
        return;
    };

    debug!("Executing {} ({} nodes)", suite.id(), tree.len());
    let mut run = Run {
        stream: WorkStream::new(tree, reporter.clone()),
        reporter,
        options,
        driver,
        scratch: Scratch::default(),
    };

    if let Err(err) = run.drive().await {
        error!("Execution of {} stopped: {}", suite.id(), err);
        run.reporter.log(
            category::UNEXPECTED,
            None,
            vec![Entry::from(suite.id()), Entry::from(err.to_string())],
            false,
        );
    }
}

struct Run {
    stream: WorkStream,
    reporter: Arc<Reporter>,
    options: Arc<RunOptions>,
    driver: Option<Arc<dyn RemoteDriver>>,
    scratch: Scratch,
}

impl Run {
    async fn drive(&mut self) -> Result<()> {
        while let Some(event) = self.stream.next_event()? {
            self.dispatch(event).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, event: Event) -> Result<()> {
        let names = self.stream.names(&event.context)?;
        let path = names[..=event.depth].to_vec();

        if event.phase == Phase::Test {
            let uid = self.reporter.start_test(&names);
            let cx = self.call_context(path, Some(uid));
            match invoke(&event.func, cx).await {
                Ok(()) => self.reporter.pass_test(uid),
                Err(failure) => {
                    self.reporter.fail_test(uid, &failure);
                    if self.options.quit_on_first_fail {
                        self.stream.abort_all(&event.context)?;
                    }
                }
            }
            return Ok(());
        }

        let cx = self.call_context(path, None);
        match invoke(&event.func, cx).await {
            Ok(()) => {
                if event.phase.is_one_shot() {
                    self.stream.mark_done(event.node, event.phase)?;
                }
            }
            Err(failure) => {
                self.reporter.fail_scaffold(&names, event.depth, event.phase, &failure);
                if self.options.quit_on_first_fail {
                    self.stream.abort_all(&event.context)?;
                } else {
                    self.stream.abort_from(&event.context, event.depth)?;
                }
            }
        }
        Ok(())
    }

    fn call_context(&self, path: Vec<String>, uid: Option<crate::reporter::TestUid>) -> CallContext {
        CallContext::new(
            path,
            uid,
            self.reporter.clone(),
            self.options.clone(),
            self.driver.clone(),
            self.scratch.clone(),
        )
    }
}

/// Call `func`, folding panics and both outcome shapes into one result.
pub(crate) async fn invoke(func: &Func, cx: CallContext) -> std::result::Result<(), Failure> {
    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| func.call(cx))) {
        Ok(outcome) => outcome,
        Err(payload) => return Err(Failure::from_panic(payload)),
    };
    match outcome {
        Outcome::Ready(result) => result.map_err(Failure::from),
        Outcome::Pending(future) => match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result.map_err(Failure::from),
            Err(payload) => Err(Failure::from_panic(payload)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::ReporterOptions;
    use crate::spec::{validate, TestEntry, TestNode};

    fn reporter() -> Arc<Reporter> {
        Arc::new(Reporter::new(ReporterOptions {
            console: false,
            ..Default::default()
        }))
    }

    fn suite(node: TestNode, reporter: &Reporter) -> Suite {
        validate(&node, reporter).unwrap()
    }

    #[tokio::test]
    async fn test_sync_and_async_outcomes() {
        let reporter = reporter();
        let node = TestNode::new("root").tests(vec![
            TestEntry::pair("sync-pass", Func::sync(|_| Ok(()))),
            TestEntry::pair("sync-err", Func::sync(|_| anyhow::bail!("bad"))),
            TestEntry::pair("panic", Func::sync(|_| panic!("boom"))),
            TestEntry::pair("async-pass", Func::future(|_| async { Ok::<(), anyhow::Error>(()) })),
            TestEntry::pair("async-err", Func::future(|_| async { Err::<(), _>(anyhow::anyhow!("later")) })),
        ]);
        let suite = suite(node, &reporter);
        execute(&suite, reporter.clone(), Arc::new(RunOptions::default()), None).await;

        assert_eq!(reporter.total_count(), 5);
        assert_eq!(reporter.pass_count(), 2);
        assert_eq!(reporter.fail_count(), 3);
        assert_eq!(reporter.scaffold_fail_count(), 0);
    }

    #[tokio::test]
    async fn test_call_context_path_and_scratch() {
        let reporter = reporter();
        let node = TestNode::new("root")
            .before(Func::sync(|cx| {
                assert_eq!(cx.test_name(), "root");
                assert!(cx.test_uid().is_none());
                cx.scratch().insert("fixture", 41u32);
                Ok(())
            }))
            .tests(vec![TestEntry::pair(
                "leaf",
                Func::sync(|cx| {
                    crate::func::assert(cx.test_name() == "root/leaf", "name")?;
                    crate::func::assert(cx.test_uid().is_some(), "uid")?;
                    crate::func::assert(cx.scratch().get::<u32>("fixture") == Some(41), "fixture")
                }),
            )]);
        let suite = suite(node, &reporter);
        execute(&suite, reporter.clone(), Arc::new(RunOptions::default()), None).await;
        assert_eq!(reporter.pass_count(), 1);
    }

    #[tokio::test]
    async fn test_bad_include_runs_nothing() {
        let reporter = reporter();
        let node = TestNode::new("root").test(Func::sync(|_| Ok(())));
        let suite = suite(node, &reporter);
        let options = RunOptions {
            include: vec![vec![]],
            ..Default::default()
        };
        execute(&suite, reporter.clone(), Arc::new(options), None).await;
        assert_eq!(reporter.total_count(), 0);
        assert!(reporter.get_log(category::BAD_TEST_SPEC).is_some());
        assert!(reporter.get_log(category::BAD_INCLUDE).is_some());
    }
}
