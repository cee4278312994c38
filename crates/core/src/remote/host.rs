//! The remote side of the script protocol
//!
//! [`RemoteHost`] answers the scripts a controlling runner sends, running
//! trees from its own pool on a browser-hosted [`Runner`]. [`LoopbackDriver`]
//! connects a controlling runner straight to a host in the same process.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{script, Action, ActionQueue, Capability, RemoteDriver, SessionBuilder};
use crate::config::{parse_include, RunOptions};
use crate::reporter::{Reporter, ReporterOptions};
use crate::runner::{Instruction, RunOutcome, Runner};
use crate::spec::Suite;
use crate::types::Host;
use crate::{Error, Result};

pub struct RemoteHost {
    runner: Runner,
    pool: Arc<Vec<Suite>>,

    /// Reported by the loader-idle script instead of null
    load_error: Option<String>,
}

impl RemoteHost {
    pub fn new(pool: Vec<Suite>, mut options: RunOptions) -> Self {
        options.host = Host::Browser;
        options.remotely_controlled = true;
        let reporter = Arc::new(Reporter::new(ReporterOptions::from(&options)));
        Self {
            runner: Runner::new(reporter, options),
            pool: Arc::new(pool),
            load_error: None,
        }
    }

    pub fn with_load_error(mut self, error: impl Into<String>) -> Self {
        self.load_error = Some(error.into());
        self
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        self.runner.reporter()
    }

    pub fn queue(&self) -> &ActionQueue {
        self.runner.queue()
    }

    /// Answer one protocol script.
    pub async fn handle(&self, source: &str, args: &[Value]) -> Result<Value> {
        match source {
            script::WAIT_FOR_LOADER_IDLE => Ok(self.load_error.clone().map_or(Value::Null, Value::String)),
            script::RESET_LOG => Ok(serde_json::to_value(self.reporter().reset())?),
            script::EXEC => self.exec(args),
            script::GET_QUEUED_ACTIONS => {
                let batch = self.queue().poll().await;
                let wire = batch.iter().map(Action::to_wire).collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(wire))
            }
            other => Err(Error::Protocol(format!("unsupported script: {}", other))),
        }
    }

    /// Start the tree named by `args[0]`; `args[1]` carries per-run remote options.
    fn exec(&self, args: &[Value]) -> Result<Value> {
        let id = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("exec requires a test id".to_string()))?
            .to_string();

        let mut options = self.runner.options().clone();
        if let Some(remote_options) = args.get(1).filter(|v| !v.is_null()) {
            if let Some(include) = remote_options.get("include").and_then(Value::as_str) {
                options.include = parse_include(include);
            }
            options.remote_options = remote_options.clone();
        }

        self.reporter().reset();
        let run_id = Uuid::new_v4();
        info!("Remote exec {} of {}", run_id, id);

        let runner = self.runner.clone().with_options(options);
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let outcome = runner.run(&pool, &Instruction::Exact(id), false).await;
            if let RunOutcome::NothingRun = outcome {
                runner.queue().push(Action::test_complete(runner.reporter().snapshot()));
            }
            debug!("Remote exec {} finished", run_id);
        });

        Ok(Value::String(run_id.to_string()))
    }
}

/// Driver talking to a [`RemoteHost`] in the same process
pub struct LoopbackDriver {
    host: Arc<RemoteHost>,
    url: Mutex<Option<String>>,
    performed: Mutex<Vec<Action>>,
    quit: Mutex<bool>,
}

impl LoopbackDriver {
    pub fn new(host: Arc<RemoteHost>) -> Self {
        Self {
            host,
            url: Mutex::new(None),
            performed: Mutex::new(Vec::new()),
            quit: Mutex::new(false),
        }
    }

    pub fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    /// Input actions performed so far
    pub fn performed(&self) -> Vec<Action> {
        self.performed.lock().clone()
    }

    pub fn has_quit(&self) -> bool {
        *self.quit.lock()
    }
}

#[async_trait]
impl RemoteDriver for LoopbackDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        *self.url.lock() = Some(url.to_string());
        Ok(())
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.host.handle(script, &args).await
    }

    async fn execute_async_script(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.host.handle(script, &args).await
    }

    async fn perform_actions(&self, actions: &[Action]) -> Result<()> {
        self.performed.lock().extend_from_slice(actions);
        Ok(())
    }

    async fn quit(&self) -> Result<()> {
        *self.quit.lock() = true;
        Ok(())
    }
}

/// Opens a [`LoopbackDriver`] on the same host for every capability
pub struct LoopbackBuilder {
    host: Arc<RemoteHost>,
    opened: Mutex<Vec<Arc<LoopbackDriver>>>,
}

impl LoopbackBuilder {
    pub fn new(host: Arc<RemoteHost>) -> Self {
        Self {
            host,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Drivers built so far, in order
    pub fn opened(&self) -> Vec<Arc<LoopbackDriver>> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl SessionBuilder for LoopbackBuilder {
    async fn build(&self, name: &str, _capability: &Capability) -> Result<Arc<dyn RemoteDriver>> {
        debug!("Opening loopback session for {}", name);
        let driver = Arc::new(LoopbackDriver::new(self.host.clone()));
        self.opened.lock().push(driver.clone());
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::Func;
    use crate::spec::SuiteNode;
    use crate::types::TestType;

    fn host() -> RemoteHost {
        let options = RunOptions {
            console: false,
            ..Default::default()
        };
        let pool = vec![
            Suite {
                root: SuiteNode::leaf("browser", Func::sync(|_| Ok(()))),
                kind: TestType::BrowserOnly,
                order: None,
            },
            Suite {
                root: SuiteNode::leaf("native", Func::sync(|_| Ok(()))),
                kind: TestType::NodeOnly,
                order: None,
            },
        ];
        RemoteHost::new(pool, options)
    }

    async fn complete(host: &RemoteHost) -> Action {
        loop {
            let batch = host.handle(script::GET_QUEUED_ACTIONS, &[]).await.unwrap();
            if let Some(first) = Action::batch_from_wire(&batch).unwrap().into_iter().next() {
                return first;
            }
        }
    }

    #[tokio::test]
    async fn test_exec_queues_test_complete() {
        let host = host();
        let run_id = host.handle(script::EXEC, &[Value::from("browser")]).await.unwrap();
        assert!(Uuid::parse_str(run_id.as_str().unwrap()).is_ok());

        match complete(&host).await {
            Action::TestComplete(snapshot) => assert_eq!(snapshot.pass_count, 1),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_of_ineligible_tree_still_completes() {
        let host = host();
        host.handle(script::EXEC, &[Value::from("native"), Value::Null]).await.unwrap();
        match complete(&host).await {
            Action::TestComplete(snapshot) => assert_eq!(snapshot.total_count, 0),
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let host = host().with_load_error("missing module");
        assert_eq!(
            host.handle(script::WAIT_FOR_LOADER_IDLE, &[]).await.unwrap(),
            Value::from("missing module")
        );
        assert!(matches!(host.handle(script::EXEC, &[]).await, Err(Error::Protocol(_))));
        assert!(matches!(host.handle("return 1", &[]).await, Err(Error::Protocol(_))));
    }
}
