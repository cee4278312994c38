//! Input actions relayed from a remote environment
//!
//! Tests running remotely cannot press keys themselves; they queue actions
//! that the controlling host fetches and performs through its driver. On
//! the wire each action is a `[action-id, args]` pair.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::reporter::Snapshot;
use crate::{Error, Result};

/// Number of empty polls before [`ActionQueue::poll`] gives up
pub const POLL_ATTEMPTS: usize = 20;

/// Delay between empty polls
pub const POLL_BACKOFF: Duration = Duration::from_millis(50);

const TEST_COMPLETE: u64 = 1;
const SEND_KEYS: u64 = 2;
const KEY_DOWN: u64 = 3;
const KEY_UP: u64 = 4;
const CLICK: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// The remote run finished; carries its snapshot
    TestComplete(Box<Snapshot>),
    SendKeys(String),
    /// Press each key in order; special keys use [`key_code`] characters
    KeyDown(Vec<String>),
    KeyUp(Vec<String>),
    /// Click the element with this DOM id
    Click(String),
}

impl Action {
    pub fn test_complete(snapshot: Snapshot) -> Self {
        Action::TestComplete(Box::new(snapshot))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::TestComplete(_) => "testComplete",
            Action::SendKeys(_) => "sendKeys",
            Action::KeyDown(_) => "keyDown",
            Action::KeyUp(_) => "keyUp",
            Action::Click(_) => "click",
        }
    }

    pub fn to_wire(&self) -> Result<Value> {
        Ok(match self {
            Action::TestComplete(snapshot) => json!([TEST_COMPLETE, [serde_json::to_value(snapshot)?]]),
            Action::SendKeys(text) => json!([SEND_KEYS, [text]]),
            Action::KeyDown(keys) => json!([KEY_DOWN, keys]),
            Action::KeyUp(keys) => json!([KEY_UP, keys]),
            Action::Click(id) => json!([CLICK, [id]]),
        })
    }

    pub fn from_wire(value: &Value) -> Result<Self> {
        let pair = value
            .as_array()
            .filter(|pair| pair.len() == 2)
            .ok_or_else(|| Error::Protocol(format!("action must be an [id, args] pair, found {}", value)))?;
        let id = pair[0]
            .as_u64()
            .ok_or_else(|| Error::Protocol(format!("bad action id {}", pair[0])))?;
        let args = pair[1]
            .as_array()
            .ok_or_else(|| Error::Protocol(format!("action args must be a list, found {}", pair[1])))?;

        let strings = || -> Result<Vec<String>> {
            args.iter()
                .map(|a| {
                    a.as_str()
                        .map(String::from)
                        .ok_or_else(|| Error::Protocol(format!("expected a string argument, found {}", a)))
                })
                .collect()
        };
        let first = || -> Result<String> {
            strings()?
                .into_iter()
                .next()
                .ok_or_else(|| Error::Protocol(format!("action {} is missing its argument", id)))
        };

        match id {
            TEST_COMPLETE => {
                let snapshot = args
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::Protocol("testComplete without a snapshot".to_string()))?;
                Ok(Action::test_complete(serde_json::from_value(snapshot)?))
            }
            SEND_KEYS => Ok(Action::SendKeys(strings()?.concat())),
            KEY_DOWN => Ok(Action::KeyDown(strings()?)),
            KEY_UP => Ok(Action::KeyUp(strings()?)),
            CLICK => Ok(Action::Click(first()?)),
            other => Err(Error::Protocol(format!("unknown action id {}", other))),
        }
    }

    /// Decode a batch as returned by the queued-actions script.
    pub fn batch_from_wire(value: &Value) -> Result<Vec<Self>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(Action::from_wire).collect(),
            other => Err(Error::Protocol(format!("action batch must be a list, found {}", other))),
        }
    }
}

/// WebDriver code point of a named special key
pub fn key_code(name: &str) -> Option<char> {
    KEYS.iter().find(|(key, _)| *key == name).map(|(_, code)| *code)
}

const KEYS: &[(&str, char)] = &[
    ("null", '\u{E000}'),
    ("cancel", '\u{E001}'),
    ("help", '\u{E002}'),
    ("back_space", '\u{E003}'),
    ("tab", '\u{E004}'),
    ("clear", '\u{E005}'),
    ("return", '\u{E006}'),
    ("enter", '\u{E007}'),
    ("shift", '\u{E008}'),
    ("control", '\u{E009}'),
    ("alt", '\u{E00A}'),
    ("pause", '\u{E00B}'),
    ("escape", '\u{E00C}'),
    ("space", '\u{E00D}'),
    ("page_up", '\u{E00E}'),
    ("page_down", '\u{E00F}'),
    ("end", '\u{E010}'),
    ("home", '\u{E011}'),
    ("arrow_left", '\u{E012}'),
    ("left", '\u{E012}'),
    ("arrow_up", '\u{E013}'),
    ("up", '\u{E013}'),
    ("arrow_right", '\u{E014}'),
    ("right", '\u{E014}'),
    ("arrow_down", '\u{E015}'),
    ("down", '\u{E015}'),
    ("insert", '\u{E016}'),
    ("delete", '\u{E017}'),
    ("semicolon", '\u{E018}'),
    ("equals", '\u{E019}'),
    ("numpad0", '\u{E01A}'),
    ("numpad1", '\u{E01B}'),
    ("numpad2", '\u{E01C}'),
    ("numpad3", '\u{E01D}'),
    ("numpad4", '\u{E01E}'),
    ("numpad5", '\u{E01F}'),
    ("numpad6", '\u{E020}'),
    ("numpad7", '\u{E021}'),
    ("numpad8", '\u{E022}'),
    ("numpad9", '\u{E023}'),
    ("multiply", '\u{E024}'),
    ("add", '\u{E025}'),
    ("separator", '\u{E026}'),
    ("subtract", '\u{E027}'),
    ("decimal", '\u{E028}'),
    ("divide", '\u{E029}'),
    ("f1", '\u{E031}'),
    ("f2", '\u{E032}'),
    ("f3", '\u{E033}'),
    ("f4", '\u{E034}'),
    ("f5", '\u{E035}'),
    ("f6", '\u{E036}'),
    ("f7", '\u{E037}'),
    ("f8", '\u{E038}'),
    ("f9", '\u{E039}'),
    ("f10", '\u{E03A}'),
    ("f11", '\u{E03B}'),
    ("f12", '\u{E03C}'),
    ("command", '\u{E03D}'),
    ("meta", '\u{E03D}'),
    ("zenkaku_hankaku", '\u{E040}'),
];

/// Pending actions, shared by reference between producer and consumer
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    pending: Arc<Mutex<VecDeque<Action>>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, action: Action) {
        self.pending.lock().push_back(action);
    }

    pub fn extend(&self, actions: impl IntoIterator<Item = Action>) {
        self.pending.lock().extend(actions);
    }

    /// Take everything queued so far.
    pub fn drain(&self) -> Vec<Action> {
        self.pending.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Wait for a non-empty batch, polling with backoff; empty after
    /// [`POLL_ATTEMPTS`] empty polls.
    pub async fn poll(&self) -> Vec<Action> {
        for _ in 0..POLL_ATTEMPTS {
            let batch = self.drain();
            if !batch.is_empty() {
                return batch;
            }
            tokio::time::sleep(POLL_BACKOFF).await;
        }
        self.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form() {
        let wire = Action::KeyDown(vec!["a".to_string(), key_code("shift").unwrap().to_string()])
            .to_wire()
            .unwrap();
        assert_eq!(wire, json!([3, ["a", "\u{E008}"]]));
        assert_eq!(Action::from_wire(&json!([5, ["submit"]])).unwrap(), Action::Click("submit".to_string()));
        assert_eq!(
            Action::from_wire(&json!([2, ["ab", "c"]])).unwrap(),
            Action::SendKeys("abc".to_string())
        );
    }

    #[test]
    fn test_test_complete_carries_snapshot() {
        let snapshot = Snapshot {
            pass_count: 3,
            total_count: 3,
            ..Default::default()
        };
        let wire = Action::test_complete(snapshot.clone()).to_wire().unwrap();
        assert_eq!(wire[1][0]["passCount"], 3);
        let batch = Action::batch_from_wire(&json!([wire])).unwrap();
        assert_eq!(batch, vec![Action::test_complete(snapshot)]);
    }

    #[test]
    fn test_malformed_actions() {
        assert!(Action::from_wire(&json!("click")).is_err());
        assert!(Action::from_wire(&json!([99, []])).is_err());
        assert!(Action::from_wire(&json!([5, []])).is_err());
        assert!(Action::batch_from_wire(&json!({"a": 1})).is_err());
        assert!(Action::batch_from_wire(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_key_table() {
        assert_eq!(key_code("enter"), Some('\u{E007}'));
        assert_eq!(key_code("left"), key_code("arrow_left"));
        assert_eq!(key_code("hyper"), None);
    }

    #[tokio::test]
    async fn test_poll_returns_queued_batch() {
        let queue = ActionQueue::new();
        queue.push(Action::SendKeys("x".to_string()));
        queue.push(Action::Click("ok".to_string()));
        assert_eq!(queue.poll().await.len(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_poll_gives_up_when_empty() {
        let queue = ActionQueue::new();
        let start = std::time::Instant::now();
        assert!(queue.poll().await.is_empty());
        assert!(start.elapsed() >= POLL_BACKOFF * POLL_ATTEMPTS as u32);
    }

    #[tokio::test]
    async fn test_poll_sees_late_producer() {
        let queue = ActionQueue::new();
        let producer = queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            producer.push(Action::KeyUp(vec!["a".to_string()]));
        });
        assert_eq!(queue.poll().await, vec![Action::KeyUp(vec!["a".to_string()])]);
    }
}
