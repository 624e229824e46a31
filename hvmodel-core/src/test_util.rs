//! Test utilities: a scripted, call-recording remote invoker.
//!
//! Replies are queued per operation and handed out in order. An operation
//! with nothing queued answers with an empty reply.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::invoker::{Params, Record, RemoteInvoker, Reply};
use crate::service::Service;

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: String,
    pub params: Params,
}

#[derive(Debug)]
enum Scripted {
    Reply(Value),
    Fail { code: i32, message: String },
    Transport(String),
}

#[derive(Debug, Default)]
struct State {
    scripted: HashMap<String, VecDeque<Scripted>>,
    calls: Vec<Call>,
}

#[derive(Debug, Clone, Default)]
pub struct MockInvoker {
    state: Arc<Mutex<State>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, operation: &str, scripted: Scripted) -> &Self {
        self.state()
            .scripted
            .entry(operation.to_string())
            .or_default()
            .push_back(scripted);
        self
    }

    /// Queues `reply` (an object, an array of objects or null) for `operation`.
    pub fn reply(&self, operation: &str, reply: Value) -> &Self {
        self.push(operation, Scripted::Reply(reply))
    }

    /// Queues a remote rejection for `operation`.
    pub fn fail(&self, operation: &str, code: i32, message: &str) -> &Self {
        self.push(
            operation,
            Scripted::Fail {
                code,
                message: message.to_string(),
            },
        )
    }

    /// Queues a transport failure for `operation`.
    pub fn disconnect(&self, operation: &str, message: &str) -> &Self {
        self.push(operation, Scripted::Transport(message.to_string()))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .map(|call| call.operation.clone())
            .collect()
    }

    /// Parameters of every call to `operation`, oldest first.
    pub fn calls_to(&self, operation: &str) -> Vec<Params> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .map(|call| call.params.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Service over this invoker scoped to host `computer_name`.
    pub fn service(&self, computer_name: &str) -> Service {
        Service::new(
            Arc::new(self.clone()),
            ServiceConfig::default().with_computer(computer_name),
        )
    }
}

#[async_trait]
impl RemoteInvoker for MockInvoker {
    async fn invoke(&self, operation: &str, params: Params) -> Result<Reply> {
        let scripted = {
            let mut state = self.state();
            state.calls.push(Call {
                operation: operation.to_string(),
                params,
            });
            state
                .scripted
                .get_mut(operation)
                .and_then(VecDeque::pop_front)
        };
        match scripted {
            None => Ok(Reply::Many(Vec::new())),
            Some(Scripted::Reply(value)) => Reply::from_value(value),
            Some(Scripted::Fail { code, message }) => Err(Error::RemoteOperation {
                operation: operation.to_string(),
                code,
                message,
            }),
            Some(Scripted::Transport(message)) => Err(Error::Transport(message)),
        }
    }
}

/// Builds a record from a JSON object literal; anything else is empty.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}
