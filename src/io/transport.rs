use async_trait::async_trait;

use crate::model::query::ListParams;
use crate::model::task::{NewTask, Task, TaskPatch, ToggleField, ToggleIntent};

/// Error type for calls to the remote task store
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Non-2xx response; `message` is the response body as sent by the server
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("unexpected reply to {op}: expected {expected}")]
    UnexpectedReply {
        op: &'static str,
        expected: &'static str,
    },
    #[error("invalid API base URL: {0}")]
    InvalidUrl(String),
}

/// One request against the remote task collection
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    List(ListParams),
    Create(NewTask),
    Update {
        id: String,
        patch: TaskPatch,
    },
    Toggle {
        id: String,
        field: ToggleField,
        intent: ToggleIntent,
    },
    Remove {
        id: String,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::List(_) => "list",
            Operation::Create(_) => "create",
            Operation::Update { .. } => "update",
            Operation::Toggle { .. } => "toggle",
            Operation::Remove { .. } => "remove",
        }
    }
}

/// Parsed response body
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Tasks(Vec<Task>),
    Task(Task),
    Ack,
}

/// Capability to reach the remote task store. No retries happen at this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, op: Operation) -> Result<Reply, TransportError>;

    async fn list(&self, params: ListParams) -> Result<Vec<Task>, TransportError> {
        match self.send(Operation::List(params)).await? {
            Reply::Tasks(tasks) => Ok(tasks),
            _ => Err(unexpected("list", "a task list")),
        }
    }

    async fn create(&self, payload: NewTask) -> Result<Task, TransportError> {
        expect_task("create", self.send(Operation::Create(payload)).await?)
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, TransportError> {
        let op = Operation::Update {
            id: id.to_string(),
            patch,
        };
        expect_task("update", self.send(op).await?)
    }

    async fn toggle(
        &self,
        id: &str,
        field: ToggleField,
        intent: ToggleIntent,
    ) -> Result<Task, TransportError> {
        let op = Operation::Toggle {
            id: id.to_string(),
            field,
            intent,
        };
        expect_task("toggle", self.send(op).await?)
    }

    async fn remove(&self, id: &str) -> Result<(), TransportError> {
        match self.send(Operation::Remove { id: id.to_string() }).await? {
            Reply::Ack => Ok(()),
            _ => Err(unexpected("remove", "an acknowledgement")),
        }
    }
}

fn expect_task(op: &'static str, reply: Reply) -> Result<Task, TransportError> {
    match reply {
        Reply::Task(task) => Ok(task),
        _ => Err(unexpected(op, "a task")),
    }
}

fn unexpected(op: &'static str, expected: &'static str) -> TransportError {
    TransportError::UnexpectedReply { op, expected }
}
