use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::io::transport::{Operation, Reply, Transport, TransportError};
use crate::model::task::Task;

type Handler = Box<dyn Fn(&Operation) -> Result<Reply, TransportError> + Send + Sync>;

/// Scripted transport: records every operation, answers through `handler`,
/// and can park a request until the test releases it.
pub struct MockTransport {
    handler: Handler,
    calls: Mutex<Vec<Operation>>,
    holds: Mutex<VecDeque<Hold>>,
}

struct Hold {
    arrived: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Test-side end of a parked request
pub struct HeldRequest {
    arrived: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl HeldRequest {
    /// Resolves once the parked request has reached the transport.
    pub async fn arrived(&mut self) {
        let _ = (&mut self.arrived).await;
    }

    pub fn release(self) {
        let _ = self.release.send(());
    }
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&Operation) -> Result<Reply, TransportError> + Send + Sync + 'static,
    ) -> Self {
        MockTransport {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            holds: Mutex::new(VecDeque::new()),
        }
    }

    /// Every request fails with a 500 carrying `message`.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::new(move |_| {
            Err(TransportError::Status {
                status: 500,
                message: message.clone(),
            })
        })
    }

    /// Park the next request until the returned handle is released.
    pub fn hold_next(&self) -> HeldRequest {
        let (arrived_tx, arrived_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        self.holds.lock().unwrap().push_back(Hold {
            arrived: arrived_tx,
            release: release_rx,
        });
        HeldRequest {
            arrived: arrived_rx,
            release: release_tx,
        }
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded operations with the given name
    pub fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.name() == name)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, op: Operation) -> Result<Reply, TransportError> {
        self.calls.lock().unwrap().push(op.clone());
        let hold = self.holds.lock().unwrap().pop_front();
        if let Some(hold) = hold {
            let _ = hold.arrived.send(());
            let _ = hold.release.await;
        }
        (self.handler)(&op)
    }
}

pub fn task(id: &str, title: &str) -> Task {
    Task {
        id: id.to_string(),
        title: title.to_string(),
        category: None,
        done: false,
        archived: false,
        created_at: None,
        updated_at: None,
        due_date: None,
    }
}

pub fn done_task(id: &str, title: &str) -> Task {
    Task {
        done: true,
        ..task(id, title)
    }
}
