use relay_core::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default capacity of the bounded channel between a backend and the orchestrator.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Events emitted by a backend while it streams a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A chunk of generated text.
    Fragment { text: String },

    /// The provider signalled the end of the completion.
    Done,

    /// The provider reported an error mid-stream.
    Error { message: String },
}

/// A live completion stream from one backend.
///
/// Events arrive on a bounded channel fed by a producer task. Dropping the
/// stream aborts the producer, which drops its upstream HTTP response and
/// releases the connection.
pub struct BackendStream {
    events: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<RelayResult<()>>,
}

impl BackendStream {
    /// Wrap an existing receiver and its producer task.
    pub fn new(events: mpsc::Receiver<StreamEvent>, task: JoinHandle<RelayResult<()>>) -> Self {
        Self { events, task }
    }

    /// Spawn `producer` with the sending half of a fresh channel of `capacity`.
    pub fn spawn<F, Fut>(capacity: usize, producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<StreamEvent>) -> Fut,
        Fut: Future<Output = RelayResult<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(producer(tx));
        Self::new(rx, task)
    }

    /// Receive the next event, or `None` once the producer has hung up.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Wait for the producer to finish and return its result.
    pub async fn finish(mut self) -> RelayResult<()> {
        // Close our half first so a producer blocked on a full channel wakes up.
        self.events.close();
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(RelayError::Http("stream task cancelled".into())),
            Err(e) => Err(RelayError::Http(format!("stream task panicked: {e}"))),
        }
    }
}

impl Drop for BackendStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
