//! Failover orchestration across the backend rotation.
//!
//! One session drives at most N attempts (N = number of backends), each on a
//! backend this session has not tried yet:
//!
//! ```text
//! SELECT -> STREAM -> SUCCESS
//!              \----> RETRY -> SELECT ...
//!                         \--> EXHAUSTED
//! ```
//!
//! Fragments are forwarded to the client channel as soon as the backend
//! produces them. A backend that fails after emitting text therefore leaves
//! that partial text in the client stream, and the next backend's output is
//! appended after it.

use crate::backends::ChatBackend;
use crate::registry::{BackendRegistry, Selected, Selector};
use crate::stats::StatsTracker;
use crate::stream::{StreamEvent, DEFAULT_CHANNEL_CAPACITY};
use relay_core::{ChatMessage, RelayError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};

/// What the client side of a session receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Text from the active backend, in production order.
    Fragment(String),
    /// Terminal failure after every backend was tried.
    Failed(String),
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    /// A backend finished its stream after emitting at least one fragment.
    Completed { backend: String, attempts: usize },
    /// No backend succeeded; `error` is the synthesized exhaustion error.
    Exhausted { error: RelayError, attempts: usize },
    /// The client went away; the active backend stream was dropped.
    Cancelled { attempts: usize },
}

/// Per-request failover state.
#[derive(Default)]
struct FailoverSession {
    attempt_index: usize,
    has_emitted: bool,
    last_error: Option<RelayError>,
    tried: Vec<usize>,
}

impl FailoverSession {
    fn begin_attempt(&mut self, index: usize) {
        self.attempt_index += 1;
        self.has_emitted = false;
        self.tried.push(index);
    }
}

enum AttemptResult {
    Finished,
    Failed(RelayError),
    Cancelled,
}

/// Drives failover sessions over a shared [`Selector`] and [`StatsTracker`].
pub struct FailoverOrchestrator {
    selector: Selector,
    stats: Arc<StatsTracker>,
    channel_capacity: usize,
}

impl FailoverOrchestrator {
    pub fn new(registry: Arc<BackendRegistry>, stats: Arc<StatsTracker>) -> Self {
        Self {
            selector: Selector::new(registry),
            stats,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Capacity of the client channel created by [`spawn`](Self::spawn).
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn stats(&self) -> &Arc<StatsTracker> {
        &self.stats
    }

    /// Run one session on a background task and return the client channel.
    ///
    /// Dropping the receiver cancels the session and the active backend stream.
    pub fn spawn(self: &Arc<Self>, messages: Vec<ChatMessage>) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let this = Arc::clone(self);
        tokio::spawn(
            async move {
                let outcome = this.run(&messages, &tx).await;
                debug!(?outcome, "Session finished");
            }
            .instrument(tracing::Span::current()),
        );
        rx
    }

    /// Run one session, forwarding its events into `out`.
    ///
    /// On exhaustion a final [`SessionEvent::Failed`] is sent before returning.
    pub async fn run(
        &self,
        messages: &[ChatMessage],
        out: &mpsc::Sender<SessionEvent>,
    ) -> SessionOutcome {
        let max_attempts = self.selector.registry().len();
        let mut session = FailoverSession::default();

        while session.attempt_index < max_attempts {
            let Some(Selected { index, backend }) = self.selector.next_untried(&session.tried)
            else {
                break;
            };
            session.begin_attempt(index);

            let name = backend.name().to_string();
            info!(
                backend = %name,
                attempt = session.attempt_index,
                max_attempts,
                "Attempt {}/{}: using backend {}",
                session.attempt_index,
                max_attempts,
                name
            );
            self.stats.record_attempt(&name);

            let failure = match self.attempt(backend.as_ref(), messages, out, &mut session).await {
                AttemptResult::Finished if session.has_emitted => {
                    info!(backend = %name, "Successfully completed request");
                    return SessionOutcome::Completed {
                        backend: name,
                        attempts: session.attempt_index,
                    };
                }
                AttemptResult::Finished => RelayError::EmptyResponse {
                    backend: name.clone(),
                },
                AttemptResult::Failed(e) => e,
                AttemptResult::Cancelled => {
                    info!(backend = %name, "Client disconnected, stopping session");
                    return SessionOutcome::Cancelled {
                        attempts: session.attempt_index,
                    };
                }
            };

            self.stats.record_failure(&name);
            warn!(
                backend = %name,
                attempt = session.attempt_index,
                emitted = session.has_emitted,
                error = %failure,
                "Backend failed"
            );
            session.last_error = Some(failure);

            if session.attempt_index < max_attempts {
                info!("Falling back to next backend");
            }
        }

        let error = RelayError::exhausted(session.last_error.as_ref());
        error!(attempts = session.attempt_index, error = %error, "All backends failed");
        let _ = out.send(SessionEvent::Failed(error.to_string())).await;
        SessionOutcome::Exhausted {
            error,
            attempts: session.attempt_index,
        }
    }

    async fn attempt(
        &self,
        backend: &dyn ChatBackend,
        messages: &[ChatMessage],
        out: &mpsc::Sender<SessionEvent>,
        session: &mut FailoverSession,
    ) -> AttemptResult {
        let name = backend.name();

        let mut stream = tokio::select! {
            biased;
            _ = out.closed() => return AttemptResult::Cancelled,
            started = backend.chat_stream(messages) => match started {
                Ok(stream) => stream,
                Err(e) => return AttemptResult::Failed(attribute(name, e)),
            },
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = out.closed() => return AttemptResult::Cancelled,
                event = stream.next_event() => event,
            };

            match event {
                Some(StreamEvent::Fragment { text }) => {
                    if text.is_empty() {
                        continue;
                    }
                    if out.send(SessionEvent::Fragment(text)).await.is_err() {
                        return AttemptResult::Cancelled;
                    }
                    session.has_emitted = true;
                }
                Some(StreamEvent::Error { message }) => {
                    return AttemptResult::Failed(RelayError::backend(name, message));
                }
                Some(StreamEvent::Done) | None => break,
            }
        }

        tokio::select! {
            biased;
            _ = out.closed() => AttemptResult::Cancelled,
            finished = stream.finish() => match finished {
                Ok(()) => AttemptResult::Finished,
                Err(e) => AttemptResult::Failed(attribute(name, e)),
            },
        }
    }
}

/// Make sure a failure names the backend it came from, exactly once.
fn attribute(backend: &str, err: RelayError) -> RelayError {
    match err {
        err if err.is_backend_failure() => err,
        RelayError::Http(message) => RelayError::backend(backend, message),
        other => RelayError::backend(backend, other.to_string()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
