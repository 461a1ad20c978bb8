//! Backend adapters and failover orchestration for the Relay gateway.
//!
//! A fixed [`BackendRegistry`] is rotated by a process-wide [`Selector`];
//! the [`FailoverOrchestrator`] streams each request through successive
//! backends until one completes, recording usage in a [`StatsTracker`].

pub mod backends;
pub mod config;
pub mod failover;
pub mod registry;
pub mod sse;
pub mod stats;
pub mod stream;

pub use backends::{build_backend, ChatBackend};
pub use config::{default_backends, validate_environment, BackendConfig, BackendProvider};
pub use failover::{FailoverOrchestrator, SessionEvent, SessionOutcome};
pub use registry::{BackendRegistry, Selected, Selector};
pub use stats::{ServiceCounts, StatsSnapshot, StatsTracker};
pub use stream::{BackendStream, StreamEvent};
