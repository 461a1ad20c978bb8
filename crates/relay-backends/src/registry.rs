//! The fixed backend rotation and the shared selector over it.

use crate::backends::{build_backend, ChatBackend};
use crate::config::BackendConfig;
use relay_core::{RelayError, RelayResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Ordered list of backends, fixed at startup.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn ChatBackend>>,
}

impl BackendRegistry {
    /// Create a registry. Fails if `backends` is empty.
    pub fn new(backends: Vec<Arc<dyn ChatBackend>>) -> RelayResult<Self> {
        if backends.is_empty() {
            return Err(RelayError::Config(
                "at least one backend must be configured".into(),
            ));
        }
        Ok(Self { backends })
    }

    /// Build adapters for every config, keeping their order.
    pub fn from_configs(configs: Vec<BackendConfig>) -> RelayResult<Self> {
        Self::new(configs.into_iter().map(build_backend).collect())
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always `false`; kept for the `len`/`is_empty` pair.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn ChatBackend>> {
        self.backends.get(index)
    }

    /// Backend names in rotation order.
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }
}

/// A backend handed out by the [`Selector`], with its registry position.
#[derive(Clone)]
pub struct Selected {
    pub index: usize,
    pub backend: Arc<dyn ChatBackend>,
}

/// Process-wide round-robin over a [`BackendRegistry`].
///
/// The cursor lives in `[0, N)` and every draw advances it by exactly one
/// position with a single atomic read-modify-write, so concurrent requests
/// never observe the same pre-advance value. Which backends a given session
/// sees still depends on how its draws interleave with other sessions.
pub struct Selector {
    registry: Arc<BackendRegistry>,
    cursor: AtomicUsize,
}

impl Selector {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Current cursor position, i.e. the index the next draw will return.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    /// Return the backend at the cursor and advance the cursor by one.
    pub fn next(&self) -> Selected {
        let index = self.advance();
        self.selected(index)
    }

    /// Draw like [`next`](Self::next), but never return a backend in `tried`.
    ///
    /// Sequential callers get exactly the round-robin order. When a concurrent
    /// session has moved the cursor onto a backend this session already used,
    /// the first untried backend after it in rotation order is returned
    /// instead. Returns `None` once every backend has been tried.
    pub fn next_untried(&self, tried: &[usize]) -> Option<Selected> {
        let n = self.registry.len();
        if tried.len() >= n {
            return None;
        }
        let start = self.advance();
        (0..n)
            .map(|offset| (start + offset) % n)
            .find(|index| !tried.contains(index))
            .map(|index| self.selected(index))
    }

    fn advance(&self) -> usize {
        let n = self.registry.len();
        match self
            .cursor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some((c + 1) % n))
        {
            Ok(previous) | Err(previous) => previous,
        }
    }

    fn selected(&self, index: usize) -> Selected {
        Selected {
            index,
            backend: self.registry.backends[index].clone(),
        }
    }
}
