//! fOS DOM - Document Object Model
//!
//! DOM primitives used by page integrations:
//! - Node identity
//! - Events, `EventTarget` listeners and abort signals
//! - Mutation observers

mod events;
mod observer;

pub use events::{
    AbortController, AbortSignal, AddEventListenerOptions, Event, EventListener,
    EventTarget, EventType, ListenerId,
};
pub use observer::{
    MutationCallback, MutationObserver, MutationObserverInit, MutationRecord, MutationType,
};

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Root node ID
    pub const ROOT: NodeId = NodeId(0);
    
    /// Create from a raw index
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    
    /// Raw index
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// DOM error
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// Lock a mutex, recovering the data if a listener panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
