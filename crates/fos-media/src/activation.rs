//! User Activation
//!
//! Sticky user activation for autoplay policy. Once a trusted
//! activation-triggering input event reached the page, audio contexts may
//! leave the suspended state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-page user activation state
#[derive(Debug, Clone, Default)]
pub struct UserActivation {
    sticky: Arc<AtomicBool>,
}

impl UserActivation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an activation-triggering input event
    pub fn notify(&self) {
        if !self.sticky.swap(true, Ordering::AcqRel) {
            tracing::debug!("page gained user activation");
        }
    }

    /// Whether the page has ever been activated
    pub fn has_been_active(&self) -> bool {
        self.sticky.load(Ordering::Acquire)
    }
}
