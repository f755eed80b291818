//! fOS Volume
//!
//! Per-page media volume control from 0% up to a ceiling of 600%.
//!
//! Up to 100% the native `volume` of each `<audio>`/`<video>` element is
//! used. Beyond that an element is routed through a gain stage in one
//! shared audio context. Routing never risks silencing media:
//! - cross-origin media without CORS is never captured
//! - capture only happens while the audio context is running
//! - a routed element keeps native volume 1.0 for good
//!
//! Autoplay policy keeps the context suspended until a user gesture, so a
//! one-shot gesture bridge finishes pending amplification, and a debounced
//! DOM watcher covers media the page inserts later.

mod applier;
mod config;
mod controller;
mod eligibility;
mod error;
mod gesture;
mod messages;
mod pipeline;
mod registry;
mod watcher;

pub use applier::{ApplyOutcome, ApplyStats, Trigger, VolumeApplier};
pub use config::{VolumeCeiling, VolumeConfig, DEFAULT_DEBOUNCE_MS, DEFAULT_VOLUME};
pub use controller::{ElementStatus, VolumeController};
pub use eligibility::can_route;
pub use error::{RouteRefusal, VolumeError};
pub use gesture::GestureBridge;
pub use messages::{Request, Response};
pub use pipeline::{InterruptionHook, PipelineManager};
pub use registry::{Classification, ElementRegistry, Route};
pub use watcher::{spawn_debounced, DomWatcher, Notifier};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
