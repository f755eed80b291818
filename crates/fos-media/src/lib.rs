//! fOS Media
//!
//! Media APIs for the fOS browser engine.
//!
//! Features:
//! - HTMLVideoElement, HTMLAudioElement (shared `HTMLMediaElement`)
//! - Web Audio API: `AudioContext`, media element sources, gain nodes
//! - User activation tracking for autoplay policy
//! - `MediaDocument`: the page as seen by media integrations

pub mod activation;
pub mod audio;
pub mod document;
pub mod element;

pub use activation::UserActivation;
pub use audio::{
    AudioContext, AudioContextRef, AudioContextState, AudioParam, ContextId, GainNode,
    MediaElementAudioSourceNode, NodeHandle, StateChangeCallback,
};
pub use document::MediaDocument;
pub use element::{CorsSettings, HTMLMediaElement, MediaElementId, MediaElementRef, MediaKind};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Media error
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Not supported: {0}")]
    NotSupported(String),
    
    #[error("Invalid state: {0}")]
    InvalidState(String),
    
    #[error("Not allowed: {0}")]
    NotAllowed(String),
    
    #[error("Index size error: {0} is outside [0, 1]")]
    IndexSize(f64),
    
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
