//! Web Audio API
//!
//! Audio contexts, media element sources and gain nodes.

mod context;

pub use context::{
    AudioContext, AudioContextRef, AudioContextState, AudioParam, ContextId, GainNode,
    MediaElementAudioSourceNode, NodeHandle, StateChangeCallback,
};
