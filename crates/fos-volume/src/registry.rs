//! Element Registry
//!
//! Tracks how each media element is treated, keyed by element identity.
//! Elements belong to the page; the registry only holds weak references,
//! so an element the page drops disappears from here on the next prune.

use std::collections::HashMap;
use std::sync::{Mutex, Weak};

use fos_media::{
    ContextId, GainNode, HTMLMediaElement, MediaElementAudioSourceNode, MediaElementId,
    MediaElementRef,
};
use serde::Serialize;

use crate::RouteRefusal;

/// Per-element treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Volume fits the native range; no route needed
    NativeOnly,
    /// Waiting for a running audio context (or a source) to be routed
    RoutePending,
    /// Connected to the amplification pipeline
    Routed,
    /// Permanently excluded from routing; native volume, capped at 100%
    Ineligible,
}

/// Element connected to the amplification pipeline
#[derive(Debug, Clone)]
pub struct Route {
    source: MediaElementAudioSourceNode,
    gain: GainNode,
}

impl Route {
    pub(crate) fn new(source: MediaElementAudioSourceNode, gain: GainNode) -> Self {
        Self { source, gain }
    }

    pub fn context(&self) -> ContextId {
        self.source.context
    }

    /// Gain factor in effect
    pub fn gain(&self) -> f64 {
        self.gain.gain.value()
    }

    pub fn set_gain(&self, gain: f64) {
        self.gain.gain.set_value(gain);
    }
}

#[derive(Debug)]
struct RegistryEntry {
    element: Weak<Mutex<HTMLMediaElement>>,
    classification: Classification,
    route: Option<Route>,
    refusal: Option<RouteRefusal>,
    volume_written: bool,
}

/// Registry of known media elements
#[derive(Debug, Default)]
pub struct ElementRegistry {
    entries: HashMap<MediaElementId, RegistryEntry>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `element` if unknown. New elements are pending until
    /// the applier evaluates them.
    pub fn track(&mut self, id: MediaElementId, element: &MediaElementRef) {
        self.entries.entry(id).or_insert_with(|| RegistryEntry {
            element: std::sync::Arc::downgrade(element),
            classification: Classification::RoutePending,
            route: None,
            refusal: None,
            volume_written: false,
        });
    }

    pub fn contains(&self, id: MediaElementId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn classification(&self, id: MediaElementId) -> Option<Classification> {
        self.entries.get(&id).map(|e| e.classification)
    }

    pub fn route(&self, id: MediaElementId) -> Option<&Route> {
        self.entries.get(&id).and_then(|e| e.route.as_ref())
    }

    /// Why the element was excluded from routing, if it was
    pub fn refusal(&self, id: MediaElementId) -> Option<&RouteRefusal> {
        self.entries.get(&id).and_then(|e| e.refusal.as_ref())
    }

    /// Record a route. Routed and ineligible elements never change
    /// classification again, so a second route is ignored.
    pub(crate) fn insert_route(&mut self, id: MediaElementId, route: Route) -> bool {
        match self.entries.get_mut(&id) {
            Some(entry) if entry.route.is_none() && entry.classification != Classification::Ineligible => {
                entry.route = Some(route);
                entry.classification = Classification::Routed;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn mark_ineligible(&mut self, id: MediaElementId, refusal: RouteRefusal) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.route.is_none() {
                entry.classification = Classification::Ineligible;
                entry.refusal = Some(refusal);
            }
        }
    }

    /// Set a transient classification (`NativeOnly` / `RoutePending`).
    /// Terminal classifications are kept.
    pub(crate) fn set_transient(&mut self, id: MediaElementId, classification: Classification) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if !matches!(entry.classification, Classification::Routed | Classification::Ineligible) {
                entry.classification = classification;
            }
        }
    }

    pub(crate) fn mark_volume_written(&mut self, id: MediaElementId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.volume_written = true;
        }
    }

    /// Whether the controller ever wrote this element's native volume
    pub fn volume_written(&self, id: MediaElementId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.volume_written)
    }

    /// Drop entries whose element no longer exists
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.element.strong_count() > 0);
        before - self.entries.len()
    }

    /// Gain of the first routed element among `present`, in the given
    /// order. Routes of elements no longer on the page are not applied
    /// to, so they are skipped.
    pub fn effective_gain(&self, present: &[MediaElementId]) -> Option<f64> {
        present
            .iter()
            .find_map(|id| self.route(*id).map(Route::gain))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
