//! Amplification Pipeline
//!
//! Owns the page's one shared audio context and builds gain routes for
//! media elements. A route is only built while the context is running, so
//! an element is never captured into a graph that cannot play it.

use std::sync::{Arc, Mutex};

use fos_media::{
    AudioContextRef, AudioContextState, GainNode, MediaDocument, MediaElementAudioSourceNode,
    MediaElementRef, MediaError,
};

use crate::eligibility::can_route;
use crate::registry::{ElementRegistry, Route};
use crate::{lock, RouteRefusal};

/// Called when the platform suspends a running context
pub type InterruptionHook = Arc<dyn Fn() + Send + Sync>;

/// Amplification pipeline manager
pub struct PipelineManager {
    document: Arc<MediaDocument>,
    context: Mutex<Option<AudioContextRef>>,
    on_interrupted: InterruptionHook,
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("context", &self.context().map(|c| (c.id(), c.state())))
            .finish()
    }
}

impl PipelineManager {
    pub fn new(document: Arc<MediaDocument>, on_interrupted: InterruptionHook) -> Self {
        Self {
            document,
            context: Mutex::new(None),
            on_interrupted,
        }
    }

    /// The shared context, if one was created
    pub fn context(&self) -> Option<AudioContextRef> {
        lock(&self.context).clone()
    }

    pub fn state(&self) -> Option<AudioContextState> {
        self.context().map(|c| c.state())
    }

    /// The shared context, created on first use. It may be suspended.
    pub fn ensure_context(&self) -> AudioContextRef {
        let mut slot = lock(&self.context);
        if let Some(context) = slot.as_ref() {
            return context.clone();
        }

        let context = self.document.create_audio_context();
        let hook = self.on_interrupted.clone();
        context.on_state_change(Arc::new(move |state| {
            if state == AudioContextState::Suspended {
                hook();
            }
        }));
        tracing::debug!(context = %context.id(), state = ?context.state(), "shared audio context created");

        *slot = Some(context.clone());
        context
    }

    pub fn is_running(&self) -> bool {
        self.context().is_some_and(|c| c.is_running())
    }

    /// Try to bring the shared context to the running state.
    ///
    /// Concurrent attempts are harmless; each one observes the same
    /// outcome. Refusal is expected before the first user gesture.
    pub async fn try_resume(&self) -> bool {
        let context = self.ensure_context();
        if context.is_running() {
            return true;
        }

        match context.resume().await {
            Ok(_) => {
                tracing::info!(context = %context.id(), "audio context running");
                true
            }
            Err(MediaError::NotAllowed(reason)) => {
                tracing::debug!(context = %context.id(), %reason, "resume refused");
                false
            }
            Err(e) => {
                tracing::warn!(context = %context.id(), error = %e, "resume failed");
                false
            }
        }
    }

    /// Route `element` through a new gain stage set to `gain`.
    ///
    /// Does nothing unless the element is eligible and the context is
    /// running. The gain stage is built and connected before the element
    /// is captured, so a failure never leaves the element captured and
    /// unconnected. On success the native volume is pinned to 1.0.
    pub fn attempt_route(
        &self,
        element: &MediaElementRef,
        registry: &mut ElementRegistry,
        gain: f64,
    ) -> Result<(), RouteRefusal> {
        let id = {
            let element = lock(element);
            can_route(&element, self.document.url())?;
            element.id()
        };

        let context = match self.context() {
            Some(context) if context.is_running() => context,
            _ => return Err(RouteRefusal::ContextNotRunning),
        };

        let gain_node = context.create_gain().map_err(|e| RouteRefusal::Graph(e.to_string()))?;
        gain_node.gain.set_value(gain);
        context
            .connect(gain_node.node, context.destination())
            .map_err(|e| RouteRefusal::Graph(e.to_string()))?;

        let source = capture_into(&context, element, &gain_node)?;

        {
            let mut element = lock(element);
            if let Err(e) = element.set_volume(1.0) {
                tracing::warn!(element = %id, error = %e, "failed to pin native volume");
            }
        }
        registry.insert_route(id, Route::new(source, gain_node));
        registry.mark_volume_written(id);

        tracing::debug!(element = %id, context = %context.id(), gain, "element routed");
        Ok(())
    }
}

/// Capture `element` and feed it into `gain_node`. The element can be
/// captured elsewhere after the eligibility check; the gain stage is then
/// released instead of staying connected to the destination.
fn capture_into(
    context: &AudioContextRef,
    element: &MediaElementRef,
    gain_node: &GainNode,
) -> Result<MediaElementAudioSourceNode, RouteRefusal> {
    let source = match context.create_media_element_source(element) {
        Ok(source) => source,
        Err(e) => {
            context.disconnect(gain_node.node);
            return Err(if lock(element).audio_source().is_some() {
                RouteRefusal::AlreadyCaptured
            } else {
                RouteRefusal::Graph(e.to_string())
            });
        }
    };
    if let Err(e) = context.connect(source.node, gain_node.node) {
        tracing::warn!(element = %lock(element).id(), error = %e, "captured element could not be connected");
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_dom::{Event, EventType};
    use fos_media::HTMLMediaElement;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(document: &Arc<MediaDocument>) -> (PipelineManager, Arc<AtomicUsize>) {
        let interruptions = Arc::new(AtomicUsize::new(0));
        let counter = interruptions.clone();
        let hook: InterruptionHook = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (PipelineManager::new(document.clone(), hook), interruptions)
    }

    fn activated_document() -> Arc<MediaDocument> {
        let document = MediaDocument::new("https://example.com/watch").unwrap();
        document.dispatch_event(Event::trusted(EventType::PointerDown, document.body()));
        document
    }

    #[test]
    fn test_context_is_shared() {
        let document = activated_document();
        let (pipeline, _) = manager(&document);
        assert!(pipeline.context().is_none());

        let first = pipeline.ensure_context();
        let second = pipeline.ensure_context();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(pipeline.is_running());
    }

    #[test]
    fn test_no_route_while_suspended() {
        let document = MediaDocument::new("https://example.com/watch").unwrap();
        let (pipeline, _) = manager(&document);
        let element = document.append_media(HTMLMediaElement::video("/a.mp4").with_volume(0.4));
        let mut registry = ElementRegistry::new();
        registry.track(element.lock().unwrap().id(), &element);

        pipeline.ensure_context();
        assert!(!smol::block_on(pipeline.try_resume()));
        assert_eq!(
            pipeline.attempt_route(&element, &mut registry, 2.0),
            Err(RouteRefusal::ContextNotRunning)
        );

        let element = element.lock().unwrap();
        assert_eq!(element.audio_source(), None);
        assert_eq!(element.volume(), 0.4);
    }

    #[test]
    fn test_route_pins_native_volume() {
        let document = activated_document();
        let (pipeline, _) = manager(&document);
        let element = document.append_media(HTMLMediaElement::video("/a.mp4").with_volume(0.3));
        let id = element.lock().unwrap().id();
        let mut registry = ElementRegistry::new();
        registry.track(id, &element);

        pipeline.ensure_context();
        pipeline.attempt_route(&element, &mut registry, 2.0).unwrap();

        assert_eq!(element.lock().unwrap().volume(), 1.0);
        assert_eq!(registry.route(id).map(Route::gain), Some(2.0));
        assert!((document.audible_level(&element) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_foreign_capture_is_refused() {
        let document = activated_document();
        let (pipeline, _) = manager(&document);
        let element = document.append_media(HTMLMediaElement::video("/a.mp4"));
        let mut registry = ElementRegistry::new();
        registry.track(element.lock().unwrap().id(), &element);

        let page_graph = document.create_audio_context();
        let source = page_graph.create_media_element_source(&element).unwrap();
        page_graph.connect(source.node, page_graph.destination()).unwrap();

        pipeline.ensure_context();
        assert_eq!(
            pipeline.attempt_route(&element, &mut registry, 2.0),
            Err(RouteRefusal::AlreadyCaptured)
        );
        assert_eq!(document.audible_level(&element), 1.0);
    }

    #[test]
    fn test_late_capture_releases_gain_stage() {
        let document = activated_document();
        let (pipeline, _) = manager(&document);
        let element = document.append_media(HTMLMediaElement::video("/a.mp4"));
        let context = pipeline.ensure_context();

        // Eligible when checked, then taken by the page's own graph
        let gain_node = context.create_gain().unwrap();
        context.connect(gain_node.node, context.destination()).unwrap();
        document.create_audio_context().create_media_element_source(&element).unwrap();

        assert_eq!(
            capture_into(&context, &element, &gain_node).unwrap_err(),
            RouteRefusal::AlreadyCaptured
        );
        assert_eq!(context.node_count(), 0);
    }

    #[test]
    fn test_platform_suspension_calls_hook() {
        let document = activated_document();
        let (pipeline, interruptions) = manager(&document);
        pipeline.ensure_context();

        document.set_hidden(true);
        assert_eq!(interruptions.load(Ordering::SeqCst), 1);
        assert!(smol::block_on(pipeline.try_resume()));
        assert_eq!(pipeline.state(), Some(AudioContextState::Running));
    }
}
