//! Volume Applier
//!
//! Assigns every media element on the page a native volume and, when
//! routed, a gain, as a pure function of the desired volume and the
//! current route/context state. Re-running an apply with nothing changed
//! has no effect, so applies from different triggers may interleave.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fos_media::{MediaDocument, MediaElementId, MediaElementRef};

use crate::eligibility::can_route;
use crate::pipeline::PipelineManager;
use crate::registry::{Classification, ElementRegistry};
use crate::{lock, RouteRefusal};

/// Native volume differences below this are not written
const VOLUME_EPSILON: f64 = 1e-9;

/// What started an apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Controller attached with a non-default volume
    Attach,
    /// set-volume request
    Message,
    /// Gesture bridge unlocked the context
    Gesture,
    /// DOM watcher saw new media
    Watcher,
    /// Context resumed after a platform suspension
    Recovery,
    /// Explicit re-apply by the embedder
    Manual,
}

impl Trigger {
    const ALL: [Trigger; 6] = [
        Trigger::Attach,
        Trigger::Message,
        Trigger::Gesture,
        Trigger::Watcher,
        Trigger::Recovery,
        Trigger::Manual,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Attach => "attach",
            Self::Message => "message",
            Self::Gesture => "gesture",
            Self::Watcher => "watcher",
            Self::Recovery => "recovery",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Apply counters per trigger
#[derive(Debug, Default)]
pub struct ApplyStats {
    counts: [AtomicU64; 6],
}

impl ApplyStats {
    fn record(&self, trigger: Trigger) {
        self.counts[trigger.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, trigger: Trigger) -> u64 {
        self.counts[trigger.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        Trigger::ALL.iter().map(|t| self.count(*t)).sum()
    }
}

/// Result of one apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Desired volume the apply settled on
    pub volume: u32,
    pub native: usize,
    pub routed: usize,
    pub ineligible: usize,
    /// Elements waiting for the context to run
    pub awaiting_context: usize,
    /// Elements waiting for a media source
    pub awaiting_source: usize,
}

impl ApplyOutcome {
    pub fn elements(&self) -> usize {
        self.native + self.routed + self.ineligible + self.awaiting_context + self.awaiting_source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Native,
    Routed,
    Ineligible,
    AwaitingContext,
    AwaitingSource,
}

/// Volume applier
#[derive(Debug)]
pub struct VolumeApplier {
    document: Arc<MediaDocument>,
    pipeline: PipelineManager,
    registry: Mutex<ElementRegistry>,
    desired: AtomicU32,
    engaged: AtomicBool,
    stats: ApplyStats,
}

impl VolumeApplier {
    pub fn new(document: Arc<MediaDocument>, pipeline: PipelineManager, desired: u32) -> Self {
        Self {
            document,
            pipeline,
            registry: Mutex::new(ElementRegistry::new()),
            desired: AtomicU32::new(desired),
            engaged: AtomicBool::new(false),
            stats: ApplyStats::default(),
        }
    }

    pub fn pipeline(&self) -> &PipelineManager {
        &self.pipeline
    }

    pub fn registry(&self) -> &Mutex<ElementRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &ApplyStats {
        &self.stats
    }

    pub fn desired(&self) -> u32 {
        self.desired.load(Ordering::Acquire)
    }

    /// Store a new desired volume. From here on applies write element
    /// state; before, they only track elements so page defaults stand.
    pub fn set_desired(&self, volume: u32) {
        self.desired.store(volume, Ordering::Release);
        self.engaged.store(true, Ordering::Release);
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    /// Apply the desired volume to every media element on the page.
    ///
    /// Elements that need amplification while the context is not running
    /// trigger one resume attempt; the desired volume is read again after
    /// it, so a newer request wins over the one that started this apply.
    pub async fn apply(&self, trigger: Trigger) -> ApplyOutcome {
        self.stats.record(trigger);

        if !self.is_engaged() {
            let elements = self.document.media_elements();
            let mut registry = lock(&self.registry);
            registry.prune();
            for element in &elements {
                let id = lock(element).id();
                registry.track(id, element);
            }
            tracing::trace!(%trigger, elements = elements.len(), "volume not set yet; tracking only");
            return ApplyOutcome {
                volume: self.desired(),
                ..ApplyOutcome::default()
            };
        }

        let outcome = self.settle_all();
        if outcome.awaiting_context == 0 {
            tracing::debug!(%trigger, ?outcome, "volume applied");
            return outcome;
        }

        if !self.pipeline.try_resume().await {
            tracing::debug!(%trigger, pending = outcome.awaiting_context, "amplification pending");
        }

        let outcome = self.settle_all();
        tracing::debug!(%trigger, ?outcome, "volume applied");
        outcome
    }

    fn settle_all(&self) -> ApplyOutcome {
        let desired = self.desired();
        let elements = self.document.media_elements();
        let mut outcome = ApplyOutcome {
            volume: desired,
            ..ApplyOutcome::default()
        };

        let mut registry = lock(&self.registry);
        registry.prune();
        for element in &elements {
            match self.settle(element, desired, &mut registry) {
                Settled::Native => outcome.native += 1,
                Settled::Routed => outcome.routed += 1,
                Settled::Ineligible => outcome.ineligible += 1,
                Settled::AwaitingContext => outcome.awaiting_context += 1,
                Settled::AwaitingSource => outcome.awaiting_source += 1,
            }
        }
        outcome
    }

    fn settle(&self, element: &MediaElementRef, desired: u32, registry: &mut ElementRegistry) -> Settled {
        let id = lock(element).id();
        registry.track(id, element);
        let gain = f64::from(desired) / 100.0;

        if let Some(route) = registry.route(id) {
            route.set_gain(gain);
            write_native(element, id, 1.0, registry);
            return Settled::Routed;
        }

        if desired <= 100 {
            registry.set_transient(id, Classification::NativeOnly);
            write_native(element, id, gain, registry);
            return match registry.classification(id) {
                Some(Classification::Ineligible) => Settled::Ineligible,
                _ => Settled::Native,
            };
        }

        if registry.classification(id) == Some(Classification::Ineligible) {
            write_native(element, id, 1.0, registry);
            return Settled::Ineligible;
        }

        let checked = can_route(&lock(element), self.document.url());
        let refusal = match checked {
            Ok(()) if self.pipeline.is_running() => match self.pipeline.attempt_route(element, registry, gain) {
                Ok(()) => return Settled::Routed,
                Err(refusal) => refusal,
            },
            Ok(()) => RouteRefusal::ContextNotRunning,
            Err(refusal) => refusal,
        };

        if refusal.is_permanent() {
            tracing::debug!(element = %id, reason = %refusal, "element excluded from amplification");
            registry.mark_ineligible(id, refusal);
            write_native(element, id, 1.0, registry);
            return Settled::Ineligible;
        }

        hold_pending(element, id, registry);
        match refusal {
            RouteRefusal::NoSource => Settled::AwaitingSource,
            _ => Settled::AwaitingContext,
        }
    }
}

/// Keep an element that waits for amplification audible: the page's own
/// volume stands, but a lower value this controller wrote is raised.
fn hold_pending(element: &MediaElementRef, id: MediaElementId, registry: &mut ElementRegistry) {
    registry.set_transient(id, Classification::RoutePending);
    if registry.volume_written(id) && lock(element).volume() < 1.0 {
        write_native(element, id, 1.0, registry);
    }
}

fn write_native(element: &MediaElementRef, id: MediaElementId, volume: f64, registry: &mut ElementRegistry) {
    {
        let mut element = lock(element);
        if (element.volume() - volume).abs() > VOLUME_EPSILON {
            if let Err(e) = element.set_volume(volume) {
                tracing::warn!(element = %id, error = %e, "native volume rejected");
            }
        }
    }
    registry.mark_volume_written(id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::InterruptionHook;
    use fos_dom::{Event, EventType};
    use fos_media::HTMLMediaElement;

    fn applier(document: &Arc<MediaDocument>) -> VolumeApplier {
        let hook: InterruptionHook = Arc::new(|| {});
        let pipeline = PipelineManager::new(document.clone(), hook);
        VolumeApplier::new(document.clone(), pipeline, 100)
    }

    fn page() -> Arc<MediaDocument> {
        MediaDocument::new("https://example.com/watch").unwrap()
    }

    fn activate(document: &MediaDocument) {
        document.dispatch_event(Event::trusted(EventType::KeyDown, document.body()));
    }

    fn set(applier: &VolumeApplier, volume: u32) -> ApplyOutcome {
        applier.set_desired(volume);
        smol::block_on(applier.apply(Trigger::Message))
    }

    #[test]
    fn test_untouched_until_engaged() {
        let document = page();
        let element = document.append_media(HTMLMediaElement::video("/a.mp4").with_volume(0.6));
        let applier = applier(&document);

        let outcome = smol::block_on(applier.apply(Trigger::Watcher));
        assert_eq!(outcome.elements(), 0);
        assert_eq!(element.lock().unwrap().volume(), 0.6);
        assert_eq!(lock(applier.registry()).len(), 1);
        assert!(applier.pipeline().context().is_none());
    }

    #[test]
    fn test_native_range() {
        let document = page();
        let element = document.append_media(HTMLMediaElement::audio("/a.mp3"));
        let applier = applier(&document);

        for volume in [0, 35, 100] {
            let outcome = set(&applier, volume);
            assert_eq!(outcome.native, 1);
            assert_eq!(element.lock().unwrap().volume(), f64::from(volume) / 100.0);
        }
        assert!(applier.pipeline().context().is_none());
    }

    #[test]
    fn test_amplify_with_activation() {
        let document = page();
        activate(&document);
        let element = document.append_media(HTMLMediaElement::video("/a.mp4"));
        let applier = applier(&document);

        let outcome = set(&applier, 250);
        assert_eq!(outcome.routed, 1);
        assert!((document.audible_level(&element) - 2.5).abs() < 1e-9);

        let outcome = set(&applier, 40);
        assert_eq!(outcome.routed, 1);
        assert_eq!(element.lock().unwrap().volume(), 1.0);
        assert!((document.audible_level(&element) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_pending_keeps_page_volume() {
        let document = page();
        let element = document.append_media(HTMLMediaElement::video("/a.mp4").with_volume(0.7));
        let applier = applier(&document);

        let outcome = set(&applier, 300);
        assert_eq!(outcome.awaiting_context, 1);
        assert_eq!(element.lock().unwrap().volume(), 0.7);
        assert_eq!(element.lock().unwrap().audio_source(), None);
    }

    #[test]
    fn test_pending_raises_written_volume() {
        let document = page();
        let element = document.append_media(HTMLMediaElement::video("/a.mp4"));
        let applier = applier(&document);

        set(&applier, 30);
        assert_eq!(element.lock().unwrap().volume(), 0.3);

        set(&applier, 300);
        assert_eq!(element.lock().unwrap().volume(), 1.0);
        let id = element.lock().unwrap().id();
        assert_eq!(lock(applier.registry()).classification(id), Some(Classification::RoutePending));
    }

    #[test]
    fn test_missing_source_waits() {
        let document = page();
        activate(&document);
        let element = document.append_media(HTMLMediaElement::video(""));
        let applier = applier(&document);

        let outcome = set(&applier, 200);
        assert_eq!(outcome.awaiting_source, 1);

        element.lock().unwrap().src = "/late.mp4".into();
        let outcome = set(&applier, 200);
        assert_eq!(outcome.routed, 1);
    }

    #[test]
    fn test_ineligible_is_capped() {
        let document = page();
        activate(&document);
        let element = document.append_media(HTMLMediaElement::video("https://cdn.example.net/a.mp4"));
        let applier = applier(&document);

        let outcome = set(&applier, 250);
        assert_eq!(outcome.ineligible, 1);
        assert_eq!(element.lock().unwrap().volume(), 1.0);
        assert_eq!(element.lock().unwrap().audio_source(), None);

        let outcome = set(&applier, 50);
        assert_eq!(outcome.ineligible, 1);
        assert_eq!(element.lock().unwrap().volume(), 0.5);
    }

    #[test]
    fn test_stats_per_trigger() {
        let document = page();
        let applier = applier(&document);
        smol::block_on(applier.apply(Trigger::Watcher));
        smol::block_on(applier.apply(Trigger::Watcher));
        smol::block_on(applier.apply(Trigger::Gesture));

        assert_eq!(applier.stats().count(Trigger::Watcher), 2);
        assert_eq!(applier.stats().count(Trigger::Message), 0);
        assert_eq!(applier.stats().total(), 3);
    }
}
