//! Volume Controller
//!
//! One controller per page. It wires the applier to its three trigger
//! sources (UI messages, user gestures and DOM insertions) plus recovery
//! from platform suspension. Background work runs on a shared executor and
//! only holds weak references, so dropping the controller stops it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use fos_dom::{Event, EventListener, MutationRecord, MutationType};
use fos_media::{AudioContextState, MediaDocument, MediaElementId};
use smol::Executor;

use crate::applier::{ApplyOutcome, ApplyStats, Trigger, VolumeApplier};
use crate::config::{VolumeConfig, DEFAULT_VOLUME};
use crate::gesture::GestureBridge;
use crate::messages::{Request, Response};
use crate::pipeline::{InterruptionHook, PipelineManager};
use crate::registry::Classification;
use crate::watcher::DomWatcher;
use crate::{lock, VolumeError};

/// Diagnostic view of one media element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementStatus {
    pub id: MediaElementId,
    pub classification: Option<Classification>,
    pub native_volume: f64,
    /// Gain in effect when routed
    pub gain: Option<f64>,
}

struct Shared {
    document: Arc<MediaDocument>,
    config: VolumeConfig,
    executor: Arc<Executor<'static>>,
    applier: VolumeApplier,
    gesture: GestureBridge,
    watcher: DomWatcher,
    detached: AtomicBool,
}

impl Shared {
    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    async fn run_apply(self: &Arc<Self>, trigger: Trigger) -> ApplyOutcome {
        let outcome = self.applier.apply(trigger).await;
        if outcome.awaiting_context > 0 && !self.applier.pipeline().is_running() {
            self.arm_gesture();
        }
        outcome
    }

    fn arm_gesture(self: &Arc<Self>) {
        if self.is_detached() {
            return;
        }
        let weak = Arc::downgrade(self);
        let executor = self.executor.clone();
        let listener: EventListener = Arc::new(move |event: &mut Event| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            tracing::trace!(event = %event.event_type, "gesture observed");
            executor.spawn(async move { shared.unlock().await }).detach();
        });
        self.gesture.arm(self.document.event_target(), listener);
    }

    /// Runs for each qualifying gesture while the bridge is armed
    async fn unlock(self: Arc<Self>) {
        if self.is_detached() {
            return;
        }
        if !self.applier.pipeline().try_resume().await {
            tracing::debug!("gesture did not unlock audio; still listening");
            return;
        }
        self.gesture.disarm();
        self.run_apply(Trigger::Gesture).await;
    }

    /// Runs after the platform suspended the running context
    async fn recover(self: Arc<Self>) {
        if self.is_detached() {
            return;
        }
        let resumed = self.applier.pipeline().try_resume().await;
        if self.is_detached() {
            return;
        }
        if resumed {
            tracing::info!("audio context recovered after interruption");
            self.run_apply(Trigger::Recovery).await;
        } else {
            tracing::info!("audio context interrupted; waiting for a gesture");
            self.arm_gesture();
        }
    }

    /// Whether a batch of mutations can change what an apply does: media
    /// the registry has not seen yet, or a new `src` on an element still
    /// waiting to be routed.
    fn needs_apply(&self, records: &[MutationRecord]) -> bool {
        let mut inserted = Vec::new();
        let mut retargeted = Vec::new();
        for record in records {
            match record.mutation_type {
                MutationType::ChildList => {
                    for node in &record.added_nodes {
                        inserted.extend(self.document.media_elements_under(*node));
                    }
                }
                MutationType::Attributes => {
                    retargeted.extend(self.document.media_elements_under(record.target));
                }
            }
        }
        let inserted: Vec<MediaElementId> = inserted.iter().map(|e| lock(e).id()).collect();
        let retargeted: Vec<MediaElementId> = retargeted.iter().map(|e| lock(e).id()).collect();

        let registry = lock(self.applier.registry());
        inserted.iter().any(|id| !registry.contains(*id))
            || retargeted
                .iter()
                .any(|id| registry.classification(*id) == Some(Classification::RoutePending))
    }

    fn volume_report(&self) -> Option<u32> {
        let present: Vec<MediaElementId> =
            self.document.media_elements().iter().map(|e| lock(e).id()).collect();
        if present.is_empty() {
            return None;
        }
        let gain = lock(self.applier.registry()).effective_gain(&present);
        Some(match gain {
            Some(gain) => (gain * 100.0).round().clamp(0.0, f64::from(self.config.ceiling.percent())) as u32,
            None => self.applier.desired(),
        })
    }
}

/// Per-page volume controller
pub struct VolumeController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for VolumeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeController")
            .field("desired", &self.shared.applier.desired())
            .field("pipeline", self.shared.applier.pipeline())
            .field("gesture", &self.shared.gesture)
            .field("watcher", &self.shared.watcher)
            .finish()
    }
}

impl VolumeController {
    /// Attach a controller to `document`.
    ///
    /// Nothing on the page changes until the first set-volume request,
    /// unless `config.default_volume` differs from 100.
    pub fn attach(
        document: Arc<MediaDocument>,
        config: VolumeConfig,
        executor: Arc<Executor<'static>>,
    ) -> Result<Self, VolumeError> {
        config.validate()?;

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let on_interrupted: InterruptionHook = {
                let weak = weak.clone();
                let executor = executor.clone();
                Arc::new(move || {
                    if let Some(shared) = weak.upgrade().filter(|s| !s.is_detached()) {
                        executor.spawn(async move { shared.recover().await }).detach();
                    }
                })
            };
            let pipeline = PipelineManager::new(document.clone(), on_interrupted);
            let applier = VolumeApplier::new(document.clone(), pipeline, config.default_volume);

            let is_relevant = {
                let weak = weak.clone();
                move |records: &[MutationRecord]| weak.upgrade().is_some_and(|s| s.needs_apply(records))
            };
            let on_settled = {
                let weak = weak.clone();
                move || {
                    let weak = weak.clone();
                    async move {
                        match weak.upgrade() {
                            Some(shared) => {
                                shared.run_apply(Trigger::Watcher).await;
                                true
                            }
                            None => false,
                        }
                    }
                }
            };
            let watcher = DomWatcher::start(&document, &executor, config.debounce(), is_relevant, on_settled);

            Shared {
                gesture: GestureBridge::new(config.gesture_events.clone()),
                document: document.clone(),
                config: config.clone(),
                executor: executor.clone(),
                applier,
                watcher,
                detached: AtomicBool::new(false),
            }
        });

        tracing::info!(url = %document.url(), ceiling = %config.ceiling, "volume controller attached");

        if config.default_volume != DEFAULT_VOLUME {
            shared.applier.set_desired(config.default_volume);
            let initial = shared.clone();
            executor
                .spawn(async move {
                    initial.run_apply(Trigger::Attach).await;
                })
                .detach();
        }

        Ok(Self { shared })
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.shared.config
    }

    /// Most recently requested volume (percent)
    pub fn desired_volume(&self) -> u32 {
        self.shared.applier.desired()
    }

    /// Volume to show in the UI, `None` if the page has no media.
    /// Reflects the gain in effect once any element is routed.
    pub fn get_volume(&self) -> Option<u32> {
        self.shared.volume_report()
    }

    /// Clamp and store `requested`, then apply it. Completes once the
    /// apply, including any routing, is done. Returns the clamped volume.
    pub async fn set_volume(&self, requested: f64) -> u32 {
        let volume = self.shared.config.clamp_volume(requested);
        tracing::info!(requested, volume, "set volume");
        self.shared.applier.set_desired(volume);
        self.shared.run_apply(Trigger::Message).await;
        volume
    }

    /// Re-apply the current desired volume
    pub async fn reapply(&self) -> ApplyOutcome {
        self.shared.run_apply(Trigger::Manual).await
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetVolume => Response::Volume {
                volume: self.get_volume(),
            },
            Request::SetVolume { volume } => Response::Set {
                ok: true,
                volume: self.set_volume(volume).await,
            },
        }
    }

    /// Handle one JSON request and return the JSON reply
    pub async fn handle_json(&self, request: &str) -> Result<String, VolumeError> {
        let request: Request = serde_json::from_str(request).map_err(|e| {
            tracing::warn!(error = %e, "malformed request");
            e
        })?;
        let response = self.handle(request).await;
        Ok(serde_json::to_string(&response)?)
    }

    /// Per-element state, in document order
    pub fn snapshot(&self) -> Vec<ElementStatus> {
        let elements = self.shared.document.media_elements();
        let registry = lock(self.shared.applier.registry());
        elements
            .iter()
            .map(|element| {
                let element = lock(element);
                let id = element.id();
                ElementStatus {
                    id,
                    classification: registry.classification(id),
                    native_volume: element.volume(),
                    gain: registry.route(id).map(|route| route.gain()),
                }
            })
            .collect()
    }

    pub fn stats(&self) -> &ApplyStats {
        self.shared.applier.stats()
    }

    pub fn context_state(&self) -> Option<AudioContextState> {
        self.shared.applier.pipeline().state()
    }

    pub fn is_waiting_for_gesture(&self) -> bool {
        self.shared.gesture.is_armed()
    }

    pub fn is_watching(&self) -> bool {
        self.shared.watcher.is_watching()
    }

    /// Stop listening for gestures and DOM changes. Existing routes stay;
    /// captured elements cannot be released.
    pub fn detach(&self) {
        self.shared.detached.store(true, Ordering::Release);
        self.shared.gesture.disarm();
        self.shared.watcher.stop();
        tracing::debug!(url = %self.shared.document.url(), "volume controller detached");
    }
}

impl Drop for VolumeController {
    fn drop(&mut self) {
        self.detach();
    }
}
