//! DOM Events
//!
//! Event types, `EventTarget` listener registration and abort signals.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::{lock, DomError, NodeId};

/// DOM event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    // Pointer / mouse
    PointerDown,
    PointerUp,
    MouseDown,
    Click,

    // Keyboard
    KeyDown,
    KeyUp,

    // Touch
    TouchStart,
    TouchEnd,

    // Media
    Play,

    // Document
    VisibilityChange,
}

impl EventType {
    /// Event name as used by `addEventListener`
    pub fn name(self) -> &'static str {
        match self {
            Self::PointerDown => "pointerdown",
            Self::PointerUp => "pointerup",
            Self::MouseDown => "mousedown",
            Self::Click => "click",
            Self::KeyDown => "keydown",
            Self::KeyUp => "keyup",
            Self::TouchStart => "touchstart",
            Self::TouchEnd => "touchend",
            Self::Play => "play",
            Self::VisibilityChange => "visibilitychange",
        }
    }

    /// Whether a trusted event of this type grants user activation.
    ///
    /// Mirrors the HTML "activation triggering input event" list. `play` and
    /// `click` are deliberately absent.
    pub fn is_activation_triggering(self) -> bool {
        matches!(
            self,
            Self::PointerDown | Self::PointerUp | Self::MouseDown | Self::KeyDown | Self::TouchEnd
        )
    }
}

impl FromStr for EventType {
    type Err = DomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pointerdown" => Self::PointerDown,
            "pointerup" => Self::PointerUp,
            "mousedown" => Self::MouseDown,
            "click" => Self::Click,
            "keydown" => Self::KeyDown,
            "keyup" => Self::KeyUp,
            "touchstart" => Self::TouchStart,
            "touchend" => Self::TouchEnd,
            "play" => Self::Play,
            "visibilitychange" => Self::VisibilityChange,
            other => return Err(DomError::UnknownEventType(other.to_string())),
        })
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// DOM event
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub target: NodeId,
    pub is_trusted: bool,
    pub cancelable: bool,
    default_prevented: bool,
    in_passive_listener: bool,
    immediate_propagation_stopped: bool,
}

impl Event {
    /// Create a script-dispatched (untrusted) event
    pub fn new(event_type: EventType, target: NodeId) -> Self {
        Self {
            event_type,
            target,
            is_trusted: false,
            cancelable: true,
            default_prevented: false,
            in_passive_listener: false,
            immediate_propagation_stopped: false,
        }
    }

    /// Create a user-agent (trusted) event, e.g. real user input
    pub fn trusted(event_type: EventType, target: NodeId) -> Self {
        Self {
            is_trusted: true,
            ..Self::new(event_type, target)
        }
    }

    /// Prevent default action. Ignored inside passive listeners.
    pub fn prevent_default(&mut self) {
        if self.cancelable && !self.in_passive_listener {
            self.default_prevented = true;
        }
    }

    /// Check if default was prevented
    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// Skip the remaining listeners
    pub fn stop_immediate_propagation(&mut self) {
        self.immediate_propagation_stopped = true;
    }
}

/// Shared abort state
#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
}

/// Signal half of an `AbortController`
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    /// Check if the owning controller aborted
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }
}

/// Abort controller
///
/// One controller can be shared by any number of listeners; aborting it
/// detaches all of them at once.
#[derive(Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort. Returns false if already aborted.
    pub fn abort(&self) -> bool {
        !self.signal.state.aborted.swap(true, Ordering::AcqRel)
    }
}

/// Listener options (`addEventListener` third argument)
#[derive(Debug, Clone, Default)]
pub struct AddEventListenerOptions {
    pub capture: bool,
    pub passive: bool,
    pub once: bool,
    pub signal: Option<AbortSignal>,
}

impl AddEventListenerOptions {
    fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

/// Event listener callback
pub type EventListener = Arc<dyn Fn(&mut Event) + Send + Sync>;

/// Listener registration handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    event_type: EventType,
    listener: EventListener,
    options: AddEventListenerOptions,
}

/// Event target holding listeners for one node
#[derive(Default)]
pub struct EventTarget {
    registrations: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("listeners", &lock(&self.registrations).len())
            .finish()
    }
}

impl EventTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Returns `None` if the signal is already aborted.
    pub fn add_event_listener(
        &self,
        event_type: EventType,
        listener: EventListener,
        options: AddEventListenerOptions,
    ) -> Option<ListenerId> {
        if options.is_aborted() {
            return None;
        }

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.registrations).push(Registration {
            id,
            event_type,
            listener,
            options,
        });
        Some(id)
    }

    /// Remove a listener
    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        let mut registrations = lock(&self.registrations);
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    /// Number of live listeners for an event type
    pub fn listener_count(&self, event_type: EventType) -> usize {
        let mut registrations = lock(&self.registrations);
        registrations.retain(|r| !r.options.is_aborted());
        registrations.iter().filter(|r| r.event_type == event_type).count()
    }

    /// Dispatch an event at this target.
    ///
    /// Capturing listeners run before non-capturing ones. Listeners are
    /// invoked without the registration lock held, so they may add or
    /// remove listeners. Returns false if default was prevented.
    pub fn dispatch_event(&self, event: &mut Event) -> bool {
        let mut batch: Vec<(EventListener, AddEventListenerOptions)> = {
            let mut registrations = lock(&self.registrations);
            registrations.retain(|r| !r.options.is_aborted());

            let batch = registrations
                .iter()
                .filter(|r| r.event_type == event.event_type)
                .map(|r| (r.listener.clone(), r.options.clone()))
                .collect();
            registrations.retain(|r| !(r.options.once && r.event_type == event.event_type));
            batch
        };
        batch.sort_by_key(|(_, options)| !options.capture);
        tracing::trace!(event = %event.event_type, listeners = batch.len(), "dispatching event");

        for (listener, options) in batch {
            if event.immediate_propagation_stopped {
                break;
            }
            // An earlier listener may have aborted this one
            if options.is_aborted() {
                continue;
            }
            event.in_passive_listener = options.passive;
            listener(event);
            event.in_passive_listener = false;
        }

        !event.default_prevented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, EventListener) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, Arc::new(move |_: &mut Event| {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!("pointerdown".parse::<EventType>().unwrap(), EventType::PointerDown);
        assert_eq!(EventType::KeyDown.to_string(), "keydown");
        assert!("wheel".parse::<EventType>().is_err());
    }

    #[test]
    fn test_activation_triggering() {
        assert!(EventType::PointerDown.is_activation_triggering());
        assert!(EventType::KeyDown.is_activation_triggering());
        assert!(!EventType::Play.is_activation_triggering());
        assert!(!EventType::Click.is_activation_triggering());
    }

    #[test]
    fn test_dispatch_and_once() {
        let target = EventTarget::new();
        let (count, listener) = counter();
        target.add_event_listener(EventType::KeyDown, listener, AddEventListenerOptions {
            once: true,
            ..Default::default()
        });

        target.dispatch_event(&mut Event::trusted(EventType::KeyDown, NodeId::ROOT));
        target.dispatch_event(&mut Event::trusted(EventType::KeyDown, NodeId::ROOT));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(target.listener_count(EventType::KeyDown), 0);
    }

    #[test]
    fn test_abort_detaches_all_listeners() {
        let target = EventTarget::new();
        let controller = AbortController::new();
        let (count, listener) = counter();

        for event_type in [EventType::PointerDown, EventType::KeyDown] {
            target.add_event_listener(event_type, listener.clone(), AddEventListenerOptions {
                signal: Some(controller.signal()),
                ..Default::default()
            });
        }
        assert_eq!(target.listener_count(EventType::PointerDown), 1);

        assert!(controller.abort());
        assert!(!controller.abort());

        target.dispatch_event(&mut Event::trusted(EventType::PointerDown, NodeId::ROOT));
        target.dispatch_event(&mut Event::trusted(EventType::KeyDown, NodeId::ROOT));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(target.listener_count(EventType::KeyDown), 0);
    }

    #[test]
    fn test_add_with_aborted_signal() {
        let target = EventTarget::new();
        let controller = AbortController::new();
        controller.abort();
        let (_, listener) = counter();

        let id = target.add_event_listener(EventType::Click, listener, AddEventListenerOptions {
            signal: Some(controller.signal()),
            ..Default::default()
        });
        assert!(id.is_none());
    }

    #[test]
    fn test_passive_listener_cannot_prevent_default() {
        let target = EventTarget::new();
        target.add_event_listener(
            EventType::TouchEnd,
            Arc::new(|event: &mut Event| event.prevent_default()),
            AddEventListenerOptions { passive: true, ..Default::default() },
        );

        let mut event = Event::trusted(EventType::TouchEnd, NodeId::ROOT);
        assert!(target.dispatch_event(&mut event));
        assert!(!event.is_default_prevented());
    }

    #[test]
    fn test_capture_runs_first() {
        let target = EventTarget::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        target.add_event_listener(
            EventType::MouseDown,
            Arc::new(move |_: &mut Event| o.lock().unwrap().push("bubble")),
            AddEventListenerOptions::default(),
        );
        let o = order.clone();
        target.add_event_listener(
            EventType::MouseDown,
            Arc::new(move |_: &mut Event| o.lock().unwrap().push("capture")),
            AddEventListenerOptions { capture: true, ..Default::default() },
        );

        target.dispatch_event(&mut Event::new(EventType::MouseDown, NodeId::ROOT));
        assert_eq!(*order.lock().unwrap(), vec!["capture", "bubble"]);
    }

    #[test]
    fn test_listener_can_abort_siblings() {
        let target = EventTarget::new();
        let controller = Arc::new(AbortController::new());
        let (count, listener) = counter();

        let c = controller.clone();
        target.add_event_listener(
            EventType::KeyDown,
            Arc::new(move |_: &mut Event| {
                c.abort();
            }),
            AddEventListenerOptions { signal: Some(controller.signal()), ..Default::default() },
        );
        target.add_event_listener(EventType::KeyDown, listener, AddEventListenerOptions {
            signal: Some(controller.signal()),
            ..Default::default()
        });

        target.dispatch_event(&mut Event::trusted(EventType::KeyDown, NodeId::ROOT));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
