//! Gesture Bridge
//!
//! Audio contexts stay suspended until the page sees a real user gesture.
//! The bridge listens for qualifying input at the document, capturing and
//! passive, so the page can neither block nor delay it. Every listener
//! shares one abort signal and all of them go away together on `disarm`.

use std::sync::Mutex;

use fos_dom::{AbortController, AddEventListenerOptions, EventListener, EventTarget, EventType};

use crate::lock;

/// One-shot gesture listener set
#[derive(Debug)]
pub struct GestureBridge {
    events: Vec<EventType>,
    armed: Mutex<Option<AbortController>>,
}

impl GestureBridge {
    pub fn new(events: Vec<EventType>) -> Self {
        Self {
            events,
            armed: Mutex::new(None),
        }
    }

    /// Register `on_gesture` for every configured event type on `target`.
    /// Returns false if the bridge is already armed.
    pub fn arm(&self, target: &EventTarget, on_gesture: EventListener) -> bool {
        let mut armed = lock(&self.armed);
        if armed.as_ref().is_some_and(|c| !c.signal().is_aborted()) {
            return false;
        }

        let controller = AbortController::new();
        for event in &self.events {
            target.add_event_listener(*event, on_gesture.clone(), AddEventListenerOptions {
                capture: true,
                passive: true,
                once: false,
                signal: Some(controller.signal()),
            });
        }
        tracing::debug!(events = ?self.events, "gesture bridge armed");
        *armed = Some(controller);
        true
    }

    /// Remove every listener at once. Returns false if nothing was armed.
    pub fn disarm(&self) -> bool {
        match lock(&self.armed).take() {
            Some(controller) => {
                let aborted = controller.abort();
                if aborted {
                    tracing::debug!("gesture bridge disarmed");
                }
                aborted
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        lock(&self.armed).as_ref().is_some_and(|c| !c.signal().is_aborted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_dom::{Event, NodeId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_listener() -> (EventListener, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let listener: EventListener = Arc::new(move |event: &mut Event| {
            // Passive: the page's default action must survive
            event.prevent_default();
            h.fetch_add(1, Ordering::SeqCst);
        });
        (listener, hits)
    }

    #[test]
    fn test_arm_registers_each_event() {
        let target = EventTarget::new();
        let bridge = GestureBridge::new(vec![EventType::PointerDown, EventType::KeyDown]);
        let (listener, hits) = counting_listener();

        assert!(bridge.arm(&target, listener.clone()));
        assert!(!bridge.arm(&target, listener));
        assert_eq!(target.listener_count(EventType::PointerDown), 1);
        assert_eq!(target.listener_count(EventType::KeyDown), 1);
        assert_eq!(target.listener_count(EventType::Play), 0);

        let mut event = Event::trusted(EventType::KeyDown, NodeId::ROOT);
        target.dispatch_event(&mut event);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!event.is_default_prevented());
    }

    #[test]
    fn test_disarm_detaches_all_listeners() {
        let target = EventTarget::new();
        let bridge = GestureBridge::new(vec![EventType::PointerDown, EventType::TouchEnd]);
        let (listener, hits) = counting_listener();
        bridge.arm(&target, listener.clone());

        assert!(bridge.disarm());
        assert!(!bridge.disarm());
        assert!(!bridge.is_armed());
        target.dispatch_event(&mut Event::trusted(EventType::PointerDown, NodeId::ROOT));
        target.dispatch_event(&mut Event::trusted(EventType::TouchEnd, NodeId::ROOT));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(target.listener_count(EventType::PointerDown), 0);

        // Re-arming after a disarm registers fresh listeners
        assert!(bridge.arm(&target, listener));
        assert!(bridge.is_armed());
    }
}
