//! Media Document
//!
//! The page as seen by media integrations: a node tree holding media
//! elements, document-level event dispatch, mutation observers, the page's
//! audio contexts and visibility.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use fos_dom::{Event, EventTarget, EventType, MutationObserver, MutationRecord, NodeId};
use url::Url;

use crate::activation::UserActivation;
use crate::audio::{AudioContext, AudioContextRef, AudioContextState};
use crate::element::{HTMLMediaElement, MediaElementRef};
use crate::{lock, MediaError};

#[derive(Debug, Default)]
struct DocNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    media: Option<MediaElementRef>,
}

#[derive(Debug)]
struct NodeTree {
    nodes: HashMap<NodeId, DocNode>,
    next_id: u32,
}

impl NodeTree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(NodeId::ROOT, DocNode::default());
        Self { nodes, next_id: 1 }
    }

    fn insert(&mut self, parent: NodeId, media: Option<MediaElementRef>) -> Option<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }
        let id = NodeId::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, DocNode {
            parent: Some(parent),
            children: Vec::new(),
            media,
        });
        self.nodes.get_mut(&parent)?.children.push(id);
        Some(id)
    }

    fn ancestors(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(&node).and_then(|n| n.parent);
        while let Some(id) = current {
            chain.push(id);
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        chain
    }

    /// Media elements at or below `node`, in tree order
    fn media_under(&self, node: NodeId, out: &mut Vec<MediaElementRef>) {
        if let Some(entry) = self.nodes.get(&node) {
            if let Some(media) = &entry.media {
                out.push(media.clone());
            }
            for child in &entry.children {
                self.media_under(*child, out);
            }
        }
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(entry) = self.nodes.remove(&node) {
            for child in entry.children {
                self.detach(child);
            }
        }
    }
}

/// Page document
#[derive(Debug)]
pub struct MediaDocument {
    url: Url,
    activation: UserActivation,
    events: EventTarget,
    tree: Mutex<NodeTree>,
    observers: Mutex<Vec<Weak<MutationObserver>>>,
    contexts: Mutex<Vec<Weak<AudioContext>>>,
    hidden: AtomicBool,
}

impl MediaDocument {
    /// Create an empty document loaded from `url`
    pub fn new(url: &str) -> Result<Arc<Self>, MediaError> {
        Ok(Arc::new(Self {
            url: Url::parse(url)?,
            activation: UserActivation::new(),
            events: EventTarget::new(),
            tree: Mutex::new(NodeTree::new()),
            observers: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
            hidden: AtomicBool::new(false),
        }))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn activation(&self) -> &UserActivation {
        &self.activation
    }

    /// Document-level event target
    pub fn event_target(&self) -> &EventTarget {
        &self.events
    }

    /// The body node
    pub fn body(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Append a plain container element (e.g. a `<div>`) under `parent`
    pub fn create_container(&self, parent: NodeId) -> Option<NodeId> {
        let node = lock(&self.tree).insert(parent, None)?;
        self.notify_child_list(parent, vec![node], Vec::new());
        Some(node)
    }

    /// Insert a media element under `parent`
    pub fn insert_media(&self, parent: NodeId, element: HTMLMediaElement) -> Option<(NodeId, MediaElementRef)> {
        let element = element.into_shared();
        let node = lock(&self.tree).insert(parent, Some(element.clone()))?;
        self.notify_child_list(parent, vec![node], Vec::new());
        Some((node, element))
    }

    /// Append a media element to the body
    pub fn append_media(&self, element: HTMLMediaElement) -> MediaElementRef {
        let element = element.into_shared();
        let node = lock(&self.tree).insert(NodeId::ROOT, Some(element.clone()));
        if let Some(node) = node {
            self.notify_child_list(NodeId::ROOT, vec![node], Vec::new());
        }
        element
    }

    /// Remove a node and its subtree
    pub fn remove(&self, node: NodeId) -> bool {
        if node == NodeId::ROOT {
            return false;
        }
        let parent = {
            let mut tree = lock(&self.tree);
            let Some(parent) = tree.nodes.get(&node).and_then(|n| n.parent) else {
                return false;
            };
            if let Some(entry) = tree.nodes.get_mut(&parent) {
                entry.children.retain(|child| *child != node);
            }
            tree.detach(node);
            parent
        };
        self.notify_child_list(parent, Vec::new(), vec![node]);
        true
    }

    /// Every media element currently in the document, in tree order
    pub fn media_elements(&self) -> Vec<MediaElementRef> {
        self.media_elements_under(NodeId::ROOT)
    }

    /// Media elements at or below `node`
    pub fn media_elements_under(&self, node: NodeId) -> Vec<MediaElementRef> {
        let mut out = Vec::new();
        lock(&self.tree).media_under(node, &mut out);
        out
    }

    pub fn has_media(&self) -> bool {
        !self.media_elements().is_empty()
    }

    /// Register a mutation observer with this document. The document holds
    /// it weakly.
    pub fn register_observer(&self, observer: &Arc<MutationObserver>) {
        let mut observers = lock(&self.observers);
        observers.retain(|o| o.strong_count() > 0);
        observers.push(Arc::downgrade(observer));
    }

    /// Set the `src` attribute of an element in the tree. The selected
    /// resource is reset until the element loads again.
    pub fn set_media_source(&self, element: &MediaElementRef, src: &str) -> bool {
        let node = {
            let tree = lock(&self.tree);
            tree.nodes
                .iter()
                .find(|(_, n)| n.media.as_ref().is_some_and(|m| Arc::ptr_eq(m, element)))
                .map(|(id, _)| *id)
        };
        let Some(node) = node else {
            return false;
        };
        {
            let mut element = lock(element);
            element.src = src.to_string();
            element.current_src.clear();
        }
        self.notify(MutationRecord::attribute(node, "src"));
        true
    }

    fn notify_child_list(&self, target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) {
        self.notify(MutationRecord::child_list(target, added, removed));
    }

    fn notify(&self, record: MutationRecord) {
        let target = record.target;
        let mut ancestors = vec![target];
        ancestors.extend(lock(&self.tree).ancestors(target));

        let observers: Vec<Arc<MutationObserver>> =
            lock(&self.observers).iter().filter_map(Weak::upgrade).collect();
        for observer in observers {
            if observer.enqueue(&record, &ancestors[1..]) {
                observer.deliver();
            }
        }
    }

    /// Dispatch an event at the document.
    ///
    /// Trusted activation-triggering input grants user activation before
    /// any listener runs.
    pub fn dispatch_event(&self, mut event: Event) -> bool {
        if event.is_trusted && event.event_type.is_activation_triggering() {
            self.activation.notify();
        }
        self.events.dispatch_event(&mut event)
    }

    /// `new AudioContext()` in this document's realm
    pub fn create_audio_context(&self) -> AudioContextRef {
        let context = AudioContext::new(self.url.clone(), self.activation.clone());
        let mut contexts = lock(&self.contexts);
        contexts.retain(|c| c.strong_count() > 0);
        contexts.push(Arc::downgrade(&context));
        context
    }

    fn live_contexts(&self) -> Vec<AudioContextRef> {
        lock(&self.contexts).iter().filter_map(Weak::upgrade).collect()
    }

    /// Change page visibility. Hiding the page suspends its running audio
    /// contexts.
    pub fn set_hidden(&self, hidden: bool) {
        if self.hidden.swap(hidden, Ordering::AcqRel) == hidden {
            return;
        }
        if hidden {
            for context in self.live_contexts() {
                if context.state() == AudioContextState::Running {
                    context.suspend_by_platform();
                }
            }
        }
        self.dispatch_event(Event::trusted(EventType::VisibilityChange, NodeId::ROOT));
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden.load(Ordering::Acquire)
    }

    /// What the user actually hears from `element`, relative to unity
    pub fn audible_level(&self, element: &MediaElementRef) -> f64 {
        let element = lock(element);
        match element.audio_source() {
            None => {
                if element.muted {
                    0.0
                } else {
                    element.volume()
                }
            }
            Some(owner) => self
                .live_contexts()
                .into_iter()
                .find(|c| c.id() == owner)
                .map(|c| c.output_level(&element))
                .unwrap_or(0.0),
        }
    }
}
