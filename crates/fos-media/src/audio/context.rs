//! Web Audio API
//!
//! AudioContext and audio nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::activation::UserActivation;
use crate::element::{HTMLMediaElement, MediaElementId, MediaElementRef};
use crate::{lock, MediaError};

/// Deepest node chain considered when computing output
const MAX_GRAPH_DEPTH: usize = 32;

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Audio context identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audio-context#{}", self.0)
    }
}

/// Audio context state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioContextState {
    #[default]
    Suspended,
    Running,
    Closed,
}

/// Node handle within one context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(u32);

impl NodeHandle {
    /// The context's destination node
    pub const DESTINATION: NodeHandle = NodeHandle(0);
}

/// Audio parameter
///
/// Clones share the same value, like the `AudioParam` exposed by a node.
#[derive(Debug, Clone)]
pub struct AudioParam {
    pub default_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    value: Arc<AtomicU64>,
}

impl AudioParam {
    pub fn new(default: f64, min_value: f64, max_value: f64) -> Self {
        Self {
            default_value: default,
            min_value,
            max_value,
            value: Arc::new(AtomicU64::new(default.to_bits())),
        }
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Set the value, clamped to the nominal range. Non-finite values are
    /// ignored.
    pub fn set_value(&self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let value = value.clamp(self.min_value, self.max_value);
        self.value.store(value.to_bits(), Ordering::Release);
    }
}

/// Media element source node
#[derive(Debug, Clone)]
pub struct MediaElementAudioSourceNode {
    pub node: NodeHandle,
    pub element: MediaElementId,
    pub context: ContextId,
}

/// Gain node
#[derive(Debug, Clone)]
pub struct GainNode {
    pub node: NodeHandle,
    pub context: ContextId,
    pub gain: AudioParam,
}

/// State change subscriber (`onstatechange`)
pub type StateChangeCallback = Arc<dyn Fn(AudioContextState) + Send + Sync>;

/// Shared audio context handle
pub type AudioContextRef = Arc<AudioContext>;

#[derive(Debug)]
struct SourceEntry {
    element: MediaElementId,
    tainted: bool,
}

#[derive(Debug, Default)]
struct Graph {
    state: AudioContextState,
    next_node: u32,
    sources: HashMap<NodeHandle, SourceEntry>,
    gains: HashMap<NodeHandle, AudioParam>,
    edges: Vec<(NodeHandle, NodeHandle)>,
}

impl Graph {
    fn allocate(&mut self) -> NodeHandle {
        self.next_node += 1;
        NodeHandle(self.next_node)
    }

    fn contains(&self, node: NodeHandle) -> bool {
        node == NodeHandle::DESTINATION
            || self.sources.contains_key(&node)
            || self.gains.contains_key(&node)
    }

    /// Sum over every path from `node` to the destination of the product
    /// of gains along the path.
    fn path_gain(&self, node: NodeHandle, depth: usize) -> f64 {
        if depth > MAX_GRAPH_DEPTH {
            return 0.0;
        }
        self.edges
            .iter()
            .filter(|(from, _)| *from == node)
            .map(|&(_, to)| {
                if to == NodeHandle::DESTINATION {
                    1.0
                } else if let Some(param) = self.gains.get(&to) {
                    param.value() * self.path_gain(to, depth + 1)
                } else {
                    0.0
                }
            })
            .sum()
    }
}

/// Base audio context
pub struct AudioContext {
    id: ContextId,
    document_url: Url,
    activation: UserActivation,
    graph: Mutex<Graph>,
    listeners: Mutex<Vec<StateChangeCallback>>,
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContext")
            .field("id", &self.id)
            .field("graph", &*lock(&self.graph))
            .finish()
    }
}

impl AudioContext {
    /// Create a context for the document at `document_url`.
    ///
    /// Starts `Running` when the page already has user activation,
    /// `Suspended` otherwise.
    pub fn new(document_url: Url, activation: UserActivation) -> AudioContextRef {
        let state = if activation.has_been_active() {
            AudioContextState::Running
        } else {
            AudioContextState::Suspended
        };
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(context = %id, ?state, "audio context created");

        Arc::new(Self {
            id,
            document_url,
            activation,
            graph: Mutex::new(Graph {
                state,
                ..Graph::default()
            }),
            listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn state(&self) -> AudioContextState {
        lock(&self.graph).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == AudioContextState::Running
    }

    /// Subscribe to state changes
    pub fn on_state_change(&self, callback: StateChangeCallback) {
        lock(&self.listeners).push(callback);
    }

    /// Resume playback.
    ///
    /// Refused with `NotAllowed` until the page has user activation.
    /// Resuming a running context succeeds immediately.
    pub async fn resume(&self) -> Result<AudioContextState, MediaError> {
        match self.state() {
            AudioContextState::Closed => {
                return Err(MediaError::InvalidState("context is closed".into()));
            }
            AudioContextState::Running => return Ok(AudioContextState::Running),
            AudioContextState::Suspended => {}
        }

        if !self.activation.has_been_active() {
            return Err(MediaError::NotAllowed("resume requires user activation".into()));
        }

        // The rendering thread starts before the new state is observable
        smol::future::yield_now().await;

        if self.state() == AudioContextState::Closed {
            return Err(MediaError::InvalidState("context closed while resuming".into()));
        }
        self.transition(AudioContextState::Running);
        Ok(AudioContextState::Running)
    }

    /// Suspension imposed by the platform, e.g. when the page is hidden.
    pub fn suspend_by_platform(&self) -> bool {
        self.is_running() && self.transition(AudioContextState::Suspended)
    }

    /// Close context
    pub fn close(&self) {
        self.transition(AudioContextState::Closed);
    }

    fn transition(&self, next: AudioContextState) -> bool {
        {
            let mut graph = lock(&self.graph);
            if graph.state == next || graph.state == AudioContextState::Closed {
                return false;
            }
            graph.state = next;
        }
        tracing::debug!(context = %self.id, state = ?next, "audio context state changed");

        let listeners: Vec<StateChangeCallback> = lock(&self.listeners).clone();
        for listener in listeners {
            listener(next);
        }
        true
    }

    /// `createMediaElementSource`.
    ///
    /// Capturing cannot be undone and an element belongs to at most one
    /// context. Fails without side effects if the element is already
    /// captured.
    pub fn create_media_element_source(
        &self,
        element: &MediaElementRef,
    ) -> Result<MediaElementAudioSourceNode, MediaError> {
        let mut element = lock(element);
        if let Some(owner) = element.audio_source() {
            return Err(MediaError::InvalidState(format!(
                "{} is already connected to {}",
                element.id(),
                owner
            )));
        }

        let mut graph = lock(&self.graph);
        if graph.state == AudioContextState::Closed {
            return Err(MediaError::InvalidState("context is closed".into()));
        }

        let node = graph.allocate();
        let tainted = element.is_tainted_for(&self.document_url);
        graph.sources.insert(node, SourceEntry {
            element: element.id(),
            tainted,
        });
        element.capture(self.id);

        if tainted {
            tracing::warn!(element = %element.id(), "cross-origin media captured; output is silent");
        }
        Ok(MediaElementAudioSourceNode {
            node,
            element: element.id(),
            context: self.id,
        })
    }

    /// Create gain
    pub fn create_gain(&self) -> Result<GainNode, MediaError> {
        let mut graph = lock(&self.graph);
        if graph.state == AudioContextState::Closed {
            return Err(MediaError::InvalidState("context is closed".into()));
        }

        let node = graph.allocate();
        let gain = AudioParam::new(1.0, -f32::MAX as f64, f32::MAX as f64);
        graph.gains.insert(node, gain.clone());
        Ok(GainNode {
            node,
            context: self.id,
            gain,
        })
    }

    pub fn destination(&self) -> NodeHandle {
        NodeHandle::DESTINATION
    }

    /// Connect `from`'s output to `to`'s input
    pub fn connect(&self, from: NodeHandle, to: NodeHandle) -> Result<(), MediaError> {
        if from == NodeHandle::DESTINATION {
            return Err(MediaError::InvalidState("destination has no outputs".into()));
        }
        if from == to {
            return Err(MediaError::NotSupported("self connection".into()));
        }

        let mut graph = lock(&self.graph);
        if !graph.contains(from) || !graph.contains(to) {
            return Err(MediaError::InvalidState("node belongs to another context".into()));
        }
        if !graph.edges.contains(&(from, to)) {
            graph.edges.push((from, to));
        }
        Ok(())
    }

    /// Disconnect every output of `node`. A gain node left with no
    /// connections is released.
    pub fn disconnect(&self, node: NodeHandle) {
        let mut graph = lock(&self.graph);
        graph.edges.retain(|(from, _)| *from != node);
        if graph.gains.contains_key(&node) && !graph.edges.iter().any(|(_, to)| *to == node) {
            graph.gains.remove(&node);
        }
    }

    /// Number of live source and gain nodes
    pub fn node_count(&self) -> usize {
        let graph = lock(&self.graph);
        graph.sources.len() + graph.gains.len()
    }

    /// Audible output level of `element`.
    ///
    /// Elements not captured by this context play at native volume. A
    /// captured element plays at native volume times the gain along every
    /// path to the destination, and is silent while the context is not
    /// running or when its source is tainted.
    pub fn output_level(&self, element: &HTMLMediaElement) -> f64 {
        let native = if element.muted { 0.0 } else { element.volume() };
        if element.audio_source() != Some(self.id) {
            return native;
        }

        let graph = lock(&self.graph);
        if graph.state != AudioContextState::Running {
            return 0.0;
        }
        graph
            .sources
            .iter()
            .filter(|(_, source)| source.element == element.id())
            .map(|(node, source)| {
                if source.tainted {
                    0.0
                } else {
                    native * graph.path_gain(*node, 0)
                }
            })
            .sum()
    }
}
