//! Media Elements
//!
//! HTMLVideoElement and HTMLAudioElement share one `HTMLMediaElement`
//! model. The page owns elements through `MediaElementRef`; integrations
//! may hold weak references only.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::audio::ContextId;
use crate::MediaError;

static NEXT_MEDIA_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a media element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaElementId(u64);

impl fmt::Display for MediaElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media#{}", self.0)
    }
}

/// Element kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaKind {
    #[default]
    Video,
    Audio,
}

/// CORS settings attribute (`crossorigin`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsSettings {
    Anonymous,
    UseCredentials,
}

impl CorsSettings {
    /// Parse an attribute value. Invalid values map to `anonymous`.
    pub fn from_attribute(value: &str) -> Self {
        if value.eq_ignore_ascii_case("use-credentials") {
            Self::UseCredentials
        } else {
            Self::Anonymous
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::UseCredentials => "use-credentials",
        }
    }
}

/// Shared handle to a page-owned media element
pub type MediaElementRef = Arc<Mutex<HTMLMediaElement>>;

/// Base media element (shared between video/audio)
#[derive(Debug)]
pub struct HTMLMediaElement {
    id: MediaElementId,
    kind: MediaKind,

    // Source
    pub src: String,
    pub current_src: String,
    pub cross_origin: Option<CorsSettings>,

    // Playback
    pub paused: bool,

    // Volume
    volume: f64,
    pub muted: bool,

    // Web Audio capture (`createMediaElementSource`), never released
    audio_source: Option<ContextId>,
}

impl HTMLMediaElement {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            id: MediaElementId(NEXT_MEDIA_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            src: String::new(),
            current_src: String::new(),
            cross_origin: None,
            paused: true,
            volume: 1.0,
            muted: false,
            audio_source: None,
        }
    }

    /// `<video src=...>`
    pub fn video(src: &str) -> Self {
        let mut video = Self::new(MediaKind::Video);
        video.src = src.to_string();
        video
    }

    /// `<audio src=...>`
    pub fn audio(src: &str) -> Self {
        let mut audio = Self::new(MediaKind::Audio);
        audio.src = src.to_string();
        audio
    }

    /// Set the `crossorigin` attribute
    pub fn with_cross_origin(mut self, value: &str) -> Self {
        self.cross_origin = Some(CorsSettings::from_attribute(value));
        self
    }

    /// Set the initial volume as page script would
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    pub fn into_shared(self) -> MediaElementRef {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> MediaElementId {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Native playback volume, 0.0..=1.0
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Set native volume. Values outside [0, 1] are rejected like the
    /// DOM's `IndexSizeError`.
    pub fn set_volume(&mut self, volume: f64) -> Result<(), MediaError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(MediaError::IndexSize(volume));
        }
        self.volume = volume;
        Ok(())
    }

    /// URL being played, falling back to the `src` attribute
    pub fn source_url(&self) -> &str {
        if self.current_src.is_empty() {
            &self.src
        } else {
            &self.current_src
        }
    }

    /// Context that captured this element, if any
    pub fn audio_source(&self) -> Option<ContextId> {
        self.audio_source
    }

    pub(crate) fn capture(&mut self, context: ContextId) {
        self.audio_source = Some(context);
    }

    /// Whether the element's media is cross-origin without CORS approval
    /// relative to `document_url`. Such media is silenced when routed
    /// through an audio graph.
    pub fn is_tainted_for(&self, document_url: &Url) -> bool {
        if self.cross_origin.is_some() {
            return false;
        }
        match document_url.join(self.source_url()) {
            Ok(url) => match url.scheme() {
                "data" | "blob" => false,
                _ => url.origin() != document_url.origin(),
            },
            Err(_) => true,
        }
    }

    /// Play media
    pub fn play(&mut self) {
        self.paused = false;
    }

    /// Pause media
    pub fn pause(&mut self) {
        self.paused = true;
    }
}
