//! Routing eligibility
//!
//! Capturing an element into an audio graph cannot be undone, and the
//! platform silences captured media that is cross-origin without CORS
//! approval. Eligibility is therefore decided up front from properties that
//! can be inspected without side effects: the source URL's scheme and
//! origin, the `crossorigin` attribute, and whether some graph already owns
//! the element.

use fos_media::HTMLMediaElement;
use url::Url;

use crate::RouteRefusal;

/// Check whether `element` may be routed through an audio graph in the
/// document at `document_url`.
pub fn can_route(element: &HTMLMediaElement, document_url: &Url) -> Result<(), RouteRefusal> {
    if element.audio_source().is_some() {
        return Err(RouteRefusal::AlreadyCaptured);
    }

    let source = element.source_url();
    if source.is_empty() {
        return Err(RouteRefusal::NoSource);
    }

    let url = document_url
        .join(source)
        .map_err(|e| RouteRefusal::UnresolvableSource(format!("{source}: {e}")))?;

    match url.scheme() {
        // Media built by the page itself
        "data" | "blob" => Ok(()),
        _ if url.origin() == document_url.origin() => Ok(()),
        _ if element.cross_origin.is_some() => Ok(()),
        _ => Err(RouteRefusal::CrossOrigin(url.origin().ascii_serialization())),
    }
}
