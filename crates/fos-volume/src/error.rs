//! Error types

/// Errors surfaced to callers of the controller
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("Malformed request: {0}")]
    MalformedRequest(#[from] serde_json::Error),
    
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Why an element was not routed through the amplification pipeline.
///
/// Never surfaced to the user; it only decides classification and logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteRefusal {
    #[error("element has no media source yet")]
    NoSource,
    
    #[error("source URL cannot be resolved: {0}")]
    UnresolvableSource(String),
    
    #[error("source {0} is cross-origin without CORS")]
    CrossOrigin(String),
    
    #[error("element is already captured by another audio graph")]
    AlreadyCaptured,
    
    #[error("audio context is not running")]
    ContextNotRunning,
    
    #[error("audio graph rejected the route: {0}")]
    Graph(String),
}

impl RouteRefusal {
    /// Permanent refusals exclude the element from routing for its lifetime
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::NoSource | Self::ContextNotRunning)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_permanence() {
        assert!(RouteRefusal::AlreadyCaptured.is_permanent());
        assert!(RouteRefusal::CrossOrigin("https://cdn.example.net".into()).is_permanent());
        assert!(!RouteRefusal::NoSource.is_permanent());
        assert!(!RouteRefusal::ContextNotRunning.is_permanent());
    }
}
