//! Message boundary
//!
//! The UI talks to the page only through two JSON messages:
//!
//! ```text
//! {"action":"get-volume"}              -> {"volume":150} | {"volume":null}
//! {"action":"set-volume","volume":150} -> {"ok":true,"volume":150}
//! ```

use serde::{Deserialize, Serialize};

/// Request from the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Request {
    GetVolume,
    /// Any number is accepted; it is rounded and clamped
    SetVolume { volume: f64 },
}

/// Reply to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Set { ok: bool, volume: u32 },
    /// `None` when the page has no media
    Volume { volume: Option<u32> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requests() {
        let get: Request = serde_json::from_str(r#"{"action":"get-volume"}"#).unwrap();
        assert_eq!(get, Request::GetVolume);

        let set: Request = serde_json::from_str(r#"{"action":"set-volume","volume":150}"#).unwrap();
        assert_eq!(set, Request::SetVolume { volume: 150.0 });

        let fractional: Request = serde_json::from_str(r#"{"volume":-3.5,"action":"set-volume"}"#).unwrap();
        assert_eq!(fractional, Request::SetVolume { volume: -3.5 });
    }

    #[test]
    fn test_malformed_requests() {
        assert!(serde_json::from_str::<Request>(r#"{"action":"mute"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"action":"set-volume"}"#).is_err());
        assert!(serde_json::from_str::<Request>(r#"{"action":"set-volume","volume":"loud"}"#).is_err());
        assert!(serde_json::from_str::<Request>("get-volume").is_err());
    }

    #[test]
    fn test_response_shapes() {
        let set = Response::Set { ok: true, volume: 300 };
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"{"ok":true,"volume":300}"#);

        let none = Response::Volume { volume: None };
        assert_eq!(serde_json::to_string(&none).unwrap(), r#"{"volume":null}"#);

        let parsed: Response = serde_json::from_str(r#"{"volume":80}"#).unwrap();
        assert_eq!(parsed, Response::Volume { volume: Some(80) });
    }
}
