//! Runtime-channel message types.
//!
//! Every message is a MessagePack-encoded map carrying at least `type`
//! and `id`. The same vocabulary is spoken by page routers, clipboard
//! access surfaces, and the preference CLI; the orchestrator is always
//! the other end of the channel.

use serde::{Deserialize, Serialize};

use crate::payload::ClipboardPayload;

/// Frame address within one page.
///
/// `Top` is the page's top document; nested frames get a synthetic
/// identifier assigned by the page's frame router. On the wire this is
/// a plain string (`"top"` or the synthetic id) so the two sides never
/// have to agree on anything beyond the tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FrameId {
    Top,
    Nested(String),
}

impl FrameId {
    pub fn as_str(&self) -> &str {
        match self {
            FrameId::Top => "top",
            FrameId::Nested(id) => id,
        }
    }
}

impl From<FrameId> for String {
    fn from(frame: FrameId) -> String {
        frame.as_str().to_string()
    }
}

impl From<String> for FrameId {
    fn from(s: String) -> FrameId {
        if s == "top" {
            FrameId::Top
        } else {
            FrameId::Nested(s)
        }
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All runtime-channel messages.
///
/// Serialized as a tagged union on the `type` field via MessagePack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    // -- Handshake --
    #[serde(rename = "hello")]
    Hello { id: u32, version: u32, role: Role },

    #[serde(rename = "hello_ack")]
    HelloAck {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- Session lifecycle --
    /// Page → orchestrator: start a clipboard relay session for one frame.
    #[serde(rename = "open_helper")]
    OpenHelper { id: u32, frame: FrameId },

    /// Orchestrator → page: ack of the open request. An error status
    /// carries `session_busy` when another session is already live.
    #[serde(rename = "helper_opened")]
    HelperOpened {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Surface → orchestrator: the terminal result of one clipboard read.
    /// Exactly one of `payload` / `error` is set.
    #[serde(rename = "clipboard_result")]
    ClipboardResult {
        id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<ClipboardPayload>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- Unsolicited delivery (orchestrator → page) --
    #[serde(rename = "payload_delivery")]
    PayloadDelivery {
        id: u32,
        frame: FrameId,
        payload: ClipboardPayload,
    },

    #[serde(rename = "delivery_failed")]
    DeliveryFailed {
        id: u32,
        frame: FrameId,
        reason: String,
    },

    /// Any → orchestrator: explicit early teardown of the helper surface.
    #[serde(rename = "close_helper")]
    CloseHelper { id: u32 },

    // -- Per-site preference store --
    #[serde(rename = "save_preference")]
    SavePreference { id: u32, site: String, enabled: bool },

    #[serde(rename = "get_preference")]
    GetPreference { id: u32, site: String },

    #[serde(rename = "clear_preference")]
    ClearPreference { id: u32, site: String },

    // -- Generic response --
    #[serde(rename = "response")]
    Response {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        existed: Option<bool>,
    },
}

/// Connection role declared in the handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A page's frame router.
    Page,
    /// A clipboard access surface spawned by the orchestrator.
    Surface,
    /// The preference CLI / settings popup.
    Control,
}

/// Response status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum frame payload size (16 MiB). Generous for data-URL-encoded
/// clipboard images.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Minimal envelope for extracting `{type, id}` from unknown messages.
///
/// Fallback used when [`Message`] deserialization fails (unknown `type`
/// tag) so the orchestrator can echo the request id in its error reply.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    /// Consumed by serde for structural matching; not read afterwards.
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub msg_type: String,
    pub id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &Message) -> Message {
        let encoded = rmp_serde::to_vec_named(msg).unwrap();
        rmp_serde::from_slice(&encoded).unwrap()
    }

    #[test]
    fn frame_id_wire_form() {
        assert_eq!(String::from(FrameId::Top), "top");
        assert_eq!(
            String::from(FrameId::Nested("injected-frame-3".into())),
            "injected-frame-3"
        );
        assert_eq!(FrameId::from("top".to_string()), FrameId::Top);
        assert_eq!(
            FrameId::from("injected-frame-0".to_string()),
            FrameId::Nested("injected-frame-0".into())
        );
    }

    #[test]
    fn hello_round_trip() {
        let msg = Message::Hello {
            id: 0,
            version: PROTOCOL_VERSION,
            role: Role::Page,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn open_helper_round_trip() {
        let msg = Message::OpenHelper {
            id: 1,
            frame: FrameId::Nested("injected-frame-2".into()),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn open_helper_top_frame_round_trip() {
        let msg = Message::OpenHelper {
            id: 1,
            frame: FrameId::Top,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn helper_opened_busy_round_trip() {
        let msg = Message::HelperOpened {
            id: 4,
            status: Status::Error,
            error: Some("session_busy".into()),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn clipboard_result_payload_round_trip() {
        let msg = Message::ClipboardResult {
            id: 2,
            payload: Some(ClipboardPayload::from_bytes("text/plain", b"hello")),
            error: None,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn clipboard_result_error_round_trip() {
        let msg = Message::ClipboardResult {
            id: 2,
            payload: None,
            error: Some("no_matching_content".into()),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn payload_delivery_round_trip() {
        let msg = Message::PayloadDelivery {
            id: 0,
            frame: FrameId::Nested("injected-frame-1".into()),
            payload: ClipboardPayload::from_bytes("image/png", &[0x89, 0x50, 0x4e, 0x47]),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn delivery_failed_round_trip() {
        let msg = Message::DeliveryFailed {
            id: 0,
            frame: FrameId::Top,
            reason: "helper_closed".into(),
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn close_helper_round_trip() {
        let msg = Message::CloseHelper { id: 7 };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn preference_messages_round_trip() {
        for msg in [
            Message::SavePreference {
                id: 1,
                site: "example.com".into(),
                enabled: false,
            },
            Message::GetPreference {
                id: 2,
                site: "example.com".into(),
            },
            Message::ClearPreference {
                id: 3,
                site: "example.com".into(),
            },
        ] {
            assert_eq!(round_trip(&msg), msg);
        }
    }

    #[test]
    fn response_round_trip() {
        let msg = Message::Response {
            id: 9,
            status: Status::Ok,
            error: None,
            enabled: Some(true),
            existed: None,
        };
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn role_serialization() {
        for role in [Role::Page, Role::Surface, Role::Control] {
            let bytes = rmp_serde::to_vec_named(&role).unwrap();
            let decoded: Role = rmp_serde::from_slice(&bytes).unwrap();
            assert_eq!(decoded, role);
        }
    }

    #[test]
    fn binary_payload_survives_data_url_transport() {
        // Payload bytes travel base64-encoded inside the data URL, so
        // arbitrary binary must round-trip through the wire form.
        let content: Vec<u8> = (0..=255).collect();
        let msg = Message::ClipboardResult {
            id: 1,
            payload: Some(ClipboardPayload::from_bytes(
                "application/octet-stream",
                &content,
            )),
            error: None,
        };
        match round_trip(&msg) {
            Message::ClipboardResult {
                payload: Some(p), ..
            } => assert_eq!(p.decode().unwrap(), content),
            other => panic!("expected ClipboardResult, got {other:?}"),
        }
    }
}
