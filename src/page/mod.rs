//! Page-side components: frame router, interceptors, file inputs.
//!
//! A "page" is one embedding application instance. Its single frame
//! router owns the runtime-channel connection; interceptors live one
//! per frame and talk to the router over in-process channels only.

pub mod input;
pub mod interceptor;
pub mod router;

use crate::ipc::protocol::FrameId;
use crate::payload::ClipboardPayload;

/// Message broadcast from the router down to frame endpoints.
///
/// Every endpoint sees every message and filters on `frame`.
#[derive(Debug, Clone)]
pub enum PageMessage {
    Payload {
        frame: FrameId,
        payload: ClipboardPayload,
    },
    Failure {
        frame: FrameId,
        reason: String,
    },
}

impl PageMessage {
    pub fn frame(&self) -> &FrameId {
        match self {
            PageMessage::Payload { frame, .. } | PageMessage::Failure { frame, .. } => frame,
        }
    }
}

/// Request flowing up from an interceptor to its page's router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub frame: FrameId,
}
