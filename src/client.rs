//! Runtime-channel client.
//!
//! Connects to the orchestrator socket, performs the handshake, and
//! provides the request methods used by page routers, clipboard
//! surfaces, and the preference CLI. Requests are serialized —
//! `send()` then wait for the matching response — while unsolicited
//! deliveries (id 0) are buffered for [`RuntimeClient::next_message`].

use std::collections::VecDeque;
use std::path::Path;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::ipc::codec::LengthPrefixedCodec;
use crate::ipc::protocol::{FrameId, Message, PROTOCOL_VERSION, Role, Status};
use crate::orchestrator;
use crate::payload::ClipboardPayload;

/// Client-side runtime channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("runtime channel error: {0}")]
    Channel(String),
    /// The orchestrator answered the request with an error reason.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ClientError {
    fn channel(context: &str, detail: impl std::fmt::Display) -> Self {
        Self::Channel(format!("{context}: {detail}"))
    }
}

pub struct RuntimeClient {
    framed: Framed<UnixStream, LengthPrefixedCodec>,
    next_id: u32,
    /// Unsolicited deliveries that arrived while a response was awaited.
    pending: VecDeque<Message>,
}

impl RuntimeClient {
    /// Connect to the orchestrator at the default socket path and
    /// perform the handshake.
    pub async fn connect(role: Role) -> Result<Self, ClientError> {
        let path = orchestrator::socket_path()
            .map_err(|e| ClientError::Channel(e.to_string()))?;
        Self::connect_to(&path, role).await
    }

    /// Connect to an explicit socket path and perform the handshake.
    pub async fn connect_to(path: &Path, role: Role) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| ClientError::channel("connect failed", e))?;
        let mut framed = Framed::new(stream, LengthPrefixedCodec::new());

        // Handshake: Hello → HelloAck.
        framed
            .send(Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
                role,
            })
            .await
            .map_err(|e| ClientError::channel("send hello", e))?;

        match framed.next().await {
            Some(Ok(Message::HelloAck {
                status: Status::Ok, ..
            })) => {}
            Some(Ok(Message::HelloAck {
                status: Status::Error,
                error,
                ..
            })) => {
                return Err(ClientError::Rejected(error.unwrap_or_default()));
            }
            other => {
                return Err(ClientError::Channel(format!(
                    "unexpected handshake response: {other:?}"
                )));
            }
        }

        Ok(Self {
            framed,
            next_id: 1, // 0 = Hello
            pending: VecDeque::new(),
        })
    }

    /// Ask the orchestrator to open a clipboard helper for `frame`.
    ///
    /// `Err(Rejected("session_busy"))` when another session is live.
    pub async fn open_helper(&mut self, frame: FrameId) -> Result<(), ClientError> {
        let id = self.take_id();
        self.send(Message::OpenHelper { id, frame }).await?;
        match self.response(id).await? {
            Message::HelperOpened {
                status: Status::Ok, ..
            } => Ok(()),
            Message::HelperOpened { error, .. } => {
                Err(ClientError::Rejected(error.unwrap_or_default()))
            }
            other => Err(ClientError::Channel(format!(
                "unexpected open_helper response: {other:?}"
            ))),
        }
    }

    /// Report the surface's single clipboard read.
    pub async fn clipboard_result(
        &mut self,
        payload: Option<ClipboardPayload>,
        error: Option<String>,
    ) -> Result<(), ClientError> {
        let id = self.take_id();
        self.send(Message::ClipboardResult { id, payload, error })
            .await?;
        self.expect_ok(id, "clipboard_result").await
    }

    /// End the current session without a result.
    pub async fn close_helper(&mut self) -> Result<(), ClientError> {
        let id = self.take_id();
        self.send(Message::CloseHelper { id }).await?;
        self.expect_ok(id, "close_helper").await
    }

    pub async fn save_preference(&mut self, site: &str, enabled: bool) -> Result<(), ClientError> {
        let id = self.take_id();
        self.send(Message::SavePreference {
            id,
            site: site.to_string(),
            enabled,
        })
        .await?;
        self.expect_ok(id, "save_preference").await
    }

    pub async fn get_preference(&mut self, site: &str) -> Result<bool, ClientError> {
        let id = self.take_id();
        self.send(Message::GetPreference {
            id,
            site: site.to_string(),
        })
        .await?;
        match self.response(id).await? {
            Message::Response {
                status: Status::Ok,
                enabled: Some(enabled),
                ..
            } => Ok(enabled),
            Message::Response { error, .. } => {
                Err(ClientError::Rejected(error.unwrap_or_default()))
            }
            other => Err(ClientError::Channel(format!(
                "unexpected get_preference response: {other:?}"
            ))),
        }
    }

    /// Returns whether a stored preference existed.
    pub async fn clear_preference(&mut self, site: &str) -> Result<bool, ClientError> {
        let id = self.take_id();
        self.send(Message::ClearPreference {
            id,
            site: site.to_string(),
        })
        .await?;
        match self.response(id).await? {
            Message::Response {
                status: Status::Ok,
                existed: Some(existed),
                ..
            } => Ok(existed),
            Message::Response { error, .. } => {
                Err(ClientError::Rejected(error.unwrap_or_default()))
            }
            other => Err(ClientError::Channel(format!(
                "unexpected clear_preference response: {other:?}"
            ))),
        }
    }

    /// Next inbound message — buffered unsolicited deliveries first,
    /// then the wire. `None` means the orchestrator closed the
    /// connection.
    pub async fn next_message(&mut self) -> Option<Result<Message, ClientError>> {
        if let Some(msg) = self.pending.pop_front() {
            return Some(Ok(msg));
        }
        match self.framed.next().await {
            Some(Ok(msg)) => Some(Ok(msg)),
            Some(Err(e)) => Some(Err(ClientError::channel("read", e))),
            None => None,
        }
    }

    /// Wrap an already-connected stream without a handshake.
    #[cfg(test)]
    pub(crate) fn from_parts(stream: UnixStream) -> Self {
        Self {
            framed: Framed::new(stream, LengthPrefixedCodec::new()),
            next_id: 1,
            pending: VecDeque::new(),
        }
    }

    // -- Internals --

    fn take_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    async fn send(&mut self, msg: Message) -> Result<(), ClientError> {
        self.framed
            .send(msg)
            .await
            .map_err(|e| ClientError::channel("send", e))
    }

    /// Wait for the response carrying `id`, buffering any unsolicited
    /// deliveries that race ahead of it.
    async fn response(&mut self, id: u32) -> Result<Message, ClientError> {
        loop {
            match self.framed.next().await {
                Some(Ok(msg)) => {
                    if message_id(&msg) == id {
                        return Ok(msg);
                    }
                    self.pending.push_back(msg);
                }
                Some(Err(e)) => return Err(ClientError::channel("read", e)),
                None => return Err(ClientError::Channel("connection closed".into())),
            }
        }
    }

    async fn expect_ok(&mut self, id: u32, context: &str) -> Result<(), ClientError> {
        match self.response(id).await? {
            Message::Response {
                status: Status::Ok, ..
            } => Ok(()),
            Message::Response { error, .. } => {
                Err(ClientError::Rejected(error.unwrap_or_default()))
            }
            other => Err(ClientError::Channel(format!(
                "unexpected {context} response: {other:?}"
            ))),
        }
    }
}

fn message_id(msg: &Message) -> u32 {
    match msg {
        Message::Hello { id, .. }
        | Message::HelloAck { id, .. }
        | Message::OpenHelper { id, .. }
        | Message::HelperOpened { id, .. }
        | Message::ClipboardResult { id, .. }
        | Message::PayloadDelivery { id, .. }
        | Message::DeliveryFailed { id, .. }
        | Message::CloseHelper { id, .. }
        | Message::SavePreference { id, .. }
        | Message::GetPreference { id, .. }
        | Message::ClearPreference { id, .. }
        | Message::Response { id, .. } => *id,
    }
}
