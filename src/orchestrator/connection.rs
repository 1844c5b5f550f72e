//! Per-connection task — framed I/O, handshake, command forwarding.
//!
//! Each runtime-channel connection spawns a tokio task that:
//! 1. Wraps the socket in the length-prefixed MessagePack framing.
//! 2. Reads the first message (must be `Hello`) and forwards it to
//!    the orchestrator loop for handshake validation.
//! 3. Enters a select loop: forward requests to the orchestrator
//!    loop, push unsolicited deliveries (payloads, failure notices)
//!    down to the client.
//! 4. On disconnect, notifies the orchestrator loop for cleanup.

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;

use crate::ipc::codec::{CodecError, DecodeResult, FrameCodec, decode_frame};
use crate::ipc::protocol::{Message, Status};

use super::session::ConnectionId;

/// Command sent from a connection task to the orchestrator loop.
#[derive(Debug)]
pub struct RelayCommand {
    pub request: Message,
    pub response_tx: oneshot::Sender<Message>,
    pub connection_id: ConnectionId,
}

/// Notification sent when a connection closes.
#[derive(Debug)]
pub struct DisconnectNotice {
    pub connection_id: ConnectionId,
}

/// Connection-level errors.
#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error("unexpected EOF during handshake")]
    HandshakeEof,
    #[error("first message must be Hello")]
    NotHello,
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] rmp_serde::decode::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("orchestrator loop closed")]
    OrchestratorGone,
    #[error("response channel closed")]
    ResponseDropped,
}

/// Spawn a connection handler task.
///
/// The task runs until the client disconnects or a protocol error
/// occurs. On exit, a [`DisconnectNotice`] is sent to the
/// orchestrator loop.
pub fn spawn_connection(
    stream: UnixStream,
    conn_id: ConnectionId,
    cmd_tx: mpsc::UnboundedSender<RelayCommand>,
    deliver_rx: mpsc::UnboundedReceiver<Message>,
    disconnect_tx: mpsc::UnboundedSender<DisconnectNotice>,
) {
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, conn_id, cmd_tx, deliver_rx).await {
            tracing::debug!(?conn_id, error = %e, "connection closed");
        }
        // Always notify the orchestrator of the disconnect for cleanup.
        let _ = disconnect_tx.send(DisconnectNotice {
            connection_id: conn_id,
        });
    });
}

async fn handle_connection(
    stream: UnixStream,
    conn_id: ConnectionId,
    cmd_tx: mpsc::UnboundedSender<RelayCommand>,
    mut deliver_rx: mpsc::UnboundedReceiver<Message>,
) -> Result<(), ConnectionError> {
    let mut framed = Framed::new(stream, FrameCodec::new());

    // -- Handshake: first message must be Hello --
    let first_frame = framed
        .next()
        .await
        .ok_or(ConnectionError::HandshakeEof)?
        .map_err(ConnectionError::Codec)?;

    let first_msg = match decode_frame(&first_frame) {
        DecodeResult::Ok(msg @ Message::Hello { .. }) => msg,
        DecodeResult::Ok(_non_hello) => {
            // Valid message, wrong opener. The client violated the
            // handshake so the connection closes immediately.
            return Err(ConnectionError::NotHello);
        }
        DecodeResult::UnknownType(_envelope) => {
            return Err(ConnectionError::NotHello);
        }
        DecodeResult::Malformed(e) => {
            return Err(ConnectionError::MalformedFrame(e));
        }
    };

    let response = send_command(&cmd_tx, first_msg, conn_id).await?;
    let is_error = is_error_hello_ack(&response);
    framed
        .send(response)
        .await
        .map_err(ConnectionError::Codec)?;

    if is_error {
        // Version mismatch, rogue surface, or other handshake failure.
        return Ok(());
    }

    // -- Main loop: requests + unsolicited delivery --
    loop {
        tokio::select! {
            frame = framed.next() => {
                let raw = match frame {
                    Some(Ok(raw)) => raw,
                    Some(Err(e)) => return Err(ConnectionError::Codec(e)),
                    None => return Ok(()), // Clean disconnect.
                };
                match decode_frame(&raw) {
                    DecodeResult::Ok(msg) => {
                        let response = send_command(&cmd_tx, msg, conn_id).await?;
                        framed.send(response).await.map_err(ConnectionError::Codec)?;
                    }
                    DecodeResult::UnknownType(envelope) => {
                        // Unknown message type — error with the echoed
                        // id, connection stays open.
                        let response = Message::Response {
                            id: envelope.id,
                            status: Status::Error,
                            error: Some("unknown_type".into()),
                            enabled: None,
                            existed: None,
                        };
                        framed.send(response).await.map_err(ConnectionError::Codec)?;
                    }
                    DecodeResult::Malformed(e) => {
                        // Completely unrecoverable — can't extract id.
                        return Err(ConnectionError::MalformedFrame(e));
                    }
                }
            }
            delivery = deliver_rx.recv() => {
                match delivery {
                    Some(msg) => {
                        framed.send(msg).await.map_err(ConnectionError::Codec)?;
                    }
                    None => {
                        // Loop dropped our delivery sender — shutting down.
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Send a command to the orchestrator loop and wait for the response.
async fn send_command(
    cmd_tx: &mpsc::UnboundedSender<RelayCommand>,
    request: Message,
    conn_id: ConnectionId,
) -> Result<Message, ConnectionError> {
    let (response_tx, response_rx) = oneshot::channel();
    cmd_tx
        .send(RelayCommand {
            request,
            response_tx,
            connection_id: conn_id,
        })
        .map_err(|_| ConnectionError::OrchestratorGone)?;
    response_rx
        .await
        .map_err(|_| ConnectionError::ResponseDropped)
}

fn is_error_hello_ack(msg: &Message) -> bool {
    matches!(
        msg,
        Message::HelloAck {
            status: Status::Error,
            ..
        }
    )
}
