//! Session orchestrator daemon — the privileged hub of the relay.
//!
//! The orchestrator listens on a Unix domain socket and brokers
//! clipboard-access sessions between page routers and short-lived
//! clipboard surfaces. It is the only component that launches
//! surfaces, and the only one that knows which page/frame a payload
//! must return to.
//!
//! Architecture: channel-based actor. A single loop owns all mutable
//! state ([`session::RelayState`]). Per-connection tasks forward
//! requests via mpsc channels; unsolicited deliveries (payloads,
//! failure notices) are routed back out via per-connection channels.

pub mod connection;
pub mod handler;
pub mod launcher;
pub mod prefs;
pub mod session;

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

use connection::{DisconnectNotice, RelayCommand};
use handler::{Effect, REASON_HELPER_CLOSED, teardown_effects};
use launcher::{ProcessLauncher, SurfaceGeometry, SurfaceLauncher};
use session::{ConnectionId, RelayState};

use crate::ipc::protocol::Message;

/// Orchestrator startup/runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("$XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,
    #[error("orchestrator already running at {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to create directory {path}: {source}")]
    MkdirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind socket {path}: {source}")]
    BindFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the orchestrator daemon until SIGTERM or SIGINT.
///
/// # Errors
///
/// Returns `OrchestratorError` if `$XDG_RUNTIME_DIR` is unset, socket
/// bind fails, or another orchestrator is already running.
pub async fn run(geometry: SurfaceGeometry) -> Result<(), OrchestratorError> {
    let socket_path = socket_path()?;
    let listener = bind_socket(&socket_path).await?;

    tracing::info!(path = %socket_path.display(), "orchestrator listening");

    let launcher = Box::new(ProcessLauncher::new(geometry));

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    let result = tokio::select! {
        result = serve(listener, launcher) => result,
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
            Ok(())
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down");
            Ok(())
        }
    };

    if let Err(e) = std::fs::remove_file(&socket_path) {
        tracing::warn!(error = %e, path = %socket_path.display(), "failed to remove socket");
    }

    tracing::info!("orchestrator stopped");
    result
}

/// Accept/dispatch loop. Runs until the listener fails.
///
/// Factored out of [`run`] so tests can drive it on a temp socket
/// with a mock launcher.
async fn serve(
    listener: UnixListener,
    mut launcher: Box<dyn SurfaceLauncher + Send>,
) -> Result<(), OrchestratorError> {
    // Channels for connection → orchestrator communication.
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<RelayCommand>();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<DisconnectNotice>();

    // Per-connection channels for unsolicited delivery.
    let mut deliver_senders: HashMap<ConnectionId, mpsc::UnboundedSender<Message>> = HashMap::new();

    let mut state = RelayState::new();

    loop {
        tokio::select! {
            // -- New connection --
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        accept_connection(
                            stream,
                            &cmd_tx,
                            &disconnect_tx,
                            &mut deliver_senders,
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }

            // -- Request from a connection task --
            Some(cmd) = cmd_rx.recv() => {
                let (response, effects) = handler::handle_message(
                    &mut state,
                    cmd.request,
                    cmd.connection_id,
                );
                let _ = cmd.response_tx.send(response);

                execute_effects(effects, &mut state, launcher.as_mut(), &deliver_senders);
            }

            // -- Connection disconnected --
            Some(notice) = disconnect_rx.recv() => {
                let conn_id = notice.connection_id;
                deliver_senders.remove(&conn_id);
                // A vanished surface is equivalent to the user closing
                // the helper window.
                let effects = teardown_effects(
                    state.remove_connection(conn_id),
                    REASON_HELPER_CLOSED,
                );
                execute_effects(effects, &mut state, launcher.as_mut(), &deliver_senders);
                tracing::debug!(?conn_id, "connection cleaned up");
            }
        }
    }
}

/// Accept a new connection — create channels and spawn handler task.
fn accept_connection(
    stream: UnixStream,
    cmd_tx: &mpsc::UnboundedSender<RelayCommand>,
    disconnect_tx: &mpsc::UnboundedSender<DisconnectNotice>,
    deliver_senders: &mut HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
) {
    let conn_id = ConnectionId::new();
    let (deliver_tx, deliver_rx) = mpsc::unbounded_channel();
    deliver_senders.insert(conn_id, deliver_tx);

    connection::spawn_connection(
        stream,
        conn_id,
        cmd_tx.clone(),
        deliver_rx,
        disconnect_tx.clone(),
    );

    tracing::debug!(?conn_id, "accepted connection");
}

/// Carry out the side effects returned by the message handler.
fn execute_effects(
    effects: Vec<Effect>,
    state: &mut RelayState,
    launcher: &mut dyn SurfaceLauncher,
    deliver_senders: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
) {
    for effect in effects {
        match effect {
            Effect::Launch { helper } => {
                if let Err(error) = launcher.launch(helper) {
                    tracing::error!(%helper, %error, "surface launch failed");
                    // The session is already recorded; unwind it and
                    // tell the origin the helper never came up.
                    if let Some(origin) = state.launch_failed() {
                        dispatch_delivery(
                            deliver_senders,
                            origin.page,
                            Message::DeliveryFailed {
                                id: 0,
                                frame: origin.frame,
                                reason: "surface_launch_failed".into(),
                            },
                        );
                    }
                }
            }
            Effect::Deliver { target, message } => {
                dispatch_delivery(deliver_senders, target, message);
            }
            Effect::CloseSurface { helper } => {
                launcher.close(helper);
            }
        }
    }
}

/// Route an unsolicited message to the target connection's task.
fn dispatch_delivery(
    deliver_senders: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    target: ConnectionId,
    message: Message,
) {
    if let Some(tx) = deliver_senders.get(&target) {
        if tx.send(message).is_err() {
            tracing::warn!(conn_id = ?target, "delivery send failed — client disconnected");
        }
    } else {
        tracing::warn!(conn_id = ?target, "delivery target not found");
    }
}

// -- Socket setup --

/// Resolve the orchestrator socket path from `$XDG_RUNTIME_DIR`.
pub fn socket_path() -> Result<PathBuf, OrchestratorError> {
    let runtime_dir =
        std::env::var("XDG_RUNTIME_DIR").map_err(|_| OrchestratorError::NoRuntimeDir)?;
    Ok(PathBuf::from(runtime_dir)
        .join("pastebridge")
        .join("bridge.sock"))
}

/// Create the socket directory and bind the Unix listener.
///
/// Handles stale socket detection: if EADDRINUSE, attempts to connect
/// to the existing socket. If the connection succeeds, another
/// orchestrator is running. If it fails, the socket is stale and is
/// removed.
async fn bind_socket(path: &std::path::Path) -> Result<UnixListener, OrchestratorError> {
    // Ensure parent directory exists with mode 0700.
    let parent = path.parent().expect("socket path has parent");
    if !parent.exists() {
        std::fs::create_dir_all(parent).map_err(|e| OrchestratorError::MkdirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    // Always validate/set directory permissions to 0700, even if the
    // directory already existed.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
            OrchestratorError::MkdirFailed {
                path: parent.to_path_buf(),
                source: e,
            }
        })?;
    }

    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            // Check if the existing socket is live.
            match UnixStream::connect(path).await {
                Ok(_) => Err(OrchestratorError::AlreadyRunning(path.to_path_buf())),
                Err(_) => {
                    // Stale socket — remove and retry.
                    tracing::info!(path = %path.display(), "removing stale socket");
                    std::fs::remove_file(path).map_err(|e| OrchestratorError::BindFailed {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                    UnixListener::bind(path).map_err(|e| OrchestratorError::BindFailed {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            }
        }
        Err(e) => Err(OrchestratorError::BindFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use futures::{SinkExt, StreamExt};
    use tokio::net::UnixStream;
    use tokio_util::codec::Framed;

    use crate::ipc::codec::LengthPrefixedCodec;
    use crate::ipc::protocol::{FrameId, Message, PROTOCOL_VERSION, Role, Status};
    use crate::orchestrator::launcher::LaunchError;
    use crate::orchestrator::session::HelperHandle;
    use crate::payload::ClipboardPayload;

    /// Launcher that records calls instead of spawning processes.
    #[derive(Clone, Default)]
    struct MockLauncher {
        launches: Arc<Mutex<Vec<HelperHandle>>>,
        closes: Arc<Mutex<Vec<HelperHandle>>>,
        fail: bool,
    }

    impl SurfaceLauncher for MockLauncher {
        fn launch(&mut self, helper: HelperHandle) -> Result<(), LaunchError> {
            if self.fail {
                return Err(LaunchError::Spawn(std::io::Error::other("mock failure")));
            }
            self.launches.lock().unwrap().push(helper);
            Ok(())
        }

        fn close(&mut self, helper: HelperHandle) {
            self.closes.lock().unwrap().push(helper);
        }
    }

    /// Start the serve loop on a temp socket with the given launcher.
    async fn start_orchestrator(path: &std::path::Path, launcher: MockLauncher) {
        let listener = bind_socket(path).await.unwrap();
        tokio::spawn(serve(listener, Box::new(launcher)));
        // Give the loop a moment to start listening.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    async fn connect(path: &std::path::Path) -> Framed<UnixStream, LengthPrefixedCodec> {
        let stream = UnixStream::connect(path).await.unwrap();
        Framed::new(stream, LengthPrefixedCodec::new())
    }

    async fn send_recv(
        framed: &mut Framed<UnixStream, LengthPrefixedCodec>,
        msg: Message,
    ) -> Message {
        framed.send(msg).await.unwrap();
        framed.next().await.unwrap().unwrap()
    }

    async fn handshake(framed: &mut Framed<UnixStream, LengthPrefixedCodec>, role: Role) {
        let resp = send_recv(
            framed,
            Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
                role,
            },
        )
        .await;
        assert!(matches!(
            resp,
            Message::HelloAck {
                status: Status::Ok,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn full_relay_flow() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        let launcher = MockLauncher::default();
        start_orchestrator(&sock, launcher.clone()).await;

        // -- Page connects and opens a helper for a nested frame --
        let mut page = connect(&sock).await;
        handshake(&mut page, Role::Page).await;

        let frame = FrameId::Nested("injected-frame-0".into());
        let resp = send_recv(
            &mut page,
            Message::OpenHelper {
                id: 1,
                frame: frame.clone(),
            },
        )
        .await;
        assert!(matches!(
            resp,
            Message::HelperOpened {
                id: 1,
                status: Status::Ok,
                ..
            }
        ));
        assert_eq!(launcher.launches.lock().unwrap().len(), 1);

        // -- Surface connects and reports its read --
        let mut surface = connect(&sock).await;
        handshake(&mut surface, Role::Surface).await;

        let payload = ClipboardPayload::from_bytes("image/png", b"\x89PNG fake");
        let resp = send_recv(
            &mut surface,
            Message::ClipboardResult {
                id: 1,
                payload: Some(payload.clone()),
                error: None,
            },
        )
        .await;
        assert!(matches!(
            resp,
            Message::Response {
                status: Status::Ok,
                ..
            }
        ));

        // -- Page receives the unsolicited delivery for its frame --
        let delivery = page.next().await.unwrap().unwrap();
        match delivery {
            Message::PayloadDelivery {
                id,
                frame: delivered_frame,
                payload: delivered,
            } => {
                assert_eq!(id, 0); // Unsolicited
                assert_eq!(delivered_frame, frame);
                assert_eq!(delivered, payload);
            }
            other => panic!("expected PayloadDelivery, got {other:?}"),
        }

        // -- Surface torn down --
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(launcher.closes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_open_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        start_orchestrator(&sock, MockLauncher::default()).await;

        let mut first = connect(&sock).await;
        handshake(&mut first, Role::Page).await;
        send_recv(
            &mut first,
            Message::OpenHelper {
                id: 1,
                frame: FrameId::Top,
            },
        )
        .await;

        let mut second = connect(&sock).await;
        handshake(&mut second, Role::Page).await;
        let resp = send_recv(
            &mut second,
            Message::OpenHelper {
                id: 1,
                frame: FrameId::Top,
            },
        )
        .await;
        match resp {
            Message::HelperOpened { status, error, .. } => {
                assert_eq!(status, Status::Error);
                assert_eq!(error.as_deref(), Some("session_busy"));
            }
            other => panic!("expected HelperOpened error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn launch_failure_notifies_origin_and_clears_session() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        let launcher = MockLauncher {
            fail: true,
            ..Default::default()
        };
        start_orchestrator(&sock, launcher).await;

        let mut page = connect(&sock).await;
        handshake(&mut page, Role::Page).await;

        let resp = send_recv(
            &mut page,
            Message::OpenHelper {
                id: 1,
                frame: FrameId::Top,
            },
        )
        .await;
        // The open itself succeeds; the failure arrives unsolicited.
        assert!(matches!(
            resp,
            Message::HelperOpened {
                status: Status::Ok,
                ..
            }
        ));

        let failure = page.next().await.unwrap().unwrap();
        match failure {
            Message::DeliveryFailed { frame, reason, .. } => {
                assert_eq!(frame, FrameId::Top);
                assert_eq!(reason, "surface_launch_failed");
            }
            other => panic!("expected DeliveryFailed, got {other:?}"),
        }

        // Session cleared — a fresh open is accepted again.
        let resp = send_recv(
            &mut page,
            Message::OpenHelper {
                id: 2,
                frame: FrameId::Top,
            },
        )
        .await;
        assert!(matches!(
            resp,
            Message::HelperOpened {
                status: Status::Ok,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn close_helper_sends_failure_to_origin() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        let launcher = MockLauncher::default();
        start_orchestrator(&sock, launcher.clone()).await;

        let mut page = connect(&sock).await;
        handshake(&mut page, Role::Page).await;
        send_recv(
            &mut page,
            Message::OpenHelper {
                id: 1,
                frame: FrameId::Top,
            },
        )
        .await;

        let mut surface = connect(&sock).await;
        handshake(&mut surface, Role::Surface).await;

        // User dismissed the helper without producing a result.
        let resp = send_recv(&mut surface, Message::CloseHelper { id: 2 }).await;
        assert!(matches!(
            resp,
            Message::Response {
                status: Status::Ok,
                ..
            }
        ));

        let failure = page.next().await.unwrap().unwrap();
        match failure {
            Message::DeliveryFailed { reason, .. } => {
                assert_eq!(reason, "helper_closed");
            }
            other => panic!("expected DeliveryFailed, got {other:?}"),
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(launcher.closes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn surface_disconnect_before_result_notifies_origin() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        start_orchestrator(&sock, MockLauncher::default()).await;

        let mut page = connect(&sock).await;
        handshake(&mut page, Role::Page).await;
        send_recv(
            &mut page,
            Message::OpenHelper {
                id: 1,
                frame: FrameId::Top,
            },
        )
        .await;

        let mut surface = connect(&sock).await;
        handshake(&mut surface, Role::Surface).await;

        // Surface crashes.
        drop(surface);

        let failure = page.next().await.unwrap().unwrap();
        match failure {
            Message::DeliveryFailed { reason, .. } => {
                assert_eq!(reason, "helper_closed");
            }
            other => panic!("expected DeliveryFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn rogue_surface_handshake_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        start_orchestrator(&sock, MockLauncher::default()).await;

        // No session open — a surface has no business connecting.
        let mut rogue = connect(&sock).await;
        let resp = send_recv(
            &mut rogue,
            Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
                role: Role::Surface,
            },
        )
        .await;
        match resp {
            Message::HelloAck { status, error, .. } => {
                assert_eq!(status, Status::Error);
                assert_eq!(error.as_deref(), Some("protocol_violation"));
            }
            other => panic!("expected HelloAck error, got {other:?}"),
        }

        // Connection closed by the server.
        assert!(rogue.next().await.is_none());
    }

    #[tokio::test]
    async fn version_mismatch_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        start_orchestrator(&sock, MockLauncher::default()).await;

        let mut conn = connect(&sock).await;
        let resp = send_recv(
            &mut conn,
            Message::Hello {
                id: 0,
                version: 999,
                role: Role::Page,
            },
        )
        .await;
        match resp {
            Message::HelloAck { status, error, .. } => {
                assert_eq!(status, Status::Error);
                assert_eq!(error.as_deref(), Some("version_mismatch"));
            }
            other => panic!("expected HelloAck error, got {other:?}"),
        }
        assert!(conn.next().await.is_none());
    }

    #[tokio::test]
    async fn non_hello_first_message_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        start_orchestrator(&sock, MockLauncher::default()).await;

        let mut conn = connect(&sock).await;
        conn.send(Message::OpenHelper {
            id: 1,
            frame: FrameId::Top,
        })
        .await
        .unwrap();

        // Closed without any response.
        assert!(conn.next().await.is_none());
    }

    #[tokio::test]
    async fn preference_round_trip_over_wire() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        start_orchestrator(&sock, MockLauncher::default()).await;

        let mut control = connect(&sock).await;
        handshake(&mut control, Role::Control).await;

        send_recv(
            &mut control,
            Message::SavePreference {
                id: 1,
                site: "app.example.com".into(),
                enabled: false,
            },
        )
        .await;

        let resp = send_recv(
            &mut control,
            Message::GetPreference {
                id: 2,
                site: "app.example.com".into(),
            },
        )
        .await;
        match resp {
            Message::Response { enabled, .. } => assert_eq!(enabled, Some(false)),
            other => panic!("expected Response, got {other:?}"),
        }

        let resp = send_recv(
            &mut control,
            Message::ClearPreference {
                id: 3,
                site: "app.example.com".into(),
            },
        )
        .await;
        match resp {
            Message::Response { existed, .. } => assert_eq!(existed, Some(true)),
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_type_returns_error_keeps_connection() {
        use bytes::BufMut;
        use tokio::io::AsyncWriteExt;

        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");
        start_orchestrator(&sock, MockLauncher::default()).await;

        let mut conn = connect(&sock).await;
        handshake(&mut conn, Role::Control).await;

        // Send an unknown message type as a raw MessagePack frame.
        #[derive(serde::Serialize)]
        struct FakeMsg {
            #[serde(rename = "type")]
            msg_type: String,
            id: u32,
        }
        let unknown = rmp_serde::to_vec_named(&FakeMsg {
            msg_type: "frobnicate".into(),
            id: 42,
        })
        .unwrap();
        let mut raw_frame = bytes::BytesMut::new();
        raw_frame.put_u32(unknown.len() as u32);
        raw_frame.extend_from_slice(&unknown);

        let stream = conn.into_inner();
        let (mut reader, mut writer) = stream.into_split();
        writer.write_all(&raw_frame).await.unwrap();

        async fn read_response(reader: &mut tokio::net::unix::OwnedReadHalf) -> Message {
            use tokio::io::AsyncReadExt;
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf).await.unwrap();
            let mut resp_buf = vec![0u8; u32::from_be_bytes(len_buf) as usize];
            reader.read_exact(&mut resp_buf).await.unwrap();
            rmp_serde::from_slice::<Message>(&resp_buf).unwrap()
        }

        match read_response(&mut reader).await {
            Message::Response {
                id, status, error, ..
            } => {
                assert_eq!(id, 42); // Echoed from the unknown message
                assert_eq!(status, Status::Error);
                assert_eq!(error.as_deref(), Some("unknown_type"));
            }
            other => panic!("expected error Response, got {other:?}"),
        }

        // Connection still open — a valid request works afterwards.
        let close = rmp_serde::to_vec_named(&Message::CloseHelper { id: 7 }).unwrap();
        let mut close_frame = bytes::BytesMut::new();
        close_frame.put_u32(close.len() as u32);
        close_frame.extend_from_slice(&close);
        writer.write_all(&close_frame).await.unwrap();

        match read_response(&mut reader).await {
            Message::Response {
                id: 7,
                status: Status::Ok,
                ..
            } => {}
            other => panic!("expected ok Response after unknown_type, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("bridge.sock");

        // Bind and immediately drop — leaves a dead socket file behind.
        {
            let _stale = UnixListener::bind(&sock).unwrap();
        }
        assert!(sock.exists());

        // A fresh bind reclaims it.
        let listener = bind_socket(&sock).await.unwrap();
        drop(listener);
    }
}
