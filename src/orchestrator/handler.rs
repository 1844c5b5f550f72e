//! Message dispatch and request handling.
//!
//! Pure logic — no I/O. Each request takes a mutable reference to
//! [`RelayState`] and produces a response message plus the side
//! effects the orchestrator loop must carry out (surface launches,
//! unsolicited deliveries, surface teardown).

use crate::ipc::protocol::{Message, PROTOCOL_VERSION, Role, Status};
use crate::orchestrator::session::{
    ConnectionId, HelperHandle, OriginContext, RelayState, Teardown,
};
use crate::payload::ClipboardPayload;

/// Failure reason surfaced when the helper closed without producing a
/// payload through explicit user cancellation. Interceptors treat it
/// as a silent non-result rather than an error worth a notice.
pub const REASON_HELPER_CLOSED: &str = "helper_closed";

/// Generic "nothing usable" reason.
pub const REASON_NO_DATA: &str = "no_data";

/// A side effect the orchestrator loop must execute after dispatch.
#[derive(Debug)]
pub enum Effect {
    /// Launch a clipboard access surface for the new session.
    Launch { helper: HelperHandle },
    /// Send an unsolicited message to a connection.
    Deliver {
        target: ConnectionId,
        message: Message,
    },
    /// Tear down the helper surface. Always safe; close errors are
    /// swallowed by the launcher.
    CloseSurface { helper: HelperHandle },
}

/// Dispatch a request message.
///
/// Returns `(response, effects)`. The loop sends the response back to
/// the requesting connection and then executes the effects in order.
pub fn handle_message(
    state: &mut RelayState,
    request: Message,
    conn: ConnectionId,
) -> (Message, Vec<Effect>) {
    match request {
        Message::Hello { id, version, role } => (handle_hello(state, id, version, role, conn), vec![]),

        Message::OpenHelper { id, frame } => {
            if !has_role(state, conn, Role::Page) {
                return (error_response(id, "unknown_type"), vec![]);
            }
            handle_open_helper(state, id, OriginContext { page: conn, frame })
        }

        Message::ClipboardResult { id, payload, error } => {
            if !has_role(state, conn, Role::Surface) {
                return (error_response(id, "unknown_type"), vec![]);
            }
            handle_clipboard_result(state, id, conn, payload, error)
        }

        Message::CloseHelper { id } => handle_close_helper(state, id),

        Message::SavePreference { id, site, enabled } => {
            state.prefs().set(&site, enabled);
            (ok_response(id), vec![])
        }
        Message::GetPreference { id, site } => {
            let enabled = state.prefs().get(&site);
            (
                Message::Response {
                    id,
                    status: Status::Ok,
                    error: None,
                    enabled: Some(enabled),
                    existed: None,
                },
                vec![],
            )
        }
        Message::ClearPreference { id, site } => {
            let existed = state.prefs().clear(&site);
            (
                Message::Response {
                    id,
                    status: Status::Ok,
                    error: None,
                    enabled: None,
                    existed: Some(existed),
                },
                vec![],
            )
        }

        // Orchestrator-originated messages are never valid requests.
        Message::HelloAck { id, .. }
        | Message::HelperOpened { id, .. }
        | Message::PayloadDelivery { id, .. }
        | Message::DeliveryFailed { id, .. }
        | Message::Response { id, .. } => (error_response(id, "unknown_type"), vec![]),
    }
}

// -- Individual handlers --

fn handle_hello(
    state: &mut RelayState,
    id: u32,
    version: u32,
    role: Role,
    conn: ConnectionId,
) -> Message {
    if id != 0 {
        return hello_ack_error("invalid_hello_id");
    }
    if version != PROTOCOL_VERSION {
        return hello_ack_error("version_mismatch");
    }
    if role == Role::Surface {
        // A surface handshake is the `helperCreated` edge of the
        // session state machine. One showing up with no session
        // awaiting it is rejected outright.
        if let Err(reason) = state.bind_surface(conn) {
            tracing::warn!(?conn, "surface connected with no session awaiting it");
            return hello_ack_error(reason);
        }
    }
    state.add_connection(conn, role);
    Message::HelloAck {
        id: 0,
        status: Status::Ok,
        error: None,
    }
}

fn handle_open_helper(
    state: &mut RelayState,
    id: u32,
    origin: OriginContext,
) -> (Message, Vec<Effect>) {
    match state.open_session(origin) {
        Ok(helper) => (
            Message::HelperOpened {
                id,
                status: Status::Ok,
                error: None,
            },
            vec![Effect::Launch { helper }],
        ),
        Err(reason) => (
            Message::HelperOpened {
                id,
                status: Status::Error,
                error: Some(reason.into()),
            },
            vec![],
        ),
    }
}

fn handle_clipboard_result(
    state: &mut RelayState,
    id: u32,
    conn: ConnectionId,
    payload: Option<ClipboardPayload>,
    error: Option<String>,
) -> (Message, Vec<Effect>) {
    let origin = match state.accept_result(conn) {
        Ok(origin) => origin,
        Err(reason) => {
            // Out-of-phase result: log and discard.
            tracing::warn!(?conn, reason, "discarding clipboard result");
            return (error_response(id, reason), vec![]);
        }
    };

    let delivery = match payload {
        Some(payload) => Message::PayloadDelivery {
            id: 0,
            frame: origin.frame.clone(),
            payload,
        },
        None => Message::DeliveryFailed {
            id: 0,
            frame: origin.frame.clone(),
            reason: error.unwrap_or_else(|| REASON_NO_DATA.into()),
        },
    };

    let mut effects = vec![Effect::Deliver {
        target: origin.page,
        message: delivery,
    }];
    // The result was delivered, so teardown owes no further notice.
    if let Some(Teardown { helper, .. }) = state.begin_teardown() {
        effects.push(Effect::CloseSurface { helper });
    }
    (ok_response(id), effects)
}

fn handle_close_helper(state: &mut RelayState, id: u32) -> (Message, Vec<Effect>) {
    let effects = teardown_effects(state.begin_teardown(), REASON_HELPER_CLOSED);
    (ok_response(id), effects)
}

/// Effects for an ended session: close the surface and, if the origin
/// never got a result, tell it why.
pub fn teardown_effects(teardown: Option<Teardown>, reason: &str) -> Vec<Effect> {
    let Some(Teardown { helper, notify }) = teardown else {
        return vec![];
    };
    let mut effects = vec![Effect::CloseSurface { helper }];
    if let Some(origin) = notify {
        effects.push(Effect::Deliver {
            target: origin.page,
            message: Message::DeliveryFailed {
                id: 0,
                frame: origin.frame,
                reason: reason.into(),
            },
        });
    }
    effects
}

// -- Helpers --

fn has_role(state: &RelayState, conn: ConnectionId, role: Role) -> bool {
    state.connection_role(conn) == Some(role)
}

fn hello_ack_error(reason: &str) -> Message {
    Message::HelloAck {
        id: 0,
        status: Status::Error,
        error: Some(reason.into()),
    }
}

fn ok_response(id: u32) -> Message {
    Message::Response {
        id,
        status: Status::Ok,
        error: None,
        enabled: None,
        existed: None,
    }
}

fn error_response(id: u32, reason: &str) -> Message {
    Message::Response {
        id,
        status: Status::Error,
        error: Some(reason.into()),
        enabled: None,
        existed: None,
    }
}
