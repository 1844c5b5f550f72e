//! Relay state — the single helper session, connection table, prefs.
//!
//! All methods are pure state transitions with no I/O. Error values
//! are machine-readable reasons that flow straight into wire responses.
//!
//! The session is the one shared resource of the whole system: at most
//! one exists at any time, it is owned exclusively by the orchestrator
//! loop, and every mutation goes through the operations below.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ipc::protocol::{FrameId, Role};
use crate::orchestrator::prefs::PrefStore;

/// Unique identifier for a runtime-channel connection.
///
/// Monotonically increasing counter. Doubles as the opaque tab
/// identity of a page: one router connection per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifier of one launched clipboard access surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HelperHandle(uuid::Uuid);

impl HelperHandle {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for HelperHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.simple().fmt(f)
    }
}

/// The page/frame pair that must receive the session's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginContext {
    pub page: ConnectionId,
    pub frame: FrameId,
}

/// Session phase. Absence of a session is the Idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Surface launched, not yet connected.
    AwaitingHelper,
    /// Surface connected, waiting for its single result.
    AwaitingPayload,
    /// Result accepted (or failure decided), teardown pending.
    Closing,
}

/// The single in-flight clipboard-access operation.
#[derive(Debug)]
struct HelperSession {
    origin: OriginContext,
    helper: HelperHandle,
    /// Connection of the surface once it has said hello.
    surface_conn: Option<ConnectionId>,
    phase: SessionPhase,
    /// Whether a result (payload or failure) already reached the origin.
    delivered: bool,
}

/// Everything torn down when a session ends: the surface to close and,
/// when no result was delivered, the origin owed a failure notice.
#[derive(Debug, PartialEq)]
pub struct Teardown {
    pub helper: HelperHandle,
    pub notify: Option<OriginContext>,
}

/// Orchestrator state. Owned exclusively by the orchestrator loop.
#[derive(Debug)]
pub struct RelayState {
    session: Option<HelperSession>,
    connections: HashMap<ConnectionId, Role>,
    prefs: PrefStore,
}

impl RelayState {
    pub fn new() -> Self {
        Self {
            session: None,
            connections: HashMap::new(),
            prefs: PrefStore::new(),
        }
    }

    /// Register a connection after a successful handshake.
    pub fn add_connection(&mut self, id: ConnectionId, role: Role) {
        self.connections.insert(id, role);
    }

    pub fn connection_role(&self, id: ConnectionId) -> Option<Role> {
        self.connections.get(&id).copied()
    }

    /// Start a new session for `origin`.
    ///
    /// Returns `Err("session_busy")` while another session is live —
    /// concurrent opens are rejected, never queued, so a stale payload
    /// can never reach the wrong origin.
    pub fn open_session(&mut self, origin: OriginContext) -> Result<HelperHandle, &'static str> {
        if self.session.is_some() {
            return Err("session_busy");
        }
        let helper = HelperHandle::new();
        self.session = Some(HelperSession {
            origin,
            helper,
            surface_conn: None,
            phase: SessionPhase::AwaitingHelper,
            delivered: false,
        });
        Ok(helper)
    }

    /// Surface launch failed before anything connected. Clears the
    /// session and returns the origin owed a failure notice.
    pub fn launch_failed(&mut self) -> Option<OriginContext> {
        self.session.take().map(|s| s.origin)
    }

    /// A surface connection completed its handshake.
    ///
    /// Transitions AwaitingHelper → AwaitingPayload. A surface showing
    /// up with no session awaiting one is a protocol violation.
    pub fn bind_surface(&mut self, conn: ConnectionId) -> Result<(), &'static str> {
        match &mut self.session {
            Some(session) if session.phase == SessionPhase::AwaitingHelper => {
                session.surface_conn = Some(conn);
                session.phase = SessionPhase::AwaitingPayload;
                Ok(())
            }
            _ => Err("protocol_violation"),
        }
    }

    /// Accept the session's single clipboard result.
    ///
    /// Only legal while AwaitingPayload, and only from the bound
    /// surface connection: a result before any surface bound can only
    /// come from a stale surface of an earlier session, and accepting
    /// it would deliver that session's payload to the wrong origin.
    /// On success the session moves to Closing and the origin to
    /// deliver to is returned.
    pub fn accept_result(&mut self, conn: ConnectionId) -> Result<OriginContext, &'static str> {
        let session = self.session.as_mut().ok_or("protocol_violation")?;
        if session.phase != SessionPhase::AwaitingPayload || session.surface_conn != Some(conn) {
            return Err("protocol_violation");
        }
        session.phase = SessionPhase::Closing;
        session.delivered = true;
        Ok(session.origin.clone())
    }

    /// End the session, whatever its phase. Idempotent: returns `None`
    /// when no session exists.
    pub fn begin_teardown(&mut self) -> Option<Teardown> {
        self.session.take().map(|s| Teardown {
            helper: s.helper,
            notify: (!s.delivered).then_some(s.origin),
        })
    }

    /// Remove a connection; ends the session if it belonged to it.
    ///
    /// A vanished origin page gets no notice (nobody left to tell); a
    /// vanished surface leaves the origin owed a failure.
    pub fn remove_connection(&mut self, id: ConnectionId) -> Option<Teardown> {
        self.connections.remove(&id);
        let session = self.session.as_ref()?;
        if session.origin.page == id {
            self.session.take().map(|s| Teardown {
                helper: s.helper,
                notify: None,
            })
        } else if session.surface_conn == Some(id) && session.phase != SessionPhase::Closing {
            self.begin_teardown()
        } else {
            None
        }
    }

    pub fn phase(&self) -> Option<SessionPhase> {
        self.session.as_ref().map(|s| s.phase)
    }

    pub fn prefs(&mut self) -> &mut PrefStore {
        &mut self.prefs
    }
}
