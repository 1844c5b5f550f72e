//! Per-page frame router.
//!
//! The router is the page's single point of contact with the
//! orchestrator. It assigns synthetic identifiers to nested frames,
//! hands each frame an endpoint, forwards open requests upward, and
//! broadcasts every delivery downward — endpoints filter on their own
//! frame id, so the router never needs to know which frame asked.
//!
//! Frame discovery arrives as a stream of "frames added" batches from
//! the page's structural watcher; the router injects each batch as it
//! lands and emits the resulting endpoints.

use tokio::sync::{broadcast, mpsc};

use crate::client::{ClientError, RuntimeClient};
use crate::ipc::protocol::{FrameId, Message};
use crate::page::{OpenRequest, PageMessage};

/// Broadcast depth for deliveries. Payloads are rare (one per user
/// gesture), so lag here means a stuck consumer, not load.
const DELIVERY_CAPACITY: usize = 16;

/// A frame discovered in the page's structure.
#[derive(Debug, Clone, Copy)]
pub struct FrameNode {
    /// Whether the frame belongs to a different origin than the page.
    pub cross_origin: bool,
}

/// Injection into a cross-origin frame is not possible; the frame
/// keeps its native picker.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("frame is cross-origin, injection blocked")]
pub struct InjectionBlocked;

/// What one frame's interceptor holds: its identity, the delivery
/// broadcast, and the shared request channel.
#[derive(Debug)]
pub struct FrameEndpoint {
    pub frame: FrameId,
    pub deliveries: broadcast::Receiver<PageMessage>,
    pub requests: mpsc::UnboundedSender<OpenRequest>,
}

/// Handle for the page's structural watcher: feed "frames added"
/// batches in, get the endpoints of newly injected frames out.
#[derive(Debug)]
pub struct StructureWatch {
    pub additions: mpsc::UnboundedSender<Vec<FrameNode>>,
    pub endpoints: mpsc::UnboundedReceiver<FrameEndpoint>,
}

pub struct FrameRouter {
    client: RuntimeClient,
    deliveries_tx: broadcast::Sender<PageMessage>,
    open_tx: mpsc::UnboundedSender<OpenRequest>,
    open_rx: mpsc::UnboundedReceiver<OpenRequest>,
    structural_tx: mpsc::UnboundedSender<Vec<FrameNode>>,
    structural_rx: mpsc::UnboundedReceiver<Vec<FrameNode>>,
    endpoints_tx: mpsc::UnboundedSender<FrameEndpoint>,
    endpoints_rx: Option<mpsc::UnboundedReceiver<FrameEndpoint>>,
    next_frame: u64,
    frames: Vec<FrameId>,
}

impl FrameRouter {
    pub fn new(client: RuntimeClient) -> Self {
        let (deliveries_tx, _) = broadcast::channel(DELIVERY_CAPACITY);
        let (open_tx, open_rx) = mpsc::unbounded_channel();
        let (structural_tx, structural_rx) = mpsc::unbounded_channel();
        let (endpoints_tx, endpoints_rx) = mpsc::unbounded_channel();
        Self {
            client,
            deliveries_tx,
            open_tx,
            open_rx,
            structural_tx,
            structural_rx,
            endpoints_tx,
            endpoints_rx: Some(endpoints_rx),
            next_frame: 0,
            frames: Vec::new(),
        }
    }

    /// Endpoint for the page's top document.
    pub fn install_top(&mut self) -> FrameEndpoint {
        self.endpoint(FrameId::Top)
    }

    /// Subscribe the router to the page's structural-change stream.
    /// `None` once the watch has already been handed out.
    pub fn watch_structure(&mut self) -> Option<StructureWatch> {
        let endpoints = self.endpoints_rx.take()?;
        Some(StructureWatch {
            additions: self.structural_tx.clone(),
            endpoints,
        })
    }

    /// Inject into one nested frame, assigning its synthetic id.
    pub fn inject(&mut self, node: &FrameNode) -> Result<FrameEndpoint, InjectionBlocked> {
        if node.cross_origin {
            return Err(InjectionBlocked);
        }
        let frame = FrameId::Nested(format!("injected-frame-{}", self.next_frame));
        self.next_frame += 1;
        Ok(self.endpoint(frame))
    }

    /// Inject a batch of discovered frames. Cross-origin frames are
    /// skipped without comment — that outcome is ordinary, not a
    /// fault worth reporting.
    pub fn apply_batch(&mut self, nodes: &[FrameNode]) -> Vec<FrameEndpoint> {
        nodes
            .iter()
            .filter_map(|node| self.inject(node).ok())
            .collect()
    }

    pub fn known_frames(&self) -> &[FrameId] {
        &self.frames
    }

    fn endpoint(&mut self, frame: FrameId) -> FrameEndpoint {
        self.frames.push(frame.clone());
        FrameEndpoint {
            frame,
            deliveries: self.deliveries_tx.subscribe(),
            requests: self.open_tx.clone(),
        }
    }

    /// Drive the router: inject structural additions, forward open
    /// requests upward, broadcast deliveries downward. Runs until the
    /// orchestrator disconnects or every endpoint is gone.
    pub async fn run(mut self) -> Result<(), ClientError> {
        loop {
            tokio::select! {
                batch = self.structural_rx.recv() => {
                    // Channel can't close — the router holds a sender.
                    if let Some(nodes) = batch {
                        for endpoint in self.apply_batch(&nodes) {
                            let _ = self.endpoints_tx.send(endpoint);
                        }
                    }
                }
                request = self.open_rx.recv() => {
                    let Some(OpenRequest { frame }) = request else {
                        return Ok(());
                    };
                    match self.client.open_helper(frame.clone()).await {
                        Ok(()) => {}
                        Err(ClientError::Rejected(reason)) => {
                            // session_busy and friends are scoped to the
                            // requesting frame.
                            let _ = self
                                .deliveries_tx
                                .send(PageMessage::Failure { frame, reason });
                        }
                        Err(e) => return Err(e),
                    }
                }
                inbound = self.client.next_message() => {
                    match inbound {
                        None => return Ok(()),
                        Some(Err(e)) => return Err(e),
                        Some(Ok(Message::PayloadDelivery { frame, payload, .. })) => {
                            let _ = self
                                .deliveries_tx
                                .send(PageMessage::Payload { frame, payload });
                        }
                        Some(Ok(Message::DeliveryFailed { frame, reason, .. })) => {
                            let _ = self
                                .deliveries_tx
                                .send(PageMessage::Failure { frame, reason });
                        }
                        Some(Ok(other)) => {
                            tracing::debug!(?other, "unexpected runtime message");
                        }
                    }
                }
            }
        }
    }
}
