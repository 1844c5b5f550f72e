//! pastebridge — clipboard to file-input relay.
//!
//! Lets a user fill a file input from the system clipboard: activating
//! an input raises a paste overlay, a short-lived helper process reads
//! the clipboard once, and the bytes come back as a synthetic file
//! assigned to exactly the frame that asked.
//!
//! Components, one per process or task:
//! - [`orchestrator`] — the daemon; owns the single helper session and
//!   relays payloads between pages and surfaces.
//! - [`surface`] — the helper process; one clipboard read, one result.
//! - [`page`] — embedder-side frame router and input interceptors.
//! - [`client`] / [`ipc`] — the shared runtime channel.

pub mod client;
pub mod ipc;
pub mod orchestrator;
pub mod page;
pub mod payload;
pub mod surface;
