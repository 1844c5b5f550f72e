//! Runtime-channel IPC: wire protocol and framing codec.

pub mod codec;
pub mod protocol;
