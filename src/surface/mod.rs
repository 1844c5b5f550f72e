//! Clipboard access surface — the short-lived helper process.
//!
//! The orchestrator spawns one surface per session. It connects back
//! over the runtime channel as `Role::Surface`, performs exactly one
//! clipboard read, reports the outcome, and exits. Running the read
//! in its own process keeps clipboard permissions and focus concerns
//! out of the daemon.

pub mod source;

use std::time::Duration;

use crate::client::{ClientError, RuntimeClient};
use crate::ipc::protocol::Role;
use crate::payload::ClipboardPayload;
use source::{ClipboardEntry, ClipboardSource, SourceError, SystemSource};

/// Hard ceiling on a surface's lifetime. A read that has not finished
/// by then ends the session without a result.
const SESSION_CEILING: Duration = Duration::from_secs(30);

/// Window geometry, as passed by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceOptions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("runtime channel: {0}")]
    Client(#[from] ClientError),
}

/// Run the surface: one clipboard read, one result, exit.
pub async fn run(options: SurfaceOptions) -> Result<(), SurfaceError> {
    tracing::info!(
        width = options.width,
        height = options.height,
        "surface starting"
    );
    let mut client = RuntimeClient::connect(Role::Surface).await?;

    // Clipboard access is blocking; keep it off the runtime threads.
    let read = tokio::task::spawn_blocking(|| {
        let mut src = SystemSource::new()?;
        src.entries()
    });

    let outcome = match tokio::time::timeout(SESSION_CEILING, read).await {
        Err(_elapsed) => {
            tracing::warn!("clipboard read still pending at session ceiling");
            None
        }
        Ok(Err(join)) => {
            tracing::warn!(error = %join, "clipboard read task failed");
            Some((None, Some("clipboard_unreadable".to_string())))
        }
        Ok(Ok(Err(SourceError::NotFocused))) => {
            // Benign: the clipboard was unavailable to us. The session
            // ends silently, as if the user dismissed the helper.
            tracing::debug!("clipboard not available, closing silently");
            None
        }
        Ok(Ok(Err(SourceError::Empty))) => Some((None, Some("clipboard_unreadable".to_string()))),
        Ok(Ok(Err(SourceError::Unreadable(detail)))) => {
            tracing::warn!(%detail, "clipboard read failed");
            Some((None, Some("clipboard_unreadable".to_string())))
        }
        Ok(Ok(Ok(entries))) => match select_payload(entries) {
            Some(payload) => Some((Some(payload), None)),
            None => Some((None, Some("no_matching_content".to_string()))),
        },
    };

    if let Some((payload, error)) = outcome {
        client.clipboard_result(payload, error).await?;
    }

    // The orchestrator may already be killing us once the result is
    // in; a failed close is not worth reporting.
    if let Err(e) = client.close_helper().await {
        tracing::debug!(error = %e, "close_helper after result failed");
    }
    Ok(())
}

/// Pick the single representation that becomes the session's payload.
///
/// Images win over text. Opaque binary entries are sniffed for image
/// containers that platforms commonly mislabel.
pub fn select_payload(entries: Vec<ClipboardEntry>) -> Option<ClipboardPayload> {
    for entry in &entries {
        if entry.mime_type.starts_with("image/") {
            return Some(ClipboardPayload::from_bytes(&entry.mime_type, &entry.bytes));
        }
        if entry.mime_type == "application/octet-stream"
            && let Some(mime) = sniff_image(&entry.bytes)
        {
            return Some(ClipboardPayload::from_bytes(mime, &entry.bytes));
        }
    }
    entries
        .iter()
        .find(|e| e.mime_type == "text/plain")
        .map(|e| ClipboardPayload::from_bytes("text/plain", &e.bytes))
}

/// Recognize image containers hiding behind `application/octet-stream`.
fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mime: &str, bytes: &[u8]) -> ClipboardEntry {
        ClipboardEntry {
            mime_type: mime.into(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn image_wins_over_text() {
        let entries = vec![
            entry("text/plain", b"caption"),
            entry("image/png", b"\x89PNG data"),
        ];
        let payload = select_payload(entries).unwrap();
        assert_eq!(payload.mime_type, "image/png");
    }

    #[test]
    fn text_only_falls_back_to_text() {
        let entries = vec![entry("text/plain", b"hello")];
        let payload = select_payload(entries).unwrap();
        assert_eq!(payload.mime_type, "text/plain");
        assert_eq!(payload.decode().unwrap(), b"hello");
    }

    #[test]
    fn mislabeled_webp_is_sniffed() {
        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&[0x20, 0, 0, 0]);
        webp.extend_from_slice(b"WEBPVP8 ");
        let entries = vec![entry("application/octet-stream", &webp)];
        let payload = select_payload(entries).unwrap();
        assert_eq!(payload.mime_type, "image/webp");
    }

    #[test]
    fn unsniffable_binary_is_skipped() {
        let entries = vec![
            entry("application/octet-stream", b"not an image"),
            entry("text/plain", b"fallback"),
        ];
        let payload = select_payload(entries).unwrap();
        assert_eq!(payload.mime_type, "text/plain");
    }

    #[test]
    fn nothing_usable_yields_none() {
        let entries = vec![entry("application/octet-stream", b"opaque")];
        assert!(select_payload(entries).is_none());
        assert!(select_payload(vec![]).is_none());
    }

    #[test]
    fn first_image_entry_wins() {
        let entries = vec![
            entry("image/png", b"png bytes"),
            entry("image/jpeg", b"jpeg bytes"),
        ];
        let payload = select_payload(entries).unwrap();
        assert_eq!(payload.mime_type, "image/png");
    }
}
