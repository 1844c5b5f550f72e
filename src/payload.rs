//! Clipboard payload encoding — data URLs, pasted-file naming, sizes.
//!
//! A payload is the product of exactly one clipboard read. Content
//! bytes travel as a self-describing data URL so every hop of the
//! relay (surface → orchestrator → router → interceptor) can forward
//! it without re-encoding, and an image preview can use the string
//! directly as its `src`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Content + type pair produced by one clipboard read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClipboardPayload {
    /// `data:<mime>;base64,<content>` string.
    pub data: String,
    pub mime_type: String,
}

/// Payload decode errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is not a base64 data URL")]
    NotADataUrl,
    #[error("invalid base64 content: {0}")]
    Base64(String),
}

impl ClipboardPayload {
    /// Encode raw content bytes into a data-URL payload.
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            data: format!("data:{mime_type};base64,{}", BASE64.encode(bytes)),
            mime_type: mime_type.to_string(),
        }
    }

    /// Decode the data URL back into raw content bytes.
    pub fn decode(&self) -> Result<Vec<u8>, PayloadError> {
        let rest = self.data.strip_prefix("data:").ok_or(PayloadError::NotADataUrl)?;
        let (_, content) = rest
            .split_once(";base64,")
            .ok_or(PayloadError::NotADataUrl)?;
        BASE64
            .decode(content)
            .map_err(|e| PayloadError::Base64(e.to_string()))
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// Decoded size, computed from the base64 body without decoding.
    pub fn approx_size(&self) -> u64 {
        let body = self
            .data
            .split_once(";base64,")
            .map(|(_, b)| b)
            .unwrap_or("");
        let padding = body.chars().rev().take_while(|&c| c == '=').count();
        ((body.len() / 4 * 3).saturating_sub(padding)) as u64
    }
}

/// File extension for a MIME type.
///
/// Common types map explicitly; anything else falls back to the MIME
/// subtype, then to a generic binary extension.
pub fn extension_for(mime_type: &str) -> &str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "text/plain" => "txt",
        "application/pdf" => "pdf",
        "application/json" => "json",
        "application/xml" => "xml",
        "application/zip" => "zip",
        other => match other.split_once('/') {
            Some((_, subtype)) if !subtype.is_empty() => subtype,
            _ => "bin",
        },
    }
}

/// Deterministically-shaped name for a pasted file:
/// `pasted-file-<6 random chars>.<ext>`.
pub fn pasted_file_name(mime_type: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect();
    format!("pasted-file-{suffix}.{}", extension_for(mime_type))
}

/// Human-readable size for the overlay's file-info line.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    let mut rendered = format!("{value:.2}");
    while rendered.ends_with('0') {
        rendered.pop();
    }
    if rendered.ends_with('.') {
        rendered.pop();
    }
    format!("{rendered} {}", UNITS[exp])
}

/// Lossy text preview capped at `limit` characters, with an ellipsis
/// when truncated.
pub fn text_snippet(bytes: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() > limit {
        let truncated: String = text.chars().take(limit).collect();
        format!("{truncated}...")
    } else {
        text.into_owned()
    }
}
