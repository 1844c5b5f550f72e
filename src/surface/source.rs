//! System clipboard reads.
//!
//! Wraps arboard behind a trait so payload selection can be tested
//! without a real clipboard. Images come back from arboard as raw
//! RGBA and are re-encoded to PNG here, so everything downstream of
//! the surface deals in ordinary file bytes.

use std::borrow::Cow;
use std::io::Cursor;

/// One readable clipboard representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardEntry {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Clipboard read errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Nothing on the clipboard at all.
    #[error("clipboard is empty")]
    Empty,
    /// The clipboard is held by another client right now. Benign —
    /// the session just ends without a result.
    #[error("clipboard is not available to this process")]
    NotFocused,
    #[error("clipboard read failed: {0}")]
    Unreadable(String),
}

pub trait ClipboardSource {
    /// Read every representation currently on the clipboard.
    fn entries(&mut self) -> Result<Vec<ClipboardEntry>, SourceError>;
}

/// The real system clipboard.
pub struct SystemSource {
    clipboard: arboard::Clipboard,
}

impl SystemSource {
    pub fn new() -> Result<Self, SourceError> {
        let clipboard = arboard::Clipboard::new().map_err(|e| match e {
            arboard::Error::ClipboardOccupied => SourceError::NotFocused,
            other => SourceError::Unreadable(other.to_string()),
        })?;
        Ok(Self { clipboard })
    }
}

impl ClipboardSource for SystemSource {
    fn entries(&mut self) -> Result<Vec<ClipboardEntry>, SourceError> {
        let mut entries = Vec::new();
        let mut hard_error: Option<String> = None;

        match self.clipboard.get_image() {
            Ok(img) => entries.push(encode_image(img)?),
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(arboard::Error::ClipboardOccupied) => return Err(SourceError::NotFocused),
            Err(e) => hard_error = Some(e.to_string()),
        }

        match self.clipboard.get_text() {
            Ok(text) => entries.push(ClipboardEntry {
                mime_type: "text/plain".into(),
                bytes: text.into_bytes(),
            }),
            Err(arboard::Error::ContentNotAvailable) => {}
            Err(arboard::Error::ClipboardOccupied) => return Err(SourceError::NotFocused),
            Err(e) => hard_error = Some(e.to_string()),
        }

        if entries.is_empty() {
            return Err(match hard_error {
                Some(detail) => SourceError::Unreadable(detail),
                None => SourceError::Empty,
            });
        }
        Ok(entries)
    }
}

/// Re-encode raw RGBA clipboard image data as PNG.
fn encode_image(img: arboard::ImageData<'_>) -> Result<ClipboardEntry, SourceError> {
    let bytes: Vec<u8> = match img.bytes {
        Cow::Borrowed(b) => b.to_vec(),
        Cow::Owned(b) => b,
    };
    let rgba = image::RgbaImage::from_raw(img.width as u32, img.height as u32, bytes)
        .ok_or_else(|| SourceError::Unreadable("clipboard image has invalid dimensions".into()))?;

    let mut png = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| SourceError::Unreadable(format!("png encode failed: {e}")))?;

    Ok(ClipboardEntry {
        mime_type: "image/png".into(),
        bytes: png,
    })
}
