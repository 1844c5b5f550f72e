//! File-input interception and the paste overlay.
//!
//! One interceptor per frame. It watches the frame's file inputs,
//! swaps the native picker for a paste overlay on activation, and
//! turns delivered clipboard payloads into synthetic file
//! assignments. All state transitions are synchronous; the only
//! asynchrony is the open request it sends up to the frame router.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::ipc::protocol::FrameId;
use crate::page::input::{FileInput, InputId, PickerInvoker, SyntheticFile};
use crate::page::{OpenRequest, PageMessage};
use crate::payload::{
    ClipboardPayload, PayloadError, extension_for, format_size, pasted_file_name, text_snippet,
};

/// Repeated activations inside this window are collapsed into one
/// overlay. Hosts commonly deliver a second activation for the same
/// user gesture (label wrapping, delegated handlers).
pub const ACTIVATION_DEBOUNCE: Duration = Duration::from_millis(200);

/// Cap on the overlay's text preview.
const TEXT_PREVIEW_LIMIT: usize = 500;

/// Notice shown when the helper could not produce a payload.
const NO_DATA_NOTICE: &str = "No clipboard data available";

/// Outcome of one file-input activation.
#[derive(Debug, PartialEq, Eq)]
pub enum Activation {
    /// Overlay opened and a helper session was requested.
    OverlayShown,
    /// Collapsed into the already-open overlay.
    Debounced,
    /// Passed through to the host's native picker.
    Native,
    /// Activation of an input this interceptor does not observe.
    Ignored,
}

/// Preview rendered inside the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// The payload's data URL, usable directly as an image source.
    Image { src: String },
    Text { snippet: String },
}

/// The paste overlay covering one file input.
#[derive(Debug)]
pub struct Overlay {
    pub target: InputId,
    pub paste_enabled: bool,
    pub preview: Option<Preview>,
    /// `pasted-file.<ext> (<size>)` line under the preview.
    pub file_hint: Option<String>,
    pub notice: Option<String>,
    payload: Option<ClipboardPayload>,
}

impl Overlay {
    fn new(target: InputId) -> Self {
        Self {
            target,
            paste_enabled: false,
            preview: None,
            file_hint: None,
            notice: None,
            payload: None,
        }
    }
}

/// Interceptor errors surfaced to the host.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("no overlay is open")]
    NoOverlay,
    #[error("no payload has been delivered")]
    NoPayload,
    #[error("payload decode failed: {0}")]
    Payload(#[from] PayloadError),
}

pub struct Interceptor<P: PickerInvoker> {
    frame: FrameId,
    inputs: HashMap<InputId, FileInput>,
    overlay: Option<Overlay>,
    last_overlay_at: Option<Instant>,
    /// Set while the host's native picker is being handed the next
    /// activation.
    browse_in_progress: bool,
    requests: mpsc::UnboundedSender<OpenRequest>,
    picker: P,
}

impl<P: PickerInvoker> Interceptor<P> {
    pub fn new(frame: FrameId, requests: mpsc::UnboundedSender<OpenRequest>, picker: P) -> Self {
        Self {
            frame,
            inputs: HashMap::new(),
            overlay: None,
            last_overlay_at: None,
            browse_in_progress: false,
            requests,
            picker,
        }
    }

    pub fn frame(&self) -> &FrameId {
        &self.frame
    }

    /// Start observing a file input.
    pub fn observe_input(&mut self, multiple: bool) -> InputId {
        let input = FileInput::new(multiple);
        let id = input.id();
        self.inputs.insert(id, input);
        id
    }

    /// Stop observing an input; closes the overlay if it covered it.
    pub fn remove_input(&mut self, id: InputId) {
        self.inputs.remove(&id);
        if self.overlay.as_ref().is_some_and(|o| o.target == id) {
            self.overlay = None;
        }
    }

    pub fn input(&self, id: InputId) -> Option<&FileInput> {
        self.inputs.get(&id)
    }

    pub fn input_mut(&mut self, id: InputId) -> Option<&mut FileInput> {
        self.inputs.get_mut(&id)
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    /// Handle a user activation of a file input.
    ///
    /// Exactly one overlay results from a burst of activations; an
    /// activation right after "browse files" goes to the native
    /// picker untouched.
    pub fn handle_activation(&mut self, id: InputId, now: Instant) -> Activation {
        if !self.inputs.contains_key(&id) {
            return Activation::Ignored;
        }
        if self.browse_in_progress {
            self.browse_in_progress = false;
            return Activation::Native;
        }
        if self.overlay.is_some() {
            return Activation::Debounced;
        }
        if let Some(last) = self.last_overlay_at
            && now.duration_since(last) < ACTIVATION_DEBOUNCE
        {
            return Activation::Debounced;
        }

        self.overlay = Some(Overlay::new(id));
        self.last_overlay_at = Some(now);
        if self
            .requests
            .send(OpenRequest {
                frame: self.frame.clone(),
            })
            .is_err()
        {
            tracing::warn!(frame = %self.frame, "router gone, overlay opened without session");
        }
        Activation::OverlayShown
    }

    /// Handle a delivery broadcast from the router.
    ///
    /// Messages for other frames are ignored, as are payloads landing
    /// after the overlay was dismissed.
    pub fn handle_page_message(&mut self, msg: &PageMessage) {
        if msg.frame() != &self.frame {
            return;
        }
        let Some(overlay) = self.overlay.as_mut() else {
            // Late delivery — the user already cancelled.
            return;
        };
        match msg {
            PageMessage::Payload { payload, .. } => {
                overlay.preview = Some(build_preview(payload));
                overlay.file_hint = Some(format!(
                    "pasted-file.{} ({})",
                    extension_for(&payload.mime_type),
                    format_size(payload.approx_size())
                ));
                overlay.payload = Some(payload.clone());
                overlay.paste_enabled = true;
            }
            PageMessage::Failure { reason, .. } => {
                // A helper the user closed is not an error condition.
                if reason != "helper_closed" {
                    overlay.notice = Some(NO_DATA_NOTICE.to_string());
                }
            }
        }
    }

    /// Confirm the paste: assign the delivered payload to the target
    /// input as a single synthetic file and close the overlay.
    pub fn paste(&mut self) -> Result<InputId, InterceptError> {
        let overlay = self.overlay.as_ref().ok_or(InterceptError::NoOverlay)?;
        let payload = overlay.payload.clone().ok_or(InterceptError::NoPayload)?;
        let target = overlay.target;

        let bytes = payload.decode()?;
        let file = SyntheticFile {
            name: pasted_file_name(&payload.mime_type),
            mime_type: payload.mime_type.clone(),
            bytes,
        };
        if let Some(input) = self.inputs.get_mut(&target) {
            input.assign(vec![file]);
        }
        self.overlay = None;
        Ok(target)
    }

    /// Hand the next activation to the host's native picker.
    pub fn browse(&mut self) -> Result<(), InterceptError> {
        let overlay = self.overlay.take().ok_or(InterceptError::NoOverlay)?;
        self.browse_in_progress = true;
        self.picker.open_native_picker(overlay.target);
        Ok(())
    }

    /// Files dropped onto the overlay. A single-select input takes
    /// the first file only; the returned warning names the one kept.
    pub fn drop_files(
        &mut self,
        mut files: Vec<SyntheticFile>,
    ) -> Result<Option<String>, InterceptError> {
        let overlay = self.overlay.as_ref().ok_or(InterceptError::NoOverlay)?;
        if files.is_empty() {
            return Ok(None);
        }
        let target = overlay.target;

        let mut warning = None;
        let multiple = self
            .inputs
            .get(&target)
            .is_some_and(|input| input.multiple());
        if !multiple && files.len() > 1 {
            files.truncate(1);
            warning = Some(format!(
                "Only one file can be uploaded. Using: {}",
                files[0].name
            ));
        }
        if let Some(input) = self.inputs.get_mut(&target) {
            input.assign(files);
        }
        self.overlay = None;
        Ok(warning)
    }

    /// Dismiss the overlay (Escape, backdrop click). Anything the
    /// relay delivers afterwards is dropped on the floor.
    pub fn cancel(&mut self) {
        self.overlay = None;
    }
}

fn build_preview(payload: &ClipboardPayload) -> Preview {
    if payload.is_image() {
        Preview::Image {
            src: payload.data.clone(),
        }
    } else {
        let bytes = payload.decode().unwrap_or_default();
        Preview::Text {
            snippet: text_snippet(&bytes, TEXT_PREVIEW_LIMIT),
        }
    }
}
