//! Synthetic file-input model.
//!
//! Stands in for the host application's file input controls. The
//! interceptor assigns pasted or dropped files here and records the
//! notification events the host would observe, in order.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one observed file input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputId(u64);

impl InputId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A file constructed from relay bytes rather than a real filesystem
/// path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Notifications the host observes after an assignment, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Change,
    Input,
}

/// One file input under interception.
#[derive(Debug)]
pub struct FileInput {
    id: InputId,
    multiple: bool,
    files: Vec<SyntheticFile>,
    events: Vec<InputEvent>,
}

impl FileInput {
    pub fn new(multiple: bool) -> Self {
        Self {
            id: InputId::new(),
            multiple,
            files: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> InputId {
        self.id
    }

    pub fn multiple(&self) -> bool {
        self.multiple
    }

    /// Replace the input's file list and record the change/input
    /// notification pair.
    pub fn assign(&mut self, files: Vec<SyntheticFile>) {
        self.files = files;
        self.events.push(InputEvent::Change);
        self.events.push(InputEvent::Input);
    }

    pub fn files(&self) -> &[SyntheticFile] {
        &self.files
    }

    /// Drain pending notification events.
    pub fn take_events(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Hands an activation back to the host's own file picker.
///
/// Injected so the interceptor can be tested without any UI, and so
/// embedders can decide what "the native picker" means for them.
pub trait PickerInvoker {
    fn open_native_picker(&mut self, input: InputId);
}

/// Picker that does nothing. Useful where the host wires its own
/// passthrough handling.
#[derive(Debug, Default)]
pub struct NoopPicker;

impl PickerInvoker for NoopPicker {
    fn open_native_picker(&mut self, _input: InputId) {}
}
