//! Process-wide copy of the last frame sent to the matrix.
//!
//! UI observers poll this instead of talking to the hardware. Writers
//! replace the whole frame at once, so readers always see a complete one.

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// One rendered frame. A 0×0 frame means "matrix off".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PreviewFrame {
    /// Copy `pixels` into a new frame, truncating or zero-padding so that
    /// `pixels.len() == width * height` always holds.
    pub fn from_slice(width: u32, height: u32, pixels: &[u8]) -> Self {
        let len = width as usize * height as usize;
        let mut owned = pixels[..pixels.len().min(len)].to_vec();
        owned.resize(len, 0);
        Self {
            width,
            height,
            pixels: owned,
        }
    }

    /// The "matrix off" frame.
    pub fn off() -> Self {
        Self::default()
    }

    pub fn is_off(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Shared handle to the latest [`PreviewFrame`].
///
/// # Rust concept: Arc<Mutex<Arc<T>>>
/// The outer `Arc<Mutex<..>>` is the shared slot; the inner `Arc` lets a
/// reader take the frame out and drop the lock immediately, without copying
/// the pixels.
#[derive(Clone, Default)]
pub struct PreviewStore {
    latest: Arc<Mutex<Option<Arc<PreviewFrame>>>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a defensive copy of `pixels`.
    pub fn update(&self, width: u32, height: u32, pixels: &[u8]) {
        let frame = Arc::new(PreviewFrame::from_slice(width, height, pixels));
        *self.lock() = Some(frame);
    }

    /// Latest frame, or `None` if nothing was ever rendered.
    pub fn get(&self) -> Option<Arc<PreviewFrame>> {
        self.lock().clone()
    }

    /// Show the matrix as off.
    pub fn clear(&self) {
        *self.lock() = Some(Arc::new(PreviewFrame::off()));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<PreviewFrame>>> {
        // The slot only ever holds a whole frame, even when poisoned.
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}
