//! The matrix hardware as an opaque capability.
//!
//! Real backends (vendor services, the RGB panel in [`crate::panel`]) and
//! the simulated backend below all look the same to the rest of the crate:
//! start connecting, register a device, push a frame, release, disconnect.
//!
//! Connecting is asynchronous. A backend reports the outcome through the
//! [`ConnectionSink`] it was handed; the render loop routes those events
//! back onto its own queue, so session state only ever changes there.

use crate::error::HardwareError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Asynchronous connection outcome reported by a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// Callback a backend uses to report [`ConnectionEvent`]s.
///
/// # Rust concept: trait objects behind Arc
/// `Arc<dyn Fn + Send + Sync>` is a shareable, clonable callback that may be
/// invoked from any thread (e.g. a backend's own worker thread).
pub type ConnectionSink = Arc<dyn Fn(ConnectionEvent) + Send + Sync>;

/// What every matrix backend provides.
pub trait MatrixHardware {
    /// Begin connecting. Success is reported later via `sink`; an `Err`
    /// here means the attempt could not even be started.
    fn connect(&mut self, sink: ConnectionSink) -> Result<(), HardwareError>;

    /// Tell the service which device we are driving.
    fn register(&mut self, device_code: &str) -> Result<(), HardwareError>;

    /// Show one row-major brightness frame of `width`×`height` cells.
    fn push_frame(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<(), HardwareError>;

    /// Release the matrix for other apps. The connection stays usable.
    fn release(&mut self) -> Result<(), HardwareError>;

    /// Drop the connection entirely.
    fn disconnect(&mut self);
}

// ── Simulated backend ────────────────────────────────────────────────

/// Stand-in hardware for machines without a matrix.
///
/// Connects after a configurable latency on a helper thread (mimicking a
/// slow service binding) and logs frames instead of lighting LEDs.
pub struct SimulatedMatrix {
    latency: Duration,
    connected: bool,
    frames: u64,
}

impl SimulatedMatrix {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            connected: false,
            frames: 0,
        }
    }
}

impl MatrixHardware for SimulatedMatrix {
    fn connect(&mut self, sink: ConnectionSink) -> Result<(), HardwareError> {
        let latency = self.latency;
        thread::Builder::new()
            .name("matrix-connect".into())
            .spawn(move || {
                thread::sleep(latency);
                sink(ConnectionEvent::Connected);
            })
            .map_err(|e| HardwareError::Unavailable(e.to_string()))?;
        self.connected = true;
        Ok(())
    }

    fn register(&mut self, device_code: &str) -> Result<(), HardwareError> {
        tracing::info!("Simulated matrix registered as device {}", device_code);
        Ok(())
    }

    fn push_frame(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<(), HardwareError> {
        if !self.connected {
            return Err(HardwareError::NotConnected);
        }
        if pixels.len() != width as usize * height as usize {
            return Err(HardwareError::Rejected(format!(
                "frame has {} cells, expected {}x{}",
                pixels.len(),
                width,
                height
            )));
        }
        self.frames += 1;
        let lit = pixels.iter().filter(|&&v| v > 0).count();
        tracing::trace!("Simulated frame #{} ({}x{}, {} lit)", self.frames, width, height, lit);
        Ok(())
    }

    fn release(&mut self) -> Result<(), HardwareError> {
        tracing::debug!("Simulated matrix released");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}
