//! The one live connection to the matrix hardware.
//!
//! `HardwareSession` is a small state machine:
//!
//! ```text
//! Uninitialized ──ensure_ready──▶ Connecting ──Connected──▶ Ready(profile)
//!       ▲                             │                         │
//!       │                        connect failed            Disconnected
//!       │                             ▼                         ▼
//!       └─────────── (next ensure_ready reconnects) ◀── Disconnected
//! ```
//!
//! Callers that need the hardware hand over a job (`J`). If the session is
//! ready the job comes straight back to be run now; otherwise it is queued
//! and returned, in order, from [`HardwareSession::on_connection`] once the
//! backend reports success. Every hardware call is wrapped: failures are
//! logged and turned into user notices, never returned to the caller.

use crate::device::{self, DeviceProfile, HardwareIds};
use crate::error::HardwareError;
use crate::hardware::{ConnectionEvent, ConnectionSink, MatrixHardware};
use crate::preview::PreviewStore;
use crate::shapes;
use serde::Serialize;
use std::collections::VecDeque;

/// Lifecycle of the hardware connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Ready(DeviceProfile),
    Disconnected,
}

/// Serializable summary of [`SessionState`] for status reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Connecting,
    Ready,
    Disconnected,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::Uninitialized => SessionPhase::Uninitialized,
            Self::Connecting => SessionPhase::Connecting,
            Self::Ready(_) => SessionPhase::Ready,
            Self::Disconnected => SessionPhase::Disconnected,
        }
    }
}

pub struct HardwareSession<H, J> {
    hardware: H,
    sink: ConnectionSink,
    ids: HardwareIds,
    grid_override: Option<(u32, u32)>,
    state: SessionState,
    pending: VecDeque<J>,
    width: u32,
    height: u32,
    preview: PreviewStore,
    notices: Vec<String>,
    frames_pushed: u64,
}

impl<H: MatrixHardware, J> HardwareSession<H, J> {
    pub fn new(
        hardware: H,
        sink: ConnectionSink,
        ids: HardwareIds,
        grid_override: Option<(u32, u32)>,
        preview: PreviewStore,
    ) -> Self {
        // Dimensions are known before the first connect so callers can size
        // grids early; the resolved profile confirms them on connect.
        let profile = device::resolve_with_grid(&ids, grid_override);
        Self {
            hardware,
            sink,
            ids,
            grid_override,
            state: SessionState::Uninitialized,
            pending: VecDeque::new(),
            width: profile.grid_width,
            height: profile.grid_height,
            preview,
            notices: Vec::new(),
            frames_pushed: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready(_))
    }

    pub fn profile(&self) -> Option<&DeviceProfile> {
        match &self.state {
            SessionState::Ready(p) => Some(p),
            _ => None,
        }
    }

    /// Current grid `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// User-facing notices produced since the last call.
    pub fn drain_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Run `job` now if the hardware is ready (returned as `Some`), else
    /// queue it behind any earlier jobs and start connecting if needed.
    pub fn ensure_ready(&mut self, job: J) -> Option<J> {
        match self.state {
            SessionState::Ready(_) => Some(job),
            SessionState::Connecting => {
                self.pending.push_back(job);
                tracing::debug!("Matrix still connecting, {} job(s) waiting", self.pending.len());
                None
            }
            SessionState::Uninitialized | SessionState::Disconnected => {
                self.pending.push_back(job);
                self.begin_connect();
                None
            }
        }
    }

    /// Forget queued jobs without touching the connection attempt.
    pub fn discard_pending(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    fn begin_connect(&mut self) {
        tracing::info!("Connecting to matrix hardware...");
        self.state = SessionState::Connecting;
        if let Err(e) = self.hardware.connect(self.sink.clone()) {
            let dropped = self.pending.len();
            self.pending.clear();
            self.state = SessionState::Disconnected;
            self.report("connect", &e);
            tracing::warn!("Dropped {} pending job(s) after failed connect", dropped);
        }
    }

    /// Apply an asynchronous connection event. On `Connected`, returns the
    /// queued jobs in submission order for the caller to run.
    pub fn on_connection(&mut self, event: ConnectionEvent) -> Vec<J> {
        match event {
            ConnectionEvent::Connected => {
                let profile = device::resolve_with_grid(&self.ids, self.grid_override);
                if let Err(e) = self.hardware.register(&profile.device_code) {
                    self.report("register", &e);
                }
                tracing::info!(
                    "Matrix ready: device {} ({}x{})",
                    profile.device_code,
                    profile.grid_width,
                    profile.grid_height
                );
                self.width = profile.grid_width;
                self.height = profile.grid_height;
                self.state = SessionState::Ready(profile);
                self.pending.drain(..).collect()
            }
            ConnectionEvent::Disconnected => {
                if !self.pending.is_empty() {
                    tracing::debug!("Discarding {} job(s) queued before disconnect", self.pending.len());
                    self.pending.clear();
                }
                tracing::info!("Matrix hardware disconnected");
                self.state = SessionState::Disconnected;
                Vec::new()
            }
        }
    }

    /// Push one frame and mirror it to the preview. No-op unless ready.
    pub fn push_frame(&mut self, pixels: &[u8]) -> bool {
        if !self.is_ready() {
            tracing::debug!("Frame dropped: matrix not ready");
            return false;
        }
        let (w, h) = (self.width, self.height);
        let result = self.hardware.push_frame(pixels, w, h);
        self.preview.update(w, h, pixels);
        match result {
            Ok(()) => {
                self.frames_pushed += 1;
                true
            }
            Err(e) => {
                self.report("push frame", &e);
                false
            }
        }
    }

    /// Turn every cell off without releasing the matrix.
    pub fn clear(&mut self) {
        let zeros = shapes::clear(self.width, self.height);
        self.push_frame(&zeros);
    }

    /// Turn every cell off, release the matrix and show the preview as
    /// off. The connection itself stays up so the next job starts fast.
    pub fn close(&mut self) {
        if self.is_ready() {
            self.clear();
            if let Err(e) = self.hardware.release() {
                self.report("release", &e);
            }
        }
        self.preview.clear();
    }

    /// Close and drop the connection (process shutdown).
    pub fn shutdown(&mut self) {
        self.close();
        self.hardware.disconnect();
        self.pending.clear();
        self.state = SessionState::Disconnected;
    }

    fn report(&mut self, what: &str, err: &HardwareError) {
        tracing::warn!("Matrix {} failed: {}", what, err);
        self.notices.push(format!("Matrix error: {err}"));
    }
}
