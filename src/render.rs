//! Render thread: owns the matrix session and processes commands via a channel.
//!
//! Every hardware push, marquee tick and delayed shutoff runs on this one
//! thread, in order. The async HTTP server and the backend's connect thread
//! talk to it by sending [`Command`] values through an `mpsc` channel.
//!
//! [`MatrixController`] holds all the logic and never sleeps; time is passed
//! in explicitly, so tests drive it with a virtual clock. [`render_loop`]
//! is the thin wall-clock wrapper used by the binary.
//!
//! ## Rust concepts
//! - `std::sync::mpsc` channels with `recv_timeout()` as the timer wait
//! - `enum` with data variants for commands, jobs and timer events
//! - `Arc<Mutex<T>>` for status shared with the HTTP server
//! - Generic struct over a trait (`MatrixController<H: MatrixHardware>`)

use crate::device::{DeviceProfile, HardwareIds};
use crate::hardware::{ConnectionEvent, ConnectionSink, MatrixHardware};
use crate::marquee::{After, MarqueeAnimator, TextSource, TickOutcome};
use crate::nowplaying::{NotificationEvent, NotificationObserver, NowPlayingStore};
use crate::preview::PreviewStore;
use crate::sanitize::sanitize;
use crate::scheduler::Scheduler;
use crate::session::{HardwareSession, SessionPhase};
use crate::settings::{DisplayMode, SettingsStore};
use crate::shutoff::{AutoShutoff, IMAGE_HOLD, IMMEDIATE_THRESHOLD, ShutoffPlan};
use crate::{Grid, grid, shapes, text};
use image::DynamicImage;
use serde::Serialize;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Minimum gap between two heartbeat writes to the settings file.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Marquee text for START when nothing is playing.
pub const IDLE_TEXT: &str = "No music playing";
/// Edge length of the generated sample image before it is resampled.
const SAMPLE_SIZE: u32 = 64;
/// Longest the loop waits for a command when no timer is pending.
const IDLE_WAIT: Duration = Duration::from_secs(1);

// ── Commands ─────────────────────────────────────────────────────────

/// Commands sent to the render thread.
///
/// Rust concept: ENUMS WITH DATA
/// Each variant carries exactly what its handler needs; the compiler makes
/// sure every variant is handled in [`MatrixController::handle`].
#[derive(Debug)]
pub enum Command {
    /// Enable auto-display and scroll the now-playing text.
    Start,
    /// Stop everything, darken and release the matrix, disable auto-display.
    Stop,
    ShowLine,
    ShowRect,
    ShowCircle,
    /// Album art if there is any, else the now-playing marquee.
    ShowDisc,
    ShowSampleImage,
    /// Raw grid as a JSON array or comma-separated list.
    ShowPixelData(String),
    /// Scroll a fixed text.
    ShowText(String),
    /// Show an already decoded image for the usual hold time.
    ShowImage(Arc<DynamicImage>),
    /// A posted notification (now-playing source).
    Notification(NotificationEvent),
    /// Routed from the backend's connection sink.
    Connection(ConnectionEvent),
    /// Close the matrix, disconnect and exit the loop.
    Shutdown,
}

/// Work that needs a ready session. Sizes are taken from the session when
/// the job runs, so jobs queued before connect use the resolved grid.
#[derive(Clone, Debug)]
pub enum RenderJob {
    Shape(ShapeKind),
    Image(Arc<DynamicImage>),
    Frame(Grid),
    Marquee { source: TextSource, text: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Line,
    Rect,
    Circle,
}

impl ShapeKind {
    /// Rasterise onto a `width`×`height` grid at full brightness.
    pub fn draw(self, width: u32, height: u32) -> Grid {
        let (w, h) = (width as i32, height as i32);
        match self {
            Self::Line => shapes::line(width, height, 0, 0, w - 1, h - 1, 255),
            Self::Rect => shapes::rect(width, height, 2, 2, w - 3, h - 3, 255),
            Self::Circle => {
                let radius = (w.min(h) as f64 / 2.2) as i32;
                shapes::circle(width, height, w / 2, h / 2, radius, 255)
            }
        }
    }
}

/// Things that fire on the timer queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    MarqueeTick,
    ShutoffClear,
    ShutoffClose,
}

// ── Status ───────────────────────────────────────────────────────────

/// What the matrix is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Idle,
    ShowingShape,
    ShowingImage,
    ShowingPixels,
    Scrolling,
}

/// Shared status that the HTTP server reads.
///
/// Rust concept: Arc<Mutex<T>>
/// The render thread is the only writer; handlers take the lock briefly to
/// clone a copy out.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct DisplayStatus {
    pub state: DisplayState,
    /// Hardware connection phase
    pub session: SessionPhase,
    /// Resolved device once connected
    pub profile: Option<DeviceProfile>,
    /// Text currently scrolling, if any
    pub current_text: Option<String>,
    pub frames_pushed: u64,
    /// Jobs waiting for the connection
    pub pending_jobs: usize,
    /// A timed clear or release is pending
    pub shutoff_armed: bool,
    /// Most recent user-facing error notice
    pub last_notice: Option<String>,
    /// Server version
    pub version: String,
}

impl DisplayStatus {
    pub fn new() -> Self {
        Self {
            state: DisplayState::Idle,
            session: SessionPhase::Uninitialized,
            profile: None,
            current_text: None,
            frames_pushed: 0,
            pending_jobs: 0,
            shutoff_armed: false,
            last_notice: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn set_idle(&mut self) {
        self.state = DisplayState::Idle;
        self.current_text = None;
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handles shared between the render thread and the HTTP server.
#[derive(Clone)]
pub struct SharedState {
    pub status: Arc<Mutex<DisplayStatus>>,
    pub preview: PreviewStore,
    pub now_playing: NowPlayingStore,
    pub settings: SettingsStore,
}

impl SharedState {
    pub fn new(settings: SettingsStore) -> Self {
        Self {
            status: Arc::new(Mutex::new(DisplayStatus::new())),
            preview: PreviewStore::new(),
            now_playing: NowPlayingStore::new(),
            settings,
        }
    }

    pub fn status(&self) -> MutexGuard<'_, DisplayStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Controller ───────────────────────────────────────────────────────

pub struct MatrixController<H: MatrixHardware> {
    session: HardwareSession<H, RenderJob>,
    timers: Scheduler<TimerEvent>,
    marquee: MarqueeAnimator,
    shutoff: AutoShutoff,
    last_heartbeat: Option<Duration>,
    observer: NotificationObserver,
    shared: SharedState,
}

impl<H: MatrixHardware> MatrixController<H> {
    pub fn new(
        hardware: H,
        sink: ConnectionSink,
        ids: HardwareIds,
        grid_override: Option<(u32, u32)>,
        shared: SharedState,
    ) -> Self {
        let session = HardwareSession::new(hardware, sink, ids, grid_override, shared.preview.clone());
        Self {
            session,
            timers: Scheduler::new(),
            marquee: MarqueeAnimator::new(),
            shutoff: AutoShutoff::new(),
            last_heartbeat: None,
            observer: NotificationObserver::new(),
            shared,
        }
    }

    pub fn session(&self) -> &HardwareSession<H, RenderJob> {
        &self.session
    }

    pub fn timers(&self) -> &Scheduler<TimerEvent> {
        &self.timers
    }

    pub fn marquee(&self) -> &MarqueeAnimator {
        &self.marquee
    }

    /// Deadline of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Process one command at time `now`. Returns `false` once the loop
    /// should exit.
    pub fn handle(&mut self, cmd: Command, now: Duration) -> bool {
        self.run_due(now);

        if !matches!(cmd, Command::Connection(_) | Command::Shutdown) {
            self.heartbeat(now);
        }

        let keep_running = match cmd {
            Command::Start => {
                self.set_running(true);
                let text = self.shared.now_playing.text().filter(|t| !t.trim().is_empty());
                let source = match text {
                    Some(_) => TextSource::NowPlaying,
                    None => TextSource::Fixed(IDLE_TEXT.to_string()),
                };
                let text = sanitize(text.as_deref().unwrap_or(IDLE_TEXT));
                self.submit(RenderJob::Marquee { source, text });
                true
            }
            Command::Stop => {
                self.stop_rendering();
                let dropped = self.session.discard_pending();
                if dropped > 0 {
                    tracing::debug!("Stop dropped {} queued job(s)", dropped);
                }
                self.session.close();
                self.set_running(false);
                self.shared.status().set_idle();
                tracing::info!("Matrix stopped");
                true
            }
            Command::ShowLine => self.submit(RenderJob::Shape(ShapeKind::Line)),
            Command::ShowRect => self.submit(RenderJob::Shape(ShapeKind::Rect)),
            Command::ShowCircle => self.submit(RenderJob::Shape(ShapeKind::Circle)),
            Command::ShowSampleImage => {
                let sample = DynamicImage::ImageRgb8(grid::sample_image(SAMPLE_SIZE));
                self.submit(RenderJob::Image(Arc::new(sample)))
            }
            Command::ShowImage(image) => self.submit(RenderJob::Image(image)),
            Command::ShowDisc => {
                if let Some(art) = self.shared.now_playing.art() {
                    self.submit(RenderJob::Image(art))
                } else {
                    tracing::debug!("No album art, falling back to text");
                    self.submit_now_playing_marquee()
                }
            }
            Command::ShowPixelData(payload) => {
                let (w, h) = self.session.dimensions();
                match crate::payload::parse_pixels(&payload, w, h) {
                    Ok(grid) => self.submit(RenderJob::Frame(grid)),
                    Err(e) => {
                        tracing::warn!("Ignoring pixel data: {}", e);
                        true
                    }
                }
            }
            Command::ShowText(raw) => {
                let text = sanitize(&raw);
                if text.trim().is_empty() {
                    tracing::debug!("Ignoring blank text");
                    true
                } else {
                    self.submit(RenderJob::Marquee {
                        source: TextSource::Fixed(text.clone()),
                        text,
                    })
                }
            }
            Command::Notification(event) => {
                let settings = self.shared.settings.get();
                let mode = self.observer.observe(event, &self.shared.now_playing, &settings, now);
                match mode {
                    Some(DisplayMode::Art) => match self.shared.now_playing.art() {
                        Some(art) => self.submit(RenderJob::Image(art)),
                        None => {
                            tracing::debug!("Art mode but notification has no art");
                            true
                        }
                    },
                    Some(DisplayMode::Title) => self.submit_now_playing_marquee(),
                    None => true,
                }
            }
            Command::Connection(event) => {
                let ready = self.session.on_connection(event);
                if event == ConnectionEvent::Disconnected {
                    self.stop_rendering();
                    self.shared.status().set_idle();
                }
                for job in ready {
                    self.run_job(job);
                }
                true
            }
            Command::Shutdown => {
                tracing::info!("Render thread shutting down");
                self.stop_rendering();
                self.session.shutdown();
                self.shared.status().set_idle();
                false
            }
        };

        self.sync_status();
        keep_running
    }

    /// Fire every timer due at or before `now`, in order.
    pub fn run_due(&mut self, now: Duration) {
        while let Some(event) = self.timers.pop_due(now) {
            self.on_timer(event);
        }
        self.timers.advance_to(now);
        self.sync_status();
    }

    fn submit_now_playing_marquee(&mut self) -> bool {
        match self.shared.now_playing.text().filter(|t| !t.trim().is_empty()) {
            Some(text) => self.submit(RenderJob::Marquee {
                source: TextSource::NowPlaying,
                text: sanitize(&text),
            }),
            None => {
                tracing::debug!("Nothing playing, nothing to show");
                true
            }
        }
    }

    /// Cancel whatever is on screen, then run `job` now or once connected.
    fn submit(&mut self, job: RenderJob) -> bool {
        self.stop_rendering();
        if let Some(job) = self.session.ensure_ready(job) {
            self.run_job(job);
        }
        true
    }

    /// Drop the running marquee and every pending timer tied to rendering.
    fn stop_rendering(&mut self) {
        self.marquee.stop();
        self.timers.cancel_where(|e| *e == TimerEvent::MarqueeTick);
        self.shutoff.cancel(&mut self.timers);
    }

    fn run_job(&mut self, job: RenderJob) {
        self.stop_rendering();
        let (w, h) = self.session.dimensions();
        match job {
            RenderJob::Shape(kind) => {
                tracing::info!("Showing {:?}", kind);
                self.show_static(&kind.draw(w, h), DisplayState::ShowingShape);
            }
            RenderJob::Image(image) => {
                let settings = self.shared.settings.get();
                let pixels = grid::convert(&image, w, h, settings.brightness, settings.contrast);
                tracing::info!("Showing image ({}x{} source)", image.width(), image.height());
                self.show_static(&pixels, DisplayState::ShowingImage);
            }
            RenderJob::Frame(mut pixels) => {
                pixels.resize(w as usize * h as usize, 0);
                self.show_static(&pixels, DisplayState::ShowingPixels);
            }
            RenderJob::Marquee { source, text } => {
                tracing::info!("Scrolling \"{}\"", text);
                self.marquee.start(source, &text, w);
                {
                    let mut status = self.shared.status();
                    status.state = DisplayState::Scrolling;
                    status.current_text = Some(text);
                }
                self.on_marquee_tick();
            }
        }
    }

    /// Push a still frame and arm the image hold.
    fn show_static(&mut self, pixels: &[u8], state: DisplayState) {
        self.session.push_frame(pixels);
        {
            let mut status = self.shared.status();
            status.state = state;
            status.current_text = None;
        }
        self.arm_shutoff(IMAGE_HOLD);
    }

    fn arm_shutoff(&mut self, after: Duration) {
        let plan = self
            .shutoff
            .schedule(&mut self.timers, after, TimerEvent::ShutoffClear, TimerEvent::ShutoffClose);
        if plan == ShutoffPlan::ClearNow {
            self.clear_matrix();
        }
    }

    fn clear_matrix(&mut self) {
        self.session.clear();
        self.shared.preview.clear();
    }

    fn on_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::MarqueeTick => self.on_marquee_tick(),
            TimerEvent::ShutoffClear => {
                tracing::debug!("Auto-shutoff: clear");
                self.clear_matrix();
            }
            TimerEvent::ShutoffClose => {
                tracing::info!("Auto-shutoff: releasing matrix");
                self.session.close();
                self.shared.status().set_idle();
            }
        }
    }

    fn on_marquee_tick(&mut self) {
        let live = match self.marquee.source() {
            Some(TextSource::NowPlaying) => self.shared.now_playing.text().map(|t| sanitize(&t)),
            Some(TextSource::Fixed(t)) => Some(t.clone()),
            None => None,
        };

        match self.marquee.tick(live.as_deref()) {
            TickOutcome::Render { text, x, after } => {
                let (w, h) = self.session.dimensions();
                let frame = text::render_line(&text, x, w, h, 255);
                self.session.push_frame(&frame);
                self.shared.status().current_text = Some(text);
                match after {
                    After::Continue(delay) => {
                        self.timers.schedule(delay, TimerEvent::MarqueeTick);
                    }
                    After::Finished => {
                        tracing::info!("Marquee finished");
                        self.finish_marquee();
                    }
                }
            }
            TickOutcome::Idle => {
                tracing::debug!("Marquee text source is gone");
                self.finish_marquee();
            }
        }
    }

    /// Clears the matrix and the preview right away; the release follows
    /// on the shutoff timer.
    fn finish_marquee(&mut self) {
        self.arm_shutoff(IMMEDIATE_THRESHOLD);
        self.shared.status().set_idle();
    }

    /// Stamp the liveness heartbeat, at most once per [`HEARTBEAT_INTERVAL`].
    fn heartbeat(&mut self, now: Duration) {
        if self
            .last_heartbeat
            .is_some_and(|last| now.saturating_sub(last) < HEARTBEAT_INTERVAL)
        {
            return;
        }
        self.last_heartbeat = Some(now);
        if let Err(e) = self.shared.settings.touch_heartbeat() {
            tracing::warn!("Failed to store heartbeat: {}", e);
        }
    }

    fn set_running(&self, running: bool) {
        if let Err(e) = self.shared.settings.set_running(running) {
            tracing::warn!("Failed to store running flag: {}", e);
        }
    }

    fn sync_status(&mut self) {
        let notices = self.session.drain_notices();
        let mut status = self.shared.status();
        status.session = self.session.state().phase();
        status.profile = self.session.profile().cloned();
        status.frames_pushed = self.session.frames_pushed();
        status.pending_jobs = self.session.pending_jobs();
        status.shutoff_armed = self.shutoff.is_armed(&self.timers);
        if let Some(last) = notices.into_iter().last() {
            status.last_notice = Some(last);
        }
    }
}

// ── Render loop ──────────────────────────────────────────────────────

/// Main render loop: runs on a dedicated thread and owns the controller.
///
/// Blocks on the channel until either a command arrives or the next timer
/// is due, then feeds the elapsed time into the controller. Returns when a
/// `Shutdown` command is processed or every sender is dropped.
pub fn render_loop<H: MatrixHardware>(rx: Receiver<Command>, mut controller: MatrixController<H>) {
    let started = Instant::now();
    tracing::info!("Render thread started, waiting for commands...");

    loop {
        let elapsed = started.elapsed();
        let wait = controller
            .next_deadline()
            .map(|d| d.saturating_sub(elapsed))
            .unwrap_or(IDLE_WAIT);

        match rx.recv_timeout(wait) {
            Ok(cmd) => {
                if !controller.handle(cmd, started.elapsed()) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => controller.run_due(started.elapsed()),
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Render thread: channel closed, shutting down.");
                controller.handle(Command::Shutdown, started.elapsed());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{Call, FakeMatrix};
    use crate::settings::Settings;
    use image::RgbImage;
    use pretty_assertions::assert_eq;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn setup(grid: Option<(u32, u32)>, settings: Settings) -> (MatrixController<FakeMatrix>, FakeMatrix, SharedState) {
        let hw = FakeMatrix::default();
        let shared = SharedState::new(SettingsStore::in_memory(settings));
        let c = MatrixController::new(hw.clone(), Arc::new(|_| {}), HardwareIds::default(), grid, shared.clone());
        (c, hw, shared)
    }

    fn connected(grid: Option<(u32, u32)>) -> (MatrixController<FakeMatrix>, FakeMatrix, SharedState) {
        let (mut c, hw, shared) = setup(grid, Settings::default());
        c.handle(Command::Connection(ConnectionEvent::Connected), ms(0));
        (c, hw, shared)
    }

    fn releases(hw: &FakeMatrix) -> usize {
        hw.calls().iter().filter(|c| **c == Call::Release).count()
    }

    #[test]
    fn pixel_data_reaches_preview_on_2x2() {
        let (mut c, hw, shared) = setup(Some((2, 2)), Settings::default());
        c.handle(Command::ShowPixelData("[255,0,255,0]".into()), ms(0));
        assert_eq!(shared.status().session, SessionPhase::Connecting);
        assert_eq!(shared.status().pending_jobs, 1);

        c.handle(Command::Connection(ConnectionEvent::Connected), ms(20));
        assert_eq!(hw.pushes(), vec![vec![255, 0, 255, 0]]);
        let frame = shared.preview.get().unwrap();
        assert_eq!((frame.width, frame.height), (2, 2));
        assert_eq!(frame.pixels, vec![255, 0, 255, 0]);
        assert_eq!(shared.status().state, DisplayState::ShowingPixels);
    }

    #[test]
    fn malformed_pixel_data_is_a_noop() {
        let (mut c, hw, _) = setup(Some((2, 2)), Settings::default());
        c.handle(Command::ShowPixelData("1;2;3".into()), ms(0));
        assert!(hw.calls().is_empty());
        assert_eq!(c.session().pending_jobs(), 0);
    }

    #[test]
    fn static_frame_shuts_off_after_hold() {
        let (mut c, hw, shared) = connected(Some((5, 5)));
        c.handle(Command::ShowLine, ms(0));
        c.run_due(ms(9_999));
        assert_eq!(hw.pushes().len(), 1);
        assert_eq!(releases(&hw), 0);

        c.run_due(ms(10_000));
        assert_eq!(hw.pushes().len(), 2);
        assert!(shared.preview.get().unwrap().is_off());

        c.run_due(ms(10_250));
        assert_eq!(releases(&hw), 1);
        assert_eq!(shared.status().state, DisplayState::Idle);
        assert!(c.timers().is_empty());
    }

    #[test]
    fn new_render_replaces_pending_shutoff() {
        let (mut c, hw, _) = connected(Some((5, 5)));
        c.handle(Command::ShowLine, ms(0));
        c.handle(Command::ShowRect, ms(5_000));
        c.run_due(ms(11_000));
        // Only the two shapes; the first hold was cancelled.
        assert_eq!(hw.pushes().len(), 2);

        c.run_due(ms(60_000));
        // One clear, one close (blank + release).
        assert_eq!(hw.pushes().len(), 4);
        assert_eq!(releases(&hw), 1);
    }

    #[test]
    fn marquee_runs_two_laps_then_shuts_off() {
        let (mut c, hw, shared) = connected(None);
        c.handle(Command::ShowText("Hi".into()), ms(0));
        assert!(c.marquee().is_running());
        assert_eq!(shared.status().state, DisplayState::Scrolling);

        c.run_due(ms(60_000));
        assert!(!c.marquee().is_running());
        let pushes = hw.pushes();
        // 88 animation frames, the immediate clear, the blank before release.
        assert_eq!(pushes.len(), 90);
        assert!(pushes[..88].iter().any(|f| f.iter().any(|&v| v > 0)));
        assert!(pushes[88..].iter().all(|f| f.iter().all(|&v| v == 0)));
        assert_eq!(hw.calls().last(), Some(&Call::Release));
        assert!(shared.preview.get().unwrap().is_off());
        assert_eq!(shared.status().state, DisplayState::Idle);
        assert!(c.timers().is_empty());
    }

    #[test]
    fn finished_marquee_blanks_preview_before_release() {
        let (mut c, hw, shared) = connected(None);
        c.handle(Command::ShowText("Hi".into()), ms(0));
        // 88th frame lands on tick 87 at 42 ms per tick.
        c.run_due(ms(87 * 42));
        assert!(!c.marquee().is_running());
        assert!(shared.preview.get().unwrap().is_off());
        assert_eq!(releases(&hw), 0);
        // Only the release is left.
        assert_eq!(c.timers().len(), 1);

        c.run_due(ms(87 * 42 + 100));
        assert_eq!(releases(&hw), 1);
        assert!(c.timers().is_empty());
    }

    #[test]
    fn marquee_ticks_on_text_length_cadence() {
        let (mut c, hw, _) = connected(None);
        c.handle(Command::ShowText("Hi".into()), ms(0));
        assert_eq!(hw.pushes().len(), 1);
        c.run_due(ms(41));
        assert_eq!(hw.pushes().len(), 1);
        c.run_due(ms(42));
        assert_eq!(hw.pushes().len(), 2);
        c.run_due(ms(84));
        assert_eq!(hw.pushes().len(), 3);
    }

    #[test]
    fn shape_cancels_running_marquee() {
        let (mut c, hw, _) = connected(Some((25, 25)));
        c.handle(Command::ShowText("Hello there".into()), ms(0));
        c.run_due(ms(500));
        let before = hw.pushes().len();

        c.handle(Command::ShowCircle, ms(500));
        assert!(!c.marquee().is_running());
        c.run_due(ms(9_000));
        assert_eq!(hw.pushes().len(), before + 1);
    }

    #[test]
    fn marquee_cancels_pending_image_shutoff() {
        let (mut c, hw, _) = connected(None);
        c.handle(Command::ShowSampleImage, ms(0));
        c.handle(Command::ShowText("Hi".into()), ms(1_000));
        c.run_due(ms(60_000));
        // Image, 88 marquee frames, then exactly one clear/close pair.
        assert_eq!(hw.pushes().len(), 1 + 88 + 2);
        assert_eq!(releases(&hw), 1);
    }

    #[test]
    fn stop_clears_releases_and_drops_running_flag() {
        let (mut c, hw, shared) = connected(Some((3, 3)));
        c.handle(Command::Start, ms(0));
        assert!(shared.settings.get().running);

        c.handle(Command::Stop, ms(200));
        assert!(!shared.settings.get().running);
        assert!(!c.marquee().is_running());
        assert!(c.timers().is_empty());
        assert_eq!(hw.calls().last(), Some(&Call::Release));
        assert!(shared.preview.get().unwrap().is_off());
        // The connection is kept for the next job.
        assert_eq!(shared.status().session, SessionPhase::Ready);
    }

    #[test]
    fn stop_while_connecting_drops_queued_jobs() {
        let (mut c, hw, _) = setup(Some((2, 2)), Settings::default());
        c.handle(Command::ShowLine, ms(0));
        c.handle(Command::Stop, ms(5));
        c.handle(Command::Connection(ConnectionEvent::Connected), ms(10));
        assert!(hw.pushes().is_empty());
    }

    #[test]
    fn start_without_music_scrolls_idle_text() {
        let (mut c, _, shared) = connected(None);
        c.handle(Command::Start, ms(0));
        assert_eq!(shared.status().current_text.as_deref(), Some(IDLE_TEXT));
    }

    #[test]
    fn disc_without_art_falls_back_to_text() {
        let (mut c, _, shared) = connected(None);
        shared.now_playing.update_from_single_line(Some("Şarkı"), None);
        c.handle(Command::ShowDisc, ms(0));
        assert!(c.marquee().is_running());
        assert_eq!(shared.status().current_text.as_deref(), Some("Sarki"));
    }

    #[test]
    fn disc_with_nothing_playing_is_a_noop() {
        let (mut c, hw, _) = setup(None, Settings::default());
        c.handle(Command::ShowDisc, ms(0));
        assert!(hw.calls().is_empty());
    }

    #[test]
    fn disc_shows_album_art() {
        let (mut c, hw, shared) = connected(Some((4, 4)));
        shared.now_playing.update(crate::nowplaying::NowPlayingSnapshot {
            title: Some("Song".into()),
            art: Some(Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                8,
                8,
                image::Rgb([255, 255, 255]),
            )))),
            ..Default::default()
        });
        c.handle(Command::ShowDisc, ms(0));
        let pushes = hw.pushes();
        assert_eq!(pushes.len(), 1);
        assert!(pushes[0].iter().all(|&v| v >= 254));
        assert_eq!(shared.status().state, DisplayState::ShowingImage);
    }

    #[test]
    fn notification_auto_display_in_title_mode() {
        let settings = Settings {
            running: true,
            ..Default::default()
        };
        let (mut c, _, shared) = setup(None, settings);
        let event = NotificationEvent {
            title: Some("Song".into()),
            subtitle: Some("Band".into()),
            ..Default::default()
        };
        c.handle(Command::Notification(event), ms(0));
        assert_eq!(shared.status().session, SessionPhase::Connecting);
        c.handle(Command::Connection(ConnectionEvent::Connected), ms(30));
        assert_eq!(shared.status().current_text.as_deref(), Some("Band - Song"));
        assert_eq!(shared.now_playing.text().as_deref(), Some("Band - Song"));
    }

    #[test]
    fn notification_when_not_running_only_updates_store() {
        let (mut c, hw, shared) = setup(None, Settings::default());
        let event = NotificationEvent {
            title: Some("Song".into()),
            ..Default::default()
        };
        c.handle(Command::Notification(event), ms(0));
        assert!(hw.calls().is_empty());
        assert_eq!(shared.now_playing.text().as_deref(), Some("Song"));
    }

    #[test]
    fn marquee_follows_now_playing_changes() {
        let (mut c, _, shared) = connected(None);
        shared.now_playing.update_from_single_line(Some("First"), None);
        c.handle(Command::ShowDisc, ms(0));
        shared.now_playing.update_from_single_line(Some("Second"), None);
        c.run_due(ms(100));
        let state = c.marquee().state().unwrap();
        assert_eq!(state.text, "Second");
        assert_eq!(state.laps_completed, 0);
    }

    #[test]
    fn disconnect_stops_rendering_and_reconnects_on_next_use() {
        let (mut c, hw, shared) = connected(Some((2, 2)));
        c.handle(Command::ShowText("Hi".into()), ms(0));
        c.handle(Command::Connection(ConnectionEvent::Disconnected), ms(10));
        assert!(!c.marquee().is_running());
        assert!(c.timers().is_empty());
        assert_eq!(shared.status().session, SessionPhase::Disconnected);

        c.handle(Command::ShowLine, ms(20));
        assert_eq!(hw.calls().last(), Some(&Call::Connect));
        assert_eq!(shared.status().session, SessionPhase::Connecting);
    }

    #[test]
    fn hardware_failure_surfaces_as_notice() {
        let hw = FakeMatrix {
            fail_push: true,
            ..Default::default()
        };
        let shared = SharedState::new(SettingsStore::in_memory(Settings::default()));
        let mut c = MatrixController::new(hw, Arc::new(|_| {}), HardwareIds::default(), Some((2, 2)), shared.clone());
        c.handle(Command::Connection(ConnectionEvent::Connected), ms(0));
        c.handle(Command::ShowLine, ms(0));
        assert!(shared.status().last_notice.as_deref().unwrap_or("").starts_with("Matrix error"));
    }

    #[test]
    fn commands_stamp_heartbeat() {
        let (mut c, _, shared) = setup(None, Settings::default());
        c.handle(Command::ShowDisc, ms(0));
        assert!(shared.settings.get().heartbeat_ms > 0);
    }

    #[test]
    fn heartbeat_writes_at_most_once_per_interval() {
        let (mut c, _, shared) = setup(None, Settings::default());
        c.handle(Command::ShowDisc, ms(0));
        shared.settings.update(|s| s.heartbeat_ms = 1).unwrap();

        c.handle(Command::ShowDisc, ms(500));
        c.handle(Command::ShowDisc, ms(999));
        assert_eq!(shared.settings.get().heartbeat_ms, 1);

        c.handle(Command::ShowDisc, ms(1_000));
        assert!(shared.settings.get().heartbeat_ms > 1);
    }

    #[test]
    fn status_reports_pending_shutoff() {
        let (mut c, _, shared) = connected(Some((5, 5)));
        c.handle(Command::ShowRect, ms(0));
        assert!(shared.status().shutoff_armed);
        c.run_due(ms(10_250));
        assert!(!shared.status().shutoff_armed);
    }

    #[test]
    fn shutdown_disconnects_and_ends_loop() {
        let (mut c, hw, _) = connected(Some((2, 2)));
        assert!(!c.handle(Command::Shutdown, ms(0)));
        assert_eq!(hw.calls().last(), Some(&Call::Disconnect));
    }

    #[test]
    fn render_loop_exits_when_channel_closes() {
        let (c, hw, _) = connected(Some((2, 2)));
        let (tx, rx) = std::sync::mpsc::channel();
        drop(tx);
        render_loop(rx, c);
        assert_eq!(hw.calls().last(), Some(&Call::Disconnect));
    }

    #[test]
    fn shapes_fit_the_grid() {
        for kind in [ShapeKind::Line, ShapeKind::Rect, ShapeKind::Circle] {
            let g = kind.draw(25, 25);
            assert_eq!(g.len(), 625);
            assert!(g.iter().any(|&v| v == 255));
        }
        let line = ShapeKind::Line.draw(3, 3);
        assert_eq!(line, vec![255, 0, 0, 0, 255, 0, 0, 0, 255]);
    }
}
