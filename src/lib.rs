//! Now-playing mirror for small LED matrix displays.
//!
//! This crate turns music metadata (title, artist, album art) and a few
//! primitive shapes into brightness grids and drives them onto a tiny
//! secondary LED matrix:
//! - Pure converters: bitmap → grid, shapes → grid, text → grid
//! - A single lazily-connected hardware session shared by every caller
//! - A cooperative, virtual-time scheduler for marquee ticks and auto-shutoff
//! - A process-wide preview of the last pushed frame
//!
//! The binary (`main.rs`) wires these into a render thread plus an HTTP
//! command surface.

pub mod device;
pub mod error;
pub mod grid;
pub mod hardware;
pub mod marquee;
pub mod nowplaying;
#[cfg(feature = "hardware")]
pub mod panel;
pub mod payload;
pub mod preview;
pub mod render;
pub mod sanitize;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod settings;
pub mod shapes;
pub mod shutoff;
pub mod text;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A row-major brightness grid, one byte per cell (0 = off, 255 = full).
pub type Grid = Vec<u8>;

// ── Panel configuration ────────────────────────────────────────────

/// Physical dimensions of an RGB LED panel used by the `hardware` backend.
///
/// The logical matrix grid (see [`device::DeviceProfile`]) is usually much
/// smaller; the panel backend scales each grid cell up to a block of LEDs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelConfig {
    pub rows: u32,
    pub cols: u32,
}

impl PanelConfig {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Total number of LEDs on the panel.
    pub fn pixel_count(&self) -> u32 {
        self.rows * self.cols
    }

    /// Edge length (in LEDs) of one grid cell when a `width`×`height` grid
    /// is scaled up onto this panel. Never smaller than one LED.
    pub fn cell_size(&self, width: u32, height: u32) -> u32 {
        if width == 0 || height == 0 {
            return 1;
        }
        (self.cols / width).min(self.rows / height).max(1)
    }

    /// `(cell_size, x_offset, y_offset)` placing a `width`×`height` grid in
    /// the middle of the panel. Offsets are zero when the grid overflows.
    pub fn grid_layout(&self, width: u32, height: u32) -> (u32, u32, u32) {
        let cell = self.cell_size(width, height);
        let x = self.cols.saturating_sub(width * cell) / 2;
        let y = self.rows.saturating_sub(height * cell) / 2;
        (cell, x, y)
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self { rows: 64, cols: 64 }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from image and hardware crates.
///
/// Every bitmap that reaches the matrix is reduced to a single brightness
/// channel through [`Color::luma`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// A neutral gray of the given brightness.
    pub fn gray(value: u8) -> Self {
        Self::new(value, value, value)
    }

    /// Create a color from a hue value (0-360), with full saturation and brightness.
    ///
    /// # Rust concept: match expressions
    /// Rust's `match` is exhaustive; the compiler ensures we handle all cases.
    pub fn from_hue(hue: u16) -> Self {
        let hue = hue % 360;
        let sector = hue / 60;
        let fraction = ((hue % 60) as f32) / 60.0;
        let rising = (fraction * 255.0) as u8;
        let falling = ((1.0 - fraction) * 255.0) as u8;

        match sector {
            0 => Self::new(255, rising, 0),  // Red → Yellow
            1 => Self::new(falling, 255, 0), // Yellow → Green
            2 => Self::new(0, 255, rising),  // Green → Cyan
            3 => Self::new(0, falling, 255), // Cyan → Blue
            4 => Self::new(rising, 0, 255),  // Blue → Magenta
            5 => Self::new(255, 0, falling), // Magenta → Red
            _ => Self::new(255, 0, 0),       // Unreachable, but Rust requires exhaustiveness
        }
    }

    /// Relative luminance using the ITU-R BT.709 weights, unclamped and
    /// unrounded so callers can apply further adjustments first.
    pub fn luma(self) -> f32 {
        0.2126 * self.r as f32 + 0.7152 * self.g as f32 + 0.0722 * self.b as f32
    }
}

/// Convert our Color to the hardware crate's LedColor at the boundary.
#[cfg(feature = "hardware")]
impl From<Color> for rpi_led_matrix::LedColor {
    fn from(c: Color) -> Self {
        rpi_led_matrix::LedColor {
            red: c.r,
            green: c.g,
            blue: c.b,
        }
    }
}

// ── Shutdown signal ────────────────────────────────────────────────

/// Install a Ctrl+C handler that flips the returned flag to false and then
/// runs `on_signal` (used to wake the render thread and the HTTP server).
///
/// # Rust concept: Arc and AtomicBool
/// The flag is shared between the signal handler thread and whoever polls
/// it. `Arc` gives shared ownership, `AtomicBool` makes the bool itself
/// safe to touch from both sides without a mutex.
pub fn setup_signal_handler<F>(on_signal: F) -> Result<Arc<AtomicBool>, ctrlc::Error>
where
    F: Fn() + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        on_signal();
    })?;

    Ok(running)
}

/// Check if the process should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    // ── PanelConfig tests ──────────────────────────────────────────

    #[test]
    fn panel_config_default_is_64x64() {
        let panel = PanelConfig::default();
        assert_eq!(panel.rows, 64);
        assert_eq!(panel.cols, 64);
    }

    #[rstest]
    #[case(64, 64, 4096)]
    #[case(32, 32, 1024)]
    #[case(128, 64, 8192)]
    fn test_pixel_count(#[case] rows: u32, #[case] cols: u32, #[case] expected: u32) {
        assert_eq!(PanelConfig::new(rows, cols).pixel_count(), expected);
    }

    #[rstest]
    #[case(64, 64, 25, 25, 2)]
    #[case(32, 64, 25, 25, 1)]
    #[case(16, 16, 25, 25, 1)]
    #[case(64, 128, 25, 25, 2)]
    #[case(64, 64, 0, 0, 1)]
    fn test_cell_size(
        #[case] rows: u32,
        #[case] cols: u32,
        #[case] width: u32,
        #[case] height: u32,
        #[case] expected: u32,
    ) {
        assert_eq!(PanelConfig::new(rows, cols).cell_size(width, height), expected);
    }

    #[rstest]
    #[case(64, 64, 25, 25, (2, 7, 7))]
    #[case(32, 64, 25, 25, (1, 19, 3))]
    #[case(16, 16, 25, 25, (1, 0, 0))]
    #[case(64, 64, 2, 2, (32, 0, 0))]
    fn test_grid_layout(
        #[case] rows: u32,
        #[case] cols: u32,
        #[case] width: u32,
        #[case] height: u32,
        #[case] expected: (u32, u32, u32),
    ) {
        assert_eq!(PanelConfig::new(rows, cols).grid_layout(width, height), expected);
    }

    // ── Color tests ────────────────────────────────────────────────

    #[rstest]
    #[case(0, 255, 0, 0)] // Red
    #[case(60, 255, 255, 0)] // Yellow
    #[case(120, 0, 255, 0)] // Green
    #[case(180, 0, 255, 255)] // Cyan
    #[case(240, 0, 0, 255)] // Blue
    #[case(300, 255, 0, 255)] // Magenta
    fn test_color_from_hue_primary(#[case] hue: u16, #[case] r: u8, #[case] g: u8, #[case] b: u8) {
        assert_eq!(Color::from_hue(hue), Color::new(r, g, b));
    }

    #[test]
    fn color_from_hue_wraps_at_360() {
        assert_eq!(Color::from_hue(0), Color::from_hue(360));
        assert_eq!(Color::from_hue(90), Color::from_hue(450));
    }

    #[test]
    fn luma_of_gray_is_the_gray_level() {
        for v in [0u8, 1, 77, 128, 254, 255] {
            assert!((Color::gray(v).luma() - v as f32).abs() < 0.01);
        }
    }

    #[test]
    fn luma_weights_green_heaviest() {
        let r = Color::new(255, 0, 0).luma();
        let g = Color::new(0, 255, 0).luma();
        let b = Color::new(0, 0, 255).luma();
        assert!(g > r && r > b);
        assert!((r - 54.213).abs() < 0.01);
    }
}
