//! Scrolling-text animation state.
//!
//! The animator is a plain state machine: it never sleeps and never talks
//! to hardware. Each [`MarqueeAnimator::tick`] says which frame to draw and
//! what should happen next; the controller does the drawing and schedules
//! the following tick on the shared timer queue.

use std::time::Duration;

/// Extra blank columns before the text enters for the first time.
pub const ENTRY_PADDING: i32 = 12;
/// Full passes before the marquee stops by itself.
pub const LAPS_TO_FINISH: u32 = 2;

fn char_len(text: &str) -> i64 {
    text.chars().count() as i64
}

/// Approximate rendered width of `text` in cells (6 per char, 8..=120).
pub fn text_width_cells(text: &str) -> i32 {
    (char_len(text) * 6).clamp(8, 120) as i32
}

/// Delay between ticks: shorter text scrolls faster (25..=70 ms).
pub fn tick_delay(text: &str) -> Duration {
    Duration::from_millis((38 + char_len(text) * 2).clamp(25, 70) as u64)
}

/// Where the marquee text comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextSource {
    /// A fixed string given by the caller.
    Fixed(String),
    /// Whatever is currently playing; re-read on every tick.
    NowPlaying,
}

/// Live state of a running marquee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarqueeState {
    pub text: String,
    pub text_width_cells: i32,
    /// Left edge of the text; decreases by one cell per tick.
    pub scroll_position: i32,
    pub laps_completed: u32,
}

/// What the caller should do after the frame of this tick is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum After {
    Continue(Duration),
    Finished,
}

/// Result of one animation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Draw `text` with its left edge at column `x`, then act on `after`.
    Render { text: String, x: i32, after: After },
    /// Not running (never started, stopped, or the text source vanished).
    Idle,
}

#[derive(Debug, Default)]
pub struct MarqueeAnimator {
    source: Option<TextSource>,
    state: Option<MarqueeState>,
    grid_width: i32,
}

impl MarqueeAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_some()
    }

    pub fn state(&self) -> Option<&MarqueeState> {
        self.state.as_ref()
    }

    pub fn source(&self) -> Option<&TextSource> {
        self.source.as_ref()
    }

    /// Start (or restart) scrolling `text` across a grid `grid_width` wide.
    pub fn start(&mut self, source: TextSource, text: &str, grid_width: u32) {
        self.source = Some(source);
        self.grid_width = grid_width as i32;
        self.state = Some(self.fresh_state(text));
    }

    pub fn stop(&mut self) {
        self.source = None;
        self.state = None;
    }

    fn fresh_state(&self, text: &str) -> MarqueeState {
        MarqueeState {
            text: text.to_string(),
            text_width_cells: text_width_cells(text),
            scroll_position: self.grid_width + ENTRY_PADDING,
            laps_completed: 0,
        }
    }

    /// Advance one frame.
    ///
    /// `live_text` is the current value of the text source (already
    /// sanitised). A change restarts the marquee from the entry position;
    /// `None` or blank stops it.
    pub fn tick(&mut self, live_text: Option<&str>) -> TickOutcome {
        let Some(current) = self.state.as_ref() else {
            return TickOutcome::Idle;
        };
        let Some(live) = live_text.filter(|t| !t.trim().is_empty()) else {
            self.stop();
            return TickOutcome::Idle;
        };
        if live != current.text {
            self.state = Some(self.fresh_state(live));
        }

        let grid_width = self.grid_width;
        let Some(state) = self.state.as_mut() else {
            return TickOutcome::Idle;
        };
        let x = state.scroll_position;
        let text = state.text.clone();

        state.scroll_position -= 1;
        let mut after = After::Continue(tick_delay(&text));
        if state.scroll_position < -state.text_width_cells {
            state.laps_completed += 1;
            if state.laps_completed >= LAPS_TO_FINISH {
                after = After::Finished;
            } else {
                state.scroll_position = grid_width;
            }
        }

        if after == After::Finished {
            self.stop();
        }
        TickOutcome::Render { text, x, after }
    }
}
