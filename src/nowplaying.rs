//! Now-playing metadata: the shared snapshot slot, derivation of
//! `{title, artist}` from notification fields, and the gate that decides
//! whether a notification should light up the matrix.
//!
//! ## Rust concepts
//! - `Arc<T>` snapshots replaced wholesale (readers never see a half update)
//! - `Option` combinators (`filter`, `or_else`, `map`) for precedence rules

use crate::settings::{DisplayMode, Settings};
use image::DynamicImage;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Minimum time between two automatic renders.
pub const RENDER_WINDOW: Duration = Duration::from_secs(10);

// ── Snapshot ─────────────────────────────────────────────────────────

/// What is playing right now. Immutable; a new update replaces it.
#[derive(Clone, Debug, Default)]
pub struct NowPlayingSnapshot {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub is_playing: bool,
    pub position_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub art: Option<Arc<DynamicImage>>,
    pub source_package: Option<String>,
}

/// JSON view of the snapshot (art reduced to its size).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct NowPlayingView {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub is_playing: bool,
    pub position_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    /// `[width, height]` of the album art, if any.
    pub art_size: Option<[u32; 2]>,
    pub source_package: Option<String>,
    /// Composed marquee text.
    pub text: Option<String>,
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|t| !t.is_empty())
}

/// `"artist - title"`, or whichever half exists.
pub fn compose_text(title: Option<&str>, artist: Option<&str>) -> Option<String> {
    match (non_blank(title), non_blank(artist)) {
        (Some(t), Some(a)) => Some(format!("{a} - {t}")),
        (Some(t), None) => Some(t.to_string()),
        (None, Some(a)) => Some(a.to_string()),
        (None, None) => None,
    }
}

#[derive(Debug)]
struct Entry {
    snapshot: Arc<NowPlayingSnapshot>,
    text: Option<String>,
}

/// Process-wide last-write-wins slot. Clones share the slot.
#[derive(Clone, Default)]
pub struct NowPlayingStore {
    slot: Arc<Mutex<Option<Arc<Entry>>>>,
}

impl NowPlayingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot and recompute the composed text.
    pub fn update(&self, snapshot: NowPlayingSnapshot) {
        let text = compose_text(snapshot.title.as_deref(), snapshot.artist.as_deref());
        let entry = Entry {
            snapshot: Arc::new(snapshot),
            text,
        };
        *self.lock() = Some(Arc::new(entry));
    }

    /// Store an opaque line as the title. Blank lines are ignored.
    pub fn update_from_single_line(&self, line: Option<&str>, source_package: Option<String>) {
        let Some(line) = non_blank(line) else {
            return;
        };
        let entry = Entry {
            snapshot: Arc::new(NowPlayingSnapshot {
                title: Some(line.to_string()),
                is_playing: true,
                source_package,
                ..Default::default()
            }),
            text: Some(line.to_string()),
        };
        *self.lock() = Some(Arc::new(entry));
    }

    pub fn snapshot(&self) -> Option<Arc<NowPlayingSnapshot>> {
        self.current().map(|e| Arc::clone(&e.snapshot))
    }

    pub fn text(&self) -> Option<String> {
        self.current().and_then(|e| e.text.clone())
    }

    pub fn art(&self) -> Option<Arc<DynamicImage>> {
        self.current().and_then(|e| e.snapshot.art.clone())
    }

    pub fn view(&self) -> Option<NowPlayingView> {
        let entry = self.current()?;
        let s = &entry.snapshot;
        Some(NowPlayingView {
            title: s.title.clone(),
            artist: s.artist.clone(),
            album: s.album.clone(),
            is_playing: s.is_playing,
            position_ms: s.position_ms,
            duration_ms: s.duration_ms,
            art_size: s.art.as_ref().map(|a| [a.width(), a.height()]),
            source_package: s.source_package.clone(),
            text: entry.text.clone(),
        })
    }

    fn current(&self) -> Option<Arc<Entry>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<Entry>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Notification ingestion ───────────────────────────────────────────

/// Fields of one posted notification.
#[derive(Clone, Debug, Default)]
pub struct NotificationEvent {
    pub title: Option<String>,
    pub text: Option<String>,
    pub subtitle: Option<String>,
    pub info_text: Option<String>,
    pub large_icon: Option<Arc<DynamicImage>>,
    pub source_package: Option<String>,
}

/// Best-effort metadata pulled out of a notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DerivedTrack {
    Track {
        title: Option<String>,
        artist: Option<String>,
    },
    /// Nothing structured; keep the first non-blank field as-is.
    SingleLine(Option<String>),
}

/// Apply the precedence rules:
///
/// - artist: subtitle, else info text, else the part before `" - "` in text
/// - title: the title field whenever present (even blank), else the part
///   after `" - "` in text, else the raw text
///
/// A present but blank title with no artist falls through to the single
/// line, which may then come from the text or one of the other fields.
pub fn derive_track(event: &NotificationEvent) -> DerivedTrack {
    let text = event.text.as_deref().map(str::trim).unwrap_or("");
    let split = text.split_once(" - ");

    let artist = non_blank(event.subtitle.as_deref())
        .or_else(|| non_blank(event.info_text.as_deref()))
        .or_else(|| split.map(|(a, _)| a.trim()).filter(|a| !a.is_empty()))
        .map(str::to_string);

    let title = match event.title.as_deref() {
        Some(t) => Some(t.trim()),
        None => match split {
            Some((_, t)) => Some(t.trim()),
            None => Some(text),
        },
    }
    .filter(|t| !t.is_empty())
    .map(str::to_string);

    if title.is_some() || artist.is_some() {
        return DerivedTrack::Track { title, artist };
    }
    let line = [&event.title, &event.text, &event.subtitle, &event.info_text]
        .into_iter()
        .find_map(|f| non_blank(f.as_deref()))
        .map(str::to_string);
    DerivedTrack::SingleLine(line)
}

/// Record `event` in `store`. Returns the change-detection key.
pub fn ingest(store: &NowPlayingStore, event: NotificationEvent) -> String {
    let derived = derive_track(&event);
    let art_id = event.large_icon.as_deref().map(art_fingerprint);
    let key = match &derived {
        DerivedTrack::Track { title, artist } => format!("{title:?}_{artist:?}_{art_id:?}"),
        DerivedTrack::SingleLine(line) => format!("{line:?}_None_{art_id:?}"),
    };

    match derived {
        DerivedTrack::Track { title, artist } => store.update(NowPlayingSnapshot {
            title,
            artist,
            album: event.subtitle,
            is_playing: true,
            position_ms: None,
            duration_ms: None,
            art: event.large_icon,
            source_package: event.source_package,
        }),
        DerivedTrack::SingleLine(line) => store.update_from_single_line(line.as_deref(), event.source_package),
    }
    key
}

fn art_fingerprint(img: &DynamicImage) -> u64 {
    let mut h = DefaultHasher::new();
    img.width().hash(&mut h);
    img.height().hash(&mut h);
    img.as_bytes().hash(&mut h);
    h.finish()
}

// ── Auto-display gate ────────────────────────────────────────────────

/// Decides whether a notification should trigger an automatic render.
#[derive(Debug, Default)]
pub struct NotificationObserver {
    last_key: Option<String>,
    last_render: Option<Duration>,
}

impl NotificationObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest `event` and return the mode to render in, if any.
    ///
    /// Renders only when the track changed, the render window has elapsed,
    /// the running flag is set and the service is enabled.
    pub fn observe(
        &mut self,
        event: NotificationEvent,
        store: &NowPlayingStore,
        settings: &Settings,
        now: Duration,
    ) -> Option<DisplayMode> {
        let key = ingest(store, event);
        let changed = self.last_key.as_deref() != Some(key.as_str());
        self.last_key = Some(key);

        if !changed {
            tracing::debug!("Notification ignored: track unchanged");
            return None;
        }
        if self.last_render.is_some_and(|last| now.saturating_sub(last) < RENDER_WINDOW) {
            tracing::debug!("Notification ignored: inside render window");
            return None;
        }
        if !settings.running || !settings.service_enabled {
            return None;
        }
        self.last_render = Some(now);
        Some(settings.mode)
    }
}
