//! HTTP API server: axum router and request handlers.
//!
//! This is the command surface that service intents, tiles and widgets
//! would otherwise use. The server runs on the tokio async runtime while the
//! render thread runs on a plain `std::thread`; handlers only enqueue
//! [`Command`]s and read shared snapshots, they never touch the hardware.
//!
//! ## Rust concepts
//! - `async fn` and `.await` for non-blocking I/O
//! - axum extractors: `State`, `Json`, `String` bodies
//! - `tokio::task::spawn_blocking` for CPU-bound image decoding
//! - `tower-http` middleware for CORS and request tracing

use crate::nowplaying::{NotificationEvent, NowPlayingView};
use crate::preview::PreviewFrame;
use crate::render::{Command, DisplayState, DisplayStatus, SharedState};
use crate::session::SessionPhase;
use crate::settings::{DisplayMode, Settings, SettingsPatch};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use image::{DynamicImage, ImageReader};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// How often the preview stream checks for a new frame.
const PREVIEW_POLL: Duration = Duration::from_millis(50);

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
///
/// Rust concept: CLONE for Arc
/// axum clones the state for each request, so everything inside is either
/// an `Arc`-backed handle or cheap to copy.
#[derive(Clone)]
pub struct AppState {
    /// Channel to send commands to the render thread
    pub command_tx: Sender<Command>,
    /// Status, preview, now-playing and settings handles
    pub shared: SharedState,
    /// Root directory that image and icon paths are resolved against
    pub media_dir: PathBuf,
}

type ApiError = (StatusCode, String);

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        get_preview,
        get_now_playing,
        get_settings,
        put_settings,
        post_start,
        post_stop,
        post_show_line,
        post_show_rect,
        post_show_circle,
        post_show_disc,
        post_show_sample,
        post_show_pixels,
        post_show_text,
        post_show_image,
        post_notification,
    ),
    components(schemas(
        DisplayStatus,
        DisplayState,
        SessionPhase,
        crate::device::DeviceProfile,
        PreviewFrame,
        NowPlayingView,
        Settings,
        SettingsPatch,
        DisplayMode,
        TextRequest,
        ImageRequest,
        NotificationRequest,
    )),
    tags(
        (name = "display", description = "Matrix rendering commands"),
        (name = "now-playing", description = "Now-playing metadata"),
        (name = "system", description = "Status, preview and settings"),
    ),
    info(
        title = "Matrix Disc API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for mirroring now-playing metadata onto a small LED matrix"
    )
)]
pub struct ApiDoc;

// ── Request types ────────────────────────────────────────────────────

#[derive(Deserialize, utoipa::ToSchema)]
pub struct TextRequest {
    /// Text to scroll. Accented letters are reduced to ASCII.
    #[schema(example = "İstanbul çok güzel")]
    text: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ImageRequest {
    /// Path to image file relative to the media directory
    #[schema(example = "covers/album.png")]
    path: String,
}

/// A posted notification, as a notification listener would see it.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct NotificationRequest {
    #[schema(example = "Song")]
    title: Option<String>,
    text: Option<String>,
    #[schema(example = "Band")]
    subtitle: Option<String>,
    info_text: Option<String>,
    /// Album art image, relative to the media directory
    large_icon: Option<String>,
    #[schema(example = "com.example.player")]
    source_package: Option<String>,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"]).validator_url("none")),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/preview", get(get_preview))
        .route("/api/v1/preview/stream", get(ws_preview_stream))
        .route("/api/v1/now-playing", get(get_now_playing))
        .route("/api/v1/settings", get(get_settings).put(put_settings))
        .route("/api/v1/start", post(post_start))
        .route("/api/v1/stop", post(post_stop))
        .route("/api/v1/show/line", post(post_show_line))
        .route("/api/v1/show/rect", post(post_show_rect))
        .route("/api/v1/show/circle", post(post_show_circle))
        .route("/api/v1/show/disc", post(post_show_disc))
        .route("/api/v1/show/sample", post(post_show_sample))
        .route("/api/v1/show/pixels", post(post_show_pixels))
        .route("/api/v1/show/text", post(post_show_text))
        .route("/api/v1/show/image", post(post_show_image))
        .route("/api/v1/notifications", post(post_notification))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn send(state: &AppState, cmd: Command) -> Result<StatusCode, ApiError> {
    state
        .command_tx
        .send(cmd)
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Render thread gone".to_string()))?;
    Ok(StatusCode::OK)
}

// ── System handlers ──────────────────────────────────────────────────

/// GET /api/v1/status: return current display state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current display status", body = DisplayStatus)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<DisplayStatus> {
    Json(state.shared.status().clone())
}

/// GET /api/v1/preview: last frame pushed to the matrix (0x0 when off)
#[utoipa::path(
    get,
    path = "/api/v1/preview",
    tag = "system",
    responses(
        (status = 200, description = "Latest preview frame", body = PreviewFrame)
    )
)]
async fn get_preview(State(state): State<AppState>) -> Json<PreviewFrame> {
    let frame = state
        .shared
        .preview
        .get()
        .map(|f| f.as_ref().clone())
        .unwrap_or_default();
    Json(frame)
}

/// GET /api/v1/now-playing: current now-playing snapshot
#[utoipa::path(
    get,
    path = "/api/v1/now-playing",
    tag = "now-playing",
    responses(
        (status = 200, description = "Now-playing snapshot", body = NowPlayingView),
        (status = 404, description = "Nothing has played yet")
    )
)]
async fn get_now_playing(State(state): State<AppState>) -> Result<Json<NowPlayingView>, ApiError> {
    state
        .shared
        .now_playing
        .view()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Nothing playing".to_string()))
}

/// GET /api/v1/settings: current settings
#[utoipa::path(
    get,
    path = "/api/v1/settings",
    tag = "system",
    responses(
        (status = 200, description = "Current settings", body = Settings)
    )
)]
async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.shared.settings.get())
}

/// PUT /api/v1/settings: update mode, brightness, contrast or service flag
#[utoipa::path(
    put,
    path = "/api/v1/settings",
    tag = "system",
    request_body = SettingsPatch,
    responses(
        (status = 200, description = "Updated settings", body = Settings),
        (status = 500, description = "Settings could not be saved")
    )
)]
async fn put_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>, ApiError> {
    state
        .shared
        .settings
        .apply_patch(patch)
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

// ── Display handlers ─────────────────────────────────────────────────

/// POST /api/v1/start: enable auto-display and scroll the current track
#[utoipa::path(post, path = "/api/v1/start", tag = "display",
    responses((status = 200, description = "Started")))]
async fn post_start(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, Command::Start)
}

/// POST /api/v1/stop: stop rendering and release the matrix
#[utoipa::path(post, path = "/api/v1/stop", tag = "display",
    responses((status = 200, description = "Stopped")))]
async fn post_stop(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, Command::Stop)
}

/// POST /api/v1/show/line: diagonal line corner to corner
#[utoipa::path(post, path = "/api/v1/show/line", tag = "display",
    responses((status = 200, description = "Line queued")))]
async fn post_show_line(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, Command::ShowLine)
}

/// POST /api/v1/show/rect: rectangle outline inset from the edges
#[utoipa::path(post, path = "/api/v1/show/rect", tag = "display",
    responses((status = 200, description = "Rectangle queued")))]
async fn post_show_rect(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, Command::ShowRect)
}

/// POST /api/v1/show/circle: centred circle outline
#[utoipa::path(post, path = "/api/v1/show/circle", tag = "display",
    responses((status = 200, description = "Circle queued")))]
async fn post_show_circle(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, Command::ShowCircle)
}

/// POST /api/v1/show/disc: album art, or the track text when there is none
#[utoipa::path(post, path = "/api/v1/show/disc", tag = "display",
    responses((status = 200, description = "Disc queued")))]
async fn post_show_disc(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, Command::ShowDisc)
}

/// POST /api/v1/show/sample: built-in sample image
#[utoipa::path(post, path = "/api/v1/show/sample", tag = "display",
    responses((status = 200, description = "Sample image queued")))]
async fn post_show_sample(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    send(&state, Command::ShowSampleImage)
}

/// POST /api/v1/show/pixels: raw brightness grid
///
/// Body is plain text: a JSON array (`[255,0,255,0]`) or a comma list.
/// Malformed payloads are ignored by the render thread.
#[utoipa::path(
    post,
    path = "/api/v1/show/pixels",
    tag = "display",
    request_body(content = String, content_type = "text/plain"),
    responses(
        (status = 200, description = "Pixels queued"),
        (status = 400, description = "Empty body")
    )
)]
async fn post_show_pixels(State(state): State<AppState>, body: String) -> Result<StatusCode, ApiError> {
    if body.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Empty pixel payload".to_string()));
    }
    send(&state, Command::ShowPixelData(body))
}

/// POST /api/v1/show/text: scroll a fixed text
#[utoipa::path(
    post,
    path = "/api/v1/show/text",
    tag = "display",
    request_body = TextRequest,
    responses((status = 200, description = "Marquee started"))
)]
async fn post_show_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<StatusCode, ApiError> {
    send(&state, Command::ShowText(req.text))
}

/// POST /api/v1/show/image: display an image file for the hold time
#[utoipa::path(
    post,
    path = "/api/v1/show/image",
    tag = "display",
    request_body = ImageRequest,
    responses(
        (status = 200, description = "Image queued"),
        (status = 404, description = "Image not found"),
        (status = 400, description = "Invalid path or undecodable image")
    )
)]
async fn post_show_image(
    State(state): State<AppState>,
    Json(req): Json<ImageRequest>,
) -> Result<StatusCode, ApiError> {
    let full_path = validate_media_path(&state.media_dir, &req.path)?;
    let image = decode_image(full_path).await?;
    send(&state, Command::ShowImage(image))
}

/// POST /api/v1/notifications: ingest a posted notification
#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    tag = "now-playing",
    request_body = NotificationRequest,
    responses(
        (status = 200, description = "Notification ingested"),
        (status = 404, description = "Large icon not found"),
        (status = 400, description = "Invalid icon path or image")
    )
)]
async fn post_notification(
    State(state): State<AppState>,
    Json(req): Json<NotificationRequest>,
) -> Result<StatusCode, ApiError> {
    let large_icon = match &req.large_icon {
        Some(path) => Some(decode_image(validate_media_path(&state.media_dir, path)?).await?),
        None => None,
    };
    let event = NotificationEvent {
        title: req.title,
        text: req.text,
        subtitle: req.subtitle,
        info_text: req.info_text,
        large_icon,
        source_package: req.source_package,
    };
    send(&state, Command::Notification(event))
}

// ── WebSocket preview ────────────────────────────────────────────────

/// GET /api/v1/preview/stream: WebSocket stream of preview frames.
///
/// Sends the current frame on connect and every new frame afterwards as a
/// JSON text message (`{"width":..,"height":..,"pixels":[..]}`).
async fn ws_preview_stream(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_preview_socket(socket, state))
}

async fn handle_preview_socket(mut socket: WebSocket, state: AppState) {
    tracing::info!("Preview stream client connected");
    let mut ticker = tokio::time::interval(PREVIEW_POLL);
    let mut last_sent: Option<Arc<PreviewFrame>> = None;
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = state.shared.preview.get();
                let unchanged = match (&current, &last_sent) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    (None, None) => sent > 0,
                    _ => false,
                };
                if unchanged {
                    continue;
                }
                let frame = current.as_deref().cloned().unwrap_or_default();
                let json = match serde_json::to_string(&frame) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::warn!("Preview frame not serializable: {}", e);
                        break;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
                last_sent = current;
                sent += 1;
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket receive error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore client messages, ping/pong handled by axum
                }
            }
        }
    }

    tracing::info!("Preview stream client disconnected ({} frames sent)", sent);
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Decode an image file off the async runtime.
async fn decode_image(path: PathBuf) -> Result<Arc<DynamicImage>, ApiError> {
    let display = path.display().to_string();
    let decoded = tokio::task::spawn_blocking(move || load_image(&path))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    decoded
        .map(Arc::new)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Cannot decode {display}: {e}")))
}

/// Load and decode an image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, Box<dyn std::error::Error + Send + Sync>> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Validate that a requested path is within the media directory.
///
/// This prevents directory traversal attacks (e.g., `../../etc/passwd`).
/// Both paths are canonicalized and the requested one must start with the
/// media directory prefix.
fn validate_media_path(media_dir: &Path, relative_path: &str) -> Result<PathBuf, ApiError> {
    let full_path = media_dir.join(relative_path);

    let canonical = full_path
        .canonicalize()
        .map_err(|_| (StatusCode::NOT_FOUND, format!("Path not found: {relative_path}")))?;

    let canonical_media = media_dir
        .canonicalize()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Media directory not found".to_string()))?;

    if !canonical.starts_with(&canonical_media) {
        return Err((StatusCode::BAD_REQUEST, "Path is outside the media directory".to_string()));
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn media_path_inside_dir_is_accepted() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.png"), b"x").unwrap();
        let p = validate_media_path(tmp.path(), "a.png").unwrap();
        assert!(p.ends_with("a.png"));
    }

    #[test]
    fn media_path_traversal_is_rejected() {
        let root = TempDir::new().unwrap();
        let media = root.path().join("media");
        fs::create_dir(&media).unwrap();
        fs::write(root.path().join("secret.png"), b"x").unwrap();
        let err = validate_media_path(&media, "../secret.png").unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_media_path_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = validate_media_path(tmp.path(), "nope.png").unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn load_image_decodes_png() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cover.png");
        RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30])).save(&path).unwrap();
        let img = load_image(&path).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
    }

    #[test]
    fn openapi_lists_command_paths() {
        let doc = ApiDoc::openapi();
        for path in ["/api/v1/show/pixels", "/api/v1/notifications", "/api/v1/settings"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
