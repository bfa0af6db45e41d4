//! Matrix Disc HTTP server
//!
//! Mirrors "now playing" metadata and simple shapes onto a small LED matrix.
//! Notifications, display commands and settings arrive over HTTP; the
//! render thread turns them into frames.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the matrix session and all timers
//! - **HTTP server** (tokio/axum): accepts API requests, sends commands via channel
//! - **Backend connect thread**: reports connection events back into the same channel
//!
//! ## Rust concepts
//! - `#[tokio::main]` async entry point
//! - `std::thread::Builder` for the named render thread
//! - `std::sync::mpsc` channel between async and sync worlds
//! - `tokio::sync::Notify` to turn Ctrl+C into a graceful server shutdown
//!
//! ## Usage
//! ```sh
//! RUST_LOG=debug ./target/release/matrix-disc --port 8080 --settings settings.json
//! ```

use clap::Parser;
use matrix_disc::PanelConfig;
use matrix_disc::device::{self, HardwareIds};
use matrix_disc::hardware::{ConnectionSink, SimulatedMatrix};
use matrix_disc::render::{Command, MatrixController, SharedState, render_loop};
use matrix_disc::server::{self, AppState};
use matrix_disc::settings::{Settings, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Matrix Disc HTTP server
#[derive(Parser)]
#[command(name = "matrix-disc")]
#[command(about = "Mirror now-playing metadata onto a small LED matrix")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Directory that image and album-art paths are resolved against
    #[arg(long, default_value = ".")]
    media_dir: PathBuf,

    /// Settings file (JSON). Without it settings live in memory only.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Override the detected hardware model string
    #[arg(long)]
    model: Option<String>,

    /// Override the detected product string
    #[arg(long)]
    product: Option<String>,

    /// Override the detected build fingerprint
    #[arg(long)]
    fingerprint: Option<String>,

    /// Force the logical grid size, e.g. `25x25`
    #[arg(long, value_parser = device::parse_grid_size)]
    grid: Option<(u32, u32)>,

    /// Number of rows on the LED panel
    #[arg(long, default_value = "64")]
    rows: u32,

    /// Number of columns on the LED panel
    #[arg(long, default_value = "64")]
    cols: u32,

    /// Use the simulated matrix even when built with panel support
    #[arg(long)]
    simulate: bool,

    /// Connect latency of the simulated matrix, in milliseconds
    #[arg(long, default_value = "300")]
    connect_latency_ms: u64,
}

/// Everything the render thread needs to build its controller.
struct RenderSetup {
    sink: ConnectionSink,
    ids: HardwareIds,
    grid: Option<(u32, u32)>,
    shared: SharedState,
    panel: PanelConfig,
    simulate: bool,
    latency: Duration,
}

/// Spawn the render thread. The hardware backend is created on that thread
/// because the panel library must not cross threads.
fn spawn_render_thread(rx: Receiver<Command>, setup: RenderSetup) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name("render".into()).spawn(move || {
        let RenderSetup {
            sink,
            ids,
            grid,
            shared,
            panel,
            simulate,
            latency,
        } = setup;

        #[cfg(feature = "hardware")]
        if !simulate {
            let hw = matrix_disc::panel::PanelMatrix::new(panel);
            render_loop(rx, MatrixController::new(hw, sink, ids, grid, shared));
            return;
        }
        #[cfg(not(feature = "hardware"))]
        if !simulate {
            tracing::info!("Built without panel support, using the simulated matrix ({}x{} ignored)", panel.cols, panel.rows);
        }

        let hw = SimulatedMatrix::new(latency);
        render_loop(rx, MatrixController::new(hw, sink, ids, grid, shared));
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let media_dir = args.media_dir.canonicalize().unwrap_or_else(|_| {
        tracing::warn!("Could not canonicalize media dir, using as-is");
        args.media_dir.clone()
    });

    let settings = match &args.settings {
        Some(path) => SettingsStore::load(path),
        None => SettingsStore::in_memory(Settings::default()),
    };
    let ids = HardwareIds::detect().with_overrides(args.model, args.product, args.fingerprint);
    let profile = device::resolve_with_grid(&ids, args.grid);

    tracing::info!("Matrix Disc v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Device {} ({}x{}), model {:?}",
        profile.device_code,
        profile.grid_width,
        profile.grid_height,
        ids.model
    );
    tracing::info!("Media dir: {}", media_dir.display());
    tracing::info!("Port: {}", args.port);

    let (tx, rx) = mpsc::channel();
    let shared = SharedState::new(settings);

    // Backend connection events re-enter the render thread through the channel.
    let sink_tx = tx.clone();
    let sink: ConnectionSink = Arc::new(move |event| {
        let _ = sink_tx.send(Command::Connection(event));
    });

    let render_handle = spawn_render_thread(
        rx,
        RenderSetup {
            sink,
            ids,
            grid: args.grid,
            shared: shared.clone(),
            panel: PanelConfig::new(args.rows, args.cols),
            simulate: args.simulate,
            latency: Duration::from_millis(args.connect_latency_ms),
        },
    )?;

    // Ctrl+C: close the matrix, then stop accepting requests.
    let shutdown = Arc::new(Notify::new());
    let signal_tx = tx.clone();
    let signal_notify = shutdown.clone();
    let running = matrix_disc::setup_signal_handler(move || {
        tracing::info!("Shutdown requested");
        let _ = signal_tx.send(Command::Shutdown);
        signal_notify.notify_one();
    })?;

    let app = server::create_router(AppState {
        command_tx: tx.clone(),
        shared,
        media_dir,
    });

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);
    tracing::info!("Try: curl -X POST http://localhost:{}/api/v1/show/circle", args.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await;

    if matrix_disc::is_running(&running) {
        // Server ended on its own; the render thread still needs to close.
        let _ = tx.send(Command::Shutdown);
    }
    drop(tx);
    if render_handle.join().is_err() {
        tracing::error!("Render thread panicked");
    }
    tracing::info!("Bye");

    served?;
    Ok(())
}
