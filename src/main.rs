mod app;
mod capture;
mod compositing;
mod config;
mod output;
mod segmentation;
mod session;

use anyhow::Result;
use app::{BackdropApp, WINDOW_TITLE};
use clap::Parser;
use config::{AppConfig, Args};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = AppConfig::from(args);

    tracing::info!("backdrop-cam starting");
    tracing::info!("Model: {}", config.model_path.display());
    match &config.output_path {
        Some(path) => tracing::info!("Recording to {} at {} fps", path.display(), config.record_fps),
        None => tracing::info!("Recording disabled"),
    }
    tracing::info!("Snapshots go to {}", config.snapshot_dir.display());

    let cameras = capture::probe_cameras(config.max_camera_probe);
    if cameras.is_empty() {
        tracing::warn!("No camera answered on indices 0..{}", config.max_camera_probe);
    }

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 720.0])
            .with_min_inner_size([480.0, 400.0])
            .with_title(WINDOW_TITLE),
        ..Default::default()
    };

    eframe::run_native(
        WINDOW_TITLE,
        native_options,
        Box::new(move |cc| Box::new(BackdropApp::new(cc, config, cameras))),
    )
    .map_err(|e| anyhow::anyhow!("GUI failed: {e}"))?;

    tracing::info!("backdrop-cam exiting");
    Ok(())
}
