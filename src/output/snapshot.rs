use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("No processed frame available to capture.")]
    NoFrame,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode image: {0}")]
    Image(#[from] image::ImageError),
}

/// `processed_image_<YYYYMMDD_HHMMSS>.png`
pub fn snapshot_file_name(at: &DateTime<Local>) -> String {
    format!("processed_image_{}.png", at.format("%Y%m%d_%H%M%S"))
}

/// Directory holding the running executable, falling back to the working directory
pub fn default_snapshot_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Save the latest composited frame as a timestamped PNG in `dir`
pub fn save_snapshot(
    dir: &Path,
    frame: Option<&RgbImage>,
    at: &DateTime<Local>,
) -> Result<PathBuf, SnapshotError> {
    let frame = frame.ok_or(SnapshotError::NoFrame)?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(at));
    frame.save_with_format(&path, image::ImageFormat::Png)?;

    tracing::info!("Snapshot saved to {}", path.display());
    Ok(path)
}
