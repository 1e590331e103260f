use crate::capture::DEFAULT_PROBE_COUNT;
use crate::compositing::BlurLevel;
use crate::output::{default_snapshot_dir, DEFAULT_OUTPUT_FILE, DEFAULT_RECORD_FPS};
use crate::segmentation::DEFAULT_INPUT_SIZE;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Webcam background replacement with preview, recording and snapshots", long_about = None)]
pub struct Args {
    /// Camera device index selected at startup
    #[arg(short, long, default_value_t = 0)]
    pub camera: u32,

    /// Path to the background-removal model (U²-Net ONNX file)
    #[arg(short, long, default_value = "models/u2net.onnx")]
    pub model: PathBuf,

    /// Square input size the model expects
    #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
    pub model_input_size: u32,

    /// Video file every composited frame is recorded to
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    pub output: PathBuf,

    /// Do not record a video file
    #[arg(long)]
    pub no_record: bool,

    /// Nominal frame rate written to the recording
    #[arg(long, default_value_t = DEFAULT_RECORD_FPS, value_parser = clap::value_parser!(u32).range(1..))]
    pub record_fps: u32,

    /// Where snapshots are saved (defaults to the executable's directory)
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Number of camera indices probed at startup
    #[arg(long, default_value_t = DEFAULT_PROBE_COUNT)]
    pub max_camera_probe: u32,

    /// Background image selected at startup
    #[arg(short, long)]
    pub background: Option<PathBuf>,

    /// Blur level 0-5 applied to the background
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub blur: u8,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

/// Settings the application runs with
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub camera_index: u32,
    pub model_path: PathBuf,
    pub model_input_size: u32,
    pub output_path: Option<PathBuf>,
    pub record_fps: u32,
    pub snapshot_dir: PathBuf,
    pub max_camera_probe: u32,
    pub background: Option<PathBuf>,
    pub blur: BlurLevel,
}

impl From<Args> for AppConfig {
    fn from(args: Args) -> Self {
        Self {
            camera_index: args.camera,
            model_path: args.model,
            model_input_size: args.model_input_size,
            output_path: (!args.no_record).then_some(args.output),
            record_fps: args.record_fps,
            snapshot_dir: args.snapshot_dir.unwrap_or_else(default_snapshot_dir),
            max_camera_probe: args.max_camera_probe,
            background: args.background,
            blur: BlurLevel::new(args.blur).unwrap_or_default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Args::parse_from(["backdrop-cam"]).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_behaviour() {
        let config = AppConfig::default();

        assert_eq!(config.camera_index, 0);
        assert_eq!(config.output_path, Some(PathBuf::from("output_with_bg.mp4")));
        assert_eq!(config.record_fps, 20);
        assert_eq!(config.max_camera_probe, 10);
        assert_eq!(config.model_input_size, 320);
        assert_eq!(config.blur, BlurLevel::NONE);
        assert!(config.background.is_none());
    }

    #[test]
    fn flags_are_applied() {
        let args = Args::try_parse_from([
            "backdrop-cam",
            "--camera",
            "2",
            "--no-record",
            "--blur",
            "4",
            "--snapshot-dir",
            "/tmp/shots",
            "--background",
            "beach.jpg",
        ])
        .unwrap();

        let config = AppConfig::from(args);

        assert_eq!(config.camera_index, 2);
        assert!(config.output_path.is_none());
        assert_eq!(config.blur.kernel_size(), Some(9));
        assert_eq!(config.snapshot_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(config.background, Some(PathBuf::from("beach.jpg")));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(Args::try_parse_from(["backdrop-cam", "--blur", "6"]).is_err());
        assert!(Args::try_parse_from(["backdrop-cam", "--record-fps", "0"]).is_err());
    }
}
