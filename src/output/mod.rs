mod recorder;
mod snapshot;

pub use recorder::{Mp4Recorder, DEFAULT_OUTPUT_FILE, DEFAULT_RECORD_FPS};
pub use snapshot::{default_snapshot_dir, save_snapshot, SnapshotError};

use anyhow::Result;
use image::RgbImage;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);

    /// Flush and close the output; further writes are an error
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink used when recording is switched off
pub struct NullSink {
    width: u32,
    height: u32,
}

impl NullSink {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl OutputSink for NullSink {
    fn write_frame(&mut self, _frame: &RgbImage) -> Result<()> {
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
