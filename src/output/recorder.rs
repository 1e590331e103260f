use super::OutputSink;
use image::{imageops, RgbImage};
use mp4::{AvcConfig, MediaConfig, Mp4Config, Mp4Sample, Mp4Writer, TrackConfig, TrackType};
use openh264::encoder::{Encoder, EncoderConfig};
use openh264::formats::{RgbSliceU8, YUVBuffer};
use openh264::OpenH264API;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_FILE: &str = "output_with_bg.mp4";
pub const DEFAULT_RECORD_FPS: u32 = 20;

// 90kHz, the usual video timescale
const TIMESCALE: u32 = 90_000;
const VIDEO_TRACK_ID: u32 = 1;

const NAL_IDR: u8 = 5;
const NAL_SPS: u8 = 7;
const NAL_PPS: u8 = 8;

#[derive(thiserror::Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("H.264 encoding failed: {0}")]
    Encoder(#[from] openh264::Error),

    #[error("MP4 muxing failed: {0}")]
    Mp4(#[from] mp4::Error),

    #[error("Cannot record at {0}x{1}")]
    InvalidSize(u32, u32),

    #[error("Recorder already finished")]
    Finished,
}

/// H.264/MP4 file writer with a fixed nominal frame rate
///
/// Every frame written lasts exactly `1/fps` seconds in the file, whatever
/// the real capture rate was. Dimensions are rounded down to even numbers
/// for 4:2:0 chroma; frames of any other size are resized to fit.
pub struct Mp4Recorder {
    path: PathBuf,
    writer: Option<Mp4Writer<BufWriter<File>>>,
    encoder: Encoder,
    track_added: bool,
    width: u32,
    height: u32,
    frame_duration: u32,
    frames_written: u64,
}

impl Mp4Recorder {
    pub fn create<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let (even_width, even_height) = (width & !1, height & !1);
        if even_width == 0 || even_height == 0 || fps == 0 {
            return Err(RecorderError::InvalidSize(width, height));
        }

        tracing::info!(
            "Recording to {} ({}x{} @ {} fps)",
            path.display(),
            even_width,
            even_height,
            fps
        );

        let file = File::create(&path)?;
        let config = Mp4Config {
            major_brand: str::parse("isom")?,
            minor_version: 512,
            compatible_brands: vec![
                str::parse("isom")?,
                str::parse("iso2")?,
                str::parse("avc1")?,
                str::parse("mp41")?,
            ],
            timescale: TIMESCALE,
        };
        let writer = Mp4Writer::write_start(BufWriter::new(file), &config)?;

        // Every input frame must become a sample, or the fixed timeline drifts
        let encoder_config = EncoderConfig::new()
            .max_frame_rate(fps as f32)
            .enable_skip_frame(false);
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), encoder_config)?;

        Ok(Self {
            path,
            writer: Some(writer),
            encoder,
            track_added: false,
            width: even_width,
            height: even_height,
            frame_duration: TIMESCALE / fps,
            frames_written: 0,
        })
    }

    fn encode(&mut self, frame: &RgbImage) -> Result<(), RecorderError> {
        let _span = tracing::debug_span!("encode").entered();

        let resized;
        let frame = if frame.dimensions() == (self.width, self.height) {
            frame
        } else {
            resized = imageops::resize(
                frame,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            );
            &resized
        };

        let rgb = RgbSliceU8::new(frame.as_raw(), (self.width as usize, self.height as usize));
        let yuv = YUVBuffer::from_rgb_source(rgb);
        let bitstream = self.encoder.encode(&yuv)?;

        let mut units = Vec::new();
        for l in 0..bitstream.num_layers() {
            let Some(layer) = bitstream.layer(l) else {
                continue;
            };
            for n in 0..layer.nal_count() {
                if let Some(unit) = layer.nal_unit(n) {
                    units.push(strip_start_code(unit).to_vec());
                }
            }
        }

        if units.is_empty() {
            tracing::debug!("Encoder skipped frame {}", self.frames_written);
            return Ok(());
        }

        let Some(writer) = self.writer.as_mut() else {
            return Err(RecorderError::Finished);
        };

        if !self.track_added {
            let sps = units.iter().find(|u| nal_type(u) == Some(NAL_SPS));
            let pps = units.iter().find(|u| nal_type(u) == Some(NAL_PPS));
            let (Some(sps), Some(pps)) = (sps, pps) else {
                tracing::warn!("No parameter sets before first frame, dropping it");
                return Ok(());
            };

            writer.add_track(&TrackConfig {
                track_type: TrackType::Video,
                timescale: TIMESCALE,
                language: "und".to_string(),
                media_conf: MediaConfig::AvcConfig(AvcConfig {
                    width: self.width as u16,
                    height: self.height as u16,
                    seq_param_set: sps.clone(),
                    pic_param_set: pps.clone(),
                }),
            })?;
            self.track_added = true;
        }

        let is_sync = units.iter().any(|u| nal_type(u) == Some(NAL_IDR));
        let payload = length_prefixed(
            units
                .iter()
                .filter(|u| !matches!(nal_type(u), Some(NAL_SPS) | Some(NAL_PPS))),
        );

        let sample = Mp4Sample {
            start_time: self.frames_written * self.frame_duration as u64,
            duration: self.frame_duration,
            rendering_offset: 0,
            is_sync,
            bytes: payload.into(),
        };
        writer.write_sample(VIDEO_TRACK_ID, &sample)?;
        self.frames_written += 1;

        Ok(())
    }

    /// Write the MP4 trailer; later calls are no-ops
    pub fn close(&mut self) -> Result<(), RecorderError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };

        writer.write_end()?;
        tracing::info!(
            "Recording closed: {} ({} frames)",
            self.path.display(),
            self.frames_written
        );
        Ok(())
    }
}

impl OutputSink for Mp4Recorder {
    fn write_frame(&mut self, frame: &RgbImage) -> anyhow::Result<()> {
        self.encode(frame)?;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.close()?;
        Ok(())
    }
}

impl Drop for Mp4Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!("Failed to close recording {}: {}", self.path.display(), e);
        }
    }
}

/// Drop an Annex B start code (`00 00 01` or `00 00 00 01`) if present
fn strip_start_code(unit: &[u8]) -> &[u8] {
    if unit.starts_with(&[0, 0, 0, 1]) {
        &unit[4..]
    } else if unit.starts_with(&[0, 0, 1]) {
        &unit[3..]
    } else {
        unit
    }
}

fn nal_type(unit: &[u8]) -> Option<u8> {
    unit.first().map(|header| header & 0x1F)
}

/// Join NAL units as 4-byte big-endian length + payload, as MP4 samples expect
fn length_prefixed<'a>(units: impl Iterator<Item = &'a Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&(unit.len() as u32).to_be_bytes());
        out.extend_from_slice(unit);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn start_codes_are_stripped() {
        assert_eq!(strip_start_code(&[0, 0, 0, 1, 0x67, 1]), &[0x67, 1]);
        assert_eq!(strip_start_code(&[0, 0, 1, 0x68]), &[0x68]);
        assert_eq!(strip_start_code(&[0x65, 0, 0, 1]), &[0x65, 0, 0, 1]);
    }

    #[test]
    fn nal_type_reads_low_five_bits() {
        assert_eq!(nal_type(&[0x67]), Some(NAL_SPS));
        assert_eq!(nal_type(&[0x68]), Some(NAL_PPS));
        assert_eq!(nal_type(&[0x65, 0x88]), Some(NAL_IDR));
        assert_eq!(nal_type(&[]), None);
    }

    #[test]
    fn units_are_length_prefixed() {
        let units = [vec![0x65, 1, 2], vec![0x41]];

        let joined = length_prefixed(units.iter());

        assert_eq!(joined, vec![0, 0, 0, 3, 0x65, 1, 2, 0, 0, 0, 1, 0x41]);
    }

    #[test]
    fn zero_sized_recording_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let result = Mp4Recorder::create(dir.path().join("out.mp4"), 1, 480, 20);

        assert!(matches!(result, Err(RecorderError::InvalidSize(1, 480))));
    }

    #[test]
    fn records_fixed_rate_mp4() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_OUTPUT_FILE);
        let mut recorder = Mp4Recorder::create(&path, 65, 49, DEFAULT_RECORD_FPS).unwrap();
        assert_eq!(recorder.resolution(), (64, 48));

        for i in 0..5u8 {
            let frame = RgbImage::from_pixel(65, 49, Rgb([i * 40, 100, 200 - i * 20]));
            recorder.write_frame(&frame).unwrap();
        }
        recorder.finish().unwrap();
        recorder.finish().unwrap();

        let file = File::open(&path).unwrap();
        let size = file.metadata().unwrap().len();
        let mut reader = mp4::Mp4Reader::read_header(std::io::BufReader::new(file), size).unwrap();

        let track = &reader.tracks()[&VIDEO_TRACK_ID];
        assert_eq!(track.timescale(), TIMESCALE);
        assert_eq!((track.width(), track.height()), (64, 48));
        assert_eq!(track.trak.mdia.mdhd.duration, 5 * 4500);
        assert_eq!(reader.sample_count(VIDEO_TRACK_ID).unwrap(), 5);

        for id in 1..=5 {
            let sample = reader.read_sample(VIDEO_TRACK_ID, id).unwrap().unwrap();
            assert_eq!(sample.duration, TIMESCALE / DEFAULT_RECORD_FPS);
            assert_eq!(sample.start_time, (id as u64 - 1) * 4500);
        }
        let first = reader.read_sample(VIDEO_TRACK_ID, 1).unwrap().unwrap();
        assert!(first.is_sync);
    }
}
