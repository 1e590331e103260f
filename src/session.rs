//! Capture session worker
//!
//! One worker thread per session owns the camera, the model and the recorder.
//! It publishes every composited frame to a shared slot, offers previews and
//! its own end to the UI over a channel, and stops when the UI clears a
//! shared flag, which the loop checks at the top of every iteration.

use crate::capture::{CaptureSource, WebcamCapture};
use crate::compositing::{CompositeSettings, Compositor};
use crate::output::{Mp4Recorder, NullSink, OutputSink};
use crate::segmentation::{self, SegmentationModel};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::RgbImage;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Frames the UI may fall behind before previews are dropped
const EVENT_CAPACITY: usize = 8;
const STATS_INTERVAL: u64 = 30;

/// Lifecycle of the capture session as seen by the UI
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    /// Stop requested, waiting for the worker to notice
    Stopping,
}

/// State the UI and the worker both hold
#[derive(Clone, Default)]
pub struct SharedState {
    pub settings: Arc<Mutex<CompositeSettings>>,
    /// Newest composited frame, kept after the session ends
    pub latest_frame: Arc<Mutex<Option<Arc<RgbImage>>>>,
}

/// Messages from the worker to the UI
#[derive(Debug)]
pub enum SessionEvent {
    Frame(Arc<RgbImage>),
    /// The worker has exited and released its devices
    Finished { frames: u64, error: Option<String> },
}

/// Everything the worker needs to open its devices
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub camera_index: u32,
    pub model_path: PathBuf,
    pub model_input_size: u32,
    /// `None` disables recording
    pub output_path: Option<PathBuf>,
    pub record_fps: u32,
}

/// Devices owned by one session
pub struct Pipeline {
    pub capture: Box<dyn CaptureSource>,
    pub model: Box<dyn SegmentationModel>,
    pub output: Box<dyn OutputSink>,
}

impl Pipeline {
    /// Open camera, model and recorder for `config`
    pub fn open(config: &SessionConfig) -> Result<Self> {
        let capture = WebcamCapture::open(config.camera_index)
            .context("Could not access the camera")?;
        let (width, height) = capture.resolution();

        let model = segmentation::load_model(&config.model_path, config.model_input_size)
            .context("Failed to load segmentation model")?;

        let output: Box<dyn OutputSink> = match &config.output_path {
            Some(path) => Box::new(
                Mp4Recorder::create(path, width, height, config.record_fps)
                    .context("Failed to open video writer")?,
            ),
            None => {
                tracing::info!("Recording disabled");
                Box::new(NullSink::new(width, height))
            }
        };

        let (out_width, out_height) = output.resolution();
        tracing::info!(
            "Pipeline ready: camera {}x{}, output {}x{}",
            width,
            height,
            out_width,
            out_height
        );

        Ok(Self {
            capture: Box::new(capture),
            model,
            output,
        })
    }
}

/// Handle to a running capture worker
pub struct CaptureSession {
    running: Arc<AtomicBool>,
    events: Receiver<SessionEvent>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Start a worker that opens real devices from `config`
    pub fn start<N>(
        config: SessionConfig,
        shared: SharedState,
        notify: N,
    ) -> Result<Self>
    where
        N: Fn() + Send + 'static,
    {
        tracing::info!("Starting capture session on camera {}", config.camera_index);
        Self::spawn(move || Pipeline::open(&config), shared, notify)
    }

    /// Start a worker that builds its pipeline with `setup` on the worker thread
    pub fn spawn<F, N>(setup: F, shared: SharedState, notify: N) -> Result<Self>
    where
        F: FnOnce() -> Result<Pipeline> + Send + 'static,
        N: Fn() + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let (sender, events) = crossbeam_channel::bounded(EVENT_CAPACITY);

        let running_clone = running.clone();
        let handle = std::thread::Builder::new()
            .name("capture-session".to_string())
            .spawn(move || {
                let (frames, error) = match setup() {
                    Ok(mut pipeline) => {
                        let result = run_pipeline(
                            pipeline.capture.as_mut(),
                            pipeline.model.as_mut(),
                            pipeline.output.as_mut(),
                            &shared,
                            &running_clone,
                            &sender,
                            &notify,
                        );
                        let finished = pipeline
                            .output
                            .finish()
                            .context("Failed to finalize recording");
                        let (frames, error) = match result {
                            Ok(frames) => (frames, None),
                            Err(e) => (e.frames, Some(format!("{:#}", e.source))),
                        };
                        match (error, finished) {
                            (error, Ok(())) => (frames, error),
                            (None, Err(e)) => (frames, Some(format!("{e:#}"))),
                            (Some(first), Err(e)) => (frames, Some(format!("{first}; {e:#}"))),
                        }
                    }
                    Err(e) => (0, Some(format!("{e:#}"))),
                };

                if let Some(error) = &error {
                    tracing::error!("Capture session ended: {}", error);
                } else {
                    tracing::info!("Capture session stopped after {} frames", frames);
                }

                running_clone.store(false, Ordering::Release);
                let _ = sender.send(SessionEvent::Finished { frames, error });
                notify();
            })
            .context("Failed to spawn capture thread")?;

        Ok(Self {
            running,
            events,
            handle: Some(handle),
        })
    }

    /// Ask the worker to stop after the frame it is working on
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Stop and wait for the worker to release its devices
    ///
    /// Pending events are discarded; the receiver is hung up first so a worker
    /// blocked on a full channel returns at once.
    pub fn join(&mut self) {
        self.stop();
        drop(std::mem::replace(&mut self.events, crossbeam_channel::never()));
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.join();
    }
}

/// Failure that ended the loop, with the frames produced before it
#[derive(Debug)]
pub struct LoopError {
    pub frames: u64,
    pub source: anyhow::Error,
}

/// Per-frame loop: read, remove background, composite, record, publish
///
/// Returns the number of frames produced when stopped through `running` or
/// when the UI hangs up. Any capture, model or output failure ends the loop.
pub fn run_pipeline<C, M, O>(
    capture: &mut C,
    model: &mut M,
    output: &mut O,
    shared: &SharedState,
    running: &AtomicBool,
    events: &Sender<SessionEvent>,
    notify: &dyn Fn(),
) -> Result<u64, LoopError>
where
    C: CaptureSource + ?Sized,
    M: SegmentationModel + ?Sized,
    O: OutputSink + ?Sized,
{
    let mut compositor = Compositor::new();
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_segment_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    let fail = |frames: u64, source: anyhow::Error| LoopError { frames, source };

    tracing::info!("Starting capture loop");

    while running.load(Ordering::Acquire) {
        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Could not read frame from camera")
            .map_err(|e| fail(frame_count, e))?;
        total_capture_time += capture_start.elapsed();

        let segment_start = Instant::now();
        let cutout = model
            .remove_background(&frame)
            .context("Background removal failed")
            .map_err(|e| fail(frame_count, e))?;
        total_segment_time += segment_start.elapsed();

        let output_start = Instant::now();
        let current = shared.settings.lock().clone();
        let composited = compositor.composite(&frame, &cutout, &current);
        output
            .write_frame(&composited)
            .context("Failed to write frame")
            .map_err(|e| fail(frame_count, e))?;
        total_output_time += output_start.elapsed();

        frame_count += 1;

        let composited = Arc::new(composited);
        *shared.latest_frame.lock() = Some(composited.clone());

        match events.try_send(SessionEvent::Frame(composited)) {
            Ok(()) => notify(),
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Preview is behind, dropping frame {}", frame_count);
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::info!("Preview closed, ending capture loop");
                break;
            }
        }

        if frame_count % STATS_INTERVAL == 0 {
            let avg_capture_ms = total_capture_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_segment_ms = total_segment_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_output_ms = total_output_time.as_secs_f64() * 1000.0 / frame_count as f64;
            let total_ms = avg_capture_ms + avg_segment_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, segment={:.1}ms, composite+write={:.1}ms, total={:.1}ms, fps={:.1}",
                frame_count,
                avg_capture_ms,
                avg_segment_ms,
                avg_output_ms,
                total_ms,
                1000.0 / total_ms
            );
        }
    }

    Ok(frame_count)
}
