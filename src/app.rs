//! Main window
//!
//! Background picker, camera and blur selection, live preview, and the
//! start / stop / capture controls.

use crate::capture::CameraInfo;
use crate::compositing::{BlurLevel, CompositeSettings};
use crate::config::AppConfig;
use crate::output::{save_snapshot, SnapshotError};
use crate::session::{CaptureSession, SessionConfig, SessionEvent, SessionState, SharedState};
use chrono::Local;
use eframe::egui::{self, ColorImage, TextureHandle, TextureOptions};
use image::RgbImage;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

pub const WINDOW_TITLE: &str = "Background Selector with Blur";
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "tiff"];

pub struct BackdropApp {
    config: AppConfig,
    cameras: Vec<CameraInfo>,
    selected_camera: u32,
    shared: SharedState,
    image_label: String,
    state: SessionState,
    session: Option<CaptureSession>,
    preview: Option<TextureHandle>,
    session_frames: u64,
    last_error: Option<String>,
}

impl BackdropApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: AppConfig, cameras: Vec<CameraInfo>) -> Self {
        tracing::info!("Initializing main window");
        Self::with_cameras(config, cameras)
    }

    fn with_cameras(config: AppConfig, cameras: Vec<CameraInfo>) -> Self {
        let selected_camera = if cameras.is_empty()
            || cameras.iter().any(|c| c.index == config.camera_index)
        {
            config.camera_index
        } else {
            cameras[0].index
        };

        let mut app = Self {
            shared: SharedState {
                settings: Arc::new(Mutex::new(CompositeSettings {
                    background: None,
                    blur: config.blur,
                })),
                latest_frame: Arc::default(),
            },
            config,
            cameras,
            selected_camera,
            image_label: "No image selected.".to_string(),
            state: SessionState::Idle,
            session: None,
            preview: None,
            session_frames: 0,
            last_error: None,
        };

        if let Some(path) = app.config.background.clone() {
            app.select_background(Some(path));
        }
        app
    }

    /// Worker configuration for the current selection
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            camera_index: self.selected_camera,
            model_path: self.config.model_path.clone(),
            model_input_size: self.config.model_input_size,
            output_path: self.config.output_path.clone(),
            record_fps: self.config.record_fps,
        }
    }

    fn select_camera(&mut self, index: u32) {
        if self.selected_camera != index {
            tracing::info!("Camera {} selected", index);
            self.selected_camera = index;
        }
    }

    /// Apply the outcome of the file dialog; cancelling clears the background
    fn select_background(&mut self, path: Option<PathBuf>) {
        let mut settings = self.shared.settings.lock();
        settings.background = path;

        self.image_label = match settings.valid_background() {
            Some(path) => {
                tracing::info!("Background selected: {}", path.display());
                format!("Selected Image: {}", path.display())
            }
            None => "No valid background image selected.".to_string(),
        };
    }

    fn blur(&self) -> BlurLevel {
        self.shared.settings.lock().blur
    }

    fn set_blur(&mut self, blur: BlurLevel) {
        let mut settings = self.shared.settings.lock();
        if settings.blur != blur {
            tracing::info!("Blur level set to {}", blur);
            settings.blur = blur;
        }
    }

    fn start_session(&mut self, ctx: &egui::Context) {
        if self.state != SessionState::Idle {
            tracing::debug!("Start ignored while {:?}", self.state);
            return;
        }

        let repaint = ctx.clone();
        match CaptureSession::start(self.session_config(), self.shared.clone(), move || {
            repaint.request_repaint()
        }) {
            Ok(session) => {
                self.session = Some(session);
                self.state = SessionState::Running;
                self.session_frames = 0;
                self.last_error = None;
            }
            Err(e) => {
                tracing::error!("Failed to start capture session: {:#}", e);
                self.last_error = Some(format!("{e:#}"));
            }
        }
    }

    fn stop_session(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        if let Some(session) = &self.session {
            tracing::info!("Stopping capture session");
            session.stop();
            self.state = SessionState::Stopping;
        }
    }

    /// Drain worker events; returns the newest frame received, if any
    fn poll_session(&mut self) -> Option<Arc<RgbImage>> {
        let events: Vec<SessionEvent> = match &self.session {
            Some(session) => session.events().try_iter().collect(),
            None => return None,
        };

        let mut newest = None;
        for event in events {
            match event {
                SessionEvent::Frame(frame) => {
                    self.session_frames += 1;
                    newest = Some(frame);
                }
                SessionEvent::Finished { frames, error } => {
                    tracing::info!("Capture session finished ({} frames)", frames);
                    self.last_error = error;
                    self.state = SessionState::Idle;
                    if let Some(mut session) = self.session.take() {
                        session.join();
                    }
                }
            }
        }
        newest
    }

    /// Save the newest composited frame, which may be newer than the preview
    fn capture_snapshot(&self) -> Result<PathBuf, SnapshotError> {
        let frame = self.shared.latest_frame.lock().clone();
        save_snapshot(&self.config.snapshot_dir, frame.as_deref(), &Local::now())
    }

    fn capture_image(&self) {
        match self.capture_snapshot() {
            Ok(path) => show_message(
                rfd::MessageLevel::Info,
                "Image Saved",
                &format!("Image has been saved as '{}'.", path.display()),
            ),
            Err(SnapshotError::NoFrame) => show_message(
                rfd::MessageLevel::Warning,
                "No Frame",
                "No processed frame available to capture.",
            ),
            Err(e) => {
                tracing::error!("Snapshot failed: {}", e);
                show_message(rfd::MessageLevel::Error, "Capture Failed", &e.to_string());
            }
        }
    }

    fn update_preview(&mut self, ctx: &egui::Context, frame: &RgbImage) {
        let size = [frame.width() as usize, frame.height() as usize];
        let image = ColorImage::from_rgb(size, frame.as_raw());

        match &mut self.preview {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                self.preview = Some(ctx.load_texture("preview", image, TextureOptions::LINEAR));
            }
        }
    }

    fn controls(&mut self, ui: &mut egui::Ui) {
        if ui.button("Select Background Image").clicked() {
            let picked = rfd::FileDialog::new()
                .set_title("Select a Background Image")
                .add_filter("Image Files", &IMAGE_EXTENSIONS)
                .pick_file();
            self.select_background(picked);
        }
        ui.label(&self.image_label);

        ui.add_space(4.0);
        ui.label("Select Camera:");
        let camera_text = format!("Camera {}", self.selected_camera);
        let mut selected_camera = self.selected_camera;
        ui.add_enabled_ui(self.state == SessionState::Idle, |ui| {
            egui::ComboBox::from_id_source("camera_selector")
                .selected_text(camera_text)
                .show_ui(ui, |ui| {
                    for camera in &self.cameras {
                        ui.selectable_value(&mut selected_camera, camera.index, camera.name.as_str());
                    }
                });
        });
        if self.cameras.is_empty() {
            ui.label("No cameras detected.");
        }
        self.select_camera(selected_camera);

        ui.add_space(4.0);
        ui.label("Select Blur Level:");
        let mut blur = self.blur();
        egui::ComboBox::from_id_source("blur_level")
            .selected_text(blur.to_string())
            .show_ui(ui, |ui| {
                for level in BlurLevel::ALL {
                    ui.selectable_value(&mut blur, level, level.to_string());
                }
            });
        self.set_blur(blur);
    }
}

impl eframe::App for BackdropApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if let Some(frame) = self.poll_session() {
            self.update_preview(ctx, &frame);
        }

        if ctx.input(|i| i.viewport().close_requested()) {
            self.stop_session();
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.controls(ui);

            ui.separator();

            let preview_height = (ui.available_height() - 48.0).max(120.0);
            ui.allocate_ui(egui::vec2(ui.available_width(), preview_height), |ui| {
                match &self.preview {
                    Some(texture) => {
                        ui.add(egui::Image::new(texture).shrink_to_fit());
                    }
                    None => {
                        ui.centered_and_justified(|ui| ui.label("Camera is off"));
                    }
                }
            });

            ui.separator();

            ui.horizontal(|ui| {
                let idle = self.state == SessionState::Idle;
                if ui.add_enabled(idle, egui::Button::new("Start Camera")).clicked() {
                    self.start_session(ctx);
                }
                let running = self.state == SessionState::Running;
                if ui.add_enabled(running, egui::Button::new("Stop Camera")).clicked() {
                    self.stop_session();
                }
                if ui.button("Capture Image").clicked() {
                    self.capture_image();
                }

                ui.separator();
                match (&self.state, &self.last_error) {
                    (SessionState::Idle, Some(error)) => {
                        ui.colored_label(egui::Color32::LIGHT_RED, error.as_str());
                    }
                    (state, _) => {
                        ui.label(format!("{:?} | frames: {}", state, self.session_frames));
                    }
                }
            });
        });
    }
}

impl Drop for BackdropApp {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            if session.is_running() {
                tracing::info!("Window closing, stopping capture session");
            }
            session.join();
        }
    }
}

fn show_message(level: rfd::MessageLevel, title: &str, description: &str) {
    let _ = rfd::MessageDialog::new()
        .set_level(level)
        .set_title(title)
        .set_description(description)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}
