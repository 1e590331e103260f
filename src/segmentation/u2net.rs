use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationModel};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// Default square input of the U²-Net family (u2net, u2netp, silueta)
pub const DEFAULT_INPUT_SIZE: u32 = 320;

/// U²-Net salient object segmentation model
///
/// Stateless: every frame is segmented on its own.
pub struct U2Net {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,
}

impl U2Net {
    /// Load a U²-Net ONNX model with a square `input_size` input
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let path = model_path.as_ref();

        if !path.exists() {
            bail!("Model file not found: {}", path.display());
        }

        tracing::info!("Loading U2Net model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("U2Net model loaded from {}", path.display());

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(input_size, input_size),
            width: input_size,
            height: input_size,
        })
    }
}

impl SegmentationModel for U2Net {
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
        let _span = tracing::debug_span!("u2net_segment").entered();

        let input_tensor = self.preprocessor.preprocess(frame);

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input_tensor.view())?])
            .context("Failed to run inference")?;
        drop(_infer_span);

        // First output is the fused side output d0, shape [1, 1, H, W]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract prediction")?;

        if shape.len() != 4 {
            bail!("Unexpected prediction shape {:?}", shape);
        }
        let pred_height = shape[2] as u32;
        let pred_width = shape[3] as u32;

        let (frame_width, frame_height) = frame.dimensions();
        Preprocessor::postprocess(data, pred_width, pred_height, frame_width, frame_height)
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
