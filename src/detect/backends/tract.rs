#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::InferenceBackend;
use crate::detect::result::{Detection, ObjectClass};
use crate::BoundingBox;

/// Tract-based backend for ONNX object detection.
///
/// Loads a local model file and performs inference on RGB frames. No network
/// I/O; the model file must already be on disk. Output decoding assumes an
/// SSD-style layout: one row per candidate holding normalized
/// `[ymin, xmin, ymax, xmax, score, class]`.
pub struct TractBackend {
    model_path: std::path::PathBuf,
    model: Option<SimplePlan<TypedFact, Box<dyn TypedOp>>>,
    width: u32,
    height: u32,
    labels: Vec<String>,
}

impl TractBackend {
    /// Prepare a backend for a model on disk. The model is not read until
    /// `load` runs.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            model: None,
            width,
            height,
            labels: Vec::new(),
        }
    }

    /// Class labels indexed by the model's class id output.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn class_for(&self, class_id: usize) -> ObjectClass {
        match self.labels.get(class_id) {
            Some(label) => ObjectClass::from_label(label),
            None => ObjectClass::Unknown,
        }
    }

    fn decode_outputs(
        &self,
        outputs: TVec<TValue>,
        frame_width: u32,
        frame_height: u32,
        max_results: usize,
        score_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let flat = view
            .as_slice()
            .ok_or_else(|| anyhow!("model output tensor was not contiguous"))?;
        if flat.len() % 6 != 0 {
            return Err(anyhow!("model output was not a [N, 6] candidate list"));
        }

        let mut detections = Vec::new();
        for row in flat.chunks_exact(6) {
            let score = row[4];
            if score < score_threshold {
                continue;
            }
            let ymin = row[0].clamp(0.0, 1.0) * frame_height as f32;
            let xmin = row[1].clamp(0.0, 1.0) * frame_width as f32;
            let ymax = row[2].clamp(0.0, 1.0) * frame_height as f32;
            let xmax = row[3].clamp(0.0, 1.0) * frame_width as f32;
            detections.push(Detection {
                bbox: BoundingBox::new(xmin, ymin, xmax - xmin, ymax - ymin),
                class: self.class_for(row[5] as usize),
                score,
            });
            if detections.len() == max_results {
                break;
            }
        }
        Ok(detections)
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn variant(&self) -> &str {
        self.model_path.to_str().unwrap_or("onnx")
    }

    fn load(&mut self, progress: &mut dyn FnMut(u8)) -> Result<()> {
        progress(10);
        let model = tract_onnx::onnx()
            .model_for_path(&self.model_path)
            .with_context(|| {
                format!("failed to load ONNX model from {}", self.model_path.display())
            })?;
        progress(40);
        let model = model
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, self.height as usize, self.width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?;
        progress(80);
        self.model = Some(
            model
                .into_runnable()
                .context("failed to build runnable ONNX model")?,
        );
        progress(100);
        Ok(())
    }

    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        max_results: usize,
        score_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| anyhow!("tract backend used before load"))?;
        let outputs = model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode_outputs(outputs, width, height, max_results, score_threshold)
    }
}
