use anyhow::Result;

use crate::detect::result::Detection;

/// Inference backend trait.
///
/// A backend wraps one pretrained object-detection model. The engine owns the
/// policy around it (one load per session, terminal load failure, skip-frame
/// on transient detect errors); implementations own only the inference math.
///
/// Implementations must treat the pixel slice as read-only and ephemeral and
/// must not retain it beyond the `detect` call.
pub trait InferenceBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Human-readable model variant (e.g. "coco-ssd/lite_mobilenet_v2").
    fn variant(&self) -> &str;

    /// Load the model. Called at most once per session by [`super::ModelHandle`].
    ///
    /// `progress` receives a monotonically increasing percentage estimate in
    /// 0..=100; backends with no meaningful intermediate stages may report
    /// only 100.
    fn load(&mut self, progress: &mut dyn FnMut(u8)) -> Result<()>;

    /// Run detection on one RGB8 frame.
    ///
    /// Returns at most `max_results` detections with `score >= score_threshold`,
    /// boxes in source-frame pixel coordinates. May fail transiently; the
    /// session controller logs and skips the frame.
    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        max_results: usize,
        score_threshold: f32,
    ) -> Result<Vec<Detection>>;
}
