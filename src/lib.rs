//! Pedwatch Detection Engine
//!
//! This crate implements the in-process core of a pedestrian video analysis
//! session: a per-frame inference loop over a playable video source, greedy
//! IoU identity tracking, running statistics, a synchronized visual overlay,
//! and a delimited-text result export.
//!
//! # Architecture
//!
//! The session controller is the orchestrator. Per iteration it:
//!
//! 1. Captures the current frame from a [`video::FrameSource`] into a shared
//!    pixel buffer sized to the source's natural dimensions.
//! 2. Runs the [`detect::InferenceBackend`] on that buffer.
//! 3. Filters detections to the person class.
//! 4. Derives stable identities with the [`track::IouTracker`].
//! 5. Appends a [`results::FrameResult`] and updates aggregate counters.
//! 6. Redraws the [`overlay::OverlayRenderer`] surface.
//!
//! Everything is single-threaded and cooperative: the caller schedules
//! [`session::SessionController::tick`] once per display tick while the
//! session is processing, so pausing or resetting cancels the next iteration
//! synchronously.
//!
//! # Module Structure
//!
//! - `video`: frame sources (synthetic clips, local files) and the shared pixel buffer
//! - `detect`: inference backend trait, model load policy, backends
//! - `track`: greedy IoU identity tracker
//! - `session`: the state machine driving the per-frame loop
//! - `overlay`: boxes/labels/trails/HUD rendering onto an RGBA surface
//! - `results`: append-only frame log and CSV export
//! - `config`: engine configuration (file + environment)

use serde::{Deserialize, Serialize};

pub mod config;
pub mod detect;
pub mod overlay;
pub mod results;
pub mod session;
pub mod track;
pub mod video;

pub use detect::{Detection, InferenceBackend, ModelHandle, ModelStatus, ObjectClass};
pub use overlay::{OverlayRenderer, OverlayToggles, TRAIL_CAP};
pub use results::{FrameResult, ResultLog};
pub use session::{SessionController, SessionState, SessionStats};
pub use track::{IouTracker, TrackedDetection};
pub use video::{FrameSource, PixelBuffer, SyntheticClipSource};

/// Axis-aligned bounding box in source-frame pixel coordinates (not
/// normalized). Origin is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    /// Bottom-center anchor point. Trails use this so the motion path tracks
    /// a subject's feet rather than their torso.
    pub fn bottom_center(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h)
    }

    /// Intersection-over-Union with another box.
    ///
    /// Intersection area divided by (areaA + areaB - intersection); zero when
    /// the boxes do not overlap or the union is degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}
