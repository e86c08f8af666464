//! Greedy IoU identity tracking.
//!
//! Frame-to-frame identity is assigned by greedy overlap matching against the
//! previous frame only. Each new detection, in input order, inherits the
//! identity of the best still-unassigned previous box whose IoU exceeds the
//! match threshold; otherwise a fresh identity is minted. There is no global
//! assignment pass and no track aging: an identity that misses one frame is
//! gone, and a subject re-entering the scene gets a new number. That keeps
//! the per-frame cost linear in boxes^2 and the behavior easy to reason
//! about for the short clips this engine targets.

use crate::detect::Detection;
use crate::BoundingBox;

/// Minimum IoU for a detection to inherit a previous identity.
pub const MATCH_THRESHOLD: f32 = 0.3;

/// A detection with its assigned identity.
#[derive(Clone, Debug)]
pub struct TrackedDetection {
    pub detection: Detection,
    pub identity: Option<u32>,
}

/// Single-frame-memory identity tracker.
pub struct IouTracker {
    previous: Vec<(BoundingBox, u32)>,
    next_id: u32,
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IouTracker {
    pub fn new() -> Self {
        Self {
            previous: Vec::new(),
            next_id: 1,
        }
    }

    /// Highest identity minted so far, or 0 before any.
    pub fn last_minted(&self) -> u32 {
        self.next_id - 1
    }

    /// Assign identities to one frame of detections and make it the new
    /// previous frame.
    pub fn assign(&mut self, detections: Vec<Detection>) -> Vec<TrackedDetection> {
        let mut assigned = vec![false; self.previous.len()];
        let mut tracked = Vec::with_capacity(detections.len());

        for detection in detections {
            let mut best: Option<(usize, f32)> = None;
            for (index, (prev_box, _)) in self.previous.iter().enumerate() {
                if assigned[index] {
                    continue;
                }
                let iou = detection.bbox.iou(prev_box);
                if iou > MATCH_THRESHOLD && best.map_or(true, |(_, b)| iou > b) {
                    best = Some((index, iou));
                }
            }

            let identity = match best {
                Some((index, _)) => {
                    assigned[index] = true;
                    self.previous[index].1
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                }
            };

            tracked.push(TrackedDetection {
                detection,
                identity: Some(identity),
            });
        }

        self.previous = tracked
            .iter()
            .map(|t| (t.detection.bbox, t.identity.unwrap_or(0)))
            .collect();
        tracked
    }

    /// Forget all identities and restart numbering at 1.
    pub fn reset(&mut self) {
        self.previous.clear();
        self.next_id = 1;
    }
}
