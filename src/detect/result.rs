use serde::{Deserialize, Serialize};

use crate::BoundingBox;

/// One observed subject in one frame, before identity assignment.
///
/// Created fresh on every inference call and never mutated; the tracker folds
/// detections into [`crate::track::TrackedDetection`] values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    /// Box in source-frame pixel coordinates.
    pub bbox: BoundingBox,
    /// Detected object class.
    pub class: ObjectClass,
    /// Confidence score in 0..=1.
    pub score: f32,
}

impl Detection {
    pub fn person(bbox: BoundingBox, score: f32) -> Self {
        Self {
            bbox,
            class: ObjectClass::Person,
            score,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class == ObjectClass::Person
    }
}

/// Object classes the engine distinguishes. Only `Person` survives the
/// session controller's class filter; everything else is discarded before
/// reaching the tracker.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectClass {
    Person,
    Vehicle,
    Animal,
    #[default]
    Unknown,
}

impl ObjectClass {
    /// Map a model-reported label onto an engine class.
    pub fn from_label(label: &str) -> Self {
        match label {
            "person" => ObjectClass::Person,
            "car" | "truck" | "bus" | "bicycle" | "motorcycle" => ObjectClass::Vehicle,
            "dog" | "cat" | "bird" | "horse" => ObjectClass::Animal,
            _ => ObjectClass::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectClass::Person => "person",
            ObjectClass::Vehicle => "vehicle",
            ObjectClass::Animal => "animal",
            ObjectClass::Unknown => "unknown",
        }
    }
}
