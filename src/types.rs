// src/types.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Keypoint map for one detection: COCO joint index → (x, y) pixels.
/// Only joints above the upstream pose-confidence threshold are present.
pub type KeypointMap = HashMap<usize, (f32, f32)>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub tracking: TrackingConfig,
    pub evidence: EvidenceConfig,
    pub fall: FallConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum detector confidence to accept a box
    pub min_confidence: f32,
    /// Pose-model confidence threshold, applied by the upstream collaborator
    pub pose_confidence: f32,
    /// Minimum bbox area as a fraction of the frame area
    pub min_area_ratio: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            pose_confidence: 0.5,
            min_area_ratio: 0.01,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Minimum IoU to match a detection to an existing track
    pub iou_threshold: f32,
    /// Consecutive missed frames before a track is evicted
    pub max_missing: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_missing: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    /// Torso tilt (degrees) above which posture counts as collapsed
    pub angle_threshold: f32,
    /// Aspect ratio (h/w) below which the body reads wider than tall
    pub ratio_threshold: f32,
    /// Vertical speed (px/frame) above which motion counts as a spike
    pub velocity_threshold: f32,
    /// Vertical acceleration (px/frame²) above which motion counts as a spike
    pub acceleration_threshold: f32,
    /// Frame-to-frame center/angle delta above which the track is unstable
    pub variance_threshold: f32,
    /// Fraction of frame height below which a subject is near the ground
    pub ground_ratio: f32,
    /// Looser ground fraction for subjects occluded mid-fall
    pub occluded_ground_ratio: f32,
    /// Occluded frames required before the hidden-fall verdict applies
    pub min_occlusion_frames: u32,
    /// Confident keypoints required to validate a detection as human
    pub min_keypoints: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            angle_threshold: 45.0,
            ratio_threshold: 1.0,
            velocity_threshold: 25.0,
            acceleration_threshold: 20.0,
            variance_threshold: 5.0,
            ground_ratio: 0.75,
            occluded_ground_ratio: 0.65,
            min_occlusion_frames: 5,
            min_keypoints: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallConfig {
    /// Accumulated votes required to confirm falling → fallen
    pub confirm_frames: u32,
}

impl Default for FallConfig {
    fn default() -> Self {
        Self { confirm_frames: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Input detection for one frame. Adapt from your detector/pose output.
/// `bbox` is `[x1, y1, x2, y2]` in pixels; `keypoints` may be empty when the
/// pose model produced nothing for this box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f32; 4],
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub keypoints: KeypointMap,
}

fn default_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0) * (self.bbox[3] - self.bbox[1]).max(0.0)
    }
}

/// Fall lifecycle of a tracked subject. Progression is strictly forward:
/// Standing → Falling → Fallen. `Occluded` is reserved for a dedicated
/// occlusion state and is not yet produced by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallState {
    Standing,
    Falling,
    Occluded,
    Fallen,
}

impl FallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standing => "STANDING",
            Self::Falling => "FALLING",
            Self::Occluded => "OCCLUDED",
            Self::Fallen => "FALLEN",
        }
    }
}

/// Per-frame output for one visible, human-validated track. This is what the
/// rendering/output collaborator consumes.
#[derive(Debug, Clone, Serialize)]
pub struct TrackView {
    pub id: u64,
    pub bbox: [f32; 4],
    pub state: FallState,
    pub fall_detected: bool,
}

impl TrackView {
    pub fn label(&self) -> &'static str {
        self.state.as_str()
    }
}

/// One frame of the offline JSONL replay format (one record per line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}
