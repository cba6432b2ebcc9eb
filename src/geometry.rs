// src/geometry.rs
//
// Pure signal utilities: box geometry, torso tilt from COCO keypoints,
// first-difference vertical motion, IoU. No state lives here.

use crate::types::KeypointMap;

// COCO skeletal indices for the torso quad
const LEFT_SHOULDER: usize = 5;
const RIGHT_SHOULDER: usize = 6;
const LEFT_HIP: usize = 11;
const RIGHT_HIP: usize = 12;

/// Height/width of a box, each dimension floored at 1 px so degenerate
/// detections never divide by zero.
pub fn aspect_ratio(bbox: &[f32; 4]) -> f32 {
    let w = (bbox[2] - bbox[0]).max(1.0);
    let h = (bbox[3] - bbox[1]).max(1.0);
    h / w
}

/// Torso tilt in degrees from vertical, estimated from the shoulder and hip
/// midpoints. Returns `None` when any of the four torso joints was dropped
/// by the upstream confidence filter. A purely horizontal torso (dy == 0)
/// is defined as 90°.
pub fn torso_angle(keypoints: &KeypointMap) -> Option<f32> {
    let ls = keypoints.get(&LEFT_SHOULDER)?;
    let rs = keypoints.get(&RIGHT_SHOULDER)?;
    let lh = keypoints.get(&LEFT_HIP)?;
    let rh = keypoints.get(&RIGHT_HIP)?;

    let sx = (ls.0 + rs.0) / 2.0;
    let sy = (ls.1 + rs.1) / 2.0;
    let hx = (lh.0 + rh.0) / 2.0;
    let hy = (lh.1 + rh.1) / 2.0;

    let dx = hx - sx;
    let dy = hy - sy;

    if dy == 0.0 {
        return Some(90.0);
    }
    Some((dx / dy).atan().to_degrees().abs())
}

/// First difference of vertical position. Positive = moving down the frame.
pub fn vertical_velocity(prev_y: f32, curr_y: f32) -> f32 {
    curr_y - prev_y
}

/// First difference of vertical velocity. Unsmoothed.
pub fn vertical_acceleration(prev_v: f32, curr_v: f32) -> f32 {
    curr_v - prev_v
}

/// Standard intersection-over-union. Degenerate boxes contribute zero area,
/// so disjoint or inverted inputs yield 0.0 rather than artifacts.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Coarse human filter: enough confident joints survived upstream filtering.
/// Rejects mannequins and severely occluded detections.
pub fn is_valid_human_pose(keypoints: &KeypointMap, min_points: usize) -> bool {
    keypoints.len() >= min_points
}
