// src/associator.rs
//
// Greedy IoU identity association between the previous frame's track boxes
// and the current frame's detections. Deliberately greedy rather than an
// optimal bipartite assignment: subjects in the target scenes are sparse
// and well separated, and the greedy policy keeps matching deterministic.
// Known limitation: two subjects crossing at close range can swap ids.

use crate::geometry::iou;
use std::collections::{BTreeMap, HashMap};

/// Match previous track boxes to current detections by maximal IoU.
///
/// Tracks are visited in ascending id order; detections in index order. The
/// first detection achieving the running maximum wins ties, and a match is
/// committed only when its IoU strictly exceeds `iou_threshold`. Each
/// detection is consumed by at most one track. Unmatched detections are left
/// for the caller to open new tracks.
pub fn match_tracks(
    prev_boxes: &BTreeMap<u64, [f32; 4]>,
    curr_boxes: &[[f32; 4]],
    iou_threshold: f32,
) -> HashMap<u64, usize> {
    let mut matches: HashMap<u64, usize> = HashMap::new();
    let mut used = vec![false; curr_boxes.len()];

    for (&track_id, prev_box) in prev_boxes {
        let mut best_iou = 0.0f32;
        let mut best_idx: Option<usize> = None;

        for (idx, curr_box) in curr_boxes.iter().enumerate() {
            if used[idx] {
                continue;
            }
            let overlap = iou(prev_box, curr_box);
            if overlap > best_iou {
                best_iou = overlap;
                best_idx = Some(idx);
            }
        }

        if best_iou > iou_threshold {
            if let Some(idx) = best_idx {
                matches.insert(track_id, idx);
                used[idx] = true;
            }
        }
    }

    matches
}
