// src/pipeline.rs
//
// Per-frame orchestration. The order is load-bearing: associate against the
// previous frame's boxes, fold detections into track memory, age everything
// unmatched, then run evidence + the state machine over every live track,
// occluded ones included, since that is where hidden falls are caught.
// Rendering output is produced last, from fully-updated state.

use crate::associator::match_tracks;
use crate::evidence;
use crate::state_machine::FallStateMachine;
use crate::track::TrackStore;
use crate::types::{Config, Detection, TrackView};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

pub struct FallPipeline {
    config: Config,
    store: TrackStore,
    fsm: FallStateMachine,
    /// Boxes of tracks that were visible last frame, keyed by track id.
    /// This is the association baseline for the next frame
    prev_boxes: BTreeMap<u64, [f32; 4]>,
    frame_w: f32,
    frame_h: f32,
    frame_id: u64,
}

impl FallPipeline {
    pub fn new(config: Config, frame_w: f32, frame_h: f32) -> Self {
        let store = TrackStore::new(config.tracking.max_missing, config.evidence.min_keypoints);
        let fsm = FallStateMachine::new(config.fall.confirm_frames);
        Self {
            config,
            store,
            fsm,
            prev_boxes: BTreeMap::new(),
            frame_w,
            frame_h,
            frame_id: 0,
        }
    }

    /// Process one frame of detections. Returns a view per visible track
    /// that has been validated as human, in ascending id order.
    pub fn process_frame(&mut self, detections: &[Detection]) -> Vec<TrackView> {
        self.frame_id += 1;
        let frame_area = self.frame_w * self.frame_h;

        // Gate on confidence and on-frame footprint
        let valid: Vec<&Detection> = detections
            .iter()
            .filter(|d| {
                d.confidence >= self.config.detection.min_confidence
                    && d.area() / frame_area > self.config.detection.min_area_ratio
            })
            .collect();

        let curr_boxes: Vec<[f32; 4]> = valid.iter().map(|d| d.bbox).collect();

        // Identity association against last frame's visible boxes
        let matches = match_tracks(
            &self.prev_boxes,
            &curr_boxes,
            self.config.tracking.iou_threshold,
        );
        let matched_by_det: HashMap<usize, u64> =
            matches.iter().map(|(&tid, &idx)| (idx, tid)).collect();

        // Fold each detection into its track; unmatched ones open new tracks
        let mut updated_boxes: BTreeMap<u64, [f32; 4]> = BTreeMap::new();
        for (idx, det) in valid.iter().enumerate() {
            let id = match matched_by_det.get(&idx) {
                Some(&tid) => tid,
                None => self.store.allocate_id(),
            };
            self.store.update(id, det.bbox, det.keypoints.clone());
            updated_boxes.insert(id, det.bbox);
        }

        // Everything else ages; long-missing tracks are evicted
        let updated_ids: HashSet<u64> = updated_boxes.keys().copied().collect();
        self.store.age_missing(&updated_ids);

        // Evidence + state machine over every live track
        for id in self.store.ids() {
            if let Some(track) = self.store.get_mut(id) {
                if !track.is_human || track.is_locked() {
                    continue;
                }
                let signals = evidence::analyze(track, self.frame_h, &self.config.evidence);
                self.fsm.advance(track, &signals);
            }
        }

        debug!(
            "Frame {}: {} detections, {} live tracks",
            self.frame_id,
            valid.len(),
            self.store.len()
        );

        // Render views for visible human tracks, then remember this frame's
        // boxes for the next association round
        let mut views = Vec::with_capacity(updated_boxes.len());
        for (&id, &bbox) in &updated_boxes {
            if let Some(track) = self.store.get(id) {
                if !track.is_human {
                    continue;
                }
                views.push(TrackView {
                    id,
                    bbox,
                    state: track.state,
                    fall_detected: track.fall_detected,
                });
            }
        }

        self.prev_boxes = updated_boxes;
        views
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FallConfig, FallState, KeypointMap};
    use std::collections::HashMap;

    const W: f32 = 1000.0;
    const H: f32 = 1000.0;

    fn det(bbox: [f32; 4], keypoints: KeypointMap) -> Detection {
        Detection {
            bbox,
            confidence: 0.9,
            keypoints,
        }
    }

    /// Seven confident joints; torso tilt controlled by (dx, dy).
    fn pose(cx: f32, cy: f32, dx: f32, dy: f32) -> KeypointMap {
        let mut kp = HashMap::new();
        kp.insert(5, (cx, cy - 40.0));
        kp.insert(6, (cx, cy - 40.0));
        kp.insert(11, (cx + dx, cy - 40.0 + dy));
        kp.insert(12, (cx + dx, cy - 40.0 + dy));
        kp.insert(0, (cx, cy - 60.0));
        kp.insert(9, (cx - 20.0, cy));
        kp.insert(10, (cx + 20.0, cy));
        kp
    }

    fn upright(cx: f32, cy: f32) -> KeypointMap {
        pose(cx, cy, 0.0, 50.0)
    }

    fn tilted(cx: f32, cy: f32) -> KeypointMap {
        pose(cx, cy, 80.0, 40.0) // ≈ 63° from vertical
    }

    fn config(confirm_frames: u32) -> Config {
        Config {
            fall: FallConfig { confirm_frames },
            ..Config::default()
        }
    }

    #[test]
    fn test_visible_collapse_is_confirmed_fallen() {
        let mut pipeline = FallPipeline::new(config(3), W, H);

        // Quiet standing: same box, upright pose
        for _ in 0..3 {
            let views = pipeline.process_frame(&[det([400.0, 500.0, 500.0, 700.0], upright(450.0, 600.0))]);
            assert_eq!(views.len(), 1);
            assert_eq!(views[0].state, FallState::Standing);
        }

        // Collapse: box slides down fast with a strongly tilted torso,
        // overlapping enough frame-to-frame to keep its identity
        let fall_frames = [
            [400.0, 540.0, 500.0, 740.0], // cy 640, drop 40
            [400.0, 600.0, 500.0, 800.0], // cy 700, drop 60
            [400.0, 660.0, 500.0, 860.0], // cy 760, past 0.75 x H
        ];
        let mut last = Vec::new();
        for bbox in fall_frames {
            let cy = (bbox[1] + bbox[3]) * 0.5;
            last = pipeline.process_frame(&[det(bbox, tilted(450.0, cy))]);
        }

        assert_eq!(last.len(), 1);
        assert_eq!(last[0].id, 0, "identity survives the whole collapse");
        assert_eq!(last[0].state, FallState::Fallen);
        assert!(last[0].fall_detected);
    }

    #[test]
    fn test_occluded_fall_confirmed_while_hidden() {
        let mut pipeline = FallPipeline::new(config(2), W, H);

        // Standing, then two falling-evidence frames ending at cy = 660:
        // past the occluded ground bar (0.65 × H) but not the visible one
        pipeline.process_frame(&[det([400.0, 400.0, 500.0, 600.0], upright(450.0, 500.0))]);
        pipeline.process_frame(&[det([400.0, 440.0, 500.0, 640.0], tilted(450.0, 540.0))]);
        pipeline.process_frame(&[det([400.0, 500.0, 500.0, 700.0], tilted(450.0, 600.0))]);
        let views = pipeline.process_frame(&[det([400.0, 560.0, 500.0, 760.0], tilted(450.0, 660.0))]);
        assert_eq!(views[0].state, FallState::Falling, "not near ground while visible");

        // Subject drops out of view mid-fall. After five occluded frames the
        // hidden verdict substitutes for near-ground and confirms the fall.
        for _ in 0..4 {
            let views = pipeline.process_frame(&[]);
            assert!(views.is_empty());
            assert_eq!(pipeline.store().get(0).unwrap().state, FallState::Falling);
        }
        pipeline.process_frame(&[]);
        let track = pipeline.store().get(0).unwrap();
        assert_eq!(track.state, FallState::Fallen);
        assert!(track.fall_detected);
    }

    #[test]
    fn test_unvalidated_tracks_are_suppressed() {
        let mut pipeline = FallPipeline::new(config(3), W, H);

        // No keypoints → never validated as human → no output
        for _ in 0..3 {
            let views =
                pipeline.process_frame(&[det([400.0, 500.0, 500.0, 700.0], KeypointMap::new())]);
            assert!(views.is_empty());
        }
        // The track still exists and ages normally; it is only hidden from output
        assert_eq!(pipeline.store().len(), 1);
    }

    #[test]
    fn test_small_detections_filtered_before_tracking() {
        let mut pipeline = FallPipeline::new(config(3), W, H);

        // 50 × 50 px on a 1000 × 1000 frame: 0.25% of the frame, under 1%
        let views = pipeline.process_frame(&[det([0.0, 0.0, 50.0, 50.0], upright(25.0, 25.0))]);
        assert!(views.is_empty());
        assert_eq!(pipeline.store().len(), 0);
    }

    #[test]
    fn test_two_subjects_keep_distinct_identities() {
        let mut pipeline = FallPipeline::new(config(3), W, H);

        for i in 0..5 {
            let y = 300.0 + i as f32;
            let views = pipeline.process_frame(&[
                det([100.0, y, 200.0, y + 200.0], upright(150.0, y + 100.0)),
                det([700.0, y, 800.0, y + 200.0], upright(750.0, y + 100.0)),
            ]);
            assert_eq!(views.len(), 2);
            assert_eq!(views[0].id, 0);
            assert_eq!(views[1].id, 1);
        }
        assert_eq!(pipeline.store().tracks_created(), 2);
    }
}
