// src/track.rs
//
// Per-subject rolling memory and the track store that owns it.
//
// Every signal window is a bounded VecDeque: append-only from the store's
// update path, oldest sample dropped on overflow. Evidence rules read
// "maximum over the current window", so the drop-oldest policy is part of
// the detection semantics, not just a memory bound.

use crate::geometry::{
    aspect_ratio, is_valid_human_pose, torso_angle, vertical_acceleration, vertical_velocity,
};
use crate::types::{FallState, KeypointMap};
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info};

// Window capacities (frames)
const CENTER_WINDOW: usize = 30;
const HEIGHT_WINDOW: usize = 15;
const RATIO_WINDOW: usize = 15;
const KEYPOINT_WINDOW: usize = 30;
const ANGLE_WINDOW: usize = 10;
const VELOCITY_WINDOW: usize = 10;
const ACCEL_WINDOW: usize = 10;
const STABILITY_WINDOW: usize = 15;

fn push_bounded<T>(window: &mut VecDeque<T>, cap: usize, value: T) {
    window.push_back(value);
    if window.len() > cap {
        window.pop_front();
    }
}

/// Rolling memory for one continuously-associated subject.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,

    // Geometry
    pub centers: VecDeque<(f32, f32)>,
    pub heights: VecDeque<f32>,
    pub aspect_ratios: VecDeque<f32>,

    // Pose
    pub keypoints: VecDeque<KeypointMap>,
    pub body_angles: VecDeque<f32>,

    // Motion, derived from centers. Never written directly
    pub vel_y: VecDeque<f32>,
    pub acc_y: VecDeque<f32>,

    // Stability: consecutive-frame deltas
    pub center_var: VecDeque<f32>,
    pub angle_var: VecDeque<f32>,

    // Scalar state
    pub frames_seen: u64,
    pub missing: u32,
    pub occlusion_frames: u32,
    pub last_seen_y: Option<f32>,
    pub is_human: bool,
    pub state: FallState,
    pub fall_votes: u32,
    pub ground_time: u32,
    pub fall_detected: bool,
    locked: bool,
}

impl Track {
    fn new(id: u64) -> Self {
        Self {
            id,
            centers: VecDeque::with_capacity(CENTER_WINDOW),
            heights: VecDeque::with_capacity(HEIGHT_WINDOW),
            aspect_ratios: VecDeque::with_capacity(RATIO_WINDOW),
            keypoints: VecDeque::with_capacity(KEYPOINT_WINDOW),
            body_angles: VecDeque::with_capacity(ANGLE_WINDOW),
            vel_y: VecDeque::with_capacity(VELOCITY_WINDOW),
            acc_y: VecDeque::with_capacity(ACCEL_WINDOW),
            center_var: VecDeque::with_capacity(STABILITY_WINDOW),
            angle_var: VecDeque::with_capacity(STABILITY_WINDOW),
            frames_seen: 0,
            missing: 0,
            occlusion_frames: 0,
            last_seen_y: None,
            is_human: false,
            state: FallState::Standing,
            fall_votes: 0,
            ground_time: 0,
            fall_detected: false,
            locked: false,
        }
    }

    /// Fold this frame's detection into the rolling memory and re-derive the
    /// dependent signals (torso angle, vertical motion, stability deltas).
    fn update_with_detection(
        &mut self,
        bbox: [f32; 4],
        keypoints: KeypointMap,
        min_keypoints: usize,
    ) {
        let cx = (bbox[0] + bbox[2]) * 0.5;
        let cy = (bbox[1] + bbox[3]) * 0.5;

        push_bounded(&mut self.centers, CENTER_WINDOW, (cx, cy));
        push_bounded(&mut self.heights, HEIGHT_WINDOW, bbox[3] - bbox[1]);
        push_bounded(&mut self.aspect_ratios, RATIO_WINDOW, aspect_ratio(&bbox));
        self.last_seen_y = Some(cy);

        if let Some(angle) = torso_angle(&keypoints) {
            push_bounded(&mut self.body_angles, ANGLE_WINDOW, angle);
        }

        if self.centers.len() >= 2 {
            let prev_y = self.centers[self.centers.len() - 2].1;
            let v = vertical_velocity(prev_y, cy);
            push_bounded(&mut self.vel_y, VELOCITY_WINDOW, v);

            if self.vel_y.len() >= 2 {
                let prev_v = self.vel_y[self.vel_y.len() - 2];
                let a = vertical_acceleration(prev_v, v);
                push_bounded(&mut self.acc_y, ACCEL_WINDOW, a);
            }

            push_bounded(&mut self.center_var, STABILITY_WINDOW, (cy - prev_y).abs());
        }

        if self.body_angles.len() >= 2 {
            let n = self.body_angles.len();
            let delta = (self.body_angles[n - 1] - self.body_angles[n - 2]).abs();
            push_bounded(&mut self.angle_var, STABILITY_WINDOW, delta);
        }

        if !keypoints.is_empty() {
            self.is_human = is_valid_human_pose(&keypoints, min_keypoints);
        }
        push_bounded(&mut self.keypoints, KEYPOINT_WINDOW, keypoints);

        self.frames_seen += 1;
        self.missing = 0;
    }

    fn mark_missed(&mut self) {
        self.missing += 1;
        self.occlusion_frames += 1;
    }

    /// Freeze this track from further evidence evaluation. One-way: there is
    /// no unlock. Intended for an external supervisor (e.g. an inactivity
    /// monitor downstream); nothing in this crate calls it.
    pub fn lock(&mut self) {
        if !self.locked {
            info!("🔒 Track {} locked", self.id);
        }
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

/// Arena that owns every live track. All mutation goes through `update` and
/// `age_missing`; no other component keeps references across frames.
pub struct TrackStore {
    tracks: BTreeMap<u64, Track>,
    next_id: u64,
    max_missing: u32,
    min_keypoints: usize,
}

impl TrackStore {
    pub fn new(max_missing: u32, min_keypoints: usize) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 0,
            max_missing,
            min_keypoints,
        }
    }

    /// Reserve a fresh identity. Ids are monotonic and never reused, even
    /// after the track that held one is evicted.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Fold a matched detection into the track's memory, creating the track
    /// on first sight.
    pub fn update(&mut self, id: u64, bbox: [f32; 4], keypoints: KeypointMap) {
        let track = self.tracks.entry(id).or_insert_with(|| {
            info!(
                "🆕 Track {} created at [{:.0},{:.0},{:.0},{:.0}]",
                id, bbox[0], bbox[1], bbox[2], bbox[3]
            );
            Track::new(id)
        });
        track.update_with_detection(bbox, keypoints, self.min_keypoints);
    }

    /// Age every track that received no detection this frame; evict those
    /// missing for longer than the configured maximum. Evicted ids are gone
    /// for good; `allocate_id` never hands them out again.
    pub fn age_missing(&mut self, updated: &HashSet<u64>) {
        let max_missing = self.max_missing;
        self.tracks.retain(|id, track| {
            if updated.contains(id) {
                return true;
            }
            track.mark_missed();
            debug!(
                "Track {} missing ({} frames, occluded {})",
                id, track.missing, track.occlusion_frames
            );
            if track.missing > max_missing {
                info!("🗑️ Track {} evicted after {} missed frames", id, track.missing);
                return false;
            }
            true
        });
    }

    pub fn get(&self, id: u64) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    /// Live track ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.tracks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks_created(&self) -> u64 {
        self.next_id
    }
}
