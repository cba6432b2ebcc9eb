// src/evidence.rs
//
// Evidence-based fall analysis. Each verdict reads one slice of a track's
// rolling memory and is independent of the others; an empty window is
// "no signal" and counts as false, never as an error.

use crate::track::Track;
use crate::types::{EvidenceConfig, FallState};

/// Boolean verdicts for one track on one frame, plus the fused decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallSignals {
    /// Body collapsed: strong torso tilt or wider-than-tall box
    pub posture: bool,
    /// Vertical velocity or acceleration spike in the motion window
    pub motion: bool,
    /// Center or angle jitter above threshold, i.e. loss of control
    pub unstable: bool,
    /// Subject low in the frame
    pub near_ground: bool,
    /// Went out of view while already falling, near the ground
    pub hidden: bool,
    /// Consensus of the three primary verdicts
    pub fall_evidence: bool,
}

fn posture_collapse(track: &Track, cfg: &EvidenceConfig) -> bool {
    match (track.body_angles.back(), track.aspect_ratios.back()) {
        (Some(angle), Some(ratio)) => *angle > cfg.angle_threshold || *ratio < cfg.ratio_threshold,
        _ => false,
    }
}

fn motion_spike(track: &Track, cfg: &EvidenceConfig) -> bool {
    track
        .vel_y
        .iter()
        .any(|v| v.abs() > cfg.velocity_threshold)
        || track.acc_y.iter().any(|a| *a > cfg.acceleration_threshold)
}

fn stability_lost(track: &Track, cfg: &EvidenceConfig) -> bool {
    track
        .center_var
        .iter()
        .any(|d| *d > cfg.variance_threshold)
        || track.angle_var.iter().any(|d| *d > cfg.variance_threshold)
}

fn near_ground(track: &Track, frame_height: f32, ratio: f32) -> bool {
    match track.last_seen_y {
        Some(y) => y > frame_height * ratio,
        None => false,
    }
}

fn hidden_fall(track: &Track, frame_height: f32, cfg: &EvidenceConfig) -> bool {
    track.state == FallState::Falling
        && track.occlusion_frames >= cfg.min_occlusion_frames
        && near_ground(track, frame_height, cfg.occluded_ground_ratio)
}

/// Compute all verdicts for one track and fuse them.
///
/// Consensus rule: at least two of {posture, motion, unstable} must hold,
/// and one of them must be a shape signal (posture or instability). Motion
/// alone (a fast walk, a camera bump) never raises fall evidence.
pub fn analyze(track: &Track, frame_height: f32, cfg: &EvidenceConfig) -> FallSignals {
    let posture = posture_collapse(track, cfg);
    let motion = motion_spike(track, cfg);
    let unstable = stability_lost(track, cfg);

    let evidence_count = posture as u8 + motion as u8 + unstable as u8;
    let fall_evidence = evidence_count >= 2 && (posture || unstable);

    FallSignals {
        posture,
        motion,
        unstable,
        near_ground: near_ground(track, frame_height, cfg.ground_ratio),
        hidden: hidden_fall(track, frame_height, cfg),
        fall_evidence,
    }
}
