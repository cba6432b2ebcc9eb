// src/state_machine.rs
//
// Per-track fall FSM: Standing → Falling → Fallen, gated by vote hysteresis
// so a single noisy frame neither starts nor cancels a fall. States never
// regress; a subject that stops showing evidence stalls in Falling with
// decaying votes instead of snapping back to Standing.

use crate::evidence::FallSignals;
use crate::track::Track;
use crate::types::FallState;
use tracing::{debug, info, warn};

pub struct FallStateMachine {
    confirm_frames: u32,
}

impl FallStateMachine {
    pub fn new(confirm_frames: u32) -> Self {
        Self { confirm_frames }
    }

    /// Advance one track by one frame of evidence. Callers gate on
    /// `is_human` and `is_locked`; a locked track is frozen for good.
    pub fn advance(&self, track: &mut Track, signals: &FallSignals) {
        match track.state {
            FallState::Standing => {
                if signals.fall_evidence {
                    track.state = FallState::Falling;
                    track.fall_votes = 1;
                    info!("⚠️ Track {} started falling", track.id);
                }
            }

            FallState::Falling => {
                if signals.fall_evidence {
                    track.fall_votes += 1;
                } else {
                    // Decay, floored at zero: one clean frame does not
                    // erase accumulated confidence
                    track.fall_votes = track.fall_votes.saturating_sub(1);
                }
                debug!(
                    "Track {} falling: votes {}/{}",
                    track.id, track.fall_votes, self.confirm_frames
                );

                if track.fall_votes >= self.confirm_frames
                    && (signals.near_ground || signals.hidden)
                {
                    track.state = FallState::Fallen;
                    track.fall_detected = true;
                    warn!(
                        "🚨 Track {} FALL confirmed ({} votes{})",
                        track.id,
                        track.fall_votes,
                        if signals.hidden { ", occluded" } else { "" }
                    );
                }
            }

            FallState::Fallen => {
                track.ground_time += 1;
            }

            // Reserved: nothing produces this state yet
            FallState::Occluded => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackStore;
    use crate::types::KeypointMap;

    const EVIDENCE: FallSignals = FallSignals {
        posture: true,
        motion: true,
        unstable: false,
        near_ground: false,
        hidden: false,
        fall_evidence: true,
    };

    const EVIDENCE_NEAR_GROUND: FallSignals = FallSignals {
        posture: true,
        motion: true,
        unstable: false,
        near_ground: true,
        hidden: false,
        fall_evidence: true,
    };

    const QUIET: FallSignals = FallSignals {
        posture: false,
        motion: false,
        unstable: false,
        near_ground: false,
        hidden: false,
        fall_evidence: false,
    };

    fn track(store: &mut TrackStore) -> u64 {
        let id = store.allocate_id();
        store.update(id, [0.0, 0.0, 50.0, 150.0], KeypointMap::new());
        id
    }

    #[test]
    fn test_standing_to_falling_sets_one_vote() {
        let mut store = TrackStore::new(30, 6);
        let fsm = FallStateMachine::new(5);
        let id = track(&mut store);
        let t = store.get_mut(id).unwrap();

        fsm.advance(t, &QUIET);
        assert_eq!(t.state, FallState::Standing);

        fsm.advance(t, &EVIDENCE);
        assert_eq!(t.state, FallState::Falling);
        assert_eq!(t.fall_votes, 1);
    }

    #[test]
    fn test_votes_reach_confirm_count_after_confirm_frames() {
        // Counting the frame that entered Falling, exactly confirm_frames
        // consecutive evidence frames put votes at confirm_frames.
        let confirm = 5;
        let mut store = TrackStore::new(30, 6);
        let fsm = FallStateMachine::new(confirm);
        let id = track(&mut store);
        let t = store.get_mut(id).unwrap();

        for _ in 0..confirm {
            fsm.advance(t, &EVIDENCE);
        }
        assert_eq!(t.fall_votes, confirm);
        // Evidence alone is not enough without a ground verdict
        assert_eq!(t.state, FallState::Falling);
    }

    #[test]
    fn test_fallen_requires_votes_and_ground() {
        let mut store = TrackStore::new(30, 6);
        let fsm = FallStateMachine::new(3);
        let id = track(&mut store);
        let t = store.get_mut(id).unwrap();

        fsm.advance(t, &EVIDENCE_NEAR_GROUND); // votes 1
        fsm.advance(t, &EVIDENCE_NEAR_GROUND); // votes 2
        assert_eq!(t.state, FallState::Falling, "2 votes < 3");

        fsm.advance(t, &EVIDENCE_NEAR_GROUND); // votes 3 + near ground
        assert_eq!(t.state, FallState::Fallen);
        assert!(t.fall_detected);
    }

    #[test]
    fn test_hidden_substitutes_for_near_ground() {
        let mut store = TrackStore::new(30, 6);
        let fsm = FallStateMachine::new(2);
        let id = track(&mut store);
        let t = store.get_mut(id).unwrap();

        let hidden = FallSignals {
            hidden: true,
            ..EVIDENCE
        };
        fsm.advance(t, &hidden);
        fsm.advance(t, &hidden);
        assert_eq!(t.state, FallState::Fallen);
    }

    #[test]
    fn test_votes_decay_floored_and_no_regression() {
        let mut store = TrackStore::new(30, 6);
        let fsm = FallStateMachine::new(5);
        let id = track(&mut store);
        let t = store.get_mut(id).unwrap();

        fsm.advance(t, &EVIDENCE); // Falling, votes 1
        let mut prev_votes = t.fall_votes;
        for _ in 0..4 {
            fsm.advance(t, &QUIET);
            assert!(t.fall_votes <= prev_votes, "votes must not grow without evidence");
            prev_votes = t.fall_votes;
        }
        assert_eq!(t.fall_votes, 0, "decay floors at zero");
        assert_eq!(
            t.state,
            FallState::Falling,
            "no regression to Standing, ever"
        );
        assert!(!t.fall_detected);
    }

    #[test]
    fn test_fallen_accumulates_ground_time() {
        let mut store = TrackStore::new(30, 6);
        let fsm = FallStateMachine::new(1);
        let id = track(&mut store);
        let t = store.get_mut(id).unwrap();

        fsm.advance(t, &EVIDENCE_NEAR_GROUND); // Standing → Falling
        fsm.advance(t, &EVIDENCE_NEAR_GROUND); // votes 2 ≥ 1, near ground
        assert_eq!(t.state, FallState::Fallen);
        assert_eq!(t.ground_time, 0);

        fsm.advance(t, &QUIET);
        fsm.advance(t, &QUIET);
        assert_eq!(t.ground_time, 2);
        assert_eq!(t.state, FallState::Fallen, "terminal for this core");
    }
}
