use crate::core::{SolverFrame, SolverStage};
use std::collections::BTreeMap;

/// Name of the single synthetic stage produced by collapsing
pub const COLLAPSED_STAGE_NAME: &str = "Collapsed";

/// Rebuild the full state at `target` by replaying every stage from the
/// keyframe at `keyframe` up to and including `target`.
///
/// The result carries the target frame's metadata and one synthetic stage.
/// Collapsing a keyframe onto itself returns the keyframe untouched.
pub fn collapse_frames(frames: &[SolverFrame], keyframe: usize, target: usize) -> Option<SolverFrame> {
    let key = frames.get(keyframe)?;
    let target_frame = frames.get(target)?;
    if !key.is_keyframe || target < keyframe {
        return None;
    }

    if keyframe == target {
        return Some(key.clone());
    }

    let mut state = BTreeMap::new();
    for frame in &frames[keyframe..=target] {
        for stage in &frame.stages {
            stage.apply_to(&mut state);
        }
    }

    Some(SolverFrame {
        cycle: target_frame.cycle,
        start_time: target_frame.start_time,
        end_time: target_frame.end_time,
        is_keyframe: false,
        is_resimulated: target_frame.is_resimulated,
        network_frame: target_frame.network_frame,
        stages: vec![SolverStage {
            name: COLLAPSED_STAGE_NAME.to_string(),
            particles: state,
            destroyed: Vec::new(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ParticleState;

    fn frame(cycle: u64, is_keyframe: bool, stages: Vec<SolverStage>) -> SolverFrame {
        SolverFrame {
            cycle,
            start_time: cycle as f64,
            end_time: cycle as f64 + 1.0,
            is_keyframe,
            is_resimulated: false,
            network_frame: Some(cycle as i32),
            stages,
        }
    }

    fn frames() -> Vec<SolverFrame> {
        vec![
            frame(
                0,
                true,
                vec![
                    SolverStage::new("Spawn")
                        .with_particle(1, ParticleState::at([0.0, 0.0, 0.0]))
                        .with_particle(2, ParticleState::at([1.0, 0.0, 0.0])),
                    SolverStage::new("Integrate").with_particle(1, ParticleState::at([0.0, 1.0, 0.0])),
                ],
            ),
            frame(
                1,
                false,
                vec![SolverStage::new("Integrate").with_particle(1, ParticleState::at([0.0, 2.0, 0.0]))],
            ),
            frame(
                2,
                false,
                vec![
                    SolverStage::new("Destroy").with_destroyed(2),
                    SolverStage::new("Spawn").with_particle(3, ParticleState::at([5.0, 5.0, 5.0])),
                ],
            ),
        ]
    }

    #[test]
    fn test_collapse_keyframe_onto_itself_is_identity() {
        let frames = frames();
        assert_eq!(collapse_frames(&frames, 0, 0), Some(frames[0].clone()));
    }

    #[test]
    fn test_collapse_replays_deltas() {
        let frames = frames();
        let collapsed = collapse_frames(&frames, 0, 2).unwrap();

        assert_eq!(collapsed.cycle, 2);
        assert_eq!(collapsed.network_frame, Some(2));
        assert_eq!(collapsed.stages.len(), 1);
        let stage = &collapsed.stages[0];
        assert_eq!(stage.name, COLLAPSED_STAGE_NAME);
        assert_eq!(stage.particles[&1].position, [0.0, 2.0, 0.0]);
        assert!(!stage.particles.contains_key(&2));
        assert!(stage.particles.contains_key(&3));
    }

    #[test]
    fn test_collapse_rejects_non_keyframe_start() {
        let frames = frames();
        assert_eq!(collapse_frames(&frames, 1, 2), None);
        assert_eq!(collapse_frames(&frames, 0, 9), None);
    }
}
