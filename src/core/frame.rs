use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a recorded particle inside a solver
pub type ParticleId = i32;

/// Recorded state of a single particle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    #[serde(default)]
    pub sleeping: bool,
}

impl ParticleState {
    pub fn at(position: [f64; 3]) -> Self {
        Self {
            position,
            velocity: [0.0; 3],
            sleeping: false,
        }
    }
}

/// One ordered sub-step of a solver frame.
///
/// On a keyframe the particles of all stages together form the complete
/// state; on a delta frame they only hold what changed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SolverStage {
    pub name: String,
    #[serde(default)]
    pub particles: BTreeMap<ParticleId, ParticleState>,
    #[serde(default)]
    pub destroyed: Vec<ParticleId>,
}

impl SolverStage {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_particle(mut self, id: ParticleId, state: ParticleState) -> Self {
        self.particles.insert(id, state);
        self
    }

    pub fn with_destroyed(mut self, id: ParticleId) -> Self {
        self.destroyed.push(id);
        self
    }

    /// Apply this stage on top of an accumulated particle map
    pub fn apply_to(&self, state: &mut BTreeMap<ParticleId, ParticleState>) {
        for id in &self.destroyed {
            state.remove(id);
        }
        for (id, particle) in &self.particles {
            state.insert(*id, *particle);
        }
    }
}

/// A recorded solver frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverFrame {
    /// Wall-clock cycle counter at which the frame was recorded
    pub cycle: u64,
    /// Start time in seconds since the recording started
    pub start_time: f64,
    /// End time in seconds since the recording started
    pub end_time: f64,
    #[serde(default)]
    pub is_keyframe: bool,
    #[serde(default)]
    pub is_resimulated: bool,
    /// Internal network tick, present when the solver recorded sync data
    #[serde(default)]
    pub network_frame: Option<i32>,
    #[serde(default)]
    pub stages: Vec<SolverStage>,
}

impl SolverFrame {
    /// Recorded duration of this frame in seconds
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// A recorded game frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameFrame {
    pub start_cycle: u64,
    pub end_cycle: u64,
    pub start_time: f64,
    pub end_time: f64,
}

impl GameFrame {
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }

    /// Whether a recorded cycle falls inside this frame (inclusive on both ends)
    pub fn contains_cycle(&self, cycle: u64) -> bool {
        self.start_cycle <= cycle && cycle <= self.end_cycle
    }
}

/// Frame data handed to the scene for a navigated track
#[derive(Debug, Clone, PartialEq)]
pub enum FrameData {
    Game(GameFrame),
    Solver(SolverFrame),
}

impl FrameData {
    pub fn duration(&self) -> f64 {
        match self {
            FrameData::Game(frame) => frame.duration(),
            FrameData::Solver(frame) => frame.duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_apply_upserts_and_removes() {
        let mut state = BTreeMap::new();
        state.insert(1, ParticleState::at([0.0, 0.0, 0.0]));
        state.insert(2, ParticleState::at([1.0, 0.0, 0.0]));

        let stage = SolverStage::new("Integrate")
            .with_particle(1, ParticleState::at([0.0, 5.0, 0.0]))
            .with_particle(3, ParticleState::at([2.0, 2.0, 2.0]))
            .with_destroyed(2);
        stage.apply_to(&mut state);

        assert_eq!(state.len(), 2);
        assert_eq!(state[&1].position, [0.0, 5.0, 0.0]);
        assert!(state.contains_key(&3));
        assert!(!state.contains_key(&2));
    }

    #[test]
    fn test_game_frame_cycle_range_is_inclusive() {
        let frame = GameFrame {
            start_cycle: 100,
            end_cycle: 200,
            start_time: 0.0,
            end_time: 0.1,
        };
        assert!(frame.contains_cycle(100));
        assert!(frame.contains_cycle(200));
        assert!(!frame.contains_cycle(201));
    }

    #[test]
    fn test_negative_duration_clamps_to_zero() {
        let frame = SolverFrame {
            cycle: 0,
            start_time: 1.0,
            end_time: 0.5,
            is_keyframe: true,
            is_resimulated: false,
            network_frame: None,
            stages: Vec::new(),
        };
        assert_eq!(frame.duration(), 0.0);
    }
}
