use super::SceneSink;
use crate::core::{GameFrame, ParticleId, ParticleState, SolverFrame, SolverStage, TrackKind};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::trace;

/// In-memory scene holding the particle state of every solver
#[derive(Debug, Default)]
pub struct ParticleScene {
    solvers: HashMap<i32, BTreeMap<ParticleId, ParticleState>>,
    hidden: HashSet<TrackKind>,
    current_game_frame: Option<usize>,
    /// Total number of stages applied since creation
    pub stages_applied: usize,
    /// Total number of game frames entered since creation
    pub frames_entered: usize,
}

impl ParticleScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn particles(&self, solver_id: i32) -> Option<&BTreeMap<ParticleId, ParticleState>> {
        self.solvers.get(&solver_id)
    }

    pub fn current_game_frame(&self) -> Option<usize> {
        self.current_game_frame
    }

    pub fn clear(&mut self) {
        self.solvers.clear();
        self.hidden.clear();
        self.current_game_frame = None;
    }
}

impl SceneSink for ParticleScene {
    fn apply_stage(&mut self, solver_id: i32, stage_index: usize, stage: Option<&SolverStage>, _frame: &SolverFrame) {
        let state = self.solvers.entry(solver_id).or_default();
        if stage_index == 0 {
            state.clear();
        }
        if let Some(stage) = stage {
            stage.apply_to(state);
            trace!("Solver {} applied stage {} ({})", solver_id, stage_index, stage.name);
        }
        self.stages_applied += 1;
    }

    fn enter_new_frame(
        &mut self,
        frame_number: usize,
        available_solver_ids: &BTreeSet<i32>,
        _frame: &GameFrame,
        removed_solver_ids: &BTreeSet<i32>,
    ) {
        for id in removed_solver_ids {
            self.solvers.remove(id);
        }
        for id in available_solver_ids {
            self.solvers.entry(*id).or_default();
        }
        self.current_game_frame = Some(frame_number);
        self.frames_entered += 1;
    }

    fn visibility(&self, track: TrackKind) -> bool {
        !self.hidden.contains(&track)
    }

    fn set_visibility(&mut self, track: TrackKind, visible: bool) {
        if visible {
            self.hidden.remove(&track);
        } else {
            self.hidden.insert(track);
        }
    }
}
