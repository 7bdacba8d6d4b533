//! Visualization sink used by playback.
//!
//! Playback never talks to a renderer directly; it drives whatever
//! implements [`SceneSink`].

mod particles;

pub use particles::ParticleScene;

use crate::core::{GameFrame, SolverFrame, SolverStage, TrackKind};
use std::collections::BTreeSet;

pub trait SceneSink {
    /// Apply one stage of a solver frame. `stage` is `None` when the frame
    /// has no stages. Stage index 0 always starts from full state.
    fn apply_stage(&mut self, solver_id: i32, stage_index: usize, stage: Option<&SolverStage>, frame: &SolverFrame);

    /// The game track entered a new frame
    fn enter_new_frame(
        &mut self,
        frame_number: usize,
        available_solver_ids: &BTreeSet<i32>,
        frame: &GameFrame,
        removed_solver_ids: &BTreeSet<i32>,
    );

    fn visibility(&self, track: TrackKind) -> bool;

    fn set_visibility(&mut self, track: TrackKind, visible: bool);
}
