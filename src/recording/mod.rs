//! Recorded session data and the lock-guarded store around it.
//!
//! The capture side appends through [`RecordingStore::write`]; the playback
//! side only ever reads through a [`RecordingSnapshot`], which holds the read
//! lock for as long as it lives.

pub mod collapse;
pub mod store;

#[cfg(test)]
pub mod fixtures;

pub use collapse::{collapse_frames, COLLAPSED_STAGE_NAME};
pub use store::{RecordingSnapshot, RecordingStore, RecordingWriter};

use crate::core::{GameFrame, SolverFrame};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static description of a recorded solver
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SolverInfo {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_server: bool,
    /// Offset between this client's internal ticks and the server's ticks
    #[serde(default)]
    pub network_tick_offset: i32,
}

impl SolverInfo {
    pub fn new(id: i32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Tick offset applied when converting to server ticks
    pub fn effective_tick_offset(&self) -> i32 {
        if self.is_server {
            0
        } else {
            self.network_tick_offset
        }
    }
}

/// All frames recorded for one solver
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SolverRecord {
    pub info: SolverInfo,
    #[serde(default)]
    pub frames: Vec<SolverFrame>,
}

impl SolverRecord {
    pub fn has_network_sync_data(&self) -> bool {
        self.frames.iter().any(|frame| frame.network_frame.is_some())
    }
}

/// A complete recorded session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub game_frames: Vec<GameFrame>,
    #[serde(default)]
    pub solvers: BTreeMap<i32, SolverRecord>,
}

impl Recording {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.game_frames.is_empty() && self.solvers.values().all(|s| s.frames.is_empty())
    }

    pub fn push_game_frame(&mut self, frame: GameFrame) {
        self.game_frames.push(frame);
    }

    /// Register a solver, keeping any frames already recorded for it
    pub fn add_solver(&mut self, info: SolverInfo) {
        self.solvers
            .entry(info.id)
            .and_modify(|record| record.info = info.clone())
            .or_insert_with(|| SolverRecord {
                info,
                frames: Vec::new(),
            });
    }

    /// Append a solver frame, creating the solver on first sight
    pub fn push_solver_frame(&mut self, solver_id: i32, frame: SolverFrame) {
        self.solvers
            .entry(solver_id)
            .or_insert_with(|| SolverRecord {
                info: SolverInfo::new(solver_id, &format!("Solver {}", solver_id)),
                frames: Vec::new(),
            })
            .frames
            .push(frame);
    }
}
