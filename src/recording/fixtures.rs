//! Deterministic recordings for tests.
//!
//! Game frame `g` covers cycles `[g * 100, g * 100 + 99]` and lasts
//! `frame_time` seconds. Solver frames are spread evenly inside the game
//! frames they belong to.

use super::{Recording, SolverInfo};
use crate::core::{GameFrame, ParticleState, SolverFrame, SolverStage};

pub const CYCLES_PER_GAME_FRAME: u64 = 100;

#[derive(Debug, Clone)]
pub struct SolverFixture {
    pub id: i32,
    pub frame_count: usize,
    pub first_game_frame: usize,
    pub frames_per_game_frame: usize,
    pub keyframe_interval: usize,
    pub stages_per_frame: usize,
    pub is_server: bool,
    /// `(first internal tick, tick offset)` when the solver records sync data
    pub network: Option<(i32, i32)>,
}

impl SolverFixture {
    pub fn new(id: i32, frame_count: usize) -> Self {
        Self {
            id,
            frame_count,
            first_game_frame: 0,
            frames_per_game_frame: 1,
            keyframe_interval: 1,
            stages_per_frame: 1,
            is_server: false,
            network: None,
        }
    }

    pub fn starting_at(mut self, game_frame: usize) -> Self {
        self.first_game_frame = game_frame;
        self
    }

    pub fn rate(mut self, frames_per_game_frame: usize) -> Self {
        self.frames_per_game_frame = frames_per_game_frame.max(1);
        self
    }

    pub fn keyframe_every(mut self, interval: usize) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    pub fn stages(mut self, count: usize) -> Self {
        self.stages_per_frame = count;
        self
    }

    pub fn server(mut self) -> Self {
        self.is_server = true;
        self
    }

    pub fn network(mut self, first_tick: i32, offset: i32) -> Self {
        self.network = Some((first_tick, offset));
        self
    }
}

pub struct RecordingBuilder {
    recording: Recording,
    frame_time: f64,
}

impl RecordingBuilder {
    pub fn new(game_frames: usize, frame_time: f64) -> Self {
        let mut recording = Recording::new("fixture");
        for g in 0..game_frames {
            recording.push_game_frame(GameFrame {
                start_cycle: g as u64 * CYCLES_PER_GAME_FRAME,
                end_cycle: g as u64 * CYCLES_PER_GAME_FRAME + CYCLES_PER_GAME_FRAME - 1,
                start_time: g as f64 * frame_time,
                end_time: (g + 1) as f64 * frame_time,
            });
        }
        Self {
            recording,
            frame_time,
        }
    }

    pub fn solver(mut self, fixture: SolverFixture) -> Self {
        let mut info = SolverInfo::new(fixture.id, &format!("Solver {}", fixture.id));
        info.is_server = fixture.is_server;
        info.network_tick_offset = fixture.network.map(|(_, offset)| offset).unwrap_or(0);
        self.recording.add_solver(info);

        let step_cycles = CYCLES_PER_GAME_FRAME / fixture.frames_per_game_frame as u64;
        let step_time = self.frame_time / fixture.frames_per_game_frame as f64;
        for j in 0..fixture.frame_count {
            let game_frame = fixture.first_game_frame + j / fixture.frames_per_game_frame;
            let sub = (j % fixture.frames_per_game_frame) as u64;
            let start_time = game_frame as f64 * self.frame_time + sub as f64 * step_time;
            let is_keyframe = j % fixture.keyframe_interval == 0;

            let stages = (0..fixture.stages_per_frame)
                .map(|s| {
                    let mut stage = SolverStage::new(&format!("Stage {}", s))
                        .with_particle(1, ParticleState::at([j as f64, s as f64, 0.0]));
                    if is_keyframe && s == 0 {
                        stage = stage.with_particle(0, ParticleState::at([0.0, 0.0, 0.0]));
                    }
                    stage
                })
                .collect();

            self.recording.push_solver_frame(
                fixture.id,
                SolverFrame {
                    cycle: game_frame as u64 * CYCLES_PER_GAME_FRAME + sub * step_cycles + 1,
                    start_time,
                    end_time: start_time + step_time,
                    is_keyframe,
                    is_resimulated: false,
                    network_frame: fixture.network.map(|(first, _)| first + j as i32),
                    stages,
                },
            );
        }
        self
    }

    pub fn build(self) -> Recording {
        self.recording
    }
}

/// Ten 0.1s game frames, one solver (id 1) at the same rate
pub fn simple_recording() -> Recording {
    RecordingBuilder::new(10, 0.1)
        .solver(SolverFixture::new(1, 10))
        .build()
}
