use crate::core::{GameFrame, SolverFrame};
use crate::recording::{Recording, SolverInfo};
use async_trait::async_trait;
use std::error::Error;

/// Result type for capture source operations
pub type CaptureResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Configuration for a capture session
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Name given to the live recording
    pub session_name: String,
    /// Delay between polls when the source has nothing new
    pub poll_interval_ms: u64,
    /// Most events appended under a single write lock
    pub batch_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            session_name: "live".to_string(),
            poll_interval_ms: 5,
            batch_size: 256,
        }
    }
}

/// Status of a capture source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// One piece of data produced by a capture source
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    SolverDiscovered(SolverInfo),
    GameFrame(GameFrame),
    SolverFrame { solver_id: i32, frame: SolverFrame },
}

impl CaptureEvent {
    pub fn apply_to(self, recording: &mut Recording) {
        match self {
            CaptureEvent::SolverDiscovered(info) => recording.add_solver(info),
            CaptureEvent::GameFrame(frame) => recording.push_game_frame(frame),
            CaptureEvent::SolverFrame { solver_id, frame } => recording.push_solver_frame(solver_id, frame),
        }
    }
}

/// A producer of live recording data, such as a running simulation or a
/// network feed
#[async_trait]
pub trait CaptureSource: Send {
    fn name(&self) -> &str;

    fn status(&self) -> CaptureStatus;

    async fn connect(&mut self, config: CaptureConfig) -> CaptureResult<()>;

    async fn disconnect(&mut self) -> CaptureResult<()>;

    /// Next event, or `None` if nothing is available right now
    async fn receive(&mut self) -> CaptureResult<Option<CaptureEvent>>;

    /// Number of events ready to be received
    fn pending(&self) -> usize;

    /// Whether the source will never produce another event
    fn is_exhausted(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SolverStage;

    #[test]
    fn test_events_apply_to_recording() {
        let mut recording = Recording::new("capture");
        let mut info = SolverInfo::new(4, "Cloth");
        info.is_server = true;

        CaptureEvent::SolverDiscovered(info).apply_to(&mut recording);
        CaptureEvent::GameFrame(GameFrame {
            start_cycle: 0,
            end_cycle: 9,
            start_time: 0.0,
            end_time: 0.1,
        })
        .apply_to(&mut recording);
        CaptureEvent::SolverFrame {
            solver_id: 4,
            frame: SolverFrame {
                cycle: 1,
                start_time: 0.0,
                end_time: 0.1,
                is_keyframe: true,
                is_resimulated: false,
                network_frame: None,
                stages: vec![SolverStage::new("Integrate")],
            },
        }
        .apply_to(&mut recording);

        assert_eq!(recording.game_frames.len(), 1);
        let solver = &recording.solvers[&4];
        assert_eq!(solver.info.name, "Cloth");
        assert!(solver.info.is_server);
        assert_eq!(solver.frames.len(), 1);
    }
}
