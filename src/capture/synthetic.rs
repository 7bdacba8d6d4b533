use super::source::{CaptureConfig, CaptureEvent, CaptureResult, CaptureSource, CaptureStatus};
use crate::core::{GameFrame, ParticleState, SolverFrame, SolverStage};
use crate::recording::{Recording, SolverInfo};
use async_trait::async_trait;
use std::collections::VecDeque;

const GENERATED_CYCLES_PER_FRAME: u64 = 100;
const GENERATED_FRAME_TIME: f64 = 1.0 / 60.0;
const GENERATED_KEYFRAME_INTERVAL: u64 = 10;

/// Capture source without a running simulation.
///
/// Either replays queued events (injected by hand or taken from an existing
/// recording) or generates a single falling particle forever.
pub struct SyntheticCapture {
    name: String,
    status: CaptureStatus,
    config: Option<CaptureConfig>,
    queue: VecDeque<CaptureEvent>,
    generated_frames: u64,
    auto_generate: bool,
    max_generated_frames: Option<u64>,
}

impl SyntheticCapture {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CaptureStatus::Disconnected,
            config: None,
            queue: VecDeque::new(),
            generated_frames: 0,
            auto_generate: false,
            max_generated_frames: None,
        }
    }

    /// Stream an existing recording as if it were being captured, game frame
    /// by game frame
    pub fn from_recording(recording: &Recording) -> Self {
        let mut capture = Self::new(&recording.name);
        capture.inject_events(recording_events(recording));
        capture
    }

    /// Generate frames whenever the queue runs dry, up to `limit` frames
    pub fn set_auto_generate(&mut self, enabled: bool, limit: Option<u64>) {
        self.auto_generate = enabled;
        self.max_generated_frames = limit;
    }

    pub fn inject_event(&mut self, event: CaptureEvent) {
        self.queue.push_back(event);
    }

    pub fn inject_events(&mut self, events: impl IntoIterator<Item = CaptureEvent>) {
        self.queue.extend(events);
    }

    fn can_generate(&self) -> bool {
        self.auto_generate
            && self
                .max_generated_frames
                .map_or(true, |limit| self.generated_frames < limit)
    }

    fn generate_frame(&mut self) {
        let n = self.generated_frames;
        self.generated_frames += 1;

        if n == 0 {
            let mut info = SolverInfo::new(0, "Generated");
            info.is_server = true;
            self.queue.push_back(CaptureEvent::SolverDiscovered(info));
        }

        let start_time = n as f64 * GENERATED_FRAME_TIME;
        let end_time = start_time + GENERATED_FRAME_TIME;
        self.queue.push_back(CaptureEvent::GameFrame(GameFrame {
            start_cycle: n * GENERATED_CYCLES_PER_FRAME,
            end_cycle: n * GENERATED_CYCLES_PER_FRAME + GENERATED_CYCLES_PER_FRAME - 1,
            start_time,
            end_time,
        }));

        let height = 100.0 - 0.5 * 9.81 * start_time * start_time;
        let sleeping = height <= 0.0;
        let particle = ParticleState {
            position: [0.0, 0.0, height.max(0.0)],
            velocity: [0.0, 0.0, if sleeping { 0.0 } else { -9.81 * start_time }],
            sleeping,
        };
        self.queue.push_back(CaptureEvent::SolverFrame {
            solver_id: 0,
            frame: SolverFrame {
                cycle: n * GENERATED_CYCLES_PER_FRAME + 1,
                start_time,
                end_time,
                is_keyframe: n % GENERATED_KEYFRAME_INTERVAL == 0,
                is_resimulated: false,
                network_frame: Some(n as i32),
                stages: vec![SolverStage::new("Integrate").with_particle(0, particle)],
            },
        });
    }
}

/// Events reproducing `recording`, each game frame followed by the solver
/// frames that start inside it
pub fn recording_events(recording: &Recording) -> Vec<CaptureEvent> {
    let mut events: Vec<CaptureEvent> = recording
        .solvers
        .values()
        .map(|record| CaptureEvent::SolverDiscovered(record.info.clone()))
        .collect();

    let mut cursors: Vec<(i32, usize)> = recording.solvers.keys().map(|id| (*id, 0)).collect();
    for game_frame in &recording.game_frames {
        events.push(CaptureEvent::GameFrame(game_frame.clone()));
        for (solver_id, cursor) in cursors.iter_mut() {
            let solver_id = *solver_id;
            let frames = &recording.solvers[&solver_id].frames;
            while let Some(frame) = frames.get(*cursor).filter(|f| f.cycle <= game_frame.end_cycle) {
                events.push(CaptureEvent::SolverFrame {
                    solver_id,
                    frame: frame.clone(),
                });
                *cursor += 1;
            }
        }
    }

    // Solver frames recorded after the last game frame
    for (solver_id, cursor) in cursors {
        for frame in &recording.solvers[&solver_id].frames[cursor..] {
            events.push(CaptureEvent::SolverFrame {
                solver_id,
                frame: frame.clone(),
            });
        }
    }
    events
}

#[async_trait]
impl CaptureSource for SyntheticCapture {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> CaptureStatus {
        self.status
    }

    async fn connect(&mut self, config: CaptureConfig) -> CaptureResult<()> {
        self.config = Some(config);
        self.status = CaptureStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> CaptureResult<()> {
        self.status = CaptureStatus::Disconnected;
        self.config = None;
        self.queue.clear();
        Ok(())
    }

    async fn receive(&mut self) -> CaptureResult<Option<CaptureEvent>> {
        if self.status != CaptureStatus::Connected {
            return Err("Not connected".into());
        }
        if self.queue.is_empty() && self.can_generate() {
            self.generate_frame();
        }
        Ok(self.queue.pop_front())
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn is_exhausted(&self) -> bool {
        self.queue.is_empty() && !self.can_generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::fixtures::{RecordingBuilder, SolverFixture};

    #[tokio::test]
    async fn test_connect_disconnect() {
        let mut capture = SyntheticCapture::new("test");
        assert_eq!(capture.status(), CaptureStatus::Disconnected);
        assert!(capture.receive().await.is_err());

        capture.connect(CaptureConfig::default()).await.unwrap();
        assert_eq!(capture.status(), CaptureStatus::Connected);

        capture.disconnect().await.unwrap();
        assert_eq!(capture.status(), CaptureStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_injected_events_come_out_in_order() {
        let mut capture = SyntheticCapture::new("test");
        capture.connect(CaptureConfig::default()).await.unwrap();
        capture.inject_event(CaptureEvent::SolverDiscovered(SolverInfo::new(1, "a")));
        capture.inject_event(CaptureEvent::SolverDiscovered(SolverInfo::new(2, "b")));
        assert_eq!(capture.pending(), 2);

        match capture.receive().await.unwrap() {
            Some(CaptureEvent::SolverDiscovered(info)) => assert_eq!(info.id, 1),
            other => panic!("unexpected {:?}", other),
        }
        capture.receive().await.unwrap();
        assert!(capture.receive().await.unwrap().is_none());
        assert!(capture.is_exhausted());
    }

    #[tokio::test]
    async fn test_auto_generate_respects_limit() {
        let mut capture = SyntheticCapture::new("test");
        capture.set_auto_generate(true, Some(2));
        capture.connect(CaptureConfig::default()).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = capture.receive().await.unwrap() {
            events.push(event);
        }
        // solver info, then a game frame and a solver frame per generated frame
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], CaptureEvent::SolverDiscovered(_)));
        assert!(capture.is_exhausted());
    }

    #[test]
    fn test_recording_events_interleave_by_game_frame() {
        let recording = RecordingBuilder::new(3, 0.1)
            .solver(SolverFixture::new(1, 6).rate(2))
            .build();
        let events = recording_events(&recording);

        assert_eq!(events.len(), 1 + 3 + 6);
        assert!(matches!(events[1], CaptureEvent::GameFrame(_)));
        assert!(matches!(events[2], CaptureEvent::SolverFrame { .. }));
        assert!(matches!(events[3], CaptureEvent::SolverFrame { .. }));
        assert!(matches!(events[4], CaptureEvent::GameFrame(_)));

        let mut rebuilt = Recording::new(&recording.name);
        for event in events {
            event.apply_to(&mut rebuilt);
        }
        assert_eq!(rebuilt, recording);
    }
}
