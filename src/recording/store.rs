use super::collapse::collapse_frames;
use super::{Recording, SolverInfo, SolverRecord};
use crate::core::{FrameData, GameFrame, Lookup, SolverFrame, TrackKind};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared recording guarded by a reader/writer lock.
///
/// Every write bumps [`RecordingStore::last_updated_version`], which lets the
/// playback side notice new data without taking the lock.
pub struct RecordingStore {
    recording: RwLock<Recording>,
    last_updated: AtomicU64,
    live: AtomicBool,
}

impl RecordingStore {
    pub fn new(recording: Recording) -> Self {
        Self {
            recording: RwLock::new(recording),
            last_updated: AtomicU64::new(1),
            live: AtomicBool::new(false),
        }
    }

    /// Empty store that a capture source is about to fill
    pub fn live(name: &str) -> Self {
        let store = Self::new(Recording::new(name));
        store.live.store(true, Ordering::SeqCst);
        store
    }

    /// Acquire the read lock. Queries are only reachable through the snapshot.
    pub fn read(&self) -> RecordingSnapshot<'_> {
        RecordingSnapshot {
            guard: self.recording.read(),
            version: self.last_updated.load(Ordering::Acquire),
        }
    }

    /// Acquire the write lock. The version is bumped when the writer drops.
    pub fn write(&self) -> RecordingWriter<'_> {
        RecordingWriter {
            guard: self.recording.write(),
            version: &self.last_updated,
        }
    }

    pub fn last_updated_version(&self) -> u64 {
        self.last_updated.load(Ordering::Acquire)
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }
}

pub struct RecordingWriter<'a> {
    guard: RwLockWriteGuard<'a, Recording>,
    version: &'a AtomicU64,
}

impl Deref for RecordingWriter<'_> {
    type Target = Recording;

    fn deref(&self) -> &Recording {
        &self.guard
    }
}

impl DerefMut for RecordingWriter<'_> {
    fn deref_mut(&mut self) -> &mut Recording {
        &mut self.guard
    }
}

impl Drop for RecordingWriter<'_> {
    fn drop(&mut self) {
        self.version.fetch_add(1, Ordering::Release);
    }
}

/// Consistent read-locked view of the recording.
///
/// A navigation cascade holds one snapshot from start to finish, so every
/// query it issues observes the same data even while capture is appending.
pub struct RecordingSnapshot<'a> {
    guard: RwLockReadGuard<'a, Recording>,
    version: u64,
}

impl<'a> RecordingSnapshot<'a> {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.guard.name
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }

    /// Copy of everything recorded so far, e.g. to save a live session
    pub fn to_recording(&self) -> Recording {
        self.guard.clone()
    }

    pub fn game_frame(&self, frame: usize) -> Option<&GameFrame> {
        self.guard.game_frames.get(frame)
    }

    pub fn game_frame_count(&self) -> usize {
        self.guard.game_frames.len()
    }

    pub fn solver_ids(&self) -> Vec<i32> {
        self.guard.solvers.keys().copied().collect()
    }

    pub fn solver_info(&self, solver_id: i32) -> Option<&SolverInfo> {
        self.solver(solver_id).map(|record| &record.info)
    }

    pub fn solver_frame_count(&self, solver_id: i32) -> Option<usize> {
        self.solver(solver_id).map(|record| record.frames.len())
    }

    pub fn has_network_sync_data(&self, solver_id: i32) -> bool {
        self.solver(solver_id)
            .is_some_and(SolverRecord::has_network_sync_data)
    }

    fn solver(&self, solver_id: i32) -> Option<&SolverRecord> {
        self.guard.solvers.get(&solver_id)
    }

    fn solver_frames(&self, solver_id: i32) -> &[SolverFrame] {
        self.solver(solver_id)
            .map(|record| record.frames.as_slice())
            .unwrap_or(&[])
    }

    pub fn solver_frame(&self, solver_id: i32, frame: usize, keyframe_only: bool) -> Option<&SolverFrame> {
        self.solver_frames(solver_id)
            .get(frame)
            .filter(|data| !keyframe_only || data.is_keyframe)
    }

    /// Nearest keyframe at or before `frame`
    pub fn find_nearest_keyframe(&self, solver_id: i32, frame: usize) -> Option<usize> {
        let frames = self.solver_frames(solver_id);
        if frame >= frames.len() {
            return None;
        }
        frames[..=frame].iter().rposition(|data| data.is_keyframe)
    }

    pub fn collapse_range(&self, solver_id: i32, from_keyframe: usize, to_frame: usize) -> Option<SolverFrame> {
        collapse_frames(self.solver_frames(solver_id), from_keyframe, to_frame)
    }

    /// Full-state frame data at `frame`, collapsed from its keyframe when needed
    pub fn resolved_solver_frame(&self, solver_id: i32, frame: usize) -> Option<Cow<'_, SolverFrame>> {
        let keyframe = self.find_nearest_keyframe(solver_id, frame)?;
        if keyframe == frame {
            self.solver_frame(solver_id, frame, true).map(Cow::Borrowed)
        } else {
            self.collapse_range(solver_id, keyframe, frame).map(Cow::Owned)
        }
    }

    /// Solvers with at least one frame recorded during the given game frame
    pub fn solver_ids_at_game_frame(&self, frame: usize) -> BTreeSet<i32> {
        let Some(game_frame) = self.game_frame(frame) else {
            return BTreeSet::new();
        };
        self.guard
            .solvers
            .iter()
            .filter(|(_, record)| first_frame_in_range(&record.frames, game_frame).is_some())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn lowest_solver_frame_at_game_frame(&self, solver_id: i32, game_frame: usize) -> Option<usize> {
        let game_frame = self.game_frame(game_frame)?;
        first_frame_in_range(self.solver_frames(solver_id), game_frame)
    }

    pub fn lowest_game_frame_at_solver_frame(&self, solver_id: i32, frame: usize) -> Option<usize> {
        let cycle = self.solver_frame(solver_id, frame, false)?.cycle;
        let game_frames = &self.guard.game_frames;
        let index = game_frames.partition_point(|game| game.end_cycle < cycle);
        game_frames
            .get(index)
            .filter(|game| game.contains_cycle(cycle))
            .map(|_| index)
    }

    /// Lowest frame recorded at or after `cycle`
    pub fn lowest_solver_frame_at_cycle(&self, solver_id: i32, cycle: u64) -> Option<usize> {
        let frames = self.solver_frames(solver_id);
        let index = frames.partition_point(|frame| frame.cycle < cycle);
        (index < frames.len()).then_some(index)
    }

    /// Lowest frame whose internal network tick is at or after `network_frame`
    pub fn lowest_solver_frame_at_network_frame(&self, solver_id: i32, network_frame: i32) -> Option<usize> {
        self.solver_frames(solver_id)
            .iter()
            .position(|frame| frame.network_frame.is_some_and(|tick| tick >= network_frame))
    }

    pub fn max_frames(&self, kind: TrackKind) -> usize {
        match kind {
            TrackKind::Game => self.game_frame_count(),
            TrackKind::Solver(id) => self.solver_frame_count(id).unwrap_or(0),
        }
    }

    /// Recorded duration of a frame in seconds
    pub fn frame_duration(&self, kind: TrackKind, frame: usize) -> Option<f64> {
        match kind {
            TrackKind::Game => self.game_frame(frame).map(GameFrame::duration),
            TrackKind::Solver(id) => self.solver_frame(id, frame, false).map(SolverFrame::duration),
        }
    }

    /// Owned copy of a frame, solver frames collapsed from their keyframe
    pub fn frame_data(&self, kind: TrackKind, frame: usize) -> Option<FrameData> {
        match kind {
            TrackKind::Game => self.game_frame(frame).cloned().map(FrameData::Game),
            TrackKind::Solver(id) => self
                .resolved_solver_frame(id, frame)
                .map(|data| FrameData::Solver(data.into_owned())),
        }
    }

    /// Stage names available when navigating to `frame`
    pub fn stage_names(&self, kind: TrackKind, frame: usize) -> Lookup<Vec<String>> {
        match kind {
            TrackKind::Game => match self.game_frame(frame) {
                Some(_) => Lookup::Empty,
                None => Lookup::NotFound,
            },
            TrackKind::Solver(id) => match self.resolved_solver_frame(id, frame) {
                Some(data) if data.stages.is_empty() => Lookup::Empty,
                Some(data) => Lookup::Found(data.stages.iter().map(|s| s.name.clone()).collect()),
                None => Lookup::NotFound,
            },
        }
    }

    pub fn last_stage(&self, kind: TrackKind, frame: usize) -> Lookup<usize> {
        match self.stage_names(kind, frame) {
            Lookup::Found(names) => Lookup::Found(names.len() - 1),
            Lookup::Empty => Lookup::Empty,
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

/// Per-kind behaviour looked up through a snapshot
impl TrackKind {
    pub fn max_frames(self, snapshot: &RecordingSnapshot<'_>) -> usize {
        snapshot.max_frames(self)
    }

    /// Stages a navigation to `frame` can land on
    pub fn stage_count(self, snapshot: &RecordingSnapshot<'_>, frame: usize) -> Lookup<usize> {
        match snapshot.stage_names(self, frame) {
            Lookup::Found(names) => Lookup::Found(names.len()),
            Lookup::Empty => Lookup::Empty,
            Lookup::NotFound => Lookup::NotFound,
        }
    }
}

fn first_frame_in_range(frames: &[SolverFrame], game_frame: &GameFrame) -> Option<usize> {
    let index = frames.partition_point(|frame| frame.cycle < game_frame.start_cycle);
    frames
        .get(index)
        .filter(|frame| game_frame.contains_cycle(frame.cycle))
        .map(|_| index)
}
