use super::error::{MissingData, PlaybackError, Result};
use super::registry::TrackRegistry;
use super::updates::UpdateQueue;
use crate::core::{Instigator, SolverFrame, StageRequest, TrackKind};
use crate::recording::RecordingSnapshot;
use crate::scene::SceneSink;
use std::borrow::Cow;
use std::collections::BTreeSet;
use tracing::trace;

/// Everything one navigation cascade needs, borrowed for the lifetime of a
/// single read lock on the recording.
pub struct Cascade<'c, 's, S: SceneSink> {
    pub snapshot: &'c RecordingSnapshot<'s>,
    pub registry: &'c mut TrackRegistry,
    pub scene: &'c mut S,
    pub updates: &'c mut UpdateQueue,
    /// Largest forward stage step applied without replaying from stage 0
    pub stage_drift_tolerance: usize,
}

impl<S: SceneSink> Cascade<'_, '_, S> {
    /// Move a track to `frame`/`stage` and queue an update. Nothing is
    /// modified when this fails.
    pub fn go_to_frame(&mut self, kind: TrackKind, frame: usize, stage: StageRequest, instigator: Instigator) -> Result<()> {
        let track = self
            .registry
            .find(kind)
            .ok_or_else(|| PlaybackError::track_not_found(kind))?;
        if frame >= track.max_frames {
            return Err(PlaybackError::frame_not_found(kind, frame));
        }

        match kind {
            TrackKind::Game => self.go_to_game_frame(frame, instigator),
            TrackKind::Solver(id) => self.go_to_solver_frame(id, frame, stage, instigator),
        }
    }

    fn go_to_game_frame(&mut self, frame: usize, instigator: Instigator) -> Result<()> {
        let kind = TrackKind::Game;
        let snapshot = self.snapshot;
        let game_frame = snapshot
            .game_frame(frame)
            .ok_or_else(|| PlaybackError::frame_not_found(kind, frame))?;

        let available = snapshot.solver_ids_at_game_frame(frame);
        let previous = match self.registry.find(kind) {
            Some(track) if track.frame_loaded => snapshot.solver_ids_at_game_frame(track.current_frame),
            _ => BTreeSet::new(),
        };
        let removed: BTreeSet<i32> = previous.difference(&available).copied().collect();

        self.scene.enter_new_frame(frame, &available, game_frame, &removed);
        for solver in self.registry.kinds().into_iter().filter(|k| !k.is_game()) {
            let visible = solver.solver_id().is_some_and(|id| available.contains(&id));
            if self.scene.visibility(solver) != visible {
                self.scene.set_visibility(solver, visible);
            }
        }

        let Some(track) = self.registry.find_mut(kind) else {
            return Err(PlaybackError::track_not_found(kind));
        };
        track.current_frame = frame;
        track.current_stage = 0;
        track.frame_loaded = true;
        self.updates.push_track(track, instigator);
        Ok(())
    }

    fn go_to_solver_frame(&mut self, solver_id: i32, frame: usize, stage: StageRequest, instigator: Instigator) -> Result<()> {
        let kind = TrackKind::Solver(solver_id);
        let snapshot = self.snapshot;
        let keyframe = snapshot
            .find_nearest_keyframe(solver_id, frame)
            .ok_or(PlaybackError::DataNotFound {
                track: kind,
                missing: MissingData::Keyframe(frame),
            })?;

        let data: Cow<'_, SolverFrame> = if keyframe == frame {
            snapshot.solver_frame(solver_id, frame, true).map(Cow::Borrowed)
        } else {
            snapshot.collapse_range(solver_id, keyframe, frame).map(Cow::Owned)
        }
        .ok_or_else(|| PlaybackError::frame_not_found(kind, frame))?;

        let track = self
            .registry
            .find(kind)
            .ok_or_else(|| PlaybackError::track_not_found(kind))?;
        let stage_count = data.stage_count();
        let target_stage = match stage {
            _ if stage_count == 0 => 0,
            StageRequest::Last => match track.locked_stage {
                Some(locked) if locked < stage_count => locked,
                _ => stage_count - 1,
            },
            StageRequest::At(index) if index < stage_count => index,
            StageRequest::At(index) => {
                return Err(PlaybackError::InvalidStage {
                    track: kind,
                    frame,
                    stage: index,
                    available: stage_count,
                })
            }
        };

        // Stages can only be replayed forward, so anything other than a small
        // step ahead within the same frame rebuilds from stage 0
        let is_new_frame = !track.frame_loaded || track.current_frame != frame;
        let stage_delta = target_stage as isize - track.current_stage as isize;
        let replay_all = is_new_frame || stage_delta < 0 || stage_delta > self.stage_drift_tolerance as isize;

        if stage_count == 0 {
            self.scene.apply_stage(solver_id, 0, None, &data);
        } else if replay_all {
            for (index, stage_data) in data.stages[..=target_stage].iter().enumerate() {
                self.scene.apply_stage(solver_id, index, Some(stage_data), &data);
            }
        } else {
            self.scene
                .apply_stage(solver_id, target_stage, Some(&data.stages[target_stage]), &data);
        }
        trace!(
            "{} frame {} stage {} (keyframe {}, full replay {})",
            kind,
            frame,
            target_stage,
            keyframe,
            replay_all
        );

        let is_resimulated = data.is_resimulated;
        let Some(track) = self.registry.find_mut(kind) else {
            return Err(PlaybackError::track_not_found(kind));
        };
        track.current_frame = frame;
        track.current_stage = target_stage;
        track.is_resimulated = is_resimulated;
        track.frame_loaded = true;
        self.updates.push_track(track, instigator);
        Ok(())
    }
}
