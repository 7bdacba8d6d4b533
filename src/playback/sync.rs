//! Cross-track frame conversion and propagation.
//!
//! Conversions between the game track and a solver track always match by
//! recorded timestamps, whatever the sync mode. Only solver to solver
//! conversion honours [`SyncMode::NetworkTick`].

use super::error::{PlaybackError, Result};
use super::navigation::Cascade;
use super::scheduler::landing_stage;
use crate::core::{Instigator, StageRequest, SyncMode, TrackKind, TrackType};
use crate::recording::RecordingSnapshot;
use crate::scene::SceneSink;
use tracing::{debug, warn};

/// Convert `frame` of track `from` into the matching frame of track `to`
pub fn convert_frame(
    snapshot: &RecordingSnapshot<'_>,
    from: TrackKind,
    frame: usize,
    to: TrackKind,
    mode: SyncMode,
) -> Option<usize> {
    match (from, to) {
        _ if from == to => Some(frame),
        (TrackKind::Game, TrackKind::Solver(to_id)) => snapshot.lowest_solver_frame_at_game_frame(to_id, frame),
        (TrackKind::Solver(from_id), TrackKind::Game) => snapshot.lowest_game_frame_at_solver_frame(from_id, frame),
        (TrackKind::Solver(from_id), TrackKind::Solver(to_id)) => {
            if mode == SyncMode::NetworkTick {
                if let Some(converted) = convert_by_network_tick(snapshot, from_id, frame, to_id) {
                    return Some(converted);
                }
                debug!(
                    "Network tick conversion from solver {} to {} unresolved, using timestamps",
                    from_id, to_id
                );
            }
            convert_by_timestamp(snapshot, from_id, frame, to_id)
        }
        (TrackKind::Game, TrackKind::Game) => Some(frame),
    }
}

fn convert_by_timestamp(snapshot: &RecordingSnapshot<'_>, from_id: i32, frame: usize, to_id: i32) -> Option<usize> {
    let cycle = snapshot.solver_frame(from_id, frame, false)?.cycle;
    snapshot.lowest_solver_frame_at_cycle(to_id, cycle)
}

fn convert_by_network_tick(snapshot: &RecordingSnapshot<'_>, from_id: i32, frame: usize, to_id: i32) -> Option<usize> {
    if !snapshot.has_network_sync_data(from_id) || !snapshot.has_network_sync_data(to_id) {
        return None;
    }
    let source_tick = snapshot.solver_frame(from_id, frame, false)?.network_frame?;
    // Ticks come from recorded data; an overflow leaves the conversion unresolved
    let server_tick = source_tick.checked_add(snapshot.solver_info(from_id)?.effective_tick_offset())?;
    let target_tick = server_tick.checked_sub(snapshot.solver_info(to_id)?.effective_tick_offset())?;
    snapshot.lowest_solver_frame_at_network_frame(to_id, target_tick)
}

impl TrackKind {
    /// `frame` of this track expressed in `to`'s frame numbers
    pub fn convert_to(self, snapshot: &RecordingSnapshot<'_>, frame: usize, to: TrackKind, mode: SyncMode) -> Option<usize> {
        convert_frame(snapshot, self, frame, to, mode)
    }
}

impl<S: SceneSink> Cascade<'_, '_, S> {
    /// Navigate a track and then bring every synced track along
    pub fn go_to_frame_and_sync(
        &mut self,
        kind: TrackKind,
        frame: usize,
        stage: StageRequest,
        instigator: Instigator,
        mode: SyncMode,
    ) -> Result<()> {
        self.go_to_frame(kind, frame, stage, instigator)?;
        self.propagate(kind, instigator, mode);
        Ok(())
    }

    /// Move every sync-enabled track to the frame matching `from`'s position
    pub fn propagate(&mut self, from: TrackKind, instigator: Instigator, mode: SyncMode) {
        let Some(source) = self.registry.find(from).cloned() else {
            return;
        };
        if !source.sync_enabled || !mode.propagates() {
            return;
        }

        if from.is_game() && !source.is_compatible_with(mode) {
            match self.compatible_track_at(from, mode) {
                Some(leader) => {
                    if let Err(err) = self.align(from, leader, instigator, mode) {
                        debug!("Could not move {} to follow {}: {}", leader, from, err);
                        return;
                    }
                    self.propagate(leader, instigator, mode);
                }
                None => warn!("No track at the current game frame can sync in {:?} mode", mode),
            }
            return;
        }

        let targets: Vec<TrackKind> = self
            .registry
            .kinds()
            .into_iter()
            .filter(|kind| *kind != from)
            .filter(|kind| self.registry.find(*kind).is_some_and(|track| track.sync_enabled))
            .collect();

        for target in targets {
            if let Err(err) = self.align(from, target, instigator, mode) {
                debug!("Skipped syncing {} to {}: {}", target, from, err);
            }
        }
    }

    /// First sync-enabled solver track with data at `reference`'s position
    /// that can take part in `mode`
    pub fn compatible_track_at(&self, reference: TrackKind, mode: SyncMode) -> Option<TrackKind> {
        let reference = self.registry.find(reference)?;
        self.registry
            .list_at_frame(self.snapshot, TrackType::Solver, reference)
            .into_iter()
            .find(|kind| {
                self.registry
                    .find(*kind)
                    .is_some_and(|track| track.sync_enabled && track.is_compatible_with(mode))
            })
    }

    /// Move `target` to the frame matching `source`'s current position
    pub fn align(&mut self, source: TrackKind, target: TrackKind, instigator: Instigator, mode: SyncMode) -> Result<()> {
        let source_frame = self
            .registry
            .find(source)
            .ok_or_else(|| PlaybackError::track_not_found(source))?
            .current_frame;
        let frame = source
            .convert_to(self.snapshot, source_frame, target, mode)
            .ok_or_else(|| PlaybackError::frame_not_found(target, source_frame))?;

        let already_there = self
            .registry
            .find(target)
            .is_some_and(|track| track.frame_loaded && track.current_frame == frame);
        if already_there {
            return Ok(());
        }

        self.go_to_frame(target, frame, landing_stage(target), instigator)
    }
}
