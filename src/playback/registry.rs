use crate::core::{PlaybackState, Track, TrackKind, TrackType};
use crate::recording::RecordingSnapshot;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Additive registry of every track discovered in the recording
#[derive(Debug, Default)]
pub struct TrackRegistry {
    tracks: BTreeMap<TrackKind, Track>,
    next_slot: usize,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, kind: TrackKind) -> &mut Track {
        let next_slot = &mut self.next_slot;
        self.tracks.entry(kind).or_insert_with(|| {
            let slot = *next_slot;
            *next_slot += 1;
            debug!("Created track {} in slot {}", kind, slot);
            Track::new(kind, slot)
        })
    }

    pub fn find(&self, kind: TrackKind) -> Option<&Track> {
        self.tracks.get(&kind)
    }

    pub fn find_mut(&mut self, kind: TrackKind) -> Option<&mut Track> {
        self.tracks.get_mut(&kind)
    }

    pub fn find_by_slot(&self, slot: usize) -> Option<&Track> {
        self.tracks.values().find(|track| track.slot == slot)
    }

    pub fn list_by_type(&self, track_type: TrackType) -> Vec<&Track> {
        self.tracks
            .values()
            .filter(|track| track.kind.track_type() == track_type)
            .collect()
    }

    pub fn kinds(&self) -> Vec<TrackKind> {
        self.tracks.keys().copied().collect()
    }

    /// Tracks of `track_type` with data at the game frame matching the
    /// reference track's current position
    pub fn list_at_frame(
        &self,
        snapshot: &RecordingSnapshot<'_>,
        track_type: TrackType,
        reference: &Track,
    ) -> Vec<TrackKind> {
        let game_frame = match reference.kind {
            TrackKind::Game => Some(reference.current_frame),
            TrackKind::Solver(id) => snapshot.lowest_game_frame_at_solver_frame(id, reference.current_frame),
        };
        let Some(game_frame) = game_frame.filter(|frame| snapshot.game_frame(*frame).is_some()) else {
            return Vec::new();
        };

        match track_type {
            TrackType::Game => self
                .find(TrackKind::Game)
                .map(|track| vec![track.kind])
                .unwrap_or_default(),
            TrackType::Solver => snapshot
                .solver_ids_at_game_frame(game_frame)
                .into_iter()
                .map(TrackKind::Solver)
                .filter(|kind| self.tracks.contains_key(kind))
                .collect(),
        }
    }

    pub fn playing_track(&self) -> Option<TrackKind> {
        self.tracks.values().find(|track| track.is_playing()).map(|track| track.kind)
    }

    /// Clear the playing flag on every track
    pub fn stop_all(&mut self) {
        for track in self.tracks.values_mut() {
            if track.is_playing() {
                track.state = PlaybackState::Stopped;
            }
        }
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.next_slot = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Bring the registry in line with the recording. Creates tracks for newly
    /// seen data and refreshes metadata of existing ones. Returns the kinds
    /// whose metadata changed, new tracks included.
    pub fn discover(&mut self, snapshot: &RecordingSnapshot<'_>) -> Vec<TrackKind> {
        if snapshot.is_empty() {
            if !self.is_empty() {
                info!("Recording is empty, clearing {} tracks", self.len());
                self.clear();
            }
            return Vec::new();
        }

        let mut present = Vec::new();
        if snapshot.game_frame_count() > 0 {
            present.push(TrackKind::Game);
        }
        present.extend(
            snapshot
                .solver_ids()
                .into_iter()
                .filter(|id| snapshot.solver_frame_count(*id).unwrap_or(0) > 0)
                .map(TrackKind::Solver),
        );

        let mut changed = Vec::new();
        for kind in present {
            let is_new = !self.tracks.contains_key(&kind);
            let before = self.tracks.get(&kind).cloned();
            let track = self.get_or_create(kind);

            track.max_frames = kind.max_frames(snapshot);
            track.can_show_controls = track.max_frames > 1;
            if let TrackKind::Solver(id) = kind {
                track.has_network_sync_data = snapshot.has_network_sync_data(id);
                track.is_server = snapshot.solver_info(id).is_some_and(|info| info.is_server);
            }
            if track.current_frame >= track.max_frames {
                track.current_frame = track.max_frames.saturating_sub(1);
                track.current_stage = 0;
                track.frame_loaded = false;
            }

            if is_new {
                info!("Discovered {} with {} frames", kind, track.max_frames);
            }
            if before.as_ref() != Some(&*track) {
                changed.push(kind);
            }
        }

        // Tracks whose data vanished on reload keep their counters but can no
        // longer be navigated
        for (kind, track) in self.tracks.iter_mut() {
            if kind.max_frames(snapshot) == 0 && track.max_frames != 0 {
                track.max_frames = 0;
                track.frame_loaded = false;
                changed.push(*kind);
            }
        }

        changed
    }
}
