use super::error::{PlaybackError, Result};
use super::live::LiveTail;
use super::navigation::Cascade;
use super::registry::TrackRegistry;
use super::scheduler::{landing_stage, Advance, AdvanceOptions, PlaybackScheduler};
use super::updates::{PlaybackEvent, PlaybackObserver, UpdateQueue};
use crate::config::PlaybackSettings;
use crate::core::{
    FrameData, Instigator, Lookup, PlaybackState, StageRequest, SyncMode, TrackKind, TrackSnapshot, TrackType,
};
use crate::recording::{RecordingSnapshot, RecordingStore};
use crate::scene::{ParticleScene, SceneSink};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives every track of one recording: commands, per-tick advance and
/// live tailing. Observers are only notified from [`tick`](Self::tick) and
/// [`broadcast_pending_updates`](Self::broadcast_pending_updates), never
/// while the recording is locked.
pub struct PlaybackController<S: SceneSink = ParticleScene> {
    store: Option<Arc<RecordingStore>>,
    registry: TrackRegistry,
    scene: S,
    updates: UpdateQueue,
    observers: Vec<Box<dyn PlaybackObserver>>,
    settings: PlaybackSettings,
    active_track: Option<TrackKind>,
    scheduler: PlaybackScheduler,
    live_tail: LiveTail,
}

fn report<T>(action: &str, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        warn!("{} failed: {}", action, err);
    }
    result
}

impl PlaybackController<ParticleScene> {
    pub fn new(settings: PlaybackSettings) -> Self {
        Self::with_scene(ParticleScene::new(), settings)
    }
}

impl<S: SceneSink> PlaybackController<S> {
    pub fn with_scene(scene: S, settings: PlaybackSettings) -> Self {
        Self {
            store: None,
            registry: TrackRegistry::new(),
            scene,
            updates: UpdateQueue::new(),
            observers: Vec::new(),
            settings: settings.sanitized(),
            active_track: None,
            scheduler: PlaybackScheduler::new(),
            live_tail: LiveTail::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn PlaybackObserver>) {
        self.observers.push(observer);
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.settings.sync_mode
    }

    pub fn active_track(&self) -> Option<TrackKind> {
        self.active_track
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_some()
    }

    pub fn is_live(&self) -> bool {
        self.store.as_ref().is_some_and(|store| store.is_live())
    }

    /// A live session with a track currently playing
    pub fn is_playing_live_session(&self) -> bool {
        self.is_live() && self.registry.playing_track().is_some()
    }

    pub fn pending_updates(&self) -> usize {
        self.updates.len()
    }

    fn store(&self) -> Result<Arc<RecordingStore>> {
        self.store.clone().ok_or(PlaybackError::RecordingUnavailable)
    }

    fn cascade<'c, 's>(&'c mut self, snapshot: &'c RecordingSnapshot<'s>) -> Cascade<'c, 's, S> {
        Cascade {
            snapshot,
            registry: &mut self.registry,
            scene: &mut self.scene,
            updates: &mut self.updates,
            stage_drift_tolerance: self.settings.stage_drift_tolerance,
        }
    }

    fn set_state(&mut self, kind: TrackKind, state: PlaybackState) {
        if let Some(track) = self.registry.find_mut(kind) {
            if track.state != state {
                track.state = state;
                self.updates.push_track(track, Instigator::PLAYBACK);
            }
        }
    }

    // Lifecycle

    pub fn load_recording(&mut self, store: Arc<RecordingStore>) {
        self.registry.stop_all();
        self.scheduler.reset();
        self.live_tail.reset();
        self.store = Some(store.clone());

        let live = store.is_live();
        let snapshot = store.read();
        self.live_tail.observe(snapshot.version());
        self.refresh_tracks(&snapshot, live);
        info!(
            "Loaded {} recording '{}' with {} tracks",
            if live { "live" } else { "recorded" },
            snapshot.name(),
            self.registry.len()
        );
        drop(snapshot);
        self.updates.push_identity_changed();
    }

    pub fn unload_recording(&mut self) {
        if self.store.take().is_none() {
            return;
        }
        self.registry.clear();
        self.active_track = None;
        self.scheduler.reset();
        self.live_tail.reset();
        info!("Recording unloaded");
        self.updates.push_identity_changed();
    }

    /// Start over on the current store after its live source reconnected
    pub fn reconnect(&mut self) -> Result<()> {
        let store = self.store()?;
        self.registry.stop_all();
        self.scheduler.reset();
        self.live_tail.reset();

        let snapshot = store.read();
        self.live_tail.observe(snapshot.version());
        self.refresh_tracks(&snapshot, store.is_live());
        drop(snapshot);
        info!("Reconnected to '{}'", store.read().name());
        self.updates.push_identity_changed();
        Ok(())
    }

    fn refresh_tracks(&mut self, snapshot: &RecordingSnapshot<'_>, live: bool) {
        for kind in self.registry.discover(snapshot) {
            if let Some(track) = self.registry.find(kind) {
                self.updates.push_track(track, Instigator::PLAYBACK);
            }
        }

        if self.registry.is_empty() {
            self.active_track = None;
            self.live_tail.mark_first_frame_shown(false);
            return;
        }
        // A track whose data vanished on reload stays registered but empty
        let active_has_data = self
            .active_track
            .and_then(|kind| self.registry.find(kind))
            .is_some_and(|track| track.max_frames > 0);
        if !active_has_data {
            let registry = &self.registry;
            let kinds = registry.kinds();
            self.active_track = kinds
                .iter()
                .copied()
                .find(|kind| registry.find(*kind).is_some_and(|track| track.max_frames > 0))
                .or_else(|| kinds.first().copied());
        }

        let has_game_data = self
            .registry
            .find(TrackKind::Game)
            .is_some_and(|track| track.max_frames > 0);
        if has_game_data && !self.live_tail.first_frame_shown() {
            self.live_tail.mark_first_frame_shown(true);
            self.show_first_frame(snapshot, live);
        }
    }

    fn show_first_frame(&mut self, snapshot: &RecordingSnapshot<'_>, live: bool) {
        let mode = self.settings.sync_mode;
        let shown = self.cascade(snapshot).go_to_frame_and_sync(
            TrackKind::Game,
            0,
            StageRequest::At(0),
            Instigator::PLAYBACK,
            mode,
        );
        if let Err(err) = shown {
            warn!("Could not show the first game frame: {}", err);
            return;
        }
        if live {
            info!("First live data arrived, playing");
            self.set_state(TrackKind::Game, PlaybackState::Playing);
            self.active_track = Some(TrackKind::Game);
            self.scheduler.reset();
        }
    }

    // Commands

    pub fn play(&mut self, kind: TrackKind) -> Result<()> {
        let result = self.try_play(kind);
        report("Play", result)
    }

    fn try_play(&mut self, kind: TrackKind) -> Result<()> {
        let store = self.store()?;
        let mode = self.settings.sync_mode;
        let track = self
            .registry
            .find(kind)
            .ok_or_else(|| PlaybackError::track_not_found(kind))?;
        if track.is_playing() {
            return Ok(());
        }
        if track.max_frames == 0 {
            return Err(PlaybackError::frame_not_found(kind, 0));
        }
        let restart = track.state == PlaybackState::Stopped && track.is_at_end() && !store.is_live();
        if !track.is_compatible_with(mode) {
            let snapshot = store.read();
            if let Some(leader) = self.cascade(&snapshot).compatible_track_at(kind, mode) {
                info!("{} is now the active track", leader);
                self.active_track = Some(leader);
            }
            return Err(PlaybackError::IncompatibleSyncMode { track: kind, mode });
        }

        if restart {
            let snapshot = store.read();
            self.cascade(&snapshot)
                .go_to_frame_and_sync(kind, 0, landing_stage(kind), Instigator::PLAYBACK, mode)?;
        }

        if let Some(other) = self.registry.playing_track() {
            warn!("{} is already playing, pausing it to play {}", other, kind);
            self.set_state(other, PlaybackState::Paused);
        }
        self.set_state(kind, PlaybackState::Playing);
        self.active_track = Some(kind);
        self.scheduler.reset();
        Ok(())
    }

    pub fn pause(&mut self, kind: TrackKind) -> Result<()> {
        if self.registry.find(kind).is_none() {
            return report("Pause", Err(PlaybackError::track_not_found(kind)));
        }
        self.set_state(kind, PlaybackState::Paused);
        self.scheduler.reset();
        Ok(())
    }

    /// Rewind `kind` to frame 0 and stop everything that is playing
    pub fn stop(&mut self, kind: TrackKind) -> Result<()> {
        let result = self.try_stop(kind);
        report("Stop", result)
    }

    fn try_stop(&mut self, kind: TrackKind) -> Result<()> {
        let store = self.store()?;
        let mode = self.settings.sync_mode;
        let snapshot = store.read();
        self.cascade(&snapshot)
            .go_to_frame_and_sync(kind, 0, landing_stage(kind), Instigator::PLAYBACK, mode)?;
        drop(snapshot);

        for other in self.registry.kinds() {
            if self.registry.find(other).is_some_and(|track| track.is_playing()) {
                self.set_state(other, PlaybackState::Stopped);
            }
        }
        self.set_state(kind, PlaybackState::Stopped);
        self.scheduler.reset();
        Ok(())
    }

    pub fn next(&mut self, kind: TrackKind) -> Result<()> {
        let result = self.step(kind, true);
        report("Next", result)
    }

    pub fn prev(&mut self, kind: TrackKind) -> Result<()> {
        let result = self.step(kind, false);
        report("Prev", result)
    }

    fn step(&mut self, kind: TrackKind, forward: bool) -> Result<()> {
        let store = self.store()?;
        let mode = self.settings.sync_mode;
        let track = self
            .registry
            .find(kind)
            .ok_or_else(|| PlaybackError::track_not_found(kind))?;
        if track.is_playing() {
            return Err(PlaybackError::NotPermitted {
                action: if forward { "next" } else { "prev" },
                track: kind,
            });
        }

        let target = if forward {
            track.current_frame + 1
        } else {
            match track.current_frame.checked_sub(1) {
                Some(frame) => frame,
                None => {
                    debug!("{} is already at its first frame", kind);
                    return Ok(());
                }
            }
        };
        let was_stopped = track.state == PlaybackState::Stopped;

        let snapshot = store.read();
        self.cascade(&snapshot)
            .go_to_frame_and_sync(kind, target, landing_stage(kind), Instigator::PLAYBACK, mode)?;
        drop(snapshot);

        if was_stopped {
            self.set_state(kind, PlaybackState::Paused);
        }
        Ok(())
    }

    pub fn go_to_frame(
        &mut self,
        kind: TrackKind,
        frame: usize,
        stage: StageRequest,
        instigator: Instigator,
    ) -> Result<()> {
        let result = self.try_go_to_frame(kind, frame, stage, instigator);
        report("Go to frame", result)
    }

    fn try_go_to_frame(
        &mut self,
        kind: TrackKind,
        frame: usize,
        stage: StageRequest,
        instigator: Instigator,
    ) -> Result<()> {
        let store = self.store()?;
        let mode = self.settings.sync_mode;
        let snapshot = store.read();
        self.cascade(&snapshot)
            .go_to_frame_and_sync(kind, frame, stage, instigator, mode)
    }

    /// Switch sync mode. When the active track cannot take part in the new
    /// mode, playback moves to a compatible solver at the same position, or
    /// pauses if there is none.
    pub fn set_sync_mode(&mut self, mode: SyncMode) {
        if self.settings.sync_mode == mode {
            return;
        }
        info!("Sync mode {:?} -> {:?}", self.settings.sync_mode, mode);
        self.settings.sync_mode = mode;

        let Some(active) = self.active_track else {
            return;
        };
        let Some(track) = self.registry.find(active) else {
            return;
        };
        if track.is_compatible_with(mode) {
            return;
        }
        let was_playing = track.is_playing();

        let mut leader = None;
        if let Some(store) = self.store.clone() {
            let snapshot = store.read();
            let mut cascade = self.cascade(&snapshot);
            if let Some(candidate) = cascade.compatible_track_at(active, mode) {
                match cascade.align(active, candidate, Instigator::PLAYBACK, mode) {
                    Ok(()) => {
                        cascade.propagate(candidate, Instigator::PLAYBACK, mode);
                        leader = Some(candidate);
                    }
                    Err(err) => debug!("Could not align {} with {}: {}", candidate, active, err),
                }
            }
        }

        match leader {
            Some(leader) => {
                info!("{} cannot sync in {:?} mode, switching to {}", active, mode, leader);
                if was_playing {
                    self.set_state(active, PlaybackState::Paused);
                    self.set_state(leader, PlaybackState::Playing);
                    self.scheduler.reset();
                }
                self.active_track = Some(leader);
            }
            None => {
                warn!("No track at the current position can sync in {:?} mode, pausing", mode);
                if was_playing {
                    self.set_state(active, PlaybackState::Paused);
                }
            }
        }
    }

    pub fn set_frame_rate_override(&mut self, fps: f32) -> Result<()> {
        if !fps.is_finite() || fps <= 0.0 {
            return report("Set frame rate", Err(PlaybackError::InvalidFrameRate(fps)));
        }
        self.settings.frame_rate_override = Some(fps);
        self.scheduler.reset();
        Ok(())
    }

    pub fn use_frame_rate_override(&mut self, enabled: bool) {
        self.settings.use_frame_rate_override = enabled;
        self.scheduler.reset();
    }

    pub fn set_loop_playback(&mut self, enabled: bool) {
        self.settings.loop_playback = enabled;
    }

    /// Pin the stage solver navigation lands on to the track's current stage
    pub fn lock_stage(&mut self, kind: TrackKind) -> Result<()> {
        let Some(track) = self.registry.find_mut(kind) else {
            return report("Lock stage", Err(PlaybackError::track_not_found(kind)));
        };
        track.locked_stage = Some(track.current_stage);
        self.updates.push_track(track, Instigator::PLAYBACK);
        Ok(())
    }

    pub fn unlock_stage(&mut self, kind: TrackKind) -> Result<()> {
        let Some(track) = self.registry.find_mut(kind) else {
            return report("Unlock stage", Err(PlaybackError::track_not_found(kind)));
        };
        track.locked_stage = None;
        self.updates.push_track(track, Instigator::PLAYBACK);
        Ok(())
    }

    pub fn set_track_sync_enabled(&mut self, kind: TrackKind, enabled: bool) -> Result<()> {
        let Some(track) = self.registry.find_mut(kind) else {
            return report("Set sync", Err(PlaybackError::track_not_found(kind)));
        };
        track.sync_enabled = enabled;
        self.updates.push_track(track, Instigator::PLAYBACK);
        Ok(())
    }

    pub fn set_active_track(&mut self, kind: TrackKind) -> Result<()> {
        let result = self.try_set_active_track(kind);
        report("Set active track", result)
    }

    fn try_set_active_track(&mut self, kind: TrackKind) -> Result<()> {
        let store = self.store()?;
        let mode = self.settings.sync_mode;
        let track = self
            .registry
            .find(kind)
            .ok_or_else(|| PlaybackError::track_not_found(kind))?;
        if !track.is_compatible_with(mode) {
            let snapshot = store.read();
            if let Some(leader) = self.cascade(&snapshot).compatible_track_at(kind, mode) {
                self.active_track = Some(leader);
            }
            return Err(PlaybackError::IncompatibleSyncMode { track: kind, mode });
        }
        self.active_track = Some(kind);
        Ok(())
    }

    // Queries

    pub fn track(&self, kind: TrackKind) -> Option<TrackSnapshot> {
        self.registry.find(kind).cloned()
    }

    pub fn tracks(&self, track_type: TrackType) -> Vec<TrackSnapshot> {
        self.registry.list_by_type(track_type).into_iter().cloned().collect()
    }

    pub fn all_tracks(&self) -> Vec<TrackSnapshot> {
        self.registry
            .kinds()
            .into_iter()
            .filter_map(|kind| self.registry.find(kind).cloned())
            .collect()
    }

    /// Tracks of `track_type` with data at `reference`'s current game frame
    pub fn tracks_at_frame(&self, track_type: TrackType, reference: TrackKind) -> Vec<TrackKind> {
        let (Some(store), Some(reference)) = (self.store.as_ref(), self.registry.find(reference)) else {
            return Vec::new();
        };
        self.registry.list_at_frame(&store.read(), track_type, reference)
    }

    /// `from`'s current frame expressed in `to`'s frame numbers
    pub fn convert_current_frame(&self, from: TrackKind, to: TrackKind) -> Option<usize> {
        let store = self.store.as_ref()?;
        let frame = self.registry.find(from)?.current_frame;
        from.convert_to(&store.read(), frame, to, self.settings.sync_mode)
    }

    pub fn stages_at_frame(&self, kind: TrackKind, frame: usize) -> Lookup<Vec<String>> {
        match &self.store {
            Some(store) => store.read().stage_names(kind, frame),
            None => Lookup::NotFound,
        }
    }

    pub fn last_stage_at_frame(&self, kind: TrackKind, frame: usize) -> Lookup<usize> {
        match &self.store {
            Some(store) => store.read().last_stage(kind, frame),
            None => Lookup::NotFound,
        }
    }

    pub fn frame_data(&self, kind: TrackKind, frame: usize) -> Option<FrameData> {
        self.store.as_ref()?.read().frame_data(kind, frame)
    }

    pub fn current_frame_data(&self, kind: TrackKind) -> Option<FrameData> {
        let track = self.registry.find(kind)?;
        if !track.frame_loaded {
            return None;
        }
        self.frame_data(kind, track.current_frame)
    }

    // Per tick

    /// Advance playback by `delta` and notify observers. Discovery, advance
    /// and live catch-up share one read lock; observers run after it is
    /// released.
    pub fn tick(&mut self, delta: Duration) {
        if let Some(store) = self.store.clone() {
            let snapshot = store.read();
            let live = store.is_live();

            // Not gated on `live`: the last batch of a capture may land just
            // before the store stops being live
            if self.live_tail.observe(snapshot.version()) {
                debug!("Recording at version {}", snapshot.version());
                self.refresh_tracks(&snapshot, live);
            }

            self.advance_playing_track(&snapshot, delta.as_secs_f64(), live);

            if live {
                let limits = self.settings.lag_limits();
                let mode = self.settings.sync_mode;
                if let Err(err) = self.cascade(&snapshot).bound_live_lag(limits, mode) {
                    warn!("Could not catch up with live data: {}", err);
                }
            }
        }
        self.broadcast_pending_updates();
    }

    fn advance_playing_track(&mut self, snapshot: &RecordingSnapshot<'_>, dt: f64, live: bool) {
        let Some(kind) = self.registry.playing_track() else {
            return;
        };
        let options = AdvanceOptions {
            mode: self.settings.sync_mode,
            frame_rate_override: self.settings.active_frame_rate(),
            fallback_frame_time: self.settings.fallback_frame_time_secs,
            live,
            loop_playback: self.settings.loop_playback,
        };
        let mut cascade = Cascade {
            snapshot,
            registry: &mut self.registry,
            scene: &mut self.scene,
            updates: &mut self.updates,
            stage_drift_tolerance: self.settings.stage_drift_tolerance,
        };

        match self.scheduler.advance(&mut cascade, kind, dt, &options) {
            Ok(Advance::ReachedEnd { frame }) => info!("{} reached its last frame ({})", kind, frame),
            Ok(_) => {}
            Err(err) => {
                warn!("Playback of {} halted: {}", kind, err);
                self.set_state(kind, PlaybackState::Paused);
                self.scheduler.reset();
            }
        }
    }

    /// Deliver queued events to every observer in FIFO order
    pub fn broadcast_pending_updates(&mut self) {
        let events = self.updates.drain();
        for event in &events {
            for observer in self.observers.iter_mut() {
                match event {
                    PlaybackEvent::TrackUpdated(update) => observer.on_track_updated(&update.track, update.instigator),
                    PlaybackEvent::RecordingIdentityChanged => observer.on_recording_identity_changed(),
                }
            }
        }
    }
}
