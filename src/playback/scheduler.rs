use super::error::{PlaybackError, Result};
use super::navigation::Cascade;
use crate::core::{Instigator, PlaybackState, StageRequest, SyncMode, TrackKind};
use crate::recording::RecordingSnapshot;
use crate::scene::SceneSink;

/// Per-tick inputs for advancing the playing track
#[derive(Debug, Clone)]
pub struct AdvanceOptions {
    pub mode: SyncMode,
    /// Fixed playback rate, overriding recorded frame durations
    pub frame_rate_override: Option<f32>,
    /// Used when a frame has no usable recorded duration
    pub fallback_frame_time: f64,
    pub live: bool,
    pub loop_playback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Not enough time accumulated, or nothing to play
    Idle,
    Moved { from: usize, to: usize },
    /// A recorded (non-live) track hit its last frame and stopped
    ReachedEnd { frame: usize },
}

/// Accumulates tick time and turns it into whole frames
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    accumulator: f64,
}

/// Landing stage used whenever playback moves a track on its own
pub fn landing_stage(kind: TrackKind) -> StageRequest {
    match kind {
        TrackKind::Game => StageRequest::At(0),
        TrackKind::Solver(_) => StageRequest::Last,
    }
}

/// Seconds one frame of `kind` should stay on screen
pub fn target_frame_time(
    snapshot: &RecordingSnapshot<'_>,
    kind: TrackKind,
    frame: usize,
    frame_rate_override: Option<f32>,
    fallback: f64,
) -> f64 {
    if let Some(fps) = frame_rate_override.filter(|fps| *fps > 0.0) {
        return 1.0 / fps as f64;
    }
    snapshot
        .frame_duration(kind, frame)
        .filter(|duration| *duration > 0.0)
        .unwrap_or(fallback)
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }

    /// Add `dt` seconds and return how many whole frames of `frame_time` fit
    pub fn frames_to_advance(&mut self, dt: f64, frame_time: f64) -> usize {
        if frame_time <= 0.0 || !dt.is_finite() {
            return 0;
        }
        self.accumulator += dt.max(0.0);
        let frames = (self.accumulator / frame_time).floor();
        self.accumulator -= frames * frame_time;
        frames as usize
    }

    /// Advance the playing track by however many frames the elapsed time covers
    pub fn advance<S: SceneSink>(
        &mut self,
        cascade: &mut Cascade<'_, '_, S>,
        kind: TrackKind,
        dt: f64,
        options: &AdvanceOptions,
    ) -> Result<Advance> {
        let track = cascade
            .registry
            .find(kind)
            .ok_or_else(|| PlaybackError::track_not_found(kind))?
            .clone();
        if !track.is_playing() {
            return Ok(Advance::Idle);
        }
        let Some(last) = track.last_frame() else {
            return Ok(Advance::Idle);
        };

        let frame_time = target_frame_time(
            cascade.snapshot,
            kind,
            track.current_frame,
            options.frame_rate_override,
            options.fallback_frame_time,
        );
        let frames = self.frames_to_advance(dt, frame_time);
        if frames == 0 {
            return Ok(Advance::Idle);
        }

        let next = if track.is_at_end() && options.loop_playback && !options.live {
            0
        } else {
            (track.current_frame + frames).min(last)
        };

        // Time past the last frame is dropped, so a live track waiting at
        // the edge does not jump ahead once more data arrives
        if track.current_frame + frames > last {
            self.reset();
        }
        if next != track.current_frame {
            cascade.go_to_frame_and_sync(kind, next, landing_stage(kind), Instigator::PLAYBACK, options.mode)?;
        }

        if !options.live && !options.loop_playback && next == last {
            if let Some(track) = cascade.registry.find_mut(kind) {
                track.state = PlaybackState::Stopped;
                cascade.updates.push_track(track, Instigator::PLAYBACK);
            }
            self.reset();
            return Ok(Advance::ReachedEnd { frame: next });
        }

        if next == track.current_frame {
            Ok(Advance::Idle)
        } else {
            Ok(Advance::Moved {
                from: track.current_frame,
                to: next,
            })
        }
    }
}
