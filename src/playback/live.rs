use super::error::Result;
use super::navigation::Cascade;
use crate::core::{Instigator, StageRequest, SyncMode, TrackKind};
use crate::scene::SceneSink;
use tracing::debug;

/// How far the game track may fall behind the newest live frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LagLimits {
    /// Lag beyond which the game track is pulled forward
    pub max_frames: usize,
    /// Lag kept behind the newest frame after pulling forward
    pub min_frames: usize,
}

impl LagLimits {
    pub fn new(max_frames: usize, min_frames: usize) -> Self {
        let min_frames = min_frames.max(1);
        Self {
            max_frames: max_frames.max(min_frames),
            min_frames,
        }
    }
}

/// Tracks what a live session has already been seen by the controller
#[derive(Debug, Default)]
pub struct LiveTail {
    last_seen_version: Option<u64>,
    first_frame_shown: bool,
}

impl LiveTail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `version` and report whether it differs from the last one seen
    pub fn observe(&mut self, version: u64) -> bool {
        let changed = self.last_seen_version != Some(version);
        self.last_seen_version = Some(version);
        changed
    }

    pub fn first_frame_shown(&self) -> bool {
        self.first_frame_shown
    }

    pub fn mark_first_frame_shown(&mut self, shown: bool) {
        self.first_frame_shown = shown;
    }
}

impl<S: SceneSink> Cascade<'_, '_, S> {
    /// Pull the game track forward when it lags too far behind the newest
    /// data. Only applies while something is playing. Returns the frame
    /// jumped to.
    pub fn bound_live_lag(&mut self, limits: LagLimits, mode: SyncMode) -> Result<Option<usize>> {
        if self.registry.playing_track().is_none() {
            return Ok(None);
        }
        let Some(game) = self.registry.find(TrackKind::Game) else {
            return Ok(None);
        };

        let lag = game.max_frames.saturating_sub(game.current_frame);
        if lag <= limits.max_frames {
            return Ok(None);
        }

        let target = game.max_frames.saturating_sub(limits.min_frames);
        if target == game.current_frame {
            return Ok(None);
        }
        debug!(
            "Live game track lagging {} frames behind, jumping to {}",
            lag, target
        );
        self.go_to_frame_and_sync(TrackKind::Game, target, StageRequest::At(0), Instigator::PLAYBACK, mode)?;
        Ok(Some(target))
    }
}
