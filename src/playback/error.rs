use crate::core::{SyncMode, TrackKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PlaybackError>;

/// What a failed lookup was looking for
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MissingData {
    #[error("track")]
    Track,
    #[error("frame {0}")]
    Frame(usize),
    #[error("keyframe at or before frame {0}")]
    Keyframe(usize),
}

/// Failures of playback commands. None of them leave state modified.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("{track}: {missing} not found")]
    DataNotFound { track: TrackKind, missing: MissingData },

    #[error("{track}: stage {stage} out of range at frame {frame} ({available} stages)")]
    InvalidStage {
        track: TrackKind,
        frame: usize,
        stage: usize,
        available: usize,
    },

    #[error("{track} cannot take part in {mode:?} sync")]
    IncompatibleSyncMode { track: TrackKind, mode: SyncMode },

    #[error("{action} is not permitted while {track} is playing")]
    NotPermitted { action: &'static str, track: TrackKind },

    #[error("invalid frame rate: {0}")]
    InvalidFrameRate(f32),

    #[error("no recording loaded")]
    RecordingUnavailable,
}

impl PlaybackError {
    pub fn track_not_found(track: TrackKind) -> Self {
        PlaybackError::DataNotFound {
            track,
            missing: MissingData::Track,
        }
    }

    pub fn frame_not_found(track: TrackKind, frame: usize) -> Self {
        PlaybackError::DataNotFound {
            track,
            missing: MissingData::Frame(frame),
        }
    }
}
