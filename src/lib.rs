//! Multi-track playback for recorded simulation sessions.
//!
//! A recording holds one game track and any number of solver tracks. The
//! [`PlaybackController`] plays, steps and seeks them, keeps the other tracks
//! in sync with the one being driven, and follows recordings that are still
//! being captured.

pub mod capture;
pub mod cli;
pub mod config;
pub mod core;
pub mod input;
pub mod playback;
pub mod recording;
pub mod scene;

pub use crate::config::PlaybackSettings;
pub use crate::core::{SyncMode, TrackKind, TrackType};
pub use crate::playback::{PlaybackController, PlaybackError, PlaybackObserver};
pub use crate::recording::{Recording, RecordingStore};
