//! Track navigation, synchronization and scheduling.
//!
//! [`PlaybackController`] is the entry point. Everything below it works on a
//! [`Cascade`], the bundle of state borrowed for one read lock on the
//! recording.

pub mod engine;
pub mod error;
pub mod live;
pub mod navigation;
pub mod registry;
pub mod scheduler;
pub mod sync;
pub mod updates;

pub use engine::PlaybackController;
pub use error::{MissingData, PlaybackError, Result};
pub use live::{LagLimits, LiveTail};
pub use navigation::Cascade;
pub use registry::TrackRegistry;
pub use scheduler::{landing_stage, target_frame_time, Advance, AdvanceOptions, PlaybackScheduler};
pub use sync::convert_frame;
pub use updates::{
    ChannelObserver, LoggingObserver, PlaybackEvent, PlaybackObserver, QueuedUpdate, UpdateQueue,
};
