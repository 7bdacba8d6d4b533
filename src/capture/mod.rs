pub mod manager;
pub mod source;
pub mod synthetic;

pub use manager::{CaptureManager, CaptureStats};
pub use source::{CaptureConfig, CaptureEvent, CaptureResult, CaptureSource, CaptureStatus};
pub use synthetic::{recording_events, SyntheticCapture};
