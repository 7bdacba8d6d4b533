pub mod frame;
pub mod track;

pub use frame::{FrameData, GameFrame, ParticleId, ParticleState, SolverFrame, SolverStage};
pub use track::{
    Instigator, Lookup, PlaybackState, StageRequest, SyncMode, Track, TrackKind, TrackSnapshot,
    TrackType, GAME_TRACK_ID,
};
