use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Track id reported for the game track
pub const GAME_TRACK_ID: i32 = -1;

/// Coarse track type, used when listing tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackType {
    Game,
    Solver,
}

/// Identity of a track. Two tracks are the same track iff their kinds match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrackKind {
    Game,
    Solver(i32),
}

impl TrackKind {
    pub fn track_id(self) -> i32 {
        match self {
            TrackKind::Game => GAME_TRACK_ID,
            TrackKind::Solver(id) => id,
        }
    }

    pub fn track_type(self) -> TrackType {
        match self {
            TrackKind::Game => TrackType::Game,
            TrackKind::Solver(_) => TrackType::Solver,
        }
    }

    pub fn from_parts(track_type: TrackType, track_id: i32) -> Self {
        match track_type {
            TrackType::Game => TrackKind::Game,
            TrackType::Solver => TrackKind::Solver(track_id),
        }
    }

    pub fn is_game(self) -> bool {
        matches!(self, TrackKind::Game)
    }

    pub fn solver_id(self) -> Option<i32> {
        match self {
            TrackKind::Game => None,
            TrackKind::Solver(id) => Some(id),
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Game => write!(f, "Game"),
            TrackKind::Solver(id) => write!(f, "Solver {}", id),
        }
    }
}

/// Parses `game`, `solver:3` or a bare solver id such as `3`
impl std::str::FromStr for TrackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("game") {
            return Ok(TrackKind::Game);
        }
        let id = match s.split_once(':') {
            Some((prefix, id)) if prefix.eq_ignore_ascii_case("solver") => id,
            Some(_) => return Err(format!("unknown track: {}", s)),
            None => s,
        };
        id.trim()
            .parse::<i32>()
            .map(TrackKind::Solver)
            .map_err(|_| format!("unknown track: {}", s))
    }
}

/// Policy used to convert a frame of one track into another track's time-space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    #[default]
    RecordedTimestamp,
    NetworkTick,
    Manual,
    None,
}

impl SyncMode {
    /// Whether navigating one track moves the other sync-enabled tracks
    pub fn propagates(self) -> bool {
        matches!(self, SyncMode::RecordedTimestamp | SyncMode::NetworkTick)
    }

    pub fn is_compatible(self, kind: TrackKind, has_network_sync_data: bool) -> bool {
        match self {
            SyncMode::NetworkTick => !kind.is_game() && has_network_sync_data,
            _ => true,
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "recordedtimestamp" | "timestamp" => Ok(SyncMode::RecordedTimestamp),
            "networktick" | "tick" => Ok(SyncMode::NetworkTick),
            "manual" => Ok(SyncMode::Manual),
            "none" | "off" => Ok(SyncMode::None),
            other => Err(format!("unknown sync mode: {}", other)),
        }
    }
}

/// Playback state of a single track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Stage to land on when navigating a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRequest {
    /// Last stage available in the target frame
    Last,
    At(usize),
}

/// Three-way query result. `Empty` means the item exists but holds nothing,
/// which callers must not confuse with a missing item.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Empty,
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }
}

/// Opaque identity of whoever originated a navigation command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instigator(Uuid);

impl Instigator {
    /// Commands issued by the playback scheduler itself
    pub const PLAYBACK: Instigator = Instigator(Uuid::nil());

    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Instigator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Instigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Instigator::PLAYBACK {
            write!(f, "playback")
        } else {
            write!(f, "{}", self.0.as_simple())
        }
    }
}

/// One independent timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub kind: TrackKind,
    /// Stable small integer used for hotkey binding
    pub slot: usize,
    pub current_frame: usize,
    pub current_stage: usize,
    pub max_frames: usize,
    pub state: PlaybackState,
    pub sync_enabled: bool,
    pub has_network_sync_data: bool,
    pub is_server: bool,
    pub locked_stage: Option<usize>,
    pub is_resimulated: bool,
    pub can_show_controls: bool,
    /// Whether any frame has been applied to the scene for this track yet
    pub frame_loaded: bool,
}

/// Value copy of a track handed to observers
pub type TrackSnapshot = Track;

impl Track {
    pub fn new(kind: TrackKind, slot: usize) -> Self {
        Self {
            kind,
            slot,
            current_frame: 0,
            current_stage: 0,
            max_frames: 0,
            state: PlaybackState::Stopped,
            sync_enabled: true,
            has_network_sync_data: false,
            is_server: false,
            locked_stage: None,
            is_resimulated: false,
            can_show_controls: true,
            frame_loaded: false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_same_track(&self, other: &Track) -> bool {
        self.kind == other.kind
    }

    pub fn is_compatible_with(&self, mode: SyncMode) -> bool {
        mode.is_compatible(self.kind, self.has_network_sync_data)
    }

    pub fn last_frame(&self) -> Option<usize> {
        self.max_frames.checked_sub(1)
    }

    pub fn is_at_end(&self) -> bool {
        self.last_frame().is_some_and(|last| self.current_frame >= last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_identity_uses_kind() {
        let a = Track::new(TrackKind::Solver(3), 0);
        let mut b = Track::new(TrackKind::Solver(3), 7);
        b.current_frame = 12;
        assert!(a.is_same_track(&b));
        assert!(!a.is_same_track(&Track::new(TrackKind::Solver(4), 0)));
        assert!(!a.is_same_track(&Track::new(TrackKind::Game, 0)));
    }

    #[test]
    fn test_network_tick_compatibility() {
        assert!(!SyncMode::NetworkTick.is_compatible(TrackKind::Game, true));
        assert!(!SyncMode::NetworkTick.is_compatible(TrackKind::Solver(1), false));
        assert!(SyncMode::NetworkTick.is_compatible(TrackKind::Solver(1), true));
        assert!(SyncMode::RecordedTimestamp.is_compatible(TrackKind::Game, false));
    }

    #[test]
    fn test_sync_mode_parse() {
        assert_eq!("network-tick".parse::<SyncMode>(), Ok(SyncMode::NetworkTick));
        assert_eq!("Timestamp".parse::<SyncMode>(), Ok(SyncMode::RecordedTimestamp));
        assert_eq!("none".parse::<SyncMode>(), Ok(SyncMode::None));
        assert!("bogus".parse::<SyncMode>().is_err());
    }

    #[test]
    fn test_track_kind_parse() {
        assert_eq!("game".parse::<TrackKind>(), Ok(TrackKind::Game));
        assert_eq!("Solver:3".parse::<TrackKind>(), Ok(TrackKind::Solver(3)));
        assert_eq!("12".parse::<TrackKind>(), Ok(TrackKind::Solver(12)));
        assert!("camera:1".parse::<TrackKind>().is_err());
        assert!("solver:x".parse::<TrackKind>().is_err());
    }

    #[test]
    fn test_lookup_distinguishes_empty_from_missing() {
        let empty: Lookup<usize> = Lookup::Empty;
        assert!(!empty.is_not_found());
        assert_eq!(empty.found(), None);
        assert_eq!(Lookup::Found(4).found(), Some(4));
    }

    #[test]
    fn test_is_at_end() {
        let mut track = Track::new(TrackKind::Game, 0);
        assert!(!track.is_at_end());
        track.max_frames = 3;
        track.current_frame = 2;
        assert!(track.is_at_end());
    }

    #[test]
    fn test_playback_instigator_display() {
        assert_eq!(Instigator::PLAYBACK.to_string(), "playback");
        assert_ne!(Instigator::new(), Instigator::new());
    }
}
