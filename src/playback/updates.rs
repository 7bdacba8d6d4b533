//! Queue between locked navigation and observer notification.
//!
//! Navigation only ever pushes here while the recording is read-locked. The
//! controller drains the queue on its own tick after the lock is released,
//! so observers never run inside a navigation cascade.

use crate::core::{Instigator, Track, TrackSnapshot};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Immutable record of a successful navigation
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedUpdate {
    pub track: TrackSnapshot,
    pub instigator: Instigator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    TrackUpdated(QueuedUpdate),
    /// A recording was loaded, unloaded, or the live source reconnected
    RecordingIdentityChanged,
}

/// Receives playback notifications on the consumer thread
pub trait PlaybackObserver: Send {
    fn on_track_updated(&mut self, track: &TrackSnapshot, instigator: Instigator);

    fn on_recording_identity_changed(&mut self) {}
}

#[derive(Debug, Default)]
pub struct UpdateQueue {
    events: VecDeque<PlaybackEvent>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_track(&mut self, track: &Track, instigator: Instigator) {
        self.events.push_back(PlaybackEvent::TrackUpdated(QueuedUpdate {
            track: track.clone(),
            instigator,
        }));
    }

    pub fn push_identity_changed(&mut self) {
        self.events.push_back(PlaybackEvent::RecordingIdentityChanged);
    }

    /// Take every queued event in FIFO order
    pub fn drain(&mut self) -> Vec<PlaybackEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Logs every update
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl PlaybackObserver for LoggingObserver {
    fn on_track_updated(&mut self, track: &TrackSnapshot, instigator: Instigator) {
        debug!(
            "{} -> frame {}/{} stage {} ({:?}, by {})",
            track.kind,
            track.current_frame,
            track.max_frames,
            track.current_stage,
            track.state,
            instigator
        );
    }

    fn on_recording_identity_changed(&mut self) {
        info!("Recording changed");
    }
}

/// Forwards events to another task, e.g. a UI or network front end
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<PlaybackEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl PlaybackObserver for ChannelObserver {
    fn on_track_updated(&mut self, track: &TrackSnapshot, instigator: Instigator) {
        // A closed receiver just means nobody is listening anymore
        let _ = self.sender.send(PlaybackEvent::TrackUpdated(QueuedUpdate {
            track: track.clone(),
            instigator,
        }));
    }

    fn on_recording_identity_changed(&mut self) {
        let _ = self.sender.send(PlaybackEvent::RecordingIdentityChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TrackKind;

    #[test]
    fn test_queue_is_fifo_and_drains_once() {
        let mut queue = UpdateQueue::new();
        let mut track = Track::new(TrackKind::Game, 0);
        queue.push_track(&track, Instigator::PLAYBACK);
        track.current_frame = 3;
        queue.push_track(&track, Instigator::PLAYBACK);
        queue.push_identity_changed();

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        match &events[1] {
            PlaybackEvent::TrackUpdated(update) => assert_eq!(update.track.current_frame, 3),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events[2], PlaybackEvent::RecordingIdentityChanged);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_snapshot_is_a_value_copy() {
        let mut queue = UpdateQueue::new();
        let mut track = Track::new(TrackKind::Solver(1), 0);
        queue.push_track(&track, Instigator::PLAYBACK);
        track.current_frame = 8;

        match &queue.drain()[0] {
            PlaybackEvent::TrackUpdated(update) => assert_eq!(update.track.current_frame, 0),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_channel_observer_forwards() {
        let (mut observer, mut receiver) = ChannelObserver::new();
        observer.on_track_updated(&Track::new(TrackKind::Game, 0), Instigator::PLAYBACK);
        observer.on_recording_identity_changed();

        assert!(matches!(receiver.recv().await, Some(PlaybackEvent::TrackUpdated(_))));
        assert_eq!(receiver.recv().await, Some(PlaybackEvent::RecordingIdentityChanged));
    }
}
