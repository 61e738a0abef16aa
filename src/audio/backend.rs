use tokio::sync::mpsc;

use super::item::{ItemId, PlayableItem};

/// Why playback of an item stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Reached the end of the audio.
    Finished,
    /// Stopped through the backend's stop primitive (skip).
    Stopped,
    /// Preempted by another start on the same backend.
    Replaced,
    /// Could not be loaded or decoded.
    LoadFailed,
}

impl EndReason {
    /// Whether the scheduler should move on to the next queued item.
    pub fn may_start_next(self) -> bool {
        !matches!(self, EndReason::Replaced)
    }
}

/// End-of-track notification emitted by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEnd {
    pub item: ItemId,
    pub reason: EndReason,
}

pub type TrackEndSender = mpsc::UnboundedSender<TrackEnd>;
pub type TrackEndReceiver = mpsc::UnboundedReceiver<TrackEnd>;

/// Audio output for a single guild.
///
/// Every call is fire-and-forget and must not block. Implementations report
/// each started item's end exactly once through their [`TrackEndSender`],
/// never by calling back into the scheduler from inside one of these methods.
pub trait PlaybackBackend: Send + Sync {
    /// Starts `item`. With `takeover` the current output is preempted at once.
    fn start(&self, item: &PlayableItem, takeover: bool);

    fn stop(&self);

    fn pause(&self, paused: bool);

    fn is_playing(&self) -> bool;

    /// Whether the guild has an established voice connection.
    fn is_connected(&self) -> bool;
}
