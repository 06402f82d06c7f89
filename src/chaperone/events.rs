//! Boundary change notifications
//!
//! Fire-and-forget: the sync server never waits on listeners. Events that do
//! not fit in the channel, or have no receiver, are dropped.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

/// Default channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What happened to the live boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryEvent {
    /// A new boundary was committed as live
    Committed { wall_count: usize, play_area: (f32, f32) },
    /// The peer reported the boundary as unavailable; pending edits reverted
    Reset,
}

/// Sending half, cloned into whoever changes the boundary
#[derive(Clone)]
pub struct BoundaryNotifier {
    sender: Sender<BoundaryEvent>,
}

impl BoundaryNotifier {
    /// Notifier plus the receiver for the profile/geometry listener
    pub fn channel() -> (Self, Receiver<BoundaryEvent>) {
        let (sender, receiver) = bounded(EVENT_CHANNEL_CAPACITY);
        (Self { sender }, receiver)
    }

    /// Notifier whose events go nowhere
    pub fn detached() -> Self {
        let (notifier, _receiver) = Self::channel();
        notifier
    }

    pub fn notify(&self, event: BoundaryEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Boundary event channel full, dropped {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
