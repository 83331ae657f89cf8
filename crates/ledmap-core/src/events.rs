//! Show-wide event bus
//!
//! Players, outputs and the replay engine publish [`ShowEvent`]s; anything
//! interested (the synchronizer, status publishers, tests) subscribes and gets
//! its own channel. A subscription ends when its receiver is dropped.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clip::ClipId;
use crate::output::OutputId;
use crate::status::PlayState;

/// Identifier of a player
pub type PlayerId = u64;

/// Something that happened in the show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ShowEvent {
    /// A player switched to another playlist entry
    ClipChanged {
        player: PlayerId,
        clip_index: usize,
        clip_id: ClipId,
    },
    /// A clip finished its last loop
    PlaybackCompleted { player: PlayerId, clip_index: usize },
    /// Play state changed
    StateChanged { player: PlayerId, state: PlayState },
    /// An output could not transmit this tick
    OutputError { output: OutputId, message: String },
    /// A layer source failed and was replaced by a blank frame
    SourceError {
        player: PlayerId,
        layer_id: u64,
        message: String,
    },
    /// An effect failed and was disabled
    PluginDisabled {
        player: PlayerId,
        layer_id: u64,
        plugin: String,
        reason: String,
    },
    ReplayStarted { name: String },
    ReplayStopped { name: String },
}

/// Fan-out publisher
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<ShowEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// New subscription receiving every event published from now on
    pub fn subscribe(&self) -> Receiver<ShowEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber; dropped subscribers are pruned.
    pub fn publish(&self, event: ShowEvent) {
        trace!("event: {:?}", event);
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_prune() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(ShowEvent::PlaybackCompleted {
            player: 1,
            clip_index: 0,
        });
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());

        drop(b);
        bus.publish(ShowEvent::ReplayStopped {
            name: "x".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 1);
        assert!(a.try_recv().is_ok());
    }
}
