use crate::query::{Nonce, Query};
use astrald_identity::Identity;
use tokio::sync::broadcast;

/// router-level occurrences other parts of the node want to observe
///
/// a `Receiver` that falls behind drops the oldest events
/// ([`broadcast::error::RecvError::Lagged`]); subscribers that need a
/// complete history should not rely on this bus for replay.
#[derive(Debug, Clone)]
pub enum Event {
    LinkUp { identity: Identity },
    LinkDown { identity: Identity },
    ServiceRegistered { identity: Identity, name: String },
    ServiceReleased { identity: Identity, name: String },
    QueryOpened { query: Query },
    QueryClosed { nonce: Nonce },
}

pub type EventSender = broadcast::Sender<Event>;
pub type EventReceiver = broadcast::Receiver<Event>;

/// default capacity for a node's event bus
pub const DEFAULT_CAPACITY: usize = 256;

pub fn channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}
