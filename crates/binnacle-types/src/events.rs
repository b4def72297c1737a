//! Journal event notifications.
//!
//! The journal announces every persisted mutation on an [`EventBus`] so that
//! callers (caches, replication daemons, UIs) can react without the journal
//! knowing who they are. Each notification is its own struct implementing the
//! [`Event`] marker trait, and each event type gets an independent broadcast
//! channel, created the first time someone subscribes to (or emits) it.
//! Emitting is fire-and-forget: no subscribers means the event vanishes, and
//! a failure to deliver never fails the journal operation that produced it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;

use crate::{InitId, ProfileId};

/// Marker trait for journal event payloads.
pub trait Event: Any + Send + Sync + Clone + std::fmt::Debug + 'static {}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A new dataset log was created under the active user log.
#[derive(Clone, Debug)]
pub struct DatasetInitialized {
    /// Identifier of the new dataset log.
    pub init_id: InitId,
    /// Dataset name at creation time.
    pub name: String,
}
impl Event for DatasetInitialized {}

/// A version save operation was appended to a dataset log.
#[derive(Clone, Debug)]
pub struct VersionSaved {
    /// Identifier of the dataset log.
    pub init_id: InitId,
    /// Content path of the saved version.
    pub path: String,
}
impl Event for VersionSaved {}

/// A foreign sub-log was merged into the local journal.
#[derive(Clone, Debug)]
pub struct LogMerged {
    /// The sending author.
    pub author: ProfileId,
    /// Identifier of the merged sub-log.
    pub init_id: InitId,
}
impl Event for LogMerged {}

/// A sub-log was removed from the local journal at its author's request.
#[derive(Clone, Debug)]
pub struct LogRemoved {
    /// The requesting author.
    pub author: ProfileId,
    /// Identifier of the removed sub-log.
    pub init_id: InitId,
}
impl Event for LogRemoved {}

/// The journal blob was re-signed and persisted.
#[derive(Clone, Debug)]
pub struct JournalSaved {
    /// Size of the persisted blob in bytes.
    pub bytes: usize,
}
impl Event for JournalSaved {}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Buffered events per channel before slow receivers start missing some.
const EVENT_BUFFER: usize = 128;

/// One broadcast sender per event type, keyed by `TypeId` and type-erased
/// for storage. Entries are only ever inserted by [`EventBus::subscribe`]
/// under their own type's id, so downcasting back to the concrete sender
/// cannot fail.
type ChannelTable = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Fan-out bus for journal events.
///
/// Cloning the bus is cheap and every clone feeds the same subscribers.
/// Emission never blocks and never reports failure to the emitter.
#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<Mutex<ChannelTable>>,
}

impl EventBus {
    /// Create a new bus with no channels yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `event` to current subscribers of its type, if any.
    pub fn emit<E: Event>(&self, event: E) {
        let table = self.channels.lock().expect("event channel table poisoned");

        if let Some(tx) = table
            .get(&TypeId::of::<E>())
            .and_then(|slot| slot.downcast_ref::<broadcast::Sender<E>>())
        {
            // A send error just means nobody is listening right now.
            let _ = tx.send(event);
        }
    }

    /// Open a receiver for events of type `E`.
    pub fn subscribe<E: Event>(&self) -> EventReceiver<E> {
        let mut table = self.channels.lock().expect("event channel table poisoned");

        let slot = table
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(broadcast::channel::<E>(EVENT_BUFFER).0));
        let tx = slot
            .downcast_ref::<broadcast::Sender<E>>()
            .expect("channel stored under wrong event type");

        EventReceiver { rx: tx.subscribe() }
    }
}

/// A subscription to one event type.
pub struct EventReceiver<E: Event> {
    rx: broadcast::Receiver<E>,
}

impl<E: Event> EventReceiver<E> {
    /// Wait for the next event, or `None` once the bus is gone.
    ///
    /// A receiver that fell behind skips the missed events (with a warning)
    /// and resumes at the oldest one still buffered.
    pub async fn recv(&mut self) -> Option<E> {
        use broadcast::error::RecvError;

        loop {
            match self.rx.recv().await {
                Ok(event) => break Some(event),
                Err(RecvError::Closed) => break None,
                Err(RecvError::Lagged(missed)) => {
                    warn!(
                        missed,
                        event_type = std::any::type_name::<E>(),
                        "event receiver fell behind"
                    );
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
