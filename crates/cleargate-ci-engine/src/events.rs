//! Event bus shared by the queues, the dispatcher and external consumers.
//!
//! The bus is a `tokio::sync::broadcast` channel: events reach receivers
//! subscribed at publication time. Publishing with no subscribers is not an
//! error. A broadcast receiver that falls more than the bus capacity behind
//! loses the oldest events.
//!
//! Consumers that must see every event of a kind (the completion listener
//! and the recipe dispatcher) use [`EventBus::subscribe_lossless`] instead.
//! Matching events are copied into an unbounded mpsc channel at publication
//! time and are never dropped.
//!
//! Deferred delivery goes through an [`Outbox`]: events appended during a
//! handling pass are held back and only reach the bus when the owner of the
//! outbox flushes it at the end of the pass.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::traits::AgentService;
use crate::types::{BuildRequestEvent, BuildResultId, Owner, RecipeId, RecipeRequest};

const DEFAULT_CAPACITY: usize = 1024;

/// An owner's build controller picked an agent for a recipe.
#[derive(Clone)]
pub struct RecipeAssignedEvent {
    pub recipe_id: RecipeId,
    pub agent: Arc<dyn AgentService>,
    pub request: RecipeRequest,
}

impl std::fmt::Debug for RecipeAssignedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeAssignedEvent")
            .field("recipe_id", &self.recipe_id)
            .field("agent", &self.agent.name())
            .field("request", &self.request)
            .finish()
    }
}

/// Everything that travels over the [`EventBus`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum BusEvent {
    /// A request received a build controller and started. Always published
    /// deferred.
    BuildActivated {
        request: BuildRequestEvent,
        build_number: u64,
    },
    /// A build finished; frees one unit of its owner's capacity.
    BuildCompleted {
        owner: Owner,
        build_result_id: BuildResultId,
    },
    RecipeAssigned(RecipeAssignedEvent),
    RecipeDispatched { recipe_id: RecipeId, agent: String },
    RecipeError { recipe_id: RecipeId, message: String },
}

impl BusEvent {
    pub fn is_build_completed(&self) -> bool {
        matches!(self, BusEvent::BuildCompleted { .. })
    }

    pub fn is_recipe_assigned(&self) -> bool {
        matches!(self, BusEvent::RecipeAssigned(_))
    }
}

/// Lossless subscription: a filter and the channel matching events go to.
struct Tap {
    filter: fn(&BusEvent) -> bool,
    tx: mpsc::UnboundedSender<BusEvent>,
}

/// Broadcast event bus. Cheap to clone; clones share one channel and one
/// set of lossless subscriptions.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
    taps: Arc<Mutex<Vec<Tap>>>,
}

impl EventBus {
    /// Create a bus with the given per-receiver buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            taps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Deliver an event to every current subscriber immediately.
    pub fn publish(&self, event: BusEvent) {
        self.taps.lock().retain(|tap| {
            if (tap.filter)(&event) {
                tap.tx.send(event.clone()).is_ok()
            } else {
                !tap.tx.is_closed()
            }
        });
        // No active receivers is not an error.
        let _ = self.tx.send(event);
    }

    /// Broadcast subscription. Lags, and so loses events, when it falls
    /// more than the bus capacity behind.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    /// Subscribe to every event matching `filter` published from now on.
    ///
    /// The channel is unbounded, so a slow consumer never loses events.
    /// The subscription ends when the receiver is dropped.
    pub fn subscribe_lossless(
        &self,
        filter: fn(&BusEvent) -> bool,
    ) -> mpsc::UnboundedReceiver<BusEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.taps.lock().push(Tap { filter, tx });
        rx
    }

    /// Number of live broadcast subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Create an empty outbox that flushes to this bus.
    pub fn outbox(&self) -> Outbox {
        Outbox {
            bus: self.clone(),
            pending: Vec::new(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.tx.receiver_count())
            .field("lossless", &self.taps.lock().len())
            .finish()
    }
}

/// Buffer of deferred events for one handling pass.
///
/// Events are delivered in the order they were deferred, and only when
/// [`flush()`](Self::flush) is called.
pub struct Outbox {
    bus: EventBus,
    pending: Vec<BusEvent>,
}

impl Outbox {
    /// Hold `event` until the current pass finishes.
    pub fn defer(&mut self, event: BusEvent) {
        self.pending.push(event);
    }

    /// Publish every held event. Returns how many were delivered.
    pub fn flush(&mut self) -> usize {
        let count = self.pending.len();
        for event in self.pending.drain(..) {
            self.bus.publish(event);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
