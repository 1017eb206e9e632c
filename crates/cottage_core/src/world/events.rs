//! Typed publish/subscribe bus for world events.
//!
//! Handlers are synchronous and isolated: a panicking handler is logged and
//! skipped, it cannot stop delivery to the remaining subscribers or corrupt
//! emission order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::id::{AgentId, EntityId};
use crate::world::{Entity, WorldMessage};

/// Everything the world announces on its bus.
#[derive(Debug, Clone)]
pub enum WorldEvent {
    EntityCreated { entity: Entity },
    EntityUpdated { previous: Entity, current: Entity },
    EntityRemoved { entity: Entity },
    MessageReceived { to: AgentId, message: WorldMessage },
    WorldShutdown,
}

impl WorldEvent {
    pub fn kind(&self) -> WorldEventKind {
        match self {
            Self::EntityCreated { .. } => WorldEventKind::EntityCreated,
            Self::EntityUpdated { .. } => WorldEventKind::EntityUpdated,
            Self::EntityRemoved { .. } => WorldEventKind::EntityRemoved,
            Self::MessageReceived { .. } => WorldEventKind::MessageReceived,
            Self::WorldShutdown => WorldEventKind::WorldShutdown,
        }
    }

    pub fn entity_id(&self) -> Option<&EntityId> {
        match self {
            Self::EntityCreated { entity } | Self::EntityRemoved { entity } => Some(&entity.id),
            Self::EntityUpdated { current, .. } => Some(&current.id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorldEventKind {
    EntityCreated,
    EntityUpdated,
    EntityRemoved,
    MessageReceived,
    WorldShutdown,
}

pub type EventHandler = Arc<dyn Fn(&WorldEvent) + Send + Sync>;

/// Token returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: WorldEventKind,
    handler: EventHandler,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to one event kind.
    pub fn on<F>(&self, kind: WorldEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&WorldEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub fn off(&self, id: SubscriptionId) {
        self.subscriptions.write().retain(|s| s.id != id);
    }

    /// Deliver an event to every matching subscriber in registration order.
    pub fn emit(&self, event: &WorldEvent) {
        let kind = event.kind();
        // Clone the handler list so a handler can subscribe/unsubscribe
        // without deadlocking against the registry lock.
        let handlers: Vec<EventHandler> = self
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.handler.clone())
            .collect();

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!(event_kind = ?kind, "world event handler panicked; skipping it");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }
}
