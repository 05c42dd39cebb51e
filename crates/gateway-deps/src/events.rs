//! Gateway lifecycle events and their in-process delivery.
//!
//! Entity stores publish a [`GatewayEvent`] for every change they make. The
//! dependency cache subscribes to the [`EventBus`] and keeps its graph current
//! from these events.

use crate::domain::{Entity, EntityType};
use crate::error::{Error, Result};
use std::sync::{Arc, PoisonError, RwLock};

/// Kind of change applied to an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityOperation {
    /// The entity was created
    Create,
    /// The entity was modified
    Update,
    /// The entity was removed
    Delete,
}

/// A batch of changes to entities of one type, identified by id only.
///
/// Ids and operations are parallel lists; the constructor rejects lists of
/// different lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    entity_type: EntityType,
    ids: Vec<String>,
    operations: Vec<EntityOperation>,
}

impl InvalidationEvent {
    /// Create a batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] if `ids` and `operations` differ in length.
    pub fn new(
        entity_type: EntityType,
        ids: Vec<String>,
        operations: Vec<EntityOperation>,
    ) -> Result<Self> {
        if ids.len() != operations.len() {
            return Err(Error::InvalidEvent(format!(
                "{} ids but {} operations for {entity_type}",
                ids.len(),
                operations.len()
            )));
        }
        Ok(Self {
            entity_type,
            ids,
            operations,
        })
    }

    /// Type shared by every changed entity.
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Pairs of (id, operation), in publication order.
    pub fn changes(&self) -> impl Iterator<Item = (&str, EntityOperation)> {
        self.ids
            .iter()
            .map(String::as_str)
            .zip(self.operations.iter().copied())
    }

    /// Number of changes in the batch.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the batch carries no changes.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Event published by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A single entity was created, updated or deleted
    Persistence {
        /// What happened
        operation: EntityOperation,
        /// The entity as of the change (its last state for deletes)
        entity: Entity,
    },
    /// Several entities of one type changed; lookups go through the store
    Invalidation(InvalidationEvent),
    /// The gateway finished starting up
    Started,
}

impl GatewayEvent {
    /// Shorthand for a persistence event.
    pub fn persistence(operation: EntityOperation, entity: Entity) -> Self {
        GatewayEvent::Persistence { operation, entity }
    }
}

/// Receives published events.
///
/// Called on the publishing thread, so implementations should hand work off
/// rather than block.
pub trait EventListener: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &GatewayEvent);
}

/// Fan-out of events to every subscribed listener.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .listeners
            .read()
            .map_or(0, |listeners| listeners.len());
        f.debug_struct("EventBus")
            .field("listeners", &count)
            .finish()
    }
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Listeners are notified in subscription order.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        // The list is append-only, so a poisoned guard still holds a valid list.
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Deliver an event to every listener.
    pub fn publish(&self, event: &GatewayEvent) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracing::trace!(listeners = listeners.len(), ?event, "Publishing gateway event");
        for listener in listeners {
            listener.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<GatewayEvent>>,
    }

    impl EventListener for Recorder {
        fn on_event(&self, event: &GatewayEvent) {
            self.seen.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_invalidation_rejects_mismatched_lengths() {
        let result = InvalidationEvent::new(
            EntityType::Service,
            vec!["a".into(), "b".into()],
            vec![EntityOperation::Update],
        );
        assert!(matches!(result, Err(Error::InvalidEvent(_))));
    }

    #[test]
    fn test_invalidation_pairs_ids_with_operations() {
        let event = InvalidationEvent::new(
            EntityType::Service,
            vec!["a".into(), "b".into()],
            vec![EntityOperation::Create, EntityOperation::Delete],
        )
        .unwrap();
        let changes: Vec<_> = event.changes().collect();
        assert_eq!(
            changes,
            vec![("a", EntityOperation::Create), ("b", EntityOperation::Delete)]
        );
        assert_eq!(event.len(), 2);
    }

    #[test]
    fn test_bus_delivers_to_every_listener() {
        let bus = EventBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        bus.subscribe(first.clone());
        bus.subscribe(second.clone());

        bus.publish(&GatewayEvent::Started);

        assert_eq!(*first.seen.lock().unwrap(), vec![GatewayEvent::Started]);
        assert_eq!(*second.seen.lock().unwrap(), vec![GatewayEvent::Started]);
    }
}
