//! Turning gateway events into cache changes, and the thread that applies them.
//!
//! Handling an event takes two steps. [`plan`] works out what has to change by asking
//! the store and the finder, without touching the cache. The resulting
//! [`CacheChange`]s are then applied under the cache's write lock, which keeps store
//! round trips out of the critical section.

use super::graph::CacheGraph;
use super::surrogate::{Surrogate, SurrogateRegistry};
use super::{CacheStatus, Shared};
use crate::domain::{DependentObject, Entity, EntityHeader, EntityType, SearchDepth, SearchOptions};
use crate::error::{Error, Result};
use crate::events::{EntityOperation, GatewayEvent};
use crate::finder::DependencyFinder;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use tracing::{debug, error, trace, warn};

/// One modification of the cache graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum CacheChange {
    /// Refresh an object and its immediate dependencies
    Merge {
        dependent: DependentObject,
        dependencies: Option<Vec<DependentObject>>,
    },
    /// Drop every object with this type and internal id
    Remove { object_type: EntityType, id: String },
}

impl CacheChange {
    pub(super) fn apply(self, graph: &mut CacheGraph) {
        match self {
            CacheChange::Merge {
                dependent,
                dependencies,
            } => {
                graph.merge(&dependent, dependencies.as_deref());
            }
            CacheChange::Remove { object_type, id } => {
                let removed = graph.remove_by_id(object_type, &id);
                debug!(%object_type, id, removed, "Removed deleted entity from dependency cache");
            }
        }
    }
}

/// Work out the cache changes an event calls for.
///
/// # Errors
///
/// Returns [`Error::Inconsistent`] if an entity named by the event, or its owner, can
/// no longer be found, and the finder's error if dependencies cannot be computed.
pub(super) fn plan(
    event: &GatewayEvent,
    finder: &DependencyFinder,
    surrogates: &SurrogateRegistry,
) -> Result<Vec<CacheChange>> {
    let store = finder.store().as_ref();
    match event {
        GatewayEvent::Started => Ok(Vec::new()),
        GatewayEvent::Persistence { operation, entity } => match operation {
            EntityOperation::Create | EntityOperation::Update => {
                refresh(entity, surrogates.on_update(entity, store)?, finder)
            }
            EntityOperation::Delete => match surrogates.on_delete(entity, store)? {
                Surrogate::Itself => {
                    let dependent = finder.create_dependent_object(entity);
                    Ok(vec![CacheChange::Remove {
                        object_type: dependent.object_type,
                        id: dependent.internal_id,
                    }])
                }
                Surrogate::Replace(owner) => {
                    // the owner lost a part, so it changed rather than went away
                    let dependent = finder.create_dependent_object(entity);
                    let mut changes = vec![CacheChange::Remove {
                        object_type: dependent.object_type,
                        id: dependent.internal_id,
                    }];
                    changes.extend(explore(&owner, finder)?);
                    Ok(changes)
                }
                other => refresh(entity, other, finder),
            },
        },
        GatewayEvent::Invalidation(invalidation) => {
            let entity_type = invalidation.entity_type();
            let mut changes = Vec::new();
            for (id, operation) in invalidation.changes() {
                if operation == EntityOperation::Delete {
                    changes.push(CacheChange::Remove {
                        object_type: entity_type,
                        id: id.to_string(),
                    });
                    continue;
                }
                let header = EntityHeader::new(entity_type, id);
                let entity = store.find(&header).map_err(|e| {
                    Error::Inconsistent(format!("{header} from invalidation event: {e}"))
                })?;
                changes.extend(refresh(&entity, surrogates.on_update(&entity, store)?, finder)?);
            }
            Ok(changes)
        }
    }
}

/// Recompute the immediate dependencies of whatever `surrogate` says `entity` stands for.
///
/// A part is refreshed before its owner, so both the part's own node and the owner's
/// view of it match a live search.
fn refresh(
    entity: &Entity,
    surrogate: Surrogate,
    finder: &DependencyFinder,
) -> Result<Vec<CacheChange>> {
    match surrogate {
        Surrogate::Itself => explore(entity, finder),
        Surrogate::Replace(owner) => {
            trace!(entity = %entity.header(), owner = %owner.header(), "Refreshing owner as well");
            let mut changes = explore(entity, finder)?;
            changes.extend(explore(&owner, finder)?);
            Ok(changes)
        }
        Surrogate::Ignore => Ok(Vec::new()),
        Surrogate::Missing(reason) => {
            warn!(entity = %entity.header(), reason, "No cache entry to refresh for changed entity");
            Ok(Vec::new())
        }
    }
}

/// One level of dependencies of `target`, as merges.
fn explore(target: &Entity, finder: &DependencyFinder) -> Result<Vec<CacheChange>> {
    let options = SearchOptions::with_depth(SearchDepth::Levels(1));
    let results = finder.get_dependencies_from_entities(std::slice::from_ref(target), &options)?;
    Ok(results
        .into_iter()
        .map(|result| CacheChange::Merge {
            dependent: result.dependent().clone(),
            dependencies: result
                .dependencies()
                .map(|children| children.map(|child| child.dependent().clone()).collect()),
        })
        .collect())
}

/// Body of the event consumer thread.
///
/// Runs until `stop` is raised or the cache leaves the enabled state. Failures are
/// logged per event; the loop keeps going.
pub(super) fn run(shared: &Arc<Shared>, stop: &AtomicBool) {
    debug!("Dependency cache event consumer started");
    while !stop.load(Ordering::Acquire) && shared.status() == CacheStatus::Enabled {
        let received = match shared.receiver.lock() {
            Ok(receiver) => receiver.recv_timeout(shared.poll_interval),
            Err(e) => {
                error!(error = %e, "Dependency cache event queue lock poisoned");
                break;
            }
        };
        match received {
            Ok(event) => {
                match shared.handle(&event) {
                    Ok(()) => {}
                    Err(e @ Error::Inconsistent(_)) => {
                        error!(error = %e, ?event, "Dependency cache out of step with entity store");
                    }
                    Err(e) => warn!(error = %e, ?event, "Failed to apply event to dependency cache"),
                }
                shared.pending.fetch_sub(1, Ordering::AcqRel);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Dependency cache event consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{KEY_ALIAS_PROPERTY, KEYSTORE_PROPERTY, POLICY_TYPE_PROPERTY};
    use crate::events::InvalidationEvent;
    use crate::store::InMemoryEntityStore;

    fn header(entity_type: EntityType, id: &str) -> EntityHeader {
        EntityHeader::new(entity_type, id)
    }

    fn finder() -> DependencyFinder {
        DependencyFinder::with_store(Arc::new(InMemoryEntityStore::from_entities([
            Entity::new(EntityType::Service, "s")
                .with_reference(header(EntityType::Policy, "private")),
            Entity::new(EntityType::Policy, "private")
                .with_property(POLICY_TYPE_PROPERTY, "private-service")
                .with_reference(header(EntityType::Resource, "r")),
            Entity::new(EntityType::Policy, "p").with_reference(header(EntityType::Resource, "r")),
            Entity::new(EntityType::Resource, "r"),
            Entity::new(EntityType::KeyEntry, "ssl:tls"),
        ])))
    }

    fn merged_ids(changes: &[CacheChange]) -> Vec<(&str, Vec<&str>)> {
        changes
            .iter()
            .filter_map(|change| match change {
                CacheChange::Merge {
                    dependent,
                    dependencies,
                } => Some((
                    dependent.internal_id.as_str(),
                    dependencies
                        .iter()
                        .flatten()
                        .map(|d| d.internal_id.as_str())
                        .collect(),
                )),
                CacheChange::Remove { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_update_merges_one_level() {
        let finder = finder();
        let entity = finder.store().find(&header(EntityType::Policy, "p")).unwrap();
        let event = GatewayEvent::persistence(EntityOperation::Update, entity);

        let changes = plan(&event, &finder, &SurrogateRegistry::default()).unwrap();
        assert_eq!(merged_ids(&changes), vec![("p", vec!["r"])]);
    }

    #[test]
    fn test_private_service_policy_update_refreshes_policy_and_service() {
        let finder = finder();
        let entity = finder
            .store()
            .find(&header(EntityType::Policy, "private"))
            .unwrap();
        let event = GatewayEvent::persistence(EntityOperation::Update, entity);

        let changes = plan(&event, &finder, &SurrogateRegistry::default()).unwrap();
        assert_eq!(
            merged_ids(&changes),
            vec![("private", vec!["r"]), ("s", vec!["private"])]
        );
    }

    #[test]
    fn test_key_metadata_delete_removes_metadata_and_refreshes_key_entry() {
        let metadata = Entity::new(EntityType::KeyMetadata, "m")
            .with_property(KEYSTORE_PROPERTY, "ssl")
            .with_property(KEY_ALIAS_PROPERTY, "tls");
        let event = GatewayEvent::persistence(EntityOperation::Delete, metadata);

        let changes = plan(&event, &finder(), &SurrogateRegistry::default()).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[0],
            CacheChange::Remove {
                object_type: EntityType::KeyMetadata,
                id: "m".to_string(),
            }
        );
        assert!(matches!(
            &changes[1],
            CacheChange::Merge { dependent, .. } if dependent.object_type == EntityType::KeyEntry
        ));
    }

    #[test]
    fn test_delete_removes_by_id() {
        let event = GatewayEvent::persistence(
            EntityOperation::Delete,
            Entity::new(EntityType::Policy, "p").with_name("Renamed since"),
        );

        let changes = plan(&event, &finder(), &SurrogateRegistry::default()).unwrap();
        assert_eq!(
            changes,
            vec![CacheChange::Remove {
                object_type: EntityType::Policy,
                id: "p".to_string(),
            }]
        );
    }

    #[test]
    fn test_ignored_type_plans_nothing() {
        let event = GatewayEvent::persistence(
            EntityOperation::Update,
            Entity::new(EntityType::PolicyVersion, "v1"),
        );
        let changes = plan(&event, &finder(), &SurrogateRegistry::default()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_invalidation_looks_up_creates_and_updates() {
        let event = GatewayEvent::Invalidation(
            InvalidationEvent::new(
                EntityType::Policy,
                vec!["p".to_string(), "gone".to_string()],
                vec![EntityOperation::Update, EntityOperation::Delete],
            )
            .unwrap(),
        );

        let changes = plan(&event, &finder(), &SurrogateRegistry::default()).unwrap();
        assert_eq!(merged_ids(&changes), vec![("p", vec!["r"])]);
        assert_eq!(
            changes[1],
            CacheChange::Remove {
                object_type: EntityType::Policy,
                id: "gone".to_string(),
            }
        );
    }

    #[test]
    fn test_invalidation_of_unknown_entity_is_inconsistent() {
        let event = GatewayEvent::Invalidation(
            InvalidationEvent::new(
                EntityType::Policy,
                vec!["missing".to_string()],
                vec![EntityOperation::Create],
            )
            .unwrap(),
        );

        let result = plan(&event, &finder(), &SurrogateRegistry::default());
        assert!(matches!(result, Err(Error::Inconsistent(_))));
    }

    #[test]
    fn test_apply_merge_then_remove() {
        let mut graph = CacheGraph::default();
        let policy = DependentObject::new(EntityType::Policy, None, "p", "p");
        CacheChange::Merge {
            dependent: policy.clone(),
            dependencies: Some(vec![DependentObject::new(EntityType::Resource, None, "r", "r")]),
        }
        .apply(&mut graph);
        assert_eq!(graph.len(), 2);

        CacheChange::Remove {
            object_type: EntityType::Policy,
            id: "p".to_string(),
        }
        .apply(&mut graph);
        assert!(graph.lookup(&policy).is_none());
    }
}
