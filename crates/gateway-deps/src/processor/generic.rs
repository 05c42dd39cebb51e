//! Processor for entity types without dedicated extraction rules.

use super::{DependencyProcessor, ProcessorContext, ReplacementMap, find_mapped_header};
use crate::domain::{Entity, EntityHeader};
use crate::error::{Error, Result};
use std::collections::HashSet;
use tracing::debug;

/// Depends on the folder, the security zone, every reference and every private key,
/// in that order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDependencyProcessor;

impl DependencyProcessor for GenericDependencyProcessor {
    fn find_dependencies(
        &self,
        entity: &Entity,
        context: &ProcessorContext<'_>,
    ) -> Result<Vec<Entity>> {
        let headers = entity
            .folder_header()
            .into_iter()
            .chain(entity.zone_header())
            .chain(entity.references.iter().cloned())
            .chain(entity.private_keys.iter().cloned());
        resolve_headers(entity, headers, context)
    }

    fn replace_dependencies(
        &self,
        entity: &mut Entity,
        replacements: &ReplacementMap,
        _replace_assertion_dependencies: bool,
    ) -> Result<()> {
        replace_common(entity, replacements)
    }
}

/// Resolve headers through the store, dropping duplicates and absent entities.
pub(super) fn resolve_headers(
    owner: &Entity,
    headers: impl IntoIterator<Item = EntityHeader>,
    context: &ProcessorContext<'_>,
) -> Result<Vec<Entity>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for header in headers {
        if !seen.insert((header.entity_type, header.id.clone())) {
            continue;
        }
        match context.store.find(&header) {
            Ok(entity) => resolved.push(entity),
            Err(Error::EntityNotFound(missing)) => {
                debug!(owner = %owner.header(), missing = %missing, "Skipping dangling reference");
            }
            Err(e) => {
                return Err(Error::CannotRetrieveDependencies {
                    entity: owner.header(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(resolved)
}

/// Rewrite folder, zone, references and private keys.
pub(super) fn replace_common(entity: &mut Entity, replacements: &ReplacementMap) -> Result<()> {
    let owner = entity.header();
    if let Some(folder) = entity.folder_header() {
        if let Some(mapped) = mapped_of_same_type(&owner, &folder, replacements)? {
            entity.folder = Some(mapped.id);
        }
    }
    if let Some(zone) = entity.zone_header() {
        if let Some(mapped) = mapped_of_same_type(&owner, &zone, replacements)? {
            entity.security_zone = Some(mapped.id);
        }
    }
    replace_headers(&owner, &mut entity.references, replacements)?;
    replace_headers(&owner, &mut entity.private_keys, replacements)
}

/// Rewrite every header in `headers` that has a mapping.
pub(super) fn replace_headers(
    owner: &EntityHeader,
    headers: &mut [EntityHeader],
    replacements: &ReplacementMap,
) -> Result<()> {
    for header in headers {
        if let Some(mapped) = mapped_of_same_type(owner, header, replacements)? {
            debug!(entity = %owner, from = %header, to = %mapped, "Replacing dependency");
            *header = mapped;
        }
    }
    Ok(())
}

fn mapped_of_same_type(
    owner: &EntityHeader,
    header: &EntityHeader,
    replacements: &ReplacementMap,
) -> Result<Option<EntityHeader>> {
    let Some(mapped) = find_mapped_header(replacements, header) else {
        return Ok(None);
    };
    if mapped.entity_type != header.entity_type {
        return Err(Error::CannotReplaceDependencies {
            entity: owner.clone(),
            dependency: header.clone(),
            reason: format!(
                "replacement {mapped} is a {} but the reference is a {}",
                mapped.entity_type, header.entity_type
            ),
        });
    }
    Ok(Some(mapped.clone()))
}
