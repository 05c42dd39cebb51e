//! Processor for policies.
//!
//! A policy depends on whatever its assertions reference. By default those references
//! are attributed to the policy itself. When the search asks for assertions as
//! dependencies, every assertion becomes a pseudo-entity of type
//! [`EntityType::Assertion`] sitting between the policy and the entities it references.

use super::generic::{replace_common, replace_headers, resolve_headers};
use super::{DependencyProcessor, ProcessorContext, ReplacementMap};
use crate::domain::{Assertion, Entity, EntityType};
use crate::error::Result;
use std::collections::HashSet;

/// Extracts policy dependencies, optionally one level per assertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyDependencyProcessor;

impl DependencyProcessor for PolicyDependencyProcessor {
    fn find_dependencies(
        &self,
        policy: &Entity,
        context: &ProcessorContext<'_>,
    ) -> Result<Vec<Entity>> {
        let containment = policy.folder_header().into_iter().chain(policy.zone_header());
        let own = policy
            .references
            .iter()
            .chain(&policy.private_keys)
            .cloned();

        let dependencies = if context.options.include_assertions {
            let mut dependencies = resolve_headers(policy, containment, context)?;
            dependencies.extend(
                policy
                    .assertions
                    .iter()
                    .enumerate()
                    .map(|(index, assertion)| assertion_entity(policy, index, assertion)),
            );
            dependencies.extend(resolve_headers(policy, own, context)?);
            dependencies
        } else {
            let inlined = policy
                .assertions
                .iter()
                .flat_map(|assertion| assertion.references.iter().cloned());
            resolve_headers(policy, containment.chain(inlined).chain(own), context)?
        };

        let mut seen = HashSet::new();
        Ok(dependencies
            .into_iter()
            .filter(|entity| seen.insert((entity.entity_type, entity.id.clone())))
            .collect())
    }

    fn replace_dependencies(
        &self,
        policy: &mut Entity,
        replacements: &ReplacementMap,
        replace_assertion_dependencies: bool,
    ) -> Result<()> {
        replace_common(policy, replacements)?;
        if replace_assertion_dependencies {
            let owner = policy.header();
            for assertion in &mut policy.assertions {
                replace_headers(&owner, &mut assertion.references, replacements)?;
            }
        }
        Ok(())
    }
}

/// The pseudo-entity standing for the assertion at `index` (zero-based) in `policy`.
///
/// Its id is `<policy id>#<position>` with a one-based position, so assertion entities
/// are stable as long as the policy's rule order is.
pub fn assertion_entity(policy: &Entity, index: usize, assertion: &Assertion) -> Entity {
    let mut entity = Entity::new(EntityType::Assertion, format!("{}#{}", policy.id, index + 1))
        .with_name(assertion.name.clone());
    entity.references.clone_from(&assertion.references);
    entity
}
