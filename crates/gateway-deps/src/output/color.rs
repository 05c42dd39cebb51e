//! Color and styling helpers for CLI output.
//!
//! Semantic Color Theme:
//!   - Containment:  yellow  (folders, security zones)
//!   - Published:    green   (services, endpoints)
//!   - Logic:        magenta (policies, assertions, encapsulated assertions)
//!   - Reference:    cyan    (ids, root tree node)
//!   - Muted:        dimmed  (connectors, repeated nodes)
//!   - Emphasis:     bold    (section headers)

use crate::domain::{DependentObject, EntityType};
use colored::Colorize;

use super::OutputConfig;

/// Apply semantic "info" color (cyan) to text.
pub fn info(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.cyan().to_string()
}

/// Color an entity type name by the role of the type.
pub(crate) fn colorize_type(entity_type: EntityType, config: &OutputConfig) -> String {
    let text = entity_type.as_str();
    if !config.use_colors {
        return text.to_string();
    }
    match entity_type {
        EntityType::Folder | EntityType::SecurityZone => text.yellow().to_string(),
        EntityType::Service | EntityType::JmsEndpoint => text.green().to_string(),
        EntityType::Policy | EntityType::Assertion | EntityType::EncapsulatedAssertion => {
            text.magenta().to_string()
        }
        _ => text.to_string(),
    }
}

/// `type 'name' [id]`, colored.
pub(crate) fn format_object(object: &DependentObject, config: &OutputConfig) -> String {
    let type_str = colorize_type(object.object_type, config);
    let id_str = format!("[{}]", colorize_id(&object.internal_id, config));
    match &object.name {
        Some(name) => format!("{type_str} '{name}' {id_str}"),
        None => format!("{type_str} {id_str}"),
    }
}

/// Colorize an id (cyan).
pub(crate) fn colorize_id(id: &str, config: &OutputConfig) -> String {
    info(id, config)
}

/// Make text bold.
pub(crate) fn bold(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.bold().to_string()
}

/// Make text dimmed.
pub(crate) fn dimmed(text: &str, config: &OutputConfig) -> String {
    if !config.use_colors {
        return text.to_string();
    }
    text.dimmed().to_string()
}
