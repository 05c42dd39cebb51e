//! CLI input validation functions.
//!
//! These validators are used by clap's `value_parser` attribute to validate
//! user input at parse time, providing immediate feedback for invalid values.

use crate::domain::{EntityHeader, EntityType};

/// Validate an entity reference of the form `TYPE:ID`.
///
/// Examples: `service:0a1b`, `policy:auth`, `key-entry:2:signer`
pub fn validate_header(s: &str) -> Result<EntityHeader, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Entity reference cannot be empty".to_string());
    }
    s.parse()
}

/// Validate an entity type name such as `policy` or `jms-connection`.
pub fn validate_entity_type(s: &str) -> Result<EntityType, String> {
    s.trim().parse().map_err(|e: String| {
        let known: Vec<&str> = EntityType::ALL.iter().map(|t| t.as_str()).collect();
        format!("{e}; expected one of: {}", known.join(", "))
    })
}

/// Validate a search depth: `-1` for unbounded, `0` for the object alone, or a level count.
pub fn validate_depth(s: &str) -> Result<i64, String> {
    let depth: i64 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid depth '{s}': expected an integer"))?;
    if depth < -1 {
        return Err(format!("Invalid depth {depth}: must be -1 (unbounded) or at least 0"));
    }
    Ok(depth)
}

/// Validate a reference replacement of the form `TYPE:FROM=TYPE:TO`.
pub fn validate_replacement(s: &str) -> Result<(EntityHeader, EntityHeader), String> {
    let (from, to) = s
        .split_once('=')
        .ok_or_else(|| format!("Invalid replacement '{s}': expected TYPE:FROM=TYPE:TO"))?;
    Ok((validate_header(from)?, validate_header(to)?))
}
