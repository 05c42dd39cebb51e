//! Search options controlling dependency discovery and cache filtering.

use super::EntityType;
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeSet;

/// Option key for the search depth (integer, `-1` = unbounded).
pub const SEARCH_DEPTH_OPTION: &str = "searchDepth";

/// Option key for expanding policy assertions as dependencies (bool).
pub const RETURN_ASSERTIONS_OPTION: &str = "returnAssertionsAsDependencies";

/// Option key for the entity-type filter (list of type tags).
pub const SEARCH_ENTITY_TYPE_OPTION: &str = "searchEntityType";

/// How many dependency levels to expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchDepth {
    /// Expand until every reachable object has been discovered
    #[default]
    Unbounded,
    /// Expand at most this many levels; `Levels(0)` expands nothing
    Levels(u32),
}

impl SearchDepth {
    /// Convert from the integer encoding used in option maps.
    ///
    /// `-1` is unbounded, `0..` is a level count; anything below `-1` is rejected.
    pub fn from_i64(value: i64) -> Result<Self> {
        match value {
            -1 => Ok(SearchDepth::Unbounded),
            n if n >= 0 => u32::try_from(n)
                .map(SearchDepth::Levels)
                .map_err(|_| invalid(SEARCH_DEPTH_OPTION, format!("{n} is too large"))),
            n => Err(invalid(
                SEARCH_DEPTH_OPTION,
                format!("{n} is below -1 (use -1 for unbounded)"),
            )),
        }
    }

    /// The integer encoding of this depth.
    pub fn as_i64(self) -> i64 {
        match self {
            SearchDepth::Unbounded => -1,
            SearchDepth::Levels(n) => i64::from(n),
        }
    }

    /// Whether no further level may be expanded.
    pub fn is_exhausted(self) -> bool {
        self == SearchDepth::Levels(0)
    }

    /// The depth remaining one level further down.
    #[must_use]
    pub fn descend(self) -> Self {
        match self {
            SearchDepth::Unbounded => SearchDepth::Unbounded,
            SearchDepth::Levels(n) => SearchDepth::Levels(n.saturating_sub(1)),
        }
    }
}

/// Options supplied with every dependency query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchOptions {
    /// Maximum number of levels to expand
    pub depth: SearchDepth,

    /// Expand individual policy assertions as first-class dependencies
    pub include_assertions: bool,

    /// Only return dependencies of these types; empty means every type
    pub entity_types: BTreeSet<EntityType>,
}

impl SearchOptions {
    /// Options with the given depth and defaults otherwise.
    pub fn with_depth(depth: SearchDepth) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    /// Set whether assertions are expanded.
    #[must_use]
    pub fn include_assertions(mut self, include: bool) -> Self {
        self.include_assertions = include;
        self
    }

    /// Restrict results to the given entity types.
    #[must_use]
    pub fn only_types(mut self, types: impl IntoIterator<Item = EntityType>) -> Self {
        self.entity_types = types.into_iter().collect();
        self
    }

    /// Whether dependencies of this type pass the type filter.
    pub fn accepts(&self, entity_type: EntityType) -> bool {
        self.entity_types.is_empty() || self.entity_types.contains(&entity_type)
    }

    /// Parse options from a key/value map.
    ///
    /// Unknown keys and values of the wrong type are rejected rather than defaulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] naming the first offending key.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(invalid(
                    "<options>",
                    format!("expected an object, got {other}"),
                ));
            }
        };

        let mut options = Self::default();
        for (key, value) in map {
            match key.as_str() {
                SEARCH_DEPTH_OPTION => {
                    let depth = value
                        .as_i64()
                        .ok_or_else(|| invalid(key, format!("expected an integer, got {value}")))?;
                    options.depth = SearchDepth::from_i64(depth)?;
                }
                RETURN_ASSERTIONS_OPTION => {
                    options.include_assertions = value
                        .as_bool()
                        .ok_or_else(|| invalid(key, format!("expected a boolean, got {value}")))?;
                }
                SEARCH_ENTITY_TYPE_OPTION => {
                    let list = value
                        .as_array()
                        .ok_or_else(|| invalid(key, format!("expected a list, got {value}")))?;
                    options.entity_types = list
                        .iter()
                        .map(|item| {
                            item.as_str()
                                .ok_or_else(|| invalid(key, format!("expected a type tag, got {item}")))?
                                .parse::<EntityType>()
                                .map_err(|reason| invalid(key, reason))
                        })
                        .collect::<Result<_>>()?;
                }
                _ => return Err(invalid(key, "unknown option".to_string())),
            }
        }
        Ok(options)
    }
}

fn invalid(key: &str, reason: String) -> Error {
    Error::InvalidOption {
        key: key.to_string(),
        reason,
    }
}
