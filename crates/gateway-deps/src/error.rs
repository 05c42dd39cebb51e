//! Error types for dependency discovery and cache operations.

use crate::domain::{EntityHeader, EntityType};
use std::io;
use thiserror::Error;

/// The error type for gateway dependency operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The entity store has no entity for the given header.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityHeader),

    /// The entity store itself failed.
    #[error("Entity store error: {0}")]
    Store(String),

    /// A search option was unknown or carried a value of the wrong type.
    #[error("Invalid search option '{key}': {reason}")]
    InvalidOption {
        /// The offending option key.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A processor was already registered for this entity type.
    #[error("A dependency processor is already registered for '{0}'")]
    DuplicateProcessor(EntityType),

    /// A processor could not compute the dependencies of an entity.
    #[error("Cannot retrieve dependencies of {entity}: {reason}")]
    CannotRetrieveDependencies {
        /// The entity being analysed.
        entity: EntityHeader,
        /// What went wrong.
        reason: String,
    },

    /// A processor could not rewrite the dependencies of an entity.
    #[error("Cannot replace dependency {dependency} of {entity}: {reason}")]
    CannotReplaceDependencies {
        /// The entity being rewritten.
        entity: EntityHeader,
        /// The reference that could not be replaced.
        dependency: EntityHeader,
        /// What went wrong.
        reason: String,
    },

    /// A cache-only operation was called while the cache is not enabled.
    #[error("Dependency cache is not started")]
    CacheNotEnabled,

    /// The cache and the entity store have diverged.
    ///
    /// Raised when an entity that arrived through a live event, or was found by an
    /// earlier discovery, can no longer be resolved. This is not recoverable by retrying.
    #[error("Dependency cache is inconsistent with the entity store: {0}")]
    Inconsistent(String),

    /// Malformed event payload.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Internal error (lock poisoning, thread failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for gateway dependency operations.
pub type Result<T> = std::result::Result<T, Error>;
