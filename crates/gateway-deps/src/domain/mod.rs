//! Domain types for gateway dependency analysis.
//!
//! - [`entity`]: gateway objects and headers exchanged with the entity store
//! - [`dependency`]: graph identities, arena nodes and search results
//! - [`options`]: search options and their key/value encoding

pub mod dependency;
pub mod entity;
pub mod options;

pub use dependency::{
    Children, Dependency, DependencyGraph, DependencyRef, DependencySearchResults,
    DependentObject, NodeId,
};
pub use entity::{
    Assertion, Entity, EntityHeader, EntityType, KEY_ALIAS_PROPERTY, KEYSTORE_PROPERTY,
    POLICY_TYPE_PROPERTY, PolicyType,
};
pub use options::{
    RETURN_ASSERTIONS_OPTION, SEARCH_DEPTH_OPTION, SEARCH_ENTITY_TYPE_OPTION, SearchDepth,
    SearchOptions,
};
