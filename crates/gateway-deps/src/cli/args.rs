//! CLI argument structs for all commands.
//!
//! Each command has its own argument struct with clap derive attributes
//! for parsing and validation.

use clap::Parser;
use std::path::PathBuf;

use super::validators::{validate_depth, validate_entity_type, validate_header, validate_replacement};
use crate::domain::{EntityHeader, EntityType};

/// Arguments for the `init` command
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Where to write the configuration file
    #[arg(long, default_value = crate::config::CONFIG_FILE_NAME)]
    pub path: PathBuf,

    /// Enable the dependency cache in the written configuration
    #[arg(long)]
    pub enable_cache: bool,

    /// Overwrite an existing configuration file
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the `dependencies` command
#[derive(Parser, Debug, Clone)]
pub struct DependenciesArgs {
    /// Objects to search from (TYPE:ID); all stored entities when omitted
    #[arg(value_parser = validate_header)]
    pub objects: Vec<EntityHeader>,

    /// Levels to descend (-1 for unbounded, 0 for the objects alone)
    #[arg(short, long, value_parser = validate_depth, allow_hyphen_values = true)]
    pub depth: Option<i64>,

    /// Only report dependencies of these types (comma-separated)
    #[arg(short, long, value_delimiter = ',', value_parser = validate_entity_type)]
    pub types: Vec<EntityType>,

    /// Report policy assertions as intermediate nodes
    #[arg(long)]
    pub assertions: bool,

    /// Answer from the dependency cache, building it first
    #[arg(long)]
    pub cached: bool,
}

/// Arguments for the `usages` command
#[derive(Parser, Debug, Clone)]
pub struct UsagesArgs {
    /// Object whose users to list (TYPE:ID)
    #[arg(value_parser = validate_header)]
    pub object: EntityHeader,
}

/// Arguments for the `flatten` command
#[derive(Parser, Debug, Clone)]
pub struct FlattenArgs {
    /// Objects whose dependencies to order (TYPE:ID)
    #[arg(required = true, value_parser = validate_header)]
    pub objects: Vec<EntityHeader>,

    /// Levels to descend (-1 for unbounded)
    #[arg(short, long, value_parser = validate_depth, allow_hyphen_values = true)]
    pub depth: Option<i64>,

    /// Leave the queried objects themselves out of the order
    #[arg(long)]
    pub exclude_roots: bool,
}

/// Arguments for the `replace` command
#[derive(Parser, Debug, Clone)]
pub struct ReplaceArgs {
    /// Object whose references to rewrite (TYPE:ID)
    #[arg(value_parser = validate_header)]
    pub object: EntityHeader,

    /// Reference replacements (TYPE:FROM=TYPE:TO, comma-separated)
    #[arg(short, long = "map", required = true, value_delimiter = ',', value_parser = validate_replacement)]
    pub mappings: Vec<(EntityHeader, EntityHeader)>,

    /// Also rewrite references held by policy assertions
    #[arg(long)]
    pub assertions: bool,

    /// Save the rewritten entity back to the snapshot file
    #[arg(long)]
    pub write: bool,
}
