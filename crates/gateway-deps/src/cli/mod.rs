//! CLI argument parsing and command dispatch.
//!
//! This module provides the command-line interface for gwdeps using clap's derive API.
//! Each command has its own argument struct with validation and helpful error messages.
//!
//! # Commands
//!
//! - `init`: Write a default configuration file
//! - `dependencies`: Show what objects depend on, live or from the cache
//! - `usages`: Show which cached objects use an object
//! - `flatten`: Order dependencies so each object comes after everything it needs
//! - `replace`: Rewrite the references an object holds
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//! - `--entities`: Entity snapshot to load (YAML, or JSON by extension)
//! - `--config`: Configuration file
//!
//! # Example
//!
//! ```bash
//! gwdeps dependencies service:orders --depth 2 --types policy,folder
//! gwdeps usages jms-connection:inbound
//! gwdeps flatten service:orders --exclude-roots
//! gwdeps replace service:orders --map folder:old=folder:new --write
//! ```

mod args;
mod execute;
mod validators;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Re-export argument structs
pub use args::{DependenciesArgs, FlattenArgs, InitArgs, ReplaceArgs, UsagesArgs};

// Re-export validators for external use
pub use validators::{validate_depth, validate_entity_type, validate_header, validate_replacement};

/// Default entity snapshot path
pub const DEFAULT_ENTITIES_FILE: &str = "entities.yaml";

/// gwdeps - gateway configuration dependency analysis
///
/// Discover what gateway objects depend on, which objects use them, and the order
/// in which they have to be created.
#[derive(Parser, Debug)]
#[command(name = "gwdeps")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Entity snapshot to load (YAML, or JSON for `.json` files)
    #[arg(short, long, global = true, default_value = DEFAULT_ENTITIES_FILE)]
    pub entities: PathBuf,

    /// Configuration file (defaults to `gateway-deps.yaml` when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Write a default configuration file
    Init(InitArgs),

    /// Show the dependencies of objects
    ///
    /// Searches the entity snapshot live by default. With `--cached` the dependency
    /// cache is built first and answers the query.
    #[command(alias = "deps")]
    Dependencies(DependenciesArgs),

    /// Show which objects use an object
    ///
    /// Builds the dependency cache and reads its usage index.
    Usages(UsagesArgs),

    /// Order dependencies for creation
    ///
    /// Lists every object reachable from the given objects exactly once, each after
    /// the objects it depends on.
    Flatten(FlattenArgs),

    /// Rewrite the references an object holds
    ///
    /// Prints the rewritten entity; `--write` also saves it to the snapshot.
    Replace(ReplaceArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub fn execute(&self) -> Result<()> {
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        match &self.command {
            Some(Commands::Init(args)) => execute::execute_init(args),
            Some(Commands::Dependencies(args)) => {
                execute::execute_dependencies(&self.load_app()?, args, output_mode)
            }
            Some(Commands::Usages(args)) => {
                execute::execute_usages(&self.load_app()?, args, output_mode)
            }
            Some(Commands::Flatten(args)) => {
                execute::execute_flatten(&self.load_app()?, args, output_mode)
            }
            Some(Commands::Replace(args)) => {
                execute::execute_replace(&self.load_app()?, args, &self.entities, output_mode)
            }
            None => {
                println!("gwdeps gateway dependency analysis");
                println!("Use --help for more information");
                Ok(())
            }
        }
    }

    fn load_app(&self) -> Result<crate::app::App> {
        crate::app::App::load(&self.entities, self.config.as_deref())
            .with_context(|| format!("Failed to load entities from {}", self.entities.display()))
    }
}
