//! Output formatting for CLI commands.
//!
//! This module provides utilities for formatting command output in both
//! human-readable text format and JSON format for programmatic use.
//!
//! Submodules:
//! - [`color`]: Color and styling helpers
//! - [`tree`]: Dependency tree rendering with ASCII/Unicode connectors

pub mod color;
pub mod tree;

use crate::domain::DependencySearchResults;
use crate::flatten::FlatDependency;
use serde::Serialize;
use std::env;
use std::io::{self, Write};

pub use tree::{DepTreeNode, print_dep_tree};

use color::{bold, dimmed, format_object};

// ============================================================================
// Output Configuration
// ============================================================================

/// Configuration for output formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether to use ASCII-only connectors instead of Unicode.
    pub use_ascii: bool,
    /// Whether to use colors in output.
    pub use_colors: bool,
}

impl OutputConfig {
    /// Create a new `OutputConfig` with explicit values.
    pub fn new(use_ascii: bool, use_colors: bool) -> Self {
        Self {
            use_ascii,
            use_colors,
        }
    }

    /// Create an `OutputConfig` by reading from environment variables.
    ///
    /// Reads:
    /// - `GWDEPS_ASCII`: Set to "1" or "true" for ASCII-only connectors (default: false)
    /// - `NO_COLOR`: Standard env var to disable colors (any value disables colors)
    /// - `GWDEPS_COLOR`: Set to "0" or "false" to disable colors (default: true)
    pub fn from_env() -> Self {
        let use_ascii = match env::var("GWDEPS_ASCII") {
            Ok(v) if v == "1" || v.eq_ignore_ascii_case("true") => true,
            Ok(v) if v == "0" || v.eq_ignore_ascii_case("false") || v.is_empty() => false,
            Ok(v) => {
                tracing::warn!(
                    env_var = "GWDEPS_ASCII",
                    value = %v,
                    "Invalid value (expected '1', 'true', '0', or 'false'), using default"
                );
                false
            }
            Err(_) => false,
        };

        // Respect NO_COLOR standard (https://no-color.org/)
        let use_colors = env::var("NO_COLOR").is_err()
            && env::var("GWDEPS_COLOR")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true);

        Self {
            use_ascii,
            use_colors,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            use_ascii: false,
            use_colors: true,
        }
    }
}

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text format
    Text,
    /// JSON format for programmatic use
    Json,
}

// ============================================================================
// Public Dispatch Functions
// ============================================================================

/// Print dependency search results, one tree per queried object.
pub fn print_search_results(results: &[DependencySearchResults], mode: OutputMode) -> io::Result<()> {
    let trees: Vec<DepTreeNode> = results.iter().map(DepTreeNode::from_results).collect();
    match mode {
        OutputMode::Json => print_json(&trees),
        OutputMode::Text => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            write_trees(&mut handle, &trees, &OutputConfig::from_env())
        }
    }
}

/// Print the direct users of an object.
pub fn print_usages(usages: &DependencySearchResults, mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Json => write_json(&mut handle, &DepTreeNode::from_results(usages)),
        OutputMode::Text => write_usages(&mut handle, usages, &OutputConfig::from_env()),
    }
}

/// Print a flattened creation order.
pub fn print_flat(flat: &[FlatDependency], mode: OutputMode) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match mode {
        OutputMode::Json => write_json(&mut handle, &flat),
        OutputMode::Text => write_flat(&mut handle, flat, &OutputConfig::from_env()),
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, value)
}

// ============================================================================
// Formatting
// ============================================================================

fn write_json<W: Write, T: Serialize>(w: &mut W, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(w, "{json}")
}

fn write_trees<W: Write>(w: &mut W, trees: &[DepTreeNode], config: &OutputConfig) -> io::Result<()> {
    for (i, tree) in trees.iter().enumerate() {
        if i > 0 {
            writeln!(w)?;
        }
        print_dep_tree(w, tree, config)?;
    }
    Ok(())
}

fn write_usages<W: Write>(
    w: &mut W,
    usages: &DependencySearchResults,
    config: &OutputConfig,
) -> io::Result<()> {
    let users: Vec<_> = usages
        .dependencies()
        .map(|children| children.map(|c| c.dependent()).collect())
        .unwrap_or_default();
    writeln!(w, "{}", format_object(usages.dependent(), config))?;
    if users.is_empty() {
        return writeln!(w, "  {}", dimmed("Not used by any cached object", config));
    }
    writeln!(w, "{} ({}):", bold("Used by", config), users.len())?;
    for user in users {
        writeln!(w, "  {}", format_object(user, config))?;
    }
    Ok(())
}

fn write_flat<W: Write>(w: &mut W, flat: &[FlatDependency], config: &OutputConfig) -> io::Result<()> {
    let width = flat.len().to_string().len();
    for (i, entry) in flat.iter().enumerate() {
        let count = match &entry.dependencies {
            Some(dependencies) => format!("{} deps", dependencies.len()),
            None => "not explored".to_string(),
        };
        writeln!(
            w,
            "{:>width$}. {}  {}",
            i + 1,
            format_object(&entry.dependent, config),
            dimmed(&format!("({count})"), config)
        )?;
    }
    Ok(())
}
