//! Command execution logic.
//!
//! This module contains the implementation of all CLI commands.

use anyhow::{Context, Result, bail};
use std::path::Path;

use super::args::{DependenciesArgs, FlattenArgs, InitArgs, ReplaceArgs, UsagesArgs};
use crate::app::App;
use crate::config::GatewayDepsConfig;
use crate::flatten::flatten_search_results;
use crate::output::{self, OutputMode};
use crate::processor::ReplacementMap;
use crate::store::EntityStore;

/// Execute the init command
pub fn execute_init(args: &InitArgs) -> Result<()> {
    if args.path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        );
    }

    let mut config = GatewayDepsConfig::default();
    config.dependency_cache.enabled = args.enable_cache;
    config
        .save(&args.path)
        .with_context(|| format!("Failed to write {}", args.path.display()))?;

    println!("Wrote configuration to {}", args.path.display());
    Ok(())
}

/// Execute the dependencies command
pub fn execute_dependencies(
    app: &App,
    args: &DependenciesArgs,
    output_mode: OutputMode,
) -> Result<()> {
    let options = app.search_options(args.depth, &args.types, args.assertions)?;

    let results = if args.cached {
        app.warm_cache()?;
        app.cache().get_dependencies(&args.objects, &options)?
    } else {
        app.finder().get_dependencies(&args.objects, &options)?
    };

    output::print_search_results(&results, output_mode)?;
    Ok(())
}

/// Execute the usages command
pub fn execute_usages(app: &App, args: &UsagesArgs, output_mode: OutputMode) -> Result<()> {
    app.warm_cache()
        .context("Usages need the dependency cache, which failed to build")?;
    let usages = app.cache().find_usages(&args.object)?;
    output::print_usages(&usages, output_mode)?;
    Ok(())
}

/// Execute the flatten command
pub fn execute_flatten(app: &App, args: &FlattenArgs, output_mode: OutputMode) -> Result<()> {
    let options = app.search_options(args.depth, &[], false)?;
    let results = app.finder().get_dependencies(&args.objects, &options)?;
    let flat = flatten_search_results(&results, !args.exclude_roots);
    output::print_flat(&flat, output_mode)?;
    Ok(())
}

/// Execute the replace command
pub fn execute_replace(
    app: &App,
    args: &ReplaceArgs,
    entities_path: &Path,
    output_mode: OutputMode,
) -> Result<()> {
    let mut entity = app.store().find(&args.object)?;
    let replacements: ReplacementMap = args.mappings.iter().cloned().collect();
    app.cache()
        .replace_dependencies(&mut entity, &replacements, args.assertions)?;

    if args.write {
        app.store().save(entity.clone())?;
        app.store()
            .snapshot()?
            .save(entities_path)
            .with_context(|| format!("Failed to write {}", entities_path.display()))?;
    }

    match output_mode {
        OutputMode::Json => output::print_json(&entity)?,
        OutputMode::Text => {
            print!("{}", serde_yaml::to_string(&entity)?);
            if args.write {
                println!("Saved {} to {}", entity.header(), entities_path.display());
            }
        }
    }
    Ok(())
}
