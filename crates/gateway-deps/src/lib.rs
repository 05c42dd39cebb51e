//! Gateway dependency analysis.
//!
//! This crate discovers the dependencies of gateway configuration objects (services,
//! policies, folders, connections, keys and so on), caches the resulting graph with a
//! reverse usage index kept current from entity events, and flattens dependency graphs
//! into a creation order. It ships both a library and the `gwdeps` CLI.

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod finder;
pub mod flatten;
pub mod processor;
pub mod store;

// Public CLI module (needed by binary)
pub mod app;
pub mod cli;
pub mod output;
