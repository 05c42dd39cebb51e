//! Application context for CLI command execution.
//!
//! [`App`] wires the pieces of a running gateway together: an entity store loaded from
//! a snapshot, the event bus it publishes to, the cluster properties, a finder and a
//! dependency cache listening to both.
//!
//! # Example
//!
//! ```no_run
//! use gateway_deps::app::App;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let app = App::load(Path::new("entities.yaml"), None)?;
//!     app.warm_cache()?;
//!     // Execute commands using app...
//!     Ok(())
//! }
//! ```

use crate::cache::DependencyCache;
use crate::config::{CONFIG_FILE_NAME, ClusterProperties, GatewayDepsConfig};
use crate::domain::{EntityType, SearchDepth, SearchOptions};
use crate::error::{Error, Result};
use crate::events::{EventBus, GatewayEvent};
use crate::finder::DependencyFinder;
use crate::store::InMemoryEntityStore;
use std::path::Path;
use std::sync::Arc;

/// Application context for CLI operations.
pub struct App {
    config: GatewayDepsConfig,
    store: Arc<InMemoryEntityStore>,
    bus: Arc<EventBus>,
    properties: ClusterProperties,
    finder: DependencyFinder,
    cache: DependencyCache,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Load the entity snapshot at `entities` and the configuration.
    ///
    /// Without an explicit `config` path, `gateway-deps.yaml` in the current directory
    /// is used if present, and defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be read or parsed.
    pub fn load(entities: &Path, config: Option<&Path>) -> Result<Self> {
        let config = match config {
            Some(path) => GatewayDepsConfig::load(path)?,
            None => {
                let default_path = Path::new(CONFIG_FILE_NAME);
                if default_path.exists() {
                    GatewayDepsConfig::load(default_path)?
                } else {
                    GatewayDepsConfig::default()
                }
            }
        };
        let store = InMemoryEntityStore::load(entities)?;
        Ok(Self::new(config, store))
    }

    /// Wire an application around an already loaded store.
    ///
    /// Publishes [`GatewayEvent::Started`], so the cache starts building right away if
    /// the configuration enables it.
    pub fn new(config: GatewayDepsConfig, store: InMemoryEntityStore) -> Self {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(store.with_event_bus(Arc::clone(&bus)));
        let finder = DependencyFinder::with_store(store.clone());
        let cache = DependencyCache::new(finder.clone(), &config.dependency_cache);
        let properties = ClusterProperties::new();
        cache.start(&bus, &properties);
        bus.publish(&GatewayEvent::Started);

        Self {
            config,
            store,
            bus,
            properties,
            finder,
            cache,
        }
    }

    /// Enable the cache and wait until it is built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheNotEnabled`] if the build failed; the failure itself is logged.
    pub fn warm_cache(&self) -> Result<()> {
        if !self.cache.is_enabled() {
            self.cache.enable()?;
        }
        self.cache.wait_for_build()?;
        if self.cache.is_enabled() {
            Ok(())
        } else {
            Err(Error::CacheNotEnabled)
        }
    }

    /// Search options from command-line values, defaulting the depth from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] for a depth below `-1`, or [`Error::Config`] if
    /// the configured default is invalid.
    pub fn search_options(
        &self,
        depth: Option<i64>,
        types: &[EntityType],
        include_assertions: bool,
    ) -> Result<SearchOptions> {
        let depth = match depth {
            Some(depth) => SearchDepth::from_i64(depth)?,
            None => self.config.default_depth()?,
        };
        Ok(SearchOptions::with_depth(depth)
            .include_assertions(include_assertions)
            .only_types(types.iter().copied()))
    }

    /// The loaded configuration.
    pub fn config(&self) -> &GatewayDepsConfig {
        &self.config
    }

    /// The entity store.
    pub fn store(&self) -> &InMemoryEntityStore {
        &self.store
    }

    /// The event bus the store publishes to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Live cluster properties.
    pub fn properties(&self) -> &ClusterProperties {
        &self.properties
    }

    /// The live finder.
    pub fn finder(&self) -> &DependencyFinder {
        &self.finder
    }

    /// The dependency cache.
    pub fn cache(&self) -> &DependencyCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEPENDENCY_CACHE_ENABLED_PROPERTY;
    use crate::domain::{Entity, EntityHeader};
    use tempfile::TempDir;

    const SNAPSHOT: &str = "\
entities:
  - type: service
    id: s
    references:
      - type: policy
        id: p
  - type: policy
    id: p
";

    #[test]
    fn test_load_snapshot_with_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("entities.yaml");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let app = App::load(&path, None).unwrap();
        assert_eq!(app.store().len().unwrap(), 2);
        assert!(!app.cache().is_enabled());
    }

    #[test]
    fn test_enabled_config_builds_on_start() {
        let mut config = GatewayDepsConfig::default();
        config.dependency_cache.enabled = true;
        let app = App::new(
            config,
            InMemoryEntityStore::from_entities([Entity::new(EntityType::Policy, "p")]),
        );

        app.cache().wait_for_build().unwrap();
        assert!(app.cache().is_enabled());
    }

    #[test]
    fn test_warm_cache_and_property_disable() {
        let app = App::new(
            GatewayDepsConfig::default(),
            InMemoryEntityStore::from_entities([Entity::new(EntityType::Policy, "p")]),
        );
        app.warm_cache().unwrap();
        assert_eq!(app.cache().cached_len().unwrap(), 1);

        app.properties().set(DEPENDENCY_CACHE_ENABLED_PROPERTY, "false");
        assert!(!app.cache().is_enabled());
        assert!(app.cache().find_usages(&EntityHeader::new(EntityType::Policy, "p")).is_err());
    }

    #[test]
    fn test_search_options_use_configured_depth() {
        let mut config = GatewayDepsConfig::default();
        config.search.default_depth = 2;
        let app = App::new(config, InMemoryEntityStore::new());

        let options = app.search_options(None, &[], false).unwrap();
        assert_eq!(options.depth, SearchDepth::Levels(2));

        let options = app.search_options(Some(-1), &[EntityType::Policy], true).unwrap();
        assert_eq!(options.depth, SearchDepth::Unbounded);
        assert!(options.include_assertions);
        assert!(options.accepts(EntityType::Policy));
        assert!(!options.accepts(EntityType::Folder));
    }

    #[test]
    fn test_invalid_depth() {
        let app = App::new(GatewayDepsConfig::default(), InMemoryEntityStore::new());
        assert!(matches!(
            app.search_options(Some(-3), &[], false),
            Err(Error::InvalidOption { .. })
        ));
    }
}
