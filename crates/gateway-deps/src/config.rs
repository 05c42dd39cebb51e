//! Configuration for the dependency cache and searches.
//!
//! Two sources feed the cache:
//!
//! - [`GatewayDepsConfig`], a YAML file read once at startup
//! - [`ClusterProperties`], live cluster-wide properties whose changes are pushed to
//!   registered [`PropertyChangeListener`]s (the cache listens for
//!   [`DEPENDENCY_CACHE_ENABLED_PROPERTY`])

use crate::domain::SearchDepth;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Cluster property switching the dependency cache on and off.
pub const DEPENDENCY_CACHE_ENABLED_PROPERTY: &str = "dependencyCache.enabled";

/// Default name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "gateway-deps.yaml";

const DEFAULT_EVENT_POLL_INTERVAL_MS: u64 = 100;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayDepsConfig {
    /// Dependency cache settings
    #[serde(default)]
    pub dependency_cache: CacheConfig,

    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,
}

/// Dependency cache section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Whether the cache is enabled at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How long the event consumer waits for an event before re-checking its stop flag
    #[serde(default = "default_poll_interval")]
    pub event_poll_interval_ms: u64,
}

impl CacheConfig {
    /// The poll interval as a duration.
    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            event_poll_interval_ms: default_poll_interval(),
        }
    }
}

/// Search section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SearchConfig {
    /// Depth used when a query does not specify one (`-1` = unbounded)
    #[serde(default = "default_depth")]
    pub default_depth: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
        }
    }
}

fn default_enabled() -> bool {
    false
}

fn default_poll_interval() -> u64 {
    DEFAULT_EVENT_POLL_INTERVAL_MS
}

fn default_depth() -> i64 {
    -1
}

impl GatewayDepsConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`] if it does
    /// not parse or holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on serialization failure and [`Error::Io`] on write failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.dependency_cache.event_poll_interval_ms == 0 {
            return Err(Error::Config(
                "dependency-cache.event-poll-interval-ms must be positive".to_string(),
            ));
        }
        self.default_depth().map(|_| ())
    }

    /// The configured default search depth.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the depth is below `-1`.
    pub fn default_depth(&self) -> Result<SearchDepth> {
        SearchDepth::from_i64(self.search.default_depth)
            .map_err(|e| Error::Config(format!("search.default-depth: {e}")))
    }
}

/// Notified when a cluster property changes.
pub trait PropertyChangeListener: Send + Sync {
    /// `old` and `new` are `None` when the property was unset before or after the change.
    fn property_changed(&self, name: &str, old: Option<&str>, new: Option<&str>);
}

/// Live, cluster-wide properties.
#[derive(Default)]
pub struct ClusterProperties {
    values: RwLock<BTreeMap<String, String>>,
    listeners: RwLock<Vec<Arc<dyn PropertyChangeListener>>>,
}

impl std::fmt::Debug for ClusterProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterProperties")
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl ClusterProperties {
    /// Create an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a property.
    pub fn get(&self, name: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// A property parsed as a boolean. Unparseable values read as `None`.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.trim().parse().ok()
    }

    /// Set a property, notifying listeners if the value changed.
    pub fn set(&self, name: &str, value: impl Into<String>) {
        self.update(name, Some(value.into()));
    }

    /// Remove a property, notifying listeners if it was set.
    pub fn remove(&self, name: &str) {
        self.update(name, None);
    }

    /// Register a change listener.
    pub fn subscribe(&self, listener: Arc<dyn PropertyChangeListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn update(&self, name: &str, value: Option<String>) {
        let old = {
            let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
            match &value {
                Some(v) => values.insert(name.to_string(), v.clone()),
                None => values.remove(name),
            }
        };
        if old == value {
            return;
        }
        tracing::debug!(property = name, ?old, new = ?value, "Cluster property changed");
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.property_changed(name, old.as_deref(), value.as_deref());
        }
    }
}
