//! Concurrent dependency cache with a reverse usage index.
//!
//! The cache holds the complete dependency graph of the gateway plus, for every
//! object, the set of objects that use it. It moves through three states:
//!
//! ```text
//!            enable / Started            build finished
//!  Disabled ─────────────────→ Building ─────────────────→ Enabled
//!     ↑                                                      │
//!     └──────────────────────── disable ─────────────────────┘
//! ```
//!
//! ## Threads
//!
//! - **build** (`dependency-cache-build`): stops the previous consumer, then, holding
//!   the write lock, scans the whole gateway with the live finder, merges every node,
//!   replays the events that queued up during the scan and marks the cache enabled.
//!   Readers block for the whole rebuild.
//! - **consumer** (`dependency-cache-events`): polls the event queue with a bounded
//!   wait, plans each change without the lock and applies it under the write lock. It
//!   checks its stop flag on every poll and is always joined, never abandoned.
//!
//! Event listeners only enqueue, so publishers never wait for the cache.
//!
//! ## Queries
//!
//! [`DependencyCache::get_dependencies`] answers from the cache while it is enabled and
//! falls back to live discovery otherwise, or when assertions are requested as
//! dependencies (the cache never records them). [`DependencyCache::find_usages`] is
//! only available from the cache.
//!
//! Deleting an object removes it and its usage set, but parents that still list it
//! are not rewritten: until a parent is itself refreshed, a deep query through it
//! still shows the deleted object as it was last seen.

mod consumer;
mod filter;
mod graph;
mod surrogate;

pub use surrogate::{
    IgnoredType, JmsEndpointOwner, KeyEntryOwner, ServicePolicyOwner, Surrogate,
    SurrogateRegistry, SurrogateResolver,
};

use crate::config::{
    CacheConfig, ClusterProperties, DEPENDENCY_CACHE_ENABLED_PROPERTY, PropertyChangeListener,
};
use crate::domain::{DependencySearchResults, Entity, EntityHeader, SearchDepth, SearchOptions};
use crate::error::{Error, Result};
use crate::events::{EventBus, EventListener, GatewayEvent};
use crate::finder::DependencyFinder;
use crate::flatten::flatten_search_results;
use crate::processor::ReplacementMap;
use graph::CacheGraph;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const BUILD_THREAD_NAME: &str = "dependency-cache-build";
const CONSUMER_THREAD_NAME: &str = "dependency-cache-events";
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Lifecycle state of a [`DependencyCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CacheStatus {
    /// Queries go to the live finder; events are dropped
    Disabled = 0,
    /// A full scan is running; events are queued for replay
    Building = 1,
    /// Queries are answered from the cache
    Enabled = 2,
}

impl CacheStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CacheStatus::Building,
            2 => CacheStatus::Enabled,
            _ => CacheStatus::Disabled,
        }
    }
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheStatus::Disabled => "disabled",
            CacheStatus::Building => "building",
            CacheStatus::Enabled => "enabled",
        })
    }
}

/// The dependency cache service.
///
/// Dropping the cache stops its threads.
pub struct DependencyCache {
    shared: Arc<Shared>,
}

/// State shared by the service handle, its listeners and its threads.
struct Shared {
    finder: DependencyFinder,
    surrogates: SurrogateRegistry,
    graph: RwLock<CacheGraph>,
    /// A [`CacheStatus`]; only written while holding the write lock
    status: AtomicU8,
    /// Whether the cache should be enabled
    configured: AtomicBool,
    sender: Sender<GatewayEvent>,
    receiver: Mutex<Receiver<GatewayEvent>>,
    /// Events enqueued and not yet applied or discarded
    pending: AtomicUsize,
    consumer: Mutex<Option<Consumer>>,
    build: Mutex<Option<JoinHandle<()>>>,
    /// Serializes builds
    build_lock: Mutex<()>,
    poll_interval: Duration,
}

struct Consumer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl fmt::Debug for DependencyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyCache")
            .field("status", &self.shared.status())
            .field("finder", &self.shared.finder)
            .field("surrogates", &self.shared.surrogates)
            .finish_non_exhaustive()
    }
}

impl DependencyCache {
    /// Create a disabled cache over `finder` with the default surrogate resolvers.
    pub fn new(finder: DependencyFinder, config: &CacheConfig) -> Self {
        Self::with_surrogates(finder, SurrogateRegistry::default(), config)
    }

    /// Create a disabled cache with custom surrogate resolvers.
    ///
    /// The cache builds once it is started and sees a [`GatewayEvent::Started`] event
    /// while configured as enabled, or when [`enable`](Self::enable) is called.
    pub fn with_surrogates(
        finder: DependencyFinder,
        surrogates: SurrogateRegistry,
        config: &CacheConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            shared: Arc::new(Shared {
                finder,
                surrogates,
                graph: RwLock::new(CacheGraph::default()),
                status: AtomicU8::new(CacheStatus::Disabled as u8),
                configured: AtomicBool::new(config.enabled),
                sender,
                receiver: Mutex::new(receiver),
                pending: AtomicUsize::new(0),
                consumer: Mutex::new(None),
                build: Mutex::new(None),
                build_lock: Mutex::new(()),
                poll_interval: config.event_poll_interval(),
            }),
        }
    }

    /// Subscribe to gateway events and to changes of the enabling cluster property.
    ///
    /// A value already set for the property overrides the configured default.
    pub fn start(&self, bus: &EventBus, properties: &ClusterProperties) {
        if let Some(enabled) = properties.get_bool(DEPENDENCY_CACHE_ENABLED_PROPERTY) {
            self.shared.configured.store(enabled, Ordering::Release);
        }
        let listener = Arc::new(CacheListener {
            shared: Arc::downgrade(&self.shared),
        });
        bus.subscribe(listener.clone());
        properties.subscribe(listener);
        debug!(
            configured = self.shared.configured.load(Ordering::Acquire),
            "Dependency cache listening for events"
        );
    }

    /// Enable the cache, building it on a background thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the build thread cannot be spawned.
    pub fn enable(&self) -> Result<()> {
        self.shared.configured.store(true, Ordering::Release);
        self.shared.spawn_build()
    }

    /// Disable the cache, dropping its contents and stopping the event consumer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] on lock poisoning or a panicked consumer.
    pub fn disable(&self) -> Result<()> {
        self.shared.configured.store(false, Ordering::Release);
        self.shared.disable()
    }

    /// Wait for any running build, then disable the cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a thread panicked or a lock is poisoned.
    pub fn stop(&self) -> Result<()> {
        self.shared.configured.store(false, Ordering::Release);
        self.wait_for_build()?;
        self.shared.disable()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> CacheStatus {
        self.shared.status()
    }

    /// Whether queries are currently answered from the cache.
    pub fn is_enabled(&self) -> bool {
        self.status() == CacheStatus::Enabled
    }

    /// Number of cached objects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the cache lock is poisoned.
    pub fn cached_len(&self) -> Result<usize> {
        Ok(self.shared.read()?.len())
    }

    /// Block until the most recently started build has finished.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the build thread panicked.
    pub fn wait_for_build(&self) -> Result<()> {
        let handle = self.shared.build.lock().map_err(poisoned)?.take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|payload| thread_panicked(BUILD_THREAD_NAME, &*payload)),
            None => Ok(()),
        }
    }

    /// Wait until every queued event has been applied and no build is running.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
    }

    /// Dependencies of the entities behind `headers`; every entity when empty.
    ///
    /// Served from the cache while it is enabled, otherwise by live discovery. Either
    /// way the results are the same.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntityNotFound`] if a header does not resolve, and whatever
    /// live discovery fails with when the cache is bypassed.
    pub fn get_dependencies(
        &self,
        headers: &[EntityHeader],
        options: &SearchOptions,
    ) -> Result<Vec<DependencySearchResults>> {
        let shared = &self.shared;
        if options.include_assertions || shared.status() != CacheStatus::Enabled {
            return shared.finder.get_dependencies(headers, options);
        }

        let store = shared.finder.store();
        let all;
        let headers = if headers.is_empty() {
            all = store.find_all()?;
            &all
        } else {
            headers
        };
        let roots = headers
            .iter()
            .map(|header| {
                store
                    .find(header)
                    .map(|entity| shared.finder.create_dependent_object(&entity))
            })
            .collect::<Result<Vec<_>>>()?;

        let graph = shared.read()?;
        if shared.status() != CacheStatus::Enabled {
            drop(graph);
            debug!("Dependency cache disabled during query, using live discovery");
            return shared.finder.get_dependencies(headers, options);
        }
        Ok(filter::filter_cached(&graph, &roots, options))
    }

    /// The objects that directly use the entity behind `header`, as a one-level result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheNotEnabled`] unless the cache is enabled, and
    /// [`Error::EntityNotFound`] if the header does not resolve.
    pub fn find_usages(&self, header: &EntityHeader) -> Result<DependencySearchResults> {
        let shared = &self.shared;
        if shared.status() != CacheStatus::Enabled {
            return Err(Error::CacheNotEnabled);
        }
        let entity = shared.finder.store().find(header)?;
        let dependent = shared.finder.create_dependent_object(&entity);

        let graph = shared.read()?;
        if shared.status() != CacheStatus::Enabled {
            return Err(Error::CacheNotEnabled);
        }
        let usages: Vec<_> = graph
            .usages_of(&dependent)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default();
        Ok(DependencySearchResults::one_level(
            dependent,
            usages,
            SearchOptions::with_depth(SearchDepth::Levels(1)),
        ))
    }

    /// Rewrite the references of `entity`; see [`DependencyFinder::replace_dependencies`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotReplaceDependencies`] if a mapping changes a reference's type.
    pub fn replace_dependencies(
        &self,
        entity: &mut Entity,
        replacements: &ReplacementMap,
        replace_assertion_dependencies: bool,
    ) -> Result<()> {
        self.shared
            .finder
            .replace_dependencies(entity, replacements, replace_assertion_dependencies)
    }
}

impl Drop for DependencyCache {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Failed to stop dependency cache cleanly");
        }
    }
}

impl Shared {
    fn status(&self) -> CacheStatus {
        CacheStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, _graph: &RwLockWriteGuard<'_, CacheGraph>, status: CacheStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CacheGraph>> {
        self.graph.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CacheGraph>> {
        self.graph.write().map_err(poisoned)
    }

    fn is_idle(&self) -> bool {
        match self.status() {
            CacheStatus::Building => false,
            CacheStatus::Enabled => self.pending.load(Ordering::Acquire) == 0,
            CacheStatus::Disabled => true,
        }
    }

    fn enqueue(&self, event: &GatewayEvent) {
        if self.status() == CacheStatus::Disabled {
            return;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.sender.send(event.clone()).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            error!("Dependency cache event queue disconnected");
        }
    }

    /// Remove every queued event without applying it.
    fn drain(&self) -> Result<Vec<GatewayEvent>> {
        let receiver = self.receiver.lock().map_err(poisoned)?;
        let events: Vec<_> = receiver.try_iter().collect();
        self.pending.fetch_sub(events.len(), Ordering::AcqRel);
        Ok(events)
    }

    fn spawn_build(self: &Arc<Self>) -> Result<()> {
        let shared = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(BUILD_THREAD_NAME.to_string())
            .spawn(move || {
                if let Err(e) = shared.build() {
                    warn!(error = %e, "Dependency cache build failed, cache left disabled");
                }
            })?;
        // a replaced handle belongs to a build that is finished or queued on the build lock
        self.build.lock().map_err(poisoned)?.replace(handle);
        Ok(())
    }

    fn build(self: &Arc<Self>) -> Result<()> {
        let _serial = self.build_lock.lock().map_err(poisoned)?;
        if !self.configured.load(Ordering::Acquire) {
            debug!("Dependency cache disabled before build started");
            return Ok(());
        }
        if self.status() != CacheStatus::Disabled {
            debug!(status = %self.status(), "Dependency cache already built");
            return Ok(());
        }
        self.stop_consumer()?;

        let mut graph = self.write()?;
        self.set_status(&graph, CacheStatus::Building);
        graph.clear();
        // the scan sees everything these describe
        self.drain()?;

        info!("Building dependency cache");
        let started = Instant::now();
        let results = match self.finder.get_dependencies(&[], &SearchOptions::default()) {
            Ok(results) => results,
            Err(e) => {
                self.set_status(&graph, CacheStatus::Disabled);
                graph.clear();
                return Err(e);
            }
        };
        for flat in flatten_search_results(&results, true) {
            graph.merge(&flat.dependent, flat.dependencies.as_deref());
        }

        let queued = self.drain()?;
        let replayed = queued.len();
        for event in queued {
            match consumer::plan(&event, &self.finder, &self.surrogates) {
                Ok(changes) => changes.into_iter().for_each(|change| change.apply(&mut graph)),
                Err(e) => warn!(error = %e, ?event, "Failed to replay event into dependency cache"),
            }
        }

        self.set_status(&graph, CacheStatus::Enabled);
        info!(
            objects = graph.len(),
            replayed,
            elapsed_ms = started.elapsed().as_millis(),
            "Dependency cache built"
        );
        drop(graph);
        self.start_consumer()
    }

    fn disable(&self) -> Result<()> {
        {
            let mut graph = self.write()?;
            let was = self.status();
            self.set_status(&graph, CacheStatus::Disabled);
            graph.clear();
            let dropped = self.drain()?.len();
            if was != CacheStatus::Disabled {
                info!(dropped, "Dependency cache disabled");
            }
        }
        self.stop_consumer()
    }

    fn start_consumer(self: &Arc<Self>) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let shared = Arc::clone(self);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(CONSUMER_THREAD_NAME.to_string())
                .spawn(move || consumer::run(&shared, &stop))?
        };
        let previous = self
            .consumer
            .lock()
            .map_err(poisoned)?
            .replace(Consumer { stop, handle });
        match previous {
            Some(previous) => previous.shut_down(),
            None => Ok(()),
        }
    }

    /// Signal the consumer to stop and join it. Never called with the write lock held,
    /// since the consumer may be waiting for it.
    fn stop_consumer(&self) -> Result<()> {
        let consumer = self.consumer.lock().map_err(poisoned)?.take();
        match consumer {
            Some(consumer) => consumer.shut_down(),
            None => Ok(()),
        }
    }

    fn handle(&self, event: &GatewayEvent) -> Result<()> {
        let changes = consumer::plan(event, &self.finder, &self.surrogates)?;
        if changes.is_empty() {
            return Ok(());
        }
        let mut graph = self.write()?;
        if self.status() != CacheStatus::Enabled {
            debug!("Dependency cache disabled while handling event, dropping changes");
            return Ok(());
        }
        for change in changes {
            change.apply(&mut graph);
        }
        Ok(())
    }
}

impl Consumer {
    fn shut_down(self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        self.handle
            .join()
            .map_err(|payload| thread_panicked(CONSUMER_THREAD_NAME, &*payload))
    }
}

/// Listener registered on the event bus and the cluster properties.
///
/// Holds the cache weakly so that subscribing does not keep a dropped cache alive.
struct CacheListener {
    shared: Weak<Shared>,
}

impl EventListener for CacheListener {
    fn on_event(&self, event: &GatewayEvent) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        match event {
            GatewayEvent::Started => {
                if shared.configured.load(Ordering::Acquire) {
                    if let Err(e) = shared.spawn_build() {
                        error!(error = %e, "Failed to start dependency cache build");
                    }
                }
            }
            _ => shared.enqueue(event),
        }
    }
}

impl PropertyChangeListener for CacheListener {
    fn property_changed(&self, name: &str, _old: Option<&str>, new: Option<&str>) {
        if name != DEPENDENCY_CACHE_ENABLED_PROPERTY {
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let enabled = new.and_then(|value| value.trim().parse().ok()).unwrap_or(false);
        shared.configured.store(enabled, Ordering::Release);
        let result = if enabled {
            shared.spawn_build()
        } else {
            shared.disable()
        };
        if let Err(e) = result {
            error!(error = %e, enabled, "Failed to apply dependency cache setting");
        }
    }
}

fn poisoned<T>(e: PoisonError<T>) -> Error {
    Error::Internal(format!("Dependency cache lock poisoned: {e}"))
}

fn thread_panicked(thread: &str, payload: &(dyn Any + Send)) -> Error {
    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
        format!("{thread} thread panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("{thread} thread panicked: {s}")
    } else {
        format!("{thread} thread panicked with unknown payload")
    };
    error!(panic_msg = %msg, "Dependency cache thread panicked");
    Error::Internal(msg)
}
