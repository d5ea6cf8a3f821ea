//! Environment and program caches.
//!
//! Two levels, both keyed without looking at input values:
//!
//! ```text
//!   environments   EnvironmentKey ["metadata", "parameters", ...] → Environment
//!   programs       (EnvironmentKey, expression source)            → Program
//! ```
//!
//! Each level is a [`CacheStore`] chosen by [`CacheMode`]: a concurrent map
//! (default), an LRU with a fixed capacity, or nothing at all. Stores never
//! hold a lock while an expression compiles; two threads that miss on the same
//! key both compile and the later insert wins, which is harmless because both
//! results are identical.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use keel_core::Inputs;

use crate::cel::{CompileError, EnvironmentError, Library, Program};
use crate::env::{Environment, EnvironmentKey};
use crate::functions::base_library;

// ---------------------------------------------------------------------------
// Storage backends
// ---------------------------------------------------------------------------

/// Minimal thread-safe key/value store.
pub trait CacheStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    fn len(&self) -> usize;
    fn clear(&self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Grows without bound. Sharded, so readers rarely contend.
pub struct UnboundedStore<K, V> {
    map: DashMap<K, V>,
}

impl<K: Hash + Eq, V> UnboundedStore<K, V> {
    pub fn new() -> Self {
        UnboundedStore { map: DashMap::new() }
    }
}

impl<K: Hash + Eq, V> Default for UnboundedStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> CacheStore<K, V> for UnboundedStore<K, V>
where
    K: Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: K, value: V) {
        self.map.insert(key, value);
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&self) {
        self.map.clear();
    }
}

/// Evicts the least recently used entry once `capacity` is reached.
pub struct LruStore<K: Hash + Eq, V> {
    cache: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V> LruStore<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        LruStore {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<K, V> CacheStore<K, V> for LruStore<K, V>
where
    K: Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.cache.lock().get(key).cloned()
    }

    fn put(&self, key: K, value: V) {
        self.cache.lock().put(key, value);
    }

    fn len(&self) -> usize {
        self.cache.lock().len()
    }

    fn clear(&self) {
        self.cache.lock().clear();
    }
}

/// Stores nothing; every lookup misses.
pub struct DisabledStore;

impl<K, V> CacheStore<K, V> for DisabledStore {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn put(&self, _key: K, _value: V) {}

    fn len(&self) -> usize {
        0
    }

    fn clear(&self) {}
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How one cache level stores entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    #[default]
    Unbounded,
    /// LRU with the given capacity; `0` behaves like `Disabled`.
    Bounded(usize),
    Disabled,
}

impl CacheMode {
    fn store<K, V>(self) -> Box<dyn CacheStore<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        match self {
            CacheMode::Unbounded => Box::new(UnboundedStore::new()),
            CacheMode::Bounded(n) => match NonZeroUsize::new(n) {
                Some(capacity) => Box::new(LruStore::new(capacity)),
                None => Box::new(DisabledStore),
            },
            CacheMode::Disabled => Box::new(DisabledStore),
        }
    }
}

/// Cache configuration for an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOptions {
    pub environment_cache: CacheMode,
    pub program_cache: CacheMode,
}

impl EngineOptions {
    /// No caching at either level. Every expression recompiles.
    pub fn uncached() -> Self {
        EngineOptions {
            environment_cache: CacheMode::Disabled,
            program_cache: CacheMode::Disabled,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineCache
// ---------------------------------------------------------------------------

/// Hit/miss counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub environment_hits: u64,
    pub environment_misses: u64,
    pub program_hits: u64,
    pub program_misses: u64,
}

#[derive(Default)]
struct Counters {
    environment_hits: AtomicU64,
    environment_misses: AtomicU64,
    program_hits: AtomicU64,
    program_misses: AtomicU64,
}

type ProgramKey = (EnvironmentKey, String);

/// The shared state of one or more engines: the function library and the two
/// cache levels. Share it between engines with an `Arc`.
pub struct EngineCache {
    library: Arc<Library>,
    environments: Box<dyn CacheStore<EnvironmentKey, Arc<Environment>>>,
    programs: Box<dyn CacheStore<ProgramKey, Arc<Program>>>,
    counters: Counters,
}

impl EngineCache {
    pub fn new(options: &EngineOptions) -> Self {
        Self::with_library(options, base_library())
    }

    /// A cache whose environments compile against `library` instead of the
    /// base library.
    pub fn with_library(options: &EngineOptions, library: Arc<Library>) -> Self {
        EngineCache {
            library,
            environments: options.environment_cache.store(),
            programs: options.program_cache.store(),
            counters: Counters::default(),
        }
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Reuse or build the environment for the variable names of `inputs`.
    /// Failed builds are not cached.
    pub fn environment(&self, inputs: &Inputs) -> Result<Arc<Environment>, EnvironmentError> {
        let key = EnvironmentKey::from_inputs(inputs);
        if let Some(env) = self.environments.get(&key) {
            self.counters.environment_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(env);
        }
        self.counters
            .environment_misses
            .fetch_add(1, Ordering::Relaxed);

        let env = Arc::new(Environment::build(inputs, Arc::clone(&self.library))?);
        tracing::debug!(variables = %key, "built evaluation environment");
        self.environments.put(key, Arc::clone(&env));
        Ok(env)
    }

    pub fn get_program(&self, key: &EnvironmentKey, source: &str) -> Option<Arc<Program>> {
        self.programs.get(&(key.clone(), source.to_owned()))
    }

    pub fn put_program(&self, key: &EnvironmentKey, source: &str, program: Arc<Program>) {
        self.programs.put((key.clone(), source.to_owned()), program);
    }

    /// Reuse or compile `source` against `env`.
    pub fn program(&self, env: &Environment, source: &str) -> Result<Arc<Program>, CompileError> {
        if let Some(program) = self.get_program(env.key(), source) {
            self.counters.program_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(program);
        }
        self.counters.program_misses.fetch_add(1, Ordering::Relaxed);

        let program = Arc::new(env.compile(source)?);
        tracing::trace!(expression = source, "compiled expression");
        self.put_program(env.key(), source, Arc::clone(&program));
        Ok(program)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            environment_hits: self.counters.environment_hits.load(Ordering::Relaxed),
            environment_misses: self.counters.environment_misses.load(Ordering::Relaxed),
            program_hits: self.counters.program_hits.load(Ordering::Relaxed),
            program_misses: self.counters.program_misses.load(Ordering::Relaxed),
        }
    }

    pub fn environment_cache_len(&self) -> usize {
        self.environments.len()
    }

    pub fn program_cache_len(&self) -> usize {
        self.programs.len()
    }

    /// Drop every cached environment and program. Counters are kept.
    pub fn clear(&self) {
        self.environments.clear();
        self.programs.clear();
    }
}

impl Default for EngineCache {
    fn default() -> Self {
        Self::new(&EngineOptions::default())
    }
}

impl std::fmt::Debug for EngineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCache")
            .field("environments", &self.environments.len())
            .field("programs", &self.programs.len())
            .field("stats", &self.stats())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
