//! Entry point: resolve descriptors, serve them from cache, open query engines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fwnav_config::{ConfigDiscovery, NavigatorConfig, validate_schema};
use fwnav_graph::{BuildContext, DependencyGraph};
use path_clean::PathClean;

use crate::cache::{CacheEntry, CacheLookup, CacheStore, CachedResolution, PendingWrite};
use crate::error::{NavError, Result};
use crate::pipeline::{Deadline, Pipeline, PipelineOutput, ResolveGuard};
use crate::query::{QueryEngine, QueryOptions};
use crate::resolver::search_roots;
use crate::runtime::{NativeRuntime, Runtime};

/// Where a [`Resolution`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Fresh,
}

/// An immutable resolved build.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub context: Arc<BuildContext>,
    pub graph: Arc<DependencyGraph>,
    pub source: ResolutionSource,
    /// Descriptor evaluations performed. Zero for cache hits.
    pub parses: usize,
}

impl Resolution {
    pub fn from_cache(&self) -> bool {
        self.source == ResolutionSource::Cache
    }
}

/// Resolves platform descriptors under one configuration.
///
/// Cloning is cheap; clones share the runtime and cache.
#[derive(Debug, Clone)]
pub struct Navigator {
    runtime: Arc<dyn Runtime>,
    config: Arc<NavigatorConfig>,
    workspace_root: PathBuf,
    search_roots: Arc<[PathBuf]>,
    cache: Option<Arc<CacheStore>>,
}

impl Navigator {
    /// Navigator over the real filesystem.
    pub fn new(config: NavigatorConfig) -> Result<Self> {
        Self::with_runtime(Arc::new(NativeRuntime::new()), config)
    }

    /// Load `fwnav.toml` from `root` or an ancestor (or defaults) and use
    /// `root` as the workspace unless the file names another.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let mut config = ConfigDiscovery::new(root).load_or_default()?;
        if config.workspace.root.is_none() {
            config.workspace.root = Some(root.to_path_buf());
        }
        Self::new(config)
    }

    pub fn with_runtime(runtime: Arc<dyn Runtime>, config: NavigatorConfig) -> Result<Self> {
        validate_schema(&config)?;

        let cwd = runtime.get_cwd()?;
        let workspace_root = config.workspace_root(&cwd).clean();
        let search_roots: Arc<[PathBuf]> = search_roots(&workspace_root, &config.workspace.packages_path).into();
        let cache = config.cache.enabled.then(|| {
            Arc::new(CacheStore::open(
                config.cache_dir(&workspace_root),
                config.cache_ttl(),
            ))
        });

        tracing::debug!(
            root = %workspace_root.display(),
            search_roots = search_roots.len(),
            cache = cache.is_some(),
            "navigator ready"
        );

        Ok(Self {
            runtime,
            config: Arc::new(config),
            workspace_root,
            search_roots,
            cache,
        })
    }

    /// Replace the configured cache.
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_deref()
    }

    /// Resolve `descriptor` under `flags`, layered over the configured flags.
    ///
    /// Relative descriptor paths are taken from the workspace root. The
    /// configured `resolution.timeout_ms`, if any, bounds the pass.
    pub fn resolve(&self, descriptor: impl AsRef<Path>, flags: &BTreeMap<String, String>) -> Result<Resolution> {
        let deadline = Deadline::from_option(self.config.resolution_timeout());
        self.resolve_with(descriptor.as_ref(), flags, &deadline, None)
    }

    /// Resolve on a blocking worker, giving up after `timeout`.
    ///
    /// A timed-out pass never publishes its cache entry, even if the worker
    /// finishes afterwards.
    pub async fn resolve_async(
        &self,
        descriptor: impl AsRef<Path>,
        flags: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<Resolution> {
        let guard = Arc::new(ResolveGuard::new());
        let navigator = self.clone();
        let descriptor = descriptor.as_ref().to_path_buf();
        let flags = flags.clone();
        let worker_guard = Arc::clone(&guard);

        let mut task = tokio::task::spawn_blocking(move || {
            let deadline = Deadline::after(timeout).with_guard(&worker_guard);
            navigator.resolve_with(&descriptor, &flags, &deadline, Some(&worker_guard))
        });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined.map_err(|e| NavError::Worker(e.to_string()))?,
            Err(_) if guard.try_time_out() => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "resolution timed out");
                Err(NavError::Timeout(timeout))
            }
            // committed just before the timer fired
            Err(_) => task.await.map_err(|e| NavError::Worker(e.to_string()))?,
        }
    }

    /// Drop the cached resolution of one request, if any.
    pub fn invalidate(&self, descriptor: impl AsRef<Path>, flags: &BTreeMap<String, String>) -> Result<()> {
        if let Some(cache) = &self.cache {
            let descriptor = self.descriptor_path(descriptor.as_ref());
            cache.invalidate(&descriptor, &self.merged_flags(flags))?;
        }
        Ok(())
    }

    /// Query engine over `resolution` with the configured query options.
    pub fn query(&self, resolution: &Resolution) -> QueryEngine {
        QueryEngine::new(
            Arc::clone(&resolution.context),
            Arc::clone(&resolution.graph),
            Arc::clone(&self.runtime),
            QueryOptions::from(&self.config.query),
        )
    }

    fn resolve_with(
        &self,
        descriptor: &Path,
        flags: &BTreeMap<String, String>,
        deadline: &Deadline<'_>,
        guard: Option<&ResolveGuard>,
    ) -> Result<Resolution> {
        let descriptor = self.descriptor_path(descriptor);
        let flags = self.merged_flags(flags);
        deadline.check()?;

        if let Some(hit) = self.cached(&descriptor, &flags) {
            settle(deadline, guard)?;
            tracing::info!(descriptor = %descriptor.display(), "resolution served from cache");
            return Ok(hit);
        }

        let PipelineOutput {
            context,
            graph,
            inputs,
            parses,
        } = Pipeline::new(
            self.runtime.as_ref(),
            &self.workspace_root,
            &self.search_roots,
            self.config.resolution.cycle_policy,
        )
        .run(&descriptor, &flags, deadline)?;

        let payload = CachedResolution { context, graph };
        let (payload, pending) = match &self.cache {
            Some(cache) => {
                let entry = CacheEntry::new(descriptor.clone(), flags, inputs, cache.ttl(), payload);
                let pending = cache
                    .stage(&entry)
                    .inspect_err(|err| tracing::warn!(error = %err, "cannot stage cache entry"))
                    .ok();
                (entry.payload, pending)
            }
            None => (payload, None),
        };

        // a pending write dropped here is discarded, never published
        settle(deadline, guard)?;
        if let Some(pending) = pending {
            publish(pending);
        }

        Ok(Resolution {
            context: Arc::new(payload.context),
            graph: Arc::new(payload.graph),
            source: ResolutionSource::Fresh,
            parses,
        })
    }

    fn cached(&self, descriptor: &Path, flags: &BTreeMap<String, String>) -> Option<Resolution> {
        let cache = self.cache.as_ref()?;
        match cache.fetch(self.runtime.as_ref(), descriptor, flags) {
            Ok(CacheLookup::Hit(entry)) => {
                let CachedResolution { context, graph } = entry.payload;
                Some(Resolution {
                    context: Arc::new(context),
                    graph: Arc::new(graph),
                    source: ResolutionSource::Cache,
                    parses: 0,
                })
            }
            Ok(CacheLookup::Miss(reason)) => {
                tracing::debug!(descriptor = %descriptor.display(), %reason, "cache miss");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "cache lookup failed, resolving from source");
                None
            }
        }
    }

    fn descriptor_path(&self, descriptor: &Path) -> PathBuf {
        if descriptor.is_absolute() {
            descriptor.clean()
        } else {
            self.workspace_root.join(descriptor).clean()
        }
    }

    fn merged_flags(&self, flags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = self.config.resolution.flags.clone();
        merged.extend(flags.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Final deadline check, then claim the right to publish.
fn settle(deadline: &Deadline<'_>, guard: Option<&ResolveGuard>) -> Result<()> {
    deadline.check()?;
    if guard.is_some_and(|g| !g.try_commit()) {
        return Err(NavError::Timeout(deadline.budget()));
    }
    Ok(())
}

fn publish(pending: PendingWrite) {
    let key = pending.key().clone();
    match pending.commit() {
        Ok(()) => tracing::debug!(key = %key, "cache entry written"),
        Err(err) => tracing::warn!(key = %key, error = %err, "cache write failed"),
    }
}
