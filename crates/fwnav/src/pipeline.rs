//! One synchronous resolution pass: directives, descriptors, libraries, graph.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use fwnav_graph::{Arch, BuildContext, CyclePolicy, DependencyGraph, GraphBuilder, PlatformInfo};

use crate::descriptor::parse_platform;
use crate::directive::{DirectiveEvaluator, InputRecord, MacroEnv, record_input};
use crate::error::{Location, NavError, ParseError, ResolutionError, Result};
use crate::resolver::{LibraryResolver, ResolvedModules};
use crate::runtime::Runtime;

const RUNNING: u8 = 0;
const COMMITTED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// Settles the race between a deadline firing and a finished resolution
/// publishing its cache entry. Exactly one of the two transitions succeeds.
#[derive(Debug, Default)]
pub struct ResolveGuard {
    state: AtomicU8,
}

impl ResolveGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to publish. Fails once the resolution has timed out.
    pub fn try_commit(&self) -> bool {
        self.transition(COMMITTED)
    }

    /// Mark the resolution as timed out. Fails once it has committed.
    pub fn try_time_out(&self) -> bool {
        self.transition(TIMED_OUT)
    }

    pub fn is_timed_out(&self) -> bool {
        self.state.load(Ordering::Acquire) == TIMED_OUT
    }

    fn transition(&self, to: u8) -> bool {
        match self
            .state
            .compare_exchange(RUNNING, to, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == to,
        }
    }
}

/// Cooperative deadline checked between pipeline steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline<'g> {
    expires: Option<Instant>,
    budget: Duration,
    guard: Option<&'g ResolveGuard>,
}

impl<'g> Deadline<'g> {
    /// A deadline that never fires on its own.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(budget: Duration) -> Self {
        Self {
            expires: Instant::now().checked_add(budget),
            budget,
            guard: None,
        }
    }

    pub fn from_option(budget: Option<Duration>) -> Self {
        budget.map_or_else(Self::none, Self::after)
    }

    /// Also abort when `guard` has been timed out from elsewhere.
    pub fn with_guard(mut self, guard: &'g ResolveGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Budget used in the reported timeout. For guard-only deadlines set it explicitly.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn check(&self) -> Result<()> {
        if self.guard.is_some_and(ResolveGuard::is_timed_out) {
            return Err(NavError::Timeout(self.budget));
        }
        let Some(expires) = self.expires else {
            return Ok(());
        };
        if Instant::now() < expires {
            return Ok(());
        }
        // A guard that already committed means the result is published.
        if self.guard.is_none_or(ResolveGuard::try_time_out) {
            return Err(NavError::Timeout(self.budget));
        }
        Ok(())
    }
}

/// Result of one pass, before it is shared or cached.
#[derive(Debug)]
pub struct PipelineOutput {
    pub context: BuildContext,
    pub graph: DependencyGraph,
    /// Every descriptor file read, root first, with content hashes.
    pub inputs: Vec<InputRecord>,
    /// Descriptor evaluations performed, the platform descriptor included.
    pub parses: usize,
}

/// Settings shared by every pass of one navigator.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    runtime: &'a dyn Runtime,
    workspace_root: &'a Path,
    search_roots: &'a [PathBuf],
    cycle_policy: CyclePolicy,
}

impl<'a> Pipeline<'a> {
    /// `search_roots` must start with `workspace_root`.
    pub fn new(
        runtime: &'a dyn Runtime,
        workspace_root: &'a Path,
        search_roots: &'a [PathBuf],
        cycle_policy: CyclePolicy,
    ) -> Self {
        Self {
            runtime,
            workspace_root,
            search_roots,
            cycle_policy,
        }
    }

    /// Resolve `descriptor` under `flags`.
    ///
    /// The pass is deterministic: the same inputs always produce the same
    /// context and graph, apart from the creation timestamp.
    pub fn run(
        &self,
        descriptor: &Path,
        flags: &BTreeMap<String, String>,
        deadline: &Deadline<'_>,
    ) -> Result<PipelineOutput> {
        let started = Instant::now();
        tracing::info!(descriptor = %descriptor.display(), flags = flags.len(), "resolving platform");

        let text = DirectiveEvaluator::new(self.runtime, self.search_roots)
            .evaluate(descriptor, MacroEnv::new(flags.clone()))?;
        deadline.check()?;

        let arch = target_arch(&text.env, descriptor)?;
        let platform = parse_platform(&text, arch)?;
        if !platform.supported_archs.is_empty() && !platform.supported_archs.contains(&arch) {
            tracing::warn!(%arch, "target architecture is not in SUPPORTED_ARCHITECTURES");
        }
        deadline.check()?;

        let resolved =
            LibraryResolver::new(self.runtime, &platform, &text.env, arch, self.search_roots, deadline)
                .resolve()?;
        deadline.check()?;

        let graph = self.build_graph(&resolved)?;
        deadline.check()?;

        let mut inputs = text.inputs.clone();
        for input in &resolved.inputs {
            record_input(&mut inputs, input.clone());
        }

        let env = &text.env;
        let name = platform.name.clone().unwrap_or_else(|| {
            descriptor
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let context = BuildContext {
            platform: PlatformInfo {
                name,
                guid: platform.guid.clone(),
                descriptor: descriptor.to_path_buf(),
                supported_archs: platform.supported_archs.clone(),
                build_targets: platform.build_targets.clone(),
                defines: platform.defines.clone(),
            },
            workspace_root: self.workspace_root.to_path_buf(),
            flags: flags.clone(),
            macros: env.snapshot(),
            arch,
            target: env.get("TARGET").unwrap_or_default().to_string(),
            toolchain: env.get("TOOL_CHAIN_TAG").unwrap_or_default().to_string(),
            modules: resolved.modules,
            library_mappings: resolved.library_mappings,
            null_libraries: resolved.null_libraries,
            inputs: inputs
                .iter()
                .filter(|i| !i.is_absent())
                .map(|i| i.path.clone())
                .collect(),
            created_at: unix_seconds(),
        };

        tracing::info!(
            platform = %context.platform.name,
            modules = context.modules.len(),
            mappings = context.library_mappings.len(),
            edges = graph.edge_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "platform resolved"
        );

        Ok(PipelineOutput {
            context,
            graph,
            inputs,
            parses: resolved.parses + 1,
        })
    }

    fn build_graph(&self, resolved: &ResolvedModules) -> Result<DependencyGraph> {
        let mut builder = GraphBuilder::new().with_policy(self.cycle_policy);
        for id in resolved.modules.keys() {
            builder.add_node(id.clone());
        }
        for mapping in resolved
            .library_mappings
            .iter()
            .chain(&resolved.null_libraries)
        {
            builder.add_edge(&mapping.consumer, &mapping.implementation)?;
        }

        let graph = builder.build().map_err(|err| match err {
            fwnav_graph::Error::Cycle { path } => NavError::from(ResolutionError::Cycle { path }),
            other => other.into(),
        })?;
        for cycle in graph.cycles() {
            tracing::warn!(cycle = %fwnav_graph::format_path(cycle), "dependency cycle broken");
        }
        Ok(graph)
    }
}

fn target_arch(env: &MacroEnv, descriptor: &Path) -> Result<Arch> {
    let raw = env.get("ARCH").unwrap_or_default();
    raw.parse::<Arch>().map_err(|source| {
        ParseError::InvalidValue {
            location: Location::new(Arc::new(descriptor.to_path_buf()), 1),
            source,
        }
        .into()
    })
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
