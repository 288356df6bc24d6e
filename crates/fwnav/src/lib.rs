//! # fwnav
//!
//! Resolve EDK2 platform descriptors (`.dsc`) into build-scoped module
//! graphs, and query those graphs down to individual functions.
//!
//! ## Overview
//!
//! One resolution pass turns a `(descriptor, flags)` pair into an immutable
//! [`BuildContext`] plus [`DependencyGraph`]:
//!
//! ```text
//! platform.dsc + flags
//!         │
//!         ▼
//!  DirectiveEvaluator   !if / !include / DEFINE / $(MACRO)
//!         │
//!         ▼
//!  DescriptorParser     [Defines] [LibraryClasses.*] [Components.*] ...
//!         │
//!         ▼
//!  LibraryResolver      component overrides > arch/type > arch > type > global
//!         │
//!         ▼
//!  GraphBuilder         cycle detection, transitive closure, reverse edges
//!         │
//!         ▼
//!  BuildContext + DependencyGraph ──► CacheStore (fingerprinted, atomic)
//!         │
//!         ▼
//!  QueryEngine          modules, dependencies, functions, call paths
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use fwnav::Navigator;
//!
//! # fn main() -> fwnav::Result<()> {
//! let navigator = Navigator::discover("/work/edk2")?;
//! let flags = BTreeMap::from([("FEATURE_X".to_string(), "TRUE".to_string())]);
//! let resolution = navigator.resolve("OvmfPkg/OvmfPkgX64.dsc", &flags)?;
//!
//! let query = navigator.query(&resolution);
//! for module in query.list_components() {
//!     println!("{} ({})", module.id, module.module_type);
//! }
//! let deps = query.module_dependencies("PlatformDxe", true)?;
//! println!("{} direct dependencies", deps.direct.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events. Applications that do not bring their
//! own subscriber can enable the `logging` feature and call
//! `fwnav::logging::init_logging`.

pub mod cache;
pub mod descriptor;
pub mod directive;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod navigator;
pub mod pipeline;
pub mod query;
pub mod resolver;
pub mod runtime;
pub mod source;

pub use cache::{CacheBackend, CacheError, CacheStats, CacheStore, FsBackend, MemoryBackend};
pub use directive::{DirectiveEvaluator, EvaluatedText, MacroEnv};
pub use error::{Location, NavError, ParseError, QueryError, ResolutionError, Result};
pub use navigator::{Navigator, Resolution, ResolutionSource};
pub use pipeline::{Deadline, Pipeline, ResolveGuard};
pub use query::{
    CallCycle, CallDepth, CallPath, CallStep, Certainty, FunctionMetrics, ModuleDependencies, QueryEngine,
    QueryOptions, StopReason,
};
pub use resolver::LibraryResolver;
pub use runtime::{NativeRuntime, Runtime, RuntimeError};
#[cfg(any(test, feature = "test-utils"))]
pub use runtime::MemoryRuntime;
pub use source::{CallKind, CallSite, FunctionKind, FunctionLocation, Parameter, SourceIndex};

pub use fwnav_config::{AmbiguousCallMode, NavigatorConfig};
pub use fwnav_graph::{
    Arch, BuildContext, ChainAnalysis, CyclePolicy, DependencyGraph, LibraryClassMapping,
    ModuleDescriptor, ModuleId, ModuleType, ResolutionScope,
};

#[cfg(test)]
mod tests;
