//! # fwnav-graph
//!
//! Pure data model for resolved EDK2 platform builds.
//!
//! This crate provides the records produced by a resolution pass and the
//! dependency graph built over them, without any I/O or parsing logic.
//!
//! ## Overview
//!
//! - **Module records**: [`ModuleDescriptor`] with validated [`ModuleType`] and [`Arch`] values
//! - **Library bindings**: [`LibraryClassMapping`] tagged with the [`ResolutionScope`] that won
//! - **Build context**: [`BuildContext`], one immutable instance per (descriptor, flags) pair
//! - **Dependency graph**: [`DependencyGraph`] with precomputed transitive closure,
//!   eager reverse edges and structured cycle reporting
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 BuildContext                 │
//! │   platform info, flags, macros, mappings     │
//! └──────────────────────┬───────────────────────┘
//!                        │ Arc<ModuleDescriptor>
//!                        ▼
//!          ┌──────────────────────────┐
//!          │       GraphBuilder       │
//!          │  three-color DFS, closure│
//!          └────────────┬─────────────┘
//!                       ▼
//!          ┌──────────────────────────┐
//!          │     DependencyGraph      │
//!          │ deps / closure / reverse │
//!          └──────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use fwnav_graph::{GraphBuilder, ModuleId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app = ModuleId::new("AppPkg/App/App.inf")?;
//! let lib = ModuleId::new("MdePkg/Library/BaseLib/BaseLib.inf")?;
//!
//! let mut builder = GraphBuilder::new();
//! builder.add_node(app.clone());
//! builder.add_node(lib.clone());
//! builder.add_edge(&app, &lib)?;
//!
//! let graph = builder.build()?;
//! assert_eq!(graph.dependencies(&app), &[lib.clone()]);
//! assert_eq!(graph.dependents(&lib), &[app]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! Every type here is immutable once built. Share them through `Arc` and read
//! from as many threads as needed without locking.

pub mod context;
pub mod dependency_chain;
mod graph;
pub mod kinds;
pub mod mapping;
pub mod module;
pub mod module_id;
pub mod statistics;

pub use context::{BuildContext, PlatformInfo};
pub use dependency_chain::{ChainAnalysis, DependencyChain};
pub use graph::{CyclePolicy, DependencyGraph, GraphBuilder};
pub use kinds::{Arch, ModuleType, UnknownValue};
pub use mapping::{LibraryClassMapping, ResolutionScope};
pub use module::{
    InterfaceKind, InterfaceRef, InterfaceUsage, LibraryClassDependency, ModuleDescriptor,
    ModuleDescriptorBuilder, ModuleRole, ProducedLibraryClass,
};
pub use module_id::{ModuleId, ModuleIdError};
pub use statistics::GraphStatistics;

/// Error types for graph operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A dependency cycle; `path` starts and ends with the same module.
    #[error("dependency cycle detected: {}", format_path(.path))]
    Cycle { path: Vec<ModuleId> },

    /// An edge named a module that was never added as a node.
    #[error("edge {from} -> {to} references a module outside the graph")]
    UnknownNode { from: ModuleId, to: ModuleId },

    /// Export failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Render a module path as `a -> b -> c`.
pub fn format_path(path: &[ModuleId]) -> String {
    path.iter()
        .map(ModuleId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
