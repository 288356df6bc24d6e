//! Depth-first call-path enumeration over the source index.
//!
//! [`CallResolver`] binds the calls in one definition to in-scope
//! definitions; [`Tracer`] and the analyses in `analysis` share it.

use fwnav_config::AmbiguousCallMode;
use fwnav_graph::DependencyGraph;
use indexmap::IndexMap;

use super::types::{CallPath, CallStep, Certainty, QueryOptions, StopReason};
use crate::source::{CallKind, FunctionLocation, SourceIndex};

pub(crate) struct Tracer<'a> {
    calls: CallResolver<'a>,
    max_depth: usize,
    max_paths: usize,
    paths: Vec<CallPath>,
}

pub(crate) struct Callee {
    pub id: usize,
    pub call_line: usize,
    pub certainty: Certainty,
}

#[derive(Clone, Copy)]
pub(crate) struct CallResolver<'a> {
    pub index: &'a SourceIndex,
    graph: &'a DependencyGraph,
    mode: AmbiguousCallMode,
}

impl<'a> Tracer<'a> {
    pub fn new(
        index: &'a SourceIndex,
        graph: &'a DependencyGraph,
        options: &QueryOptions,
        max_depth: usize,
    ) -> Self {
        Self {
            calls: CallResolver::new(index, graph, options),
            max_depth,
            max_paths: options.max_call_paths,
            paths: Vec::new(),
        }
    }

    /// Every maximal path starting at a definition of `root`.
    pub fn trace(mut self, root: &str) -> Vec<CallPath> {
        let roots: Vec<usize> = self.calls.index.definition_ids(root).collect();
        for id in roots {
            let mut steps = vec![self.step(id, None, Certainty::Certain)];
            let mut on_path = vec![id];
            self.walk(&mut steps, &mut on_path);
        }
        if self.paths.len() >= self.max_paths {
            tracing::debug!(root, limit = self.max_paths, "call trace truncated");
        }
        self.paths
    }

    fn walk(&mut self, steps: &mut Vec<CallStep>, on_path: &mut Vec<usize>) {
        if self.paths.len() >= self.max_paths {
            return;
        }
        let Some(&current) = on_path.last() else {
            return;
        };

        let (fresh, recursive): (Vec<_>, Vec<_>) = self
            .calls
            .callees(current)
            .into_iter()
            .partition(|c| !on_path.contains(&c.id));

        if fresh.is_empty() {
            let stop = if recursive.is_empty() {
                StopReason::Leaf
            } else {
                StopReason::Recursion
            };
            self.emit(steps, stop);
            return;
        }
        if steps.len() > self.max_depth {
            self.emit(steps, StopReason::DepthLimit);
            return;
        }

        for callee in fresh {
            steps.push(self.step(callee.id, Some(callee.call_line), callee.certainty));
            on_path.push(callee.id);
            self.walk(steps, on_path);
            on_path.pop();
            steps.pop();
        }
        if !recursive.is_empty() {
            self.emit(steps, StopReason::Recursion);
        }
    }

    fn emit(&mut self, steps: &[CallStep], stop: StopReason) {
        if self.paths.len() < self.max_paths {
            self.paths.push(CallPath {
                steps: steps.to_vec(),
                stop,
            });
        }
    }

    fn step(&self, id: usize, call_line: Option<usize>, certainty: Certainty) -> CallStep {
        self.calls.step(id, call_line, certainty)
    }
}

impl<'a> CallResolver<'a> {
    pub fn new(index: &'a SourceIndex, graph: &'a DependencyGraph, options: &QueryOptions) -> Self {
        Self {
            index,
            graph,
            mode: options.ambiguous_calls,
        }
    }

    pub fn step(&self, id: usize, call_line: Option<usize>, certainty: Certainty) -> CallStep {
        let location = &self.index.entry(id).location;
        CallStep {
            function: location.name.clone(),
            module: location.module.clone(),
            file: location.file.clone(),
            line: location.line,
            call_line,
            certainty,
        }
    }

    /// In-scope targets of the calls in `caller`, one per target, in call order.
    pub fn callees(&self, caller: usize) -> Vec<Callee> {
        let function = self.index.entry(caller);
        let mut targets: IndexMap<usize, Callee> = IndexMap::new();

        for (name, call_line, kind) in function.calls() {
            let candidates = self.resolve(caller, name);
            let certain = kind == CallKind::Direct && candidates.len() == 1;
            if !certain && self.mode == AmbiguousCallMode::Drop {
                continue;
            }
            let certainty = if certain {
                Certainty::Certain
            } else {
                Certainty::Uncertain
            };
            for id in candidates {
                let entry = targets.entry(id).or_insert(Callee {
                    id,
                    call_line,
                    certainty,
                });
                if certainty == Certainty::Certain {
                    entry.certainty = Certainty::Certain;
                }
            }
        }

        targets.into_values().collect()
    }

    /// Definitions of `name` visible from `caller`, nearest tier first:
    /// the same file, the same module, the libraries the module links, then
    /// anywhere in the build.
    fn resolve(&self, caller: usize, name: &str) -> Vec<usize> {
        let from = &self.index.entry(caller).location;
        let all: Vec<usize> = self.index.definition_ids(name).collect();
        if all.len() <= 1 {
            return all;
        }

        let linked = self.graph.transitive_dependencies(&from.module);
        let tiers: [&dyn Fn(&FunctionLocation) -> bool; 3] = [
            &|to| to.module == from.module && to.file == from.file,
            &|to| to.module == from.module,
            &|to| linked.contains(&to.module),
        ];
        for tier in tiers {
            let matched: Vec<usize> = all
                .iter()
                .copied()
                .filter(|&id| tier(&self.index.entry(id).location))
                .collect();
            if !matched.is_empty() {
                return matched;
            }
        }
        all
    }
}
