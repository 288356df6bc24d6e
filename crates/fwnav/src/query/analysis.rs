//! Whole-graph call analyses: recursion cycles, call depths and per-function
//! metrics.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::trace::CallResolver;
use super::types::{CallCycle, CallDepth, CallStep, Certainty, FunctionMetrics};

struct Edge {
    to: usize,
    call_line: usize,
    certainty: Certainty,
}

/// Elementary call cycles among the build's definitions.
///
/// Each cycle is reported once, rooted at the definition indexed first, and
/// roots are visited in index order. At most `max_cycles` cycles of at most
/// `max_len` functions are collected.
pub(crate) struct CycleFinder<'a> {
    calls: CallResolver<'a>,
    edges: HashMap<usize, Vec<Edge>>,
    max_len: usize,
    max_cycles: usize,
    cycles: Vec<CallCycle>,
}

impl<'a> CycleFinder<'a> {
    pub fn new(calls: CallResolver<'a>, max_len: usize, max_cycles: usize) -> Self {
        Self {
            calls,
            edges: HashMap::default(),
            max_len,
            max_cycles,
            cycles: Vec::new(),
        }
    }

    pub fn find(mut self) -> Vec<CallCycle> {
        let roots: Vec<usize> = self.calls.index.definitions().collect();
        for root in roots {
            if self.cycles.len() >= self.max_cycles {
                tracing::debug!(limit = self.max_cycles, "cycle search truncated");
                break;
            }
            let mut steps = vec![self.calls.step(root, None, Certainty::Certain)];
            let mut on_path = vec![root];
            self.walk(root, &mut steps, &mut on_path);
        }
        self.cycles
    }

    fn walk(&mut self, root: usize, steps: &mut Vec<CallStep>, on_path: &mut Vec<usize>) {
        let Some(&current) = on_path.last() else {
            return;
        };
        let next: Vec<(usize, usize, Certainty)> = self
            .edges_from(current)
            .iter()
            .map(|e| (e.to, e.call_line, e.certainty))
            .collect();

        for (to, call_line, certainty) in next {
            if self.cycles.len() >= self.max_cycles {
                return;
            }
            let step = self.calls.step(to, Some(call_line), certainty);
            if to == root {
                let mut closed = steps.clone();
                closed.push(step);
                self.cycles.push(CallCycle { steps: closed });
            } else if to > root && !on_path.contains(&to) && on_path.len() < self.max_len {
                steps.push(step);
                on_path.push(to);
                self.walk(root, steps, on_path);
                on_path.pop();
                steps.pop();
            }
        }
    }

    fn edges_from(&mut self, from: usize) -> &[Edge] {
        let calls = self.calls;
        self.edges.entry(from).or_insert_with(|| {
            calls
                .callees(from)
                .into_iter()
                .map(|c| Edge {
                    to: c.id,
                    call_line: c.call_line,
                    certainty: c.certainty,
                })
                .collect()
        })
        .as_slice()
    }
}

/// Breadth-first distances from every definition of `root`, in visit order.
pub(crate) fn call_depths(calls: CallResolver<'_>, root: &str, max_depth: usize) -> Vec<CallDepth> {
    let mut seen: HashSet<usize> = HashSet::default();
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    for id in calls.index.definition_ids(root) {
        if seen.insert(id) {
            queue.push_back((id, 0));
        }
    }

    let mut depths = Vec::new();
    while let Some((id, depth)) = queue.pop_front() {
        let location = &calls.index.entry(id).location;
        depths.push(CallDepth {
            function: location.name.clone(),
            module: location.module.clone(),
            file: location.file.clone(),
            line: location.line,
            depth,
        });
        if depth == max_depth {
            continue;
        }
        for callee in calls.callees(id) {
            if seen.insert(callee.id) {
                queue.push_back((callee.id, depth + 1));
            }
        }
    }
    depths
}

pub(crate) fn function_metrics(calls: CallResolver<'_>, name: &str, max_depth: usize) -> FunctionMetrics {
    let index = calls.index;
    let mut metrics = FunctionMetrics {
        function: name.to_string(),
        ..FunctionMetrics::default()
    };

    let mut callees: HashSet<&str> = HashSet::default();
    for id in index.definition_ids(name) {
        metrics.definitions += 1;
        for (callee, _, _) in index.entry(id).calls() {
            metrics.calls_made += 1;
            callees.insert(callee);
        }
    }
    metrics.unique_callees = callees.len();

    let sites = index.calls_to(name);
    metrics.call_sites = sites.len();
    metrics.called_by = sites
        .iter()
        .map(|s| s.caller.as_str())
        .collect::<HashSet<_>>()
        .len();

    metrics.max_call_depth = call_depths(calls, name, max_depth)
        .iter()
        .map(|d| d.depth)
        .max()
        .unwrap_or(0);
    metrics
}
