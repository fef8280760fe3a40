//! Execution scheduler - decides which orchestrator children run next

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use thiserror::Error;

/// Strategy for scheduling child pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Build children in dependency order, one at a time
    Sequential,

    /// Build all ready children in parallel
    Parallel,

    /// Limited parallelism (max N concurrent children)
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Parallel
    }
}

impl FromStr for SchedulingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(SchedulingStrategy::Sequential),
            "parallel" => Ok(SchedulingStrategy::Parallel),
            "parallel-limited" => Ok(SchedulingStrategy::LimitedParallel(4)),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// Invalid dependency declarations between pipelines
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Pipeline name '{name}' is used more than once")]
    DuplicateName { name: String },

    #[error("Pipeline '{pipeline}' depends on unknown pipeline '{dependency}'")]
    Unknown { pipeline: String, dependency: String },

    #[error("Pipeline '{pipeline}' depends on itself")]
    SelfDependency { pipeline: String },

    #[error("Dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
}

/// Dependency edges between children, by input index
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build and check the graph from `(name, declared dependencies)` pairs
    pub fn new(children: &[(Option<String>, Vec<String>)]) -> Result<Self, DependencyError> {
        let mut by_name: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, (name, _)) in children.iter().enumerate() {
            if let Some(name) = name {
                if by_name.insert(name.as_str(), index).is_some() {
                    return Err(DependencyError::DuplicateName { name: name.clone() });
                }
            }
        }

        let names: Vec<String> = children
            .iter()
            .enumerate()
            .map(|(index, (name, _))| name.clone().unwrap_or_else(|| format!("[{}]", index)))
            .collect();

        let mut dependencies = Vec::with_capacity(children.len());
        for (index, (_, declared)) in children.iter().enumerate() {
            let mut edges = Vec::new();
            for dependency in declared {
                let target = *by_name.get(dependency.as_str()).ok_or_else(|| DependencyError::Unknown {
                    pipeline: names[index].clone(),
                    dependency: dependency.clone(),
                })?;
                if target == index {
                    return Err(DependencyError::SelfDependency {
                        pipeline: names[index].clone(),
                    });
                }
                if !edges.contains(&target) {
                    edges.push(target);
                }
            }
            dependencies.push(edges);
        }

        let graph = Self { names, dependencies };
        graph.check_cycles()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    fn check_cycles(&self) -> Result<(), DependencyError> {
        let mut visited = HashSet::new();

        for start in 0..self.len() {
            let mut path = Vec::new();
            if let Some(cycle) = self.visit(start, &mut visited, &mut path) {
                return Err(DependencyError::Cycle {
                    cycle: cycle.into_iter().map(|i| self.names[i].clone()).collect(),
                });
            }
        }

        Ok(())
    }

    /// Depth-first search; returns the cycle (closed, first node repeated) if one is reachable
    fn visit(&self, node: usize, visited: &mut HashSet<usize>, path: &mut Vec<usize>) -> Option<Vec<usize>> {
        if let Some(position) = path.iter().position(|n| *n == node) {
            let mut cycle = path[position..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if visited.contains(&node) {
            return None;
        }

        path.push(node);
        for dep in &self.dependencies[node] {
            if let Some(cycle) = self.visit(*dep, visited, path) {
                return Some(cycle);
            }
        }
        path.pop();
        visited.insert(node);

        None
    }

    /// Topological order, ties broken by input order
    pub fn execution_order(&self) -> Vec<usize> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for index in 0..self.len() {
            self.visit_order(index, &mut visited, &mut order);
        }
        order
    }

    /// `seeds` plus every child that depends on one of them, directly or
    /// transitively, in input order
    pub fn with_dependents(&self, seeds: &[usize]) -> Vec<usize> {
        let mut affected: HashSet<usize> = seeds.iter().copied().filter(|i| *i < self.len()).collect();
        loop {
            let before = affected.len();
            for index in 0..self.len() {
                if self.dependencies[index].iter().any(|dep| affected.contains(dep)) {
                    affected.insert(index);
                }
            }
            if affected.len() == before {
                break;
            }
        }

        let mut affected: Vec<usize> = affected.into_iter().collect();
        affected.sort_unstable();
        affected
    }

    fn visit_order(&self, node: usize, visited: &mut HashSet<usize>, order: &mut Vec<usize>) {
        if !visited.insert(node) {
            return;
        }
        for dep in &self.dependencies[node] {
            self.visit_order(*dep, visited, order);
        }
        order.push(node);
    }
}

/// Per-pass progress of one child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped { blocked_by: usize },
    /// Not part of this pass; its last build still stands
    Unchanged,
}

/// Tracks one orchestrator pass and hands out ready children
pub struct ExecutionScheduler<'g> {
    graph: &'g DependencyGraph,
    strategy: SchedulingStrategy,
    states: Vec<ChildState>,
}

impl<'g> ExecutionScheduler<'g> {
    pub fn new(graph: &'g DependencyGraph, strategy: SchedulingStrategy) -> Self {
        Self {
            graph,
            strategy,
            states: vec![ChildState::Pending; graph.len()],
        }
    }

    /// Schedule only `selected`; the other children count as satisfied
    /// dependencies and are never started
    pub fn for_subset(graph: &'g DependencyGraph, strategy: SchedulingStrategy, selected: &[usize]) -> Self {
        let states = (0..graph.len())
            .map(|index| {
                if selected.contains(&index) {
                    ChildState::Pending
                } else {
                    ChildState::Unchanged
                }
            })
            .collect();

        Self {
            graph,
            strategy,
            states,
        }
    }

    /// Skip children blocked by failures, then mark and return the children
    /// that may start now
    pub fn next_children(&mut self) -> Vec<usize> {
        self.propagate_skips();

        let running = self.running_count();
        let capacity = match self.strategy {
            SchedulingStrategy::Sequential => 1usize.saturating_sub(running),
            SchedulingStrategy::Parallel => usize::MAX,
            SchedulingStrategy::LimitedParallel(max) => max.max(1).saturating_sub(running),
        };

        let ready: Vec<usize> = self
            .graph
            .execution_order()
            .into_iter()
            .filter(|index| self.is_ready(*index))
            .take(capacity)
            .collect();

        for index in &ready {
            self.states[*index] = ChildState::Running;
        }

        ready
    }

    fn is_ready(&self, index: usize) -> bool {
        self.states[index] == ChildState::Pending
            && self
                .graph
                .dependencies(index)
                .iter()
                .all(|dep| matches!(self.states[*dep], ChildState::Succeeded | ChildState::Unchanged))
    }

    /// Mark pending children whose dependency failed or was skipped; repeats
    /// until transitive dependents are covered
    fn propagate_skips(&mut self) {
        loop {
            let mut changed = false;
            for index in 0..self.states.len() {
                if self.states[index] != ChildState::Pending {
                    continue;
                }
                let blocker = self.graph.dependencies(index).iter().copied().find(|dep| {
                    matches!(self.states[*dep], ChildState::Failed | ChildState::Skipped { .. })
                });
                if let Some(blocked_by) = blocker {
                    self.states[index] = ChildState::Skipped { blocked_by };
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    pub fn complete(&mut self, index: usize, succeeded: bool) {
        self.states[index] = if succeeded {
            ChildState::Succeeded
        } else {
            ChildState::Failed
        };
    }

    pub fn running_count(&self) -> usize {
        self.states.iter().filter(|s| **s == ChildState::Running).count()
    }

    /// Check if there are more children to run or wait for
    pub fn has_more(&self) -> bool {
        self.states
            .iter()
            .any(|s| matches!(s, ChildState::Pending | ChildState::Running))
    }

    pub fn state(&self, index: usize) -> ChildState {
        self.states[index]
    }
}
