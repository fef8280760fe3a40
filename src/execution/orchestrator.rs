//! Orchestrator: several pipelines built together in dependency order

use crate::core::pipeline::Pipeline;
use crate::core::state::{CompilerState, Lifecycle, PassMode};
use crate::execution::controller::{Compile, WatchSource};
use crate::execution::scheduler::{ChildState, DependencyError, DependencyGraph, ExecutionScheduler, SchedulingStrategy};
use crate::execution::{ChildOutcome, ChildReport, Completion, MultiStats, PassOutcome, RunError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const ORCHESTRATOR_LABEL: &str = "orchestrator";

/// Runs an ordered list of pipelines as one build
pub struct Orchestrator {
    children: Vec<Arc<Pipeline>>,
    graph: DependencyGraph,
    strategy: SchedulingStrategy,
    lifecycle: Lifecycle,
    pass_lock: Mutex<()>,
}

impl Orchestrator {
    /// Record the dependency edges declared by each child's `dependencies`
    pub fn new(children: Vec<Pipeline>, strategy: SchedulingStrategy) -> Result<Self, DependencyError> {
        let declared: Vec<(Option<String>, Vec<String>)> = children
            .iter()
            .map(|child| (child.options.name.clone(), child.options.dependencies.clone()))
            .collect();
        let graph = DependencyGraph::new(&declared)?;

        debug!(
            "Orchestrating {} pipeline(s) with {:?} scheduling",
            children.len(),
            strategy
        );

        Ok(Self {
            children: children.into_iter().map(Arc::new).collect(),
            graph,
            strategy,
            lifecycle: Lifecycle::new(),
            pass_lock: Mutex::new(()),
        })
    }

    pub fn children(&self) -> &[Arc<Pipeline>] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Arc<Pipeline>> {
        self.children.iter().find(|c| c.options.name.as_deref() == Some(name))
    }

    /// Names of the pipelines `name` depends on
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        (0..self.graph.len())
            .find(|i| self.graph.name(*i) == name)
            .map(|i| {
                self.graph
                    .dependencies(i)
                    .iter()
                    .map(|dep| self.graph.name(*dep))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    pub fn state(&self) -> CompilerState {
        self.lifecycle.state()
    }

    /// Run one dependency-ordered pass over every child
    pub async fn compile_pass(&self, mode: PassMode) -> Completion {
        let all: Vec<usize> = (0..self.children.len()).collect();
        self.pass(mode, &all).await
    }

    /// Watch pass over the changed children and everything that depends on them
    ///
    /// Children outside that set keep their last build and are left out of
    /// the report.
    pub async fn rebuild(&self, changed: &[usize]) -> Completion {
        let selected = self.graph.with_dependents(changed);
        debug!(
            "Rebuilding {} of {} pipeline(s)",
            selected.len(),
            self.children.len()
        );
        self.pass(PassMode::Watch, &selected).await
    }

    async fn pass(&self, mode: PassMode, selected: &[usize]) -> Completion {
        let _guard = match self.lifecycle.begin_pass(ORCHESTRATOR_LABEL, mode) {
            Ok(guard) => guard,
            Err(e) => return Completion::failed(e),
        };
        let _pass = match self.pass_lock.try_lock() {
            Ok(pass) => pass,
            Err(_) => {
                return Completion::failed(RunError::ConcurrentCompilation {
                    target: ORCHESTRATOR_LABEL.to_string(),
                })
            }
        };

        let mut scheduler = ExecutionScheduler::for_subset(&self.graph, self.strategy, selected);
        let mut outcomes: Vec<Option<ChildOutcome>> = vec![None; self.children.len()];
        let mut errors = Vec::new();
        let mut tasks = JoinSet::new();

        loop {
            for index in scheduler.next_children() {
                debug!("Starting child {}", self.graph.name(index));
                let child = self.children[index].clone();
                tasks.spawn(async move { (index, child.compile_pass(mode).await) });
            }

            if !scheduler.has_more() {
                break;
            }

            match tasks.join_next().await {
                Some(Ok((index, result))) => {
                    let succeeded = matches!(&result, Ok(stats) if !stats.has_errors());
                    scheduler.complete(index, succeeded);
                    outcomes[index] = Some(match result {
                        Ok(stats) => ChildOutcome::Built(stats),
                        Err(e) => {
                            let outcome = ChildOutcome::Failed { error: e.to_string() };
                            errors.push(e);
                            outcome
                        }
                    });
                }
                Some(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Some(Err(e)) => {
                    warn!("child task cancelled: {}", e);
                }
                None => break,
            }
        }

        let children = (0..self.children.len())
            .filter_map(|index| {
                let outcome = match (outcomes[index].take(), scheduler.state(index)) {
                    (Some(outcome), _) => outcome,
                    (None, ChildState::Unchanged) => return None,
                    (None, ChildState::Skipped { blocked_by }) => ChildOutcome::Skipped {
                        blocked_by: self.graph.name(blocked_by).to_string(),
                    },
                    (None, _) => ChildOutcome::Failed {
                        error: "pass did not complete".to_string(),
                    },
                };
                Some(ChildReport {
                    name: self.graph.name(index).to_string(),
                    outcome,
                })
            })
            .collect();

        let stats = MultiStats { children };
        info!(
            "Orchestrator pass finished: {} built, {} error(s)",
            stats.built().len(),
            errors.len()
        );

        Completion {
            error: RunError::combine(errors),
            outcome: Some(PassOutcome::Multi(stats)),
        }
    }

    /// Close every child, collecting failures. Idempotent.
    pub async fn close(&self) -> Result<(), RunError> {
        let _pass = self.pass_lock.lock().await;

        if !self.lifecycle.begin_close() {
            return Ok(());
        }

        let mut errors = Vec::new();
        for child in &self.children {
            if let Err(e) = child.close().await {
                errors.push(e);
            }
        }
        self.lifecycle.finish_close();

        match RunError::combine(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Compile for Orchestrator {
    fn label(&self) -> String {
        ORCHESTRATOR_LABEL.to_string()
    }

    async fn compile(&self, mode: PassMode) -> Completion {
        self.compile_pass(mode).await
    }

    async fn close(&self) -> Result<(), RunError> {
        Orchestrator::close(self).await
    }

    fn watch_sources(&self) -> Vec<WatchSource> {
        self.children.iter().map(|child| child.watch_source()).collect()
    }

    fn begin_watch(&self) -> Result<(), RunError> {
        self.lifecycle.begin_watch(ORCHESTRATOR_LABEL)?;

        for (started, child) in self.children.iter().enumerate() {
            if let Err(e) = child.begin_watch() {
                for earlier in &self.children[..started] {
                    earlier.end_watch();
                }
                self.lifecycle.end_watch();
                return Err(e);
            }
        }

        Ok(())
    }

    fn end_watch(&self) {
        for child in &self.children {
            child.end_watch();
        }
        self.lifecycle.end_watch();
    }

    fn invalidate(&self, source: usize, changed: &[PathBuf]) {
        if let Some(child) = self.children.get(source) {
            child.invalidate(changed);
        }
    }

    async fn recompile(&self, sources: &[usize]) -> Completion {
        self.rebuild(sources).await
    }
}
