//! Index-arena view of a plan's dependency graph.
//!
//! Steps live in a flat array; edges are stored as index lists pointing from a
//! step to the steps it depends on. All traversals use explicit stacks, so graph
//! depth is bounded only by memory. The three-color detector in
//! [`StepGraph::topological_order`] is exact, so there is no separate
//! recursion-depth limit.

use super::model::{Plan, Step};
use super::PlanError;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug)]
pub struct StepGraph<'a> {
    steps: &'a [Step],
    dependencies: Vec<Vec<usize>>,
}

impl<'a> StepGraph<'a> {
    /// Builds the arena. Fails on duplicate step ids or dependency ids that do
    /// not resolve to a step in `steps`.
    pub fn from_steps(steps: &'a [Step]) -> Result<Self, PlanError> {
        let mut index_by_id: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            if index_by_id.insert(step.id.as_str(), index).is_some() {
                return Err(PlanError::DuplicateStepId {
                    step_id: step.id.clone(),
                });
            }
        }

        let mut dependencies = Vec::with_capacity(steps.len());
        for step in steps {
            let mut edges = Vec::with_capacity(step.dependencies.len());
            for dependency in &step.dependencies {
                let index = index_by_id.get(dependency.as_str()).copied().ok_or_else(|| {
                    PlanError::StepNotFound {
                        step_id: dependency.to_string(),
                    }
                })?;
                edges.push(index);
            }
            dependencies.push(edges);
        }

        Ok(Self {
            steps,
            dependencies,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> &'a Step {
        &self.steps[index]
    }

    pub fn dependencies_of(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// True when `target` is reachable from `start` by following dependency edges
    /// (i.e. `start` transitively depends on `target`, or they are the same step).
    pub fn reaches(&self, start: usize, target: usize) -> bool {
        let mut visited = vec![false; self.steps.len()];
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if visited[node] {
                continue;
            }
            visited[node] = true;
            for &next in &self.dependencies[node] {
                if !visited[next] {
                    stack.push(next);
                }
            }
        }
        false
    }

    /// Depth-first post-order: roots in insertion order, each step's
    /// dependencies (in declaration order) before the step itself.
    pub fn topological_order(&self) -> Result<Vec<usize>, PlanError> {
        let count = self.steps.len();
        let mut marks = vec![Mark::Unvisited; count];
        let mut order = Vec::with_capacity(count);

        for root in 0..count {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::InProgress;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(&(node, cursor)) = stack.last() {
                let Some(&dependency) = self.dependencies[node].get(cursor) else {
                    marks[node] = Mark::Done;
                    order.push(node);
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks[dependency] {
                    Mark::Unvisited => {
                        marks[dependency] = Mark::InProgress;
                        stack.push((dependency, 0));
                    }
                    Mark::InProgress => {
                        return Err(PlanError::CircularDependencyDetected {
                            step_id: self.steps[dependency].id.clone(),
                        });
                    }
                    Mark::Done => {}
                }
            }
        }

        Ok(order)
    }

    /// Groups steps by depth (longest dependency chain below them). Members of one
    /// batch share no edges; each batch is sorted by insertion order.
    pub fn batches(&self) -> Result<Vec<Vec<usize>>, PlanError> {
        let order = self.topological_order()?;
        let mut levels = vec![0_usize; self.steps.len()];
        let mut batches: Vec<Vec<usize>> = Vec::new();

        for index in order {
            let level = self.dependencies[index]
                .iter()
                .map(|&dependency| levels[dependency] + 1)
                .max()
                .unwrap_or(0);
            levels[index] = level;
            if batches.len() <= level {
                batches.resize_with(level + 1, Vec::new);
            }
            batches[level].push(index);
        }

        for batch in &mut batches {
            batch.sort_unstable();
        }
        Ok(batches)
    }
}

/// Steps in a deterministic execution order: every step after all of its
/// transitive dependencies, ties broken by insertion order.
pub fn resolve_dependencies(plan: &Plan) -> Result<Vec<&Step>, PlanError> {
    let graph = StepGraph::from_steps(&plan.steps)?;
    Ok(graph
        .topological_order()?
        .into_iter()
        .map(|index| graph.step(index))
        .collect())
}

/// Execution order split into batches that can run concurrently. A batch may
/// depend on any step of any earlier batch.
pub fn execution_batches(plan: &Plan) -> Result<Vec<Vec<&Step>>, PlanError> {
    let graph = StepGraph::from_steps(&plan.steps)?;
    Ok(graph
        .batches()?
        .into_iter()
        .map(|batch| batch.into_iter().map(|index| graph.step(index)).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::model::{StepStatus, StepType};
    use crate::shared::ids::StepId;

    fn step(id: &str, deps: &[&str]) -> Step {
        Step {
            id: StepId::parse(id).expect("id"),
            name: id.to_string(),
            description: None,
            step_type: StepType::Action,
            input: None,
            config: None,
            status: StepStatus::Pending,
            dependencies: deps
                .iter()
                .map(|dep| StepId::parse(dep).expect("dep"))
                .collect(),
            output: None,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    #[test]
    fn reaches_follows_transitive_edges_only_forward() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])];
        let graph = StepGraph::from_steps(&steps).expect("graph");
        assert!(graph.reaches(2, 0));
        assert!(!graph.reaches(0, 2));
        assert!(graph.reaches(1, 1));
    }

    #[test]
    fn deep_chain_does_not_exhaust_the_stack() {
        let ids: Vec<String> = (0..20_000).map(|i| format!("s{i}")).collect();
        let mut steps = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate().rev() {
            let deps: Vec<&str> = if index == 0 {
                Vec::new()
            } else {
                vec![ids[index - 1].as_str()]
            };
            steps.push(step(id, &deps));
        }
        let graph = StepGraph::from_steps(&steps).expect("graph");
        let order = graph.topological_order().expect("order");
        assert_eq!(graph.step(order[0]).id.as_str(), "s0");
        assert_eq!(graph.step(order[order.len() - 1]).id.as_str(), "s19999");
    }

    #[test]
    fn corrupted_cycle_is_detected() {
        let steps = vec![step("a", &["c"]), step("b", &["a"]), step("c", &["b"])];
        let graph = StepGraph::from_steps(&steps).expect("graph");
        let err = graph.topological_order().expect_err("cycle");
        assert!(matches!(err, PlanError::CircularDependencyDetected { .. }));
    }

    #[test]
    fn dangling_and_duplicate_ids_are_rejected() {
        let dangling = vec![step("a", &["ghost"])];
        assert!(matches!(
            StepGraph::from_steps(&dangling),
            Err(PlanError::StepNotFound { step_id }) if step_id == "ghost"
        ));

        let duplicate = vec![step("a", &[]), step("a", &[])];
        assert!(matches!(
            StepGraph::from_steps(&duplicate),
            Err(PlanError::DuplicateStepId { .. })
        ));
    }
}
