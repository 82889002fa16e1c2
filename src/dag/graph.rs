// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::descriptor::{TaskDescriptor, TaskId};
use crate::errors::GraphError;

/// Validated, immutable dependency graph.
///
/// Nodes are positions in `tasks` (descriptor order); an edge `a -> b` means
/// `b` depends on `a`. Construction guarantees unique ids, resolvable
/// dependencies and acyclicity.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<TaskDescriptor>,
    index: HashMap<TaskId, usize>,
    edges: DiGraphMap<usize, ()>,
    levels: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Validate descriptors and build the graph.
    ///
    /// Checks, in order: descriptor shape, duplicate ids, unknown
    /// dependencies, cycles.
    pub fn build<I>(descriptors: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = TaskDescriptor>,
    {
        let tasks: Vec<TaskDescriptor> = descriptors.into_iter().collect();

        for task in &tasks {
            task.validate()?;
        }

        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateId(task.id.clone()));
            }
        }

        let mut edges: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..tasks.len() {
            edges.add_node(i);
        }
        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.depends_on {
                let Some(&dep_idx) = index.get(dep) else {
                    return Err(GraphError::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                edges.add_edge(dep_idx, i, ());
            }
        }

        let levels = topological_levels(&tasks, &edges)?;
        debug!(
            tasks = tasks.len(),
            levels = levels.len(),
            "task graph validated"
        );

        Ok(Self {
            tasks,
            index,
            edges,
            levels,
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task ids in descriptor order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&TaskDescriptor> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn descriptors(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    /// Immediate dependencies (the descriptor's `depends_on`).
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.get(id)
            .map(|t| t.depends_on.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents: tasks listing `id` in their `depends_on`.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        let Some(&i) = self.index.get(id) else {
            return Vec::new();
        };
        self.edges
            .neighbors_directed(i, Direction::Outgoing)
            .map(|j| self.tasks[j].id.as_str())
            .collect()
    }

    /// Every task that directly or indirectly depends on `id`.
    pub fn transitive_dependents(&self, id: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<usize> = self
            .edges
            .neighbors_directed(start, Direction::Outgoing)
            .collect();

        while let Some(n) = queue.pop_front() {
            if !seen.insert(n) {
                continue;
            }
            out.push(self.tasks[n].id.as_str());
            queue.extend(self.edges.neighbors_directed(n, Direction::Outgoing));
        }
        out
    }

    /// Tasks with no dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.depends_on.is_empty())
            .map(|t| t.id.as_str())
            .collect()
    }

    /// Topological levels: tasks in the same level are mutually independent.
    /// Each level is sorted by id.
    pub fn levels(&self) -> Vec<Vec<&str>> {
        self.levels
            .iter()
            .map(|level| level.iter().map(|&i| self.tasks[i].id.as_str()).collect())
            .collect()
    }
}

/// Kahn's algorithm, grouping each pass of zero in-degree nodes into a level.
fn topological_levels(
    tasks: &[TaskDescriptor],
    edges: &DiGraphMap<usize, ()>,
) -> Result<Vec<Vec<usize>>, GraphError> {
    let mut in_degree: Vec<usize> = (0..tasks.len())
        .map(|i| edges.neighbors_directed(i, Direction::Incoming).count())
        .collect();

    let mut current: Vec<usize> = (0..tasks.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut levels = Vec::new();
    let mut placed = 0;

    while !current.is_empty() {
        let mut next = Vec::new();
        for &n in &current {
            for m in edges.neighbors_directed(n, Direction::Outgoing) {
                in_degree[m] -= 1;
                if in_degree[m] == 0 {
                    next.push(m);
                }
            }
        }
        placed += current.len();
        current.sort_by(|&a, &b| tasks[a].id.cmp(&tasks[b].id));
        levels.push(std::mem::replace(&mut current, next));
    }

    if placed < tasks.len() {
        let mut remaining: Vec<String> = (0..tasks.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| tasks[i].id.clone())
            .collect();
        remaining.sort();
        return Err(GraphError::Cycle { remaining });
    }

    Ok(levels)
}
