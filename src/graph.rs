//! Task dependency graph
//!
//! Tasks are linked by two mirrored adjacency sets: `blocked_by` lists a
//! task's predecessors and `blocks` its successors. Every mutation in this
//! module keeps the two sets exact inverses of each other for tasks that
//! exist; a `blocked_by` entry may name a missing task, which keeps its
//! holder from ever running.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ConclaveError, Result};

/// Task identifier, unique within a team
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a short random id
    pub fn generate() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    /// Will never run because a dependency failed
    Blocked,
    Error,
}

/// A unit of work in a team's graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub subject: String,
    pub description: String,
    pub status: TaskStatus,
    /// Agent expected to do the work; ownerless tasks are markers
    pub owner: Option<String>,
    pub blocked_by: BTreeSet<TaskId>,
    pub blocks: BTreeSet<TaskId>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// A pending task with no edges
    pub fn new(id: impl Into<TaskId>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            description: String::new(),
            status: TaskStatus::Pending,
            owner: None,
            blocked_by: BTreeSet::new(),
            blocks: BTreeSet::new(),
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn complete(&mut self, result: impl Into<String>) {
        self.status = TaskStatus::Completed;
        self.result = Some(result.into());
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

/// Request to create a task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Explicit id; generated when absent
    pub id: Option<TaskId>,
    pub subject: String,
    pub description: String,
    pub owner: Option<String>,
    pub blocked_by: Vec<TaskId>,
}

impl NewTask {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn blocked_by<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.blocked_by = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Immutable `task -> blocked_by` view used for cycle detection
pub type DependencyView = HashMap<TaskId, Vec<TaskId>>;

/// Whether `target` is reachable from `from` through at least one edge
fn reaches(view: &DependencyView, from: &TaskId, target: &TaskId) -> bool {
    let mut stack: Vec<&TaskId> = view.get(from).into_iter().flatten().collect();
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if seen.insert(node) {
            stack.extend(view.get(node).into_iter().flatten());
        }
    }
    false
}

/// Find a dependency cycle reachable from `start`.
///
/// Walks `blocked_by` edges depth first, tracking the current path. Returns
/// the path from `start` up to and including the first node seen twice on
/// the same path, or `None` if no cycle is reachable. Shared ancestors that
/// are reached along two different paths are not cycles.
pub fn find_cycle(view: &DependencyView, start: &TaskId) -> Option<Vec<TaskId>> {
    fn walk<'a>(
        view: &'a DependencyView,
        node: &'a TaskId,
        path: &mut Vec<&'a TaskId>,
        on_path: &mut HashSet<&'a TaskId>,
        done: &mut HashSet<&'a TaskId>,
    ) -> bool {
        if on_path.contains(node) {
            path.push(node);
            return true;
        }
        if done.contains(node) {
            return false;
        }

        path.push(node);
        on_path.insert(node);
        for dep in view.get(node).into_iter().flatten() {
            if walk(view, dep, path, on_path, done) {
                return true;
            }
        }
        on_path.remove(node);
        path.pop();
        done.insert(node);
        false
    }

    let mut path = Vec::new();
    let mut on_path = HashSet::new();
    let mut done = HashSet::new();
    walk(view, start, &mut path, &mut on_path, &mut done)
        .then(|| path.into_iter().cloned().collect())
}

/// Task graph for one team
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: HashMap<TaskId, Task>,
    /// Creation order, oldest first
    order: Vec<TaskId>,
    capacity: Option<usize>,
}

impl TaskGraph {
    /// Create an empty, unbounded graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph that evicts its oldest tasks beyond `capacity`
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }

    /// Create a task and wire its dependencies.
    ///
    /// If the new edges close a cycle the task is removed again together with
    /// every edge it introduced and [`ConclaveError::Cycle`] is returned.
    pub fn add_task(&mut self, request: NewTask) -> Result<Task> {
        let id = request.id.unwrap_or_else(TaskId::generate);
        if self.tasks.contains_key(&id) {
            return Err(ConclaveError::DuplicateTask(id));
        }

        let mut task = Task::new(id.clone(), request.subject);
        task.description = request.description;
        task.owner = request.owner;
        task.blocked_by = request.blocked_by.into_iter().collect();
        self.insert(task);

        let view = self.dependency_view();
        if let Some(path) = find_cycle(&view, &id) {
            warn!(task = %id, ?path, "Rejecting task that would close a dependency cycle");
            self.remove_task(&id);
            return Err(ConclaveError::Cycle { task: id, path });
        }

        self.evict_over_capacity(&id);
        debug!(task = %id, "Added task");
        self.tasks
            .get(&id)
            .cloned()
            .ok_or(ConclaveError::TaskNotFound(id))
    }

    /// Insert a task as-is, mirroring its edges onto existing neighbours.
    ///
    /// No cycle check is performed. Existing tasks that already name this id
    /// in `blocked_by` gain it as a successor.
    pub fn insert(&mut self, mut task: Task) {
        let id = task.id.clone();
        if self.tasks.contains_key(&id) {
            self.remove_task(&id);
        }

        for dep in &task.blocked_by {
            if let Some(pred) = self.tasks.get_mut(dep) {
                pred.blocks.insert(id.clone());
            }
        }
        for succ in &task.blocks {
            if let Some(next) = self.tasks.get_mut(succ) {
                next.blocked_by.insert(id.clone());
            }
        }
        for other in self.tasks.values() {
            if other.blocked_by.contains(&id) {
                task.blocks.insert(other.id.clone());
            }
            if other.blocks.contains(&id) {
                task.blocked_by.insert(other.id.clone());
            }
        }

        self.order.push(id.clone());
        self.tasks.insert(id, task);
    }

    /// Remove a task.
    ///
    /// Predecessors forget it as a successor. Successors keep naming it in
    /// `blocked_by`, so they stay unschedulable rather than silently losing a
    /// prerequisite.
    pub fn remove_task(&mut self, id: &TaskId) -> Option<Task> {
        let task = self.tasks.remove(id)?;
        self.order.retain(|t| t != id);
        for dep in &task.blocked_by {
            if let Some(pred) = self.tasks.get_mut(dep) {
                pred.blocks.remove(id);
            }
        }
        Some(task)
    }

    /// Add the edge `task` blocked by `dependency` without a cycle check
    pub fn link(&mut self, task: &TaskId, dependency: &TaskId) -> Result<()> {
        if !self.tasks.contains_key(dependency) {
            return Err(ConclaveError::TaskNotFound(dependency.clone()));
        }
        self.tasks
            .get_mut(task)
            .ok_or_else(|| ConclaveError::TaskNotFound(task.clone()))?
            .blocked_by
            .insert(dependency.clone());
        if let Some(dep) = self.tasks.get_mut(dependency) {
            dep.blocks.insert(task.clone());
        }
        Ok(())
    }

    /// Add the edge `task` blocked by `dependency`, refusing to close a cycle.
    ///
    /// On rejection the graph is left exactly as it was.
    pub fn add_dependency(&mut self, task: &TaskId, dependency: &TaskId) -> Result<()> {
        if self
            .tasks
            .get(task)
            .is_some_and(|t| t.blocked_by.contains(dependency))
        {
            return Ok(());
        }
        self.link(task, dependency)?;

        if let Some(path) = find_cycle(&self.dependency_view(), task) {
            warn!(task = %task, dependency = %dependency, ?path, "Rejecting dependency that would close a cycle");
            self.unlink(task, dependency);
            return Err(ConclaveError::Cycle {
                task: task.clone(),
                path,
            });
        }
        Ok(())
    }

    /// Remove the edge `task` blocked by `dependency`
    pub fn unlink(&mut self, task: &TaskId, dependency: &TaskId) -> bool {
        let removed = self
            .tasks
            .get_mut(task)
            .map(|t| t.blocked_by.remove(dependency))
            .unwrap_or(false);
        if let Some(dep) = self.tasks.get_mut(dependency) {
            dep.blocks.remove(task);
        }
        removed
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    /// Tasks in creation order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.order.clone()
    }

    /// A task can run when it is pending and every dependency exists and is
    /// completed. Missing dependencies never count as satisfied.
    pub fn is_executable(&self, id: &TaskId) -> bool {
        let Some(task) = self.tasks.get(id) else {
            return false;
        };
        task.status == TaskStatus::Pending
            && task.blocked_by.iter().all(|dep| {
                self.tasks
                    .get(dep)
                    .is_some_and(|d| d.status == TaskStatus::Completed)
            })
    }

    /// Every executable task, in creation order
    pub fn executable_frontier(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| self.is_executable(id))
            .cloned()
            .collect()
    }

    /// Snapshot of the `blocked_by` edges
    pub fn dependency_view(&self) -> DependencyView {
        self.tasks
            .values()
            .map(|t| (t.id.clone(), t.blocked_by.iter().cloned().collect()))
            .collect()
    }

    /// Ids of every task that lies on a dependency cycle, sorted.
    ///
    /// A task is on a cycle when it can reach itself along `blocked_by`
    /// edges, self-dependencies included.
    pub fn find_cycles(&self) -> Vec<TaskId> {
        let view = self.dependency_view();
        let mut cyclic: Vec<TaskId> = self
            .order
            .iter()
            .filter(|id| reaches(&view, id, id))
            .cloned()
            .collect();
        cyclic.sort();
        cyclic
    }

    /// Mark pending tasks that depend, directly or not, on a failed or
    /// blocked task as [`TaskStatus::Blocked`]. Returns the newly blocked ids.
    pub fn block_dependents_of_failures(&mut self) -> Vec<TaskId> {
        let mut newly_blocked = Vec::new();
        loop {
            let next: Vec<TaskId> = self
                .order
                .iter()
                .filter(|id| {
                    self.tasks.get(*id).is_some_and(|t| {
                        t.status == TaskStatus::Pending
                            && t.blocked_by.iter().any(|dep| {
                                self.tasks.get(dep).is_some_and(|d| {
                                    matches!(d.status, TaskStatus::Error | TaskStatus::Blocked)
                                })
                            })
                    })
                })
                .cloned()
                .collect();
            if next.is_empty() {
                break;
            }
            for id in next {
                if let Some(task) = self.tasks.get_mut(&id) {
                    task.status = TaskStatus::Blocked;
                    task.error = Some("blocked by a failed dependency".into());
                }
                newly_blocked.push(id);
            }
        }
        newly_blocked
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn evict_over_capacity(&mut self, keep: &TaskId) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.tasks.len() > capacity.max(1) {
            let Some(oldest) = self.order.iter().find(|id| *id != keep).cloned() else {
                break;
            };
            debug!(task = %oldest, capacity, "Evicting oldest task");
            self.remove_task(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    fn assert_mirrored(graph: &TaskGraph) {
        for task in graph.tasks() {
            for dep in &task.blocked_by {
                if let Some(pred) = graph.get(dep) {
                    assert!(pred.blocks.contains(&task.id), "{dep} should block {}", task.id);
                }
            }
            for succ in &task.blocks {
                let next = graph.get(succ).expect("successor exists");
                assert!(next.blocked_by.contains(&task.id));
            }
        }
    }

    // === Creation Tests ===

    #[test]
    fn test_add_task_generates_id() {
        let mut graph = TaskGraph::new();
        let task = graph.add_task(NewTask::new("write docs")).unwrap();

        assert_eq!(task.id.as_str().len(), 8);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_add_task_wires_both_directions() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("a").with_id("a")).unwrap();
        graph.add_task(NewTask::new("b").with_id("b")).unwrap();
        let c = graph
            .add_task(NewTask::new("c").with_id("c").blocked_by(["a", "b"]))
            .unwrap();

        assert_eq!(c.blocked_by.len(), 2);
        assert!(graph.get(&id("a")).unwrap().blocks.contains(&id("c")));
        assert!(graph.get(&id("b")).unwrap().blocks.contains(&id("c")));
        assert_mirrored(&graph);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("a").with_id("a")).unwrap();
        let err = graph.add_task(NewTask::new("again").with_id("a")).unwrap_err();
        assert!(matches!(err, ConclaveError::DuplicateTask(_)));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_insert_adopts_dangling_references() {
        let mut graph = TaskGraph::new();
        graph
            .add_task(NewTask::new("b").with_id("b").blocked_by(["a"]))
            .unwrap();
        graph.insert(Task::new("a", "a"));

        assert!(graph.get(&id("a")).unwrap().blocks.contains(&id("b")));
        assert_mirrored(&graph);
    }

    // === Executability Tests ===

    #[test]
    fn test_executable_requires_completed_dependencies() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("a").with_id("a")).unwrap();
        graph
            .add_task(NewTask::new("b").with_id("b").blocked_by(["a"]))
            .unwrap();

        assert!(graph.is_executable(&id("a")));
        assert!(!graph.is_executable(&id("b")));

        graph.get_mut(&id("a")).unwrap().status = TaskStatus::InProgress;
        assert!(!graph.is_executable(&id("b")));

        graph.get_mut(&id("a")).unwrap().complete("ok");
        assert!(graph.is_executable(&id("b")));
    }

    #[test]
    fn test_missing_dependency_never_executable() {
        let mut graph = TaskGraph::new();
        graph
            .add_task(NewTask::new("b").with_id("b").blocked_by(["ghost"]))
            .unwrap();

        assert!(!graph.is_executable(&id("b")));
        assert!(graph.executable_frontier().is_empty());
    }

    #[test]
    fn test_unknown_task_not_executable() {
        let graph = TaskGraph::new();
        assert!(!graph.is_executable(&id("nope")));
    }

    #[test]
    fn test_frontier_follows_chain() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("a").with_id("a")).unwrap();
        graph
            .add_task(NewTask::new("b").with_id("b").blocked_by(["a"]))
            .unwrap();

        assert_eq!(graph.executable_frontier(), vec![id("a")]);
        graph.get_mut(&id("a")).unwrap().complete("ok");
        assert_eq!(graph.executable_frontier(), vec![id("b")]);
        graph.get_mut(&id("b")).unwrap().complete("ok");
        assert!(graph.executable_frontier().is_empty());
    }

    // === Cycle Tests ===

    #[test]
    fn test_self_dependency_rejected() {
        let mut graph = TaskGraph::new();
        let err = graph
            .add_task(NewTask::new("a").with_id("a").blocked_by(["a"]))
            .unwrap_err();
        assert!(matches!(err, ConclaveError::Cycle { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_cycle_rejection_rolls_back() {
        let mut graph = TaskGraph::new();
        // a waits on c before c exists
        graph
            .add_task(NewTask::new("a").with_id("a").blocked_by(["c"]))
            .unwrap();
        graph
            .add_task(NewTask::new("b").with_id("b").blocked_by(["a"]))
            .unwrap();
        let before: Vec<Task> = graph.tasks().cloned().collect();

        let err = graph
            .add_task(NewTask::new("c").with_id("c").blocked_by(["b"]))
            .unwrap_err();

        match err {
            ConclaveError::Cycle { task, path } => {
                assert_eq!(task, id("c"));
                assert_eq!(path.first(), Some(&id("c")));
                assert_eq!(path.last(), Some(&id("c")));
            }
            other => panic!("unexpected error: {other}"),
        }
        let after: Vec<Task> = graph.tasks().cloned().collect();
        assert_eq!(before, after);
        assert!(graph.get(&id("c")).is_none());
        assert!(graph.get(&id("b")).unwrap().blocks.is_empty());
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("root").with_id("root")).unwrap();
        graph
            .add_task(NewTask::new("l").with_id("l").blocked_by(["root"]))
            .unwrap();
        graph
            .add_task(NewTask::new("r").with_id("r").blocked_by(["root"]))
            .unwrap();
        let join = graph.add_task(NewTask::new("join").with_id("join").blocked_by(["l", "r"]));

        assert!(join.is_ok());
        assert!(graph.find_cycles().is_empty());
    }

    #[test]
    fn test_find_cycle_pure() {
        let mut view = DependencyView::new();
        view.insert(id("a"), vec![id("c")]);
        view.insert(id("b"), vec![id("a")]);
        view.insert(id("c"), vec![id("b")]);
        view.insert(id("d"), vec![id("a")]);

        let path = find_cycle(&view, &id("a")).unwrap();
        assert_eq!(path, vec![id("a"), id("c"), id("b"), id("a")]);

        let from_d = find_cycle(&view, &id("d")).unwrap();
        assert_eq!(from_d.first(), Some(&id("d")));
        assert!(find_cycle(&DependencyView::new(), &id("a")).is_none());
    }

    #[test]
    fn test_find_cycles_after_raw_links() {
        let mut graph = TaskGraph::new();
        for name in ["a", "b", "c", "tail"] {
            graph.add_task(NewTask::new(name).with_id(name)).unwrap();
        }
        graph.link(&id("a"), &id("c")).unwrap();
        graph.link(&id("b"), &id("a")).unwrap();
        graph.link(&id("c"), &id("b")).unwrap();
        graph.link(&id("tail"), &id("a")).unwrap();

        assert_eq!(graph.find_cycles(), vec![id("a"), id("b"), id("c")]);
        assert_mirrored(&graph);
    }

    #[test]
    fn test_find_cycles_reports_loops_sharing_a_hub() {
        let mut graph = TaskGraph::new();
        for name in ["h", "a", "z"] {
            graph.add_task(NewTask::new(name).with_id(name)).unwrap();
        }
        graph.link(&id("h"), &id("a")).unwrap();
        graph.link(&id("a"), &id("h")).unwrap();
        graph.link(&id("h"), &id("z")).unwrap();
        graph.link(&id("z"), &id("h")).unwrap();

        assert_eq!(graph.find_cycles(), vec![id("a"), id("h"), id("z")]);
    }

    #[test]
    fn test_find_cycles_reports_every_self_loop() {
        let mut graph = TaskGraph::new();
        for name in ["a", "n", "free"] {
            graph.add_task(NewTask::new(name).with_id(name)).unwrap();
        }
        graph.link(&id("a"), &id("a")).unwrap();
        graph.link(&id("n"), &id("n")).unwrap();
        graph.link(&id("n"), &id("a")).unwrap();
        graph.link(&id("free"), &id("n")).unwrap();

        assert_eq!(graph.find_cycles(), vec![id("a"), id("n")]);
    }

    // === Edge Mutation Tests ===

    #[test]
    fn test_link_unknown_task() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("a").with_id("a")).unwrap();
        assert!(graph.link(&id("a"), &id("missing")).is_err());
        assert!(graph.link(&id("missing"), &id("a")).is_err());
        assert!(graph.get(&id("a")).unwrap().blocks.is_empty());
    }

    #[test]
    fn test_unlink_and_remove() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("a").with_id("a")).unwrap();
        graph
            .add_task(NewTask::new("b").with_id("b").blocked_by(["a"]))
            .unwrap();

        assert!(graph.unlink(&id("b"), &id("a")));
        assert!(graph.get(&id("a")).unwrap().blocks.is_empty());
        assert!(!graph.unlink(&id("b"), &id("a")));

        graph.link(&id("b"), &id("a")).unwrap();
        graph.remove_task(&id("b"));
        assert!(graph.get(&id("a")).unwrap().blocks.is_empty());
        assert_mirrored(&graph);
    }

    #[test]
    fn test_add_dependency_rejects_cycle() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("a").with_id("a")).unwrap();
        graph
            .add_task(NewTask::new("b").with_id("b").blocked_by(["a"]))
            .unwrap();
        graph.add_task(NewTask::new("c").with_id("c")).unwrap();

        graph.add_dependency(&id("c"), &id("b")).unwrap();
        let err = graph.add_dependency(&id("a"), &id("c")).unwrap_err();

        assert!(matches!(err, ConclaveError::Cycle { .. }));
        assert!(graph.get(&id("a")).unwrap().blocked_by.is_empty());
        assert!(!graph.get(&id("c")).unwrap().blocks.contains(&id("a")));
        assert!(graph.find_cycles().is_empty());
        assert_mirrored(&graph);
    }

    // === Capacity Tests ===

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut graph = TaskGraph::with_capacity(2);
        graph.add_task(NewTask::new("1").with_id("1")).unwrap();
        graph
            .add_task(NewTask::new("2").with_id("2").blocked_by(["1"]))
            .unwrap();
        graph.add_task(NewTask::new("3").with_id("3")).unwrap();

        assert_eq!(graph.ids(), vec![id("2"), id("3")]);
        // the dependant still waits on the evicted task
        assert!(graph.get(&id("2")).unwrap().blocked_by.contains(&id("1")));
        assert!(!graph.is_executable(&id("2")));
        assert_eq!(graph.executable_frontier(), vec![id("3")]);
    }

    // === Failure Propagation Tests ===

    #[test]
    fn test_block_dependents_of_failures_is_transitive() {
        let mut graph = TaskGraph::new();
        graph.add_task(NewTask::new("a").with_id("a")).unwrap();
        graph
            .add_task(NewTask::new("b").with_id("b").blocked_by(["a"]))
            .unwrap();
        graph
            .add_task(NewTask::new("c").with_id("c").blocked_by(["b"]))
            .unwrap();
        graph.add_task(NewTask::new("free").with_id("free")).unwrap();

        graph.get_mut(&id("a")).unwrap().fail("boom");
        let blocked = graph.block_dependents_of_failures();

        assert_eq!(blocked, vec![id("b"), id("c")]);
        assert_eq!(graph.get(&id("c")).unwrap().status, TaskStatus::Blocked);
        assert_eq!(graph.get(&id("free")).unwrap().status, TaskStatus::Pending);
    }
}
