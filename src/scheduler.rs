//! Round-based task graph execution
//!
//! Each round takes the executable frontier, finishes ownerless tasks on the
//! spot, dispatches the rest through the [`Coordinator`] and then recomputes
//! the frontier from scratch. The loop is bounded by `2 × task count` rounds;
//! whatever is left unfinished at the end is reported, never raised.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::coordinator::{Coordinator, Outcome};
use crate::graph::{TaskId, TaskStatus};
use crate::store::TeamStore;
use crate::team::SharedTeam;

/// Result recorded on tasks that finish without an owner
const OWNERLESS_RESULT: &str = "completed without an owner";

/// What a graph run achieved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tasks completed during this run
    pub completed: usize,
    /// Tasks that failed during this run
    pub failed: usize,
    /// Tasks still pending, blocked or in progress, in creation order
    pub remaining: Vec<TaskId>,
    /// Rounds that found executable work
    pub rounds: usize,
    /// Work remained when the run stopped
    pub deadlock: bool,
}

/// Execute `team`'s task graph until nothing more can run.
///
/// Tasks in the same round run concurrently, except that tasks sharing an
/// owner run one after the other so an agent only ever has one live
/// session. After every round the team is snapshotted to `store`, if given.
#[instrument(skip(coordinator, team, store))]
pub async fn run_to_completion(
    coordinator: &Coordinator,
    team: &SharedTeam,
    per_task_timeout: Duration,
    store: Option<&TeamStore>,
) -> RunSummary {
    let (team_id, task_count) = {
        let team = team.lock();
        (team.id, team.graph.len())
    };
    coordinator.bus().clear(team_id);

    let max_rounds = task_count.saturating_mul(2);
    let mut summary = RunSummary::default();

    while summary.rounds < max_rounds {
        let batches = {
            let mut team = team.lock();
            let frontier = team.graph.executable_frontier();
            if frontier.is_empty() {
                break;
            }
            let mut batches: Vec<(String, Vec<TaskId>)> = Vec::new();
            for id in frontier {
                let Some(task) = team.graph.get_mut(&id) else {
                    continue;
                };
                match task.owner.clone() {
                    None => {
                        task.complete(OWNERLESS_RESULT);
                        summary.completed += 1;
                    }
                    Some(owner) => {
                        task.status = TaskStatus::InProgress;
                        match batches.iter_mut().find(|(o, _)| *o == owner) {
                            Some((_, ids)) => ids.push(id),
                            None => batches.push((owner, vec![id])),
                        }
                    }
                }
            }
            batches
        };
        summary.rounds += 1;

        if batches.is_empty() {
            persist(team, store);
            continue;
        }

        let dispatched: usize = batches.iter().map(|(_, ids)| ids.len()).sum();
        info!(team_id = %team_id, round = summary.rounds, tasks = dispatched, "Dispatching round");

        let runs = batches.iter().map(|(_, ids)| async move {
            let mut outcomes: Vec<(TaskId, Outcome)> = Vec::with_capacity(ids.len());
            for id in ids {
                outcomes.push((id.clone(), coordinator.run_task(team, id, per_task_timeout).await));
            }
            outcomes
        });
        let settled = join_all(runs).await;

        {
            let mut team = team.lock();
            for (id, outcome) in settled.into_iter().flatten() {
                let Some(task) = team.graph.get_mut(&id) else {
                    continue;
                };
                if outcome.success {
                    task.complete(outcome.result.unwrap_or_default());
                    summary.completed += 1;
                } else {
                    task.fail(outcome.error.unwrap_or_default());
                    summary.failed += 1;
                }
            }
            let blocked = team.graph.block_dependents_of_failures();
            if !blocked.is_empty() {
                warn!(team_id = %team_id, ?blocked, "Tasks blocked by failed dependencies");
            }
        }

        persist(team, store);
    }

    let team_guard = team.lock();
    summary.remaining = team_guard
        .graph
        .tasks()
        .filter(|t| !matches!(t.status, TaskStatus::Completed | TaskStatus::Error))
        .map(|t| t.id.clone())
        .collect();
    drop(team_guard);

    summary.deadlock = !summary.remaining.is_empty();
    if summary.deadlock {
        warn!(
            team_id = %team_id,
            rounds = summary.rounds,
            remaining = ?summary.remaining,
            "Task graph stopped with unfinished tasks, possible deadlock"
        );
    } else {
        info!(
            team_id = %team_id,
            completed = summary.completed,
            failed = summary.failed,
            "Task graph finished"
        );
    }
    persist(team, store);
    summary
}

fn persist(team: &SharedTeam, store: Option<&TeamStore>) {
    if let Some(store) = store {
        store.snapshot(team);
    }
}
