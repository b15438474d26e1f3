//! Team snapshots on disk
//!
//! One JSON file per team, named after the team id. Writes go through a
//! temporary file and a rename so a crash never leaves a half-written
//! snapshot behind.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agent::{Agent, AgentSpec, AgentStatus};
use crate::error::Result;
use crate::graph::{Task, TaskId, TaskStatus};
use crate::team::{SharedTeam, Team, TeamId};

/// Persisted agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub name: String,
    pub role: String,
    pub status: AgentStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Persisted task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub subject: String,
    pub description: String,
    pub status: TaskStatus,
    pub owner: Option<String>,
    pub blocked_by: Vec<TaskId>,
    pub blocks: Vec<TaskId>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Persisted team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
    pub preset: Option<String>,
    pub task: String,
    pub created_at: DateTime<Utc>,
    pub agents: Vec<AgentRecord>,
    pub tasks: Vec<TaskRecord>,
}

impl From<&Agent> for AgentRecord {
    fn from(agent: &Agent) -> Self {
        Self {
            name: agent.name.clone(),
            role: agent.role.clone(),
            status: agent.status(),
            result: agent.result().map(str::to_string),
            error: agent.error().map(str::to_string),
        }
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            subject: task.subject.clone(),
            description: task.description.clone(),
            status: task.status,
            owner: task.owner.clone(),
            blocked_by: task.blocked_by.iter().cloned().collect(),
            blocks: task.blocks.iter().cloned().collect(),
            result: task.result.clone(),
            error: task.error.clone(),
            created_at: task.created_at,
            completed_at: task.completed_at,
        }
    }
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        Self {
            id: record.id,
            subject: record.subject,
            description: record.description,
            status: record.status,
            owner: record.owner,
            blocked_by: record.blocked_by.into_iter().collect::<BTreeSet<_>>(),
            blocks: record.blocks.into_iter().collect::<BTreeSet<_>>(),
            result: record.result,
            error: record.error,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

impl Team {
    /// Flatten into the persisted shape
    pub fn to_record(&self) -> TeamRecord {
        TeamRecord {
            id: self.id,
            name: self.name.clone(),
            preset: self.preset.clone(),
            task: self.task.clone(),
            created_at: self.created_at,
            agents: self.agents().iter().map(AgentRecord::from).collect(),
            tasks: self.graph.tasks().map(TaskRecord::from).collect(),
        }
    }

    /// Rebuild from the persisted shape.
    ///
    /// Sessions are not persisted, so a restored team has none live. Tasks
    /// are inserted in stored order; edges are mirrored as they are inserted.
    /// A task saved while in progress lost its session with the process and
    /// comes back pending so it can be dispatched again.
    pub fn from_record(record: TeamRecord, max_tasks: Option<usize>) -> Result<Self> {
        let agents = record
            .agents
            .into_iter()
            .map(|a| Agent::restore(AgentSpec::new(a.name, a.role), a.status, a.result, a.error))
            .collect();

        let mut team = Team::assemble(
            record.id,
            record.name,
            record.preset,
            record.task,
            record.created_at,
            agents,
        )?;
        for task in record.tasks {
            let mut task = Task::from(task);
            if task.status == TaskStatus::InProgress {
                task.status = TaskStatus::Pending;
            }
            team.graph.insert(task);
        }
        team.graph.set_capacity(max_tasks);
        team.snapshot_results();
        Ok(team)
    }
}

/// Directory of team snapshots
#[derive(Debug, Clone)]
pub struct TeamStore {
    dir: PathBuf,
}

impl TeamStore {
    /// Use `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: TeamId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write a team snapshot
    pub fn save(&self, team: &Team) -> Result<()> {
        self.write_record(&team.to_record())
    }

    /// Save a shared team, logging instead of failing.
    ///
    /// The team lock is only held while the record is built.
    pub fn snapshot(&self, team: &SharedTeam) {
        let record = team.lock().to_record();
        if let Err(e) = self.write_record(&record) {
            warn!(team_id = %record.id, error = %e, "Failed to save team snapshot");
        }
    }

    fn write_record(&self, record: &TeamRecord) -> Result<()> {
        let path = self.path(record.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!(team_id = %record.id, path = %path.display(), "Saved team snapshot");
        Ok(())
    }

    /// Read one team snapshot
    pub fn load(&self, id: TeamId) -> Result<TeamRecord> {
        read_record(&self.path(id))
    }

    /// Read every snapshot, skipping unreadable files
    pub fn load_all(&self) -> Result<Vec<TeamRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable team snapshot");
                }
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    /// Delete a snapshot; a missing file is not an error
    pub fn remove(&self, id: TeamId) -> Result<()> {
        match fs::remove_file(self.path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_record(path: &Path) -> Result<TeamRecord> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NewTask;
    use crate::team::TeamSpec;

    fn id(s: &str) -> TaskId {
        TaskId::from(s)
    }

    fn sample_team() -> Team {
        let mut team = Team::from_spec(
            TeamSpec::new("red", "build the thing")
                .preset("trio")
                .agent("alpha", "planner")
                .agent("beta", "builder"),
            Some(50),
        )
        .unwrap();

        team.graph
            .add_task(NewTask::new("plan").with_id("a").owner("alpha"))
            .unwrap();
        team.graph
            .add_task(NewTask::new("spike").with_id("b"))
            .unwrap();
        team.graph
            .add_task(
                NewTask::new("build")
                    .with_id("c")
                    .owner("beta")
                    .description("two prerequisites")
                    .blocked_by(["a", "b"]),
            )
            .unwrap();
        team.graph.get_mut(&id("a")).unwrap().complete("planned");
        team.graph.get_mut(&id("b")).unwrap().fail("no time");
        team.agent_mut("alpha").unwrap().succeed("planned");
        team
    }

    #[test]
    fn test_record_round_trip() {
        let team = sample_team();
        let json = serde_json::to_string(&team.to_record()).unwrap();
        let record: TeamRecord = serde_json::from_str(&json).unwrap();
        let restored = Team::from_record(record, Some(50)).unwrap();

        assert_eq!(restored.id, team.id);
        assert_eq!(restored.preset.as_deref(), Some("trio"));
        assert_eq!(restored.agents(), team.agents());
        let original: Vec<_> = team.graph.tasks().cloned().collect();
        let reloaded: Vec<_> = restored.graph.tasks().cloned().collect();
        assert_eq!(original, reloaded);

        let c = restored.graph.get(&id("c")).unwrap();
        assert_eq!(c.blocked_by.iter().cloned().collect::<Vec<_>>(), vec![id("a"), id("b")]);
        assert!(restored.graph.get(&id("a")).unwrap().blocks.contains(&id("c")));
        assert!(restored.graph.get(&id("b")).unwrap().blocks.contains(&id("c")));
        assert_eq!(restored.results.unwrap()["alpha"], "planned");
    }

    #[test]
    fn test_record_uses_camel_case() {
        let json = serde_json::to_value(sample_team().to_record()).unwrap();
        let task = &json["tasks"][2];
        assert_eq!(task["blockedBy"], serde_json::json!(["a", "b"]));
        assert_eq!(task["status"], "pending");
        assert!(json["createdAt"].is_string());
        assert_eq!(json["agents"][0]["status"], "completed");
    }

    #[test]
    fn test_store_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = TeamStore::open(dir.path().join("teams")).unwrap();
        let team = sample_team();

        store.save(&team).unwrap();
        assert_eq!(store.load(team.id).unwrap(), team.to_record());
        assert_eq!(store.load_all().unwrap().len(), 1);

        store.remove(team.id).unwrap();
        store.remove(team.id).unwrap();
        assert!(store.load(team.id).is_err());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_in_progress_tasks_restore_as_pending() {
        let mut team = sample_team();
        team.graph.get_mut(&id("c")).unwrap().status = TaskStatus::InProgress;
        team.graph.get_mut(&id("b")).unwrap().complete("spiked");

        let restored = Team::from_record(team.to_record(), None).unwrap();

        assert_eq!(restored.graph.get(&id("c")).unwrap().status, TaskStatus::Pending);
        assert_eq!(restored.graph.executable_frontier(), vec![id("c")]);
    }

    #[test]
    fn test_snapshot_of_shared_team() {
        let dir = tempfile::tempdir().unwrap();
        let store = TeamStore::open(dir.path()).unwrap();
        let shared: SharedTeam = std::sync::Arc::new(parking_lot::Mutex::new(sample_team()));

        store.snapshot(&shared);

        assert!(shared.try_lock().is_some());
        let team = shared.lock();
        assert_eq!(store.load(team.id).unwrap(), team.to_record());
    }

    #[test]
    fn test_load_all_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let store = TeamStore::open(dir.path()).unwrap();
        store.save(&sample_team()).unwrap();
        fs::write(dir.path().join("broken.json"), b"{ not json").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        assert_eq!(store.load_all().unwrap().len(), 1);
    }
}
