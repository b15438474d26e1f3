//! Main orchestrator - owns every team and drives their runs

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::channel::ContextBus;
use crate::config::OrchestratorConfig;
use crate::coordinator::{Coordinator, Discussion, Outcome};
use crate::error::{ConclaveError, Result};
use crate::graph::{NewTask, Task, TaskId};
use crate::remote::RemoteWorkClient;
use crate::scheduler::{run_to_completion, RunSummary};
use crate::session::SessionManager;
use crate::store::TeamStore;
use crate::team::{SharedTeam, Team, TeamId, TeamRegistry, TeamSpec};

/// The application context.
///
/// Built once at startup and handed to whoever needs it. Owns the team
/// registry, the context bus, the session manager and, when a state
/// directory is configured, the snapshot store.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: TeamRegistry,
    bus: Arc<ContextBus>,
    coordinator: Coordinator,
    store: Option<TeamStore>,
}

impl Orchestrator {
    /// Create an orchestrator talking to `client`
    pub fn new(config: OrchestratorConfig, client: Arc<dyn RemoteWorkClient>) -> Result<Self> {
        config.validate()?;

        let mut sessions = SessionManager::new(client, config.poll_policy());
        if let Some(model) = &config.model {
            sessions = sessions.with_model(model.clone());
        }
        let bus = Arc::new(ContextBus::new());
        let store = config
            .state_dir
            .as_ref()
            .map(|dir| TeamStore::open(dir.clone()))
            .transpose()?;

        info!(
            max_teams = config.max_teams,
            persistent = store.is_some(),
            "Starting orchestrator"
        );
        Ok(Self {
            registry: TeamRegistry::new(config.max_teams),
            coordinator: Coordinator::new(sessions, Arc::clone(&bus)),
            bus,
            store,
            config,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Publish/fetch access to the context bus
    pub fn bus(&self) -> &ContextBus {
        &self.bus
    }

    pub fn store(&self) -> Option<&TeamStore> {
        self.store.as_ref()
    }

    /// Create a team, evicting the oldest one if the registry is full
    #[instrument(skip(self, spec), fields(team = %spec.name))]
    pub async fn spawn_team(&self, spec: TeamSpec) -> Result<TeamId> {
        let team = Team::from_spec(spec, Some(self.config.max_tasks_per_team))?;
        let id = team.id;
        let agents = team.agents().len();

        let (shared, evicted) = self.registry.insert(team);
        for old in evicted {
            let old_id = old.lock().id;
            self.release(&old).await;
            self.forget_snapshot(old_id);
        }
        self.persist(&shared);

        info!(team_id = %id, agents, "Spawned team");
        Ok(id)
    }

    /// Snapshot of a team
    pub fn team(&self, id: TeamId) -> Result<Team> {
        Ok(self.registry.get(id)?.lock().clone())
    }

    /// Live team ids, oldest first
    pub fn team_ids(&self) -> Vec<TeamId> {
        self.registry.ids()
    }

    /// Add a task to a team's graph
    pub fn add_task(&self, id: TeamId, task: NewTask) -> Result<Task> {
        let team = self.registry.get(id)?;
        let task = team.lock().graph.add_task(task)?;
        self.persist(&team);
        Ok(task)
    }

    /// Make `task` wait for `dependency`; rejected if it would close a cycle
    pub fn link_tasks(&self, id: TeamId, task: &TaskId, dependency: &TaskId) -> Result<()> {
        let team = self.registry.get(id)?;
        team.lock().graph.add_dependency(task, dependency)?;
        self.persist(&team);
        Ok(())
    }

    /// Tasks that could run right now
    pub fn executable_tasks(&self, id: TeamId) -> Result<Vec<TaskId>> {
        Ok(self.registry.get(id)?.lock().graph.executable_frontier())
    }

    /// Ids of tasks that sit on a dependency cycle
    pub fn find_cycles(&self, id: TeamId) -> Result<Vec<TaskId>> {
        Ok(self.registry.get(id)?.lock().graph.find_cycles())
    }

    /// Give every agent the team task at once, sharing results as they land
    #[instrument(skip(self))]
    pub async fn run_team(&self, id: TeamId, timeout: Option<Duration>) -> Result<Vec<Outcome>> {
        let team = self.registry.get(id)?;
        let task = team.lock().task.clone();
        self.bus.clear(id);

        let outcomes = self
            .coordinator
            .run_agents(&team, &task, self.timeout(timeout), true)
            .await;
        self.persist(&team);
        Ok(outcomes)
    }

    /// Discuss the team task over `rounds` rounds (default from config)
    #[instrument(skip(self))]
    pub async fn run_discussion(
        &self,
        id: TeamId,
        rounds: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<Discussion> {
        let team = self.registry.get(id)?;
        let topic = team.lock().task.clone();
        let rounds = self.config.discussion_rounds(rounds);

        let discussion = self
            .coordinator
            .run_discussion(&team, &topic, rounds, self.timeout(timeout))
            .await;
        self.persist(&team);
        Ok(discussion)
    }

    /// Run the team's task graph to completion
    #[instrument(skip(self))]
    pub async fn run_task_graph(
        &self,
        id: TeamId,
        per_task_timeout: Option<Duration>,
    ) -> Result<RunSummary> {
        let team = self.registry.get(id)?;
        Ok(run_to_completion(
            &self.coordinator,
            &team,
            self.timeout(per_task_timeout),
            self.store.as_ref(),
        )
        .await)
    }

    /// Remove a team, releasing its sessions, messages and snapshot
    #[instrument(skip(self))]
    pub async fn destroy_team(&self, id: TeamId) -> Result<()> {
        let team = self
            .registry
            .remove(id)
            .ok_or(ConclaveError::TeamNotFound(id))?;
        self.release(&team).await;
        self.forget_snapshot(id);
        info!(team_id = %id, "Destroyed team");
        Ok(())
    }

    /// Dispose every live session of every team. Teams stay registered.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let mut disposed = 0;
        for team in self.registry.all() {
            let sessions = team.lock().take_sessions();
            disposed += sessions.len();
            self.coordinator.sessions().dispose_all(sessions).await;
            self.persist(&team);
        }
        info!(teams = self.registry.len(), sessions = disposed, "Orchestrator shut down");
    }

    /// Load every team saved in `store` into the registry.
    ///
    /// Snapshots that no longer form a valid team are skipped with a warning.
    /// Returns the ids of the restored teams, oldest first.
    #[instrument(skip(self, store), fields(dir = %store.dir().display()))]
    pub async fn restore(&self, store: &TeamStore) -> Result<Vec<TeamId>> {
        let mut restored = Vec::new();
        for record in store.load_all()? {
            let record_id = record.id;
            let team = match Team::from_record(record, Some(self.config.max_tasks_per_team)) {
                Ok(team) => team,
                Err(e) => {
                    warn!(team_id = %record_id, error = %e, "Skipping invalid team snapshot");
                    continue;
                }
            };
            let _ = self.registry.remove(record_id);
            let (_, evicted) = self.registry.insert(team);
            for old in evicted {
                let old_id = old.lock().id;
                restored.retain(|id| *id != old_id);
                self.release(&old).await;
            }
            restored.push(record_id);
        }
        info!(teams = restored.len(), "Restored teams");
        Ok(restored)
    }

    fn timeout(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or_else(|| self.config.default_timeout())
    }

    /// Dispose a team's sessions and drop its bus queues
    async fn release(&self, team: &SharedTeam) {
        let (id, sessions) = {
            let mut team = team.lock();
            (team.id, team.take_sessions())
        };
        self.bus.clear(id);
        self.coordinator.sessions().dispose_all(sessions).await;
    }

    fn persist(&self, team: &SharedTeam) {
        if let Some(store) = &self.store {
            store.snapshot(team);
        }
    }

    fn forget_snapshot(&self, id: TeamId) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(id) {
                warn!(team_id = %id, error = %e, "Failed to remove team snapshot");
            }
        }
    }
}
