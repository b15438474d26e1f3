//! Teams and the capacity-bounded team registry

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::agent::{Agent, AgentSpec};
use crate::error::{ConclaveError, Result};
use crate::graph::TaskGraph;
use crate::remote::RemoteHandle;

/// Team identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(Uuid);

impl TeamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TeamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TeamId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What a caller asks for when spawning a team
#[derive(Debug, Clone, Default)]
pub struct TeamSpec {
    pub name: String,
    /// Free-form label for the template the team was built from
    pub preset: Option<String>,
    /// Top-level task shared by every agent
    pub task: String,
    pub agents: Vec<AgentSpec>,
}

impl TeamSpec {
    pub fn new(name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task: task.into(),
            ..Default::default()
        }
    }

    pub fn preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    pub fn agent(mut self, name: impl Into<String>, role: impl Into<String>) -> Self {
        self.agents.push(AgentSpec::new(name, role));
        self
    }
}

/// A set of agents working on one task or task graph
#[derive(Debug, Clone)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub preset: Option<String>,
    pub task: String,
    pub created_at: DateTime<Utc>,
    /// Spawn order, names unique
    agents: Vec<Agent>,
    pub graph: TaskGraph,
    /// Agent name -> last result, refreshed after every run
    pub results: Option<HashMap<String, String>>,
}

impl Team {
    /// Build a team from a [`TeamSpec`], rejecting empty teams and duplicate names
    pub fn from_spec(spec: TeamSpec, max_tasks: Option<usize>) -> Result<Self> {
        let team = Self::assemble(
            TeamId::new(),
            spec.name,
            spec.preset,
            spec.task,
            Utc::now(),
            spec.agents.into_iter().map(Agent::new).collect(),
        )?;
        Ok(Self {
            graph: max_tasks.map_or_else(TaskGraph::new, TaskGraph::with_capacity),
            ..team
        })
    }

    /// Build a team from already constructed parts
    pub fn assemble(
        id: TeamId,
        name: String,
        preset: Option<String>,
        task: String,
        created_at: DateTime<Utc>,
        agents: Vec<Agent>,
    ) -> Result<Self> {
        if agents.is_empty() {
            return Err(ConclaveError::EmptyTeam);
        }
        for (i, agent) in agents.iter().enumerate() {
            if agents[..i].iter().any(|a| a.name == agent.name) {
                return Err(ConclaveError::DuplicateAgent(agent.name.clone()));
            }
        }

        Ok(Self {
            id,
            name,
            preset,
            task,
            created_at,
            agents,
            graph: TaskGraph::new(),
            results: None,
        })
    }

    /// Agents in spawn order
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn agent(&self, name: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn agent_mut(&mut self, name: &str) -> Option<&mut Agent> {
        self.agents.iter_mut().find(|a| a.name == name)
    }

    /// Detach every live session so the caller can dispose them
    pub fn take_sessions(&mut self) -> Vec<RemoteHandle> {
        self.agents
            .iter_mut()
            .filter_map(Agent::detach_session)
            .collect()
    }

    /// Refresh the agent name -> last result snapshot
    pub fn snapshot_results(&mut self) {
        self.results = Some(
            self.agents
                .iter()
                .filter_map(|a| a.result().map(|r| (a.name.clone(), r.to_string())))
                .collect(),
        );
    }
}

/// Shared, individually locked team
pub type SharedTeam = Arc<Mutex<Team>>;

/// Registry of live teams, oldest evicted first once full
pub struct TeamRegistry {
    teams: RwLock<HashMap<TeamId, SharedTeam>>,
    /// Insertion order, oldest first
    order: RwLock<VecDeque<TeamId>>,
    capacity: usize,
}

impl TeamRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            teams: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a team, returning the teams evicted to make room
    pub fn insert(&self, team: Team) -> (SharedTeam, Vec<SharedTeam>) {
        let id = team.id;
        let shared = Arc::new(Mutex::new(team));

        let mut teams = self.teams.write();
        let mut order = self.order.write();

        let mut evicted = Vec::new();
        while teams.len() >= self.capacity {
            let Some(oldest) = order.pop_front() else {
                break;
            };
            if let Some(team) = teams.remove(&oldest) {
                info!(team_id = %oldest, capacity = self.capacity, "Evicting oldest team");
                evicted.push(team);
            }
        }

        teams.insert(id, Arc::clone(&shared));
        order.push_back(id);
        (shared, evicted)
    }

    pub fn get(&self, id: TeamId) -> Result<SharedTeam> {
        self.teams
            .read()
            .get(&id)
            .cloned()
            .ok_or(ConclaveError::TeamNotFound(id))
    }

    pub fn remove(&self, id: TeamId) -> Option<SharedTeam> {
        let removed = self.teams.write().remove(&id);
        if removed.is_some() {
            self.order.write().retain(|t| *t != id);
        }
        removed
    }

    /// Team ids, oldest first
    pub fn ids(&self) -> Vec<TeamId> {
        self.order.read().iter().copied().collect()
    }

    /// Every team, oldest first
    pub fn all(&self) -> Vec<SharedTeam> {
        let teams = self.teams.read();
        self.order
            .read()
            .iter()
            .filter_map(|id| teams.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.teams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.read().is_empty()
    }
}
