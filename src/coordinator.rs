//! Execution coordinator - fans work out to agents and collects outcomes
//!
//! Every unit of work is failure-isolated: an agent whose session fails only
//! produces a failed [`Outcome`] for itself. Siblings keep running and the
//! caller always gets one outcome per agent.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::agent::AgentStatus;
use crate::channel::ContextBus;
use crate::config::clamp_rounds;
use crate::error::ConclaveError;
use crate::graph::{Task, TaskId};
use crate::session::SessionManager;
use crate::team::SharedTeam;

/// Result of one agent's unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub success: bool,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl Outcome {
    pub fn success(name: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Result text on success, error text otherwise
    pub fn text(&self) -> &str {
        self.result
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or_default()
    }
}

/// Outcomes of a discussion, one entry per round
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discussion {
    pub rounds: Vec<Vec<Outcome>>,
}

impl Discussion {
    /// Outcomes of the last round
    pub fn final_outcomes(&self) -> &[Outcome] {
        self.rounds.last().map(Vec::as_slice).unwrap_or_default()
    }
}

/// Dispatches agent work through the session manager
#[derive(Clone)]
pub struct Coordinator {
    sessions: SessionManager,
    bus: Arc<ContextBus>,
}

impl Coordinator {
    pub fn new(sessions: SessionManager, bus: Arc<ContextBus>) -> Self {
        Self { sessions, bus }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn bus(&self) -> &ContextBus {
        &self.bus
    }

    /// Run `instruction` on every agent of the team concurrently.
    ///
    /// With `share_context`, each agent's instruction carries the team's
    /// broadcast context minus its own messages, and each outcome is
    /// broadcast once it settles. Outcomes come back in agent order.
    #[instrument(skip(self, team, instruction))]
    pub async fn run_agents(
        &self,
        team: &SharedTeam,
        instruction: &str,
        timeout: Duration,
        share_context: bool,
    ) -> Vec<Outcome> {
        let (team_id, names) = {
            let team = team.lock();
            (team.id, team.agent_names())
        };

        let assignments = names
            .into_iter()
            .map(|name| {
                let instruction = if share_context {
                    let context = self.bus.render_context(team_id, Some(&name));
                    with_peer_context(instruction, &context)
                } else {
                    instruction.to_string()
                };
                (name, instruction)
            })
            .collect();

        self.fan_out(team, assignments, timeout, share_context).await
    }

    /// Run a discussion of `rounds` rounds (clamped to 1..=3) on `topic`.
    ///
    /// Round one runs every agent in parallel without peer context. Later
    /// rounds go agent by agent, so each one sees what the agents before it
    /// said in the same round as well as the whole previous round.
    #[instrument(skip(self, team, topic))]
    pub async fn run_discussion(
        &self,
        team: &SharedTeam,
        topic: &str,
        rounds: u32,
        timeout: Duration,
    ) -> Discussion {
        let rounds = clamp_rounds(rounds);
        let (team_id, names) = {
            let team = team.lock();
            (team.id, team.agent_names())
        };
        self.bus.clear(team_id);

        let opening = discussion_instruction(topic, 1, rounds);
        let assignments = names
            .iter()
            .map(|name| (name.clone(), opening.clone()))
            .collect();
        let mut discussion = Discussion {
            rounds: vec![self.fan_out(team, assignments, timeout, true).await],
        };

        for round in 2..=rounds {
            info!(team_id = %team_id, round, "Starting sequential discussion round");
            let prompt = discussion_instruction(topic, round, rounds);
            let mut outcomes = Vec::with_capacity(names.len());
            for name in &names {
                let context = self.bus.render_context(team_id, Some(name));
                let instruction = with_peer_context(&prompt, &context);
                outcomes.push(self.run_agent(team, name, &instruction, timeout, true).await);
            }
            team.lock().snapshot_results();
            discussion.rounds.push(outcomes);
        }

        discussion
    }

    /// Dispatch one task to its owner.
    ///
    /// The instruction carries the team task, the task itself and the results
    /// of its completed prerequisites. The outcome is broadcast to the team.
    #[instrument(skip(self, team))]
    pub async fn run_task(&self, team: &SharedTeam, task_id: &TaskId, timeout: Duration) -> Outcome {
        let prepared = {
            let team = team.lock();
            match team.graph.get(task_id) {
                None => Err(Outcome::failure(
                    task_id.as_str(),
                    ConclaveError::TaskNotFound(task_id.clone()).to_string(),
                )),
                Some(task) => match task.owner.clone() {
                    None => Err(Outcome::failure(task_id.as_str(), "task has no owner")),
                    Some(owner) => {
                        let prerequisites: Vec<&Task> = task
                            .blocked_by
                            .iter()
                            .filter_map(|dep| team.graph.get(dep))
                            .collect();
                        Ok((owner, task_instruction(&team.task, task, &prerequisites)))
                    }
                },
            }
        };

        match prepared {
            Ok((owner, instruction)) => {
                self.run_agent(team, &owner, &instruction, timeout, true)
                    .await
            }
            Err(outcome) => outcome,
        }
    }

    async fn fan_out(
        &self,
        team: &SharedTeam,
        assignments: Vec<(String, String)>,
        timeout: Duration,
        publish: bool,
    ) -> Vec<Outcome> {
        let runs = assignments.iter().map(|(name, instruction)| {
            self.run_agent(team, name, instruction, timeout, publish)
        });
        let outcomes = join_all(runs).await;

        team.lock().snapshot_results();
        let failed = outcomes.iter().filter(|o| !o.success).count();
        info!(agents = outcomes.len(), failed, "Fan-out settled");
        outcomes
    }

    /// One agent, one session, one outcome. Never fails.
    async fn run_agent(
        &self,
        team: &SharedTeam,
        name: &str,
        instruction: &str,
        timeout: Duration,
        publish: bool,
    ) -> Outcome {
        let prepared = {
            let mut team = team.lock();
            let team_id = team.id;
            let team_name = team.name.clone();
            team.agent_mut(name).map(|agent| {
                agent.set_status(AgentStatus::Thinking);
                let system = system_prompt(name, &agent.role, &team_name);
                (team_id, system, agent.detach_session())
            })
        };
        let Some((team_id, system, previous)) = prepared else {
            return Outcome::failure(name, ConclaveError::AgentNotFound(name.to_string()).to_string());
        };

        if let Some(previous) = previous {
            self.sessions.dispose(&previous).await;
        }

        let result = match self.sessions.spawn(name, instruction, Some(&system)).await {
            Ok(handle) => {
                if let Some(agent) = team.lock().agent_mut(name) {
                    agent.attach_session(handle.clone());
                    agent.set_status(AgentStatus::Responding);
                }
                self.sessions.await_result(name, &handle, timeout).await
            }
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(text) => {
                debug!(agent = name, "Agent completed");
                Outcome::success(name, text)
            }
            Err(e) => {
                warn!(agent = name, error = %e, "Agent failed");
                Outcome::failure(name, e.to_string())
            }
        };

        if let Some(agent) = team.lock().agent_mut(name) {
            match (&outcome.result, &outcome.error) {
                (Some(result), _) => agent.succeed(result.clone()),
                (None, error) => agent.fail(error.clone().unwrap_or_default()),
            }
        }

        if publish {
            self.bus
                .broadcast_result(team_id, name, outcome.text(), outcome.success);
        }
        outcome
    }
}

fn system_prompt(name: &str, role: &str, team: &str) -> String {
    format!("You are {name}, working as {role} in team \"{team}\".")
}

fn with_peer_context(instruction: &str, context: &str) -> String {
    format!("{instruction}\n\n## Context from other agents\n{context}")
}

fn discussion_instruction(topic: &str, round: u32, rounds: u32) -> String {
    if round == 1 {
        format!("{topic}\n\nDiscussion round 1 of {rounds}: give your initial position.")
    } else {
        format!(
            "{topic}\n\nDiscussion round {round} of {rounds}: respond to the other agents and refine your position."
        )
    }
}

fn task_instruction(team_task: &str, task: &Task, prerequisites: &[&Task]) -> String {
    let mut text = format!("Team goal: {team_task}\n\nYour task: {}", task.subject);
    if !task.description.is_empty() {
        text.push_str("\n\n");
        text.push_str(&task.description);
    }
    let done: Vec<String> = prerequisites
        .iter()
        .filter_map(|t| t.result.as_ref().map(|r| format!("- {}: {}", t.subject, r)))
        .collect();
    if !done.is_empty() {
        text.push_str("\n\n## Results of prerequisite tasks\n");
        text.push_str(&done.join("\n"));
    }
    text
}
