//! Conclave error types

use std::time::Duration;

use thiserror::Error;

use crate::graph::TaskId;
use crate::team::TeamId;

/// Errors that can occur in the conclave system
#[derive(Debug, Error)]
pub enum ConclaveError {
    /// Remote session could not be created or primed
    #[error("Failed to initialize session for {agent}: {reason}")]
    Initialization { agent: String, reason: String },

    /// Session did not produce a result in time
    #[error("Session for {agent} timed out after {elapsed:?}")]
    SessionTimeout { agent: String, elapsed: Duration },

    /// Session polling failed too many times in a row
    #[error("Session for {agent} failed after {attempts} consecutive poll errors: {last_error}")]
    SessionFailure {
        agent: String,
        attempts: u32,
        last_error: String,
    },

    /// Adding the requested dependencies would close a cycle
    #[error("Dependency cycle through task {task}: {}", format_path(.path))]
    Cycle { task: TaskId, path: Vec<TaskId> },

    /// Task id already in use
    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    /// Agent name already in use within the team
    #[error("Duplicate agent name: {0}")]
    DuplicateAgent(String),

    /// Team spawned without agents
    #[error("Team must have at least one agent")]
    EmptyTeam,

    /// Team not found
    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// Agent not found
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConclaveError>;

fn format_path(path: &[TaskId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}
