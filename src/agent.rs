//! Agent - a named worker bound to a team

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::remote::RemoteHandle;

/// Current activity of an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    /// Session is being created
    Thinking,
    /// Instruction submitted, waiting for output
    Responding,
    Completed,
    Error,
}

/// Request to add an agent to a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub role: String,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }
}

/// A single AI agent worker
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    /// Unique within the team
    pub name: String,
    pub role: String,
    status: AgentStatus,
    /// Live remote session, if any
    session: Option<RemoteHandle>,
    result: Option<String>,
    error: Option<String>,
}

impl Agent {
    /// Create an idle agent
    pub fn new(spec: AgentSpec) -> Self {
        Self {
            name: spec.name,
            role: spec.role,
            status: AgentStatus::Idle,
            session: None,
            result: None,
            error: None,
        }
    }

    /// Rebuild an agent from stored fields
    pub fn restore(
        spec: AgentSpec,
        status: AgentStatus,
        result: Option<String>,
        error: Option<String>,
    ) -> Self {
        Self {
            status,
            result,
            error,
            ..Self::new(spec)
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        debug!(agent = %self.name, from = ?self.status, to = ?status, "Agent status changed");
        self.status = status;
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn session(&self) -> Option<&RemoteHandle> {
        self.session.as_ref()
    }

    /// Record a freshly spawned session, returning the one it replaces
    pub fn attach_session(&mut self, handle: RemoteHandle) -> Option<RemoteHandle> {
        self.session.replace(handle)
    }

    /// Forget the live session so it can be disposed
    pub fn detach_session(&mut self) -> Option<RemoteHandle> {
        self.session.take()
    }

    /// Work finished successfully
    pub fn succeed(&mut self, result: impl Into<String>) {
        self.result = Some(result.into());
        self.error = None;
        self.set_status(AgentStatus::Completed);
    }

    /// Work failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.set_status(AgentStatus::Error);
    }

    /// Spec this agent was created from
    pub fn spec(&self) -> AgentSpec {
        AgentSpec::new(self.name.clone(), self.role.clone())
    }
}
