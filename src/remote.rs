//! Boundary to the external reasoning service
//!
//! The orchestration core never talks to a model directly. It consumes an
//! opaque [`RemoteWorkClient`] that can create a unit of remote work, submit
//! one instruction to it, poll the conversation so far and dispose of it.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque handle to one unit of remote work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteHandle(String);

impl RemoteHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who produced a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// One turn of a remote conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    /// Text segments in the order they were produced
    pub segments: Vec<String>,
}

impl Turn {
    pub fn assistant<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            role: TurnRole::Assistant,
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            segments: vec![text.into()],
        }
    }

    /// True when this turn carries assistant output with any text in it
    pub fn is_terminal(&self) -> bool {
        self.role == TurnRole::Assistant && self.segments.iter().any(|s| !s.is_empty())
    }
}

/// Failure reported by the remote service
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct RemoteError(pub String);

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Capability to run units of remote work
#[async_trait]
pub trait RemoteWorkClient: Send + Sync {
    /// Allocate a new unit of remote work
    async fn create(&self) -> Result<RemoteHandle, RemoteError>;

    /// Submit an instruction; does not wait for the answer
    async fn submit(
        &self,
        handle: &RemoteHandle,
        instruction: &str,
        system_prompt: Option<&str>,
        model: Option<&str>,
    ) -> Result<(), RemoteError>;

    /// Conversation turns produced so far
    async fn poll(&self, handle: &RemoteHandle) -> Result<Vec<Turn>, RemoteError>;

    /// Release the unit of work
    async fn dispose(&self, handle: &RemoteHandle) -> Result<(), RemoteError>;
}
