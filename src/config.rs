//! Orchestrator configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConclaveError, Result};
use crate::session::{PollPolicy, DEFAULT_MAX_POLL_FAILURES};

/// Fewest discussion rounds a run may have
pub const MIN_DISCUSSION_ROUNDS: u32 = 1;
/// Most discussion rounds a run may have
pub const MAX_DISCUSSION_ROUNDS: u32 = 3;

/// Capacities, timeouts and polling behaviour.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```json
/// { "max_teams": 5, "default_timeout_secs": 30 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Live teams kept before the oldest is evicted (20)
    pub max_teams: usize,
    /// Tasks per team before the oldest is evicted (200)
    pub max_tasks_per_team: usize,
    /// Wall-clock limit for one unit of remote work (90 s)
    pub default_timeout_secs: u64,
    /// Discussion rounds when the caller does not say (2)
    pub default_discussion_rounds: u32,
    /// Delay between session polls (1000 ms)
    pub poll_interval_ms: u64,
    /// Consecutive poll errors that abandon a session (5)
    pub max_consecutive_poll_failures: u32,
    /// Model selector passed to the remote service
    pub model: Option<String>,
    /// Directory for team snapshots; none disables persistence
    pub state_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_teams: 20,
            max_tasks_per_team: 200,
            default_timeout_secs: 90,
            default_discussion_rounds: 2,
            poll_interval_ms: 1000,
            max_consecutive_poll_failures: DEFAULT_MAX_POLL_FAILURES,
            model: None,
            state_dir: None,
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_teams == 0 {
            return Err(ConclaveError::Config("max_teams must be at least 1".into()));
        }
        if self.max_tasks_per_team == 0 {
            return Err(ConclaveError::Config(
                "max_tasks_per_team must be at least 1".into(),
            ));
        }
        if self.default_timeout_secs == 0 {
            return Err(ConclaveError::Config(
                "default_timeout_secs must be positive".into(),
            ));
        }
        if self.max_consecutive_poll_failures == 0 {
            return Err(ConclaveError::Config(
                "max_consecutive_poll_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_consecutive_failures: self.max_consecutive_poll_failures,
        }
    }

    /// Requested rounds, or the default, clamped to the allowed range
    pub fn discussion_rounds(&self, requested: Option<u32>) -> u32 {
        clamp_rounds(requested.unwrap_or(self.default_discussion_rounds))
    }
}

/// Clamp a round count to `[MIN_DISCUSSION_ROUNDS, MAX_DISCUSSION_ROUNDS]`
pub fn clamp_rounds(rounds: u32) -> u32 {
    rounds.clamp(MIN_DISCUSSION_ROUNDS, MAX_DISCUSSION_ROUNDS)
}
