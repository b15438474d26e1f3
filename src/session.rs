//! Session lifecycle for remote units of work
//!
//! A [`SessionManager`] wraps a [`RemoteWorkClient`] with a bounded polling
//! protocol: it creates one session per unit of work, submits a single
//! instruction, polls until assistant output appears or the deadline passes,
//! and disposes sessions on a best-effort basis.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::error::{ConclaveError, Result};
use crate::remote::{RemoteHandle, RemoteWorkClient, Turn, TurnRole};

/// Default interval between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive poll failures that abort a session
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 5;

/// How sessions are polled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between polls
    pub interval: Duration,
    /// The poll error that makes this many in a row aborts the session
    pub max_consecutive_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_POLL_FAILURES,
        }
    }
}

/// Spawns, awaits and disposes remote sessions
#[derive(Clone)]
pub struct SessionManager {
    client: Arc<dyn RemoteWorkClient>,
    policy: PollPolicy,
    system_prompt: Option<String>,
    model: Option<String>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(client: Arc<dyn RemoteWorkClient>, policy: PollPolicy) -> Self {
        Self {
            client,
            policy,
            system_prompt: None,
            model: None,
        }
    }

    /// Select the model every session is created with
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// System prompt used when a spawn does not supply its own
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Polling policy in use
    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Create a session for `agent` and submit `instruction` to it.
    ///
    /// `system_prompt` is passed through to the remote service untouched.
    #[instrument(skip(self, instruction, system_prompt), fields(len = instruction.len()))]
    pub async fn spawn(
        &self,
        agent: &str,
        instruction: &str,
        system_prompt: Option<&str>,
    ) -> Result<RemoteHandle> {
        let handle = self
            .client
            .create()
            .await
            .map_err(|e| ConclaveError::Initialization {
                agent: agent.to_string(),
                reason: e.to_string(),
            })?;

        let system_prompt = system_prompt.or(self.system_prompt.as_deref());
        if let Err(e) = self
            .client
            .submit(&handle, instruction, system_prompt, self.model.as_deref())
            .await
        {
            self.dispose(&handle).await;
            return Err(ConclaveError::Initialization {
                agent: agent.to_string(),
                reason: e.to_string(),
            });
        }

        info!(agent, session = %handle, "Spawned session");
        Ok(handle)
    }

    /// Poll `handle` until assistant output appears or `timeout` elapses.
    ///
    /// The deadline bounds both the wait between polls and each poll itself,
    /// so a remote call that never answers still ends in
    /// [`ConclaveError::SessionTimeout`].
    ///
    /// Transient poll errors are retried; once
    /// [`PollPolicy::max_consecutive_failures`] happen in a row the session is
    /// abandoned with [`ConclaveError::SessionFailure`]. The remote work is
    /// never cancelled here, only no longer watched.
    #[instrument(skip(self))]
    pub async fn await_result(
        &self,
        agent: &str,
        handle: &RemoteHandle,
        timeout: Duration,
    ) -> Result<String> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut failures = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.policy.interval.min(deadline - now)).await;
            if Instant::now() >= deadline {
                break;
            }

            let Ok(polled) = timeout_at(deadline, self.client.poll(handle)).await else {
                break;
            };
            match polled {
                Ok(turns) => {
                    failures = 0;
                    if let Some(text) = last_assistant_text(&turns) {
                        debug!(agent, session = %handle, "Session produced output");
                        return Ok(text);
                    }
                }
                Err(e) => {
                    failures += 1;
                    if failures >= self.policy.max_consecutive_failures {
                        warn!(agent, session = %handle, error = %e, "Giving up on session");
                        return Err(ConclaveError::SessionFailure {
                            agent: agent.to_string(),
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }
                    debug!(agent, session = %handle, failures, error = %e, "Poll failed, retrying");
                }
            }
        }

        warn!(agent, session = %handle, ?timeout, "Session timed out");
        Err(ConclaveError::SessionTimeout {
            agent: agent.to_string(),
            elapsed: started.elapsed(),
        })
    }

    /// Release a session. Failures are logged and swallowed.
    pub async fn dispose(&self, handle: &RemoteHandle) {
        match self.client.dispose(handle).await {
            Ok(()) => debug!(session = %handle, "Disposed session"),
            Err(e) => warn!(session = %handle, error = %e, "Failed to dispose session"),
        }
    }

    /// Release every session in `handles`
    pub async fn dispose_all(&self, handles: impl IntoIterator<Item = RemoteHandle>) {
        for handle in handles {
            self.dispose(&handle).await;
        }
    }
}

/// Text of the last assistant turn that has any, segments joined by newline
fn last_assistant_text(turns: &[Turn]) -> Option<String> {
    turns
        .iter()
        .rev()
        .find(|t| t.role == TurnRole::Assistant && t.is_terminal())
        .map(|t| {
            t.segments
                .iter()
                .filter(|s| !s.is_empty())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        })
}
