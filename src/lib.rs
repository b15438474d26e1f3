//! # Conclave
//!
//! Team-based agent orchestration over a remote work service.
//!
//! A team is a named set of agents. Each agent's work runs as a remote
//! session that is created, given one instruction, polled until it answers
//! and then disposed. Teams can run a flat task in parallel, hold a
//! multi-round discussion, or work through a dependency graph of tasks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            ORCHESTRATOR                              │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐               │
//! │  │ TeamRegistry │  │  ContextBus  │  │  TeamStore   │               │
//! │  └──────┬───────┘  └──────┬───────┘  └──────────────┘               │
//! └─────────┼─────────────────┼─────────────────────────────────────────┘
//!           │                 │
//!           ▼                 ▼
//!   ┌──────────────┐   ┌─────────────┐      ┌──────────────┐
//!   │  Team        │──▶│ Coordinator │◀─────│  Scheduler   │
//!   │  agents      │   │  fan-out    │      │  task graph  │
//!   │  task graph  │   │  discussion │      │  rounds      │
//!   └──────────────┘   └──────┬──────┘      └──────────────┘
//!                             │
//!                             ▼
//!                     ┌────────────────┐
//!                     │ SessionManager │
//!                     └───────┬────────┘
//!                             ▼
//!                   dyn RemoteWorkClient
//! ```
//!
//! ## Key Concepts
//!
//! - **Agent**: A named worker with a role, a status and at most one live session
//! - **Team**: Agents plus the task graph they share
//! - **Frontier**: Pending tasks whose dependencies have all completed
//! - **Broadcast**: A message every agent of a team can see
//! - **Round**: One pass of the scheduler or of a discussion

pub mod agent;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod team;

pub use agent::{Agent, AgentSpec, AgentStatus};
pub use channel::{ContextBus, Mailbox, Message, MessageKind};
pub use config::OrchestratorConfig;
pub use coordinator::{Coordinator, Discussion, Outcome};
pub use error::{ConclaveError, Result};
pub use graph::{NewTask, Task, TaskGraph, TaskId, TaskStatus};
pub use orchestrator::Orchestrator;
pub use remote::{RemoteError, RemoteHandle, RemoteWorkClient, Turn, TurnRole};
pub use scheduler::RunSummary;
pub use session::{PollPolicy, SessionManager};
pub use store::{TeamRecord, TeamStore};
pub use team::{Team, TeamId, TeamRegistry, TeamSpec};
