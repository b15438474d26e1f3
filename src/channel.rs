//! Context broadcast bus shared by a team's agents
//!
//! Messages are stored append-only in one queue per `(team, mailbox)`. A
//! mailbox is either a single agent or the team-wide broadcast queue. Agents
//! read their own mailbox plus the broadcast queue; the rendered broadcast
//! context is what gets spliced into the next instruction an agent receives.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::team::TeamId;

/// Rendered when no peer has produced anything
pub const NO_CONTEXT: &str = "No messages from other agents yet.";

/// Length of summaries derived from results
const SUMMARY_CHARS: usize = 200;

/// Kind of message on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Private message to one agent
    Direct,
    /// Visible to every agent in the team
    Broadcast,
    /// Ask an agent to wind down
    ShutdownRequest,
    /// Answer to a shutdown request
    ShutdownResponse,
}

/// Where a message is queued
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mailbox {
    Agent(String),
    Broadcast,
}

impl Mailbox {
    pub fn agent(name: impl Into<String>) -> Self {
        Self::Agent(name.into())
    }
}

/// Immutable bus message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub kind: MessageKind,
    pub sender: String,
    pub recipient: Option<String>,
    pub content: String,
    pub summary: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub team: Option<TeamId>,
}

impl Message {
    /// Message of `kind` from `sender`, timestamped now
    pub fn new(kind: MessageKind, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            sender: sender.into(),
            recipient: None,
            content: content.into(),
            summary: None,
            timestamp: Utc::now(),
            team: None,
        }
    }

    pub fn direct(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::Direct, sender, content).to(recipient)
    }

    pub fn broadcast(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(MessageKind::Broadcast, sender, content)
    }

    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn in_team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn mailbox(&self) -> Mailbox {
        match &self.recipient {
            Some(name) => Mailbox::Agent(name.clone()),
            None => Mailbox::Broadcast,
        }
    }
}

type QueueKey = (Option<TeamId>, Mailbox);

/// Per-team message queues
#[derive(Debug, Default)]
pub struct ContextBus {
    queues: RwLock<HashMap<QueueKey, Vec<Message>>>,
}

impl ContextBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message
    pub fn publish(&self, message: Message) {
        let team = message.team;
        let addressed = message.mailbox();
        let also_broadcast = match message.kind {
            MessageKind::Broadcast => addressed != Mailbox::Broadcast,
            MessageKind::Direct | MessageKind::ShutdownRequest | MessageKind::ShutdownResponse => {
                false
            }
        };

        debug!(
            team = ?team,
            sender = %message.sender,
            kind = ?message.kind,
            "Publishing message"
        );

        let mut queues = self.queues.write();
        if also_broadcast {
            queues
                .entry((team, Mailbox::Broadcast))
                .or_default()
                .push(message.clone());
        }
        queues.entry((team, addressed)).or_default().push(message);
    }

    /// Broadcast the outcome of one agent's work
    pub fn broadcast_result(&self, team: TeamId, sender: &str, result: &str, success: bool) {
        let (content, summary) = if success {
            (result.to_string(), truncate(result, SUMMARY_CHARS))
        } else {
            let notice = format!("Failed: {result}");
            let summary = truncate(&notice, SUMMARY_CHARS);
            (notice, summary)
        };

        self.publish(
            Message::broadcast(sender, content)
                .in_team(team)
                .with_summary(summary),
        );
    }

    /// Messages visible to `mailbox`, oldest first.
    ///
    /// An agent sees its own queue followed by the broadcast queue. With
    /// `since`, only messages strictly newer than it are returned.
    pub fn fetch(
        &self,
        team: Option<TeamId>,
        mailbox: &Mailbox,
        since: Option<DateTime<Utc>>,
    ) -> Vec<Message> {
        let queues = self.queues.read();
        let newer = |m: &&Message| since.map_or(true, |t| m.timestamp > t);
        let broadcast = queues.get(&(team, Mailbox::Broadcast));

        let mut seen = HashSet::new();
        let own = match mailbox {
            Mailbox::Agent(_) => queues.get(&(team, mailbox.clone())),
            Mailbox::Broadcast => None,
        };

        own.into_iter()
            .flatten()
            .chain(broadcast.into_iter().flatten())
            .filter(newer)
            .filter(|m| seen.insert(m.id))
            .cloned()
            .collect()
    }

    /// Broadcast context for a team, one line per message, leaving out
    /// whatever `exclude` sent itself
    pub fn render_context(&self, team: TeamId, exclude: Option<&str>) -> String {
        let queues = self.queues.read();
        let lines: Vec<String> = queues
            .get(&(Some(team), Mailbox::Broadcast))
            .into_iter()
            .flatten()
            .filter(|m| exclude != Some(m.sender.as_str()))
            .map(|m| {
                let text = m
                    .summary
                    .clone()
                    .unwrap_or_else(|| truncate(&m.content, SUMMARY_CHARS));
                format!("- [{}]: {}", m.sender, text)
            })
            .collect();

        if lines.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            lines.join("\n")
        }
    }

    /// Drop every queue belonging to `team`
    pub fn clear(&self, team: TeamId) {
        let mut queues = self.queues.write();
        let before = queues.len();
        queues.retain(|(t, _), _| *t != Some(team));
        debug!(team_id = %team, queues = before - queues.len(), "Cleared team context");
    }

    /// Number of messages queued for a team, across all mailboxes
    pub fn len(&self, team: TeamId) -> usize {
        self.queues
            .read()
            .iter()
            .filter(|((t, _), _)| *t == Some(team))
            .map(|(_, q)| q.len())
            .sum()
    }
}

/// First `max` characters of `text`, with an ellipsis when cut
fn truncate(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
