//! The append-only conversation log shared by every agent in a delegation tree.
//!
//! The log is the single source of truth for a DeepThink session. Entries are immutable once
//! appended and each one stores the message history of its branch by value, so diverging
//! branches never share mutable state.
//!
//! Appends go through a `LogTransaction`, which stages the entries produced by one router
//! operation and commits them together. Only the router can open one, so a log held
//! outside the crate is read-only:
//!
//! ```compile_fail
//! use deepthink::conversation_log::LogTransaction;
//! ```
//!
//! ```text
//! 0 user    "Book a flight"
//! 1 agent0  Subtask Request        parent: -
//! 2 user    "Search flights..."
//! 3 agent1  Task Detail Inquiry    parent: 1
//! 4 agent0  Respond to Inquiry     parent: -
//! 5 agent1  Task Completion ...    parent: 4
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::deepthink::gateway::Message;
use crate::deepthink::identity;
use crate::deepthink::schema::{Action, Subtask};

/// A turn supplied by the user, or the detail text handed to a new child agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub content: String,
    /// The context sent to the gateway for the step this entry opened.
    pub message_history: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

/// A structured turn produced by one agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    /// Depth of the agent in the delegation tree (root = 0).
    pub agent_id: u32,
    pub thought: String,
    pub action: Action,
    /// Context sent to the gateway followed by the assistant reply.
    pub message_history: Vec<Message>,
    pub continuation_id: String,
    /// Index of the nearest preceding agent entry with a smaller `agent_id`, fixed at
    /// creation time.
    pub parent: Option<usize>,
    pub created_at: DateTime<Utc>,
}

/// One immutable record of the conversation log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entry {
    User(UserEntry),
    Agent(AgentEntry),
}

impl Entry {
    pub fn message_history(&self) -> &[Message] {
        match self {
            Entry::User(entry) => &entry.message_history,
            Entry::Agent(entry) => &entry.message_history,
        }
    }

    pub fn as_agent(&self) -> Option<&AgentEntry> {
        match self {
            Entry::Agent(entry) => Some(entry),
            Entry::User(_) => None,
        }
    }

    pub fn agent_id(&self) -> Option<u32> {
        self.as_agent().map(|entry| entry.agent_id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Entry::User(entry) => entry.created_at,
            Entry::Agent(entry) => entry.created_at,
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::User(entry) => {
                writeln!(f, "user")?;
                write!(f, "{}", entry.content)
            }
            Entry::Agent(entry) => {
                writeln!(f, "agent{}", entry.agent_id)?;
                writeln!(f, "{}", entry.thought)?;
                write!(f, "{}", entry.action)
            }
        }
    }
}

/// The follow-up transition enabled by the latest entry of the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    InvokeSubtask(Subtask),
    ReplyToInquiry(String),
    NotifyTaskCompletion(String),
}

impl Transition {
    /// Transition enabled by `action`, if any. `RespondToInquiry` is terminal: the user has
    /// to `send` to continue.
    pub fn for_action(action: &Action) -> Option<Transition> {
        match action {
            Action::SubtaskRequest { subtask } => Some(Transition::InvokeSubtask(subtask.clone())),
            Action::TaskDetailInquiry { inquiry } => {
                Some(Transition::ReplyToInquiry(inquiry.clone()))
            }
            Action::TaskCompletionNotification { result } => {
                Some(Transition::NotifyTaskCompletion(result.clone()))
            }
            Action::RespondToInquiry { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::InvokeSubtask(_) => "invoke subtask",
            Transition::ReplyToInquiry(_) => "reply to inquiry",
            Transition::NotifyTaskCompletion(_) => "notify task completion",
        }
    }
}

/// Ordered, append-only store of [`Entry`] values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    entries: Vec<Entry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry` and return its index.
    pub(crate) fn append(&mut self, entry: Entry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    /// Discard every entry at once.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The most recent agent entry together with its index.
    pub fn latest_agent_entry(&self) -> Option<(usize, &AgentEntry)> {
        self.entries
            .iter()
            .enumerate()
            .rev()
            .find_map(|(index, entry)| entry.as_agent().map(|agent| (index, agent)))
    }

    /// Ancestor of the agent entry at `index`, read from its stored parent index.
    pub fn ancestor_of(&self, index: usize) -> Option<(usize, &AgentEntry)> {
        let parent = self.get(index)?.as_agent()?.parent?;
        self.get(parent)
            .and_then(Entry::as_agent)
            .map(|agent| (parent, agent))
    }

    /// Ancestor of the agent entry at `index`, re-derived by scanning backwards for the
    /// nearest agent entry with a strictly smaller id.
    pub fn scan_ancestor(&self, index: usize) -> Option<usize> {
        let agent_id = self.get(index)?.agent_id()?;
        identity::nearest_ancestor(&self.entries[..index], agent_id)
    }

    /// The transition enabled by the latest entry, if any.
    pub fn available_transition(&self) -> Option<Transition> {
        self.last()
            .and_then(Entry::as_agent)
            .and_then(|agent| Transition::for_action(&agent.action))
    }
}

impl<'a> IntoIterator for &'a ConversationLog {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Entries staged by one router operation on top of a committed log.
///
/// Nothing reaches the log until `LogTransaction::commit` runs, so an operation that fails
/// half-way leaves the log exactly as it found it.
pub(crate) struct LogTransaction<'a> {
    base: &'a ConversationLog,
    staged: Vec<Entry>,
}

impl<'a> LogTransaction<'a> {
    pub(crate) fn new(base: &'a ConversationLog) -> Self {
        Self {
            base,
            staged: Vec::new(),
        }
    }

    /// Index the next staged entry will occupy once committed.
    pub(crate) fn next_index(&self) -> usize {
        self.base.len() + self.staged.len()
    }

    /// Stage `entry` and return the index it will occupy.
    pub(crate) fn stage(&mut self, entry: Entry) -> usize {
        let index = self.next_index();
        self.staged.push(entry);
        index
    }

    /// Parent index an agent entry with `agent_id` would get if staged now.
    pub(crate) fn ancestor_for(&self, agent_id: u32) -> Option<usize> {
        let staged_hit = identity::nearest_ancestor(&self.staged, agent_id);
        match staged_hit {
            Some(offset) => Some(self.base.len() + offset),
            None => identity::nearest_ancestor(self.base.entries(), agent_id),
        }
    }

    /// Hand back the staged entries so they can be appended under a write lock.
    pub(crate) fn into_staged(self) -> Vec<Entry> {
        self.staged
    }

    /// Append every staged entry to `log`, returning their indices.
    pub(crate) fn commit(entries: Vec<Entry>, log: &mut ConversationLog) -> Vec<usize> {
        entries.into_iter().map(|entry| log.append(entry)).collect()
    }
}
