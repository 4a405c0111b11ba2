//! Agent identity allocation.
//!
//! Agents are not processes; an agent id is the depth of a branch in the delegation tree.
//! The root agent is 0 and every delegated subtask runs one level deeper.

use crate::deepthink::conversation_log::{AgentEntry, Entry};
use crate::deepthink::error::DeepThinkError;

/// Id of the agent answering the first message of an empty log.
pub const ROOT_AGENT_ID: u32 = 0;

/// Id for a `send` that continues the latest agent's branch.
pub fn continuing_id(latest: Option<&AgentEntry>) -> u32 {
    latest.map_or(ROOT_AGENT_ID, |entry| entry.agent_id)
}

/// Id for a child created by delegating a subtask. A missing parent counts as id 0.
pub fn child_id(latest: Option<&AgentEntry>) -> u32 {
    continuing_id(latest) + 1
}

/// Id of the ancestor that answers an inquiry raised by `current`.
pub fn responder_id(current: u32) -> Result<u32, DeepThinkError> {
    current.checked_sub(1).ok_or_else(|| {
        DeepThinkError::InvalidState(format!(
            "agent {} has no requester to answer its inquiry",
            current
        ))
    })
}

/// Position within `entries` of the nearest agent entry whose id is strictly smaller than
/// `agent_id`, scanning backwards from the end.
pub fn nearest_ancestor(entries: &[Entry], agent_id: u32) -> Option<usize> {
    entries
        .iter()
        .rposition(|entry| matches!(entry.agent_id(), Some(id) if id < agent_id))
}
