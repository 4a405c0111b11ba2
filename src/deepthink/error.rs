use std::error::Error;
use std::fmt;

use crate::deepthink::schema::ResponseSchema;

/// Errors reported by the [`DeepThink`](crate::DeepThink) router.
///
/// Every error leaves the conversation log untouched: an operation either appends all of
/// its entries or none of them.
///
/// # Examples
///
/// ```
/// use deepthink::DeepThinkError;
///
/// let err = DeepThinkError::MissingAncestor { agent_id: 0 };
/// assert_eq!(err.to_string(), "No ancestor entry found for agent 0");
/// ```
#[derive(Debug)]
pub enum DeepThinkError {
    /// The gateway output did not parse against the requested schema.
    SchemaMismatch {
        schema: ResponseSchema,
        raw_text: String,
    },

    /// `reply_to_inquiry` or `notify_task_completion` found no entry with a smaller
    /// agent id before the current one.
    MissingAncestor { agent_id: u32 },

    /// The latest entry does not enable the requested transition, or an agent id would
    /// drop below zero.
    InvalidState(String),

    /// Another operation is still waiting on the gateway.
    Busy,

    /// Transport or provider failure raised by the gateway.
    Gateway(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for DeepThinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeepThinkError::SchemaMismatch { schema, raw_text } => {
                write!(f, "Invalid response format for {}: {}", schema, raw_text)
            }
            DeepThinkError::MissingAncestor { agent_id } => {
                write!(f, "No ancestor entry found for agent {}", agent_id)
            }
            DeepThinkError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            DeepThinkError::Busy => write!(f, "Another operation is already in flight"),
            DeepThinkError::Gateway(err) => write!(f, "Gateway error: {}", err),
        }
    }
}

impl Error for DeepThinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DeepThinkError::Gateway(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<Box<dyn Error + Send + Sync>> for DeepThinkError {
    fn from(err: Box<dyn Error + Send + Sync>) -> Self {
        DeepThinkError::Gateway(err)
    }
}
