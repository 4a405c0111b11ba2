//! The action router: the only component that mutates the conversation log.
//!
//! A [`DeepThink`] session owns one [`ConversationLog`] and exposes the command surface of
//! the delegation workflow:
//!
//! | Command | Precondition (latest action) | Entries appended |
//! |---|---|---|
//! | [`send`](DeepThink::send) | none | user + agent (same agent id) |
//! | [`invoke_subtask`](DeepThink::invoke_subtask) | `SubtaskRequest` | user + agent (child id) |
//! | [`reply_to_inquiry`](DeepThink::reply_to_inquiry) | `TaskDetailInquiry` | agent (ancestor id) + agent (child id) |
//! | [`notify_task_completion`](DeepThink::notify_task_completion) | `TaskCompletionNotification` | agent (child id) |
//! | [`reset`](DeepThink::reset) | none | clears the log |
//!
//! Each command claims the session's in-flight slot first; a second command issued while a
//! gateway call is outstanding fails with [`DeepThinkError::Busy`]. Entries produced by a
//! command are staged in a [`LogTransaction`] and committed together, so a failing gateway
//! call or schema mismatch never leaves a partial round-trip in the log.
//!
//! # Example
//!
//! ```rust,no_run
//! use deepthink::clients::openai::OpenAIGateway;
//! use deepthink::DeepThink;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let gateway = Arc::new(OpenAIGateway::from_env()?);
//! let session = DeepThink::new(gateway);
//!
//! session.send("Book a flight from Tokyo to Paris").await?;
//! while session.available_transition().await.is_some() {
//!     session.advance().await?;
//! }
//! for entry in session.entries().await {
//!     println!("{}\n", entry);
//! }
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::deepthink::config::{CallingConvention, DeepThinkConfig};
use crate::deepthink::conversation_log::{
    AgentEntry, ConversationLog, Entry, LogTransaction, Transition, UserEntry,
};
use crate::deepthink::error::DeepThinkError;
use crate::deepthink::event::{DeepThinkEvent, EventHandler};
use crate::deepthink::gateway::{GatewayRequest, Message, ModelGateway};
use crate::deepthink::identity;
use crate::deepthink::schema::{Action, ResponseSchema, Subtask};

/// Prefix of the message relaying a child's inquiry to its ancestor.
pub const INQUIRY_PREFIX: &str = "Subtask executer asked: ";
/// Prefix of the message reporting a child's result to its ancestor.
pub const COMPLETION_PREFIX: &str = "Subtask completed: ";

/// Releases the in-flight slot when an operation ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One task-delegation session: a conversation log plus the gateway that extends it.
pub struct DeepThink {
    session_id: String,
    gateway: Arc<dyn ModelGateway>,
    config: DeepThinkConfig,
    log: RwLock<ConversationLog>,
    in_flight: AtomicBool,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl DeepThink {
    /// Create a session with an empty log and the default configuration.
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        log::debug!(
            "DeepThink::new(...): session {} using model {}",
            session_id,
            gateway.model_name()
        );
        Self {
            session_id,
            gateway,
            config: DeepThinkConfig::default(),
            log: RwLock::new(ConversationLog::new()),
            in_flight: AtomicBool::new(false),
            event_handler: None,
        }
    }

    pub fn with_config(mut self, config: DeepThinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach an [`EventHandler`] (builder pattern).
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &DeepThinkConfig {
        &self.config
    }

    /// Whether an operation is currently waiting on the gateway.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Snapshot of every entry in insertion order.
    pub async fn entries(&self) -> Vec<Entry> {
        self.log.read().await.entries().to_vec()
    }

    /// Snapshot of the whole log.
    pub async fn snapshot(&self) -> ConversationLog {
        self.log.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }

    /// The transition the latest entry enables, if any.
    pub async fn available_transition(&self) -> Option<Transition> {
        self.log.read().await.available_transition()
    }

    /// Discard every entry. Returns how many were dropped.
    pub async fn reset(&self) -> Result<usize, DeepThinkError> {
        let _guard = self.begin("reset").await?;
        let discarded = {
            let mut log = self.log.write().await;
            let discarded = log.len();
            log.clear();
            discarded
        };
        log::info!(
            "DeepThink::reset(): session {} discarded {} entries",
            self.session_id,
            discarded
        );
        self.emit(DeepThinkEvent::LogReset {
            session_id: self.session_id.clone(),
            discarded,
        })
        .await;
        Ok(discarded)
    }

    /// Send user text on the latest branch, or start a new task on an empty log.
    ///
    /// Appends a user entry and an agent entry that keeps the latest agent id (0 on an empty
    /// log). Returns the indices of the appended entries.
    pub async fn send(&self, text: impl Into<String>) -> Result<Vec<usize>, DeepThinkError> {
        let text = text.into();
        let _guard = self.begin("send").await?;
        let staged = {
            let log = self.log.read().await;
            self.stage_send(&log, text).await
        };
        self.finish("send", staged).await
    }

    /// Delegate `subtask` to a new child agent with a fresh, isolated context.
    pub async fn invoke_subtask(&self, subtask: Subtask) -> Result<Vec<usize>, DeepThinkError> {
        let _guard = self.begin("invoke_subtask").await?;
        let staged = {
            let log = self.log.read().await;
            self.stage_invoke_subtask(&log, subtask).await
        };
        self.finish("invoke_subtask", staged).await
    }

    /// Pause the inquiring child, ask its ancestor, and resume the child with the answer.
    ///
    /// A root agent has no ancestor to ask, so its inquiry fails with
    /// [`DeepThinkError::MissingAncestor`] and nothing is appended.
    pub async fn reply_to_inquiry(
        &self,
        inquiry: impl Into<String>,
    ) -> Result<Vec<usize>, DeepThinkError> {
        let inquiry = inquiry.into();
        let _guard = self.begin("reply_to_inquiry").await?;
        let staged = {
            let log = self.log.read().await;
            self.stage_reply_to_inquiry(&log, inquiry).await
        };
        self.finish("reply_to_inquiry", staged).await
    }

    /// Report a child's result to its ancestor branch.
    ///
    /// The appended entry is built from the ancestor's context but keeps the child's agent
    /// id. `reply_to_inquiry` by contrast labels the ancestor's answer with the ancestor id.
    pub async fn notify_task_completion(
        &self,
        result: impl Into<String>,
    ) -> Result<Vec<usize>, DeepThinkError> {
        let result = result.into();
        let _guard = self.begin("notify_task_completion").await?;
        let staged = {
            let log = self.log.read().await;
            self.stage_notify_task_completion(&log, result).await
        };
        self.finish("notify_task_completion", staged).await
    }

    /// Run the transition enabled by the latest entry with the payload it carries.
    pub async fn advance(&self) -> Result<Vec<usize>, DeepThinkError> {
        let transition = self.available_transition().await.ok_or_else(|| {
            DeepThinkError::InvalidState("the latest entry enables no transition".into())
        })?;
        log::debug!("DeepThink::advance(): running '{}'", transition.name());
        match transition {
            Transition::InvokeSubtask(subtask) => self.invoke_subtask(subtask).await,
            Transition::ReplyToInquiry(inquiry) => self.reply_to_inquiry(inquiry).await,
            Transition::NotifyTaskCompletion(result) => self.notify_task_completion(result).await,
        }
    }

    async fn stage_send(
        &self,
        log: &ConversationLog,
        text: String,
    ) -> Result<Vec<Entry>, DeepThinkError> {
        let mut tx = LogTransaction::new(log);
        let base = match log.last() {
            Some(entry) => entry.message_history().to_vec(),
            None => vec![Message::developer(self.config.instructions.as_str())],
        };
        let agent_id = identity::continuing_id(log.latest_agent_entry().map(|(_, agent)| agent));
        let message = Message::user(text.as_str());

        let mut sent = base.clone();
        sent.push(message.clone());
        tx.stage(Entry::User(UserEntry {
            content: text,
            message_history: sent,
            created_at: Utc::now(),
        }));

        let entry = self
            .step(&tx, agent_id, &base, message, ResponseSchema::AssistantResponse)
            .await?;
        tx.stage(Entry::Agent(entry));
        Ok(tx.into_staged())
    }

    async fn stage_invoke_subtask(
        &self,
        log: &ConversationLog,
        subtask: Subtask,
    ) -> Result<Vec<Entry>, DeepThinkError> {
        let (_, latest) = expect_transition(log, "invoke_subtask", |transition| {
            matches!(transition, Transition::InvokeSubtask(_))
        })?;
        let agent_id = identity::child_id(Some(latest));
        log::info!(
            "DeepThink::invoke_subtask(...): agent {} delegates '{}' to agent {}",
            latest.agent_id,
            subtask.title,
            agent_id
        );

        let mut tx = LogTransaction::new(log);
        let base = vec![Message::developer(self.config.instructions.as_str())];
        let message = Message::user(subtask.detail.as_str());

        let mut sent = base.clone();
        sent.push(message.clone());
        tx.stage(Entry::User(UserEntry {
            content: subtask.detail,
            message_history: sent,
            created_at: Utc::now(),
        }));

        let entry = self
            .step(&tx, agent_id, &base, message, ResponseSchema::AssistantResponse)
            .await?;
        tx.stage(Entry::Agent(entry));
        Ok(tx.into_staged())
    }

    async fn stage_reply_to_inquiry(
        &self,
        log: &ConversationLog,
        inquiry: String,
    ) -> Result<Vec<Entry>, DeepThinkError> {
        let (child_index, child) = expect_transition(log, "reply_to_inquiry", |transition| {
            matches!(transition, Transition::ReplyToInquiry(_))
        })?;
        let (ancestor_index, ancestor) = log.ancestor_of(child_index).ok_or(
            DeepThinkError::MissingAncestor {
                agent_id: child.agent_id,
            },
        )?;
        // An ancestor implies a nonzero id unless the log was assembled by hand
        let responder_id = identity::responder_id(child.agent_id)?;
        log::info!(
            "DeepThink::reply_to_inquiry(...): agent {} asks entry {} (agent {})",
            child.agent_id,
            ancestor_index,
            ancestor.agent_id
        );

        let mut tx = LogTransaction::new(log);
        let question = Message::user(format!("{}{}", INQUIRY_PREFIX, inquiry));
        let answer = self
            .step(
                &tx,
                responder_id,
                &ancestor.message_history,
                question,
                ResponseSchema::InquiryResponse,
            )
            .await?;
        let reply = match &answer.action {
            Action::RespondToInquiry { message } => message.clone(),
            _ => {
                return Err(DeepThinkError::SchemaMismatch {
                    schema: ResponseSchema::InquiryResponse,
                    raw_text: answer
                        .message_history
                        .last()
                        .map(|message| message.content.clone())
                        .unwrap_or_default(),
                })
            }
        };
        tx.stage(Entry::Agent(answer));

        let resumed = self
            .step(
                &tx,
                child.agent_id,
                &child.message_history,
                Message::user(reply),
                ResponseSchema::AssistantResponse,
            )
            .await?;
        tx.stage(Entry::Agent(resumed));
        Ok(tx.into_staged())
    }

    async fn stage_notify_task_completion(
        &self,
        log: &ConversationLog,
        result: String,
    ) -> Result<Vec<Entry>, DeepThinkError> {
        let (child_index, child) = expect_transition(log, "notify_task_completion", |transition| {
            matches!(transition, Transition::NotifyTaskCompletion(_))
        })?;
        let (ancestor_index, ancestor) = log.ancestor_of(child_index).ok_or(
            DeepThinkError::MissingAncestor {
                agent_id: child.agent_id,
            },
        )?;
        log::info!(
            "DeepThink::notify_task_completion(...): agent {} reports to entry {} (agent {})",
            child.agent_id,
            ancestor_index,
            ancestor.agent_id
        );

        let mut tx = LogTransaction::new(log);
        let report = Message::user(format!("{}{}", COMPLETION_PREFIX, result));
        let entry = self
            .step(
                &tx,
                child.agent_id,
                &ancestor.message_history,
                report,
                ResponseSchema::AssistantResponse,
            )
            .await?;
        tx.stage(Entry::Agent(entry));
        Ok(tx.into_staged())
    }

    /// One gateway round-trip producing an agent entry for `agent_id`.
    ///
    /// The entry's history is `base + message` followed by the assistant reply; its parent
    /// is resolved against the committed log plus whatever `tx` already staged.
    async fn step(
        &self,
        tx: &LogTransaction<'_>,
        agent_id: u32,
        base: &[Message],
        message: Message,
        schema: ResponseSchema,
    ) -> Result<AgentEntry, DeepThinkError> {
        let request = self.request_for(base, &message);
        let mut history = base.to_vec();
        history.push(message);

        self.emit(DeepThinkEvent::GatewayCallStarted {
            session_id: self.session_id.clone(),
            agent_id,
            schema,
            message_count: request.message_count(),
        })
        .await;
        log::debug!(
            "DeepThink::step(...): agent {} -> {} ({} of {} messages on the wire)",
            agent_id,
            schema,
            request.message_count(),
            history.len()
        );

        let response = match self.gateway.respond(&request, schema).await {
            Ok(response) => response,
            Err(err) => {
                log::error!(
                    "DeepThink::step(...): gateway {} failed for agent {}: {}",
                    self.gateway.model_name(),
                    agent_id,
                    err
                );
                return Err(DeepThinkError::Gateway(err));
            }
        };

        let parsed = response
            .output_parsed
            .filter(|turn| schema.accepts(&turn.action));
        self.emit(DeepThinkEvent::GatewayCallCompleted {
            session_id: self.session_id.clone(),
            agent_id,
            response_id: response.id.clone(),
            parsed: parsed.is_some(),
            tokens_used: self.gateway.last_usage(),
        })
        .await;

        let turn = match parsed {
            Some(turn) => turn,
            None => {
                return Err(DeepThinkError::SchemaMismatch {
                    schema,
                    raw_text: response.output_text,
                })
            }
        };

        history.push(Message::assistant(
            response.output_text,
            response.id.as_str(),
        ));
        Ok(AgentEntry {
            agent_id,
            thought: turn.thought,
            action: turn.action,
            message_history: history,
            continuation_id: response.id,
            parent: tx.ancestor_for(agent_id),
            created_at: Utc::now(),
        })
    }

    /// Full history, or the branch's continuation token plus `message`; never both.
    fn request_for(&self, base: &[Message], message: &Message) -> GatewayRequest {
        if self.config.calling_convention == CallingConvention::Continuation {
            if let Some(continuation_id) = base.last().and_then(|last| last.continuation_id.clone())
            {
                return GatewayRequest::Continuation {
                    continuation_id,
                    message: message.clone(),
                };
            }
        }
        let mut messages = Vec::with_capacity(base.len() + 1);
        messages.extend_from_slice(base);
        messages.push(message.clone());
        GatewayRequest::History(messages)
    }

    fn claim(&self, operation: &'static str) -> Result<InFlightGuard<'_>, DeepThinkError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!(
                "DeepThink::{}(...): rejected, session {} is busy",
                operation,
                self.session_id
            );
            return Err(DeepThinkError::Busy);
        }
        Ok(InFlightGuard(&self.in_flight))
    }

    /// Claim the in-flight slot for `operation`.
    async fn begin(&self, operation: &'static str) -> Result<InFlightGuard<'_>, DeepThinkError> {
        let guard = self.claim(operation)?;
        self.emit(DeepThinkEvent::OperationStarted {
            session_id: self.session_id.clone(),
            operation,
        })
        .await;
        Ok(guard)
    }

    async fn finish(
        &self,
        operation: &'static str,
        staged: Result<Vec<Entry>, DeepThinkError>,
    ) -> Result<Vec<usize>, DeepThinkError> {
        match staged {
            Ok(entries) => {
                let indices = {
                    let mut log = self.log.write().await;
                    LogTransaction::commit(entries, &mut log)
                };
                log::info!(
                    "DeepThink::{}(...): appended entries {:?}",
                    operation,
                    indices
                );
                self.emit(DeepThinkEvent::EntriesAppended {
                    session_id: self.session_id.clone(),
                    operation,
                    indices: indices.clone(),
                })
                .await;
                Ok(indices)
            }
            Err(err) => {
                log::warn!("DeepThink::{}(...): {}", operation, err);
                self.emit(DeepThinkEvent::OperationFailed {
                    session_id: self.session_id.clone(),
                    operation,
                    error: err.to_string(),
                })
                .await;
                Err(err)
            }
        }
    }

    async fn emit(&self, event: DeepThinkEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_event(&event).await;
        }
    }
}

/// The latest entry, provided it is an agent entry enabling the transition `operation`
/// needs.
fn expect_transition<'l>(
    log: &'l ConversationLog,
    operation: &str,
    enabled: impl Fn(&Transition) -> bool,
) -> Result<(usize, &'l AgentEntry), DeepThinkError> {
    let latest = log
        .last()
        .and_then(Entry::as_agent)
        .map(|agent| (log.len() - 1, agent));
    match latest {
        Some((index, agent))
            if Transition::for_action(&agent.action)
                .as_ref()
                .map_or(false, &enabled) =>
        {
            Ok((index, agent))
        }
        Some((_, agent)) => Err(DeepThinkError::InvalidState(format!(
            "{} is not enabled after a {} action",
            operation,
            agent.action.label()
        ))),
        None => Err(DeepThinkError::InvalidState(format!(
            "{} requires the latest entry to be an agent entry",
            operation
        ))),
    }
}
