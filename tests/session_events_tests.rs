use async_trait::async_trait;
use deepthink::event::{DeepThinkEvent, EventHandler};
use deepthink::gateway::{GatewayRequest, GatewayResponse, ModelGateway, TokenUsage};
use deepthink::schema::{self, ResponseSchema};
use deepthink::{DeepThink, DeepThinkError};
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const INQUIRY: &str =
    r#"{"thought":"Need more","action":{"type":"task_detail_inquiry","inquiry":"Which city?"}}"#;

// Gateway that holds every call until the test releases it
struct GatedGateway {
    release: Notify,
    usage: Mutex<Option<TokenUsage>>,
}

#[async_trait]
impl ModelGateway for GatedGateway {
    async fn respond(
        &self,
        _request: &GatewayRequest,
        schema: ResponseSchema,
    ) -> Result<GatewayResponse, Box<dyn Error + Send + Sync>> {
        self.release.notified().await;
        *self.usage.lock().unwrap() = Some(TokenUsage {
            input_tokens: 12,
            output_tokens: 8,
            total_tokens: 20,
        });
        Ok(GatewayResponse {
            id: "resp_gated".into(),
            output_text: INQUIRY.into(),
            output_parsed: schema::parse_turn(schema, INQUIRY),
        })
    }

    fn model_name(&self) -> &str {
        "gated"
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.usage)
    }
}

fn gated() -> Arc<GatedGateway> {
    Arc::new(GatedGateway {
        release: Notify::new(),
        usage: Mutex::new(None),
    })
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<DeepThinkEvent>>,
}

impl Recorder {
    fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                DeepThinkEvent::OperationStarted { .. } => "started",
                DeepThinkEvent::GatewayCallStarted { .. } => "call",
                DeepThinkEvent::GatewayCallCompleted { .. } => "called",
                DeepThinkEvent::EntriesAppended { .. } => "appended",
                DeepThinkEvent::OperationFailed { .. } => "failed",
                DeepThinkEvent::LogReset { .. } => "reset",
            })
            .collect()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_event(&self, event: &DeepThinkEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[tokio::test]
async fn test_second_operation_while_in_flight_is_rejected() {
    let gateway = gated();
    let session = Arc::new(DeepThink::new(gateway.clone()));

    let running = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send("Book a flight").await })
    };
    while !session.is_busy() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        session.send("Again").await,
        Err(DeepThinkError::Busy)
    ));
    assert!(matches!(session.reset().await, Err(DeepThinkError::Busy)));
    assert!(matches!(
        session.reply_to_inquiry("Which city?").await,
        Err(DeepThinkError::Busy)
    ));
    // Readers are not blocked by the outstanding call
    assert!(session.entries().await.is_empty());

    gateway.release.notify_one();
    let indices = running.await.unwrap().unwrap();
    assert_eq!(indices, vec![0, 1]);
    assert!(!session.is_busy());
    assert_eq!(session.len().await, 2);
}

#[tokio::test]
async fn test_events_follow_operation_lifecycle() {
    let gateway = gated();
    let recorder = Arc::new(Recorder::default());
    let session = DeepThink::new(gateway.clone()).with_event_handler(recorder.clone());

    gateway.release.notify_one();
    session.send("Book a flight").await.unwrap();
    assert_eq!(
        recorder.names(),
        vec!["started", "call", "called", "appended"]
    );

    let events = recorder.events.lock().unwrap().clone();
    match &events[2] {
        DeepThinkEvent::GatewayCallCompleted {
            agent_id,
            response_id,
            parsed,
            tokens_used,
            ..
        } => {
            assert_eq!(*agent_id, 0);
            assert_eq!(response_id, "resp_gated");
            assert!(*parsed);
            assert_eq!(tokens_used.as_ref().map(|u| u.total_tokens), Some(20));
        }
        other => panic!("unexpected event {:?}", other),
    }
    match &events[3] {
        DeepThinkEvent::EntriesAppended {
            session_id,
            operation,
            indices,
        } => {
            assert_eq!(session_id, session.session_id());
            assert_eq!(*operation, "send");
            assert_eq!(indices, &vec![0, 1]);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_operation_and_reset_events() {
    let gateway = gated();
    let recorder = Arc::new(Recorder::default());
    let session = DeepThink::new(gateway.clone()).with_event_handler(recorder.clone());

    gateway.release.notify_one();
    session.send("Book a flight").await.unwrap();
    recorder.events.lock().unwrap().clear();

    // Root agent asked a question: nobody above it can answer
    let err = session.reply_to_inquiry("Which city?").await.unwrap_err();
    assert!(matches!(err, DeepThinkError::MissingAncestor { agent_id: 0 }));
    assert_eq!(recorder.names(), vec!["started", "failed"]);

    recorder.events.lock().unwrap().clear();
    assert_eq!(session.reset().await.unwrap(), 2);
    assert_eq!(recorder.names(), vec!["started", "reset"]);
    assert!(session.is_empty().await);
}
