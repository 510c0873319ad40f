use std::sync::Arc;
use std::time::Duration;

use cloudsec_tutor_model::SessionConfig;
use cloudsec_tutor_test_model::{PresetEvent, PresetReply, TestChatProvider};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::transcript::Message;
use crate::{ChatClient, FAILURE_NOTICE, SessionManager, TutorConfigBuilder};

struct Harness {
    pump: MessagePump,
    events: mpsc::UnboundedReceiver<PumpEvent>,
}

impl Harness {
    async fn wait_for_stage(&mut self, stage: Stage) -> Vec<PumpEvent> {
        let mut seen = vec![];
        timeout(Duration::from_secs(1), async {
            loop {
                let event = self.events.recv().await.expect("pump stopped");
                let reached = event == PumpEvent::StageChanged(stage);
                seen.push(event);
                if reached {
                    break;
                }
            }
        })
        .await
        .expect("timed out waiting for stage");
        seen
    }

    async fn transcript(&self) -> Vec<Message> {
        let snapshot = self.pump.snapshot().await.unwrap();
        snapshot.transcript.messages().to_vec()
    }
}

fn sessions(provider: &TestChatProvider, credential: &str) -> Arc<SessionManager> {
    let config = TutorConfigBuilder::with_session(SessionConfig::new(
        "test-model",
        "You are an AWS security tutor.",
    ))
    .with_credential(credential)
    .build();
    Arc::new(SessionManager::new(ChatClient::new(provider.clone()), config))
}

fn spawn_pump(sessions: Arc<SessionManager>, greeting: Option<&str>) -> Harness {
    let (tx, events) = mpsc::unbounded_channel();
    let mut builder = MessagePumpBuilder::with_session_manager(sessions)
        .on_event(move |event| {
            tx.send(event).ok();
        });
    if let Some(greeting) = greeting {
        builder = builder.with_greeting(greeting);
    }
    Harness {
        pump: builder.build(),
        events,
    }
}

async fn start(provider: &TestChatProvider) -> Harness {
    let sessions = sessions(provider, "test-key");
    assert!(sessions.ensure_session().await.is_some());
    spawn_pump(sessions, None)
}

#[tokio::test]
async fn test_fragments_in_order() {
    let mut provider = TestChatProvider::default();
    provider.add_reply(PresetReply::with_fragments([
        "Sec",
        "urity",
        " Groups act as firewalls.",
    ]));
    let mut harness = start(&provider).await;

    harness.pump.submit("What do Security Groups do?");
    harness.wait_for_stage(Stage::Idle).await;

    assert_eq!(
        harness.transcript().await,
        [
            Message::user("What do Security Groups do?"),
            Message::assistant("Security Groups act as firewalls."),
        ]
    );
}

#[tokio::test]
async fn test_iam_scenario() {
    let mut provider = TestChatProvider::default();
    provider.set_delay(Duration::from_millis(50));
    provider.add_reply(PresetReply::with_fragments([
        "IAM is...",
        " AWS's identity service.",
    ]));
    let mut harness = start(&provider).await;

    harness.pump.submit("What is IAM?");
    let mut events = harness.wait_for_stage(Stage::Streaming).await;
    assert_eq!(
        harness.transcript().await,
        [Message::user("What is IAM?"), Message::assistant("")]
    );

    events.extend(harness.wait_for_stage(Stage::Idle).await);
    assert_eq!(
        events,
        [
            PumpEvent::MessageAppended {
                index: 0,
                message: Message::user("What is IAM?"),
            },
            PumpEvent::StageChanged(Stage::Sending),
            PumpEvent::MessageAppended {
                index: 1,
                message: Message::assistant(""),
            },
            PumpEvent::StageChanged(Stage::Streaming),
            PumpEvent::MessageUpdated {
                index: 1,
                message: Message::assistant("IAM is..."),
            },
            PumpEvent::MessageUpdated {
                index: 1,
                message: Message::assistant("IAM is... AWS's identity service."),
            },
            PumpEvent::StageChanged(Stage::Settled),
            PumpEvent::StageChanged(Stage::Idle),
        ]
    );
    assert_eq!(
        harness.transcript().await,
        [
            Message::user("What is IAM?"),
            Message::assistant("IAM is... AWS's identity service."),
        ]
    );
}

#[tokio::test]
async fn test_single_flight_while_sending() {
    let mut provider = TestChatProvider::default();
    provider.add_reply(PresetReply::with_fragments(["Use KMS."]));
    provider.add_reply(PresetReply::with_fragments(["Use GuardDuty."]));
    let mut harness = start(&provider).await;

    harness.pump.submit("How do I encrypt S3?");
    harness.pump.submit("How do I detect threats?");
    harness.wait_for_stage(Stage::Idle).await;

    assert_eq!(
        harness.transcript().await,
        [
            Message::user("How do I encrypt S3?"),
            Message::assistant("Use KMS."),
        ]
    );
    assert_eq!(provider.received_messages(), ["How do I encrypt S3?"]);

    // Once idle again, input is accepted.
    harness.pump.submit("How do I detect threats?");
    harness.wait_for_stage(Stage::Idle).await;
    assert_eq!(harness.transcript().await.len(), 4);
    assert_eq!(provider.received_messages().len(), 2);
}

#[tokio::test]
async fn test_single_flight_while_streaming() {
    let mut provider = TestChatProvider::default();
    provider.set_delay(Duration::from_secs(60));
    provider.add_reply(PresetReply::with_fragments(["never arrives"]));
    let mut harness = start(&provider).await;

    harness.pump.submit("What is a VPC?");
    harness.wait_for_stage(Stage::Streaming).await;
    harness.pump.submit("And subnets?");

    let snapshot = harness.pump.snapshot().await.unwrap();
    assert_eq!(snapshot.stage, Stage::Streaming);
    assert_eq!(
        snapshot.transcript.messages(),
        [Message::user("What is a VPC?"), Message::assistant("")]
    );
    assert_eq!(provider.received_messages(), ["What is a VPC?"]);
}

#[tokio::test]
async fn test_blank_input_ignored() {
    let provider = TestChatProvider::default();
    let mut harness = start(&provider).await;

    harness.pump.submit("");
    harness.pump.submit("   \n\t");

    let snapshot = harness.pump.snapshot().await.unwrap();
    assert_eq!(snapshot.stage, Stage::Idle);
    assert!(snapshot.transcript.is_empty());
    assert!(harness.events.try_recv().is_err());
    assert!(provider.received_messages().is_empty());
}

#[tokio::test]
async fn test_failure_without_fragments() {
    let mut provider = TestChatProvider::default();
    provider.add_reply(PresetReply::with_events([PresetEvent::Fail(
        "connection reset".to_owned(),
    )]));
    let mut harness = start(&provider).await;

    harness.pump.submit("What is CloudTrail?");
    harness.wait_for_stage(Stage::Idle).await;

    let snapshot = harness.pump.snapshot().await.unwrap();
    assert_eq!(snapshot.stage, Stage::Idle);
    assert_eq!(
        snapshot.transcript.messages(),
        [
            Message::user("What is CloudTrail?"),
            Message::assistant(FAILURE_NOTICE),
        ]
    );
}

#[tokio::test]
async fn test_failure_keeps_streamed_text() {
    let mut provider = TestChatProvider::default();
    provider.add_reply(PresetReply::with_events([
        PresetEvent::Fragment("KMS encrypts".to_owned()),
        PresetEvent::Fail("connection reset".to_owned()),
    ]));
    let mut harness = start(&provider).await;

    harness.pump.submit("What is KMS?");
    harness.wait_for_stage(Stage::Idle).await;

    assert_eq!(
        harness.transcript().await,
        [
            Message::user("What is KMS?"),
            Message::assistant("KMS encrypts"),
            Message::assistant(FAILURE_NOTICE),
        ]
    );
}

#[tokio::test]
async fn test_rejected_request() {
    let mut provider = TestChatProvider::default();
    provider.add_reply(PresetReply::default().rejected());
    let mut harness = start(&provider).await;

    harness.pump.submit("What is WAF?");
    let events = harness.wait_for_stage(Stage::Idle).await;

    assert!(!events.contains(&PumpEvent::StageChanged(Stage::Streaming)));
    assert_eq!(
        harness.transcript().await,
        [
            Message::user("What is WAF?"),
            Message::assistant(FAILURE_NOTICE),
        ]
    );
}

#[tokio::test]
async fn test_no_session_ignores_input() {
    let provider = TestChatProvider::default();
    let harness = spawn_pump(sessions(&provider, ""), None);

    harness.pump.submit("Hello?");

    let snapshot = harness.pump.snapshot().await.unwrap();
    assert_eq!(snapshot.stage, Stage::Idle);
    assert!(snapshot.transcript.is_empty());
    assert_eq!(provider.session_creations(), 0);
}

#[tokio::test]
async fn test_greeting() {
    let mut provider = TestChatProvider::default();
    provider.add_reply(PresetReply::with_fragments(["Least privilege."]));
    let sessions = sessions(&provider, "test-key");
    sessions.ensure_session().await.unwrap();
    let mut harness = spawn_pump(sessions, Some("Hello! Ask me anything."));

    assert_eq!(
        harness.transcript().await,
        [Message::assistant("Hello! Ask me anything.")]
    );

    harness.pump.submit("Best IAM practice?");
    harness.wait_for_stage(Stage::Idle).await;
    assert_eq!(
        harness.transcript().await,
        [
            Message::assistant("Hello! Ask me anything."),
            Message::user("Best IAM practice?"),
            Message::assistant("Least privilege."),
        ]
    );
}

#[tokio::test]
async fn test_shutdown_discards_late_fragments() {
    let mut provider = TestChatProvider::default();
    provider.set_delay(Duration::from_millis(50));
    provider.add_reply(PresetReply::with_fragments(["late ", "fragments"]));
    let mut harness = start(&provider).await;

    harness.pump.submit("What is Shield?");
    harness.wait_for_stage(Stage::Streaming).await;
    harness.pump.shutdown();

    assert_eq!(harness.pump.snapshot().await, None);
    harness.pump.submit("Still there?");

    let mut late_events = vec![];
    timeout(Duration::from_secs(1), async {
        while let Some(event) = harness.events.recv().await {
            late_events.push(event);
        }
    })
    .await
    .expect("pump did not stop");
    assert!(late_events.is_empty());
    assert_eq!(provider.received_messages(), ["What is Shield?"]);
}
