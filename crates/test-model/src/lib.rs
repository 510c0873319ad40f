//! A local scripted chat provider for testing purpose.

mod preset;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use cloudsec_tutor_model::{
    ChatProvider, ChatProviderError, ChatResponse, ChatResponseEvent,
    ErrorKind, FinishReason, SessionConfig, SessionHandle,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl StdError for Error {}

impl ChatProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// The raw session type behind handles made by [`TestChatProvider`].
#[derive(Debug)]
pub struct TestSession {
    config: SessionConfig,
    turns: AtomicUsize,
}

impl TestSession {
    /// Returns the configuration this session was created with.
    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

pub struct TestChatResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ChatResponse for TestChatResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ChatResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if this.event_idx > this.events.len() {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            let idx = this.event_idx;
            this.event_idx += 1;
            let Some(event) = this.events.get(idx) else {
                return Poll::Ready(Ok(Some(ChatResponseEvent::Completed(
                    FinishReason::Stop,
                ))));
            };
            return match event {
                PresetEvent::Fragment(text) => {
                    Poll::Ready(Ok(Some(ChatResponseEvent::Fragment(
                        text.clone(),
                    ))))
                }
                PresetEvent::Fail(message) => {
                    // Nothing is delivered after a failure.
                    this.event_idx = this.events.len() + 1;
                    Poll::Ready(Err(Error::new(
                        message.clone(),
                        ErrorKind::Other,
                    )))
                }
            };
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

/// A local scripted chat provider for testing purpose.
///
/// Before sending messages, you need to setup the reply script, which is
/// how the service should respond to each message. Replies are selected by
/// the number of messages already sent in the session. If there are no
/// enough replies in the script, an error will be returned.
///
/// Clones share their counters, so a test can keep a clone around to
/// inspect what the code under test has done with the provider.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestChatProvider {
    script: Vec<PresetReply>,
    delay: Option<Duration>,
    fail_create: bool,
    created_sessions: Arc<AtomicUsize>,
    received_messages: Arc<Mutex<Vec<String>>>,
}

impl TestChatProvider {
    #[inline]
    pub fn add_reply(&mut self, preset: PresetReply) {
        self.script.push(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Makes every session creation request fail.
    #[inline]
    pub fn fail_session_creation(&mut self) {
        self.fail_create = true;
    }

    /// Returns how many session creation requests have been received.
    #[inline]
    pub fn session_creations(&self) -> usize {
        self.created_sessions.load(Ordering::SeqCst)
    }

    /// Returns the messages received so far, in order.
    pub fn received_messages(&self) -> Vec<String> {
        self.received_messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ChatProvider for TestChatProvider {
    type Error = crate::Error;
    type Response = TestChatResponse;

    fn create_session(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<SessionHandle, Self::Error>> + Send + 'static
    {
        let seq = self.created_sessions.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return ready(Err(Error::new(
                "session creation disabled",
                ErrorKind::Unauthenticated,
            )));
        }
        let session = TestSession {
            config: config.clone(),
            turns: AtomicUsize::new(0),
        };
        ready(Ok(SessionHandle::new(format!("test-session:{seq}"), session)))
    }

    fn send_message_stream(
        &self,
        session: &SessionHandle,
        text: &str,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let result = 'blk: {
            let Some(session) = session.to_raw::<TestSession>() else {
                break 'blk Err(Error::new(
                    "foreign session handle",
                    ErrorKind::Other,
                ));
            };
            self.received_messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(text.to_owned());

            let turn = session.turns.fetch_add(1, Ordering::SeqCst);
            let Some(preset) = self.script.get(turn) else {
                break 'blk Err(Error::new(
                    "no enough replies",
                    ErrorKind::RateLimitExceeded,
                ));
            };
            if preset.rejected {
                break 'blk Err(Error::new(
                    "rejected by script",
                    ErrorKind::Other,
                ));
            }

            Ok(TestChatResponse {
                events: preset.events.clone(),
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            })
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use super::*;

    async fn collect_response(
        resp: TestChatResponse,
    ) -> (String, Result<FinishReason, Error>) {
        let mut resp = pin!(resp);
        let mut text = String::new();
        loop {
            let event = match poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
            {
                Ok(event) => event.unwrap(),
                Err(err) => return (text, Err(err)),
            };
            match event {
                ChatResponseEvent::Fragment(fragment) => {
                    text.push_str(&fragment);
                }
                ChatResponseEvent::Completed(reason) => {
                    return (text, Ok(reason));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_send_message() {
        let mut provider = TestChatProvider::default();
        provider.add_reply(PresetReply::with_fragments(["Hello, ", "world!"]));
        provider.add_reply(PresetReply::with_events([
            PresetEvent::Fragment("Sure, ".to_owned()),
            PresetEvent::Fail("stream reset".to_owned()),
            PresetEvent::Fragment("never sent".to_owned()),
        ]));

        let config = SessionConfig::new("test-model", "Be brief.");
        let session = provider.create_session(&config).await.unwrap();
        assert_eq!(
            session.to_raw::<TestSession>().unwrap().config(),
            &config
        );

        let resp = provider.send_message_stream(&session, "Hi").await.unwrap();
        let (text, reason) = collect_response(resp).await;
        assert_eq!(text, "Hello, world!");
        assert_eq!(reason.unwrap(), FinishReason::Stop);

        let resp = provider
            .send_message_stream(&session, "Again")
            .await
            .unwrap();
        let (text, reason) = collect_response(resp).await;
        assert_eq!(text, "Sure, ");
        assert_eq!(reason.unwrap_err().message(), "stream reset");

        assert!(provider.send_message_stream(&session, "More").await.is_err());
        assert_eq!(provider.received_messages(), ["Hi", "Again", "More"]);
    }

    #[tokio::test]
    async fn test_session_creation() {
        let mut provider = TestChatProvider::default();
        let config = SessionConfig::new("test-model", "Be brief.");
        let first = provider.create_session(&config).await.unwrap();
        let second = provider.create_session(&config).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(provider.session_creations(), 2);

        provider.fail_session_creation();
        let err = provider.create_session(&config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert_eq!(provider.session_creations(), 3);
    }

    #[tokio::test]
    async fn test_rejected_reply() {
        let mut provider = TestChatProvider::default();
        provider.add_reply(PresetReply::default().rejected());
        let config = SessionConfig::new("test-model", "Be brief.");
        let session = provider.create_session(&config).await.unwrap();
        let err = provider
            .send_message_stream(&session, "Hi")
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
