use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;

use cloudsec_tutor_model::{
    ChatProvider, ChatProviderError, ChatResponse, ChatResponseEvent,
    FinishReason, SessionConfig, SessionHandle,
};
use tracing::Instrument;

/// A type-erased error from the chat provider.
pub type ProviderError = Box<dyn ChatProviderError>;

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type ProgressFn = Box<dyn Fn(ReplyProgress) + Send + 'static>;

/// Progress of a reply that is being received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyProgress {
    /// The service has acknowledged the message and starts streaming.
    Opened,
    /// A text fragment has arrived.
    Fragment(String),
}

/// A completely received reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientReply {
    /// The concatenated fragments.
    pub text: String,
    /// The reason the service finished generating, if it told us.
    pub finish_reason: Option<FinishReason>,
}

trait ProviderObject: Send + Sync + 'static {
    fn create_session(
        &self,
        config: &SessionConfig,
    ) -> BoxedFuture<Result<SessionHandle, ProviderError>>;

    fn send_message(
        &self,
        session: &SessionHandle,
        text: &str,
        on_progress: ProgressFn,
    ) -> BoxedFuture<Result<ClientReply, ProviderError>>;
}

struct AnyProvider<P>(P);

impl<P: ChatProvider + 'static> ProviderObject for AnyProvider<P> {
    fn create_session(
        &self,
        config: &SessionConfig,
    ) -> BoxedFuture<Result<SessionHandle, ProviderError>> {
        let fut = self.0.create_session(config);
        Box::pin(async move {
            fut.await.map_err(|err| {
                warn!("failed to create session: {err:?}");
                Box::new(err) as ProviderError
            })
        })
    }

    fn send_message(
        &self,
        session: &SessionHandle,
        text: &str,
        on_progress: ProgressFn,
    ) -> BoxedFuture<Result<ClientReply, ProviderError>> {
        let fut = self.0.send_message_stream(session, text);
        let session_id = session.id().to_owned();
        Box::pin(
            async move {
                trace!("sending a message");
                let resp_or_err = fut.await;
                handle_response::<P>(resp_or_err, on_progress).await
            }
            .instrument(trace_span!("chat client req", session = %session_id)),
        )
    }
}

/// A wrapper around a chat provider that provides a type-erased
/// interface for the other modules.
#[derive(Clone)]
pub struct ChatClient {
    provider: Arc<dyn ProviderObject>,
}

impl ChatClient {
    /// Wraps the provider.
    #[inline]
    pub fn new<P: ChatProvider + 'static>(provider: P) -> Self {
        Self {
            provider: Arc::new(AnyProvider(provider)),
        }
    }

    /// Opens a new session.
    #[inline]
    pub async fn create_session(
        &self,
        config: &SessionConfig,
    ) -> Result<SessionHandle, ProviderError> {
        self.provider.create_session(config).await
    }

    /// Sends a message and drives the streamed reply to its end.
    ///
    /// `on_progress` is invoked once with [`ReplyProgress::Opened`] when
    /// the service acknowledges the message, then once per fragment in
    /// delivery order.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The reply stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_message(
        &self,
        session: &SessionHandle,
        text: &str,
        on_progress: impl Fn(ReplyProgress) + Send + 'static,
    ) -> Result<ClientReply, ProviderError> {
        self.provider
            .send_message(session, text, Box::new(on_progress))
            .await
    }
}

async fn handle_response<P: ChatProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_progress: ProgressFn,
) -> Result<ClientReply, ProviderError> {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };
    on_progress(ReplyProgress::Opened);

    let mut text = String::new();
    let mut finish_reason = None;

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ChatResponseEvent::Fragment(fragment) => {
                text.push_str(&fragment);
                on_progress(ReplyProgress::Fragment(fragment));
            }
            ChatResponseEvent::Completed(reason) => {
                finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(ClientReply {
        text,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use cloudsec_tutor_model::ErrorKind;
    use cloudsec_tutor_test_model::{
        PresetEvent, PresetReply, TestChatProvider,
    };

    use super::*;

    fn session_config() -> SessionConfig {
        SessionConfig::new("test-model", "Be brief.")
    }

    #[tokio::test]
    async fn test_send_message() {
        let mut provider = TestChatProvider::default();
        for _ in 0..3 {
            provider.add_reply(PresetReply::with_fragments([
                "How ", "are ", "you?",
            ]));
        }

        let client = ChatClient::new(provider);
        let session = client.create_session(&session_config()).await.unwrap();

        for _ in 0..3 {
            let progress = Arc::new(Mutex::new(Vec::new()));
            let reply = client
                .send_message(&session, "Hi", {
                    let progress = Arc::clone(&progress);
                    move |p| progress.lock().unwrap().push(p)
                })
                .await
                .unwrap();
            assert_eq!(reply.text, "How are you?");
            assert_eq!(reply.finish_reason, Some(FinishReason::Stop));
            assert_eq!(
                *progress.lock().unwrap(),
                [
                    ReplyProgress::Opened,
                    ReplyProgress::Fragment("How ".to_owned()),
                    ReplyProgress::Fragment("are ".to_owned()),
                    ReplyProgress::Fragment("you?".to_owned()),
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_error_handling() {
        let mut provider = TestChatProvider::default();
        provider.add_reply(PresetReply::with_events([
            PresetEvent::Fragment("Partial".to_owned()),
            PresetEvent::Fail("reset".to_owned()),
        ]));
        let client = ChatClient::new(provider);
        let session = client.create_session(&session_config()).await.unwrap();

        let progress = Arc::new(Mutex::new(Vec::new()));
        let err = client
            .send_message(&session, "Hi", {
                let progress = Arc::clone(&progress);
                move |p| progress.lock().unwrap().push(p)
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(progress.lock().unwrap().len(), 2);

        // The script is exhausted, so the message is refused up front.
        let opened = Arc::new(Mutex::new(false));
        let err = client
            .send_message(&session, "Again", {
                let opened = Arc::clone(&opened);
                move |_| *opened.lock().unwrap() = true
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert!(!*opened.lock().unwrap());
    }

    #[tokio::test]
    async fn test_create_session_error() {
        let mut provider = TestChatProvider::default();
        provider.fail_session_creation();
        let client = ChatClient::new(provider);
        let err = client
            .create_session(&session_config())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }
}
