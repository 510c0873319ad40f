use std::pin::Pin;
use std::task::{Context, Poll, ready};

use cloudsec_tutor_model::{
    ChatResponse, ChatResponseEvent, ErrorKind, FinishReason,
};
use futures_util::future::BoxFuture;
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Sse;
use crate::proto::{Content, GenerateContentResponse};
use crate::session::GeminiSession;

struct PartialState {
    sse: Sse,
    session: GeminiSession,
    prompt: Content,
    reply: String,
    // Emitted after the fragment carried by the same chunk.
    pending_finish_reason: Option<FinishReason>,
}

impl PartialState {
    #[inline]
    fn finish(self) {
        trace!("committing exchange to {} history", self.session.model());
        self.session.commit(self.prompt, &self.reply);
    }
}

type NextEvent = Result<(Option<ChatResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct GeminiResponse {
        next_event_fut: Option<BoxFuture<'static, NextEvent>>,
    }
}

impl GeminiResponse {
    pub(crate) fn new(sse: Sse, session: GeminiSession, prompt: Content) -> Self {
        let partial_state = PartialState {
            sse,
            session,
            prompt,
            reply: String::new(),
            pending_finish_reason: None,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
        }
    }
}

impl ChatResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ChatResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        match ready!(next_event_fut.as_mut().poll(cx)) {
            Ok((Some(event), partial_state)) => {
                *this.next_event_fut =
                    Some(Box::pin(next_event(partial_state)));
                Poll::Ready(Ok(Some(event)))
            }
            Ok((None, partial_state)) => {
                *this.next_event_fut = None;
                partial_state.finish();
                Poll::Ready(Ok(None))
            }
            Err(err) => {
                // A failed exchange is not recorded in the history.
                *this.next_event_fut = None;
                Poll::Ready(Err(err))
            }
        }
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    if let Some(reason) = partial_state.pending_finish_reason.take() {
        return Ok((Some(ChatResponseEvent::Completed(reason)), partial_state));
    }

    loop {
        let data = match partial_state.sse.next_event().await {
            Ok(Some(data)) => data,
            Ok(None) => break,
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {data}");

        let chunk = serde_json::from_str::<GenerateContentResponse>(&data)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if let Some(detail) = &chunk.error {
            let err = Error::from_detail(detail);
            warn!("stream failed: {err}");
            return Err(err);
        }
        if let Some(reason) = chunk.block_reason() {
            return Err(Error::new(
                format!("prompt blocked: {reason}"),
                ErrorKind::Moderated,
            ));
        }

        partial_state.pending_finish_reason = chunk.finish_reason();
        if let Some(fragment) = chunk.text() {
            partial_state.reply.push_str(&fragment);
            return Ok((
                Some(ChatResponseEvent::Fragment(fragment)),
                partial_state,
            ));
        }
        if let Some(reason) = partial_state.pending_finish_reason.take() {
            return Ok((
                Some(ChatResponseEvent::Completed(reason)),
                partial_state,
            ));
        }
    }

    Ok((None, partial_state))
}
