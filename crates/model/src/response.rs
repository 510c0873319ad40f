use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::provider::ChatProviderError;

/// A streamed reply from the chat provider.
pub trait ChatResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ChatProviderError;

    /// Attempts to pull out the next event from the reply.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct reply state:
    ///
    /// - `Poll::Pending` means that this reply is still waiting for the
    ///   next event. Implementations will ensure that the current task
    ///   will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the reply has an event to
    ///   deliver, and may produce further events on subsequent
    ///   `poll_next_event` calls.
    /// - `Poll::Ready(Ok(None))` means the reply has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   streaming the reply.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ChatResponseEvent>, Self::Error>>;
}

/// The reason why a reply has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinishReason {
    /// The model has finished generating text.
    Stop,
    /// The reply hit the output token limit.
    Length,
    /// The reply was cut by the service's content filters.
    ContentFilter,
    /// Any other reasons reported by the service.
    Other,
}

/// The event from a streamed reply.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatResponseEvent {
    /// Received a text fragment.
    Fragment(String),
    /// The reply has been completed.
    Completed(FinishReason),
}
