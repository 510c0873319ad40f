use std::error::Error;

use crate::error::ErrorKind;
use crate::request::SessionConfig;
use crate::response::ChatResponse;
use crate::session::SessionHandle;

/// The error type for a chat provider.
pub trait ChatProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a generative-text service which can hold
/// conversations.
///
/// The provider itself should behave like a stateless object. All the
/// conversation state lives behind the [`SessionHandle`]s it creates, and
/// the provider should be prepared for being dropped anytime.
pub trait ChatProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ChatProviderError;

    /// The streamed reply type for this provider.
    type Response: ChatResponse<Error = Self::Error>;

    /// Opens a new conversation session.
    ///
    /// Every call must produce a distinct session. Callers are responsible
    /// for reusing the handle if they only want one conversation.
    fn create_session(
        &self,
        config: &SessionConfig,
    ) -> impl Future<Output = Result<SessionHandle, Self::Error>> + Send + 'static;

    /// Sends a user message into the session and starts streaming the
    /// reply.
    ///
    /// The returned future resolves once the service has acknowledged the
    /// request. Handles created by other providers must be rejected with
    /// an error instead of panicking.
    fn send_message_stream(
        &self,
        session: &SessionHandle,
        text: &str,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
