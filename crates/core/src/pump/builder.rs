use std::sync::Arc;

use super::MessagePump;
use super::mailbox::Mailbox;
use super::state::{EventFn, PumpEvent, PumpState};
use crate::session::SessionManager;
use crate::transcript::{Message, Transcript};

/// [`MessagePump`] builder.
pub struct MessagePumpBuilder {
    sessions: Arc<SessionManager>,
    greeting: Option<String>,
    on_event: Option<EventFn>,
}

impl MessagePumpBuilder {
    /// Creates a new builder whose pump sends messages through the
    /// session of `sessions`.
    #[inline]
    pub fn with_session_manager(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            greeting: None,
            on_event: None,
        }
    }

    /// Seeds the transcript with an assistant greeting.
    #[inline]
    pub fn with_greeting<S: Into<String>>(mut self, greeting: S) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Attaches a callback to be invoked on every change the view should
    /// render.
    ///
    /// The callback runs on the pump task and must not block.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(PumpEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Spawns the pump.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn build(self) -> MessagePump {
        let Self {
            sessions,
            greeting,
            on_event,
        } = self;

        let mut transcript = Transcript::default();
        if let Some(greeting) = greeting {
            transcript.push(Message::assistant(greeting));
        }
        let state = PumpState::new(sessions, transcript, on_event);
        MessagePump {
            mailbox: Mailbox::spawn(state),
        }
    }
}
