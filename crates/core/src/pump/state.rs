use std::sync::Arc;

use tracing::Instrument;

use super::mailbox::{Command, Mailbox};
use crate::FAILURE_NOTICE;
use crate::chat_client::{ClientReply, ProviderError, ReplyProgress};
use crate::session::SessionManager;
use crate::transcript::{Message, Transcript};

/// The stage of the current exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Waiting for user input.
    #[default]
    Idle,
    /// The user message is appended and the request is on its way.
    Sending,
    /// The reply placeholder is appended and fragments are arriving.
    Streaming,
    /// The exchange has ended, successfully or not.
    Settled,
}

impl Stage {
    /// Returns whether an exchange is in flight.
    #[inline]
    pub fn is_busy(self) -> bool {
        matches!(self, Stage::Sending | Stage::Streaming)
    }
}

/// A change the view should render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PumpEvent {
    /// The pump has moved to another stage.
    StageChanged(Stage),
    /// A message has been appended. The view should scroll to it.
    MessageAppended {
        /// Position of the message in the transcript.
        index: usize,
        /// The message as appended.
        message: Message,
    },
    /// The text of the newest message has changed.
    MessageUpdated {
        /// Position of the message in the transcript.
        index: usize,
        /// The message after the change.
        message: Message,
    },
}

/// A point-in-time view of the pump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PumpSnapshot {
    /// The current stage.
    pub stage: Stage,
    /// A copy of the transcript.
    pub transcript: Transcript,
}

pub(crate) type EventFn = Box<dyn Fn(PumpEvent) + Send + Sync>;

pub(crate) struct PumpState {
    sessions: Arc<SessionManager>,
    transcript: Transcript,
    stage: Stage,
    // Identifier of the newest exchange.
    exchange: u64,
    fragments_received: usize,
    on_event: Option<EventFn>,
}

impl PumpState {
    pub fn new(
        sessions: Arc<SessionManager>,
        transcript: Transcript,
        on_event: Option<EventFn>,
    ) -> Self {
        Self {
            sessions,
            transcript,
            stage: Stage::Idle,
            exchange: 0,
            fragments_received: 0,
            on_event,
        }
    }

    pub fn handle(&mut self, cmd: Command, mailbox: &Mailbox) {
        match cmd {
            Command::Submit(text) => self.submit(text, mailbox),
            Command::Snapshot(tx) => {
                tx.send(PumpSnapshot {
                    stage: self.stage,
                    transcript: self.transcript.clone(),
                })
                .ok();
            }
            Command::StreamOpened { exchange } => {
                self.stream_opened(exchange);
            }
            Command::FragmentReceived { exchange, fragment } => {
                self.fragment_received(exchange, &fragment);
            }
            Command::ExchangeSettled { exchange, outcome } => {
                self.exchange_settled(exchange, outcome);
            }
        }
    }

    fn submit(&mut self, text: String, mailbox: &Mailbox) {
        if text.trim().is_empty() {
            trace!("ignoring blank input");
            return;
        }
        if self.stage != Stage::Idle {
            debug!("exchange {} is in flight, input ignored", self.exchange);
            return;
        }
        let Some(session) = self.sessions.current() else {
            debug!("no session available, input ignored");
            return;
        };

        self.exchange += 1;
        self.fragments_received = 0;
        let exchange = self.exchange;

        self.append(Message::user(text.clone()));
        self.set_stage(Stage::Sending);

        let client = self.sessions.client().clone();
        let mailbox = mailbox.clone();
        tokio::spawn(
            async move {
                let progress_mailbox = mailbox.clone();
                let outcome = client
                    .send_message(&session, &text, move |progress| {
                        let cmd = match progress {
                            ReplyProgress::Opened => {
                                Command::StreamOpened { exchange }
                            }
                            ReplyProgress::Fragment(fragment) => {
                                Command::FragmentReceived { exchange, fragment }
                            }
                        };
                        // Fails only if the pump is gone, and then there is
                        // nobody left to show the fragment to.
                        progress_mailbox.send(cmd).ok();
                    })
                    .await;
                mailbox
                    .send(Command::ExchangeSettled { exchange, outcome })
                    .ok();
            }
            .instrument(debug_span!("exchange", id = exchange)),
        );
    }

    fn stream_opened(&mut self, exchange: u64) {
        if exchange != self.exchange || self.stage != Stage::Sending {
            warn!("unexpected stream start for exchange {exchange}");
            return;
        }
        self.append(Message::assistant(""));
        self.set_stage(Stage::Streaming);
    }

    fn fragment_received(&mut self, exchange: u64, fragment: &str) {
        if exchange != self.exchange || self.stage != Stage::Streaming {
            warn!("discarding fragment of exchange {exchange}");
            return;
        }
        self.fragments_received += 1;
        if let Some(index) = self.transcript.append_to_last(fragment) {
            self.emit_updated(index);
        }
    }

    fn exchange_settled(
        &mut self,
        exchange: u64,
        outcome: Result<ClientReply, ProviderError>,
    ) {
        if exchange != self.exchange || !self.stage.is_busy() {
            warn!("discarding outcome of exchange {exchange}");
            return;
        }

        match outcome {
            Ok(reply) => {
                debug!(
                    "exchange {exchange} finished ({:?}, {} bytes)",
                    reply.finish_reason,
                    reply.text.len()
                );
            }
            Err(err) => {
                warn!("exchange {exchange} failed: {err}");
                self.append_failure_notice();
            }
        }

        self.set_stage(Stage::Settled);
        self.set_stage(Stage::Idle);
    }

    fn append_failure_notice(&mut self) {
        // An empty placeholder becomes the notice itself, so the failed
        // exchange adds a single assistant message. Streamed text is kept.
        if self.stage == Stage::Streaming && self.fragments_received == 0 {
            if let Some(index) = self.transcript.replace_last(FAILURE_NOTICE) {
                self.emit_updated(index);
                return;
            }
        }
        self.append(Message::assistant(FAILURE_NOTICE));
    }

    fn append(&mut self, message: Message) {
        let index = self.transcript.push(message.clone());
        self.emit(PumpEvent::MessageAppended { index, message });
    }

    fn emit_updated(&self, index: usize) {
        if let Some(message) = self.transcript.messages().get(index) {
            self.emit(PumpEvent::MessageUpdated {
                index,
                message: message.clone(),
            });
        }
    }

    fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
        self.emit(PumpEvent::StageChanged(stage));
    }

    #[inline]
    fn emit(&self, event: PumpEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }
}
