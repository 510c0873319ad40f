//! The message pump drives exchanges with the chat service and folds the
//! streamed replies into the transcript.
//!
//! The pump runs as a single task that owns the transcript. Everything
//! that touches the transcript, user input and stream progress alike, is
//! delivered to that task as a command and handled in arrival order, so
//! no locking is involved.

mod builder;
mod mailbox;
mod state;
#[cfg(test)]
mod tests;

pub use builder::MessagePumpBuilder;
use mailbox::{Command, Mailbox};
pub use state::{PumpEvent, PumpSnapshot, Stage};
use tokio::sync::oneshot;

/// A handle to a running message pump.
///
/// Only one exchange is in flight at a time. Input submitted while an
/// exchange is sending or streaming is ignored, not queued.
#[derive(Clone)]
pub struct MessagePump {
    mailbox: Mailbox,
}

impl MessagePump {
    /// Submits user input.
    ///
    /// The input is ignored if it is blank, if no session is available, or
    /// if another exchange is in flight.
    pub fn submit<S: Into<String>>(&self, text: S) {
        if self.mailbox.send(Command::Submit(text.into())).is_err() {
            warn!("message pump has shut down, input dropped");
        }
    }

    /// Returns the current stage and a copy of the transcript.
    ///
    /// Returns `None` once the pump has shut down.
    pub async fn snapshot(&self) -> Option<PumpSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.mailbox.send(Command::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// Stops the pump.
    ///
    /// An exchange in flight is not cancelled, but whatever it delivers
    /// afterwards is discarded.
    #[inline]
    pub fn shutdown(&self) {
        self.mailbox.kill();
    }
}
