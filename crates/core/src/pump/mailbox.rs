use std::fmt::{self, Debug};
use std::sync::{Arc, Weak};

use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use super::state::{PumpSnapshot, PumpState};
use crate::chat_client::{ClientReply, ProviderError};

pub(crate) enum Command {
    Submit(String),
    Snapshot(oneshot::Sender<PumpSnapshot>),
    StreamOpened {
        exchange: u64,
    },
    FragmentReceived {
        exchange: u64,
        fragment: String,
    },
    ExchangeSettled {
        exchange: u64,
        outcome: Result<ClientReply, ProviderError>,
    },
}

impl Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Submit(text) => {
                f.debug_tuple("Submit").field(&text.len()).finish()
            }
            Command::Snapshot(_) => f.write_str("Snapshot"),
            Command::StreamOpened { exchange } => f
                .debug_struct("StreamOpened")
                .field("exchange", exchange)
                .finish(),
            Command::FragmentReceived { exchange, fragment } => f
                .debug_struct("FragmentReceived")
                .field("exchange", exchange)
                .field("len", &fragment.len())
                .finish(),
            Command::ExchangeSettled { exchange, outcome } => f
                .debug_struct("ExchangeSettled")
                .field("exchange", exchange)
                .field("ok", &outcome.is_ok())
                .finish(),
        }
    }
}

/// The pump is dead and can't take commands anymore.
#[derive(Debug)]
pub(crate) struct PumpClosed;

struct Inner {
    cmd_tx: mpsc::UnboundedSender<Command>,
    kill_tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub(crate) struct Mailbox {
    inner: Arc<Inner>,
}

impl Mailbox {
    /// Spawns the pump task that owns `state`.
    pub fn spawn(state: PumpState) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = watch::channel(false);
        let inner = Arc::new(Inner { cmd_tx, kill_tx });
        tokio::spawn(
            run_pump(Arc::downgrade(&inner), state, cmd_rx, kill_rx)
                .instrument(debug_span!("message pump")),
        );
        Self { inner }
    }

    #[inline]
    pub fn send(&self, cmd: Command) -> Result<(), PumpClosed> {
        self.inner.cmd_tx.send(cmd).map_err(|_| PumpClosed)
    }

    #[inline]
    pub fn kill(&self) {
        self.inner.kill_tx.send(true).ok();
    }
}

async fn run_pump(
    inner: Weak<Inner>,
    mut state: PumpState,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut kill_rx: watch::Receiver<bool>,
) {
    debug!("started");
    loop {
        let cmd = select! {
            biased;

            _ = kill_rx.changed() => {
                break;
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                cmd
            }
        };
        trace!("received command: {cmd:?}");

        let Some(inner) = inner.upgrade() else {
            warn!("last handle has been dropped, discard the command");
            break;
        };
        state.handle(cmd, &Mailbox { inner });
    }
    debug!("will terminate");
}
