//! Core logic of the tutor: the session manager, the message pump and
//! the transcript they maintain.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod chat_client;
mod config;
pub mod pump;
mod session;
pub mod transcript;

pub use chat_client::{ChatClient, ClientReply, ProviderError, ReplyProgress};
pub use config::{TutorConfig, TutorConfigBuilder};
pub use pump::{MessagePump, MessagePumpBuilder};
pub use session::SessionManager;

/// The notice appended to the transcript when an exchange fails.
pub const FAILURE_NOTICE: &str = "Error: Could not connect to the AWS Security Assistant. Please check your API key.";
