//! An abstraction layer for hosted generative-text services.
//!
//! This crate establishes the contract between the tutor and the service
//! that actually generates the answers. A service only needs to offer two
//! capabilities: opening a conversation session with a fixed persona, and
//! sending a message into that session while streaming the reply back.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;
mod session;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
pub use session::*;
