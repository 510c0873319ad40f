//! An AWS security tutor that streams answers from a generative-text
//! service into a chat widget.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to embed the tutor into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod widget;

pub use widget::*;

/// Re-exports of [`cloudsec_tutor_core`] crate.
pub mod core {
    pub use cloudsec_tutor_core::*;
}
