//! # mpgate-shared
//!
//! Pure building blocks for the webhook gateway: webhook signature and
//! payload encryption, the inbound message model with its XML/JSON decoder,
//! and the reply model with its passive-reply and active-push encoders.
//!
//! Nothing in this crate performs I/O.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod reply;
pub mod types;
