//! # Message Service Security
//!
//! Authenticated encryption of message content at rest.

pub mod cipher;

pub use cipher::{CipherError, ContentCipher, Envelope};
