//! # Loomwire
//!
//! The wire layer of the loom mesh: dynamic values, transferable port
//! endpoints, and the closed message protocol exchanged between execution
//! contexts.
//!
//! ## Philosophy
//!
//! - **Closed Protocol**: Every byte of meaning between contexts is one of
//!   the nine `Message` kinds. There is no side channel.
//! - **Capability Ports**: A `Port` is the unforgeable capability to talk to
//!   a peer. No message carries a secret; holding the endpoint is the
//!   authorization.
//! - **Move Is Transfer**: Values cross channels by ownership transfer. The
//!   `sendable` module enforces the same contract a structured-clone
//!   boundary would: plain data always passes, ports pass only when listed
//!   for transfer.

pub mod message;
pub mod port;
pub mod sendable;
pub mod value;
