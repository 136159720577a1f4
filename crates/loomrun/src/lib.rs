//! # Loomrun
//!
//! A full-mesh thread runtime: spawn isolated execution contexts, keep
//! every pair of live contexts linked by a dedicated channel, and make
//! promise-style calls between them.
//!
//! ## Architecture
//!
//! The root context (the hub, always thread id 0) is the one authority for
//! admitting and removing peers. Every other context bootstraps from a
//! setup payload naming its channel endpoints, forwards spawn/kill requests
//! to the hub, and reports its own exit there. All cross-context traffic is
//! `loomwire::Message` values moving through ports; there is no shared
//! mutable state between contexts.
//!
//! ```text
//! Mesh (facade)
//!   ├─ registry    per-peer private state, connect/disconnect lifecycle
//!   ├─ rpc         response correlation, invoke/import dispatch
//!   ├─ hub/peer    the two protocol roles
//!   └─ spawn       host seam (native adapter: OS thread + tokio runtime)
//! ```

pub mod event;
pub mod functions;
pub mod loader;
pub mod mesh;
pub mod native;
pub mod spawn;
pub mod thread;

mod context;
mod dispatch;
mod hub;
mod peer;
mod registry;
mod rpc;

#[cfg(test)]
mod tests;
