//! # Lifecycle Events
//!
//! `Online` fires after a peer's registry entry is inserted, `Exit` after it
//! is removed, so listeners always observe the registry state the event
//! describes.

use crate::thread::Thread;

#[derive(Clone, Debug)]
pub enum MeshEvent {
    /// A peer joined the mesh.
    Online { thread: Thread },
    /// A peer left the mesh.
    Exit { thread: Thread, exit_code: i32 },
}
