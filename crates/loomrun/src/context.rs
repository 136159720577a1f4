//! # Mesh Context
//!
//! The explicit per-context state: both registries, the response counter,
//! the role-specific half (hub or peer), the event channel, the loader, and
//! the shutdown token. Constructed once when a context starts and passed by
//! `Arc` into dispatch and the facade, never reached through ambient
//! global state.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use loomwire::message::ResponseId;
use loomwire::message::ThreadId;
use loomwire::port::PortToken;
use loomwire::value::Value;

use crate::event::MeshEvent;
use crate::functions::FunctionRegistry;
use crate::hub::HubState;
use crate::loader::ModuleLoader;
use crate::peer::PeerState;
use crate::registry::ThreadRegistry;
use crate::spawn::SpawnWorker;

const EVENT_CAPACITY: usize = 256;

/// Which half of the protocol this context speaks.
pub(crate) enum Role {
    Hub(HubState),
    Peer(PeerState),
}

pub(crate) struct MeshCtx {
    pub(crate) id: ThreadId,
    pub(crate) worker_data: Value,
    pub(crate) role: Role,
    pub(crate) registry: ThreadRegistry,
    pub(crate) functions: FunctionRegistry,
    pub(crate) loader: Arc<dyn ModuleLoader>,
    pub(crate) events: broadcast::Sender<MeshEvent>,
    /// Ports to move with the next outbound invocation reply.
    pub(crate) reply_transfer: Mutex<Vec<PortToken>>,
    /// Cancelled when this context itself is done.
    pub(crate) shutdown: CancellationToken,
    /// This context's own exit code, set once on the way out.
    pub(crate) exit_code: OnceLock<i32>,
    next_response_id: AtomicU64,
}

impl MeshCtx {
    pub(crate) fn new_hub(spawner: Arc<dyn SpawnWorker>, loader: Arc<dyn ModuleLoader>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            id: ThreadId::ROOT,
            worker_data: Value::Unit,
            role: Role::Hub(HubState::new(spawner)),
            registry: ThreadRegistry::new(),
            functions: FunctionRegistry::new(),
            loader,
            events,
            reply_transfer: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            exit_code: OnceLock::new(),
            next_response_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn new_peer(
        id: ThreadId,
        worker_data: Value,
        loader: Arc<dyn ModuleLoader>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            id,
            worker_data,
            role: Role::Peer(PeerState::new()),
            registry: ThreadRegistry::new(),
            functions: FunctionRegistry::new(),
            loader,
            events,
            reply_transfer: Mutex::new(Vec::new()),
            shutdown,
            exit_code: OnceLock::new(),
            next_response_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn is_root(&self) -> bool {
        matches!(self.role, Role::Hub(_))
    }

    pub(crate) fn hub(&self) -> Option<&HubState> {
        match &self.role {
            Role::Hub(hub) => Some(hub),
            Role::Peer(_) => None,
        }
    }

    pub(crate) fn peer(&self) -> Option<&PeerState> {
        match &self.role {
            Role::Hub(_) => None,
            Role::Peer(peer) => Some(peer),
        }
    }

    /// Allocates the next response correlation id. Monotonic, never reused
    /// within a process lifetime.
    pub(crate) fn next_response_id(&self) -> ResponseId {
        ResponseId(self.next_response_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Drains the transfer list registered for the next outbound reply.
    pub(crate) fn take_reply_transfer(&self) -> Vec<PortToken> {
        let mut slot = self.reply_transfer.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *slot)
    }

    pub(crate) fn push_reply_transfer(&self, tokens: Vec<PortToken>) {
        let mut slot = self.reply_transfer.lock().unwrap_or_else(|e| e.into_inner());
        slot.extend(tokens);
    }

    pub(crate) fn emit(&self, event: MeshEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
