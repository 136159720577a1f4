//! # Mesh Facade
//!
//! The per-context entry point. A `Mesh` is thin orchestration over the
//! registry, the correlation engine, and the role-specific coordinator:
//! validation happens eagerly and locally, everything after the first
//! message write surfaces as the call's asynchronous rejection.

use std::sync::Arc;

use tokio::sync::broadcast;

use loomwire::message::ThreadId;
use loomwire::port::PortToken;
use loomwire::value::Value;

use crate::context::MeshCtx;
use crate::event::MeshEvent;
use crate::functions::Callable;
use crate::functions::SyncFn;
use crate::hub;
use crate::loader::ModuleLoader;
use crate::loader::NullLoader;
use crate::native::NativeHost;
use crate::peer;
use crate::spawn::SpawnWorker;
use crate::thread;
use crate::thread::Thread;

type BootHook = Arc<dyn Fn(Mesh) + Send + Sync>;

/// Configures and starts a root context.
pub struct MeshBuilder {
    loader: Arc<dyn ModuleLoader>,
    boot: Option<BootHook>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self {
            loader: Arc::new(NullLoader),
            boot: None,
        }
    }

    /// The module loader used by this context and inherited by every
    /// spawned worker.
    pub fn loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    /// A hook run inside every spawned worker once its mesh is up. A panic
    /// in the hook closes that worker with exit code 1.
    pub fn on_worker_boot(mut self, hook: impl Fn(Mesh) + Send + Sync + 'static) -> Self {
        self.boot = Some(Arc::new(hook));
        self
    }

    /// Starts the root context on the native host adapter.
    pub fn build(self) -> Mesh {
        let spawner = Arc::new(NativeHost::new(Arc::clone(&self.loader), self.boot));
        Mesh::from_ctx(MeshCtx::new_hub(spawner, self.loader))
    }

    /// Starts the root context with a custom spawn primitive.
    pub fn build_with(self, spawner: Arc<dyn SpawnWorker>) -> Mesh {
        Mesh::from_ctx(MeshCtx::new_hub(spawner, self.loader))
    }
}

impl Default for MeshBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the current context's mesh.
#[derive(Clone)]
pub struct Mesh {
    pub(crate) ctx: Arc<MeshCtx>,
}

impl Mesh {
    pub(crate) fn from_ctx(ctx: Arc<MeshCtx>) -> Self {
        Self { ctx }
    }

    pub fn builder() -> MeshBuilder {
        MeshBuilder::new()
    }

    /// This context's own thread id.
    pub fn id(&self) -> ThreadId {
        self.ctx.id
    }

    /// True in the root context, false in every worker.
    pub fn is_root(&self) -> bool {
        self.ctx.is_root()
    }

    /// The data this context was spawned with. `Unit` on the root.
    pub fn worker_data(&self) -> &Value {
        &self.ctx.worker_data
    }

    /// The handle to the root context, or `None` on the root itself.
    pub fn main_thread(&self) -> Option<Thread> {
        self.ctx.peer().and_then(|peer| peer.main_thread())
    }

    /// Spawns a new context and resolves with its handle once it is meshed
    /// with every live peer. Forwarded to the hub when called off the root.
    pub async fn create(&self, worker_data: Value) -> thread::Result<Thread> {
        if self.ctx.shutdown.is_cancelled() {
            return Err(thread::Error::Closed);
        }
        let worker_data = loomwire::sendable::into_sendable(worker_data, &[])?;

        if self.ctx.is_root() {
            hub::create_peer(&self.ctx, worker_data).await
        } else {
            peer::create_via_hub(&self.ctx, worker_data).await
        }
    }

    /// The live handle for an id, or `None`; a miss is a normal outcome,
    /// the peer may have just disconnected.
    pub fn get_thread(&self, id: ThreadId) -> Option<Thread> {
        self.ctx.registry.get(id).map(|state| state.thread.clone())
    }

    /// A snapshot of every live handle at call time.
    pub fn all_threads(&self) -> Vec<Thread> {
        self.ctx
            .registry
            .snapshot()
            .into_iter()
            .map(|state| state.thread.clone())
            .collect()
    }

    /// Makes a callable reachable from other contexts under `function_id`,
    /// replacing any prior registration.
    pub fn expose(&self, function_id: impl Into<String>, callable: Arc<dyn Callable>) {
        self.ctx.functions.expose(function_id.into(), callable);
    }

    /// Convenience for exposing a synchronous closure.
    pub fn expose_fn(
        &self,
        function_id: impl Into<String>,
        f: impl Fn(Vec<Value>) -> std::result::Result<Value, Value> + Send + Sync + 'static,
    ) {
        self.expose(function_id, Arc::new(SyncFn(f)));
    }

    /// Removes an exposed callable, reporting whether one existed.
    pub fn unexpose(&self, function_id: &str) -> bool {
        self.ctx.functions.unexpose(function_id)
    }

    /// Registers ports to move with the next outbound invocation reply from
    /// this context.
    pub fn transfer_on_reply(&self, tokens: Vec<PortToken>) {
        self.ctx.push_reply_transfer(tokens);
    }

    /// Subscribes to lifecycle notifications. Events fire after the
    /// registry mutation they describe.
    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.ctx.events.subscribe()
    }

    /// This context's own exit code, once it is closing.
    pub fn exit_code(&self) -> Option<i32> {
        self.ctx.exit_code.get().copied()
    }

    /// The close entry point. On a worker: report the exit to the hub, then
    /// stop. On the root: cascade, where every peer observes the full teardown
    /// before its context is released.
    pub async fn close(&self, exit_code: i32) {
        if self.ctx.is_root() {
            hub::close_mesh(&self.ctx, exit_code).await;
        } else {
            peer::close(&self.ctx, exit_code);
        }
    }
}
