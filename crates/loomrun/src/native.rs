//! # Native Host Adapter
//!
//! The concrete spawn primitive: each context is a named OS thread driving
//! its own single-threaded tokio runtime, so a context is cooperative
//! internally and parallel to every other context, with message channels as
//! the only connection between them.

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::loader::ModuleLoader;
use crate::mesh::Mesh;
use crate::peer;
use crate::spawn;
use crate::spawn::SpawnWorker;
use crate::spawn::WorkerHandle;
use crate::spawn::WorkerInit;

type BootHook = Arc<dyn Fn(Mesh) + Send + Sync>;

/// Spawns contexts as OS threads with current-thread tokio runtimes.
pub struct NativeHost {
    loader: Arc<dyn ModuleLoader>,
    boot: Option<BootHook>,
}

impl NativeHost {
    pub fn new(loader: Arc<dyn ModuleLoader>, boot: Option<BootHook>) -> Self {
        Self { loader, boot }
    }
}

impl SpawnWorker for NativeHost {
    fn spawn(&self, init: WorkerInit) -> spawn::Result<WorkerHandle> {
        let cancel = CancellationToken::new();
        let (exit_tx, exit_rx) = oneshot::channel();

        let loader = Arc::clone(&self.loader);
        let boot = self.boot.clone();
        let shutdown = cancel.clone();
        let name = format!("loom-{}", init.thread_id);

        std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        tracing::error!(%err, "worker runtime failed to start");
                        let _ = exit_tx.send(1);
                        return;
                    }
                };

                let exit_code = runtime.block_on(async move {
                    let mesh = peer::bootstrap(init, loader, shutdown.clone());

                    if let Some(hook) = boot {
                        // a crashing worker still reports its exit to the hub
                        let guard = catch_unwind(AssertUnwindSafe(|| hook(mesh.clone())));
                        if guard.is_err() {
                            mesh.close(1).await;
                        }
                    }

                    shutdown.cancelled().await;
                    mesh.exit_code().unwrap_or(0)
                });

                let _ = exit_tx.send(exit_code);
            })
            .map_err(|err| spawn::Error::Spawn(err.to_string()))?;

        Ok(WorkerHandle::new(cancel, exit_rx))
    }
}
