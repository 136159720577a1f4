//! # Function Registry
//!
//! The per-context table of callables reachable through `invoke`. Exposing
//! overwrites, unexposing reports whether an entry existed, and a lookup
//! miss during invocation handling becomes a remote rejection on the wire,
//! never a local panic.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;

use loomwire::value::Value;

/// The future a callable settles with: the resolved value, or the rejection
/// reason sent back to the caller.
pub type CallFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, Value>> + Send + 'static>>;

/// A function another context may invoke by id.
pub trait Callable: Send + Sync {
    fn call(&self, args: Vec<Value>) -> CallFuture;
}

/// Adapts a synchronous closure into a `Callable`.
pub struct SyncFn<F>(pub F);

impl<F> Callable for SyncFn<F>
where
    F: Fn(Vec<Value>) -> std::result::Result<Value, Value> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> CallFuture {
        let outcome = (self.0)(args);
        Box::pin(std::future::ready(outcome))
    }
}

/// Adapts an async closure into a `Callable`.
pub struct FutureFn<F>(pub F);

impl<F, Fut> Callable for FutureFn<F>
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<Value, Value>> + Send + 'static,
{
    fn call(&self, args: Vec<Value>) -> CallFuture {
        Box::pin((self.0)(args))
    }
}

pub(crate) struct FunctionRegistry {
    funcs: DashMap<String, Arc<dyn Callable>>,
}

impl FunctionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            funcs: DashMap::new(),
        }
    }

    /// Registers a callable, replacing any prior registration under the id.
    pub(crate) fn expose(&self, function_id: String, callable: Arc<dyn Callable>) {
        self.funcs.insert(function_id, callable);
    }

    /// Removes a callable, reporting whether an entry existed.
    pub(crate) fn unexpose(&self, function_id: &str) -> bool {
        self.funcs.remove(function_id).is_some()
    }

    pub(crate) fn get(&self, function_id: &str) -> Option<Arc<dyn Callable>> {
        self.funcs.get(function_id).map(|entry| Arc::clone(entry.value()))
    }
}
