//! # Module Loader Seam
//!
//! `import` asks a context to load a module by identifier. What "loading"
//! means belongs to the host, so it sits behind an object-safe async trait;
//! a loader typically exposes functions on the mesh while it runs.

use std::fmt;

use crate::mesh::Mesh;

#[derive(Debug)]
pub enum Error {
    /// No module is known under this identifier.
    UnknownModule(String),
    /// The module was found but failed to load.
    Load(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownModule(id) => write!(f, "module '{}' does not exist", id),
            Self::Load(msg) => write!(f, "module load failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Resolves and loads modules for one context.
#[async_trait::async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, mesh: &Mesh, module_id: &str) -> Result<()>;
}

/// The default loader: every module id is unknown.
pub struct NullLoader;

#[async_trait::async_trait]
impl ModuleLoader for NullLoader {
    async fn load(&self, _mesh: &Mesh, module_id: &str) -> Result<()> {
        Err(Error::UnknownModule(module_id.to_string()))
    }
}
