//! Backend registry.
//!
//! An explicitly constructed, append-only table resolving backend names to
//! constructors and default buffer types. The intended lifecycle is:
//! populate once at startup (registration takes `&mut self`, so the borrow
//! checker enforces the single-threaded populate phase), then share by
//! reference, read-only, for the life of the process. There is no removal.

use std::any::Any;
use std::sync::Arc;

use crate::backend::{Backend, BufferType};
use crate::error::{ForgeResult, TensorForgeError};

/// Opaque payload handed back to a backend constructor at resolution time.
pub type BackendUserData = Arc<dyn Any + Send + Sync>;

/// Constructor invoked on resolution. Receives the caller's parameter
/// string (e.g. a device index) and the registered user data.
pub type BackendInitFn =
    Arc<dyn Fn(&str, Option<&BackendUserData>) -> ForgeResult<Box<dyn Backend>> + Send + Sync>;

/// One registered backend module.
pub struct RegistryEntry {
    name: String,
    init: BackendInitFn,
    default_buffer_type: Arc<dyn BufferType>,
    user_data: Option<BackendUserData>,
}

impl RegistryEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_buffer_type(&self) -> &Arc<dyn BufferType> {
        &self.default_buffer_type
    }
}

/// Append-only table of backend modules.
#[derive(Default)]
pub struct BackendRegistry {
    entries: Vec<RegistryEntry>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend module. Duplicate names are rejected so that
    /// resolution can never silently change meaning after startup.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        init: BackendInitFn,
        default_buffer_type: Arc<dyn BufferType>,
        user_data: Option<BackendUserData>,
    ) -> ForgeResult<()> {
        let name = name.into();
        if self.find(&name).is_some() {
            return Err(TensorForgeError::DuplicateBackend(name));
        }
        tracing::info!(backend = %name, "backend registered");
        self.entries.push(RegistryEntry {
            name,
            init,
            default_buffer_type,
            user_data,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn find(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Default buffer type registered for a backend name.
    pub fn default_buffer_type(&self, name: &str) -> Option<Arc<dyn BufferType>> {
        self.find(name).map(|e| e.default_buffer_type.clone())
    }

    /// Construct a new backend instance. Multiple instances under the same
    /// name are allowed (e.g. one per device index carried in `params`).
    pub fn init_backend(&self, name: &str, params: &str) -> ForgeResult<Box<dyn Backend>> {
        let entry = self
            .find(name)
            .ok_or_else(|| TensorForgeError::BackendNotFound(name.to_string()))?;
        tracing::debug!(backend = %name, params, "resolving backend");
        (entry.init)(params, entry.user_data.as_ref())
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("names", &self.names())
            .finish()
    }
}
