//! Backend abstraction: buffer types, buffers, backends, events, and the
//! registry the engine resolves them through.

#[allow(clippy::module_inception)]
pub mod backend;
pub mod buffer;
pub mod event;
pub mod host;
pub mod registry;
pub mod transfer;

pub use backend::{Backend, BackendGuid, ComputeStatus, GraphPlan};
pub use buffer::{Buffer, BufferStorage, BufferType, BufferUsage};
pub use event::{Event, EventInner};
pub use host::{HostBackend, HostBufferType, HOST_BACKEND_NAME};
pub use registry::{BackendInitFn, BackendRegistry, BackendUserData, RegistryEntry};
pub use transfer::copy_tensor;
