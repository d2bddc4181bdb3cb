//! TensorForge - Backend Abstraction Layer
//!
//! A hardware-abstraction layer for executing graphs of numeric operations
//! across heterogeneous compute backends through one uniform contract:
//! buffer types describe allocation strategies, buffers hold tensor bytes,
//! backends move data and execute graphs, events order work across
//! backends, and the registry resolves backend names to constructors.

#![allow(clippy::type_complexity)] // Trait-object constructor signatures

pub mod backend;
pub mod error;
pub mod graph;
pub mod logging;

pub use backend::{
    copy_tensor, Backend, BackendGuid, BackendRegistry, Buffer, BufferStorage, BufferType,
    BufferUsage, ComputeStatus, Event, EventInner, GraphPlan, HostBackend, HostBufferType,
};
pub use error::{ErrorCategory, ForgeResult, TensorForgeError};
pub use graph::{DType, Graph, Node, Op, TensorDesc, TensorId};
pub use logging::init_logging_default;
