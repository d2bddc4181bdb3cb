//! Host reference backend.
//!
//! A complete, host-memory implementation of the backend contract: real
//! byte storage behind the buffer interface, an optional FIFO worker queue
//! for asynchronous transfers, one-shot events for cross-backend ordering,
//! graph plans, and f32 execution of the vocabulary operations. It serves
//! as the fallback placement target and as the reference implementation the
//! test suites drive the contract with.

mod backend;
mod buffer_type;
mod execution;
mod queue;

pub use backend::HostBackend;
pub use buffer_type::HostBufferType;

use crate::backend::registry::{BackendInitFn, BackendRegistry};
use crate::error::ForgeResult;
use std::sync::Arc;

/// Name under which the host backend registers itself.
pub const HOST_BACKEND_NAME: &str = "host";

/// Register the host backend. The parameter string at resolution time
/// selects the transfer mode: empty for synchronous-only, `"async"` to
/// enable the worker queue (and with it events).
pub fn register(registry: &mut BackendRegistry) -> ForgeResult<()> {
    let init: BackendInitFn = Arc::new(|params, _user_data| {
        let backend = HostBackend::new();
        if params == "async" {
            Ok(Box::new(backend.with_async_queue()?) as Box<dyn crate::backend::Backend>)
        } else {
            Ok(Box::new(backend) as Box<dyn crate::backend::Backend>)
        }
    });
    // A standalone buffer type: usable for placement before (or without)
    // any backend instance existing.
    let default_buft = Arc::new(HostBufferType::standalone());
    registry.register(HOST_BACKEND_NAME, init, default_buft, None)
}
