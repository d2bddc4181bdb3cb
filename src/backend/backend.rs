//! The backend contract.
//!
//! A `Backend` instance is a handle to one execution context of a compute
//! device (e.g. one device/stream). The generic engine drives every device
//! through this trait: it allocates through the default buffer type, moves
//! data synchronously through buffers or asynchronously through the
//! backend, executes graphs directly or through compiled plans, and orders
//! work across backends with events.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{Buffer, BufferType, Event};
use crate::error::{ForgeResult, TensorForgeError};
use crate::graph::{Graph, Op, TensorDesc};

static NEXT_GUID: AtomicU64 = AtomicU64::new(1);

/// Process-unique backend identity token.
///
/// Instances compare by identity; two backends of the same kind get
/// distinct guids. Events carry the guid of their creating backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendGuid(u64);

impl BackendGuid {
    /// Allocate a fresh process-unique identity.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        BackendGuid(NEXT_GUID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for BackendGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of graph execution.
///
/// Execution reports rather than raises: the caller decides whether a
/// non-success status is fatal or retryable under a different placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeStatus {
    Success,
    Failed(String),
    Aborted,
}

impl ComputeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ComputeStatus::Success)
    }
}

/// Opaque, backend-owned execution schedule compiled from one graph
/// topology. Only the creating backend can interpret its contents.
pub trait GraphPlan: Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Execution context handle for one compute device.
///
/// Optional capabilities (async transfer, graph plans, events) are gated by
/// `has_*` queries; their default bodies implement the documented fallback
/// so engines that skip the query still get correct, synchronous behavior.
/// Instances are driven by one thread; enqueued work on one backend runs in
/// FIFO order, and ordering across backends exists only through events.
pub trait Backend: Send {
    /// Process-unique identity of this instance.
    fn guid(&self) -> BackendGuid;

    fn name(&self) -> &str;

    /// Fallback placement strategy; every backend must supply one.
    fn default_buffer_type(&self) -> Arc<dyn BufferType>;

    /// True when the `*_async` transfers actually enqueue instead of using
    /// the synchronous fallback bodies.
    fn has_async(&self) -> bool {
        false
    }

    /// Enqueue a tensor write without blocking; completion is guaranteed
    /// only after `synchronize`. The default body performs the synchronous
    /// buffer-level write.
    fn set_tensor_async(
        &mut self,
        buffer: &mut Buffer,
        desc: &TensorDesc,
        data: &[u8],
        offset: usize,
    ) -> ForgeResult<()> {
        buffer.set_tensor(desc, data, offset)
    }

    /// Enqueue a tensor read without blocking; the destination holds the
    /// bytes only after `synchronize`. The default body performs the
    /// synchronous buffer-level read.
    fn get_tensor_async(
        &mut self,
        buffer: &Buffer,
        desc: &TensorDesc,
        data: &mut [u8],
        offset: usize,
    ) -> ForgeResult<()> {
        buffer.get_tensor(desc, data, offset)
    }

    /// Enqueue a cross-backend tensor copy. `Ok(false)` means the pairing
    /// is unsupported; the engine then falls back to the generic staged
    /// copy plus explicit synchronization.
    fn cpy_tensor_async(
        &mut self,
        _dst_backend: &mut dyn Backend,
        _src_buf: &Buffer,
        _src_desc: &TensorDesc,
        _dst_buf: &mut Buffer,
        _dst_desc: &TensorDesc,
    ) -> ForgeResult<bool> {
        Ok(false)
    }

    /// Block until all previously enqueued work on this backend completes.
    /// Required before trusting async results or cross-backend dependencies
    /// not mediated by an event.
    fn synchronize(&mut self) -> ForgeResult<()>;

    /// True when this backend compiles graph plans.
    fn has_graph_plan(&self) -> bool {
        false
    }

    /// Compile an execution plan from a graph topology.
    fn graph_plan_create(&mut self, _graph: &Graph) -> ForgeResult<Box<dyn GraphPlan>> {
        Err(TensorForgeError::Unsupported(
            "graph plans are not provided by this backend".to_string(),
        ))
    }

    /// Refresh a plan in place with a topologically unchanged graph;
    /// cheaper than compiling a new plan.
    fn graph_plan_update(
        &mut self,
        _plan: &mut dyn GraphPlan,
        _graph: &Graph,
    ) -> ForgeResult<()> {
        Err(TensorForgeError::Unsupported(
            "graph plans are not provided by this backend".to_string(),
        ))
    }

    /// Execute a compiled plan.
    fn graph_plan_compute(&mut self, _plan: &mut dyn GraphPlan) -> ComputeStatus {
        ComputeStatus::Failed("graph plans are not provided by this backend".to_string())
    }

    /// Execute a graph directly, recomputing internal scheduling each call.
    /// This is the primary execution path; plans are a faster-path
    /// extension.
    fn graph_compute(&mut self, graph: &Graph) -> ComputeStatus;

    /// Can this backend run `op` given the operand shapes/types? Pure;
    /// queried per-operation during scheduling.
    fn supports_op(&self, op: &Op, inputs: &[&TensorDesc]) -> bool;

    /// Can this backend operate directly on tensors placed in `buft`
    /// without staging?
    fn supports_buft(&self, buft: &dyn BufferType) -> bool;

    /// Would moving this operation's operands here still win even though
    /// they are not currently resident? Reserved for operations whose
    /// compute cost dominates transfer cost (e.g. large-batch MatMul).
    fn offload_op(&self, _op: &Op, _inputs: &[&TensorDesc]) -> bool {
        false
    }

    /// True when this backend provides event synchronization.
    fn has_events(&self) -> bool {
        false
    }

    /// Create an event bound to this backend.
    fn event_new(&mut self) -> ForgeResult<Event> {
        Err(TensorForgeError::Unsupported(
            "events are not provided by this backend".to_string(),
        ))
    }

    /// Record the current point in this backend's order. Only the creating
    /// backend may record, and only once.
    fn event_record(&mut self, _event: &Event) -> ForgeResult<()> {
        Err(TensorForgeError::Unsupported(
            "events are not provided by this backend".to_string(),
        ))
    }

    /// Insert a dependency so this backend's later operations do not begin
    /// before the event's recorded point. Called on a backend other than
    /// the recorder; the sole cross-backend ordering primitive.
    fn event_wait(&mut self, _event: &Event) -> ForgeResult<()> {
        Err(TensorForgeError::Unsupported(
            "events are not provided by this backend".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guids_are_unique() {
        let a = BackendGuid::new();
        let b = BackendGuid::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_guid_display() {
        let g = BackendGuid::new();
        assert!(g.to_string().starts_with('#'));
    }

    #[test]
    fn test_compute_status_predicates() {
        assert!(ComputeStatus::Success.is_success());
        assert!(!ComputeStatus::Failed("boom".to_string()).is_success());
        assert!(!ComputeStatus::Aborted.is_success());
    }
}
