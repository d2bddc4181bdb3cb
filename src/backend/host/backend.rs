//! Host backend instance.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::buffer_type::{BindingTable, HostBufferType, HostStorage};
use super::execution;
use super::queue::{HostEvent, WorkQueue};
use crate::backend::{
    Backend, BackendGuid, Buffer, BufferType, ComputeStatus, Event, GraphPlan,
};
use crate::error::{ForgeResult, TensorForgeError};
use crate::graph::{DType, Graph, Op, TensorDesc};

/// Operand element count above which offloading a MatMul to this backend
/// is worth the transfer.
const MATMUL_OFFLOAD_MIN_ELEMS: usize = 1 << 16;

/// One host execution context.
///
/// Multiple instances may coexist; each has its own identity, binding
/// table, and (when enabled) worker queue. Without the queue the instance
/// is synchronous-only: async transfer and event hooks report unavailable
/// and the engine uses the buffer-level equivalents.
pub struct HostBackend {
    guid: BackendGuid,
    name: String,
    buft: Arc<HostBufferType>,
    bindings: BindingTable,
    queue: Option<WorkQueue>,
    abort: Option<Arc<AtomicBool>>,
}

impl HostBackend {
    pub fn new() -> Self {
        let bindings: BindingTable = Arc::new(Mutex::new(HashMap::new()));
        let buft = Arc::new(HostBufferType::new(bindings.clone(), usize::MAX));
        Self {
            guid: BackendGuid::new(),
            name: "host".to_string(),
            buft,
            bindings,
            queue: None,
            abort: None,
        }
    }

    /// Enable the FIFO worker queue, turning on async transfers and events.
    pub fn with_async_queue(mut self) -> ForgeResult<Self> {
        self.queue = Some(WorkQueue::new(&self.name)?);
        Ok(self)
    }

    /// Cap the size of buffers the default buffer type will allocate.
    pub fn with_max_buffer_size(mut self, max: usize) -> Self {
        self.buft = Arc::new(HostBufferType::new(self.bindings.clone(), max));
        self
    }

    /// Install a flag that aborts graph execution between nodes.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    /// Stall the queue for `delay`. Test hook for exercising the ordering
    /// guarantees under slow producers.
    pub fn inject_delay(&mut self, delay: Duration) -> ForgeResult<()> {
        match &mut self.queue {
            Some(queue) => {
                queue.submit(Box::new(move || std::thread::sleep(delay)))?;
                Ok(())
            }
            None => {
                std::thread::sleep(delay);
                Ok(())
            }
        }
    }

    fn execute(&self, graph: &Graph) -> ComputeStatus {
        // Pending queue work may still be writing operands.
        if let Some(queue) = &self.queue {
            if let Err(err) = queue.synchronize() {
                return ComputeStatus::Failed(err.to_string());
            }
        }
        execution::run_graph(&self.bindings, graph, self.abort.as_deref())
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for HostBackend {
    fn guid(&self) -> BackendGuid {
        self.guid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn default_buffer_type(&self) -> Arc<dyn BufferType> {
        self.buft.clone()
    }

    fn has_async(&self) -> bool {
        self.queue.is_some()
    }

    fn set_tensor_async(
        &mut self,
        buffer: &mut Buffer,
        desc: &TensorDesc,
        data: &[u8],
        offset: usize,
    ) -> ForgeResult<()> {
        let Some(queue) = &mut self.queue else {
            return buffer.set_tensor(desc, data, offset);
        };
        let Some(host) = buffer
            .storage()
            .and_then(|s| s.as_any().downcast_ref::<HostStorage>())
        else {
            // Foreign or multi buffer: the synchronous path is the fallback.
            return buffer.set_tensor(desc, data, offset);
        };

        let start = desc
            .byte_offset
            .checked_add(offset)
            .and_then(|s| s.checked_add(data.len()).map(|_| s))
            .ok_or(TensorForgeError::OutOfBounds {
                offset: desc.byte_offset,
                len: data.len(),
                size: buffer.size(),
            })?;
        if start + data.len() > buffer.size() {
            return Err(TensorForgeError::OutOfBounds {
                offset: start,
                len: data.len(),
                size: buffer.size(),
            });
        }

        let cell = host.data.clone();
        let bytes = data.to_vec();
        queue.submit(Box::new(move || {
            if let Ok(mut guard) = cell.lock() {
                guard[start..start + bytes.len()].copy_from_slice(&bytes);
            }
        }))?;
        Ok(())
    }

    fn get_tensor_async(
        &mut self,
        buffer: &Buffer,
        desc: &TensorDesc,
        data: &mut [u8],
        offset: usize,
    ) -> ForgeResult<()> {
        match &self.queue {
            // The queue cannot retain the caller's borrow, so a read
            // completes in place after all previously enqueued work; FIFO
            // order is preserved either way.
            Some(queue) => {
                queue.wait_for(queue.submitted())?;
                buffer.get_tensor(desc, data, offset)
            }
            None => buffer.get_tensor(desc, data, offset),
        }
    }

    fn cpy_tensor_async(
        &mut self,
        _dst_backend: &mut dyn Backend,
        src_buf: &Buffer,
        src_desc: &TensorDesc,
        dst_buf: &mut Buffer,
        dst_desc: &TensorDesc,
    ) -> ForgeResult<bool> {
        let Some(queue) = &mut self.queue else {
            return Ok(false);
        };
        let n = src_desc.byte_size();
        if n != dst_desc.byte_size() {
            return Err(TensorForgeError::CopySizeMismatch {
                src: n,
                dst: dst_desc.byte_size(),
            });
        }
        let (Some(src), Some(dst)) = (
            src_buf
                .storage()
                .and_then(|s| s.as_any().downcast_ref::<HostStorage>()),
            dst_buf
                .storage()
                .and_then(|s| s.as_any().downcast_ref::<HostStorage>()),
        ) else {
            return Ok(false);
        };
        if src_desc.byte_offset + n > src_buf.size() || dst_desc.byte_offset + n > dst_buf.size() {
            return Err(TensorForgeError::OutOfBounds {
                offset: src_desc.byte_offset.max(dst_desc.byte_offset),
                len: n,
                size: src_buf.size().min(dst_buf.size()),
            });
        }

        let src_cell = src.data.clone();
        let dst_cell = dst.data.clone();
        let (src_off, dst_off) = (src_desc.byte_offset, dst_desc.byte_offset);
        queue.submit(Box::new(move || {
            if Arc::ptr_eq(&src_cell, &dst_cell) {
                if let Ok(mut guard) = dst_cell.lock() {
                    guard.copy_within(src_off..src_off + n, dst_off);
                }
            } else if let (Ok(src_guard), Ok(mut dst_guard)) = (src_cell.lock(), dst_cell.lock()) {
                dst_guard[dst_off..dst_off + n].copy_from_slice(&src_guard[src_off..src_off + n]);
            }
        }))?;
        Ok(true)
    }

    fn synchronize(&mut self) -> ForgeResult<()> {
        match &self.queue {
            Some(queue) => queue.synchronize(),
            None => Ok(()),
        }
    }

    fn has_graph_plan(&self) -> bool {
        true
    }

    fn graph_plan_create(&mut self, graph: &Graph) -> ForgeResult<Box<dyn GraphPlan>> {
        tracing::debug!(nodes = graph.nodes.len(), "host graph plan created");
        Ok(Box::new(HostGraphPlan {
            graph: graph.clone(),
        }))
    }

    fn graph_plan_update(&mut self, plan: &mut dyn GraphPlan, graph: &Graph) -> ForgeResult<()> {
        let plan = plan
            .as_any_mut()
            .downcast_mut::<HostGraphPlan>()
            .ok_or_else(|| {
                TensorForgeError::Internal("graph plan belongs to another backend".to_string())
            })?;
        if !plan.graph.same_topology(graph) {
            return Err(TensorForgeError::PlanTopologyMismatch(
                "node or tensor structure changed since plan creation".to_string(),
            ));
        }
        plan.graph = graph.clone();
        Ok(())
    }

    fn graph_plan_compute(&mut self, plan: &mut dyn GraphPlan) -> ComputeStatus {
        match plan.as_any().downcast_ref::<HostGraphPlan>() {
            Some(plan) => self.execute(&plan.graph),
            None => ComputeStatus::Failed("graph plan belongs to another backend".to_string()),
        }
    }

    fn graph_compute(&mut self, graph: &Graph) -> ComputeStatus {
        self.execute(graph)
    }

    fn supports_op(&self, op: &Op, inputs: &[&TensorDesc]) -> bool {
        if op.is_view_op() {
            return true;
        }
        if matches!(op, Op::Copy) {
            return true;
        }
        inputs.iter().all(|desc| desc.dtype == DType::F32)
    }

    fn supports_buft(&self, buft: &dyn BufferType) -> bool {
        buft.is_host()
    }

    fn offload_op(&self, op: &Op, inputs: &[&TensorDesc]) -> bool {
        matches!(op, Op::MatMul)
            && inputs
                .first()
                .is_some_and(|desc| desc.element_count() >= MATMUL_OFFLOAD_MIN_ELEMS)
    }

    fn has_events(&self) -> bool {
        self.queue.is_some()
    }

    fn event_new(&mut self) -> ForgeResult<Event> {
        if self.queue.is_none() {
            return Err(TensorForgeError::Unsupported(
                "events require the async queue".to_string(),
            ));
        }
        Ok(Event::new(self.guid, Arc::new(HostEvent::new())))
    }

    fn event_record(&mut self, event: &Event) -> ForgeResult<()> {
        if event.owner() != self.guid {
            return Err(TensorForgeError::EventBackendMismatch {
                owner: event.owner(),
                caller: self.guid,
            });
        }
        let queue = self.queue.as_mut().ok_or_else(|| {
            TensorForgeError::Unsupported("events require the async queue".to_string())
        })?;
        let inner = event.inner().clone();
        let host_event = inner
            .as_any()
            .downcast_ref::<HostEvent>()
            .ok_or_else(|| TensorForgeError::Internal("foreign event state".to_string()))?;
        host_event.mark_recorded()?;

        // The reached point passes when the queue drains everything
        // submitted before this record.
        queue.submit(Box::new(move || {
            if let Some(ev) = inner.as_any().downcast_ref::<HostEvent>() {
                ev.mark_reached();
            }
        }))?;
        Ok(())
    }

    fn event_wait(&mut self, event: &Event) -> ForgeResult<()> {
        if !event.is_recorded() {
            return Err(TensorForgeError::EventNotRecorded);
        }
        if event.inner().as_any().downcast_ref::<HostEvent>().is_none() {
            return Err(TensorForgeError::Internal("foreign event state".to_string()));
        }
        if event.owner() == self.guid {
            // Same queue: FIFO order already places later work after the
            // recorded point.
            tracing::debug!("event_wait on the recording backend is a no-op");
            return Ok(());
        }
        match &mut self.queue {
            Some(queue) => {
                let inner = event.inner().clone();
                queue.submit(Box::new(move || {
                    if let Some(ev) = inner.as_any().downcast_ref::<HostEvent>() {
                        let _ = ev.wait_reached();
                    }
                }))?;
                Ok(())
            }
            // A synchronous backend's "later operations" begin when the
            // caller resumes, so block here.
            None => event.synchronize(),
        }
    }
}

/// Compiled schedule for the host backend: the validated graph snapshot.
struct HostGraphPlan {
    graph: Graph,
}

impl GraphPlan for HostGraphPlan {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
