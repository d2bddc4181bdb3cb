//! Host buffer type and storage.
//!
//! Buffers are backed by heap byte vectors behind `Arc<Mutex<_>>` so the
//! backend's worker queue can reach them after the driving thread moved on.
//! Tensor placements are registered in a binding table shared with the
//! owning backend; that table is the backend-private context graph
//! execution resolves operands through.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::backend::{Buffer, BufferStorage, BufferType};
use crate::error::{ForgeResult, TensorForgeError};
use crate::graph::{TensorDesc, TensorId};

/// Default tensor alignment (matches common SIMD lane requirements).
pub(super) const DEFAULT_ALIGNMENT: usize = 64;

pub(super) type SharedBytes = Arc<Mutex<Vec<u8>>>;

#[derive(Clone)]
pub(super) struct TensorBinding {
    pub data: SharedBytes,
    pub offset: usize,
}

/// Tensor placements visible to the owning backend.
pub(super) type BindingTable = Arc<Mutex<HashMap<TensorId, TensorBinding>>>;

/// Allocation strategy for host memory.
pub struct HostBufferType {
    alignment: usize,
    max_size: usize,
    bindings: BindingTable,
}

impl HostBufferType {
    pub(super) fn new(bindings: BindingTable, max_size: usize) -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            max_size,
            bindings,
        }
    }

    /// Buffer type not tied to a backend instance, for placement that only
    /// needs host storage (e.g. the registry's default entry).
    pub fn standalone() -> Self {
        Self::new(Arc::new(Mutex::new(HashMap::new())), usize::MAX)
    }
}

impl BufferType for HostBufferType {
    fn name(&self) -> &str {
        "host"
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    /// Footprint padded up to the alignment boundary; quantized tensors are
    /// already rounded to whole blocks by `byte_size`.
    fn alloc_size(&self, desc: &TensorDesc) -> usize {
        desc.byte_size().div_ceil(self.alignment) * self.alignment
    }

    fn is_host(&self) -> bool {
        true
    }

    fn alloc_buffer(self: Arc<Self>, size: usize) -> ForgeResult<Buffer> {
        if size > self.max_size {
            return Err(TensorForgeError::OutOfMemory {
                buffer_type: self.name().to_string(),
                requested: size,
                max: self.max_size,
            });
        }
        tracing::debug!(size, "host buffer allocated");
        let storage = HostStorage {
            data: Arc::new(Mutex::new(vec![0u8; size])),
            bound: Vec::new(),
            bindings: self.bindings.clone(),
        };
        Ok(Buffer::new(self, Box::new(storage), size))
    }
}

pub(super) struct HostStorage {
    pub(super) data: SharedBytes,
    /// Tensors currently placed in this buffer.
    bound: Vec<TensorId>,
    bindings: BindingTable,
}

impl HostStorage {
    fn range_check(len: usize, start: usize, n: usize) -> ForgeResult<()> {
        let end = start
            .checked_add(n)
            .ok_or(TensorForgeError::OutOfBounds {
                offset: start,
                len: n,
                size: len,
            })?;
        if end > len {
            return Err(TensorForgeError::OutOfBounds {
                offset: start,
                len: n,
                size: len,
            });
        }
        Ok(())
    }
}

impl BufferStorage for HostStorage {
    fn name(&self) -> &str {
        "host"
    }

    fn base(&self) -> Option<*mut u8> {
        // The vector never reallocates after creation, so the pointer stays
        // valid for the storage's lifetime.
        self.data.lock().ok().map(|guard| guard.as_ptr() as *mut u8)
    }

    fn init_tensor(&mut self, desc: &TensorDesc) -> ForgeResult<()> {
        let mut table = self.bindings.lock()?;
        table.insert(
            desc.id,
            TensorBinding {
                data: self.data.clone(),
                offset: desc.byte_offset,
            },
        );
        if !self.bound.contains(&desc.id) {
            self.bound.push(desc.id);
        }
        Ok(())
    }

    fn set_tensor(&mut self, desc: &TensorDesc, data: &[u8], offset: usize) -> ForgeResult<()> {
        let start = desc.byte_offset + offset;
        let mut guard = self.data.lock()?;
        Self::range_check(guard.len(), start, data.len())?;
        guard[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn get_tensor(&self, desc: &TensorDesc, data: &mut [u8], offset: usize) -> ForgeResult<()> {
        let start = desc.byte_offset + offset;
        let guard = self.data.lock()?;
        Self::range_check(guard.len(), start, data.len())?;
        data.copy_from_slice(&guard[start..start + data.len()]);
        Ok(())
    }

    fn cpy_tensor(
        &mut self,
        src: &Buffer,
        src_desc: &TensorDesc,
        dst_desc: &TensorDesc,
    ) -> ForgeResult<bool> {
        // Direct path only when the source is host storage too.
        let Some(other) = src
            .storage()
            .and_then(|s| s.as_any().downcast_ref::<HostStorage>())
        else {
            return Ok(false);
        };

        let n = src_desc.byte_size();
        if n != dst_desc.byte_size() {
            return Err(TensorForgeError::CopySizeMismatch {
                src: n,
                dst: dst_desc.byte_size(),
            });
        }

        if Arc::ptr_eq(&self.data, &other.data) {
            // Aliasing guard: a copy within one allocation must not take
            // the same lock twice.
            let mut guard = self.data.lock()?;
            Self::range_check(guard.len(), src_desc.byte_offset, n)?;
            Self::range_check(guard.len(), dst_desc.byte_offset, n)?;
            guard.copy_within(
                src_desc.byte_offset..src_desc.byte_offset + n,
                dst_desc.byte_offset,
            );
        } else {
            let src_guard = other.data.lock()?;
            let mut dst_guard = self.data.lock()?;
            Self::range_check(src_guard.len(), src_desc.byte_offset, n)?;
            Self::range_check(dst_guard.len(), dst_desc.byte_offset, n)?;
            dst_guard[dst_desc.byte_offset..dst_desc.byte_offset + n]
                .copy_from_slice(&src_guard[src_desc.byte_offset..src_desc.byte_offset + n]);
        }
        Ok(true)
    }

    fn clear(&mut self, value: u8) -> ForgeResult<()> {
        self.data.lock()?.fill(value);
        Ok(())
    }

    fn reset(&mut self) -> ForgeResult<()> {
        let mut table = self.bindings.lock()?;
        for id in self.bound.drain(..) {
            table.remove(&id);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for HostStorage {
    fn drop(&mut self) {
        // Freeing the buffer unbinds whatever was placed in it.
        if let Ok(mut table) = self.bindings.lock() {
            for id in self.bound.drain(..) {
                table.remove(&id);
            }
        }
    }
}
