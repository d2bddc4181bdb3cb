//! Buffer types and buffers.
//!
//! A `BufferType` describes one allocation strategy (alignment, size limits,
//! per-tensor padding) for a backend/memory kind. A `Buffer` is one concrete
//! allocation produced by it. The backend-private side of a buffer lives
//! behind the `BufferStorage` trait; the `Buffer` struct owns the shared
//! state (size, usage, the back-reference to its type) and performs the
//! bounds checks the contract promises before delegating.

use std::any::Any;
use std::sync::Arc;

use crate::error::{ForgeResult, TensorForgeError};
use crate::graph::TensorDesc;

/// What a buffer holds, used by placement policy outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    #[default]
    Any,
    Weights,
    Compute,
}

/// Allocation strategy descriptor for one backend/memory kind.
///
/// Implementations are immutable and shared as `Arc<dyn BufferType>`; every
/// buffer keeps one such reference back to the type that allocated it.
pub trait BufferType: Send + Sync {
    fn name(&self) -> &str;

    /// Required placement alignment for tensors in buffers of this type.
    fn alignment(&self) -> usize;

    /// Largest single allocation this type can produce.
    fn max_size(&self) -> usize {
        usize::MAX
    }

    /// Allocation footprint for a tensor, including any backend-specific
    /// padding (e.g. rounding quantized rows up to whole blocks). Never less
    /// than the tensor's raw byte footprint.
    fn alloc_size(&self, desc: &TensorDesc) -> usize {
        desc.byte_size()
    }

    /// True iff resulting buffers are directly host-addressable, enabling
    /// zero-copy paths.
    fn is_host(&self) -> bool;

    /// Allocate a buffer of `size` bytes. Fails with `OutOfMemory` when the
    /// size exceeds capacity or the device rejects the allocation; callers
    /// treat that as recoverable.
    fn alloc_buffer(self: Arc<Self>, size: usize) -> ForgeResult<Buffer>;
}

/// Backend-private side of a buffer.
///
/// Implementations hold the actual memory handle and the per-tensor side
/// state; range validation against the buffer size happens in `Buffer`
/// before these methods are called.
pub trait BufferStorage: Send {
    fn name(&self) -> &str;

    /// Host-addressable base pointer, for host-visible storage only.
    fn base(&self) -> Option<*mut u8> {
        None
    }

    /// One-time hook run after a tensor is placed, before first use.
    fn init_tensor(&mut self, _desc: &TensorDesc) -> ForgeResult<()> {
        Ok(())
    }

    /// Synchronous byte-range write at `offset` within the tensor.
    fn set_tensor(&mut self, desc: &TensorDesc, data: &[u8], offset: usize) -> ForgeResult<()>;

    /// Synchronous byte-range read at `offset` within the tensor.
    fn get_tensor(&self, desc: &TensorDesc, data: &mut [u8], offset: usize) -> ForgeResult<()>;

    /// Direct copy with the destination in this storage. `Ok(false)` means
    /// the source/destination pairing is unsupported and the caller should
    /// stage through host memory instead; it is not an error.
    fn cpy_tensor(
        &mut self,
        _src: &Buffer,
        _src_desc: &TensorDesc,
        _dst_desc: &TensorDesc,
    ) -> ForgeResult<bool> {
        Ok(false)
    }

    /// Fill the whole storage with `value`.
    fn clear(&mut self, value: u8) -> ForgeResult<()>;

    /// Drop per-tensor side state, called when the set of tensors placed in
    /// the buffer changes between graph builds.
    fn reset(&mut self) -> ForgeResult<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

enum BufferState {
    Plain(Box<dyn BufferStorage>),
    /// Members mirror one logical tensor; every operation fans out.
    Multi(Vec<Buffer>),
    Freed,
}

/// One concrete memory allocation holding tensor bytes.
pub struct Buffer {
    buft: Arc<dyn BufferType>,
    state: BufferState,
    size: usize,
    usage: BufferUsage,
}

impl Buffer {
    /// Wrap backend-private storage into a buffer handle. Called by
    /// `BufferType::alloc_buffer` implementations.
    pub fn new(buft: Arc<dyn BufferType>, storage: Box<dyn BufferStorage>, size: usize) -> Self {
        Self {
            buft,
            state: BufferState::Plain(storage),
            size,
            usage: BufferUsage::default(),
        }
    }

    /// Compose independently owned member buffers into one logical handle
    /// that mirrors a tensor across them. The logical size is the smallest
    /// member size, the bound that keeps range checks valid for every
    /// member.
    pub fn multi(members: Vec<Buffer>) -> ForgeResult<Buffer> {
        let size = members
            .iter()
            .map(Buffer::size)
            .min()
            .ok_or(TensorForgeError::EmptyMultiBuffer)?;
        Ok(Self {
            buft: Arc::new(MultiBufferType),
            state: BufferState::Multi(members),
            size,
            usage: BufferUsage::default(),
        })
    }

    pub fn is_multi(&self) -> bool {
        matches!(self.state, BufferState::Multi(_))
    }

    pub fn name(&self) -> &str {
        match &self.state {
            BufferState::Plain(storage) => storage.name(),
            BufferState::Multi(_) => "multi",
            BufferState::Freed => "(freed)",
        }
    }

    /// Size in bytes, fixed at creation.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn buffer_type(&self) -> &Arc<dyn BufferType> {
        &self.buft
    }

    /// Backend-private storage, for backend implementations that need to
    /// downcast their own buffers. `None` for multi and freed buffers.
    pub fn storage(&self) -> Option<&dyn BufferStorage> {
        match &self.state {
            BufferState::Plain(storage) => Some(storage.as_ref()),
            _ => None,
        }
    }

    pub fn storage_mut(&mut self) -> Option<&mut dyn BufferStorage> {
        match &mut self.state {
            BufferState::Plain(storage) => Some(storage.as_mut()),
            _ => None,
        }
    }

    /// Tag the buffer (and every member of a multi-buffer) with a usage.
    pub fn set_usage(&mut self, usage: BufferUsage) -> ForgeResult<()> {
        match &mut self.state {
            BufferState::Plain(_) => {
                self.usage = usage;
                Ok(())
            }
            BufferState::Multi(members) => {
                for member in members {
                    member.set_usage(usage)?;
                }
                self.usage = usage;
                Ok(())
            }
            BufferState::Freed => Err(self.freed_error()),
        }
    }

    /// Release the allocation. Idempotent; data operations on a freed
    /// buffer fail with `BufferFreed`.
    pub fn free(&mut self) {
        match std::mem::replace(&mut self.state, BufferState::Freed) {
            BufferState::Plain(storage) => {
                tracing::debug!(buffer = storage.name(), size = self.size, "buffer freed");
            }
            BufferState::Multi(mut members) => {
                for member in &mut members {
                    member.free();
                }
            }
            BufferState::Freed => {}
        }
    }

    pub fn is_freed(&self) -> bool {
        matches!(self.state, BufferState::Freed)
    }

    /// Host-addressable base pointer; `Some` only while the buffer is live
    /// and its type is host-visible.
    pub fn base(&self) -> Option<*mut u8> {
        if !self.buft.is_host() {
            return None;
        }
        match &self.state {
            BufferState::Plain(storage) => storage.base(),
            _ => None,
        }
    }

    /// Run the one-time placement hook for a tensor placed in this buffer.
    pub fn init_tensor(&mut self, desc: &TensorDesc) -> ForgeResult<()> {
        match &mut self.state {
            BufferState::Plain(storage) => storage.init_tensor(desc),
            BufferState::Multi(members) => {
                for member in members {
                    member.init_tensor(desc)?;
                }
                Ok(())
            }
            BufferState::Freed => Err(self.freed_error()),
        }
    }

    /// Blocking byte-range write at `offset` within the tensor, checked
    /// against `[0, size)`.
    pub fn set_tensor(&mut self, desc: &TensorDesc, data: &[u8], offset: usize) -> ForgeResult<()> {
        self.check_range(desc, offset, data.len())?;
        match &mut self.state {
            BufferState::Plain(storage) => storage.set_tensor(desc, data, offset),
            BufferState::Multi(members) => {
                for member in members {
                    member.set_tensor(desc, data, offset)?;
                }
                Ok(())
            }
            BufferState::Freed => Err(self.freed_error()),
        }
    }

    /// Blocking byte-range read at `offset` within the tensor, checked
    /// against `[0, size)`.
    pub fn get_tensor(&self, desc: &TensorDesc, data: &mut [u8], offset: usize) -> ForgeResult<()> {
        self.check_range(desc, offset, data.len())?;
        match &self.state {
            BufferState::Plain(storage) => storage.get_tensor(desc, data, offset),
            // Members are mirrors of one logical tensor; read the first.
            BufferState::Multi(members) => members[0].get_tensor(desc, data, offset),
            BufferState::Freed => Err(self.freed_error()),
        }
    }

    /// Direct tensor copy with the destination in this buffer; the source
    /// may live in any buffer. `Ok(false)` signals an unsupported pairing
    /// and asks the caller for the generic staged fallback. On a
    /// multi-buffer the copy fans out to every member and succeeds overall
    /// iff every member copy succeeded.
    pub fn cpy_tensor(
        &mut self,
        src: &Buffer,
        src_desc: &TensorDesc,
        dst_desc: &TensorDesc,
    ) -> ForgeResult<bool> {
        if src.is_freed() {
            return Err(TensorForgeError::BufferFreed(src.buft.name().to_string()));
        }
        self.check_range(dst_desc, 0, dst_desc.byte_size())?;
        match &mut self.state {
            BufferState::Plain(storage) => storage.cpy_tensor(src, src_desc, dst_desc),
            BufferState::Multi(members) => {
                let mut all = true;
                for member in members {
                    all &= member.cpy_tensor(src, src_desc, dst_desc)?;
                }
                Ok(all)
            }
            BufferState::Freed => Err(self.freed_error()),
        }
    }

    /// Fill the whole buffer with `value`.
    pub fn clear(&mut self, value: u8) -> ForgeResult<()> {
        match &mut self.state {
            BufferState::Plain(storage) => storage.clear(value),
            BufferState::Multi(members) => {
                for member in members {
                    member.clear(value)?;
                }
                Ok(())
            }
            BufferState::Freed => Err(self.freed_error()),
        }
    }

    /// Re-initialize per-tensor side state, used when the set of tensors
    /// placed in the buffer changes between graph builds.
    pub fn reset(&mut self) -> ForgeResult<()> {
        match &mut self.state {
            BufferState::Plain(storage) => storage.reset(),
            BufferState::Multi(members) => {
                for member in members {
                    member.reset()?;
                }
                Ok(())
            }
            BufferState::Freed => Err(self.freed_error()),
        }
    }

    fn freed_error(&self) -> TensorForgeError {
        TensorForgeError::BufferFreed(self.buft.name().to_string())
    }

    fn check_range(&self, desc: &TensorDesc, offset: usize, len: usize) -> ForgeResult<()> {
        let start = desc
            .byte_offset
            .checked_add(offset)
            .ok_or(TensorForgeError::OutOfBounds {
                offset: usize::MAX,
                len,
                size: self.size,
            })?;
        let end = start.checked_add(len).ok_or(TensorForgeError::OutOfBounds {
            offset: start,
            len,
            size: self.size,
        })?;
        if end > self.size {
            return Err(TensorForgeError::OutOfBounds {
                offset: start,
                len,
                size: self.size,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("name", &self.name())
            .field("type", &self.buft.name())
            .field("size", &self.size)
            .field("usage", &self.usage)
            .field("multi", &self.is_multi())
            .finish()
    }
}

/// Buffer type backing multi-buffers. It never allocates; multi-buffers are
/// composed from members that were each allocated by their own type.
struct MultiBufferType;

impl BufferType for MultiBufferType {
    fn name(&self) -> &str {
        "multi"
    }

    fn alignment(&self) -> usize {
        1
    }

    fn max_size(&self) -> usize {
        0
    }

    fn is_host(&self) -> bool {
        false
    }

    fn alloc_buffer(self: Arc<Self>, size: usize) -> ForgeResult<Buffer> {
        Err(TensorForgeError::OutOfMemory {
            buffer_type: self.name().to_string(),
            requested: size,
            max: 0,
        })
    }
}
