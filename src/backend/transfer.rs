//! Generic tensor copy between buffers.

use crate::backend::Buffer;
use crate::error::{ForgeResult, TensorForgeError};
use crate::graph::TensorDesc;

/// Copy one tensor between buffers, trying the destination's direct path
/// first and falling back to a host-staged copy when the pairing is
/// unsupported. The byte footprints of source and destination must match.
pub fn copy_tensor(
    src_buf: &Buffer,
    src_desc: &TensorDesc,
    dst_buf: &mut Buffer,
    dst_desc: &TensorDesc,
) -> ForgeResult<()> {
    let src_size = src_desc.byte_size();
    let dst_size = dst_desc.byte_size();
    if src_size != dst_size {
        return Err(TensorForgeError::CopySizeMismatch {
            src: src_size,
            dst: dst_size,
        });
    }

    if dst_buf.cpy_tensor(src_buf, src_desc, dst_desc)? {
        return Ok(());
    }

    // Unsupported pairing: stage through host memory.
    tracing::trace!(bytes = src_size, "staged tensor copy");
    let mut staging = vec![0u8; src_size];
    src_buf.get_tensor(src_desc, &mut staging, 0)?;
    dst_buf.set_tensor(dst_desc, &staging, 0)
}
