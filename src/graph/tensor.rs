//! Tensor descriptors for the backend contract.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(pub usize);

/// Element types the abstraction sizes and transfers.
///
/// Quantized types store fixed-size blocks of elements; their byte footprint
/// is computed per block, and buffer types may pad partial blocks up to a
/// whole one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F16,
    I32,
    U32,
    Q8_0,
    Q4_0,
}

impl DType {
    /// Number of elements per storage block.
    pub fn block_size(&self) -> usize {
        match self {
            DType::F32 | DType::F16 | DType::I32 | DType::U32 => 1,
            DType::Q8_0 | DType::Q4_0 => 32,
        }
    }

    /// Bytes per storage block (scale + packed elements for quantized types).
    pub fn block_byte_size(&self) -> usize {
        match self {
            DType::F32 | DType::I32 | DType::U32 => 4,
            DType::F16 => 2,
            // 2-byte f16 scale + 32 packed int8 values
            DType::Q8_0 => 2 + 32,
            // 2-byte f16 scale + 32 packed int4 values
            DType::Q4_0 => 2 + 16,
        }
    }

    pub fn is_quantized(&self) -> bool {
        self.block_size() > 1
    }
}

/// Shape, type, and placement of one tensor.
///
/// `byte_offset` records where the engine placed the tensor inside its
/// buffer; it is 0 until placement.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDesc {
    pub id: TensorId,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub strides: Vec<usize>,
    pub byte_offset: usize,
}

impl TensorDesc {
    pub fn new(shape: Vec<usize>, dtype: DType) -> Self {
        let strides = row_major_strides(&shape);
        Self {
            id: TensorId(0),
            shape,
            dtype,
            strides,
            byte_offset: 0,
        }
    }

    /// Builder form recording placement at a byte offset within a buffer.
    pub fn at_offset(mut self, byte_offset: usize) -> Self {
        self.byte_offset = byte_offset;
        self
    }

    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Raw byte footprint of the tensor data, partial trailing block
    /// rounded up for quantized types.
    pub fn byte_size(&self) -> usize {
        let elems = self.element_count();
        let block = self.dtype.block_size();
        let blocks = elems.div_ceil(block);
        blocks.saturating_mul(self.dtype.block_byte_size())
    }

    pub fn set_shape(&mut self, shape: Vec<usize>) {
        self.strides = row_major_strides(&shape);
        self.shape = shape;
    }
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride: usize = 1;
    for dim in shape.iter().rev() {
        strides.push(stride);
        stride = stride.saturating_mul(*dim);
    }
    strides.reverse();
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_strides() {
        let desc = TensorDesc::new(vec![2, 3, 4], DType::F32);
        assert_eq!(desc.strides, vec![12, 4, 1]);
        assert_eq!(desc.element_count(), 24);
        assert_eq!(desc.byte_size(), 96);
    }

    #[test]
    fn test_quantized_byte_size_rounds_up_to_blocks() {
        // 40 elements -> 2 blocks of 32 for Q8_0
        let desc = TensorDesc::new(vec![40], DType::Q8_0);
        assert_eq!(desc.byte_size(), 2 * 34);

        // exact multiple
        let desc = TensorDesc::new(vec![64], DType::Q4_0);
        assert_eq!(desc.byte_size(), 2 * 18);
    }

    #[test]
    fn test_f16_byte_size() {
        let desc = TensorDesc::new(vec![10], DType::F16);
        assert_eq!(desc.byte_size(), 20);
    }

    #[test]
    fn test_at_offset_records_placement() {
        let desc = TensorDesc::new(vec![4], DType::F32).at_offset(128);
        assert_eq!(desc.byte_offset, 128);
    }

    #[test]
    fn test_set_shape_recomputes_strides() {
        let mut desc = TensorDesc::new(vec![6], DType::F32);
        desc.set_shape(vec![2, 3]);
        assert_eq!(desc.strides, vec![3, 1]);
    }
}
