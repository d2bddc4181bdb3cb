//! Tests for buffer size invariants and range checking across buffer types.

use std::sync::Arc;

use tensorforge::{Backend, BufferType, DType, HostBackend, TensorDesc, TensorForgeError};

fn host_buft() -> Arc<dyn BufferType> {
    HostBackend::new().default_buffer_type()
}

#[test]
fn alloc_size_covers_raw_footprint_for_every_dtype() {
    let buft = host_buft();
    let shapes: Vec<Vec<usize>> = vec![vec![1], vec![7], vec![32], vec![33], vec![5, 9], vec![2, 3, 4]];
    let dtypes = [
        DType::F32,
        DType::F16,
        DType::I32,
        DType::U32,
        DType::Q8_0,
        DType::Q4_0,
    ];
    for shape in &shapes {
        for dtype in dtypes {
            let desc = TensorDesc::new(shape.clone(), dtype);
            assert!(
                buft.alloc_size(&desc) >= desc.byte_size(),
                "alloc_size for {dtype:?} {shape:?} below raw footprint"
            );
        }
    }
}

#[test]
fn buffer_reports_exactly_the_allocated_size() {
    let buft = host_buft();
    for size in [1usize, 16, 64, 4096] {
        let buffer = buft.clone().alloc_buffer(size).expect("alloc failed");
        assert_eq!(buffer.size(), size);
    }
}

#[test]
fn buffer_size_is_stable_across_operations() {
    let buft = host_buft();
    let mut buffer = buft.alloc_buffer(32).expect("alloc failed");
    let desc = TensorDesc::new(vec![4], DType::F32);

    buffer.set_tensor(&desc, &[1u8; 16], 0).unwrap();
    assert_eq!(buffer.size(), 32);

    let mut out = [0u8; 16];
    buffer.get_tensor(&desc, &mut out, 0).unwrap();
    assert_eq!(buffer.size(), 32);

    buffer.clear(0xFF).unwrap();
    assert_eq!(buffer.size(), 32);

    buffer.reset().unwrap();
    assert_eq!(buffer.size(), 32);
}

#[test]
fn ranges_outside_the_buffer_are_rejected() {
    let buft = host_buft();
    let mut buffer = buft.alloc_buffer(16).expect("alloc failed");

    // tensor placed at offset 8, write of 12 bytes runs past the end
    let desc = TensorDesc::new(vec![3], DType::F32).at_offset(8);
    let err = buffer.set_tensor(&desc, &[0u8; 12], 0).unwrap_err();
    assert!(matches!(err, TensorForgeError::OutOfBounds { .. }));

    // in-tensor offset pushing the range out
    let desc = TensorDesc::new(vec![4], DType::F32);
    let err = buffer.get_tensor(&desc, &mut [0u8; 8], 12).unwrap_err();
    assert!(matches!(err, TensorForgeError::OutOfBounds { .. }));

    // the full range is still writable
    buffer.set_tensor(&desc, &[7u8; 16], 0).unwrap();
}

#[test]
fn oversized_allocation_reports_out_of_memory() {
    let backend = HostBackend::new().with_max_buffer_size(1024);
    let buft = backend.default_buffer_type();
    let err = buft.alloc_buffer(4096).unwrap_err();
    assert!(matches!(err, TensorForgeError::OutOfMemory { .. }));
    assert!(err.is_recoverable(), "OOM must be treated as recoverable");
}

#[test]
fn freed_buffers_reject_data_operations() {
    let buft = host_buft();
    let mut buffer = buft.alloc_buffer(16).expect("alloc failed");
    let desc = TensorDesc::new(vec![4], DType::F32);

    buffer.free();
    buffer.free(); // idempotent

    assert!(buffer.is_freed());
    assert!(buffer.base().is_none());
    assert!(matches!(
        buffer.set_tensor(&desc, &[0u8; 16], 0),
        Err(TensorForgeError::BufferFreed(_))
    ));
    assert!(matches!(
        buffer.get_tensor(&desc, &mut [0u8; 16], 0),
        Err(TensorForgeError::BufferFreed(_))
    ));
    assert!(buffer.clear(0).is_err());
}

#[test]
fn host_buffers_expose_a_base_pointer() {
    let buft = host_buft();
    assert!(buft.is_host());
    let buffer = buft.alloc_buffer(64).expect("alloc failed");
    assert!(buffer.base().is_some());
}

#[test]
fn staged_copy_matches_direct_copy() {
    let buft = host_buft();
    let mut src = buft.clone().alloc_buffer(32).expect("alloc failed");
    let mut direct_dst = buft.clone().alloc_buffer(32).expect("alloc failed");
    let mut staged_dst = buft.alloc_buffer(32).expect("alloc failed");
    let desc = TensorDesc::new(vec![8], DType::F32);

    let payload: Vec<u8> = (0..32).collect();
    src.set_tensor(&desc, &payload, 0).unwrap();

    // direct path
    assert!(direct_dst.cpy_tensor(&src, &desc, &desc).unwrap());

    // generic helper path
    tensorforge::copy_tensor(&src, &desc, &mut staged_dst, &desc).unwrap();

    let mut direct = [0u8; 32];
    let mut staged = [0u8; 32];
    direct_dst.get_tensor(&desc, &mut direct, 0).unwrap();
    staged_dst.get_tensor(&desc, &mut staged, 0).unwrap();
    assert_eq!(direct, staged);
    assert_eq!(&direct[..], &payload[..]);
}
