//! Differential test: a backend with async hooks set and one without must
//! produce byte-identical results for the same transfer sequence.

use rand::{Rng, SeedableRng};
use tensorforge::{Backend, Buffer, DType, HostBackend, TensorDesc};

/// One deterministic pseudo-random sequence of writes and reads, driven
/// against a backend. Returns every byte the sequence observed.
fn drive(backend: &mut HostBackend, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let buft = backend.default_buffer_type();
    let mut buffer = buft.alloc_buffer(256).expect("alloc failed");
    let mut observed = Vec::new();

    for _ in 0..40 {
        let elems = rng.gen_range(1..16usize);
        let desc = TensorDesc::new(vec![elems], DType::F32)
            .at_offset(rng.gen_range(0..(256 - elems * 4) / 4) * 4);

        if rng.gen_bool(0.6) {
            let payload: Vec<u8> = (0..elems * 4).map(|_| rng.gen()).collect();
            backend
                .set_tensor_async(&mut buffer, &desc, &payload, 0)
                .expect("write failed");
        } else {
            let mut out = vec![0u8; elems * 4];
            backend
                .get_tensor_async(&buffer, &desc, &mut out, 0)
                .expect("read failed");
            observed.extend_from_slice(&out);
        }
    }

    backend.synchronize().expect("synchronize failed");
    let full = TensorDesc::new(vec![64], DType::F32);
    let mut final_state = vec![0u8; 256];
    buffer
        .get_tensor(&full, &mut final_state, 0)
        .expect("final read failed");
    observed.extend_from_slice(&final_state);
    observed
}

#[test]
fn async_and_sync_backends_observe_identical_bytes() {
    for seed in [1u64, 42, 0xBEEF, 7_777_777] {
        let mut sync_backend = HostBackend::new();
        let mut async_backend = HostBackend::new().with_async_queue().unwrap();
        assert!(!sync_backend.has_async());
        assert!(async_backend.has_async());

        let sync_trace = drive(&mut sync_backend, seed);
        let async_trace = drive(&mut async_backend, seed);
        assert_eq!(
            sync_trace, async_trace,
            "seed {seed}: async transfer semantics diverged from sync"
        );
    }
}

#[test]
fn async_copy_between_buffers_matches_staged_copy() {
    let mut backend = HostBackend::new().with_async_queue().unwrap();
    let buft = backend.default_buffer_type();
    let mut src = buft.clone().alloc_buffer(64).unwrap();
    let mut async_dst = buft.clone().alloc_buffer(64).unwrap();
    let mut staged_dst = buft.alloc_buffer(64).unwrap();
    let desc = TensorDesc::new(vec![16], DType::F32);

    let payload: Vec<u8> = (0..64).collect();
    src.set_tensor(&desc, &payload, 0).unwrap();

    // async path
    let mut other = HostBackend::new();
    let enqueued = backend
        .cpy_tensor_async(&mut other, &src, &desc, &mut async_dst, &desc)
        .unwrap();
    assert!(enqueued, "host-to-host async copy should be supported");
    backend.synchronize().unwrap();

    // generic staged path
    tensorforge::copy_tensor(&src, &desc, &mut staged_dst, &desc).unwrap();

    let read = |buffer: &Buffer| {
        let mut out = vec![0u8; 64];
        buffer.get_tensor(&desc, &mut out, 0).unwrap();
        out
    };
    assert_eq!(read(&async_dst), read(&staged_dst));
    assert_eq!(read(&async_dst), payload);
}
