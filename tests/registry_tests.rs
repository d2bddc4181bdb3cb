//! Backend registry resolution and registration-policy tests.

use std::sync::Arc;

use tensorforge::backend::host;
use tensorforge::backend::{BackendInitFn, BackendUserData};
use tensorforge::{Backend, BackendRegistry, HostBackend, HostBufferType, TensorForgeError};

#[test]
fn resolution_constructs_fresh_instances() {
    let mut registry = BackendRegistry::new();
    host::register(&mut registry).unwrap();

    let first = registry.init_backend("host", "").unwrap();
    let second = registry.init_backend("host", "").unwrap();

    // one entry, many instances, each with its own identity
    assert_ne!(first.guid(), second.guid());
    assert_eq!(first.name(), "host");
}

#[test]
fn params_select_the_instance_configuration() {
    let mut registry = BackendRegistry::new();
    host::register(&mut registry).unwrap();

    let sync = registry.init_backend("host", "").unwrap();
    let asynchronous = registry.init_backend("host", "async").unwrap();

    assert!(!sync.has_async());
    assert!(!sync.has_events());
    assert!(asynchronous.has_async());
    assert!(asynchronous.has_events());
}

#[test]
fn unknown_names_are_rejected() {
    let registry = BackendRegistry::new();
    assert!(matches!(
        registry.init_backend("tpu", ""),
        Err(TensorForgeError::BackendNotFound(_))
    ));
    assert!(registry.default_buffer_type("tpu").is_none());
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut registry = BackendRegistry::new();
    host::register(&mut registry).unwrap();

    let err = host::register(&mut registry).unwrap_err();
    assert!(matches!(err, TensorForgeError::DuplicateBackend(_)));
    assert!(err.is_user_error());

    // the original entry keeps working
    assert_eq!(registry.len(), 1);
    assert!(registry.init_backend("host", "").is_ok());
}

#[test]
fn entries_expose_default_buffer_types() {
    let mut registry = BackendRegistry::new();
    host::register(&mut registry).unwrap();

    let buft = registry.default_buffer_type("host").unwrap();
    assert!(buft.is_host());
    assert_eq!(buft.name(), "host");
    assert!(buft.alignment() > 0);
}

#[test]
fn user_data_reaches_the_constructor() -> anyhow::Result<()> {
    let mut registry = BackendRegistry::new();

    let init: BackendInitFn = Arc::new(|params, user_data| {
        let cap = user_data
            .and_then(|data| data.downcast_ref::<usize>())
            .copied()
            .unwrap_or(usize::MAX);
        let mut backend = HostBackend::new().with_max_buffer_size(cap);
        if params == "async" {
            backend = backend.with_async_queue()?;
        }
        Ok(Box::new(backend) as Box<dyn Backend>)
    });

    registry.register(
        "host-capped",
        init,
        Arc::new(HostBufferType::standalone()),
        Some(Arc::new(128usize) as BackendUserData),
    )?;

    let backend = registry.init_backend("host-capped", "")?;
    let buft = backend.default_buffer_type();
    assert!(matches!(
        buft.alloc_buffer(256),
        Err(TensorForgeError::OutOfMemory { .. })
    ));
    Ok(())
}

#[test]
fn names_reflect_registration_order() {
    let mut registry = BackendRegistry::new();
    assert!(registry.is_empty());
    host::register(&mut registry).unwrap();

    let init: BackendInitFn = Arc::new(|_, _| Ok(Box::new(HostBackend::new()) as Box<dyn Backend>));
    registry
        .register(
            "host-alt",
            init,
            Arc::new(HostBufferType::standalone()),
            None,
        )
        .unwrap();

    assert_eq!(registry.names(), vec!["host", "host-alt"]);
}
