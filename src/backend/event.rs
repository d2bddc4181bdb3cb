//! Cross-backend synchronization events.
//!
//! An event is a one-shot token bound to the backend that created it. The
//! creating backend records one point in its own order; any other backend
//! can then insert a dependency on that point via `Backend::event_wait`, and
//! the host can block on it with `Event::synchronize`. Record happens-before
//! every subsequent wait or synchronize that references the event; this is
//! the only ordering guarantee the abstraction provides across backends.

use std::any::Any;
use std::sync::Arc;

use crate::backend::BackendGuid;
use crate::error::{ForgeResult, TensorForgeError};

/// Backend-private event state.
pub trait EventInner: Send + Sync {
    /// True once the creating backend has recorded the event.
    fn is_recorded(&self) -> bool;

    /// Block the calling thread until the recorded point is reached.
    fn synchronize(&self) -> ForgeResult<()>;

    fn as_any(&self) -> &dyn Any;
}

/// One-shot synchronization token recording a point in one backend's order.
#[derive(Clone)]
pub struct Event {
    owner: BackendGuid,
    inner: Arc<dyn EventInner>,
}

impl Event {
    /// Bind backend-private state to the creating backend's identity.
    /// Called by `Backend::event_new` implementations.
    pub fn new(owner: BackendGuid, inner: Arc<dyn EventInner>) -> Self {
        Self { owner, inner }
    }

    /// Identity of the backend that created (and may record) this event.
    pub fn owner(&self) -> BackendGuid {
        self.owner
    }

    pub fn is_recorded(&self) -> bool {
        self.inner.is_recorded()
    }

    /// Block the calling thread (not a device) until the recorded point is
    /// reached. Fails with `EventNotRecorded` before any record.
    pub fn synchronize(&self) -> ForgeResult<()> {
        if !self.inner.is_recorded() {
            return Err(TensorForgeError::EventNotRecorded);
        }
        self.inner.synchronize()
    }

    /// Backend-private state, for the implementing backend to downcast.
    pub fn inner(&self) -> &Arc<dyn EventInner> {
        &self.inner
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("owner", &self.owner)
            .field("recorded", &self.is_recorded())
            .finish()
    }
}
