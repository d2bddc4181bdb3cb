//! Unified error handling for TensorForge
//!
//! This module provides a centralized error type that consolidates the
//! failure modes of the abstraction layer. It implements error categorization
//! for:
//! - User errors (bad ranges, mismatched sizes, invalid graphs)
//! - Recoverable errors (allocation pressure, unsupported optional paths)
//! - Internal errors (bugs, poisoned locks)
//! - Backend errors (device-side failures translated by backend modules)

use std::fmt;

use crate::backend::BackendGuid;
use crate::graph::TensorId;

/// Unified error type for TensorForge
///
/// Backend implementations must translate device-level failures (driver
/// resets, hardware faults) into these variants before crossing the
/// abstraction boundary.
#[derive(Debug, thiserror::Error)]
pub enum TensorForgeError {
    // ========== Allocation Errors ==========
    /// Buffer allocation failed; callers should treat this as recoverable
    /// and either try another buffer type or fail the overall load.
    #[error("out of memory: '{buffer_type}' cannot allocate {requested} bytes (max {max})")]
    OutOfMemory {
        buffer_type: String,
        requested: usize,
        max: usize,
    },

    // ========== Buffer Errors ==========
    /// Byte range outside the buffer
    #[error("buffer range out of bounds: offset {offset} + {len} bytes > buffer size {size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    /// Operation on a buffer after free()
    #[error("buffer '{0}' has already been freed")]
    BufferFreed(String),

    /// Source and destination byte footprints differ in a tensor copy
    #[error("tensor copy size mismatch: source {src} bytes, destination {dst} bytes")]
    CopySizeMismatch { src: usize, dst: usize },

    /// Multi-buffer constructed with no members
    #[error("multi-buffer requires at least one member buffer")]
    EmptyMultiBuffer,

    // ========== Event Errors ==========
    /// Wait or synchronize before any record
    #[error("event has not been recorded")]
    EventNotRecorded,

    /// Events are one-shot; a second record is a contract violation
    #[error("event has already been recorded")]
    EventAlreadyRecorded,

    /// Record attempted by a backend other than the event's creator
    #[error("event belongs to backend {owner}, not {caller}")]
    EventBackendMismatch {
        owner: BackendGuid,
        caller: BackendGuid,
    },

    // ========== Graph Errors ==========
    /// Tensor referenced by a graph node was never placed in a buffer
    #[error("tensor {0:?} is not bound to any buffer")]
    TensorNotBound(TensorId),

    /// Graph handed to a backend fails structural validation
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Plan update with a graph of different topology
    #[error("graph plan topology mismatch: {0}")]
    PlanTopologyMismatch(String),

    // ========== Registry Errors ==========
    /// Resolution of an unregistered backend name
    #[error("backend not registered: {0}")]
    BackendNotFound(String),

    /// Registration under a name that is already taken
    #[error("backend already registered: {0}")]
    DuplicateBackend(String),

    // ========== Capability Errors ==========
    /// Optional capability invoked on a backend that does not provide it
    #[error("operation not supported by this backend: {0}")]
    Unsupported(String),

    // ========== Internal Errors ==========
    /// Device-side failure reported by a backend module
    #[error("backend error: {0}")]
    Backend(String),

    /// Internal error (indicates a bug)
    #[error("internal error: {0}")]
    Internal(String),

    /// Lock poisoned (indicates a bug or concurrent access issue)
    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl TensorForgeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            // User errors - actionable by callers
            TensorForgeError::OutOfBounds { .. }
            | TensorForgeError::CopySizeMismatch { .. }
            | TensorForgeError::EmptyMultiBuffer
            | TensorForgeError::InvalidGraph(_)
            | TensorForgeError::PlanTopologyMismatch(_)
            | TensorForgeError::BackendNotFound(_)
            | TensorForgeError::DuplicateBackend(_)
            | TensorForgeError::EventAlreadyRecorded
            | TensorForgeError::EventNotRecorded
            | TensorForgeError::EventBackendMismatch { .. }
            | TensorForgeError::BufferFreed(_) => ErrorCategory::User,

            // Recoverable errors - retry with a different placement
            TensorForgeError::OutOfMemory { .. } | TensorForgeError::Unsupported(_) => {
                ErrorCategory::Recoverable
            }

            // Backend errors - device failures
            TensorForgeError::Backend(_) => ErrorCategory::Backend,

            // Internal errors - bugs
            TensorForgeError::TensorNotBound(_)
            | TensorForgeError::Internal(_)
            | TensorForgeError::LockPoisoned(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error is recoverable (temporary condition)
    ///
    /// Recoverable errors include allocation pressure and unsupported
    /// optional capabilities; the caller may retry under a different
    /// buffer type or backend.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Recoverable | ErrorCategory::Backend
        )
    }

    /// Check if this is a user-facing error (actionable by callers)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Error category for handling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User error - invalid range, graph, or call sequence
    User,
    /// Recoverable error - retry under a different placement
    Recoverable,
    /// Internal error - indicates a bug
    Internal,
    /// Backend error - device failure
    Backend,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Recoverable => write!(f, "Recoverable"),
            ErrorCategory::Internal => write!(f, "Internal"),
            ErrorCategory::Backend => write!(f, "Backend"),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for TensorForgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        TensorForgeError::LockPoisoned(err.to_string())
    }
}

/// Helper type alias for Results using TensorForgeError
pub type ForgeResult<T> = std::result::Result<T, TensorForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            TensorForgeError::OutOfBounds {
                offset: 8,
                len: 16,
                size: 16
            }
            .category(),
            ErrorCategory::User
        );
        assert_eq!(
            TensorForgeError::OutOfMemory {
                buffer_type: "host".to_string(),
                requested: 1024,
                max: 512
            }
            .category(),
            ErrorCategory::Recoverable
        );
        assert_eq!(
            TensorForgeError::Backend("device reset".to_string()).category(),
            ErrorCategory::Backend
        );
        assert_eq!(
            TensorForgeError::LockPoisoned("binding table".to_string()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_out_of_memory_is_recoverable() {
        let err = TensorForgeError::OutOfMemory {
            buffer_type: "host".to_string(),
            requested: 1 << 40,
            max: 1 << 30,
        };
        assert!(err.is_recoverable());
        assert!(!err.is_user_error());
    }

    #[test]
    fn test_bounds_error_is_user_error() {
        let err = TensorForgeError::OutOfBounds {
            offset: 0,
            len: 32,
            size: 16,
        };
        assert!(err.is_user_error());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = TensorForgeError::OutOfMemory {
            buffer_type: "host".to_string(),
            requested: 2048,
            max: 1024,
        };
        assert_eq!(
            err.to_string(),
            "out of memory: 'host' cannot allocate 2048 bytes (max 1024)"
        );

        let err = TensorForgeError::CopySizeMismatch { src: 64, dst: 32 };
        assert_eq!(
            err.to_string(),
            "tensor copy size mismatch: source 64 bytes, destination 32 bytes"
        );
    }

    #[test]
    fn test_poison_error_conversion() {
        use std::sync::PoisonError;

        fn convert<T>(err: PoisonError<T>) -> TensorForgeError {
            TensorForgeError::from(err)
        }

        let _ = convert::<i32> as fn(PoisonError<i32>) -> TensorForgeError;
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::User.to_string(), "User");
        assert_eq!(ErrorCategory::Recoverable.to_string(), "Recoverable");
        assert_eq!(ErrorCategory::Internal.to_string(), "Internal");
        assert_eq!(ErrorCategory::Backend.to_string(), "Backend");
    }
}
