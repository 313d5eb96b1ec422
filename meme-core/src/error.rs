//! Error types for layer store operations.

use thiserror::Error;

use crate::LayerId;

/// Result type for layer store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in layer store operations.
///
/// Most store operations are total. These variants only surface from
/// [`UpdatePolicy::Strict`](crate::UpdatePolicy::Strict) lookups and from
/// inserting a layer whose id is already taken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No layer with this id exists in the collection.
    #[error("Layer not found: {0}")]
    LayerNotFound(LayerId),

    /// A layer with this id already exists in the collection.
    #[error("Duplicate layer id: {0}")]
    DuplicateLayer(LayerId),
}
