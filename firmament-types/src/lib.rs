//! Value model for the Firmament scheme engine.
//!
//! This crate defines the backend-agnostic data that crosses the boundary
//! between entities and their collaborators:
//! - [`Value`]: a dynamically typed field value (scalars, datetimes,
//!   containers, nested records and the `Unset` sentinel)
//! - [`Record`]: an insertion-ordered mapping of field name to value, the
//!   shape produced by `dump` and consumed by `load`
//! - [`InstanceId`]: per-instance identifier used as logging context
//!
//! Nothing here knows about field declarations or validation; that lives in
//! `firmament-scheme`.

mod ids;
mod record;
mod value;

pub use ids::InstanceId;
pub use record::Record;
pub use value::{Value, ValueKind};

pub use indexmap::IndexSet;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in value operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(String),
}
