//! Error types for the scheme engine.
//!
//! Every failure carries the entity type name and, where one applies, the
//! field name, so a transport layer can turn it into a user-facing response
//! through [`SchemeError::to_payload`] without inspecting messages.

use firmament_types::Value;
use serde::Serialize;
use thiserror::Error;

/// Result type for scheme operations.
pub type SchemeResult<T> = Result<T, SchemeError>;

/// Stable, matchable category of a [`SchemeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingRequiredField,
    TypeConversion,
    Validation,
    CompositeKeyMismatch,
    UnknownField,
    UnsetField,
    MissingKey,
    Definition,
    AsyncValidatorInSyncContext,
    InvalidStatusTransition,
    Config,
}

/// Errors raised while defining, instantiating, mutating or projecting
/// entities.
#[derive(Debug, Clone, Error)]
pub enum SchemeError {
    /// A non-partial field has no provided value and no default.
    #[error("{entity}.{field}: missing required field")]
    MissingRequiredField { entity: String, field: String },

    /// Raw input could not be coerced to the field's declared type.
    #[error("{entity}.{field}: cannot convert {value}: {reason}")]
    TypeConversion {
        entity: String,
        field: String,
        value: Value,
        reason: String,
    },

    /// A field or entity validator rejected a value.
    #[error("{}: {message}", scoped(.entity, .field.as_deref()))]
    Validation {
        entity: String,
        field: Option<String>,
        value: Option<Value>,
        message: String,
    },

    /// A composite key value lacks one or more sub-fields.
    #[error("{entity}.{field}: composite value is missing sub-fields {missing:?}")]
    CompositeKeyMismatch {
        entity: String,
        field: String,
        missing: Vec<String>,
    },

    /// A write or filter names a field the entity type does not declare.
    #[error("{entity} has no field named {field:?}")]
    UnknownField { entity: String, field: String },

    /// A read that needs a value hit a partial field that is still unset.
    #[error("{entity}.{field} is unset")]
    UnsetField { entity: String, field: String },

    /// A key operation was requested on a type without a primary key.
    #[error("{entity} does not declare a key field")]
    MissingKey { entity: String },

    /// The entity type declaration itself is inconsistent.
    #[error("invalid definition of {entity}: {reason}")]
    Definition { entity: String, reason: String },

    /// A synchronous entry point reached an asynchronous validator.
    #[error("{}: asynchronous validator reached from a synchronous call", scoped(.entity, .field.as_deref()))]
    AsyncValidatorInSyncContext {
        entity: String,
        field: Option<String>,
    },

    /// A guarded status change was attempted from a disallowed status.
    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),
}

fn scoped(entity: &str, field: Option<&str>) -> String {
    match field {
        Some(field) => format!("{entity}.{field}"),
        None => entity.to_string(),
    }
}

impl SchemeError {
    /// Returns the stable category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
            Self::TypeConversion { .. } => ErrorKind::TypeConversion,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::CompositeKeyMismatch { .. } => ErrorKind::CompositeKeyMismatch,
            Self::UnknownField { .. } => ErrorKind::UnknownField,
            Self::UnsetField { .. } => ErrorKind::UnsetField,
            Self::MissingKey { .. } => ErrorKind::MissingKey,
            Self::Definition { .. } => ErrorKind::Definition,
            Self::AsyncValidatorInSyncContext { .. } => ErrorKind::AsyncValidatorInSyncContext,
            Self::InvalidStatusTransition { .. } => ErrorKind::InvalidStatusTransition,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Returns the name of the field the error is about, if any.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredField { field, .. }
            | Self::TypeConversion { field, .. }
            | Self::CompositeKeyMismatch { field, .. }
            | Self::UnknownField { field, .. }
            | Self::UnsetField { field, .. } => Some(field),
            Self::Validation { field, .. } | Self::AsyncValidatorInSyncContext { field, .. } => {
                field.as_deref()
            }
            Self::MissingKey { .. }
            | Self::Definition { .. }
            | Self::InvalidStatusTransition { .. }
            | Self::Config(_) => None,
        }
    }

    /// Returns the entity type name the error is about, if any.
    #[must_use]
    pub fn entity(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredField { entity, .. }
            | Self::TypeConversion { entity, .. }
            | Self::Validation { entity, .. }
            | Self::CompositeKeyMismatch { entity, .. }
            | Self::UnknownField { entity, .. }
            | Self::UnsetField { entity, .. }
            | Self::MissingKey { entity }
            | Self::Definition { entity, .. }
            | Self::AsyncValidatorInSyncContext { entity, .. } => Some(entity),
            Self::InvalidStatusTransition { .. } | Self::Config(_) => None,
        }
    }

    /// Builds the shape a transport layer returns to its caller.
    ///
    /// Validation failures expose the validator's own message; every other
    /// kind uses the full error text.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        let message = match self {
            Self::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ErrorPayload {
            kind: self.kind(),
            field: self.field().map(str::to_string),
            message,
        }
    }
}

/// Serializable error description for transport collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}
