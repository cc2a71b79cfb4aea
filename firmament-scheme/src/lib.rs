//! Typed, validated, change-tracked entities.
//!
//! Declares the schema side of the Firmament engine:
//! - [`Field`] / [`FieldType`]: one attribute's type, default, converter,
//!   validators and flags
//! - [`EntityType`]: an immutable, shared set of fields with a key, partial
//!   flag, validator chains and inheritance
//! - [`Entity`]: one instance, built by [`Entity::instantiate`] through the
//!   conversion and validation pipeline, with dirty tracking and mutation
//!   proxies for in-place container changes
//! - [`Filter`]: field/value equality projected into predicates for
//!   data-access collaborators, including composite keys
//!
//! Values and records come from `firmament-types`; this crate never talks
//! to storage or transport itself.

mod config;
pub mod converter;
mod dirty;
mod dump;
mod entity;
mod entity_type;
mod error;
mod field;
mod filter;
pub mod key;
mod logging;
mod pipeline;
mod proxy;
pub mod status;
mod validator;

pub use config::SchemeConfig;
pub use converter::{Converter, ConverterMode, ConversionError};
pub use dump::DumpOptions;
pub use entity::{Entity, FieldValue};
pub use entity_type::{EntityType, EntityTypeBuilder, KeyValidity};
pub use error::{ErrorKind, ErrorPayload, SchemeError, SchemeResult};
pub use field::{DefaultValue, Field, FieldType};
pub use filter::{Filter, Operator, Predicate};
pub use logging::{LogSettings, REDACTED};
pub use proxy::{EntityProxy, ListProxy, MapProxy, SetProxy};
pub use validator::{CheckResult, EntityValidator, FieldValidator, Phase};

pub use firmament_types::{InstanceId, Record, Value, ValueKind};
