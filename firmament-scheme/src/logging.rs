//! Structured logging for the entity lifecycle.
//!
//! Events go through `tracing` with the entity type name, instance id and,
//! where relevant, the field name and value as structured fields:
//! - `debug`: instantiation start/end, field writes, validation failures
//! - `trace`: validator entry, ignored input keys
//!
//! Logging is configured per entity type through [`LogSettings`]. Disabling
//! it silences every event for that type; redaction replaces values with
//! `<redacted>` (fields can also opt in individually with
//! [`Field::redacted`](crate::Field::redacted)).

use crate::entity::Entity;
use crate::entity_type::EntityType;
use crate::error::SchemeError;
use crate::field::Field;
use crate::validator::{slot_value, Phase};
use firmament_types::{InstanceId, Record, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Placeholder written instead of a redacted value.
pub const REDACTED: &str = "<redacted>";

/// Per-type logging switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub enabled: bool,
    pub redact_values: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_values: false,
        }
    }
}

impl LogSettings {
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            redact_values: false,
        }
    }

    #[must_use]
    pub const fn redacted() -> Self {
        Self {
            enabled: true,
            redact_values: true,
        }
    }
}

fn render(ty: &EntityType, field: Option<&Field>, value: &Value) -> String {
    if ty.log_settings().redact_values || field.is_some_and(Field::is_redacted) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

pub(crate) fn instantiating(ty: &EntityType, id: InstanceId, provided: usize) {
    if ty.log_settings().enabled {
        debug!(entity = ty.name(), instance = %id, provided, "instantiating entity");
    }
}

pub(crate) fn instantiated(entity: &Entity) {
    let ty = entity.entity_type();
    if ty.log_settings().enabled {
        let set = entity.slots().iter().filter(|s| !s.is_unset()).count();
        debug!(entity = ty.name(), instance = %entity.id(), set, "entity instantiated");
    }
}

pub(crate) fn ignored_input(ty: &EntityType, id: InstanceId, leftover: &Record) {
    if !ty.log_settings().enabled {
        return;
    }
    for key in leftover.keys() {
        trace!(entity = ty.name(), instance = %id, key, "ignoring undeclared input");
    }
}

pub(crate) fn validator_entry(
    ty: &EntityType,
    id: InstanceId,
    field: Option<&Field>,
    phase: Phase,
    value: Option<&Value>,
) {
    if !ty.log_settings().enabled {
        return;
    }
    let field_name = field.map_or("", Field::name);
    match value {
        Some(value) => trace!(
            entity = ty.name(),
            instance = %id,
            field = field_name,
            %phase,
            value = %render(ty, field, value),
            "running validator"
        ),
        None => trace!(entity = ty.name(), instance = %id, %phase, "running entity validator"),
    }
}

pub(crate) fn field_set(entity: &Entity, idx: usize) {
    let ty = entity.entity_type();
    if !ty.log_settings().enabled {
        return;
    }
    let field = &ty.fields()[idx];
    let value = slot_value(&entity.slots()[idx]);
    debug!(
        entity = ty.name(),
        instance = %entity.id(),
        field = field.name(),
        value = %render(ty, Some(field), &*value),
        "field set"
    );
}

pub(crate) fn validation_failed(ty: &EntityType, err: &SchemeError) {
    if ty.log_settings().enabled {
        debug!(entity = ty.name(), field = err.field().unwrap_or(""), error = %err, "validation failed");
    }
}
