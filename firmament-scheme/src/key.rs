//! Key equality and persistence checks.
//!
//! A composite key is a sub-entity. Two composite keys are equal iff every
//! sub-field value is equal, recursively; comparing keys with missing
//! sub-fields is an error rather than a silent `false`.

use crate::entity::{Entity, FieldValue};
use crate::error::{SchemeError, SchemeResult};
use crate::field::Field;
use firmament_types::Value;

/// Dotted paths of the unset sub-fields of `entity`, recursing into nested
/// composites.
#[must_use]
pub fn missing_sub_fields(entity: &Entity) -> Vec<String> {
    let mut missing = Vec::new();
    collect_missing(entity, "", &mut missing);
    missing
}

fn collect_missing(entity: &Entity, prefix: &str, out: &mut Vec<String>) {
    for (field, slot) in entity.iter() {
        match slot {
            FieldValue::Unset => out.push(format!("{prefix}{}", field.name())),
            FieldValue::Composite(sub) => {
                collect_missing(sub, &format!("{prefix}{}.", field.name()), out);
            }
            FieldValue::Set(_) => {}
        }
    }
}

/// Compares two composite key values sub-field by sub-field.
///
/// `field` names the composite field in errors. Fails with
/// `CompositeKeyMismatch` if either side lacks a sub-field.
pub fn composite_eq(field: &Field, a: &Entity, b: &Entity) -> SchemeResult<bool> {
    for side in [a, b] {
        let missing = missing_sub_fields(side);
        if !missing.is_empty() {
            return Err(SchemeError::CompositeKeyMismatch {
                entity: field.owner().to_string(),
                field: field.name().to_string(),
                missing,
            });
        }
    }
    Ok(a.type_name() == b.type_name()
        && a.slots()
            .iter()
            .zip(b.slots())
            .all(|(x, y)| x == y))
}

/// Default key validity: a positive integer, non-empty text, any other
/// non-null value, or a composite whose sub-fields are all valid.
fn default_validity(slot: &FieldValue) -> bool {
    match slot {
        FieldValue::Unset | FieldValue::Set(Value::Null) => false,
        FieldValue::Set(Value::Int(n)) => *n > 0,
        FieldValue::Set(Value::Text(s)) => !s.is_empty(),
        FieldValue::Set(_) => true,
        FieldValue::Composite(sub) => sub.slots().iter().all(default_validity),
    }
}

impl Entity {
    /// The key field's slot.
    pub fn key_value(&self) -> SchemeResult<&FieldValue> {
        let field = self.ty.key_field()?;
        self.get(field.name())
    }

    /// Compares the key values of two instances of the same type.
    pub fn key_eq(&self, other: &Entity) -> SchemeResult<bool> {
        let field = self.ty.key_field()?;
        match (self.key_value()?, other.key_value()?) {
            (FieldValue::Composite(a), FieldValue::Composite(b)) => composite_eq(field, a, b),
            (FieldValue::Unset, _) | (_, FieldValue::Unset) => Err(SchemeError::UnsetField {
                entity: self.ty.name().to_string(),
                field: field.name().to_string(),
            }),
            (a, b) => Ok(a == b),
        }
    }

    /// True if the key holds a value identifying a stored record.
    ///
    /// Uses the entity type's key validity check when one is declared.
    /// Types without a key are never persisted.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        let Some(idx) = self.ty.key_index() else {
            return false;
        };
        let slot = &self.slots[idx];
        match self.ty.key_validity() {
            Some(check) => check(slot),
            None => default_validity(slot),
        }
    }
}
