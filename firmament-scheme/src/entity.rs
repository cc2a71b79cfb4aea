//! Entity instances.
//!
//! An [`Entity`] holds one slot per declared field, parallel to its type's
//! field list, plus the set of fields written since construction. Reads go
//! through [`Entity::get`], [`Entity::value`] and [`Entity::composite`];
//! writes go through the pipeline (`set`, `set_entity`, `unset`) or through
//! mutation proxies. Construction lives in the pipeline module.

use crate::dirty::DirtyFields;
use crate::entity_type::EntityType;
use crate::error::{SchemeError, SchemeResult};
use crate::field::Field;
use firmament_types::{InstanceId, Value};
use std::fmt;
use std::sync::Arc;

/// State of one field slot.
#[derive(Debug, Clone, Default)]
pub enum FieldValue {
    /// A partial field that holds no value.
    #[default]
    Unset,
    Set(Value),
    /// A composite field's sub-entity.
    Composite(Box<Entity>),
}

impl FieldValue {
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Set(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Composite(sub) => Some(sub),
            _ => None,
        }
    }

    /// The slot as a plain value; composites become their full dump.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Unset => Value::Unset,
            Self::Set(value) => value.clone(),
            Self::Composite(sub) => Value::Record(sub.dump(false)),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unset, Self::Unset) => true,
            (Self::Set(a), Self::Set(b)) => a == b,
            (Self::Composite(a), Self::Composite(b)) => a == b,
            _ => false,
        }
    }
}

/// One in-memory record of an entity type.
///
/// A clone is a deep copy that keeps the instance id.
#[derive(Clone)]
pub struct Entity {
    pub(crate) ty: Arc<EntityType>,
    pub(crate) id: InstanceId,
    pub(crate) slots: Vec<FieldValue>,
    pub(crate) dirty: DirtyFields,
    /// Set for sub-entities of a partial composite field.
    pub(crate) forced_partial: bool,
}

impl Entity {
    pub(crate) fn blank(ty: &Arc<EntityType>, forced_partial: bool) -> Self {
        Self {
            ty: Arc::clone(ty),
            id: InstanceId::new(),
            slots: vec![FieldValue::Unset; ty.len()],
            dirty: DirtyFields::default(),
            forced_partial,
        }
    }

    #[must_use]
    pub const fn entity_type(&self) -> &Arc<EntityType> {
        &self.ty
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Whether fields without an override may stay unset.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.ty.is_partial() || self.forced_partial
    }

    pub(crate) fn slot(&self, idx: usize) -> &FieldValue {
        &self.slots[idx]
    }

    /// Slots in declaration order.
    #[must_use]
    pub fn slots(&self) -> &[FieldValue] {
        &self.slots
    }

    /// Declarations paired with their slots, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Field, &FieldValue)> {
        self.ty.fields().iter().zip(&self.slots)
    }

    pub fn get(&self, name: &str) -> SchemeResult<&FieldValue> {
        let idx = self.ty.index_of(name)?;
        Ok(&self.slots[idx])
    }

    /// The stored value of a non-composite field.
    ///
    /// Fails with `UnsetField` for an unset partial field.
    pub fn value(&self, name: &str) -> SchemeResult<&Value> {
        let idx = self.ty.index_of(name)?;
        match &self.slots[idx] {
            FieldValue::Set(value) => Ok(value),
            FieldValue::Unset => Err(self.unset_error(idx)),
            FieldValue::Composite(sub) => Err(SchemeError::TypeConversion {
                entity: self.ty.name().to_string(),
                field: name.to_string(),
                value: Value::Record(sub.dump(false)),
                reason: "field holds a sub-entity".to_string(),
            }),
        }
    }

    /// The sub-entity of a composite field.
    pub fn composite(&self, name: &str) -> SchemeResult<&Entity> {
        let idx = self.ty.index_of(name)?;
        match &self.slots[idx] {
            FieldValue::Composite(sub) => Ok(sub),
            FieldValue::Unset => Err(self.unset_error(idx)),
            FieldValue::Set(value) => Err(SchemeError::TypeConversion {
                entity: self.ty.name().to_string(),
                field: name.to_string(),
                value: value.clone(),
                reason: "field is not composite".to_string(),
            }),
        }
    }

    pub fn is_set(&self, name: &str) -> SchemeResult<bool> {
        self.get(name).map(|slot| !slot.is_unset())
    }

    pub(crate) fn unset_error(&self, idx: usize) -> SchemeError {
        SchemeError::UnsetField {
            entity: self.ty.name().to_string(),
            field: self.ty.fields()[idx].name().to_string(),
        }
    }

    // ── Dirty tracking ───────────────────────────────────────────

    /// Names of fields written since construction, in declaration order.
    #[must_use]
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.dirty
            .iter()
            .map(|idx| self.ty.fields()[idx].name())
            .collect()
    }

    #[must_use]
    pub fn is_dirty(&self, name: &str) -> bool {
        self.ty
            .position(name)
            .is_some_and(|idx| self.dirty.contains(idx))
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Returns the dirty field names and clears the set, e.g. after the
    /// changes were persisted.
    pub fn take_dirty(&mut self) -> Vec<String> {
        self.dirty
            .take()
            .into_iter()
            .map(|idx| self.ty.fields()[idx].name().to_string())
            .collect()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Renders `name=value` pairs for every set field, comma separated.
    #[must_use]
    pub fn dump_to_str(&self) -> String {
        self.to_string()
    }
}

/// Same type and equal slots; ids and dirty marks are ignored.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.ty.name() == other.ty.name() && self.slots == other.slots
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, slot) in self.iter() {
            if slot.is_unset() {
                continue;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match slot {
                FieldValue::Set(value) => write!(f, "{}={value}", field.name())?,
                FieldValue::Composite(sub) => write!(f, "{}={}", field.name(), sub.dump(false))?,
                FieldValue::Unset => {}
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.ty.name())
            .field("id", &self.id)
            .field(
                "slots",
                &self.iter().map(|(field, slot)| (field.name(), slot)).collect::<Vec<_>>(),
            )
            .field("dirty", &self.dirty_fields())
            .finish()
    }
}
