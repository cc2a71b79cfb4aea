//! Filter and predicate projection.
//!
//! A [`Filter`] is a conjunction of [`Predicate`]s that data-access
//! collaborators translate into their own query language. Projecting a
//! scalar field yields one predicate with the value run through the field's
//! converter. Projecting a composite field yields one predicate per
//! sub-field, in the composite's declaration order, recursing into nested
//! composites.

use crate::entity::{Entity, FieldValue};
use crate::entity_type::EntityType;
use crate::error::{SchemeError, SchemeResult};
use crate::field::Field;
use firmament_types::{Record, Value};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;

/// Comparison a predicate applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equality.
    Eq,
    /// Identity against `true`, `false` or null.
    Is,
}

impl Operator {
    /// Name used in tuple renderings.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Is => "is_",
        }
    }

    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Is => "IS",
        }
    }
}

/// One `field <op> value` condition.
#[derive(Clone)]
pub struct Predicate {
    field: Field,
    op: Operator,
    value: Value,
}

impl Predicate {
    /// The declaration the predicate is about (a sub-field for composites).
    #[must_use]
    pub const fn field(&self) -> &Field {
        &self.field
    }

    #[must_use]
    pub fn field_name(&self) -> &str {
        self.field.name()
    }

    #[must_use]
    pub const fn op(&self) -> Operator {
        self.op
    }

    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// `(operator name, (field name, value))`.
    #[must_use]
    pub fn dump_to_tuple(&self) -> (&'static str, (String, Value)) {
        (
            self.op.name(),
            (self.field.name().to_string(), self.value.clone()),
        )
    }

    #[must_use]
    pub fn dump_to_sql(&self) -> String {
        format!(
            "{} {} {}",
            self.field.name(),
            self.op.sql(),
            sql_literal(&self.value)
        )
    }
}

fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null | Value::Unset => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(_) | Value::Float(_) => value.to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.field.name() == other.field.name()
            && self.field.owner() == other.field.owner()
            && self.op == other.op
            && self.value == other.value
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("field", &self.field.name())
            .field("op", &self.op)
            .field("value", &self.value)
            .finish()
    }
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Predicate", 3)?;
        state.serialize_field("field", self.field.name())?;
        state.serialize_field("op", &self.op)?;
        state.serialize_field("value", &self.value)?;
        state.end()
    }
}

/// A conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Predicate> {
        self.predicates.iter()
    }

    /// Conjunction of both filters.
    #[must_use]
    pub fn and(mut self, other: Self) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    /// Predicates joined with `AND`.
    #[must_use]
    pub fn dump_to_sql(&self) -> String {
        self.predicates
            .iter()
            .map(Predicate::dump_to_sql)
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl IntoIterator for Filter {
    type Item = Predicate;
    type IntoIter = std::vec::IntoIter<Predicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.predicates.into_iter()
    }
}

impl<'a> IntoIterator for &'a Filter {
    type Item = &'a Predicate;
    type IntoIter = std::slice::Iter<'a, Predicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.predicates.iter()
    }
}

// ── Projection ───────────────────────────────────────────────────

impl Field {
    /// Projects `self == value` into a filter.
    ///
    /// A composite field takes a record (or map) holding every sub-field;
    /// a missing sub-field fails with `CompositeKeyMismatch`.
    pub fn equals(&self, value: impl Into<Value>) -> SchemeResult<Filter> {
        let mut filter = Filter::new();
        self.project_eq(value.into(), &mut filter.predicates)?;
        Ok(filter)
    }

    /// Projects equality with a composite sub-entity instance.
    pub fn equals_entity(&self, entity: &Entity) -> SchemeResult<Filter> {
        if let Some(sub) = self.value_type().composite_type() {
            if entity.type_name() != sub.name() {
                return Err(SchemeError::TypeConversion {
                    entity: self.owner().to_string(),
                    field: self.name().to_string(),
                    value: Value::Record(entity.dump(false)),
                    reason: format!("expected a {} instance, got {}", sub.name(), entity.type_name()),
                });
            }
        }
        self.equals(Value::Record(entity.dump(false)))
    }

    /// Projects `self IS value`, where `None` means null.
    #[must_use]
    pub fn is(&self, value: Option<bool>) -> Filter {
        Filter {
            predicates: vec![Predicate {
                field: self.clone(),
                op: Operator::Is,
                value: Value::from(value),
            }],
        }
    }

    fn project_eq(&self, value: Value, out: &mut Vec<Predicate>) -> SchemeResult<()> {
        let Some(sub) = self.value_type().composite_type() else {
            out.push(Predicate {
                field: self.clone(),
                op: Operator::Eq,
                value: self.convert(value)?,
            });
            return Ok(());
        };
        let mut record: Record = match value {
            Value::Record(record) => record,
            Value::Map(map) => map.into_iter().collect(),
            other => {
                return Err(SchemeError::TypeConversion {
                    entity: self.owner().to_string(),
                    field: self.name().to_string(),
                    value: other,
                    reason: format!("expected a record for {}", self.value_type()),
                });
            }
        };
        let missing: Vec<String> = sub
            .fields()
            .iter()
            .filter(|f| record.get(f.name()).is_none_or(Value::is_unset))
            .map(|f| f.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SchemeError::CompositeKeyMismatch {
                entity: self.owner().to_string(),
                field: self.name().to_string(),
                missing,
            });
        }
        for sub_field in sub.fields() {
            if let Some(value) = record.remove(sub_field.name()) {
                sub_field.project_eq(value, out)?;
            }
        }
        Ok(())
    }
}

impl EntityType {
    /// Projects `name == value`; fails with `UnknownField` for undeclared
    /// names.
    pub fn filter(&self, name: &str, value: impl Into<Value>) -> SchemeResult<Filter> {
        self.field(name)?.equals(value)
    }
}

impl Entity {
    /// Equality filter on the key field's current value.
    pub fn key_filter(&self) -> SchemeResult<Filter> {
        let field = self.ty.key_field()?;
        slot_filter(self, field)
    }

    /// Equality predicates for every set field.
    pub fn equals_filter(&self) -> SchemeResult<Filter> {
        let mut filter = Filter::new();
        for (field, slot) in self.iter() {
            if !slot.is_unset() {
                filter = filter.and(slot_filter(self, field)?);
            }
        }
        Ok(filter)
    }
}

fn slot_filter(entity: &Entity, field: &Field) -> SchemeResult<Filter> {
    match entity.get(field.name())? {
        FieldValue::Set(value) => field.equals(value.clone()),
        FieldValue::Composite(sub) => field.equals_entity(sub),
        FieldValue::Unset => Err(SchemeError::UnsetField {
            entity: entity.type_name().to_string(),
            field: field.name().to_string(),
        }),
    }
}
