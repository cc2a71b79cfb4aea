//! Instantiation and field writes.
//!
//! Instantiation walks the declared fields in order. For each one it:
//! 1. takes the provided value, or falls back to the default, or leaves a
//!    partial field unset, or fails with `MissingRequiredField`
//! 2. converts it (composites instantiate their sub-entity recursively)
//! 3. runs the field's before-validators
//!
//! Once every slot is filled, entity validators run, then each set field's
//! after-validators. A write through [`Entity::set`] converts the value,
//! stores it, re-runs that field's after-validators and marks the field
//! dirty; a rejected write restores the previous value.

use crate::entity::{Entity, FieldValue};
use crate::entity_type::EntityType;
use crate::error::{SchemeError, SchemeResult};
use crate::field::Field;
use crate::logging;
use crate::validator;
use firmament_types::{Record, Value};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;

/// A value handed to a field, before conversion.
enum Provided {
    Value(Value),
    Entity(Entity),
}

/// Removes the field's input from `values`.
///
/// A composite field missing from the input also collects its sub-field
/// names found at top level, as long as those names are not declared on the
/// outer type.
fn take_provided(ty: &EntityType, idx: usize, values: &mut Record) -> Option<Provided> {
    let field = &ty.fields()[idx];
    match values.remove(field.name()) {
        Some(Value::Unset) | None => {}
        Some(value) => return Some(Provided::Value(value)),
    }
    let sub = field.value_type().composite_type()?;
    let mut flat = Record::new();
    for sub_field in sub.fields() {
        if ty.has_field(sub_field.name()) {
            continue;
        }
        match values.remove(sub_field.name()) {
            Some(Value::Unset) | None => {}
            Some(value) => {
                flat.insert(sub_field.name(), value);
            }
        }
    }
    (!flat.is_empty()).then_some(Provided::Value(Value::Record(flat)))
}

/// Input for the field at `idx`: provided, defaulted, or `None` for an
/// unset partial field.
fn provided_or_default(
    ty: &EntityType,
    idx: usize,
    values: &mut Record,
    forced_partial: bool,
) -> SchemeResult<Option<Provided>> {
    if let Some(provided) = take_provided(ty, idx, values) {
        return Ok(Some(provided));
    }
    if ty.field_is_partial(idx, forced_partial) {
        return Ok(None);
    }
    let field = &ty.fields()[idx];
    match field.default_value().materialize() {
        Some(value) => Ok(Some(Provided::Value(value))),
        None => Err(SchemeError::MissingRequiredField {
            entity: ty.name().to_string(),
            field: field.name().to_string(),
        }),
    }
}

fn sub_record(ty: &EntityType, field: &Field, value: Value) -> SchemeResult<Record> {
    match value {
        Value::Record(record) => Ok(record),
        Value::Map(map) => Ok(map.into_iter().collect()),
        other => Err(SchemeError::TypeConversion {
            entity: ty.name().to_string(),
            field: field.name().to_string(),
            reason: format!("expected a record for {}", field.value_type()),
            value: other,
        }),
    }
}

fn check_sub_entity(
    ty: &EntityType,
    field: &Field,
    expected: &EntityType,
    entity: &Entity,
) -> SchemeResult<()> {
    if entity.type_name() == expected.name() {
        return Ok(());
    }
    Err(SchemeError::TypeConversion {
        entity: ty.name().to_string(),
        field: field.name().to_string(),
        value: Value::Record(entity.dump(false)),
        reason: format!(
            "expected a {} instance, got {}",
            expected.name(),
            entity.type_name()
        ),
    })
}

fn not_composite(ty: &EntityType, field: &Field, entity: &Entity) -> SchemeError {
    SchemeError::TypeConversion {
        entity: ty.name().to_string(),
        field: field.name().to_string(),
        value: Value::Record(entity.dump(false)),
        reason: format!("{} field cannot hold a sub-entity", field.value_type()),
    }
}

/// Converts provided input into a slot. `partial` is the field's resolved
/// partiality, which a composite passes down to its sub-entity.
fn convert(
    ty: &EntityType,
    idx: usize,
    provided: Provided,
    partial: bool,
) -> SchemeResult<FieldValue> {
    let field = &ty.fields()[idx];
    match (field.value_type().composite_type(), provided) {
        (Some(sub), Provided::Value(value)) => {
            let record = sub_record(ty, field, value)?;
            let entity = Entity::construct(sub, record, partial)?;
            Ok(FieldValue::Composite(Box::new(entity)))
        }
        (Some(sub), Provided::Entity(entity)) => {
            check_sub_entity(ty, field, sub, &entity)?;
            Ok(FieldValue::Composite(Box::new(entity)))
        }
        (None, Provided::Value(value)) => field.convert(value).map(FieldValue::Set),
        (None, Provided::Entity(entity)) => Err(not_composite(ty, field, &entity)),
    }
}

async fn convert_async(
    ty: &EntityType,
    idx: usize,
    provided: Provided,
    partial: bool,
) -> SchemeResult<FieldValue> {
    let field = &ty.fields()[idx];
    match (field.value_type().composite_type(), provided) {
        (Some(sub), Provided::Value(value)) => {
            let record = sub_record(ty, field, value)?;
            let entity = Entity::construct_async(sub, record, partial).await?;
            Ok(FieldValue::Composite(Box::new(entity)))
        }
        (Some(sub), Provided::Entity(entity)) => {
            check_sub_entity(ty, field, sub, &entity)?;
            Ok(FieldValue::Composite(Box::new(entity)))
        }
        (None, Provided::Value(value)) => field.convert(value).map(FieldValue::Set),
        (None, Provided::Entity(entity)) => Err(not_composite(ty, field, &entity)),
    }
}

impl Entity {
    /// Builds an instance from provided values.
    ///
    /// Keys that name no declared field are ignored. A provided
    /// [`Value::Unset`] counts as absent. Fails with the first conversion,
    /// validation or missing-field error; no partial instance is returned.
    pub fn instantiate(ty: &Arc<EntityType>, values: Record) -> SchemeResult<Self> {
        Self::construct(ty, values, false)
    }

    /// Rebuilds an instance from a dumped record.
    pub fn load(ty: &Arc<EntityType>, record: Record) -> SchemeResult<Self> {
        Self::construct(ty, record, false)
    }

    /// Like [`instantiate`](Self::instantiate), awaiting asynchronous
    /// validators one at a time.
    pub async fn instantiate_async(ty: &Arc<EntityType>, values: Record) -> SchemeResult<Self> {
        Self::construct_async(ty, values, false).await
    }

    pub async fn load_async(ty: &Arc<EntityType>, record: Record) -> SchemeResult<Self> {
        Self::construct_async(ty, record, false).await
    }

    pub(crate) fn construct(
        ty: &Arc<EntityType>,
        mut values: Record,
        forced_partial: bool,
    ) -> SchemeResult<Self> {
        let mut entity = Self::blank(ty, forced_partial);
        logging::instantiating(ty, entity.id, values.len());
        for idx in 0..ty.len() {
            let Some(provided) = provided_or_default(ty, idx, &mut values, forced_partial)? else {
                continue;
            };
            let slot = convert(ty, idx, provided, ty.field_is_partial(idx, forced_partial))?;
            validator::run_before(ty, entity.id, &ty.fields()[idx], &slot)?;
            entity.slots[idx] = slot;
        }
        logging::ignored_input(ty, entity.id, &values);

        validator::run_entity(&entity)?;
        for idx in 0..ty.len() {
            if !entity.slots[idx].is_unset() {
                validator::run_after(&entity, idx)?;
            }
        }
        logging::instantiated(&entity);
        Ok(entity)
    }

    pub(crate) fn construct_async(
        ty: &Arc<EntityType>,
        mut values: Record,
        forced_partial: bool,
    ) -> BoxFuture<'_, SchemeResult<Self>> {
        async move {
            let mut entity = Self::blank(ty, forced_partial);
            logging::instantiating(ty, entity.id, values.len());
            for idx in 0..ty.len() {
                let Some(provided) = provided_or_default(ty, idx, &mut values, forced_partial)?
                else {
                    continue;
                };
                let partial = ty.field_is_partial(idx, forced_partial);
                let slot = convert_async(ty, idx, provided, partial).await?;
                validator::run_before_async(ty, entity.id, &ty.fields()[idx], &slot).await?;
                entity.slots[idx] = slot;
            }
            logging::ignored_input(ty, entity.id, &values);

            validator::run_entity_async(&entity).await?;
            for idx in 0..ty.len() {
                if !entity.slots[idx].is_unset() {
                    validator::run_after_async(&entity, idx).await?;
                }
            }
            logging::instantiated(&entity);
            Ok(entity)
        }
        .boxed()
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Converts and stores a value, then re-runs the field's after-validators.
    ///
    /// Setting [`Value::Unset`] is the same as [`unset`](Self::unset). On
    /// failure the instance is left as it was.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> SchemeResult<()> {
        let value = value.into();
        if value.is_unset() {
            return self.unset(name);
        }
        let ty = Arc::clone(&self.ty);
        let idx = ty.index_of(name)?;
        let partial = ty.field_is_partial(idx, self.forced_partial);
        let slot = convert(&ty, idx, Provided::Value(value), partial)?;
        self.commit(idx, slot)
    }

    pub async fn set_async(&mut self, name: &str, value: impl Into<Value>) -> SchemeResult<()> {
        let value = value.into();
        if value.is_unset() {
            return self.unset(name);
        }
        let ty = Arc::clone(&self.ty);
        let idx = ty.index_of(name)?;
        let partial = ty.field_is_partial(idx, self.forced_partial);
        let slot = convert_async(&ty, idx, Provided::Value(value), partial).await?;
        self.commit_async(idx, slot).await
    }

    /// Stores a sub-entity instance in a composite field.
    pub fn set_entity(&mut self, name: &str, entity: Entity) -> SchemeResult<()> {
        let ty = Arc::clone(&self.ty);
        let idx = ty.index_of(name)?;
        let slot = convert(&ty, idx, Provided::Entity(entity), false)?;
        self.commit(idx, slot)
    }

    pub async fn set_entity_async(&mut self, name: &str, entity: Entity) -> SchemeResult<()> {
        let ty = Arc::clone(&self.ty);
        let idx = ty.index_of(name)?;
        let slot = convert_async(&ty, idx, Provided::Entity(entity), false).await?;
        self.commit_async(idx, slot).await
    }

    /// Clears a partial field. Fails with `MissingRequiredField` when the
    /// field may not be unset.
    pub fn unset(&mut self, name: &str) -> SchemeResult<()> {
        let idx = self.ty.index_of(name)?;
        if !self.ty.field_is_partial(idx, self.forced_partial) {
            return Err(SchemeError::MissingRequiredField {
                entity: self.ty.name().to_string(),
                field: name.to_string(),
            });
        }
        if self.slots[idx].is_unset() {
            return Ok(());
        }
        self.slots[idx] = FieldValue::Unset;
        self.dirty.mark(idx);
        logging::field_set(self, idx);
        Ok(())
    }

    fn commit(&mut self, idx: usize, slot: FieldValue) -> SchemeResult<()> {
        let previous = std::mem::replace(&mut self.slots[idx], slot);
        if let Err(err) = validator::run_after(self, idx) {
            self.slots[idx] = previous;
            return Err(err);
        }
        self.dirty.mark(idx);
        logging::field_set(self, idx);
        Ok(())
    }

    async fn commit_async(&mut self, idx: usize, slot: FieldValue) -> SchemeResult<()> {
        let previous = std::mem::replace(&mut self.slots[idx], slot);
        if let Err(err) = validator::run_after_async(self, idx).await {
            self.slots[idx] = previous;
            return Err(err);
        }
        self.dirty.mark(idx);
        logging::field_set(self, idx);
        Ok(())
    }

    // ── Combining instances ──────────────────────────────────────

    /// Copies every set field of `source` that this type also declares,
    /// through [`set`](Self::set).
    pub fn merge(&mut self, source: &Entity) -> SchemeResult<()> {
        for (field, slot) in source.iter() {
            if !self.ty.has_field(field.name()) {
                continue;
            }
            match slot {
                FieldValue::Unset => {}
                FieldValue::Set(value) => self.set(field.name(), value.clone())?,
                FieldValue::Composite(sub) => self.set_entity(field.name(), (**sub).clone())?,
            }
        }
        Ok(())
    }

    /// Instantiates `ty` from the union of the parents' set fields; later
    /// parents win.
    pub fn from_parents(ty: &Arc<EntityType>, parents: &[&Entity]) -> SchemeResult<Self> {
        let mut values = Record::new();
        for parent in parents {
            values.extend(parent.dump(true));
        }
        Self::instantiate(ty, values)
    }
}
