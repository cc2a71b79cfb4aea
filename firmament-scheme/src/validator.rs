//! Field and entity validators, and the runners that apply them in order.
//!
//! A field validator runs in one of two phases:
//! - [`Phase::Before`]: on the converted value, before it is stored; sees no
//!   siblings
//! - [`Phase::After`]: on the stored value together with the whole instance
//!
//! Entity validators always run after instantiation. Any validator may be
//! asynchronous; the synchronous entry points refuse to run those and fail
//! with [`SchemeError::AsyncValidatorInSyncContext`].

use crate::entity::{Entity, FieldValue};
use crate::entity_type::EntityType;
use crate::error::{SchemeError, SchemeResult};
use crate::field::Field;
use crate::logging;
use firmament_types::{InstanceId, Value};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Outcome of a single check; the error is the user-facing message.
pub type CheckResult = Result<(), String>;

/// When a field validator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Before => "before",
            Self::After => "after",
        })
    }
}

type BeforeFn = dyn Fn(&Value) -> CheckResult + Send + Sync;
type BeforeAsyncFn = dyn for<'a> Fn(&'a Value) -> BoxFuture<'a, CheckResult> + Send + Sync;
type AfterFn = dyn Fn(&Value, &Entity) -> CheckResult + Send + Sync;
type AfterAsyncFn =
    dyn for<'a> Fn(&'a Value, &'a Entity) -> BoxFuture<'a, CheckResult> + Send + Sync;
type EntityFn = dyn Fn(&Entity) -> CheckResult + Send + Sync;
type EntityAsyncFn = dyn for<'a> Fn(&'a Entity) -> BoxFuture<'a, CheckResult> + Send + Sync;

#[derive(Clone)]
enum FieldCheck {
    Before(Arc<BeforeFn>),
    BeforeAsync(Arc<BeforeAsyncFn>),
    After(Arc<AfterFn>),
    AfterAsync(Arc<AfterAsyncFn>),
}

/// A check bound to one field.
#[derive(Clone)]
pub struct FieldValidator {
    check: FieldCheck,
}

impl FieldValidator {
    pub fn before<F>(check: F) -> Self
    where
        F: Fn(&Value) -> CheckResult + Send + Sync + 'static,
    {
        Self {
            check: FieldCheck::Before(Arc::new(check)),
        }
    }

    pub fn before_async<F>(check: F) -> Self
    where
        F: for<'a> Fn(&'a Value) -> BoxFuture<'a, CheckResult> + Send + Sync + 'static,
    {
        Self {
            check: FieldCheck::BeforeAsync(Arc::new(check)),
        }
    }

    pub fn after<F>(check: F) -> Self
    where
        F: Fn(&Value, &Entity) -> CheckResult + Send + Sync + 'static,
    {
        Self {
            check: FieldCheck::After(Arc::new(check)),
        }
    }

    pub fn after_async<F>(check: F) -> Self
    where
        F: for<'a> Fn(&'a Value, &'a Entity) -> BoxFuture<'a, CheckResult>
            + Send
            + Sync
            + 'static,
    {
        Self {
            check: FieldCheck::AfterAsync(Arc::new(check)),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self.check {
            FieldCheck::Before(_) | FieldCheck::BeforeAsync(_) => Phase::Before,
            FieldCheck::After(_) | FieldCheck::AfterAsync(_) => Phase::After,
        }
    }

    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(
            self.check,
            FieldCheck::BeforeAsync(_) | FieldCheck::AfterAsync(_)
        )
    }
}

impl fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldValidator")
            .field("phase", &self.phase())
            .field("async", &self.is_async())
            .finish()
    }
}

#[derive(Clone)]
enum EntityCheck {
    Sync(Arc<EntityFn>),
    Async(Arc<EntityAsyncFn>),
}

/// A check over the whole instance, run once after instantiation.
#[derive(Clone)]
pub struct EntityValidator {
    check: EntityCheck,
}

impl EntityValidator {
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Entity) -> CheckResult + Send + Sync + 'static,
    {
        Self {
            check: EntityCheck::Sync(Arc::new(check)),
        }
    }

    pub fn new_async<F>(check: F) -> Self
    where
        F: for<'a> Fn(&'a Entity) -> BoxFuture<'a, CheckResult> + Send + Sync + 'static,
    {
        Self {
            check: EntityCheck::Async(Arc::new(check)),
        }
    }

    #[must_use]
    pub const fn is_async(&self) -> bool {
        matches!(self.check, EntityCheck::Async(_))
    }
}

impl fmt::Debug for EntityValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityValidator")
            .field("async", &self.is_async())
            .finish()
    }
}

// ── Runners ──────────────────────────────────────────────────────

/// The value validators see for a slot: composites as their dumped record.
pub(crate) fn slot_value(slot: &FieldValue) -> Cow<'_, Value> {
    match slot {
        FieldValue::Set(value) => Cow::Borrowed(value),
        FieldValue::Composite(sub) => Cow::Owned(Value::Record(sub.dump(false))),
        FieldValue::Unset => Cow::Owned(Value::Unset),
    }
}

fn rejected(
    ty: &EntityType,
    field: Option<&Field>,
    value: Option<&Value>,
    message: String,
) -> SchemeError {
    let err = SchemeError::Validation {
        entity: ty.name().to_string(),
        field: field.map(|f| f.name().to_string()),
        value: value.cloned(),
        message,
    };
    logging::validation_failed(ty, &err);
    err
}

fn async_in_sync(ty: &EntityType, field: Option<&Field>) -> SchemeError {
    SchemeError::AsyncValidatorInSyncContext {
        entity: ty.name().to_string(),
        field: field.map(|f| f.name().to_string()),
    }
}

/// Runs a field's before-validators over a converted slot.
pub(crate) fn run_before(
    ty: &EntityType,
    id: InstanceId,
    field: &Field,
    slot: &FieldValue,
) -> SchemeResult<()> {
    let mut checks = field
        .validators()
        .iter()
        .filter(|v| v.phase() == Phase::Before)
        .peekable();
    if checks.peek().is_none() {
        return Ok(());
    }
    let shown = slot_value(slot);
    let value: &Value = &shown;
    for validator in checks {
        logging::validator_entry(ty, id, Some(field), Phase::Before, Some(value));
        let outcome = match &validator.check {
            FieldCheck::Before(check) => check(value),
            FieldCheck::BeforeAsync(_) => return Err(async_in_sync(ty, Some(field))),
            FieldCheck::After(_) | FieldCheck::AfterAsync(_) => continue,
        };
        outcome.map_err(|message| rejected(ty, Some(field), Some(value), message))?;
    }
    Ok(())
}

pub(crate) async fn run_before_async(
    ty: &EntityType,
    id: InstanceId,
    field: &Field,
    slot: &FieldValue,
) -> SchemeResult<()> {
    if !field.validators().iter().any(|v| v.phase() == Phase::Before) {
        return Ok(());
    }
    let shown = slot_value(slot);
    let value: &Value = &shown;
    for validator in field.validators() {
        let outcome = match &validator.check {
            FieldCheck::Before(check) => {
                logging::validator_entry(ty, id, Some(field), Phase::Before, Some(value));
                check(value)
            }
            FieldCheck::BeforeAsync(check) => {
                logging::validator_entry(ty, id, Some(field), Phase::Before, Some(value));
                check(value).await
            }
            FieldCheck::After(_) | FieldCheck::AfterAsync(_) => continue,
        };
        outcome.map_err(|message| rejected(ty, Some(field), Some(value), message))?;
    }
    Ok(())
}

/// Runs the after-validators of the field at `idx` against the instance as
/// it currently stands.
pub(crate) fn run_after(entity: &Entity, idx: usize) -> SchemeResult<()> {
    let ty = entity.entity_type();
    let field = &ty.fields()[idx];
    let mut checks = field
        .validators()
        .iter()
        .filter(|v| v.phase() == Phase::After)
        .peekable();
    if checks.peek().is_none() {
        return Ok(());
    }
    let shown = slot_value(entity.slot(idx));
    let value: &Value = &shown;
    for validator in checks {
        logging::validator_entry(ty, entity.id(), Some(field), Phase::After, Some(value));
        let outcome = match &validator.check {
            FieldCheck::After(check) => check(value, entity),
            FieldCheck::AfterAsync(_) => return Err(async_in_sync(ty, Some(field))),
            FieldCheck::Before(_) | FieldCheck::BeforeAsync(_) => continue,
        };
        outcome.map_err(|message| rejected(ty, Some(field), Some(value), message))?;
    }
    Ok(())
}

pub(crate) async fn run_after_async(entity: &Entity, idx: usize) -> SchemeResult<()> {
    let ty = entity.entity_type();
    let field = &ty.fields()[idx];
    if !field.validators().iter().any(|v| v.phase() == Phase::After) {
        return Ok(());
    }
    let shown = slot_value(entity.slot(idx));
    let value: &Value = &shown;
    for validator in field.validators() {
        let outcome = match &validator.check {
            FieldCheck::After(check) => {
                logging::validator_entry(ty, entity.id(), Some(field), Phase::After, Some(value));
                check(value, entity)
            }
            FieldCheck::AfterAsync(check) => {
                logging::validator_entry(ty, entity.id(), Some(field), Phase::After, Some(value));
                check(value, entity).await
            }
            FieldCheck::Before(_) | FieldCheck::BeforeAsync(_) => continue,
        };
        outcome.map_err(|message| rejected(ty, Some(field), Some(value), message))?;
    }
    Ok(())
}

/// Runs the entity type's own validators.
pub(crate) fn run_entity(entity: &Entity) -> SchemeResult<()> {
    let ty = entity.entity_type();
    for validator in ty.validators() {
        logging::validator_entry(ty, entity.id(), None, Phase::After, None);
        let outcome = match &validator.check {
            EntityCheck::Sync(check) => check(entity),
            EntityCheck::Async(_) => return Err(async_in_sync(ty, None)),
        };
        outcome.map_err(|message| rejected(ty, None, None, message))?;
    }
    Ok(())
}

pub(crate) async fn run_entity_async(entity: &Entity) -> SchemeResult<()> {
    let ty = entity.entity_type();
    for validator in ty.validators() {
        logging::validator_entry(ty, entity.id(), None, Phase::After, None);
        let outcome = match &validator.check {
            EntityCheck::Sync(check) => check(entity),
            EntityCheck::Async(check) => check(entity).await,
        };
        outcome.map_err(|message| rejected(ty, None, None, message))?;
    }
    Ok(())
}
