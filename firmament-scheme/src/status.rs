//! Guarded status transitions for enum-valued fields.

use crate::entity::Entity;
use crate::error::{SchemeError, SchemeResult};
use firmament_types::Value;
use std::fmt;

/// Moves from `current` to `target`.
///
/// Already being at `target` is a no-op success. Otherwise `current` must be
/// one of `allowed_from`, or the call fails with `InvalidStatusTransition`.
pub fn transition<S>(current: S, target: S, allowed_from: &[S]) -> SchemeResult<S>
where
    S: PartialEq + fmt::Display,
{
    if current == target || allowed_from.contains(&current) {
        return Ok(target);
    }
    Err(SchemeError::InvalidStatusTransition {
        from: current.to_string(),
        to: target.to_string(),
    })
}

impl Entity {
    /// Applies a guarded transition to a status field and stores the result
    /// through [`set`](Entity::set). Returns whether the value changed.
    pub fn transition(
        &mut self,
        name: &str,
        target: impl Into<Value>,
        allowed_from: &[Value],
    ) -> SchemeResult<bool> {
        let current = self.value(name)?.clone();
        let target = transition(current.clone(), target.into(), allowed_from)?;
        if target == current {
            return Ok(false);
        }
        self.set(name, target)?;
        Ok(true)
    }
}
