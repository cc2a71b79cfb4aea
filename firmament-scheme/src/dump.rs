//! Dumping instances to records.

use crate::entity::{Entity, FieldValue};
use firmament_types::{Record, Value};
use std::collections::BTreeSet;

/// Selects which fields a dump emits and how.
///
/// Flag filters: a field is dropped when it carries every exclude flag; when
/// no exclude flags are active, a field is kept only if it carries every
/// include flag. Unset options fall back to the entity type's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpOptions {
    /// `None` uses the instance's partial flag.
    pub exclude_unset: Option<bool>,
    pub only_dirty: bool,
    pub exclude_key: bool,
    pub exclude_flags: Option<BTreeSet<String>>,
    pub include_flags: Option<BTreeSet<String>>,
    /// Emit composite sub-fields at top level instead of nested records.
    pub flatten_composites: bool,
}

fn flag_set<I, S>(flags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    flags.into_iter().map(Into::into).collect()
}

impl DumpOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn exclude_unset(mut self, exclude: bool) -> Self {
        self.exclude_unset = Some(exclude);
        self
    }

    #[must_use]
    pub fn only_dirty(mut self) -> Self {
        self.only_dirty = true;
        self
    }

    #[must_use]
    pub fn exclude_key(mut self) -> Self {
        self.exclude_key = true;
        self
    }

    #[must_use]
    pub fn exclude_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_flags = Some(flag_set(flags));
        self
    }

    #[must_use]
    pub fn include_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_flags = Some(flag_set(flags));
        self
    }

    #[must_use]
    pub fn flatten_composites(mut self) -> Self {
        self.flatten_composites = true;
        self
    }

    /// Options for a nested sub-entity: same unset handling and layout, no
    /// field selection.
    fn for_sub(&self, exclude_unset: bool) -> Self {
        Self {
            exclude_unset: Some(exclude_unset),
            flatten_composites: self.flatten_composites,
            ..Self::default()
        }
    }
}

impl Entity {
    /// Dumps every field in declaration order.
    ///
    /// With `exclude_unset` false, unset partial fields appear as
    /// [`Value::Unset`]. Composites dump as nested records.
    #[must_use]
    pub fn dump(&self, exclude_unset: bool) -> Record {
        self.dump_with(&DumpOptions::new().exclude_unset(exclude_unset))
    }

    #[must_use]
    pub fn dump_with(&self, options: &DumpOptions) -> Record {
        let ty = &self.ty;
        let exclude_unset = options.exclude_unset.unwrap_or_else(|| self.is_partial());
        let exclude_flags = options
            .exclude_flags
            .as_ref()
            .or_else(|| ty.default_exclude_flags())
            .filter(|flags| !flags.is_empty());
        let include_flags = options
            .include_flags
            .as_ref()
            .or_else(|| ty.default_include_flags())
            .filter(|flags| !flags.is_empty());

        let mut record = Record::with_capacity(ty.len());
        for (idx, (field, slot)) in self.iter().enumerate() {
            if options.only_dirty && !self.dirty.contains(idx) {
                continue;
            }
            if options.exclude_key && ty.key_index() == Some(idx) {
                continue;
            }
            if exclude_unset && slot.is_unset() {
                continue;
            }
            match (exclude_flags, include_flags) {
                (Some(exclude), _) if field.flags().is_superset(exclude) => continue,
                (None, Some(include)) if !field.flags().is_superset(include) => continue,
                _ => {}
            }
            match slot {
                FieldValue::Unset => {
                    record.insert(field.name(), Value::Unset);
                }
                FieldValue::Set(value) => {
                    record.insert(field.name(), value.clone());
                }
                FieldValue::Composite(sub) => {
                    let nested = sub.dump_with(&options.for_sub(exclude_unset));
                    if options.flatten_composites {
                        record.extend(nested);
                    } else {
                        record.insert(field.name(), Value::Record(nested));
                    }
                }
            }
        }
        record
    }
}
