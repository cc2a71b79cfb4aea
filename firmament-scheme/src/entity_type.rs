//! Entity types and their builder.
//!
//! An [`EntityType`] is the immutable, shared declaration of one kind of
//! entity: its ordered fields, key, partial flag, validator chains and
//! logging/dump defaults. Build one with [`EntityType::builder`]; the result
//! is wrapped in an `Arc` and shared by every instance.
//!
//! A type can extend a parent. The subtype starts from the parent's fields
//! in order; redeclaring a field replaces it in place. Parent validators run
//! before the subtype's own unless the subtype opts out with
//! [`EntityTypeBuilder::inherit_validators`].

use crate::config::SchemeConfig;
use crate::converter::ConverterMode;
use crate::entity::FieldValue;
use crate::error::{SchemeError, SchemeResult};
use crate::field::Field;
use crate::logging::LogSettings;
use crate::validator::{EntityValidator, FieldValidator};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Decides whether a key value identifies a persisted record.
pub type KeyValidity = Arc<dyn Fn(&FieldValue) -> bool + Send + Sync>;

/// Immutable declaration shared by all instances of one entity kind.
pub struct EntityType {
    name: String,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    key: Option<usize>,
    partial: bool,
    inherit_validators: bool,
    track_mutations: bool,
    validators: Vec<EntityValidator>,
    lineage: Vec<String>,
    key_validity: Option<KeyValidity>,
    exclude_flags: Option<BTreeSet<String>>,
    include_flags: Option<BTreeSet<String>>,
    log: LogSettings,
    converter_mode: ConverterMode,
}

impl EntityType {
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder::new(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field declarations in declaration order (inherited ones first).
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Index of a declared field, or `UnknownField`.
    pub fn index_of(&self, name: &str) -> SchemeResult<usize> {
        self.position(name).ok_or_else(|| SchemeError::UnknownField {
            entity: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn field(&self, name: &str) -> SchemeResult<&Field> {
        self.index_of(name).map(|idx| &self.fields[idx])
    }

    #[must_use]
    pub const fn key_index(&self) -> Option<usize> {
        self.key
    }

    /// The key field, or `MissingKey` if none is declared.
    pub fn key_field(&self) -> SchemeResult<&Field> {
        self.key
            .map(|idx| &self.fields[idx])
            .ok_or_else(|| SchemeError::MissingKey {
                entity: self.name.clone(),
            })
    }

    /// The type-level partial flag.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        self.partial
    }

    /// Whether the field at `idx` may stay unset. `forced` is set when the
    /// instance is a sub-entity of a partial composite field.
    #[must_use]
    pub fn field_is_partial(&self, idx: usize, forced: bool) -> bool {
        self.fields[idx]
            .partial_override()
            .unwrap_or(self.partial || forced)
    }

    #[must_use]
    pub const fn inherits_validators(&self) -> bool {
        self.inherit_validators
    }

    #[must_use]
    pub const fn tracks_mutations(&self) -> bool {
        self.track_mutations
    }

    /// Entity-level validators, parent ones first.
    #[must_use]
    pub fn validators(&self) -> &[EntityValidator] {
        &self.validators
    }

    /// Names of the ancestors, nearest first.
    #[must_use]
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    /// True if this type is `name` or extends it.
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        self.name == name || self.lineage.iter().any(|n| n == name)
    }

    #[must_use]
    pub const fn log_settings(&self) -> LogSettings {
        self.log
    }

    #[must_use]
    pub const fn converter_mode(&self) -> ConverterMode {
        self.converter_mode
    }

    pub(crate) const fn key_validity(&self) -> Option<&KeyValidity> {
        self.key_validity.as_ref()
    }

    pub(crate) const fn default_exclude_flags(&self) -> Option<&BTreeSet<String>> {
        self.exclude_flags.as_ref()
    }

    pub(crate) const fn default_include_flags(&self) -> Option<&BTreeSet<String>> {
        self.include_flags.as_ref()
    }

    /// True if instantiating this type can reach an asynchronous validator.
    #[must_use]
    pub fn has_async_validators(&self) -> bool {
        self.validators.iter().any(EntityValidator::is_async)
            || self.fields.iter().any(|f| {
                f.has_async_validators()
                    || f.value_type()
                        .composite_type()
                        .is_some_and(|sub| sub.has_async_validators())
            })
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("fields", &self.fields.iter().map(Field::name).collect::<Vec<_>>())
            .field("key", &self.key.map(|idx| self.fields[idx].name()))
            .field("partial", &self.partial)
            .field("lineage", &self.lineage)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntityType`].
pub struct EntityTypeBuilder {
    name: String,
    parent: Option<Arc<EntityType>>,
    fields: Vec<Field>,
    field_validators: Vec<(String, FieldValidator)>,
    validators: Vec<EntityValidator>,
    partial: Option<bool>,
    inherit_validators: bool,
    track_mutations: Option<bool>,
    key_validity: Option<KeyValidity>,
    exclude_flags: Option<BTreeSet<String>>,
    include_flags: Option<BTreeSet<String>>,
    log: Option<LogSettings>,
    converter_mode: Option<ConverterMode>,
}

impl EntityTypeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            fields: Vec::new(),
            field_validators: Vec::new(),
            validators: Vec::new(),
            partial: None,
            inherit_validators: true,
            track_mutations: None,
            key_validity: None,
            exclude_flags: None,
            include_flags: None,
            log: None,
            converter_mode: None,
        }
    }

    /// Starts from `parent`'s fields, validators and settings.
    #[must_use]
    pub fn extends(mut self, parent: &Arc<EntityType>) -> Self {
        self.parent = Some(Arc::clone(parent));
        self
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Attaches a validator to a field declared here or by a parent.
    #[must_use]
    pub fn field_validator(mut self, field: impl Into<String>, validator: FieldValidator) -> Self {
        self.field_validators.push((field.into(), validator));
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: EntityValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Sets the type-level partial flag.
    #[must_use]
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = Some(partial);
        self
    }

    /// Whether parent validators run before this type's own.
    #[must_use]
    pub fn inherit_validators(mut self, inherit: bool) -> Self {
        self.inherit_validators = inherit;
        self
    }

    /// Whether proxied mutations mark fields dirty.
    #[must_use]
    pub fn track_mutations(mut self, track: bool) -> Self {
        self.track_mutations = Some(track);
        self
    }

    /// Overrides how `is_persisted` judges the key value.
    #[must_use]
    pub fn key_validity<F>(mut self, check: F) -> Self
    where
        F: Fn(&FieldValue) -> bool + Send + Sync + 'static,
    {
        self.key_validity = Some(Arc::new(check));
        self
    }

    /// Dump flags excluded when a dump names none.
    #[must_use]
    pub fn exclude_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_flags = Some(flags.into_iter().map(Into::into).collect());
        self
    }

    /// Dump flags required when a dump names none.
    #[must_use]
    pub fn include_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_flags = Some(flags.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn logging(mut self, log: LogSettings) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn converter_mode(mut self, mode: ConverterMode) -> Self {
        self.converter_mode = Some(mode);
        self
    }

    /// Applies process-wide settings; explicit builder calls made afterwards
    /// still win.
    #[must_use]
    pub fn config(mut self, config: &SchemeConfig) -> Self {
        self.log = Some(config.log);
        self.track_mutations = Some(config.track_mutations);
        self.converter_mode = Some(config.converter_mode);
        self
    }

    /// Fixes the declaration.
    ///
    /// Fails with `Definition` on duplicate field names or more than one
    /// primary key, and with `UnknownField` when a field validator names an
    /// undeclared field.
    pub fn build(self) -> SchemeResult<Arc<EntityType>> {
        let name = self.name;
        let parent = self.parent.as_deref();
        let inherit = self.inherit_validators;

        let mut fields: Vec<Field> = Vec::new();
        let mut validators: Vec<EntityValidator> = Vec::new();
        if let Some(parent) = parent {
            for field in parent.fields() {
                let mut field = field.clone();
                if !inherit {
                    field.validators.clear();
                }
                fields.push(field);
            }
            if inherit {
                validators.extend(parent.validators().iter().cloned());
            }
        }

        let mut declared: BTreeSet<String> = BTreeSet::new();
        for mut field in self.fields {
            if !declared.insert(field.name.clone()) {
                return Err(SchemeError::Definition {
                    entity: name,
                    reason: format!("field {:?} is declared twice", field.name),
                });
            }
            match fields.iter().position(|f| f.name == field.name) {
                Some(idx) => {
                    let mut chain = std::mem::take(&mut fields[idx].validators);
                    chain.append(&mut field.validators);
                    field.validators = chain;
                    fields[idx] = field;
                }
                None => fields.push(field),
            }
        }

        for (field_name, validator) in self.field_validators {
            match fields.iter_mut().find(|f| f.name == field_name) {
                Some(field) => field.validators.push(validator),
                None => {
                    return Err(SchemeError::UnknownField {
                        entity: name,
                        field: field_name,
                    });
                }
            }
        }
        validators.extend(self.validators);

        let keys: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(idx, _)| idx)
            .collect();
        if keys.len() > 1 {
            let names: Vec<&str> = keys.iter().map(|&idx| fields[idx].name()).collect();
            return Err(SchemeError::Definition {
                reason: format!("more than one primary key: {}", names.join(", ")),
                entity: name,
            });
        }

        let converter_mode = self
            .converter_mode
            .or_else(|| parent.map(EntityType::converter_mode))
            .unwrap_or_default();
        for field in &mut fields {
            field.resolve(&name, converter_mode);
        }

        let index = fields
            .iter()
            .enumerate()
            .map(|(idx, f)| (f.name.clone(), idx))
            .collect();
        let lineage = parent
            .map(|p| {
                std::iter::once(p.name.clone())
                    .chain(p.lineage.iter().cloned())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Arc::new(EntityType {
            index,
            key: keys.first().copied(),
            fields,
            partial: self.partial.or(parent.map(|p| p.partial)).unwrap_or(false),
            inherit_validators: inherit,
            track_mutations: self
                .track_mutations
                .or(parent.map(|p| p.track_mutations))
                .unwrap_or(true),
            validators,
            lineage,
            key_validity: self
                .key_validity
                .or_else(|| parent.and_then(|p| p.key_validity.clone())),
            exclude_flags: self
                .exclude_flags
                .or_else(|| parent.and_then(|p| p.exclude_flags.clone())),
            include_flags: self
                .include_flags
                .or_else(|| parent.and_then(|p| p.include_flags.clone())),
            log: self
                .log
                .or(parent.map(|p| p.log))
                .unwrap_or_default(),
            converter_mode,
            name,
        }))
    }
}
