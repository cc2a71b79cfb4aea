//! Field declarations.
//!
//! A [`Field`] describes one attribute of an entity type: its name, declared
//! [`FieldType`], default, converter, validators and flags. Fields are built
//! with chained methods and handed to an [`EntityTypeBuilder`], which fixes
//! them into an immutable [`EntityType`].
//!
//! ```ignore
//! let email = Field::text("email")
//!     .converter(TextConverter::new().min_len(3))
//!     .after(|value, _entity| check_unique(value));
//! ```
//!
//! [`EntityTypeBuilder`]: crate::EntityTypeBuilder
//! [`EntityType`]: crate::EntityType

use crate::converter::{converter_for, Converter, ConverterMode};
use crate::entity::Entity;
use crate::entity_type::EntityType;
use crate::error::{SchemeError, SchemeResult};
use crate::validator::{CheckResult, FieldValidator};
use firmament_types::Value;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// The declared type of a field.
#[derive(Debug, Clone)]
pub enum FieldType {
    Any,
    Bool,
    Int,
    Float,
    Text,
    DateTime,
    List(Box<FieldType>),
    Set(Box<FieldType>),
    Map(Box<FieldType>),
    Optional(Box<FieldType>),
    /// A nested sub-entity with no independent identity.
    Composite(Arc<EntityType>),
}

impl FieldType {
    #[must_use]
    pub fn list(inner: Self) -> Self {
        Self::List(Box::new(inner))
    }

    #[must_use]
    pub fn set(inner: Self) -> Self {
        Self::Set(Box::new(inner))
    }

    #[must_use]
    pub fn map(inner: Self) -> Self {
        Self::Map(Box::new(inner))
    }

    #[must_use]
    pub fn optional(inner: Self) -> Self {
        Self::Optional(Box::new(inner))
    }

    /// The sub-entity type of a composite field.
    #[must_use]
    pub const fn composite_type(&self) -> Option<&Arc<EntityType>> {
        match self {
            Self::Composite(ty) => Some(ty),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// True for types whose values are changed in place through proxies.
    #[must_use]
    pub const fn is_mutable(&self) -> bool {
        matches!(
            self,
            Self::List(_) | Self::Set(_) | Self::Map(_) | Self::Composite(_)
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Text => f.write_str("text"),
            Self::DateTime => f.write_str("datetime"),
            Self::List(inner) => write!(f, "list<{inner}>"),
            Self::Set(inner) => write!(f, "set<{inner}>"),
            Self::Map(inner) => write!(f, "map<{inner}>"),
            Self::Optional(inner) => write!(f, "optional<{inner}>"),
            Self::Composite(ty) => write!(f, "composite<{}>", ty.name()),
        }
    }
}

/// Default for a field that receives no value.
///
/// A factory runs once per instantiation, so containers are never shared
/// between instances.
#[derive(Clone, Default)]
pub enum DefaultValue {
    #[default]
    None,
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    /// Produces the default, if one is declared.
    #[must_use]
    pub fn materialize(&self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Value(value) => Some(value.clone()),
            Self::Factory(factory) => Some(factory()),
        }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Declaration of one entity attribute.
#[derive(Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) value_type: FieldType,
    pub(crate) default: DefaultValue,
    pub(crate) converter: Option<Arc<dyn Converter>>,
    pub(crate) resolved: Option<Arc<dyn Converter>>,
    pub(crate) primary_key: bool,
    pub(crate) partial: Option<bool>,
    pub(crate) validators: Vec<FieldValidator>,
    pub(crate) dump_flags: BTreeSet<String>,
    pub(crate) redacted: bool,
    /// Name of the entity type the field was built into.
    pub(crate) owner: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value_type: FieldType) -> Self {
        Self {
            name: name.into(),
            value_type,
            default: DefaultValue::None,
            converter: None,
            resolved: None,
            primary_key: false,
            partial: None,
            validators: Vec::new(),
            dump_flags: BTreeSet::new(),
            redacted: false,
            owner: String::new(),
        }
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Any)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Bool)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::DateTime)
    }

    pub fn list(name: impl Into<String>, element: FieldType) -> Self {
        Self::new(name, FieldType::list(element))
    }

    pub fn set(name: impl Into<String>, element: FieldType) -> Self {
        Self::new(name, FieldType::set(element))
    }

    pub fn map(name: impl Into<String>, value: FieldType) -> Self {
        Self::new(name, FieldType::map(value))
    }

    pub fn optional(name: impl Into<String>, inner: FieldType) -> Self {
        Self::new(name, FieldType::optional(inner))
    }

    pub fn composite(name: impl Into<String>, sub: &Arc<EntityType>) -> Self {
        Self::new(name, FieldType::Composite(Arc::clone(sub)))
    }

    // ── Declaration ──────────────────────────────────────────────

    /// Marks this field as the entity type's key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// The field may stay unset, whatever the entity type says.
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.partial = Some(true);
        self
    }

    /// The field must receive a value, whatever the entity type says.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.partial = Some(false);
        self
    }

    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = DefaultValue::Value(value.into());
        self
    }

    /// Declares a default produced fresh for every instance.
    #[must_use]
    pub fn default_with<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = DefaultValue::Factory(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: FieldValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Adds a check that runs on the converted value before it is stored.
    #[must_use]
    pub fn before<F>(self, check: F) -> Self
    where
        F: Fn(&Value) -> CheckResult + Send + Sync + 'static,
    {
        self.validator(FieldValidator::before(check))
    }

    #[must_use]
    pub fn before_async<F>(self, check: F) -> Self
    where
        F: for<'a> Fn(&'a Value) -> BoxFuture<'a, CheckResult> + Send + Sync + 'static,
    {
        self.validator(FieldValidator::before_async(check))
    }

    /// Adds a check that sees the value together with the whole instance.
    #[must_use]
    pub fn after<F>(self, check: F) -> Self
    where
        F: Fn(&Value, &Entity) -> CheckResult + Send + Sync + 'static,
    {
        self.validator(FieldValidator::after(check))
    }

    #[must_use]
    pub fn after_async<F>(self, check: F) -> Self
    where
        F: for<'a> Fn(&'a Value, &'a Entity) -> BoxFuture<'a, CheckResult>
            + Send
            + Sync
            + 'static,
    {
        self.validator(FieldValidator::after_async(check))
    }

    /// Tags used by flag-filtered dumps.
    #[must_use]
    pub fn dump_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dump_flags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Never write this field's value to logs.
    #[must_use]
    pub fn redacted(mut self) -> Self {
        self.redacted = true;
        self
    }

    // ── Accessors ────────────────────────────────────────────────

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn value_type(&self) -> &FieldType {
        &self.value_type
    }

    #[must_use]
    pub const fn default_value(&self) -> &DefaultValue {
        &self.default
    }

    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// The field's own partiality; `None` defers to the entity type.
    #[must_use]
    pub const fn partial_override(&self) -> Option<bool> {
        self.partial
    }

    #[must_use]
    pub fn validators(&self) -> &[FieldValidator] {
        &self.validators
    }

    #[must_use]
    pub const fn flags(&self) -> &BTreeSet<String> {
        &self.dump_flags
    }

    #[must_use]
    pub const fn is_redacted(&self) -> bool {
        self.redacted
    }

    /// Name of the entity type this field belongs to (empty before build).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Declarations of a composite field's sub-entity, in order.
    #[must_use]
    pub fn sub_fields(&self) -> &[Field] {
        self.value_type
            .composite_type()
            .map_or(&[][..], |sub| sub.fields())
    }

    pub(crate) fn has_async_validators(&self) -> bool {
        self.validators.iter().any(FieldValidator::is_async)
    }

    /// Runs the field's converter over a raw value.
    ///
    /// The converter is the explicit one if declared, otherwise the one
    /// derived from the declared type in the entity type's converter mode.
    pub fn convert(&self, value: Value) -> SchemeResult<Value> {
        let converter = match (&self.converter, &self.resolved) {
            (Some(explicit), _) => Arc::clone(explicit),
            (None, Some(resolved)) => Arc::clone(resolved),
            (None, None) => converter_for(&self.value_type, ConverterMode::Base),
        };
        let original = value.clone();
        converter
            .convert(value)
            .map_err(|e| SchemeError::TypeConversion {
                entity: self.owner.clone(),
                field: self.name.clone(),
                value: original,
                reason: e.reason().to_string(),
            })
    }

    pub(crate) fn resolve(&mut self, owner: &str, mode: ConverterMode) {
        owner.clone_into(&mut self.owner);
        self.resolved = Some(match &self.converter {
            Some(explicit) => Arc::clone(explicit),
            None => converter_for(&self.value_type, mode),
        });
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("value_type", &format_args!("{}", self.value_type))
            .field("default", &self.default)
            .field("primary_key", &self.primary_key)
            .field("partial", &self.partial)
            .field("validators", &self.validators.len())
            .field("dump_flags", &self.dump_flags)
            .field("redacted", &self.redacted)
            .finish_non_exhaustive()
    }
}
