//! Value converters.
//!
//! A converter turns raw input into the value a field stores. Every built-in
//! converter runs in one of two modes:
//! - [`ConverterMode::Base`] coerces compatible inputs (numeric text to int,
//!   list to set, RFC 3339 text to datetime, ...)
//! - [`ConverterMode::Strict`] accepts only the exact target kind
//!
//! Fields without an explicit converter get one derived from their
//! [`FieldType`] via [`converter_for`].

use crate::field::FieldType;
use chrono::{DateTime, Utc};
use firmament_types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Why a converter rejected its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConversionError(String);

impl ConversionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.0
    }
}

fn expected(kind: &str, value: &Value) -> ConversionError {
    ConversionError(format!("expected {kind}, got {}", value.kind()))
}

/// Coerces raw input into a field's stored value.
pub trait Converter: fmt::Debug + Send + Sync {
    fn convert(&self, value: Value) -> Result<Value, ConversionError>;
}

/// How permissive a built-in converter is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterMode {
    #[default]
    Base,
    Strict,
}

impl ConverterMode {
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// Derives the converter for a declared type.
///
/// Composite fields convert by instantiating their sub-entity type, so they
/// get a pass-through converter here.
#[must_use]
pub fn converter_for(value_type: &FieldType, mode: ConverterMode) -> Arc<dyn Converter> {
    match value_type {
        FieldType::Any | FieldType::Composite(_) => Arc::new(AnyConverter),
        FieldType::Bool => Arc::new(BoolConverter::new().mode(mode)),
        FieldType::Int => Arc::new(IntConverter::new().mode(mode)),
        FieldType::Float => Arc::new(FloatConverter::new().mode(mode)),
        FieldType::Text => Arc::new(TextConverter::new().allow_empty().mode(mode)),
        FieldType::DateTime => Arc::new(DateTimeConverter::new().mode(mode)),
        FieldType::List(inner) => {
            Arc::new(ListConverter::new(converter_for(inner, mode)).mode(mode))
        }
        FieldType::Set(inner) => Arc::new(SetConverter::new(converter_for(inner, mode)).mode(mode)),
        FieldType::Map(inner) => Arc::new(MapConverter::new(converter_for(inner, mode)).mode(mode)),
        FieldType::Optional(inner) => {
            Arc::new(OptionalConverter::new(converter_for(inner, mode)).mode(mode))
        }
    }
}

// ── Scalars ──────────────────────────────────────────────────────

/// Accepts anything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyConverter;

impl Converter for AnyConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoolConverter {
    mode: ConverterMode,
}

impl BoolConverter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: ConverterMode::Base,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Converter for BoolConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Bool(_) => Ok(value),
            _ if self.mode.is_strict() => Err(expected("bool", &value)),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(ConversionError(format!("{s:?} is not a boolean"))),
            },
            other => Err(expected("bool", &other)),
        }
    }
}

/// Integer converter with inclusive bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntConverter {
    mode: ConverterMode,
    ge: Option<i64>,
    le: Option<i64>,
}

impl IntConverter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: ConverterMode::Base,
            ge: None,
            le: None,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn ge(mut self, bound: i64) -> Self {
        self.ge = Some(bound);
        self
    }

    #[must_use]
    pub const fn le(mut self, bound: i64) -> Self {
        self.le = Some(bound);
        self
    }

    fn coerce(&self, value: Value) -> Result<i64, ConversionError> {
        match value {
            Value::Int(i) => Ok(i),
            _ if self.mode.is_strict() => Err(expected("int", &value)),
            #[allow(clippy::cast_possible_truncation)]
            Value::Float(x) if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 => {
                Ok(x as i64)
            }
            Value::Text(ref s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ConversionError(format!("{s:?} is not an integer"))),
            other => Err(expected("int", &other)),
        }
    }
}

impl Converter for IntConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        let n = self.coerce(value)?;
        if let Some(ge) = self.ge {
            if n < ge {
                return Err(ConversionError(format!("{n} is less than {ge}")));
            }
        }
        if let Some(le) = self.le {
            if n > le {
                return Err(ConversionError(format!("{n} is greater than {le}")));
            }
        }
        Ok(Value::Int(n))
    }
}

/// Float converter with exclusive (`gt`, `lt`) and inclusive (`ge`, `le`)
/// bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatConverter {
    mode: ConverterMode,
    gt: Option<f64>,
    ge: Option<f64>,
    lt: Option<f64>,
    le: Option<f64>,
}

impl FloatConverter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: ConverterMode::Base,
            gt: None,
            ge: None,
            lt: None,
            le: None,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn gt(mut self, bound: f64) -> Self {
        self.gt = Some(bound);
        self
    }

    #[must_use]
    pub const fn ge(mut self, bound: f64) -> Self {
        self.ge = Some(bound);
        self
    }

    #[must_use]
    pub const fn lt(mut self, bound: f64) -> Self {
        self.lt = Some(bound);
        self
    }

    #[must_use]
    pub const fn le(mut self, bound: f64) -> Self {
        self.le = Some(bound);
        self
    }

    fn check(&self, x: f64) -> Result<(), ConversionError> {
        let fail = |op: &str, bound: f64| Err(ConversionError(format!("{x} is not {op} {bound}")));
        match (self.gt, self.ge, self.lt, self.le) {
            (Some(b), _, _, _) if x <= b => fail(">", b),
            (_, Some(b), _, _) if x < b => fail(">=", b),
            (_, _, Some(b), _) if x >= b => fail("<", b),
            (_, _, _, Some(b)) if x > b => fail("<=", b),
            _ => Ok(()),
        }
    }
}

impl Converter for FloatConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        let x = match value {
            Value::Float(x) => x,
            _ if self.mode.is_strict() => return Err(expected("float", &value)),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => i as f64,
            Value::Text(ref s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ConversionError(format!("{s:?} is not a number")))?,
            other => return Err(expected("float", &other)),
        };
        self.check(x)?;
        Ok(Value::Float(x))
    }
}

/// Text converter with length limits.
///
/// Length is counted in width units: unless `half_width_unit` is set, a
/// character above U+00FF counts as two units.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConverter {
    mode: ConverterMode,
    min_len: Option<usize>,
    max_len: Option<usize>,
    allow_empty: bool,
    half_width_unit: bool,
}

impl TextConverter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: ConverterMode::Base,
            min_len: None,
            max_len: None,
            allow_empty: false,
            half_width_unit: false,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn min_len(mut self, len: usize) -> Self {
        self.min_len = Some(len);
        self
    }

    #[must_use]
    pub const fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    /// Accept the empty string even when it is shorter than `min_len`.
    #[must_use]
    pub const fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Count every character as one unit.
    #[must_use]
    pub const fn half_width_unit(mut self) -> Self {
        self.half_width_unit = true;
        self
    }

    /// Length of `text` in this converter's units.
    #[must_use]
    pub fn width(&self, text: &str) -> usize {
        if self.half_width_unit {
            text.chars().count()
        } else {
            text.chars()
                .map(|c| if u32::from(c) > 0xFF { 2 } else { 1 })
                .sum()
        }
    }
}

impl Converter for TextConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        let text = match value {
            Value::Text(s) => s,
            _ if self.mode.is_strict() => return Err(expected("text", &value)),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => value.to_string(),
            other => return Err(expected("text", &other)),
        };
        let len = self.width(&text);
        if let Some(min) = self.min_len {
            if len < min && !(len == 0 && self.allow_empty) {
                return Err(ConversionError(format!(
                    "{text:?} is shorter than {min} units"
                )));
            }
        }
        if let Some(max) = self.max_len {
            if len > max {
                return Err(ConversionError(format!(
                    "{text:?} is longer than {max} units"
                )));
            }
        }
        Ok(Value::Text(text))
    }
}

/// UTC datetime converter. Base mode accepts RFC 3339 text and unix
/// timestamps in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeConverter {
    mode: ConverterMode,
}

impl DateTimeConverter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mode: ConverterMode::Base,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Converter for DateTimeConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        let dt = match value {
            Value::DateTime(_) => return Ok(value),
            _ if self.mode.is_strict() => return Err(expected("datetime", &value)),
            Value::Text(ref s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ConversionError(format!("{s:?} is not an RFC 3339 datetime: {e}")))?,
            Value::Int(secs) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| ConversionError(format!("timestamp {secs} is out of range")))?,
            Value::Float(x) if !x.is_finite() => {
                return Err(ConversionError(format!("timestamp {x} is not finite")));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Value::Float(x) => {
                let secs = x.floor();
                let nanos = ((x - secs) * 1e9).round() as u32;
                DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
                    .ok_or_else(|| ConversionError(format!("timestamp {x} is out of range")))?
            }
            other => return Err(expected("datetime", &other)),
        };
        Ok(Value::DateTime(dt))
    }
}

// ── Containers ───────────────────────────────────────────────────

fn convert_all(
    items: impl IntoIterator<Item = Value>,
    element: &dyn Converter,
) -> Result<Vec<Value>, ConversionError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            element
                .convert(item)
                .map_err(|e| ConversionError(format!("element {i}: {e}")))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ListConverter {
    mode: ConverterMode,
    element: Arc<dyn Converter>,
    min_len: Option<usize>,
    max_len: Option<usize>,
}

impl ListConverter {
    pub fn new(element: Arc<dyn Converter>) -> Self {
        Self {
            mode: ConverterMode::Base,
            element,
            min_len: None,
            max_len: None,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn min_len(mut self, len: usize) -> Self {
        self.min_len = Some(len);
        self
    }

    #[must_use]
    pub fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }
}

impl Converter for ListConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        let items = match value {
            Value::List(items) => items,
            Value::Set(items) if !self.mode.is_strict() => items.into_iter().collect(),
            other => return Err(expected("list", &other)),
        };
        if let Some(min) = self.min_len.filter(|&min| items.len() < min) {
            return Err(ConversionError(format!("list has fewer than {min} elements")));
        }
        if let Some(max) = self.max_len.filter(|&max| items.len() > max) {
            return Err(ConversionError(format!("list has more than {max} elements")));
        }
        Ok(Value::List(convert_all(items, self.element.as_ref())?))
    }
}

#[derive(Debug, Clone)]
pub struct SetConverter {
    mode: ConverterMode,
    element: Arc<dyn Converter>,
}

impl SetConverter {
    pub fn new(element: Arc<dyn Converter>) -> Self {
        Self {
            mode: ConverterMode::Base,
            element,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Converter for SetConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        // Conversion can map distinct inputs to the same value ("1" and 1).
        let converted = match value {
            Value::Set(items) => convert_all(items, self.element.as_ref())?,
            Value::List(items) if !self.mode.is_strict() => {
                convert_all(items, self.element.as_ref())?
            }
            other => return Err(expected("set", &other)),
        };
        Ok(Value::set_of(converted))
    }
}

/// String-keyed map converter.
#[derive(Debug, Clone)]
pub struct MapConverter {
    mode: ConverterMode,
    value: Arc<dyn Converter>,
}

impl MapConverter {
    pub fn new(value: Arc<dyn Converter>) -> Self {
        Self {
            mode: ConverterMode::Base,
            value,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }

    fn convert_entries(
        &self,
        entries: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<BTreeMap<String, Value>, ConversionError> {
        entries
            .into_iter()
            .map(|(k, v)| {
                let v = self
                    .value
                    .convert(v)
                    .map_err(|e| ConversionError(format!("key {k:?}: {e}")))?;
                Ok((k, v))
            })
            .collect()
    }
}

impl Converter for MapConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Map(map) => Ok(Value::Map(self.convert_entries(map)?)),
            Value::Record(record) if !self.mode.is_strict() => {
                Ok(Value::Map(self.convert_entries(record)?))
            }
            other => Err(expected("map", &other)),
        }
    }
}

/// Accepts null, or whatever the inner converter accepts. Base mode also
/// reads the text `"null"` and `"undefined"` as null.
#[derive(Debug, Clone)]
pub struct OptionalConverter {
    mode: ConverterMode,
    inner: Arc<dyn Converter>,
}

impl OptionalConverter {
    pub fn new(inner: Arc<dyn Converter>) -> Self {
        Self {
            mode: ConverterMode::Base,
            inner,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Converter for OptionalConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Text(ref s) if !self.mode.is_strict() && (s == "null" || s == "undefined") => {
                Ok(Value::Null)
            }
            other => self.inner.convert(other),
        }
    }
}

/// Tries each variant in order and keeps the first success.
#[derive(Debug, Clone)]
pub struct UnionConverter {
    variants: Vec<Arc<dyn Converter>>,
}

impl UnionConverter {
    pub fn new(variants: impl IntoIterator<Item = Arc<dyn Converter>>) -> Self {
        Self {
            variants: variants.into_iter().collect(),
        }
    }
}

impl Converter for UnionConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        let mut reasons = Vec::with_capacity(self.variants.len());
        for variant in &self.variants {
            match variant.convert(value.clone()) {
                Ok(converted) => return Ok(converted),
                Err(e) => reasons.push(e.0),
            }
        }
        Err(ConversionError(format!(
            "no variant accepts {value}: {}",
            reasons.join("; ")
        )))
    }
}

/// Accepts one of a fixed list of values.
///
/// In base mode the input is first run through the inner converter (if any),
/// so `"2"` can match a member `2`.
#[derive(Debug, Clone)]
pub struct EnumConverter {
    mode: ConverterMode,
    members: Vec<Value>,
    inner: Option<Arc<dyn Converter>>,
}

impl EnumConverter {
    pub fn new(members: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            mode: ConverterMode::Base,
            members: members.into_iter().map(Into::into).collect(),
            inner: None,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: ConverterMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_inner(mut self, inner: Arc<dyn Converter>) -> Self {
        self.inner = Some(inner);
        self
    }

    #[must_use]
    pub fn members(&self) -> &[Value] {
        &self.members
    }
}

impl Converter for EnumConverter {
    fn convert(&self, value: Value) -> Result<Value, ConversionError> {
        let value = match &self.inner {
            Some(inner) if !self.mode.is_strict() => inner.convert(value)?,
            _ => value,
        };
        if self.members.contains(&value) {
            Ok(value)
        } else {
            Err(ConversionError(format!("{value} is not a valid member")))
        }
    }
}
