//! Mutation proxies.
//!
//! Mutable field values (lists, sets, maps and composite sub-entities) are
//! changed in place only through handles borrowed from the owning
//! [`Entity`]. A handle dereferences to the read-only container, so reads,
//! equality and iteration behave like the bare value, and each mutating
//! method marks the owning field dirty when it changes something.
//!
//! ```ignore
//! account.list_mut("tags")?.push("vip");
//! assert_eq!(account.dirty_fields(), vec!["tags"]);
//! ```

use crate::dirty::DirtyFields;
use crate::entity::{Entity, FieldValue};
use crate::error::{SchemeError, SchemeResult};
use firmament_types::Value;
use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::ops::Deref;

/// Marks one field of the owning entity dirty.
struct DirtyMarker<'a> {
    dirty: &'a mut DirtyFields,
    index: usize,
    track: bool,
}

impl DirtyMarker<'_> {
    fn mark(&mut self) {
        if self.track {
            self.dirty.mark(self.index);
        }
    }
}

fn kind_error(entity: &str, field: &str, slot: &FieldValue, expected: &str) -> SchemeError {
    match slot {
        FieldValue::Unset => SchemeError::UnsetField {
            entity: entity.to_string(),
            field: field.to_string(),
        },
        other => SchemeError::TypeConversion {
            entity: entity.to_string(),
            field: field.to_string(),
            value: other.to_value(),
            reason: format!("field does not hold a {expected}"),
        },
    }
}

// ── List ─────────────────────────────────────────────────────────

/// In-place access to a list field.
pub struct ListProxy<'a> {
    items: &'a mut Vec<Value>,
    marker: DirtyMarker<'a>,
}

impl ListProxy<'_> {
    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
        self.marker.mark();
    }

    pub fn pop(&mut self) -> Option<Value> {
        let popped = self.items.pop();
        if popped.is_some() {
            self.marker.mark();
        }
        popped
    }

    /// Inserts at `index`, shifting later elements. Returns false, leaving
    /// the list untouched, if `index > len`.
    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> bool {
        if index > self.items.len() {
            return false;
        }
        self.items.insert(index, value.into());
        self.marker.mark();
        true
    }

    /// Removes the element at `index`, or returns `None` if out of range.
    pub fn remove(&mut self, index: usize) -> Option<Value> {
        if index >= self.items.len() {
            return None;
        }
        let removed = self.items.remove(index);
        self.marker.mark();
        Some(removed)
    }

    /// Replaces the element at `index`, returning the old one, or `None` if
    /// out of range.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Option<Value> {
        let slot = self.items.get_mut(index)?;
        let old = std::mem::replace(slot, value.into());
        self.marker.mark();
        Some(old)
    }

    pub fn extend<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.items.extend(values.into_iter().map(Into::into));
        self.marker.mark();
    }

    pub fn truncate(&mut self, len: usize) {
        if len < self.items.len() {
            self.items.truncate(len);
            self.marker.mark();
        }
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Value) -> bool,
    {
        let before = self.items.len();
        self.items.retain(keep);
        if self.items.len() != before {
            self.marker.mark();
        }
    }

    /// Swaps two elements. Returns false if either index is out of range.
    pub fn swap(&mut self, a: usize, b: usize) -> bool {
        let len = self.items.len();
        if a >= len || b >= len {
            return false;
        }
        self.items.swap(a, b);
        self.marker.mark();
        true
    }

    pub fn reverse(&mut self) {
        self.items.reverse();
        self.marker.mark();
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.marker.mark();
    }
}

impl Deref for ListProxy<'_> {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        self.items.as_slice()
    }
}

impl PartialEq<[Value]> for ListProxy<'_> {
    fn eq(&self, other: &[Value]) -> bool {
        self.items.as_slice() == other
    }
}

impl PartialEq<Vec<Value>> for ListProxy<'_> {
    fn eq(&self, other: &Vec<Value>) -> bool {
        *self.items == *other
    }
}

impl<'p> IntoIterator for &'p ListProxy<'_> {
    type Item = &'p Value;
    type IntoIter = std::slice::Iter<'p, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ── Set ──────────────────────────────────────────────────────────

/// In-place access to a set field. Elements stay unique.
pub struct SetProxy<'a> {
    items: &'a mut IndexSet<Value>,
    marker: DirtyMarker<'a>,
}

impl SetProxy<'_> {
    /// Adds an element; returns false if it was already present.
    pub fn insert(&mut self, value: impl Into<Value>) -> bool {
        let inserted = self.items.insert(value.into());
        if inserted {
            self.marker.mark();
        }
        inserted
    }

    /// Removes an element, keeping the order of the rest.
    pub fn remove(&mut self, value: &Value) -> bool {
        let removed = self.items.shift_remove(value);
        if removed {
            self.marker.mark();
        }
        removed
    }

    pub fn extend<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for value in values {
            self.insert(value);
        }
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Value) -> bool,
    {
        let before = self.items.len();
        self.items.retain(keep);
        if self.items.len() != before {
            self.marker.mark();
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.marker.mark();
    }
}

impl Deref for SetProxy<'_> {
    type Target = IndexSet<Value>;

    fn deref(&self) -> &IndexSet<Value> {
        &*self.items
    }
}

impl PartialEq<IndexSet<Value>> for SetProxy<'_> {
    fn eq(&self, other: &IndexSet<Value>) -> bool {
        *self.items == *other
    }
}

/// Order-insensitive. A slice holding duplicates never equals a set.
impl PartialEq<[Value]> for SetProxy<'_> {
    fn eq(&self, other: &[Value]) -> bool {
        self.items.len() == other.len()
            && *self.items == other.iter().cloned().collect::<IndexSet<Value>>()
    }
}

impl<'p> IntoIterator for &'p SetProxy<'_> {
    type Item = &'p Value;
    type IntoIter = indexmap::set::Iter<'p, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ── Map ──────────────────────────────────────────────────────────

/// In-place access to a map field.
pub struct MapProxy<'a> {
    map: &'a mut BTreeMap<String, Value>,
    marker: DirtyMarker<'a>,
}

impl MapProxy<'_> {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let old = self.map.insert(key.into(), value.into());
        self.marker.mark();
        old
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.map.remove(key);
        if removed.is_some() {
            self.marker.mark();
        }
        removed
    }

    /// Changes the value under `key` in place; returns false if absent.
    pub fn update<F>(&mut self, key: &str, change: F) -> bool
    where
        F: FnOnce(&mut Value),
    {
        match self.map.get_mut(key) {
            Some(value) => {
                change(value);
                self.marker.mark();
                true
            }
            None => false,
        }
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str, &Value) -> bool,
    {
        let before = self.map.len();
        self.map.retain(|k, v| keep(k, v));
        if self.map.len() != before {
            self.marker.mark();
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.marker.mark();
    }
}

impl Deref for MapProxy<'_> {
    type Target = BTreeMap<String, Value>;

    fn deref(&self) -> &BTreeMap<String, Value> {
        &*self.map
    }
}

impl PartialEq<BTreeMap<String, Value>> for MapProxy<'_> {
    fn eq(&self, other: &BTreeMap<String, Value>) -> bool {
        *self.map == *other
    }
}

// ── Sub-entity ───────────────────────────────────────────────────

/// In-place access to a composite field's sub-entity.
///
/// Writes go through the sub-entity's own pipeline and mark both the
/// sub-entity's field and the owning composite field dirty.
pub struct EntityProxy<'a> {
    entity: &'a mut Entity,
    marker: DirtyMarker<'a>,
}

impl EntityProxy<'_> {
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> SchemeResult<()> {
        self.entity.set(name, value)?;
        self.marker.mark();
        Ok(())
    }

    pub async fn set_async(&mut self, name: &str, value: impl Into<Value>) -> SchemeResult<()> {
        self.entity.set_async(name, value).await?;
        self.marker.mark();
        Ok(())
    }

    pub fn unset(&mut self, name: &str) -> SchemeResult<()> {
        self.entity.unset(name)?;
        self.marker.mark();
        Ok(())
    }

    /// A nested proxy for a list inside the sub-entity. Opening it marks
    /// the composite field dirty.
    pub fn list_mut(&mut self, name: &str) -> SchemeResult<ListProxy<'_>> {
        let proxy = self.entity.list_mut(name)?;
        self.marker.mark();
        Ok(proxy)
    }

    pub fn set_mut(&mut self, name: &str) -> SchemeResult<SetProxy<'_>> {
        let proxy = self.entity.set_mut(name)?;
        self.marker.mark();
        Ok(proxy)
    }

    pub fn map_mut(&mut self, name: &str) -> SchemeResult<MapProxy<'_>> {
        let proxy = self.entity.map_mut(name)?;
        self.marker.mark();
        Ok(proxy)
    }

    pub fn entity_mut(&mut self, name: &str) -> SchemeResult<EntityProxy<'_>> {
        let proxy = self.entity.entity_mut(name)?;
        self.marker.mark();
        Ok(proxy)
    }
}

impl Deref for EntityProxy<'_> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &*self.entity
    }
}

// ── Accessors ────────────────────────────────────────────────────

/// A slot borrowed for mutation, with the owning type's name for errors.
struct ProxyParts<'a> {
    entity: &'a str,
    slot: &'a mut FieldValue,
    marker: DirtyMarker<'a>,
}

impl Entity {
    fn proxy_parts(&mut self, name: &str) -> SchemeResult<ProxyParts<'_>> {
        let index = self.ty.index_of(name)?;
        Ok(ProxyParts {
            entity: self.ty.name(),
            slot: &mut self.slots[index],
            marker: DirtyMarker {
                dirty: &mut self.dirty,
                index,
                track: self.ty.tracks_mutations(),
            },
        })
    }

    /// Mutable handle to a list field.
    pub fn list_mut(&mut self, name: &str) -> SchemeResult<ListProxy<'_>> {
        let ProxyParts {
            entity,
            slot,
            marker,
        } = self.proxy_parts(name)?;
        match slot {
            FieldValue::Set(Value::List(items)) => Ok(ListProxy { items, marker }),
            other => Err(kind_error(entity, name, other, "list")),
        }
    }

    pub fn set_mut(&mut self, name: &str) -> SchemeResult<SetProxy<'_>> {
        let ProxyParts {
            entity,
            slot,
            marker,
        } = self.proxy_parts(name)?;
        match slot {
            FieldValue::Set(Value::Set(items)) => Ok(SetProxy { items, marker }),
            other => Err(kind_error(entity, name, other, "set")),
        }
    }

    pub fn map_mut(&mut self, name: &str) -> SchemeResult<MapProxy<'_>> {
        let ProxyParts {
            entity,
            slot,
            marker,
        } = self.proxy_parts(name)?;
        match slot {
            FieldValue::Set(Value::Map(map)) => Ok(MapProxy { map, marker }),
            other => Err(kind_error(entity, name, other, "map")),
        }
    }

    /// Mutable handle to a composite field's sub-entity.
    pub fn entity_mut(&mut self, name: &str) -> SchemeResult<EntityProxy<'_>> {
        let ProxyParts {
            entity,
            slot,
            marker,
        } = self.proxy_parts(name)?;
        match slot {
            FieldValue::Composite(sub) => Ok(EntityProxy {
                entity: sub,
                marker,
            }),
            other => Err(kind_error(entity, name, other, "sub-entity")),
        }
    }
}
