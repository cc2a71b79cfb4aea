use firmament_scheme::{Entity, EntityType, ErrorKind, Field, FieldType, Record, Value};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

fn address_type() -> Arc<EntityType> {
    EntityType::builder("Address")
        .field(Field::text("city"))
        .field(Field::list("lines", FieldType::Text).default_with(|| Value::List(vec![])))
        .build()
        .unwrap()
}

fn customer_type(track: bool) -> Arc<EntityType> {
    EntityType::builder("Customer")
        .track_mutations(track)
        .field(Field::int("id").primary_key())
        .field(Field::list("tags", FieldType::Text).default_with(|| Value::List(vec![])))
        .field(Field::set("roles", FieldType::Text).default_with(|| Value::set_of([])))
        .field(Field::map("prefs", FieldType::Any).default_with(|| Value::Map(BTreeMap::new())))
        .field(Field::composite("address", &address_type()))
        .field(Field::list("aliases", FieldType::Text).partial())
        .build()
        .unwrap()
}

fn customer_with(track: bool) -> Entity {
    let address: Record = [("city", Value::from("Oslo"))].into_iter().collect();
    let values: Record = [("id", Value::from(1)), ("address", Value::Record(address))]
        .into_iter()
        .collect();
    Entity::instantiate(&customer_type(track), values).unwrap()
}

fn customer() -> Entity {
    customer_with(true)
}

fn texts(items: &[&str]) -> Vec<Value> {
    items.iter().map(|s| Value::from(*s)).collect()
}

// ── List ─────────────────────────────────────────────────────────

#[test]
fn push_marks_field_dirty() {
    let mut c = customer();
    assert!(!c.has_changes());
    c.list_mut("tags").unwrap().push("vip");
    assert_eq!(c.dirty_fields(), vec!["tags"]);
    assert_eq!(c.value("tags").unwrap(), &Value::List(texts(&["vip"])));
}

#[test]
fn list_proxy_reads_like_a_slice() {
    let mut c = customer();
    let mut tags = c.list_mut("tags").unwrap();
    tags.extend(["a", "b", "c"]);
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[1], Value::from("b"));
    assert_eq!(*tags, texts(&["a", "b", "c"]));
    assert_eq!(tags.iter().filter(|v| **v != Value::from("b")).count(), 2);
    assert_eq!((&tags).into_iter().count(), 3);
}

#[test]
fn list_mutations_apply_in_place() {
    let mut c = customer();
    {
        let mut tags = c.list_mut("tags").unwrap();
        tags.extend(["a", "b", "c", "d"]);
        assert!(tags.insert(0, "z"));
        assert_eq!(tags.remove(1), Some(Value::from("a")));
        assert_eq!(tags.set(0, "y"), Some(Value::from("z")));
        assert!(tags.swap(0, 1));
        tags.reverse();
        tags.truncate(3);
        tags.retain(|v| *v != Value::from("c"));
    }
    assert_eq!(c.value("tags").unwrap(), &Value::List(texts(&["d", "y"])));
}

#[test]
fn no_op_list_calls_do_not_mark() {
    let mut c = customer();
    {
        let mut tags = c.list_mut("tags").unwrap();
        assert_eq!(tags.pop(), None);
        assert_eq!(tags.remove(3), None);
        assert_eq!(tags.set(0, "x"), None);
        tags.truncate(5);
        tags.retain(|_| true);
    }
    assert!(!c.has_changes());
}

#[test]
fn out_of_range_insert_and_swap_are_refused() {
    let mut c = customer();
    {
        let mut tags = c.list_mut("tags").unwrap();
        assert!(!tags.insert(1, "late"));
        assert!(!tags.swap(0, 0));
        assert!(tags.insert(0, "a"));
        assert!(!tags.swap(0, 1));
    }
    assert_eq!(c.value("tags").unwrap(), &Value::List(texts(&["a"])));
    assert_eq!(c.dirty_fields(), vec!["tags"]);

    c.clear_dirty();
    assert!(!c.list_mut("tags").unwrap().insert(5, "b"));
    assert!(!c.has_changes());
}

#[test]
fn clear_marks_even_when_empty() {
    let mut c = customer();
    c.list_mut("tags").unwrap().clear();
    assert!(c.is_dirty("tags"));
}

#[test]
fn list_proxy_on_unset_field_fails() {
    let mut c = customer();
    let err = c.list_mut("aliases").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::UnsetField);
}

#[test]
fn list_proxy_on_wrong_kind_fails() {
    let mut c = customer();
    let err = c.list_mut("roles").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::TypeConversion);
    let err = c.list_mut("missing").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::UnknownField);
}

// ── Set ──────────────────────────────────────────────────────────

#[test]
fn set_proxy_keeps_elements_unique() {
    let mut c = customer();
    {
        let mut roles = c.set_mut("roles").unwrap();
        assert!(roles.insert("admin"));
        assert!(!roles.insert("admin"));
        roles.extend(["user", "admin"]);
        assert_eq!(roles.len(), 2);
        assert!(roles == *texts(&["user", "admin"]));
    }
    assert_eq!(c.value("roles").unwrap(), &Value::set_of(texts(&["admin", "user"])));
    assert_eq!(c.dirty_fields(), vec!["roles"]);
}

#[test]
fn set_proxy_remove_reports_presence() {
    let mut c = customer();
    let mut roles = c.set_mut("roles").unwrap();
    assert!(!roles.remove(&Value::from("ghost")));
    roles.insert("admin");
    assert!(roles.remove(&Value::from("admin")));
    roles.retain(|_| false);
    assert!(roles.is_empty());
}

#[test]
fn set_proxy_never_equals_a_slice_with_duplicates() {
    let mut c = customer();
    let mut roles = c.set_mut("roles").unwrap();
    roles.extend(["admin", "user"]);
    assert!(roles == *texts(&["user", "admin"]));
    assert!(roles != *texts(&["admin", "admin"]));
    assert!(roles != *texts(&["admin"]));
}

#[test]
fn duplicate_insert_does_not_mark() {
    let mut c = customer();
    c.set_mut("roles").unwrap().insert("admin");
    c.clear_dirty();
    c.set_mut("roles").unwrap().insert("admin");
    assert!(!c.has_changes());
}

// ── Map ──────────────────────────────────────────────────────────

#[test]
fn map_proxy_insert_update_remove() {
    let mut c = customer();
    {
        let mut prefs = c.map_mut("prefs").unwrap();
        assert_eq!(prefs.insert("theme", "dark"), None);
        assert_eq!(prefs.insert("size", 12), None);
        assert!(prefs.update("size", |v| *v = Value::from(14)));
        assert!(!prefs.update("missing", |_| {}));
        assert_eq!(prefs.get("size"), Some(&Value::from(14)));
        assert_eq!(prefs.remove("theme"), Some(Value::from("dark")));
        prefs.retain(|k, _| k != "size");
        assert!(prefs.is_empty());
    }
    assert_eq!(c.dirty_fields(), vec!["prefs"]);
}

#[test]
fn map_proxy_compares_with_map() {
    let mut c = customer();
    let mut prefs = c.map_mut("prefs").unwrap();
    prefs.insert("a", 1);
    let mut expected = BTreeMap::new();
    expected.insert("a".to_string(), Value::from(1));
    assert!(prefs == expected);
}

#[test]
fn map_remove_of_absent_key_does_not_mark() {
    let mut c = customer();
    assert_eq!(c.map_mut("prefs").unwrap().remove("nope"), None);
    assert!(!c.has_changes());
}

// ── Sub-entity ───────────────────────────────────────────────────

#[test]
fn entity_proxy_set_marks_both_levels() {
    let mut c = customer();
    c.entity_mut("address").unwrap().set("city", "Bergen").unwrap();
    assert_eq!(c.dirty_fields(), vec!["address"]);

    let address = c.composite("address").unwrap();
    assert_eq!(address.value("city").unwrap(), &Value::from("Bergen"));
    assert_eq!(address.dirty_fields(), vec!["city"]);
}

#[test]
fn nested_list_proxy_marks_composite() {
    let mut c = customer();
    c.entity_mut("address")
        .unwrap()
        .list_mut("lines")
        .unwrap()
        .push("Storgata 1");
    assert!(c.is_dirty("address"));
    assert!(c.composite("address").unwrap().is_dirty("lines"));
}

#[test]
fn failed_sub_entity_set_does_not_mark() {
    let mut c = customer();
    let err = c.entity_mut("address").unwrap().set("nope", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownField);
    assert!(!c.has_changes());
}

#[test]
fn entity_proxy_derefs_to_entity() {
    let mut c = customer();
    let address = c.entity_mut("address").unwrap();
    assert_eq!(address.type_name(), "Address");
    assert_eq!(address.value("city").unwrap(), &Value::from("Oslo"));
}

// ── Tracking disabled ────────────────────────────────────────────

#[test]
fn untracked_type_mutates_without_marking() {
    let mut c = customer_with(false);
    c.list_mut("tags").unwrap().push("vip");
    c.map_mut("prefs").unwrap().insert("a", 1);
    assert_eq!(c.value("tags").unwrap(), &Value::List(texts(&["vip"])));
    assert!(!c.has_changes());

    c.set("id", 2).unwrap();
    assert_eq!(c.dirty_fields(), vec!["id"]);
}
