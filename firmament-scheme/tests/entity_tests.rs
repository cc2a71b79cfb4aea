use firmament_scheme::converter::TextConverter;
use firmament_scheme::{
    DumpOptions, Entity, EntityType, ErrorKind, Field, FieldType, FieldValue, Record,
    SchemeError, Value,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn record<const N: usize>(pairs: [(&str, Value); N]) -> Record {
    pairs.into_iter().collect()
}

fn account_type() -> Arc<EntityType> {
    EntityType::builder("Account")
        .field(Field::int("id").primary_key())
        .field(Field::text("email").before(|v| {
            if v.as_str().is_some_and(|s| s.contains('@')) {
                Ok(())
            } else {
                Err("must contain @".to_string())
            }
        }))
        .field(Field::bool("active").default(true).partial())
        .build()
        .unwrap()
}

fn profile_type() -> Arc<EntityType> {
    EntityType::builder("Profile")
        .field(Field::int("id").primary_key())
        .field(Field::text("name").converter(TextConverter::new().min_len(1).max_len(20)))
        .field(Field::int("visits").default(0))
        .field(Field::list("tags", FieldType::Text).default_with(|| Value::List(vec![])))
        .field(Field::optional("nickname", FieldType::Text).default(Value::Null))
        .field(Field::text("bio").partial())
        .build()
        .unwrap()
}

fn profile() -> Entity {
    Entity::instantiate(
        &profile_type(),
        record([("id", Value::from(7)), ("name", Value::from("ada"))]),
    )
    .unwrap()
}

// ── Account scenario ─────────────────────────────────────────────

#[test]
fn account_without_id_is_missing_required_field() {
    let err = Entity::instantiate(&account_type(), record([("email", Value::from("a@b.com"))]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
    assert_eq!(err.field(), Some("id"));
    assert_eq!(err.entity(), Some("Account"));
}

#[test]
fn account_with_bad_email_fails_validation() {
    let err = Entity::instantiate(
        &account_type(),
        record([("id", Value::from(1)), ("email", Value::from("bad"))]),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.field(), Some("email"));
    match err {
        SchemeError::Validation { value, message, .. } => {
            assert_eq!(value, Some(Value::from("bad")));
            assert_eq!(message, "must contain @");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn account_dump_omits_unset_partial_field() {
    let account = Entity::instantiate(
        &account_type(),
        record([("id", Value::from(1)), ("email", Value::from("a@b.com"))]),
    )
    .unwrap();
    assert_eq!(
        account.dump(true),
        record([("id", Value::from(1)), ("email", Value::from("a@b.com"))])
    );
    assert!(!account.is_set("active").unwrap());
}

// ── Defaults and partial fields ──────────────────────────────────

#[test]
fn defaults_fill_missing_fields() {
    let p = profile();
    assert_eq!(p.value("visits").unwrap(), &Value::from(0));
    assert_eq!(p.value("tags").unwrap(), &Value::List(vec![]));
    assert_eq!(p.value("nickname").unwrap(), &Value::Null);
}

#[test]
fn default_factory_runs_once_per_instance() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let ty = EntityType::builder("Counter")
        .field(Field::list("items", FieldType::Int).default_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::List(vec![])
        }))
        .build()
        .unwrap();

    let mut a = Entity::instantiate(&ty, Record::new()).unwrap();
    let b = Entity::instantiate(&ty, Record::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    a.list_mut("items").unwrap().push(1);
    assert_eq!(a.value("items").unwrap(), &Value::List(vec![Value::from(1)]));
    assert_eq!(b.value("items").unwrap(), &Value::List(vec![]));
}

#[test]
fn provided_value_skips_the_default_factory() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let ty = EntityType::builder("Counter")
        .field(Field::int("n").default_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::from(0)
        }))
        .build()
        .unwrap();
    Entity::instantiate(&ty, record([("n", Value::from(3))])).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn unset_partial_field_reads_as_unset_error() {
    let p = profile();
    assert_eq!(p.get("bio").unwrap(), &FieldValue::Unset);
    assert_eq!(p.value("bio").unwrap_err().kind(), ErrorKind::UnsetField);
}

#[test]
fn partial_type_leaves_missing_fields_unset() {
    let ty = EntityType::builder("Draft")
        .partial(true)
        .field(Field::text("title"))
        .field(Field::int("rank").required())
        .build()
        .unwrap();
    let err = Entity::instantiate(&ty, Record::new()).unwrap_err();
    assert_eq!(err.field(), Some("rank"));

    let draft = Entity::instantiate(&ty, record([("rank", Value::from(1))])).unwrap();
    assert!(draft.is_partial());
    assert!(!draft.is_set("title").unwrap());
}

#[test]
fn provided_unset_counts_as_absent() {
    let p = Entity::instantiate(
        &profile_type(),
        record([
            ("id", Value::from(1)),
            ("name", Value::from("x")),
            ("visits", Value::Unset),
        ]),
    )
    .unwrap();
    assert_eq!(p.value("visits").unwrap(), &Value::from(0));
}

#[test]
fn undeclared_input_keys_are_ignored() {
    let p = Entity::instantiate(
        &profile_type(),
        record([
            ("id", Value::from(1)),
            ("name", Value::from("x")),
            ("shoe_size", Value::from(44)),
        ]),
    )
    .unwrap();
    assert!(p.get("shoe_size").is_err());
}

// ── Conversion ───────────────────────────────────────────────────

#[test]
fn input_is_converted_to_declared_type() {
    let p = Entity::instantiate(
        &profile_type(),
        record([("id", Value::from("12")), ("name", Value::from("ada"))]),
    )
    .unwrap();
    assert_eq!(p.value("id").unwrap(), &Value::from(12));
}

#[test]
fn conversion_failure_reports_field_and_value() {
    let err = Entity::instantiate(
        &profile_type(),
        record([("id", Value::from(1)), ("name", Value::from(""))]),
    )
    .unwrap_err();
    match err {
        SchemeError::TypeConversion { entity, field, value, .. } => {
            assert_eq!(entity, "Profile");
            assert_eq!(field, "name");
            assert_eq!(value, Value::from(""));
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── Set and unset ────────────────────────────────────────────────

#[test]
fn set_converts_and_marks_dirty() {
    let mut p = profile();
    assert!(!p.has_changes());
    p.set("visits", "5").unwrap();
    assert_eq!(p.value("visits").unwrap(), &Value::from(5));
    assert_eq!(p.dirty_fields(), vec!["visits"]);
}

#[test]
fn set_twice_marks_once() {
    let mut p = profile();
    p.set("visits", 1).unwrap();
    p.set("visits", 2).unwrap();
    assert_eq!(p.dirty_fields(), vec!["visits"]);
}

#[test]
fn failed_set_leaves_instance_unchanged() {
    let mut p = profile();
    let err = p.set("name", "").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeConversion);
    assert_eq!(p.value("name").unwrap(), &Value::from("ada"));
    assert!(!p.has_changes());
}

#[test]
fn set_unknown_field_fails() {
    let mut p = profile();
    let err = p.set("nope", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownField);
}

#[test]
fn unset_clears_partial_field_only() {
    let mut p = profile();
    p.set("bio", "hello").unwrap();
    p.clear_dirty();

    p.unset("bio").unwrap();
    assert!(!p.is_set("bio").unwrap());
    assert!(p.is_dirty("bio"));

    let err = p.unset("name").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingRequiredField);
}

#[test]
fn setting_unset_value_unsets() {
    let mut p = profile();
    p.set("bio", "hello").unwrap();
    p.set("bio", Value::Unset).unwrap();
    assert!(!p.is_set("bio").unwrap());
}

#[test]
fn take_dirty_returns_names_and_clears() {
    let mut p = profile();
    p.set("visits", 1).unwrap();
    p.set("id", 9).unwrap();
    assert_eq!(p.take_dirty(), vec!["id".to_string(), "visits".to_string()]);
    assert!(!p.has_changes());
}

// ── Dump and load ────────────────────────────────────────────────

#[test]
fn dump_keeps_unset_fields_as_sentinel() {
    let p = profile();
    let dump = p.dump(false);
    assert_eq!(dump.get("bio"), Some(&Value::Unset));
    assert_eq!(
        dump.keys().collect::<Vec<_>>(),
        vec!["id", "name", "visits", "tags", "nickname", "bio"]
    );
}

#[test]
fn dump_then_load_round_trips() {
    let mut p = profile();
    p.set("bio", "hi").unwrap();
    let ty = Arc::clone(p.entity_type());
    let loaded = Entity::load(&ty, p.dump(true)).unwrap();
    assert_eq!(loaded, p);
    assert_eq!(loaded.dump(true), p.dump(true));
    assert!(!loaded.has_changes());
}

#[test]
fn dump_only_dirty_and_exclude_key() {
    let mut p = profile();
    p.set("visits", 3).unwrap();
    p.set("id", 8).unwrap();

    let changed = p.dump_with(&DumpOptions::new().only_dirty());
    assert_eq!(changed, record([("id", Value::from(8)), ("visits", Value::from(3))]));

    let without_key = p.dump_with(&DumpOptions::new().only_dirty().exclude_key());
    assert_eq!(without_key, record([("visits", Value::from(3))]));
}

#[test]
fn dump_of_partial_type_excludes_unset_by_default() {
    let ty = EntityType::builder("Patch")
        .partial(true)
        .field(Field::int("a"))
        .field(Field::int("b"))
        .build()
        .unwrap();
    let patch = Entity::instantiate(&ty, record([("a", Value::from(1))])).unwrap();
    assert_eq!(patch.dump_with(&DumpOptions::new()), record([("a", Value::from(1))]));
    assert_eq!(patch.dump(false).len(), 2);
}

#[test]
fn dump_to_str_lists_set_fields() {
    let ty = EntityType::builder("Pair")
        .field(Field::int("a"))
        .field(Field::text("b"))
        .field(Field::int("c").partial())
        .build()
        .unwrap();
    let pair = Entity::instantiate(&ty, record([("a", Value::from(1)), ("b", Value::from("x"))]))
        .unwrap();
    assert_eq!(pair.dump_to_str(), "a=1,b=x");
}

#[test]
fn dump_serializes_to_ordered_json() {
    let p = profile();
    let json = serde_json::to_string(&p.dump(false)).unwrap();
    assert_eq!(
        json,
        r#"{"id":7,"name":"ada","visits":0,"tags":[],"nickname":null}"#
    );
}

// ── Flags ────────────────────────────────────────────────────────

fn secret_type() -> Arc<EntityType> {
    EntityType::builder("User")
        .field(Field::int("id").primary_key())
        .field(Field::text("login").dump_flags(["public"]))
        .field(Field::text("password").dump_flags(["secret", "internal"]))
        .field(Field::text("note").dump_flags(["internal"]))
        .build()
        .unwrap()
}

fn user() -> Entity {
    Entity::instantiate(
        &secret_type(),
        record([
            ("id", Value::from(1)),
            ("login", Value::from("ada")),
            ("password", Value::from("pw")),
            ("note", Value::from("n")),
        ]),
    )
    .unwrap()
}

#[test]
fn exclude_flags_drop_superset_fields() {
    let dump = user().dump_with(&DumpOptions::new().exclude_flags(["internal"]));
    assert_eq!(
        dump.keys().collect::<Vec<_>>(),
        vec!["id", "login"]
    );

    let dump = user().dump_with(&DumpOptions::new().exclude_flags(["secret", "internal"]));
    assert_eq!(dump.keys().collect::<Vec<_>>(), vec!["id", "login", "note"]);
}

#[test]
fn include_flags_keep_only_matching_fields() {
    let dump = user().dump_with(&DumpOptions::new().include_flags(["public"]));
    assert_eq!(dump.keys().collect::<Vec<_>>(), vec!["login"]);
}

#[test]
fn include_flags_ignored_when_excluding() {
    let dump = user().dump_with(
        &DumpOptions::new()
            .exclude_flags(["secret"])
            .include_flags(["public"]),
    );
    assert_eq!(dump.keys().collect::<Vec<_>>(), vec!["id", "login", "note"]);
}

#[test]
fn type_level_exclude_flags_apply_by_default() {
    let ty = EntityType::builder("PublicUser")
        .extends(&secret_type())
        .exclude_flags(["secret"])
        .build()
        .unwrap();
    let u = Entity::instantiate(
        &ty,
        record([
            ("id", Value::from(1)),
            ("login", Value::from("ada")),
            ("password", Value::from("pw")),
            ("note", Value::from("n")),
        ]),
    )
    .unwrap();
    assert!(!u.dump(true).contains_key("password"));
    let all = u.dump_with(&DumpOptions::new().exclude_flags(Vec::<String>::new()));
    assert!(all.contains_key("password"));
}

// ── Merge and parents ────────────────────────────────────────────

#[test]
fn merge_copies_shared_set_fields() {
    let mut target = profile();
    let source_ty = EntityType::builder("Stats")
        .field(Field::int("visits"))
        .field(Field::int("likes"))
        .build()
        .unwrap();
    let source = Entity::instantiate(
        &source_ty,
        record([("visits", Value::from(40)), ("likes", Value::from(2))]),
    )
    .unwrap();

    target.merge(&source).unwrap();
    assert_eq!(target.value("visits").unwrap(), &Value::from(40));
    assert_eq!(target.dirty_fields(), vec!["visits"]);
}

#[test]
fn from_parents_later_parent_wins() {
    let person = EntityType::builder("Person")
        .field(Field::text("name"))
        .field(Field::int("age"))
        .build()
        .unwrap();
    let a = Entity::instantiate(&person, record([("name", Value::from("a")), ("age", Value::from(1))]))
        .unwrap();
    let b = Entity::instantiate(&person, record([("name", Value::from("b")), ("age", Value::from(2))]))
        .unwrap();

    let child = Entity::from_parents(&profile_type(), &[&a, &b]);
    // Profile has no "age" and requires "id".
    assert_eq!(child.unwrap_err().field(), Some("id"));

    let merged = Entity::from_parents(&person, &[&a, &b]).unwrap();
    assert_eq!(merged.value("name").unwrap(), &Value::from("b"));
}

// ── Identity and equality ────────────────────────────────────────

#[test]
fn instances_get_distinct_ids() {
    assert_ne!(profile().id(), profile().id());
}

#[test]
fn clone_keeps_id_and_equality_ignores_it() {
    let a = profile();
    let b = a.clone();
    assert_eq!(a.id(), b.id());
    assert_eq!(a, profile());
}

#[test]
fn error_payload_carries_kind_and_field() {
    let err = Entity::instantiate(&account_type(), Record::new()).unwrap_err();
    let payload = serde_json::to_value(err.to_payload()).unwrap();
    assert_eq!(payload["kind"], "missing_required_field");
    assert_eq!(payload["field"], "id");
    assert_eq!(payload["message"], "Account.id: missing required field");
}
