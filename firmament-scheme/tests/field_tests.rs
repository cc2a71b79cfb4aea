use firmament_scheme::converter::IntConverter;
use firmament_scheme::{
    DefaultValue, EntityType, ErrorKind, Field, FieldType, Phase, Value,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn point_type() -> Arc<EntityType> {
    EntityType::builder("Point")
        .field(Field::int("x"))
        .field(Field::int("y"))
        .build()
        .unwrap()
}

// ── Field types ──────────────────────────────────────────────────

#[test]
fn field_type_display_names_nesting() {
    assert_eq!(FieldType::list(FieldType::Int).to_string(), "list<int>");
    assert_eq!(
        FieldType::map(FieldType::optional(FieldType::Text)).to_string(),
        "map<optional<text>>"
    );
    assert_eq!(
        FieldType::Composite(point_type()).to_string(),
        "composite<Point>"
    );
}

#[test]
fn only_containers_and_composites_are_mutable() {
    assert!(FieldType::list(FieldType::Int).is_mutable());
    assert!(FieldType::set(FieldType::Int).is_mutable());
    assert!(FieldType::map(FieldType::Int).is_mutable());
    assert!(FieldType::Composite(point_type()).is_mutable());
    assert!(!FieldType::Text.is_mutable());
    assert!(!FieldType::optional(FieldType::list(FieldType::Int)).is_mutable());
}

// ── Defaults ─────────────────────────────────────────────────────

#[test]
fn default_value_materializes() {
    assert_eq!(DefaultValue::None.materialize(), None);
    assert!(DefaultValue::None.is_none());
    assert_eq!(
        DefaultValue::Value(Value::from(3)).materialize(),
        Some(Value::from(3))
    );
    let factory = DefaultValue::Factory(Arc::new(|| Value::List(vec![])));
    assert_eq!(factory.materialize(), Some(Value::List(vec![])));
}

#[test]
fn field_declaration_accessors() {
    let field = Field::int("age")
        .primary_key()
        .partial()
        .default(1)
        .dump_flags(["public"])
        .redacted()
        .before(|_| Ok(()))
        .after(|_, _| Ok(()));
    assert_eq!(field.name(), "age");
    assert!(field.is_primary_key());
    assert_eq!(field.partial_override(), Some(true));
    assert!(field.is_redacted());
    assert!(field.flags().contains("public"));
    assert_eq!(
        field.validators().iter().map(|v| v.phase()).collect::<Vec<_>>(),
        vec![Phase::Before, Phase::After]
    );
    assert_eq!(field.owner(), "");
}

#[test]
fn explicit_converter_wins_over_declared_type() {
    let ty = EntityType::builder("Bounded")
        .field(Field::int("n").converter(IntConverter::new().ge(10)))
        .build()
        .unwrap();
    let field = ty.field("n").unwrap();
    assert_eq!(field.owner(), "Bounded");
    assert_eq!(field.convert(Value::from(12)).unwrap(), Value::from(12));

    let err = field.convert(Value::from(3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeConversion);
    assert_eq!(err.to_string(), "Bounded.n: cannot convert 3: 3 is less than 10");
}

#[test]
fn composite_field_exposes_sub_fields() {
    let field = Field::composite("origin", &point_type());
    let names: Vec<&str> = field.sub_fields().iter().map(Field::name).collect();
    assert_eq!(names, vec!["x", "y"]);
    assert!(Field::int("n").sub_fields().is_empty());
}

// ── Entity types ─────────────────────────────────────────────────

#[test]
fn entity_type_lookup() {
    let ty = EntityType::builder("Shape")
        .field(Field::int("id").primary_key())
        .field(Field::composite("origin", &point_type()))
        .build()
        .unwrap();
    assert_eq!(ty.name(), "Shape");
    assert_eq!(ty.len(), 2);
    assert!(!ty.is_empty());
    assert_eq!(ty.position("origin"), Some(1));
    assert_eq!(ty.key_index(), Some(0));
    assert_eq!(ty.key_field().unwrap().name(), "id");
    assert_eq!(ty.index_of("nope").unwrap_err().kind(), ErrorKind::UnknownField);
    assert!(!ty.has_async_validators());
}

#[test]
fn per_field_partial_overrides_type_flag() {
    let ty = EntityType::builder("Mixed")
        .partial(true)
        .field(Field::int("a"))
        .field(Field::int("b").required())
        .build()
        .unwrap();
    assert!(ty.field_is_partial(0, false));
    assert!(!ty.field_is_partial(1, false));

    let strict = EntityType::builder("Strict")
        .field(Field::int("a"))
        .field(Field::int("b").partial())
        .build()
        .unwrap();
    assert!(!strict.field_is_partial(0, false));
    assert!(strict.field_is_partial(0, true));
    assert!(strict.field_is_partial(1, false));
}

#[test]
fn subtype_appends_fields_after_parent() {
    let child = EntityType::builder("Point3")
        .extends(&point_type())
        .field(Field::int("z"))
        .field(Field::float("x"))
        .build()
        .unwrap();
    let names: Vec<&str> = child.fields().iter().map(Field::name).collect();
    assert_eq!(names, vec!["x", "y", "z"]);
    assert_eq!(child.field("x").unwrap().value_type().to_string(), "float");
    assert!(child.is_a("Point"));
    assert!(!point_type().is_a("Point3"));
}

#[test]
fn debug_output_lists_field_names() {
    let debug = format!("{:?}", point_type());
    assert!(debug.contains("Point"), "{debug}");
    assert!(debug.contains("\"x\""), "{debug}");
}
