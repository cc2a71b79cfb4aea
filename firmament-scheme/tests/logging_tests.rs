use firmament_scheme::{
    Entity, EntityType, Field, LogSettings, Record, SchemeConfig, Value, REDACTED,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field as TracingField, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry;

/// One captured event: its message and structured fields.
#[derive(Debug, Clone, Default)]
struct Captured {
    level: String,
    fields: BTreeMap<String, String>,
}

impl Captured {
    fn message(&self) -> &str {
        self.fields.get("message").map_or("", String::as_str)
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl Visit for Captured {
    fn record_str(&mut self, field: &TracingField, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<Captured>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut captured = Captured {
            level: event.metadata().level().to_string(),
            ..Captured::default()
        };
        event.record(&mut captured);
        self.events.lock().unwrap().push(captured);
    }
}

/// Runs `f` with a capturing subscriber and returns the events it emitted.
fn capture(f: impl FnOnce()) -> Vec<Captured> {
    let layer = CaptureLayer::default();
    let events = Arc::clone(&layer.events);
    tracing::subscriber::with_default(registry().with(layer), f);
    let captured = events.lock().unwrap().clone();
    captured
}

fn with_message<'a>(events: &'a [Captured], message: &str) -> Vec<&'a Captured> {
    events.iter().filter(|e| e.message() == message).collect()
}

fn login_type(log: LogSettings) -> Arc<EntityType> {
    EntityType::builder("Login")
        .logging(log)
        .field(Field::text("user"))
        .field(Field::text("token").redacted().before(|_| Ok(())))
        .field(Field::int("attempts").default(0))
        .build()
        .unwrap()
}

fn values() -> Record {
    [
        ("user", Value::from("ada")),
        ("token", Value::from("s3cret")),
        ("extra", Value::from(1)),
    ]
    .into_iter()
    .collect()
}

// ── Lifecycle events ─────────────────────────────────────────────

#[test]
fn instantiation_emits_start_and_end_events() {
    let ty = login_type(LogSettings::default());
    let events = capture(|| {
        Entity::instantiate(&ty, values()).unwrap();
    });

    let start = with_message(&events, "instantiating entity");
    assert_eq!(start.len(), 1);
    assert_eq!(start[0].field("entity"), Some("Login"));
    assert_eq!(start[0].field("provided"), Some("3"));
    assert_eq!(start[0].level, "DEBUG");

    let end = with_message(&events, "entity instantiated");
    assert_eq!(end.len(), 1);
    assert_eq!(end[0].field("set"), Some("3"));
    assert_eq!(start[0].field("instance"), end[0].field("instance"));
}

#[test]
fn undeclared_input_is_traced() {
    let ty = login_type(LogSettings::default());
    let events = capture(|| {
        Entity::instantiate(&ty, values()).unwrap();
    });
    let ignored = with_message(&events, "ignoring undeclared input");
    assert_eq!(ignored.len(), 1);
    assert_eq!(ignored[0].field("key"), Some("extra"));
    assert_eq!(ignored[0].level, "TRACE");
}

#[test]
fn field_set_carries_field_and_value() {
    let ty = login_type(LogSettings::default());
    let mut login = Entity::instantiate(&ty, values()).unwrap();
    let events = capture(|| {
        login.set("attempts", 2).unwrap();
    });
    let set = with_message(&events, "field set");
    assert_eq!(set.len(), 1);
    assert_eq!(set[0].field("field"), Some("attempts"));
    assert_eq!(set[0].field("value"), Some("2"));
    assert_eq!(
        set[0].field("instance").map(str::to_string),
        Some(login.id().to_string())
    );
}

#[test]
fn validator_entry_is_traced_with_phase() {
    let ty = login_type(LogSettings::default());
    let events = capture(|| {
        Entity::instantiate(&ty, values()).unwrap();
    });
    let entries = with_message(&events, "running validator");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].field("field"), Some("token"));
    assert_eq!(entries[0].field("phase"), Some("before"));
}

#[test]
fn validation_failure_is_logged() {
    let ty = EntityType::builder("Guarded")
        .field(Field::int("n").before(|_| Err("nope".to_string())))
        .build()
        .unwrap();
    let events = capture(|| {
        let record: Record = [("n", Value::from(1))].into_iter().collect();
        assert!(Entity::instantiate(&ty, record).is_err());
    });
    let failed = with_message(&events, "validation failed");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].field("field"), Some("n"));
    assert_eq!(failed[0].field("error"), Some("Guarded.n: nope"));
}

// ── Redaction ────────────────────────────────────────────────────

#[test]
fn redacted_field_hides_value() {
    let ty = login_type(LogSettings::default());
    let mut login = Entity::instantiate(&ty, values()).unwrap();
    let events = capture(|| {
        login.set("token", "other").unwrap();
        login.set("user", "grace").unwrap();
    });
    let set = with_message(&events, "field set");
    assert_eq!(set[0].field("value"), Some(REDACTED));
    assert_eq!(set[1].field("value"), Some("grace"));
}

#[test]
fn type_level_redaction_hides_every_value() {
    let ty = login_type(LogSettings::redacted());
    let mut login = Entity::instantiate(&ty, values()).unwrap();
    let events = capture(|| {
        login.set("user", "grace").unwrap();
    });
    let set = with_message(&events, "field set");
    assert_eq!(set[0].field("value"), Some(REDACTED));
}

// ── Disabled ─────────────────────────────────────────────────────

#[test]
fn disabled_logging_emits_nothing_and_changes_nothing() {
    let quiet = login_type(LogSettings::disabled());
    let loud = login_type(LogSettings::default());

    let mut result = None;
    let events = capture(|| {
        let mut login = Entity::instantiate(&quiet, values()).unwrap();
        login.set("attempts", 1).unwrap();
        result = Some(login.dump(true));
    });
    assert!(events.is_empty(), "{events:?}");

    let mut reference = Entity::instantiate(&loud, values()).unwrap();
    reference.set("attempts", 1).unwrap();
    assert_eq!(result, Some(reference.dump(true)));
}

#[test]
fn config_logging_settings_reach_the_type() {
    let config = SchemeConfig::from_toml_str("[log]\nenabled = false\n").unwrap();
    let ty = EntityType::builder("Configured")
        .config(&config)
        .field(Field::int("n"))
        .build()
        .unwrap();
    assert!(!ty.log_settings().enabled);

    let events = capture(|| {
        let record: Record = [("n", Value::from(1))].into_iter().collect();
        Entity::instantiate(&ty, record).unwrap();
    });
    assert!(events.is_empty());
}
