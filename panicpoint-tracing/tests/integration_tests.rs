use std::{
    fmt::{self, Write as _},
    sync::{Arc, Mutex},
};

use panicpoint::{Action, IgnorePolicy, Settings};
use panicpoint_tracing::ActionExt;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{
    Registry,
    layer::{Context, Layer, SubscriberExt},
    registry::LookupSpan,
};

#[derive(Debug, Clone)]
struct Recorded {
    level: tracing::Level,
    fields: String,
    spans: Vec<String>,
}

#[derive(Clone, Default)]
struct CollectLayer(Arc<Mutex<Vec<Recorded>>>);

struct FieldWriter<'a>(&'a mut String);

impl Visit for FieldWriter<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let _ = write!(self.0, "{}={:?};", field.name(), value);
    }
}

impl<S> Layer<S> for CollectLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = String::new();
        event.record(&mut FieldWriter(&mut fields));
        let spans = ctx
            .event_scope(event)
            .map(|scope| scope.map(|span| span.name().to_owned()).collect())
            .unwrap_or_default();
        self.0.lock().unwrap().push(Recorded {
            level: *event.metadata().level(),
            fields,
            spans,
        });
    }
}

fn collect(f: impl FnOnce()) -> Vec<Recorded> {
    let layer = CollectLayer::default();
    let subscriber = Registry::default().with(layer.clone());
    tracing::subscriber::with_default(subscriber, f);
    let events = layer.0.lock().unwrap().clone();
    events
}

fn panic_events(events: &[Recorded]) -> Vec<&Recorded> {
    events
        .iter()
        .filter(|e| e.fields.contains("message=panic captured"))
        .collect()
}

#[test]
fn test_log_panic_fields() {
    let settings = Settings::new().with_ignore_policy(IgnorePolicy::empty());
    panicpoint_tracing::install_on(&settings);

    let events = collect(|| {
        settings
            .action()
            .alias("worker")
            .capture(|| panic!("lost connection"));
    });

    let logged = panic_events(&events);
    assert_eq!(logged.len(), 1);
    let record = logged[0];
    assert_eq!(record.level, tracing::Level::ERROR);
    assert!(record.fields.contains("alias=worker;"), "{}", record.fields);
    assert!(record.fields.contains("depth=0;"), "{}", record.fields);
    assert!(record.fields.contains("error=lost connection;"), "{}", record.fields);

    assert!(events.iter().any(|e| e.level == tracing::Level::DEBUG
        && e.fields.contains("stack=thread '")
        && e.fields.contains("panic(\"lost connection\")")));
}

#[test]
fn test_log_panic_in_captured_span() {
    let events = collect(|| {
        let span = tracing::info_span!("request");
        let action = {
            let _entered = span.enter();
            Action::with_settings(&Settings::new())
                .in_current_span()
                .on_panic(panicpoint_tracing::log_panic)
        };
        action.capture(|| panic!("bad request"));
    });

    let logged = panic_events(&events);
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].spans, ["request"]);
}

#[test]
fn test_chain_logs_every_record() {
    let settings = Settings::new();
    panicpoint_tracing::install_on(&settings);

    let events = collect(|| {
        let inner = Action::with_settings(&Settings::new())
            .on_panic(|_: &panicpoint::PanicInfo| panic!("handler failed"));
        settings
            .action()
            .alias("outer")
            .capture(|| inner.capture(|| -> () { panic!("first") }));
    });

    let logged = panic_events(&events);
    assert_eq!(logged.len(), 2);
    assert!(logged[0].fields.contains("depth=0;"));
    assert!(logged[0].fields.contains("error=handler failed;"));
    assert!(logged[1].fields.contains("depth=1;"));
    assert!(logged[1].fields.contains("error=first;"));
}
