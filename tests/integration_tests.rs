use std::{
    panic,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use panicpoint::{
    Action, CallbackSlot, IgnoreContainPath, IgnorePolicy, Location, NamedSettings, Opaque,
    PANIC_BUF_SIZE, PanicInfo, PanicSlot, Settings,
};

type Records = Arc<Mutex<Vec<PanicInfo>>>;

fn recording(settings: &Settings) -> (Action, Records) {
    let records = Records::default();
    let sink = records.clone();
    let action = settings
        .action()
        .on_panic(move |info: &PanicInfo| sink.lock().unwrap().push(info.clone()));
    (action, records)
}

#[derive(Debug, thiserror::Error)]
#[error("order {id} not found")]
struct OrderNotFound {
    id: u32,
}

#[test]
fn test_success_returns_value() {
    let settings = Settings::new();
    let (action, records) = recording(&settings);
    let succeeded = Arc::new(AtomicBool::new(false));
    let flag = succeeded.clone();

    let value = action
        .on_succeed(move || flag.store(true, Ordering::Relaxed))
        .capture(|| 21 * 2);

    assert_eq!(value, Some(42));
    assert!(succeeded.load(Ordering::Relaxed));
    assert!(records.lock().unwrap().is_empty());
}

#[test]
fn test_unwrap_is_attributed_to_caller() {
    let settings = Settings::new();
    let (action, records) = recording(&settings);

    let line = i64::from(line!()) + 3;
    let result = action.alias("unwrap").capture(|| {
        let missing: Option<u8> = None;
        missing.unwrap()
    });
    assert_eq!(result, None);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    let info = &records[0];
    assert_eq!(info.alias, "unwrap");
    assert_eq!(info.depth(), 0);
    assert_eq!(
        info.error.message(),
        Some("called `Option::unwrap()` on a `None` value")
    );
    assert!(
        info.direct.file.contains("/library/core/src/"),
        "{:?}",
        info.direct
    );
    assert!(info.actual.file.ends_with("integration_tests.rs"), "{:?}", info.actual);
    assert_eq!(info.actual.line, line);
    assert!(info.stack.len() <= PANIC_BUF_SIZE);
}

#[test]
fn test_index_out_of_bounds_is_attributed_to_caller() {
    let settings = Settings::new();
    let (action, records) = recording(&settings);

    let orders: Vec<u32> = vec![1, 2];
    assert_eq!(action.capture(|| orders[5]), None);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].actual.file.ends_with("integration_tests.rs"));
    assert!(
        records[0]
            .error
            .message()
            .is_some_and(|m| m.starts_with("index out of bounds"))
    );
}

#[test]
fn test_empty_policy_keeps_direct() {
    let settings = Settings::new().with_ignore_policy(IgnorePolicy::empty());
    let (action, records) = recording(&settings);

    action.capture(|| -> u8 { Option::<u8>::None.unwrap() });

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].direct, records[0].actual);
}

#[test]
fn test_custom_policy_skips_own_helpers() {
    let settings = Settings::new().with_ignore_policy(
        IgnorePolicy::default().with(|func_line: &str, _: &str| func_line.contains("fail_helper")),
    );
    let (action, records) = recording(&settings);

    #[inline(never)]
    fn fail_helper() -> u8 {
        panic!("helper failed")
    }

    action.capture(|| fail_helper());

    let records = records.lock().unwrap();
    assert!(records[0].direct.function.contains("fail_helper"));
    assert!(!records[0].actual.function.contains("fail_helper"));
    assert!(records[0].actual.file.ends_with("integration_tests.rs"));
}

#[test]
fn test_chained_panics_are_reported_by_enclosing_capture() {
    let settings = Settings::new();
    let (outer, records) = recording(&settings);
    let inner = Action::with_settings(&Settings::new())
        .alias("inner")
        .on_panic(|_: &PanicInfo| panic!("handler failed"));

    let result = outer
        .alias("outer")
        .capture(|| inner.capture(|| -> u8 { panic!("first") }));
    assert_eq!(result, None);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].depth(), 0);
    assert_eq!(records[0].error.message(), Some("handler failed"));
    assert!(records[0].error.has_payload());
    assert_eq!(records[1].depth(), 1);
    assert_eq!(records[1].error.message(), Some("first"));
    assert!(!records[1].error.has_payload());
    assert!(records.iter().all(|r| r.alias == "outer"));
    assert!(Arc::ptr_eq(&records[0].stack, &records[1].stack));
}

#[test]
fn test_handled_panics_do_not_leak_into_next_capture() {
    let settings = Settings::new();
    let (action, records) = recording(&settings);

    action.capture(|| -> u8 { panic!("one") });
    action.capture(|| -> u8 { panic!("two") });

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.depth() == 0));
    assert_eq!(records[1].error.message(), Some("two"));
}

#[test]
fn test_panics_handled_inside_the_body_are_not_chained() {
    let settings = Settings::new();
    let (action, records) = recording(&settings);

    let result = action.capture(|| -> u8 {
        for attempt in 0..3 {
            let _ = panic::catch_unwind(|| panic!("attempt {attempt} failed"));
        }
        panic!("gave up")
    });
    assert_eq!(result, None);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].depth(), 0);
    assert_eq!(records[0].error.message(), Some("gave up"));
    assert!(!records[0].stack.contains("attempt"));
}

#[test]
fn test_always_runs_before_callback_panic_propagates() {
    let settings = Settings::new();
    let (outer, records) = recording(&settings);
    let always = Arc::new(AtomicUsize::new(0));
    let counter = always.clone();
    let inner = Action::with_settings(&Settings::new())
        .on_panic(|_: &PanicInfo| panic!("handler failed"))
        .always(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

    outer.capture(|| inner.capture(|| -> u8 { panic!("first") }));
    assert_eq!(always.load(Ordering::Relaxed), 1);

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].error.message(), Some("handler failed"));
    assert_eq!(records[1].error.message(), Some("first"));
}

#[test]
fn test_safe_mode_swallows_callback_panics() {
    let always = Arc::new(AtomicUsize::new(0));
    let counter = always.clone();
    let settings = Settings::new().with_safe(true);

    let result = settings
        .action()
        .on_panic(|_: &PanicInfo| panic!("handler failed"))
        .always(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        })
        .capture(|| -> u8 { panic!("boom") });

    assert_eq!(result, None);
    assert_eq!(always.load(Ordering::Relaxed), 1);
}

#[test]
fn test_action_safe_overrides_settings() {
    let (outer, records) = recording(&Settings::new());

    // Settings say safe, the action says otherwise: the handler panic escapes.
    let unsafe_action = Action::with_settings(&Settings::new().with_safe(true))
        .safe(false)
        .on_panic(|_: &PanicInfo| panic!("escaped"));
    outer.capture(|| unsafe_action.capture(|| -> u8 { panic!("boom") }));
    assert_eq!(records.lock().unwrap().len(), 2);

    // Settings say unsafe, the action says safe: nothing escapes.
    let safe_action = Action::with_settings(&Settings::new())
        .safe(true)
        .on_panic(|_: &PanicInfo| panic!("swallowed"));
    assert_eq!(outer.capture(|| safe_action.capture(|| -> u8 { panic!("boom") })), Some(None));
    assert_eq!(records.lock().unwrap().len(), 2);
}

#[test]
fn test_unsafe_succeed_panic_propagates() {
    let action = Action::with_settings(&Settings::new()).on_succeed(|| panic!("succeed failed"));
    let caught = panic::catch_unwind(panic::AssertUnwindSafe(|| action.capture(|| 1)));
    assert!(caught.is_err());
}

#[test]
fn test_watch_runs_after_on_panic() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (o1, o2) = (order.clone(), order.clone());
    let settings = Settings::new().with_watch(move |_: &PanicInfo| o1.lock().unwrap().push("watch"));

    settings
        .action()
        .on_panic(move |_: &PanicInfo| o2.lock().unwrap().push("on_panic"))
        .capture(|| -> u8 { panic!("boom") });

    assert_eq!(*order.lock().unwrap(), ["on_panic", "watch"]);
}

#[test]
fn test_absent_callbacks_are_skipped() {
    let action = Action::with_settings(&Settings::new())
        .on_panic_opt(None::<fn(&PanicInfo)>)
        .always_opt(None::<fn()>)
        .on_succeed_opt(None::<fn()>);

    assert_eq!(action.capture(|| -> u8 { panic!("boom") }), None);
    assert_eq!(action.capture(|| 3), Some(3));
}

#[test]
fn test_slots_are_read_at_capture_time() {
    let on_panic = PanicSlot::new();
    let always = CallbackSlot::new();
    let action = Action::with_settings(&Settings::new())
        .on_panic_ref(&on_panic)
        .always_ref(&always);

    // Empty slots are skipped.
    action.capture(|| -> u8 { panic!("early") });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (s1, s2) = (seen.clone(), seen.clone());
    on_panic.set(move |info: &PanicInfo| {
        s1.lock()
            .unwrap()
            .push(info.error.message().unwrap_or_default().to_owned())
    });
    always.set(move || s2.lock().unwrap().push("always".to_owned()));

    action.capture(|| -> u8 { panic!("late") });
    assert_eq!(*seen.lock().unwrap(), ["late", "always"]);

    on_panic.clear();
    action.capture(|| -> u8 { panic!("cleared") });
    assert_eq!(*seen.lock().unwrap(), ["late", "always", "always"]);
}

#[test]
fn test_named_settings_are_resolved_per_capture() {
    let registry = NamedSettings::new();
    let (action, records) = {
        let records = Records::default();
        let sink = records.clone();
        let action = registry.action("orders").alias("orders");
        registry.load("orders").set_watch(move |info: &PanicInfo| {
            sink.lock().unwrap().push(info.clone());
        });
        (action, records)
    };

    action.capture(|| -> u8 { panic!("watched") });
    assert_eq!(records.lock().unwrap().len(), 1);

    registry.store("orders", Settings::new());
    action.capture(|| -> u8 { panic!("unwatched") });
    assert_eq!(records.lock().unwrap().len(), 1);
}

#[test]
fn test_global_registry_lookup_is_stable() {
    let first = panicpoint::load_settings("integration-tests::stable");
    let second = panicpoint::registry::global().load("integration-tests::stable");
    assert!(first.ptr_eq(&second));

    let stored = Settings::new();
    panicpoint::store_settings("integration-tests::stored", stored.clone());
    assert!(panicpoint::by_name("integration-tests::stored").settings().ptr_eq(&stored));
}

#[test]
fn test_context_and_extra_reach_callbacks() {
    let (action, records) = recording(&Settings::new());

    action
        .extra("shared extra")
        .capture_with_context(Opaque::new(7_u64), || -> u8 { panic!("boom") });

    let records = records.lock().unwrap();
    assert_eq!(records[0].context.downcast_ref::<u64>(), Some(&7));
    assert_eq!(records[0].extra.downcast_ref::<&str>(), Some(&"shared extra"));
}

#[test]
fn test_non_string_payload_can_be_taken() {
    let (action, records) = recording(&Settings::new());

    action.capture(|| -> u8 { panic::panic_any(OrderNotFound { id: 9 }) });

    let records = records.lock().unwrap();
    let error = &records[0].error;
    assert_eq!(error.message(), None);
    assert_eq!(error.to_string(), "Box<dyn Any>");
    assert!(error.payload_is::<OrderNotFound>());

    let payload = error.take_payload().expect("payload is present");
    let order = payload.downcast::<OrderNotFound>().expect("payload type");
    assert_eq!(order.to_string(), "order 9 not found");
}

#[test]
fn test_resumed_unwind_yields_unknown_record() {
    let (action, records) = recording(&Settings::new());

    action.capture(|| -> u8 { panic::resume_unwind(Box::new(3_i32)) });

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].direct.is_unknown());
    assert_eq!(records[0].actual, Location::UNKNOWN);
    assert_eq!(records[0].depth(), -1);
    assert!(records[0].error.payload_is::<i32>());
}

#[test]
fn test_guard_observes_unwind() {
    let (action, records) = recording(&Settings::new());
    let always = Arc::new(AtomicUsize::new(0));
    let counter = always.clone();
    let action = action
        .alias("guarded")
        .always(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

    let caught = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let _guard = action.guard_with_context(Opaque::new("request-1"));
        panic!("unwinding");
    }));

    assert!(caught.is_err());
    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].alias, "guarded");
    assert_eq!(records[0].error.message(), Some("unwinding"));
    assert!(!records[0].error.has_payload());
    assert_eq!(records[0].context.downcast_ref::<&str>(), Some(&"request-1"));
    assert_eq!(always.load(Ordering::Relaxed), 1);
}

#[test]
fn test_guard_runs_callbacks_safely_while_unwinding() {
    let action = Action::with_settings(&Settings::new())
        .safe(false)
        .on_panic(|_: &PanicInfo| panic!("would abort"));

    let caught = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let _guard = action.guard();
        panic!("unwinding");
    }));
    assert!(caught.is_err());
}

#[test]
fn test_guard_without_panic_succeeds() {
    let succeeded = Arc::new(AtomicBool::new(false));
    let flag = succeeded.clone();
    let action = Action::with_settings(&Settings::new())
        .on_succeed(move || flag.store(true, Ordering::Relaxed))
        .on_panic(|_: &PanicInfo| panic!("not called"));

    {
        let _guard = action.guard();
    }
    assert!(succeeded.load(Ordering::Relaxed));
}

#[test]
fn test_captures_on_many_threads() {
    let settings = Settings::new().with_ignore_policy(
        IgnorePolicy::empty().with(IgnoreContainPath::STD),
    );
    let (action, records) = recording(&settings);

    thread::scope(|s| {
        for i in 0..8_u32 {
            let action = action.clone().extra(i);
            s.spawn(move || action.capture(|| -> u8 { panic!("thread {i}") }));
        }
    });

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 8);
    assert!(records.iter().all(|r| r.depth() == 0));
    for record in records.iter() {
        let i = record.extra.downcast_ref::<u32>().copied().expect("extra");
        assert_eq!(record.error.message(), Some(format!("thread {i}").as_str()));
    }
}
