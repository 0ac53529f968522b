//! The capture builder.
//!
//! An [`Action`] describes what to do when a closure panics: which
//! [`Settings`] to consult, under which alias, and which callbacks to run.
//! Actions are plain values. Every builder method consumes the action and
//! returns the modified copy, so a template can be cloned and specialized
//! without affecting other holders.
//!
//! ```
//! use panicpoint::{Action, PanicInfo};
//!
//! let template = Action::new().on_panic(|info: &PanicInfo| {
//!     eprintln!("[{}] {} at {}", info.alias, info.error, info.actual);
//! });
//!
//! let parse = template.clone().alias("parse");
//! assert_eq!(parse.capture(|| "42".parse::<u32>().ok()), Some(Some(42)));
//! assert_eq!(parse.capture(|| -> u32 { panic!("bad input") }), None);
//! ```

use alloc::{borrow::Cow, boxed::Box, string::String, sync::Arc};
use core::{any::Any, fmt, mem};
use std::{
    panic::{self, AssertUnwindSafe},
    thread,
};

use panicpoint_internals::{Attribution, find_panics};

use crate::{
    NamedSettings, Opaque, PanicError, PanicInfo, Settings,
    callback::{
        Callback, CallbackSlot, Handler, PanicCallback, PanicSlot, shared_callback,
        shared_panic_callback,
    },
    dump::{self, Dispatching, Scope, ScopeKind, Snapshot},
    registry, safe, settings,
};

#[derive(Clone)]
enum SettingsSource {
    Global,
    Fixed(Settings),
    Named {
        registry: NamedSettings,
        name: Cow<'static, str>,
    },
}

impl SettingsSource {
    fn resolve(&self) -> Settings {
        match self {
            SettingsSource::Global => settings::global().clone(),
            SettingsSource::Fixed(settings) => settings.clone(),
            SettingsSource::Named { registry, name } => registry.load(name),
        }
    }
}

impl fmt::Debug for SettingsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsSource::Global => f.write_str("Global"),
            SettingsSource::Fixed(_) => f.write_str("Fixed"),
            SettingsSource::Named { name, .. } => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

/// A reusable description of how to intercept a panic.
///
/// See the [module documentation](self).
#[derive(Clone, Debug)]
#[must_use]
pub struct Action {
    settings: SettingsSource,
    alias: Cow<'static, str>,
    extra: Opaque,
    always: Option<Handler<dyn Callback>>,
    on_succeed: Option<Handler<dyn Callback>>,
    on_panic: Option<Handler<dyn PanicCallback>>,
    safe: Option<bool>,
}

impl Default for Action {
    fn default() -> Self {
        Self::new()
    }
}

impl Action {
    fn from_source(settings: SettingsSource) -> Self {
        Self {
            settings,
            alias: Cow::Borrowed(""),
            extra: Opaque::empty(),
            always: None,
            on_succeed: None,
            on_panic: None,
            safe: None,
        }
    }

    /// An action using the [global settings](crate::settings::global).
    pub fn new() -> Self {
        Self::from_source(SettingsSource::Global)
    }

    /// An action bound to `settings`.
    pub fn with_settings(settings: &Settings) -> Self {
        Self::from_source(SettingsSource::Fixed(settings.clone()))
    }

    /// An action using the settings stored under `name` in the
    /// [global registry](crate::registry::global).
    ///
    /// The name is resolved on every capture, so settings stored later are
    /// picked up.
    pub fn by_name(name: impl Into<Cow<'static, str>>) -> Self {
        Self::with_registry(registry::global(), name)
    }

    /// An action using the settings stored under `name` in `registry`.
    pub fn with_registry(registry: &NamedSettings, name: impl Into<Cow<'static, str>>) -> Self {
        Self::from_source(SettingsSource::Named {
            registry: registry.clone(),
            name: name.into(),
        })
    }

    /// Rebinds the action to `settings`.
    pub fn using(mut self, settings: &Settings) -> Self {
        self.settings = SettingsSource::Fixed(settings.clone());
        self
    }

    /// Rebinds the action to the settings stored under `name` in `registry`,
    /// resolved on every capture.
    pub fn using_named(
        mut self,
        registry: &NamedSettings,
        name: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.settings = SettingsSource::Named {
            registry: registry.clone(),
            name: name.into(),
        };
        self
    }

    /// Sets the label reported as [`PanicInfo::alias`].
    pub fn alias(mut self, alias: impl Into<Cow<'static, str>>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Sets the value reported as [`PanicInfo::extra`].
    pub fn extra<T: Any + Send + Sync>(mut self, extra: T) -> Self {
        self.extra = Opaque::new(extra);
        self
    }

    /// Overrides the safe-mode flag of the settings for this action.
    pub fn safe(mut self, safe: bool) -> Self {
        self.safe = Some(safe);
        self
    }

    /// Sets the callback run after every capture, panic or not.
    pub fn always<F: Callback>(mut self, always: F) -> Self {
        self.always = Some(Handler::Value(shared_callback(always)));
        self
    }

    /// Like [`always`](Self::always), reading the callback from `slot` at
    /// capture time.
    pub fn always_ref(mut self, slot: &CallbackSlot) -> Self {
        self.always = Some(Handler::Slot(slot.clone()));
        self
    }

    /// Like [`always`](Self::always); `None` removes the callback.
    pub fn always_opt<F: Callback>(mut self, always: Option<F>) -> Self {
        self.always = always.map(|f| Handler::Value(shared_callback(f)));
        self
    }

    /// Sets the callback run when the closure returns normally.
    pub fn on_succeed<F: Callback>(mut self, on_succeed: F) -> Self {
        self.on_succeed = Some(Handler::Value(shared_callback(on_succeed)));
        self
    }

    /// Like [`on_succeed`](Self::on_succeed), reading the callback from
    /// `slot` at capture time.
    pub fn on_succeed_ref(mut self, slot: &CallbackSlot) -> Self {
        self.on_succeed = Some(Handler::Slot(slot.clone()));
        self
    }

    /// Like [`on_succeed`](Self::on_succeed); `None` removes the callback.
    pub fn on_succeed_opt<F: Callback>(mut self, on_succeed: Option<F>) -> Self {
        self.on_succeed = on_succeed.map(|f| Handler::Value(shared_callback(f)));
        self
    }

    /// Sets the callback run once per panic record, before the settings'
    /// watch.
    pub fn on_panic<F: PanicCallback>(mut self, on_panic: F) -> Self {
        self.on_panic = Some(Handler::Value(shared_panic_callback(on_panic)));
        self
    }

    /// Like [`on_panic`](Self::on_panic), reading the callback from `slot` at
    /// capture time.
    pub fn on_panic_ref(mut self, slot: &PanicSlot) -> Self {
        self.on_panic = Some(Handler::Slot(slot.clone()));
        self
    }

    /// Like [`on_panic`](Self::on_panic); `None` removes the callback.
    pub fn on_panic_opt<F: PanicCallback>(mut self, on_panic: Option<F>) -> Self {
        self.on_panic = on_panic.map(|f| Handler::Value(shared_panic_callback(f)));
        self
    }

    /// The label set by [`alias`](Self::alias).
    pub fn alias_name(&self) -> &str {
        &self.alias
    }

    /// The settings this action would use if it captured now.
    pub fn settings(&self) -> Settings {
        self.settings.resolve()
    }

    /// Runs `f`, intercepting a panic instead of letting it propagate.
    ///
    /// Returns `Some` with the closure's value when it completes. When it
    /// panics, `on_panic` and then the settings' watch are called for each
    /// record of the panic chain, in depth order, and `None` is returned.
    /// `on_succeed` runs on success only; `always` runs last in both cases.
    ///
    /// In safe mode every callback runs through the safe fallback runner, so
    /// a panicking callback is swallowed. Otherwise a callback panic
    /// propagates to the caller once `always` has run, and an enclosing
    /// capture reports it chained to the original panic.
    pub fn capture<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        self.capture_in(Opaque::empty(), f)
    }

    /// Like [`capture`](Self::capture), reporting `context` as
    /// [`PanicInfo::context`].
    pub fn capture_with_context<R>(&self, context: Opaque, f: impl FnOnce() -> R) -> Option<R> {
        self.capture_in(context, f)
    }

    /// Returns a guard that reports a panic unwinding through it when it is
    /// dropped.
    ///
    /// Unlike [`capture`](Self::capture) the guard cannot stop the panic; it
    /// only observes it. Because a callback panicking during an unwind would
    /// abort the process, callbacks always run in safe mode while unwinding.
    /// When the guard is dropped normally `on_succeed` and `always` run as
    /// for a successful capture.
    ///
    /// ```
    /// use panicpoint::Action;
    ///
    /// fn handle(action: &Action) {
    ///     let _guard = action.guard();
    ///     // ...
    /// }
    /// # handle(&Action::new());
    /// ```
    pub fn guard(&self) -> CaptureGuard {
        self.guard_with_context(Opaque::empty())
    }

    /// Like [`guard`](Self::guard), reporting `context` as
    /// [`PanicInfo::context`].
    pub fn guard_with_context(&self, context: Opaque) -> CaptureGuard {
        CaptureGuard {
            action: self.clone(),
            context,
            scope: Some(Scope::enter(ScopeKind::Observing)),
        }
    }

    fn capture_in<R>(&self, context: Opaque, f: impl FnOnce() -> R) -> Option<R> {
        tracing::trace!(target: "panicpoint", alias = %self.alias, "capture started");
        let scope = Scope::enter(ScopeKind::Catching);
        let result = panic::catch_unwind(AssertUnwindSafe(f));

        let settings = self.settings.resolve();
        let safe = self.safe.unwrap_or_else(|| settings.is_safe());

        match result {
            Ok(value) => {
                dump::discard_since(scope.exit());
                self.then_always(safe, || {
                    self.run_callback(self.on_succeed.as_ref(), safe);
                });
                Some(value)
            }
            Err(payload) => {
                let snapshot = scope.snapshot();
                let mark = scope.exit();
                self.then_always(safe, || {
                    let _dispatching = Dispatching::start();
                    self.dispatch(&settings, safe, snapshot, Some(payload), context);
                    // Kept while dispatching so that a callback panic is
                    // reported as chained to this one.
                    dump::discard_since(mark);
                });
                None
            }
        }
    }

    /// Runs `f`, then `always`, then resumes a panic raised by `f`.
    fn then_always(&self, safe: bool, f: impl FnOnce()) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        self.run_callback(self.always.as_ref(), safe);
        if let Err(payload) = outcome {
            panic::resume_unwind(payload);
        }
    }

    fn dispatch(
        &self,
        settings: &Settings,
        safe: bool,
        snapshot: Snapshot,
        mut payload: Option<Box<dyn Any + Send>>,
        context: Opaque,
    ) {
        let attributions = find_panics(&snapshot.stack, &settings.ignore_policy());
        let stack: Arc<str> = Arc::from(snapshot.stack);
        let payload_message = payload.as_deref().and_then(dump::payload_message);

        tracing::debug!(
            target: "panicpoint",
            alias = %self.alias,
            records = attributions.len(),
            safe,
            "captured panic"
        );

        let on_panic = self.on_panic.as_ref().and_then(Handler::resolve);
        let watch = settings.watch();

        for (index, Attribution { direct, actual }) in attributions.into_iter().enumerate() {
            let message: Option<String> = if index == 0 && payload_message.is_some() {
                payload_message.clone()
            } else {
                snapshot.messages.get(index).cloned().flatten()
            };
            let payload = if index == 0 { payload.take() } else { None };

            let info = PanicInfo {
                direct,
                actual,
                error: PanicError::new(message, payload),
                stack: stack.clone(),
                context: context.clone(),
                alias: self.alias.clone(),
                extra: self.extra.clone(),
            };

            if let Some(on_panic) = &on_panic {
                invoke(safe, || on_panic.on_panic(&info));
            }
            if let Some(watch) = &watch {
                invoke(safe, || watch.on_panic(&info));
            }
        }
    }

    fn run_callback(&self, handler: Option<&Handler<dyn Callback>>, safe: bool) {
        if let Some(callback) = handler.and_then(Handler::resolve) {
            invoke(safe, || callback.call());
        }
    }
}

fn invoke(safe: bool, f: impl FnOnce()) {
    if safe {
        safe::run(f);
    } else {
        f();
    }
}

/// Reports a panic unwinding through the scope it lives in.
///
/// Created by [`Action::guard`].
#[must_use = "the guard reports when it is dropped"]
pub struct CaptureGuard {
    action: Action,
    context: Opaque,
    scope: Option<Scope>,
}

impl CaptureGuard {
    /// The action this guard reports with.
    pub fn action(&self) -> &Action {
        &self.action
    }
}

impl fmt::Debug for CaptureGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureGuard")
            .field("action", &self.action)
            .field("context", &self.context)
            .finish()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let Some(scope) = self.scope.take() else {
            return;
        };
        let settings = self.action.settings.resolve();
        let context = mem::take(&mut self.context);

        if thread::panicking() {
            let snapshot = scope.snapshot();
            drop(scope);
            {
                let _dispatching = Dispatching::start();
                self.action.dispatch(&settings, true, snapshot, None, context);
            }
            self.action.run_callback(self.action.always.as_ref(), true);
        } else {
            dump::discard_since(scope.exit());
            let safe = self.action.safe.unwrap_or_else(|| settings.is_safe());
            self.action.then_always(safe, || {
                self.action.run_callback(self.action.on_succeed.as_ref(), safe);
            });
        }
    }
}
