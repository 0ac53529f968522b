//! Panic recording and stack dump rendering.
//!
//! Rust hands a panic hook everything the walker needs (message, location and
//! the live call stack) but hands `catch_unwind` only the payload. This module
//! bridges the two: a process-wide hook records every panic raised while an
//! interception point is active on the current thread, and the interception
//! point renders the recorded events into the textual dump format understood
//! by [`find_panics`](panicpoint_internals::find_panics):
//!
//! ```text
//! thread 'main' [capturing]:
//! panic("called `Option::unwrap()` on a `None` value")
//!              at src/orders.rs:12:30
//! core::option::unwrap_failed
//!              at /rustc/90b35a6239c3d8bdabc530a6a0816f7ff89a0aaf/library/core/src/option.rs:2015:5
//! orders::load
//!              at /srv/orders/src/orders.rs:12:30
//! ```
//!
//! Events stay recorded until the interception point that saw them has
//! finished dispatching. A callback that panics during dispatch therefore adds
//! a second event on top of the first, and an enclosing interception point
//! reports both: that is how chained panics are detected.
//!
//! Outside of dispatch a new panic replaces the events recorded since the
//! innermost interception point was entered: whatever raised them has been
//! handled already, since the body kept running.
//!
//! # Environment Variables
//!
//! - `PANICPOINT_BACKTRACE` - Comma-separated options:
//!   - `full` - Keep the panic machinery frames (`std::panicking`,
//!     `core::panicking`, ...) at the top of every recorded event

use alloc::{borrow::ToOwned, boxed::Box, string::String, vec::Vec};
use core::{
    any::Any,
    cell::{Cell, RefCell},
    fmt::Write as _,
    marker::PhantomData,
};
use std::{
    panic::{self, PanicHookInfo},
    sync::{Once, OnceLock},
    thread,
};

use panicpoint_internals::PANIC_MARKER;

/// Maximum size of a rendered dump. Longer dumps lose their tail, which holds
/// the oldest events; the cut may fall in the middle of a frame.
pub const PANIC_BUF_SIZE: usize = 64 << 10;

const FILE_INDENT: &str = "             ";

/// Symbols of the frames std and core run between `panic!` and the hook.
const PANIC_ENTRY_SYMBOLS: &[&str] = &[
    "std::panicking::",
    "core::panicking::",
    "rust_begin_unwind",
    "__rust_end_short_backtrace",
    "__rust_start_panic",
];

/// Frames of the recorder itself, trimmed when no panic entry frame resolved.
const RECORDER_SYMBOLS: &[&str] = &["backtrace::", "<backtrace::", "panicpoint::dump::"];

#[derive(Debug)]
struct EnvOptions {
    full: bool,
}

impl EnvOptions {
    fn get() -> &'static Self {
        static PANICPOINT_FLAGS: OnceLock<EnvOptions> = OnceLock::new();

        PANICPOINT_FLAGS.get_or_init(|| {
            let mut full = false;
            if let Some(var) = std::env::var_os("PANICPOINT_BACKTRACE") {
                for v in var.to_string_lossy().split(',') {
                    if v.trim().eq_ignore_ascii_case("full") {
                        full = true;
                    }
                }
            }
            EnvOptions { full }
        })
    }
}

struct PanicEvent {
    message: Option<String>,
    block: String,
}

struct ThreadState {
    events: RefCell<Vec<PanicEvent>>,
    catching: Cell<usize>,
    observing: Cell<usize>,
    /// Mark of the innermost active scope.
    floor: Cell<usize>,
    /// Whether the innermost interception point is running its callbacks.
    dispatching: Cell<bool>,
}

impl ThreadState {
    const fn new() -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            catching: Cell::new(0),
            observing: Cell::new(0),
            floor: Cell::new(0),
            dispatching: Cell::new(false),
        }
    }

    fn is_active(&self) -> bool {
        self.catching.get() > 0 || self.observing.get() > 0
    }
}

thread_local! {
    static STATE: ThreadState = const { ThreadState::new() };
}

static INSTALL: Once = Once::new();

/// Installs the panic recorder.
///
/// Idempotent, and done automatically the first time an interception point is
/// entered; call it early if your application replaces the panic hook itself,
/// so that the recorder ends up chained behind yours. The previously installed
/// hook keeps running for every panic that is not being caught by
/// [`Action::capture`](crate::Action::capture).
///
/// Does nothing on a thread that is currently panicking, because
/// [`std::panic::set_hook`] cannot be called there.
pub fn install_panic_hook() {
    if thread::panicking() {
        return;
    }
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if record(info) {
                previous(info);
            }
        }));
    });
}

/// Records `info` if an interception point is active. Returns whether the
/// previous hook should still run.
fn record(info: &PanicHookInfo<'_>) -> bool {
    STATE
        .try_with(|state| {
            if !state.is_active() {
                return true;
            }
            let event = PanicEvent::capture(info);
            if let Ok(mut events) = state.events.try_borrow_mut() {
                if !state.dispatching.get() {
                    events.truncate(state.floor.get());
                }
                events.push(event);
            }
            state.catching.get() == 0
        })
        .unwrap_or(true)
}

/// Extracts the message of a `panic!` payload.
pub(crate) fn payload_message(payload: &(dyn Any + Send)) -> Option<String> {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        Some((*message).to_owned())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}

impl PanicEvent {
    fn capture(info: &PanicHookInfo<'_>) -> Self {
        let message = payload_message(info.payload());

        let mut block = String::new();
        let _ = writeln!(
            block,
            "{PANIC_MARKER}{:?})",
            message.as_deref().unwrap_or("Box<dyn Any>")
        );
        match info.location() {
            Some(location) => {
                let _ = writeln!(
                    block,
                    "{FILE_INDENT}at {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                );
            }
            None => {
                let _ = writeln!(block, "{FILE_INDENT}at <unknown>");
            }
        }

        for frame in capture_frames() {
            frame.render(&mut block);
        }

        Self { message, block }
    }
}

struct Frame {
    symbol: String,
    file: Option<String>,
    line: Option<u32>,
    column: Option<u32>,
}

impl Frame {
    fn render(&self, out: &mut String) {
        let _ = writeln!(out, "{}", self.symbol);
        let _ = match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => {
                writeln!(out, "{FILE_INDENT}at {file}:{line}:{column}")
            }
            (Some(file), Some(line), None) => writeln!(out, "{FILE_INDENT}at {file}:{line}"),
            (Some(file), None, _) => writeln!(out, "{FILE_INDENT}at {file}"),
            (None, ..) => writeln!(out, "{FILE_INDENT}at <unknown>"),
        };
    }
}

fn capture_frames() -> Vec<Frame> {
    let mut frames = Vec::new();

    backtrace::trace(|frame| {
        backtrace::resolve_frame(frame, |symbol| {
            // Frames without a symbol name cannot be attributed.
            let Some(name) = symbol.name() else {
                return;
            };
            frames.push(Frame {
                symbol: format!("{name:#}"),
                file: symbol.filename().map(|path| path.display().to_string()),
                line: symbol.lineno(),
                column: symbol.colno(),
            });
        });

        true
    });

    if !EnvOptions::get().full {
        let start = panic_entry_end(&frames);
        frames.drain(..start);
    }
    frames
}

/// Index of the first frame below the panic machinery.
fn panic_entry_end(frames: &[Frame]) -> usize {
    let mut start = 0;
    for (i, frame) in frames.iter().enumerate() {
        if is_any_of(&frame.symbol, PANIC_ENTRY_SYMBOLS) {
            start = i + 1;
        } else if start > 0 {
            return start;
        }
    }
    if start > 0 {
        return start;
    }

    frames
        .iter()
        .position(|frame| !is_any_of(&frame.symbol, RECORDER_SYMBOLS))
        .unwrap_or(frames.len())
}

fn is_any_of(symbol: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pattern| symbol.contains(pattern))
}

/// The kind of interception point a [`Scope`] belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    /// Stops the unwind; owns the report, so the previous hook is silenced.
    Catching,
    /// Only observes an unwind that keeps propagating.
    Observing,
}

/// Position in the thread's event stack.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Mark(usize);

/// A rendered dump plus the message of each event, most recent first.
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub(crate) stack: String,
    pub(crate) messages: Vec<Option<String>>,
}

/// An active interception point on the current thread.
#[derive(Debug)]
pub(crate) struct Scope {
    kind: ScopeKind,
    mark: Mark,
    outer_floor: usize,
    outer_dispatching: bool,
    _not_send: PhantomData<*const ()>,
}

impl Scope {
    pub(crate) fn enter(kind: ScopeKind) -> Self {
        install_panic_hook();
        let (mark, outer_floor, outer_dispatching) = STATE
            .try_with(|state| {
                let counter = state.counter(kind);
                counter.set(counter.get().saturating_add(1));
                let mark = state.events.try_borrow().map_or(0, |events| events.len());
                (
                    mark,
                    state.floor.replace(mark),
                    state.dispatching.replace(false),
                )
            })
            .unwrap_or((0, 0, false));

        Self {
            kind,
            mark: Mark(mark),
            outer_floor,
            outer_dispatching,
            _not_send: PhantomData,
        }
    }

    /// Renders every event recorded since this scope was entered.
    pub(crate) fn snapshot(&self) -> Snapshot {
        STATE
            .try_with(|state| {
                let Ok(events) = state.events.try_borrow() else {
                    return Snapshot::default();
                };
                let recent = events.get(self.mark.0..).unwrap_or_default();

                let mut stack = String::new();
                let name = thread::current().name().unwrap_or("<unnamed>").to_owned();
                let _ = writeln!(stack, "thread '{name}' [capturing]:");
                for event in recent.iter().rev() {
                    stack.push_str(&event.block);
                }
                truncate_at_char_boundary(&mut stack, PANIC_BUF_SIZE);

                Snapshot {
                    stack,
                    messages: recent.iter().rev().map(|e| e.message.clone()).collect(),
                }
            })
            .unwrap_or_default()
    }

    /// Leaves the scope but keeps its events, so that an enclosing scope
    /// still sees them if the caller panics before calling [`discard_since`].
    pub(crate) fn exit(self) -> Mark {
        self.mark
    }
}

impl ThreadState {
    fn counter(&self, kind: ScopeKind) -> &Cell<usize> {
        match kind {
            ScopeKind::Catching => &self.catching,
            ScopeKind::Observing => &self.observing,
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let _ = STATE.try_with(|state| {
            let counter = state.counter(self.kind);
            counter.set(counter.get().saturating_sub(1));
            state.floor.set(self.outer_floor);
            state.dispatching.set(self.outer_dispatching);
            if !state.is_active()
                && let Ok(mut events) = state.events.try_borrow_mut()
            {
                events.clear();
            }
        });
    }
}

/// Marks the current thread as running the callbacks of an interception point
/// that has just exited, until dropped.
///
/// Panics raised meanwhile are chained to the recorded events instead of
/// replacing them.
#[derive(Debug)]
pub(crate) struct Dispatching {
    outer: bool,
    _not_send: PhantomData<*const ()>,
}

impl Dispatching {
    pub(crate) fn start() -> Self {
        let outer = STATE
            .try_with(|state| state.dispatching.replace(true))
            .unwrap_or(false);
        Self {
            outer,
            _not_send: PhantomData,
        }
    }
}

impl Drop for Dispatching {
    fn drop(&mut self) {
        let _ = STATE.try_with(|state| state.dispatching.set(self.outer));
    }
}

/// Forgets the events recorded after `mark`; they have been handled.
pub(crate) fn discard_since(mark: Mark) {
    let _ = STATE.try_with(|state| {
        if let Ok(mut events) = state.events.try_borrow_mut() {
            events.truncate(mark.0);
        }
    });
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
