#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Structured logging of captured panics through `tracing`.
//!
//! # Quick Start
//!
//! ```
//! use panicpoint::Action;
//!
//! // Every panic captured with the global settings is logged.
//! panicpoint_tracing::install();
//!
//! Action::new().alias("worker").capture(|| panic!("lost connection"));
//! ```
//!
//! Each record becomes an `ERROR` event on the `panicpoint` target with the
//! fields `alias`, `depth`, `direct`, `actual` and `error`, followed by a
//! `DEBUG` event carrying the full stack dump.
//!
//! # Spans
//!
//! Callbacks run after the panicking closure has unwound, so the span that was
//! active when the panic happened is gone by then. Use
//! [`ActionExt::in_current_span`] to remember it; [`log_panic`] then emits its
//! events inside that span:
//!
//! ```
//! use panicpoint::Action;
//! use panicpoint_tracing::ActionExt;
//!
//! let span = tracing::info_span!("request", id = 7);
//! let _entered = span.enter();
//! let action = Action::new()
//!     .in_current_span()
//!     .on_panic(panicpoint_tracing::log_panic);
//! action.capture(|| panic!("bad request"));
//! ```
//!
//! # Environment Variables
//!
//! - `PANICPOINT_TRACING` - Comma-separated options:
//!   - `nostack` - Do not emit the stack dump event

use std::sync::OnceLock;

use panicpoint::{Action, PanicInfo, Settings};
use tracing::Span;

#[derive(Debug)]
struct EnvOptions {
    stack: bool,
}

impl EnvOptions {
    fn get() -> &'static Self {
        static PANICPOINT_TRACING_FLAGS: OnceLock<EnvOptions> = OnceLock::new();

        PANICPOINT_TRACING_FLAGS.get_or_init(|| {
            let mut stack = true;
            if let Some(var) = std::env::var_os("PANICPOINT_TRACING") {
                for v in var.to_string_lossy().split(',') {
                    if v.trim().eq_ignore_ascii_case("nostack") {
                        stack = false;
                    }
                }
            }
            EnvOptions { stack }
        })
    }
}

/// The span remembered by [`ActionExt::in_current_span`].
#[derive(Clone, Debug)]
pub struct CapturedSpan(pub Span);

/// Logs one panic record.
///
/// Usable directly as a [`PanicCallback`](panicpoint::PanicCallback), either
/// as a settings watch or as an action's `on_panic`.
pub fn log_panic(info: &PanicInfo) {
    match info.extra.downcast_ref::<CapturedSpan>() {
        Some(CapturedSpan(span)) => span.in_scope(|| emit(info)),
        None => emit(info),
    }
}

fn emit(info: &PanicInfo) {
    tracing::error!(
        target: "panicpoint",
        alias = %info.alias,
        depth = info.depth(),
        direct = %info.direct,
        actual = %info.actual,
        error = %info.error,
        "panic captured"
    );
    if EnvOptions::get().stack {
        tracing::debug!(target: "panicpoint", alias = %info.alias, stack = %info.stack, "panic stack");
    }
}

/// Sets [`log_panic`] as the watch of the global settings.
pub fn install() {
    panicpoint::settings::set_watch(log_panic);
}

/// Sets [`log_panic`] as the watch of `settings`.
pub fn install_on(settings: &Settings) {
    settings.set_watch(log_panic);
}

/// Extension methods for [`Action`].
pub trait ActionExt {
    /// Remembers the current span as the action's extra value, so that
    /// [`log_panic`] logs inside it.
    ///
    /// This replaces any extra value set earlier.
    fn in_current_span(self) -> Action;
}

impl ActionExt for Action {
    fn in_current_span(self) -> Action {
        self.extra(CapturedSpan(Span::current()))
    }
}
