#![deny(
    missing_docs,
    unsafe_code,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Panic interception with business-location attribution.
//!
//! ## Overview
//!
//! When a panic is caught, the interesting question is rarely *where the
//! `panic!` was*: for an `unwrap` on `None` or an out-of-bounds index that
//! place is deep inside `core`. The question is *which line of your code
//! caused it*. This crate runs a closure, intercepts a panic raised by it and
//! hands each panic event to your callbacks with two locations:
//!
//! - the **direct** location, the frame nearest to the panic trigger, and
//! - the **actual** location, the first frame at or below it that the active
//!   [`IgnorePolicy`] does not classify as noise.
//!
//! ## Quick Example
//!
//! ```
//! use panicpoint::prelude::*;
//!
//! let action = Action::new()
//!     .alias("load-orders")
//!     .on_panic(|info: &PanicInfo| {
//!         eprintln!("{}: {} (caused at {})", info.alias, info.error, info.actual);
//!     });
//!
//! let orders: Vec<u32> = Vec::new();
//! assert_eq!(action.capture(|| orders[3]), None);
//! ```
//!
//! ## Building blocks
//!
//! - **[`Action`]**: a reusable builder describing what to do on a panic.
//!   Terminal operations are [`Action::capture`], which stops the panic, and
//!   [`Action::guard`], which only observes a panic unwinding through a
//!   scope.
//! - **[`Settings`]**: a shared bundle of ignore policy, watch callback and
//!   safe-mode flag. There is a [global](settings::global) instance, and
//!   settings can be shared by name through [`NamedSettings`].
//! - **[`PanicInfo`]**: the record passed to callbacks.
//! - **[`safe::run`]**: runs a callback without letting its panic escape.
//!
//! ## Chained panics
//!
//! If an `on_panic` callback itself panics (outside safe mode), the new panic
//! propagates and an enclosing capture reports the whole chain: one record per
//! event, the most recent with depth `0`.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use panicpoint::prelude::*;
//!
//! let depths = Arc::new(Mutex::new(Vec::new()));
//! let seen = depths.clone();
//! let outer = Action::new().on_panic(move |info: &PanicInfo| {
//!     seen.lock().unwrap().push(info.depth());
//! });
//! let inner = Action::new().on_panic(|_: &PanicInfo| panic!("callback failed"));
//!
//! outer.capture(|| inner.capture(|| -> u8 { panic!("first") }));
//! assert_eq!(*depths.lock().unwrap(), [0, 1]);
//! ```
//!
//! ## How panics are seen
//!
//! The first interception point installs a panic hook (see
//! [`install_panic_hook`]) that records a stack dump of every panic raised
//! while an interception point is active on the thread. The attribution is
//! computed from that dump by the [`panicpoint_internals`] crate.
//!
//! ## Logging
//!
//! The crate emits `tracing` events under the `panicpoint` target. Use the
//! `panicpoint-tracing` crate to turn captured panics into structured log
//! records.

extern crate alloc;

pub mod action;
pub mod callback;
mod dump;
mod ignore_crates;
mod info;
pub mod prelude;
pub mod registry;
pub mod safe;
pub mod settings;

pub use panicpoint_internals::{
    Attribution, IgnoreContainPath, IgnoreLocation, IgnorePolicy, Location, find_panics,
};

pub use self::{
    action::{Action, CaptureGuard},
    callback::{Callback, CallbackSlot, PanicCallback, PanicSlot, Slot},
    dump::{PANIC_BUF_SIZE, install_panic_hook},
    ignore_crates::IgnoreCrates,
    info::{Opaque, PanicError, PanicInfo},
    registry::{NamedSettings, load_settings, store_settings},
    settings::Settings,
};

/// Runs `f` with a default [`Action`] on the global settings.
///
/// Shorthand for `Action::new().capture(f)`.
pub fn capture<R>(f: impl FnOnce() -> R) -> Option<R> {
    Action::new().capture(f)
}

/// Runs `f` with a default [`Action`], reporting `context` as
/// [`PanicInfo::context`].
pub fn capture_with_context<R>(context: Opaque, f: impl FnOnce() -> R) -> Option<R> {
    Action::new().capture_with_context(context, f)
}

/// An [`Action`] on the global settings with the given alias.
pub fn alias(alias: impl Into<alloc::borrow::Cow<'static, str>>) -> Action {
    Action::new().alias(alias)
}

/// An [`Action`] on the global settings with the given `on_panic` callback.
pub fn on_panic<F: PanicCallback>(on_panic: F) -> Action {
    Action::new().on_panic(on_panic)
}

/// An [`Action`] on the global settings with the given `on_succeed` callback.
pub fn on_succeed<F: Callback>(on_succeed: F) -> Action {
    Action::new().on_succeed(on_succeed)
}

/// An [`Action`] on the global settings with the given `always` callback.
pub fn always<F: Callback>(always: F) -> Action {
    Action::new().always(always)
}

/// An [`Action`] on the global settings with the safe-mode override set.
pub fn safe(safe: bool) -> Action {
    Action::new().safe(safe)
}

/// An [`Action`] bound to `settings`.
pub fn use_settings(settings: &Settings) -> Action {
    Action::with_settings(settings)
}

/// An [`Action`] on the settings stored under `name` in the global registry.
pub fn by_name(name: impl Into<alloc::borrow::Cow<'static, str>>) -> Action {
    Action::by_name(name)
}
