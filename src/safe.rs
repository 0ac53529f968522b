//! Safe fallback runner.
//!
//! Runs a callback so that a panic raised by it can never escape. The panic
//! is captured with a fixed, private set of settings that has no callbacks and
//! safe mode off, which guarantees that running a callback safely never
//! recurses into another safe run.

use crate::{Action, Settings};

static FALLBACK: spin::Lazy<Settings> = spin::Lazy::new(Settings::new);

/// Runs `f`, swallowing any panic it raises. Returns `true` if `f` completed.
///
/// ```
/// let completed = panicpoint::safe::run(|| panic!("ignored"));
/// assert!(!completed);
/// assert!(panicpoint::safe::run(|| ()));
/// ```
pub fn run(f: impl FnOnce()) -> bool {
    let completed = Action::with_settings(&FALLBACK)
        .alias("panicpoint::safe")
        .capture(f)
        .is_some();
    if !completed {
        tracing::debug!(target: "panicpoint", "discarded panic raised by a callback");
    }
    completed
}
