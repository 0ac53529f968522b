//! Stack walker.
//!
//! [`find_panics`] scans a dump top to bottom. Every line starting with
//! [`PANIC_MARKER`] opens a panic event; the frame right after the marker's
//! own two-line frame is the *direct* location, and the first following frame
//! that the [`IgnorePolicy`] does not consider noise is the *actual* location.
//!
//! The walker is a flat loop over the lines, so chains of any length are
//! handled without recursion, and it is total: truncated or garbage input
//! yields fewer (or sentinel) records, never a panic.

use alloc::{vec, vec::Vec};

use crate::{ignore::IgnorePolicy, location::Location};

/// Line prefix that marks the start of a panic event in a dump.
pub const PANIC_MARKER: &str = "panic(";

/// The locations resolved for one panic event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribution {
    /// The call site that raised the panic, never filtered.
    pub direct: Location,
    /// The first call site at or after `direct` that is not noise.
    pub actual: Location,
}

impl Attribution {
    fn unfiltered(direct: Location) -> Self {
        Self {
            actual: direct.clone(),
            direct,
        }
    }
}

/// Finds every panic event in `stack`.
///
/// Records come back in scan order, which is most recent panic first, and
/// their depths are `0..n`. A dump without any marker yields exactly one
/// record holding [`Location::UNKNOWN`] twice.
///
/// ```
/// use panicpoint_internals::{IgnorePolicy, find_panics};
///
/// let dump = "\
/// panic(\"called `Option::unwrap()` on a `None` value\")
///         at src/orders.rs:12:30
/// core::option::unwrap_failed
///         at /rustc/0123/library/core/src/option.rs:2015:5
/// orders::load
///         at /srv/orders/src/orders.rs:12:30
/// ";
/// let found = find_panics(dump, &IgnorePolicy::default());
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].direct.function, "core::option::unwrap_failed");
/// assert_eq!(found[0].actual.function, "orders::load");
/// ```
pub fn find_panics(stack: &str, policy: &IgnorePolicy) -> Vec<Attribution> {
    let lines: Vec<&str> = stack
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();

    let mut found: Vec<Attribution> = Vec::with_capacity(1);
    let mut direct: Option<Location> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_marker(line) {
            // A new trigger while still looking for `actual`: everything in
            // between was noise.
            if let Some(pending) = direct.take() {
                found.push(Attribution::unfiltered(pending));
            }

            let Some(self_file_line) = lines.get(i + 1).copied().filter(|l| !is_marker(l))
            else {
                direct = Some(Location::parse(line, "", 0));
                i += 1;
                continue;
            };

            // Skip the trigger's own frame; the next pair invoked it. The
            // pair is left in place so the search for `actual` starts at it.
            direct = match (lines.get(i + 2), lines.get(i + 3)) {
                (Some(func_line), Some(file_line))
                    if !is_marker(func_line) && !is_marker(file_line) =>
                {
                    Some(Location::parse(func_line, file_line, 0))
                }
                // Truncated right after the marker: the marker's own frame is
                // the best location available.
                _ => Some(Location::parse(line, self_file_line, 0)),
            };
            i += 2;
            continue;
        }

        let Some(pending) = &direct else {
            i += 1;
            continue;
        };

        let Some(file_line) = lines.get(i + 1) else {
            break;
        };
        if is_marker(file_line) {
            // Dangling function line, the next event starts right after it.
            i += 1;
            continue;
        }

        if !policy.is_ignored(line, file_line) {
            found.push(Attribution {
                direct: pending.clone(),
                actual: Location::parse(line, file_line, 0),
            });
            direct = None;
        }
        i += 2;
    }

    if let Some(pending) = direct {
        found.push(Attribution::unfiltered(pending));
    }

    if found.is_empty() {
        return vec![Attribution::unfiltered(Location::UNKNOWN)];
    }

    for (depth, attribution) in found.iter_mut().enumerate() {
        let depth = i32::try_from(depth).unwrap_or(i32::MAX);
        attribution.direct.depth = depth;
        attribution.actual.depth = depth;
    }
    found
}

fn is_marker(line: &str) -> bool {
    line.starts_with(PANIC_MARKER)
}
