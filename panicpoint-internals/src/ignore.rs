//! Ignore policy.
//!
//! When looking for the business location of a panic, frames that belong to
//! the standard library or to other plumbing are noise: the interesting frame
//! is the first one outside of them. An [`IgnorePolicy`] is an ordered list of
//! [`IgnoreLocation`] predicates, and a frame is noise as soon as any of them
//! says so.
//!
//! Policies are replaced wholesale; there is no merge or patch operation.
//!
//! ```
//! use panicpoint_internals::{IgnoreContainPath, IgnorePolicy};
//!
//! let policy = IgnorePolicy::empty()
//!     .with(IgnoreContainPath::STD)
//!     .with(|func_line: &str, _file_line: &str| func_line.starts_with("tokio::"));
//!
//! assert!(policy.is_ignored("tokio::runtime::park", "at src/main.rs:1"));
//! assert!(!policy.is_ignored("orders::main", "at src/main.rs:1"));
//! ```

use alloc::{vec, vec::Vec};
use core::fmt;

use triomphe::Arc;
use unsize::CoerceUnsize;

/// A predicate over a frame pair deciding whether the frame is noise.
///
/// Implemented for every `Fn(&str, &str) -> bool + Send + Sync`. The first
/// argument is the raw function line, the second the raw file line.
pub trait IgnoreLocation: 'static + Send + Sync {
    /// Returns `true` if the frame should be skipped.
    fn should_ignore(&self, func_line: &str, file_line: &str) -> bool;
}

impl<F> IgnoreLocation for F
where
    F: Fn(&str, &str) -> bool + Send + Sync + 'static,
{
    fn should_ignore(&self, func_line: &str, file_line: &str) -> bool {
        self(func_line, file_line)
    }
}

/// Ignores frames whose file line contains any of a fixed set of fragments.
#[derive(Copy, Clone, Debug)]
pub struct IgnoreContainPath {
    /// Path fragments matched as plain substrings of the file line.
    pub paths: &'static [&'static str],
}

impl IgnoreContainPath {
    /// The source trees of the Rust standard library distribution.
    pub const STD: Self = Self {
        paths: &[
            "/library/std/src/",
            "/library/core/src/",
            "/library/alloc/src/",
            "/library/panic_unwind/src/",
            "/library/panic_abort/src/",
            "/library/proc_macro/src/",
            "/library/test/src/",
            "/library/backtrace/src/",
            "\\library\\std\\src\\",
            "\\library\\core\\src\\",
            "\\library\\alloc\\src\\",
            "\\library\\panic_unwind\\src\\",
            "\\library\\panic_abort\\src\\",
            "\\library\\proc_macro\\src\\",
            "\\library\\test\\src\\",
            "\\library\\backtrace\\src\\",
        ],
    };
}

impl IgnoreLocation for IgnoreContainPath {
    fn should_ignore(&self, _func_line: &str, file_line: &str) -> bool {
        self.paths.iter().any(|path| file_line.contains(path))
    }
}

/// An ordered, OR-combined list of [`IgnoreLocation`] predicates.
///
/// Cloning is cheap: predicates are reference counted.
#[derive(Clone)]
pub struct IgnorePolicy {
    checkers: Vec<Arc<dyn IgnoreLocation>>,
}

impl IgnorePolicy {
    /// Same as [`IgnorePolicy::empty`], for building a policy from scratch.
    pub const fn new() -> Self {
        Self::empty()
    }

    /// A policy that ignores nothing; `actual` will always equal `direct`.
    pub const fn empty() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    /// Appends a predicate and returns the extended policy.
    #[must_use]
    pub fn with<P>(mut self, checker: P) -> Self
    where
        P: IgnoreLocation,
    {
        self.checkers.push(into_shared(checker));
        self
    }

    /// Returns `true` if any predicate marks the frame as noise.
    pub fn is_ignored(&self, func_line: &str, file_line: &str) -> bool {
        self.checkers
            .iter()
            .any(|checker| checker.should_ignore(func_line, file_line))
    }

    /// Number of predicates in the policy.
    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    /// Returns `true` if the policy has no predicates.
    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

impl Default for IgnorePolicy {
    /// The standard library filter, [`IgnoreContainPath::STD`].
    fn default() -> Self {
        Self {
            checkers: vec![into_shared(IgnoreContainPath::STD)],
        }
    }
}

impl<P> FromIterator<P> for IgnorePolicy
where
    P: IgnoreLocation,
{
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            checkers: iter.into_iter().map(into_shared).collect(),
        }
    }
}

impl fmt::Debug for IgnorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnorePolicy")
            .field("checkers", &self.checkers.len())
            .finish()
    }
}

fn into_shared<P: IgnoreLocation>(checker: P) -> Arc<dyn IgnoreLocation> {
    Arc::new(checker).unsize(unsize::Coercion!(to dyn IgnoreLocation))
}
