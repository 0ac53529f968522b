//! Shared capture settings.
//!
//! A [`Settings`] value bundles the ignore policy, the watch callback and the
//! safe-mode flag consulted when a capture resolves a panic. It is a handle:
//! clones share the same data, and a change made through any clone is seen by
//! every action bound to it, on every thread, from its next capture on.
//!
//! ```
//! use panicpoint::{IgnoreContainPath, IgnorePolicy, Settings};
//!
//! let settings = Settings::new()
//!     .with_safe(true)
//!     .with_ignore_policy(IgnorePolicy::default().with(IgnoreContainPath {
//!         paths: &["/vendor/"],
//!     }));
//!
//! let shared = settings.clone();
//! shared.set_safe(false);
//! assert!(!settings.is_safe());
//! ```

use core::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use panicpoint_internals::IgnorePolicy;
use triomphe::Arc;

use crate::{
    Action,
    callback::{PanicCallback, shared_panic_callback},
};

struct SettingsData {
    ignore_policy: spin::RwLock<IgnorePolicy>,
    watch: spin::RwLock<Option<Arc<dyn PanicCallback>>>,
    safe: AtomicBool,
}

/// A shared bundle of capture configuration.
///
/// See the [module documentation](self).
#[derive(Clone)]
pub struct Settings(Arc<SettingsData>);

impl Settings {
    /// Creates settings with the default ignore policy, no watch and safe mode
    /// off.
    pub fn new() -> Self {
        Self(Arc::new(SettingsData {
            ignore_policy: spin::RwLock::new(IgnorePolicy::default()),
            watch: spin::RwLock::new(None),
            safe: AtomicBool::new(false),
        }))
    }

    /// Sets the watch callback and returns `self`.
    #[must_use]
    pub fn with_watch<F: PanicCallback>(self, watch: F) -> Self {
        self.set_watch(watch);
        self
    }

    /// Sets the safe-mode flag and returns `self`.
    #[must_use]
    pub fn with_safe(self, safe: bool) -> Self {
        self.set_safe(safe);
        self
    }

    /// Replaces the ignore policy and returns `self`.
    #[must_use]
    pub fn with_ignore_policy(self, policy: IgnorePolicy) -> Self {
        self.set_ignore_policy(policy);
        self
    }

    /// Sets the callback invoked for every panic record, after the action's
    /// own `on_panic`.
    pub fn set_watch<F: PanicCallback>(&self, watch: F) -> &Self {
        *self.0.watch.write() = Some(shared_panic_callback(watch));
        self
    }

    /// Removes the watch callback.
    pub fn clear_watch(&self) -> &Self {
        *self.0.watch.write() = None;
        self
    }

    /// Sets whether callbacks run through the safe fallback runner.
    pub fn set_safe(&self, safe: bool) -> &Self {
        self.0.safe.store(safe, Ordering::Release);
        self
    }

    /// Replaces the ignore policy wholesale.
    pub fn set_ignore_policy(&self, policy: IgnorePolicy) -> &Self {
        *self.0.ignore_policy.write() = policy;
        self
    }

    /// Returns `true` if a watch callback is set.
    pub fn has_watch(&self) -> bool {
        self.0.watch.read().is_some()
    }

    /// The safe-mode flag.
    pub fn is_safe(&self) -> bool {
        self.0.safe.load(Ordering::Acquire)
    }

    /// A copy of the current ignore policy.
    pub fn ignore_policy(&self) -> IgnorePolicy {
        self.0.ignore_policy.read().clone()
    }

    /// Returns `true` if both handles share the same data.
    pub fn ptr_eq(&self, other: &Settings) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// An [`Action`] bound to these settings.
    pub fn action(&self) -> Action {
        Action::with_settings(self)
    }

    pub(crate) fn watch(&self) -> Option<Arc<dyn PanicCallback>> {
        self.0.watch.read().clone()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("ignore_policy", &*self.0.ignore_policy.read())
            .field("has_watch", &self.has_watch())
            .field("safe", &self.is_safe())
            .finish()
    }
}

static GLOBAL: spin::Lazy<Settings> = spin::Lazy::new(Settings::new);

/// The process-wide default settings, used by [`Action::new`].
pub fn global() -> &'static Settings {
    &GLOBAL
}

/// Sets the watch callback of the [global](global()) settings.
pub fn set_watch<F: PanicCallback>(watch: F) {
    GLOBAL.set_watch(watch);
}

/// Removes the watch callback of the [global](global()) settings.
pub fn clear_watch() {
    GLOBAL.clear_watch();
}

/// Sets the safe-mode flag of the [global](global()) settings.
pub fn set_safe(safe: bool) {
    GLOBAL.set_safe(safe);
}

/// Replaces the ignore policy of the [global](global()) settings.
pub fn set_ignore_policy(policy: IgnorePolicy) {
    GLOBAL.set_ignore_policy(policy);
}
