//! Named settings registry.
//!
//! Settings can be shared by name instead of by handle. A lookup of a name
//! that was never stored creates fresh [`Settings`] and remembers them, so
//! every lookup of the same name yields the same instance:
//!
//! ```
//! use panicpoint::NamedSettings;
//!
//! let registry = NamedSettings::new();
//! let a = registry.load("orders");
//! let b = registry.load("orders");
//! assert!(a.ptr_eq(&b));
//! ```

use alloc::{borrow::Cow, borrow::ToOwned, string::String};
use core::fmt;

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use triomphe::Arc;

use crate::{Action, Settings};

type SettingsMap = HashMap<String, Settings, FxBuildHasher>;

/// A name to [`Settings`] map. Clones share the same map.
#[derive(Clone, Default)]
pub struct NamedSettings(Arc<spin::RwLock<SettingsMap>>);

impl NamedSettings {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the settings stored under `name`, creating them first if the
    /// name is unknown.
    pub fn load(&self, name: &str) -> Settings {
        if let Some(settings) = self.0.read().get(name) {
            return settings.clone();
        }

        // Another thread may have created the entry in between.
        self.0
            .write()
            .entry(name.to_owned())
            .or_insert_with(|| {
                tracing::trace!(target: "panicpoint", name, "creating named settings");
                Settings::new()
            })
            .clone()
    }

    /// Returns the settings stored under `name` without creating them.
    pub fn get(&self, name: &str) -> Option<Settings> {
        self.0.read().get(name).cloned()
    }

    /// Stores `settings` under `name`, replacing any previous entry.
    ///
    /// Actions already bound to the name pick up the new settings on their
    /// next capture.
    pub fn store(&self, name: impl Into<String>, settings: Settings) {
        self.0.write().insert(name.into(), settings);
    }

    /// Removes the entry for `name`, returning it.
    pub fn remove(&self, name: &str) -> Option<Settings> {
        self.0.write().remove(name)
    }

    /// Number of stored names.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Returns `true` if no name is stored.
    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    /// An [`Action`] resolving `name` in this registry at capture time.
    pub fn action(&self, name: impl Into<Cow<'static, str>>) -> Action {
        Action::with_registry(self, name)
    }
}

impl fmt::Debug for NamedSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.read().keys()).finish()
    }
}

static GLOBAL: spin::Lazy<NamedSettings> = spin::Lazy::new(NamedSettings::new);

/// The process-wide registry, used by [`Action::by_name`].
pub fn global() -> &'static NamedSettings {
    &GLOBAL
}

/// Stores `settings` under `name` in the [global](global()) registry.
pub fn store_settings(name: impl Into<String>, settings: Settings) {
    GLOBAL.store(name, settings);
}

/// Loads, creating if needed, the settings for `name` from the
/// [global](global()) registry.
pub fn load_settings(name: &str) -> Settings {
    GLOBAL.load(name)
}
