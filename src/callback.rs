//! Callback traits and late-bound callback slots.
//!
//! An [`Action`](crate::Action) stores each callback either by value or as a
//! [`Slot`]. A slot is a shared cell read at capture time, so a callback
//! registered after the action was built is still picked up:
//!
//! ```
//! use panicpoint::{Action, CallbackSlot};
//!
//! let slot = CallbackSlot::new();
//! let action = Action::new().always_ref(&slot);
//!
//! slot.set(|| println!("done"));
//! action.capture(|| ());
//! ```

use core::fmt;

use triomphe::Arc;
use unsize::CoerceUnsize;

use crate::PanicInfo;

/// A callback receiving one [`PanicInfo`] per panic event.
///
/// Implemented for every `Fn(&PanicInfo) + Send + Sync + 'static`.
pub trait PanicCallback: 'static + Send + Sync {
    /// Handles one record.
    fn on_panic(&self, info: &PanicInfo);
}

impl<F> PanicCallback for F
where
    F: Fn(&PanicInfo) + Send + Sync + 'static,
{
    fn on_panic(&self, info: &PanicInfo) {
        self(info)
    }
}

/// A callback without arguments, used for `always` and `on_succeed`.
///
/// Implemented for every `Fn() + Send + Sync + 'static`.
pub trait Callback: 'static + Send + Sync {
    /// Runs the callback.
    fn call(&self);
}

impl<F> Callback for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn call(&self) {
        self()
    }
}

/// A shared cell holding an optional callback.
///
/// Clones share the cell. See the [module documentation](self).
pub struct Slot<H: ?Sized + 'static>(Arc<spin::RwLock<Option<Arc<H>>>>);

/// A [`Slot`] for [`PanicCallback`]s.
pub type PanicSlot = Slot<dyn PanicCallback>;

/// A [`Slot`] for [`Callback`]s.
pub type CallbackSlot = Slot<dyn Callback>;

impl<H: ?Sized + 'static> Slot<H> {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self(Arc::new(spin::RwLock::new(None)))
    }

    /// Empties the slot.
    pub fn clear(&self) {
        *self.0.write() = None;
    }

    /// Returns `true` if the slot currently holds a callback.
    pub fn is_set(&self) -> bool {
        self.0.read().is_some()
    }

    pub(crate) fn load(&self) -> Option<Arc<H>> {
        self.0.read().clone()
    }
}

impl PanicSlot {
    /// Stores `callback`, replacing the previous one.
    pub fn set<F: PanicCallback>(&self, callback: F) {
        *self.0.write() = Some(shared_panic_callback(callback));
    }
}

impl CallbackSlot {
    /// Stores `callback`, replacing the previous one.
    pub fn set<F: Callback>(&self, callback: F) {
        *self.0.write() = Some(shared_callback(callback));
    }
}

impl<H: ?Sized + 'static> Clone for Slot<H> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<H: ?Sized + 'static> Default for Slot<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized + 'static> fmt::Debug for Slot<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("is_set", &self.is_set()).finish()
    }
}

/// A callback as stored by an action.
pub(crate) enum Handler<H: ?Sized + 'static> {
    Value(Arc<H>),
    Slot(Slot<H>),
}

impl<H: ?Sized + 'static> Handler<H> {
    /// The callback to run now, if any.
    pub(crate) fn resolve(&self) -> Option<Arc<H>> {
        match self {
            Handler::Value(callback) => Some(callback.clone()),
            Handler::Slot(slot) => slot.load(),
        }
    }
}

impl<H: ?Sized + 'static> Clone for Handler<H> {
    fn clone(&self) -> Self {
        match self {
            Handler::Value(callback) => Handler::Value(callback.clone()),
            Handler::Slot(slot) => Handler::Slot(slot.clone()),
        }
    }
}

impl<H: ?Sized + 'static> fmt::Debug for Handler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Value(_) => f.write_str("Value"),
            Handler::Slot(slot) => fmt::Debug::fmt(slot, f),
        }
    }
}

pub(crate) fn shared_panic_callback<F: PanicCallback>(callback: F) -> Arc<dyn PanicCallback> {
    Arc::new(callback).unsize(unsize::Coercion!(to dyn PanicCallback))
}

pub(crate) fn shared_callback<F: Callback>(callback: F) -> Arc<dyn Callback> {
    Arc::new(callback).unsize(unsize::Coercion!(to dyn Callback))
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_send_sync() {
        static_assertions::assert_impl_all!(PanicSlot: Send, Sync, Clone);
        static_assertions::assert_impl_all!(CallbackSlot: Send, Sync, Clone);
    }

    #[test]
    fn test_slot_is_read_late() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let slot = CallbackSlot::new();
        let handler = Handler::Slot(slot.clone());
        assert!(handler.resolve().is_none());

        slot.set(|| {
            CALLS.fetch_add(1, Ordering::Relaxed);
        });
        assert!(slot.is_set());
        if let Some(callback) = handler.resolve() {
            callback.call();
        }
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);

        slot.clear();
        assert!(handler.resolve().is_none());
    }

    #[test]
    fn test_value_handler() {
        let handler = Handler::Value(shared_callback(|| ()));
        assert!(handler.clone().resolve().is_some());
        assert_eq!(format!("{handler:?}"), "Value");
    }
}
