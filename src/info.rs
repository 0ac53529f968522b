//! The record handed to panic callbacks.

use alloc::{borrow::Cow, boxed::Box, string::String, sync::Arc};
use core::{
    any::{self, Any},
    fmt,
};

use panicpoint_internals::Location;
use unsize::CoerceUnsize;

/// One panic event observed at an interception point.
///
/// A capture produces one `PanicInfo` per event in the chain, in depth order:
/// the record with `actual.depth == 0` describes the most recent panic. When
/// the dump holds no event at all a single record with both locations set to
/// [`Location::UNKNOWN`] is produced instead.
#[derive(Clone, Debug)]
pub struct PanicInfo {
    /// The frame nearest to the panic trigger.
    pub direct: Location,
    /// The first frame not ignored by the active policy at or below `direct`.
    ///
    /// Equal to `direct` when nothing is ignored or when every frame is.
    pub actual: Location,
    /// The panic value.
    pub error: PanicError,
    /// The full dump the locations were parsed from.
    pub stack: Arc<str>,
    /// Per-invocation context given to
    /// [`Action::capture_with_context`](crate::Action::capture_with_context).
    pub context: Opaque,
    /// Label of the action that intercepted the panic.
    pub alias: Cow<'static, str>,
    /// Per-action payload set by [`Action::extra`](crate::Action::extra).
    pub extra: Opaque,
}

impl PanicInfo {
    /// Position of this event in the chain; `0` is the most recent.
    pub fn depth(&self) -> i32 {
        self.actual.depth
    }
}

type PayloadCell = triomphe::Arc<spin::Mutex<Option<Box<dyn Any + Send>>>>;

/// The value a panic was raised with.
///
/// The message is extracted from `&str` and `String` payloads. The payload
/// itself is only available on the depth-0 record of
/// [`Action::capture`](crate::Action::capture), where it can be taken out once,
/// for example to re-raise it with [`std::panic::resume_unwind`].
#[derive(Clone)]
pub struct PanicError {
    message: Option<String>,
    payload: Option<PayloadCell>,
}

impl PanicError {
    pub(crate) fn new(message: Option<String>, payload: Option<Box<dyn Any + Send>>) -> Self {
        Self {
            message,
            payload: payload.map(|p| triomphe::Arc::new(spin::Mutex::new(Some(p)))),
        }
    }

    /// The panic message, when the payload was a string.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns `true` while the payload is still present.
    pub fn has_payload(&self) -> bool {
        self.payload.as_ref().is_some_and(|cell| cell.lock().is_some())
    }

    /// Returns `true` if the payload is present and of type `T`.
    pub fn payload_is<T: Any>(&self) -> bool {
        self.with_payload(|payload| payload.is::<T>())
            .unwrap_or(false)
    }

    /// Runs `f` with a reference to the payload, if it is still present.
    pub fn with_payload<R>(&self, f: impl FnOnce(&(dyn Any + Send)) -> R) -> Option<R> {
        let cell = self.payload.as_ref()?;
        let guard = cell.lock();
        guard.as_deref().map(f)
    }

    /// Takes the payload out. Every clone of this error shares the same
    /// payload, so only the first call returns it.
    pub fn take_payload(&self) -> Option<Box<dyn Any + Send>> {
        self.payload.as_ref()?.lock().take()
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message().unwrap_or("Box<dyn Any>"))
    }
}

impl fmt::Debug for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicError")
            .field("message", &self.message)
            .field("has_payload", &self.has_payload())
            .finish()
    }
}

impl core::error::Error for PanicError {}

trait OpaqueValue: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> OpaqueValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

/// A shared, type-erased value carried through a capture untouched.
///
/// Used for [`PanicInfo::context`] and [`PanicInfo::extra`]. Cloning is cheap.
///
/// ```
/// use panicpoint::Opaque;
///
/// let value = Opaque::new(42_u32);
/// assert_eq!(value.downcast_ref::<u32>(), Some(&42));
/// assert_eq!(value.downcast_ref::<i64>(), None);
/// assert!(Opaque::empty().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct Opaque(Option<triomphe::Arc<dyn OpaqueValue>>);

impl Opaque {
    /// An empty value.
    pub const fn empty() -> Self {
        Self(None)
    }

    /// Wraps `value`.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(
            triomphe::Arc::new(value).unsize(unsize::Coercion!(to dyn OpaqueValue)),
        ))
    }

    /// Returns `true` if no value is carried.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref()?.as_any().downcast_ref()
    }

    /// Returns `true` if the value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_deref() {
            Some(value) => write!(f, "Opaque({})", value.type_name()),
            None => f.write_str("Opaque(<empty>)"),
        }
    }
}
