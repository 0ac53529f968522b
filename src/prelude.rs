//! Commonly used items for convenient importing.
//!
//! ```rust
//! use panicpoint::prelude::*;
//!
//! let action = Action::new().alias("prelude");
//! assert_eq!(action.capture(|| 1 + 1), Some(2));
//! ```
//!
//! # What's Included
//!
//! - **[`Action`]** and **[`CaptureGuard`]**: capturing panics
//! - **[`Settings`]** and **[`NamedSettings`]**: configuring captures
//! - **[`PanicInfo`]**, **[`PanicError`]** and **[`Opaque`]**: what callbacks
//!   receive
//! - **[`PanicCallback`]** and **[`Callback`]**: the callback traits
//! - **[`IgnorePolicy`]** and its predicates
//! - **[`Any`]**: Re-exported from `core::any` for downcasting payloads

pub use core::any::Any;

pub use crate::{
    Action, Callback, CaptureGuard, IgnoreContainPath, IgnoreCrates, IgnoreLocation,
    IgnorePolicy, NamedSettings, Opaque, PanicCallback, PanicError, PanicInfo, Settings,
};
