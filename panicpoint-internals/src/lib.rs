#![no_std]
#![forbid(
    missing_docs,
    unsafe_code,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    unused_doc_comments
)]
//! Internal implementation crate for [`panicpoint`].
//!
//! # Overview
//!
//! This crate contains the pure, allocation-only half of the panic attribution
//! engine: turning the textual stack dump captured at an interception point
//! into one [`Attribution`] per panic event. Nothing in here touches the
//! runtime, installs hooks or allocates threads; every function is total and
//! never panics, because it runs from inside panic-recovery code.
//!
//! **This crate is an implementation detail.** No semantic versioning guarantees
//! are provided. Users should depend on the [`panicpoint`] crate, not this one.
//!
//! # Architecture
//!
//! - **[`location`]**: the frame parser. A (function line, file line) pair
//!   becomes a [`Location`].
//! - **[`ignore`]**: the ignore policy. An ordered list of predicates deciding
//!   whether a frame is implementation noise.
//! - **[`walker`]**: the stack walker. Finds every trigger marker in a dump
//!   and resolves its direct and business-actual locations.
//!
//! # Dump format
//!
//! ```text
//! panic("index out of bounds")
//!         at src/orders.rs:88:17
//! core::slice::index::slice_index_fail
//!         at /rustc/90b35a6239c3d8bdabc530a6a0816f7ff89a0aaf/library/core/src/slice/index.rs:42:5
//! orders::Book::best_bid
//!         at /srv/orders/src/orders.rs:88:17
//! ```
//!
//! Each panic event starts with a line beginning with [`PANIC_MARKER`],
//! followed by the file line of the panic location. Every frame below it is a
//! two line pair. Several events are concatenated most recent first.
//!
//! [`panicpoint`]: https://docs.rs/panicpoint/latest/panicpoint/
//! [`Location`]: location::Location
//! [`Attribution`]: walker::Attribution
//! [`PANIC_MARKER`]: walker::PANIC_MARKER

extern crate alloc;

pub mod ignore;
pub mod location;
pub mod walker;

pub use self::{
    ignore::{IgnoreContainPath, IgnoreLocation, IgnorePolicy},
    location::Location,
    walker::{Attribution, PANIC_MARKER, find_panics},
};
