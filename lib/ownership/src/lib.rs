//! Reference-counted ownership handles.
//!
//! [`Strong`] and [`Weak`] share a control block that tracks the managed
//! object separately from the block's own lifetime:
//!
//! ```text
//!  Strong ──┐                  ┌──────────────────────────────┐
//!  Strong ──┼──────────────────▶ strong | weak | state | ops   │ control block
//!  Weak ────┘                  │ object (inline or pointer)   │
//!                              └──────────────────────────────┘
//! ```
//!
//! The object dies with the last [`Strong`]; the block dies once no handle of
//! either kind remains. Types that embed a [`SelfRef`] and implement
//! [`SharedFromThis`] can hand out handles to themselves.
//!
//! Handles coerce like references do: a `Strong<Concrete>` becomes a
//! `Strong<dyn Trait>` and still destroys a `Concrete`.
//!
//! Two simpler siblings live alongside: [`Unique`] for sole ownership with a
//! pluggable [`Destroy`] policy, and [`Intrusive`] for objects that carry
//! their own counter.
//!
//! Counters are plain cells. None of these handles are `Send` or `Sync`.

#![no_std]
#![feature(coerce_unsized, set_ptr_value, specialization, unsize)]
#![allow(incomplete_features)]

extern crate alloc;
#[cfg(test)]
extern crate std;

mod trace;

mod block;
pub mod destroy;
pub mod error;
pub mod intrusive;
pub mod strong;
pub mod this;
pub mod unique;
pub mod weak;

#[cfg(test)]
mod tally;

pub use block::BlockKind;
pub use destroy::{DefaultDestroy, Destroy};
pub use error::RefError;
pub use intrusive::{Intrusive, RefCounted, RefCounter};
pub use strong::Strong;
pub use this::{SelfRef, SharedFromThis};
pub use unique::Unique;
pub use weak::Weak;
