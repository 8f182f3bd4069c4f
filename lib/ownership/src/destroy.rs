//! Destroy policies.
//!
//! A policy decides how an owned object is disposed of once its owner lets
//! go. [`Strong`](crate::Strong) uses one for pointer-owning blocks and
//! [`Unique`](crate::Unique) stores one next to its pointer. Stateless
//! policies such as [`DefaultDestroy`] are zero-sized and cost no storage.

use alloc::boxed::Box;
use core::ptr::NonNull;

pub trait Destroy<T: ?Sized> {
    /// Dispose of `object`.
    ///
    /// # Safety
    ///
    /// The caller owns `object` exclusively and never touches it again.
    unsafe fn destroy(&mut self, object: NonNull<T>);
}

/// Frees objects that were allocated with [`Box`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DefaultDestroy;

impl<T: ?Sized> Destroy<T> for DefaultDestroy {
    unsafe fn destroy(&mut self, object: NonNull<T>) {
        drop(unsafe { Box::from_raw(object.as_ptr()) });
    }
}
