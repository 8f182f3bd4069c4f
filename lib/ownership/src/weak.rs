//! The observing handle.

use crate::{block::BlockHeader, strong::Strong};
use core::{
    fmt::{self, Debug},
    marker::{PhantomData, Unsize},
    mem,
    ops::CoerceUnsized,
    ptr::{self, NonNull},
};

/// Non-owning handle to a [`Strong`]'s block.
///
/// A weak handle keeps the control block allocated but not the object. It
/// can tell whether the object is still alive and try to become a strong
/// handle again. Coerces to unsized referents like [`Strong`] does.
pub struct Weak<T: ?Sized> {
    pub(crate) block: Option<NonNull<BlockHeader>>,
    pub(crate) ptr: *const T,
    _marker: PhantomData<*const T>,
}

impl<T> Weak<T> {
    /// A weak handle that observes nothing. It is always expired.
    pub const fn new() -> Weak<T> {
        Weak {
            block: None,
            ptr: ptr::null(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Weak<T> {
    /// Whether the object is gone, or was never there.
    ///
    /// Once true for a handle, stays true.
    pub fn is_expired(&self) -> bool {
        match self.block {
            Some(block) => unsafe { block.as_ref() }.strong_count() == 0,
            None => true,
        }
    }

    /// A strong handle to the object, or an empty one if it expired.
    ///
    /// Counters are left untouched when the promotion fails.
    pub fn upgrade(&self) -> Strong<T> {
        Strong::try_from_weak(self).unwrap_or_else(|_| Strong::detached(self.ptr))
    }

    /// Number of strong handles on the block, 0 when empty.
    pub fn use_count(&self) -> usize {
        match self.block {
            Some(block) => unsafe { block.as_ref() }.strong_count(),
            None => 0,
        }
    }

    /// Number of weak handles on the block, this one included.
    pub fn weak_count(&self) -> usize {
        match self.block {
            Some(block) => unsafe { block.as_ref() }.weak_count(),
            None => 0,
        }
    }

    /// Address of the referent. Dangling once expired.
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    pub fn ptr_eq(this: &Weak<T>, other: &Weak<T>) -> bool {
        this.block == other.block
    }

    /// Gives up the observed block, leaving this handle empty.
    pub fn reset(&mut self) {
        let empty = Weak {
            block: None,
            ptr: self.ptr.with_addr(0),
            _marker: PhantomData,
        };
        drop(mem::replace(self, empty));
    }

    pub fn swap(&mut self, other: &mut Weak<T>) {
        mem::swap(self, other);
    }
}

impl<T: ?Sized + Unsize<U>, U: ?Sized> CoerceUnsized<Weak<U>> for Weak<T> {}

impl<T: ?Sized> From<&Strong<T>> for Weak<T> {
    fn from(strong: &Strong<T>) -> Self {
        if let Some(block) = strong.block {
            unsafe { block.as_ref() }.inc_weak();
        }
        Weak {
            block: strong.block,
            ptr: strong.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            unsafe { block.as_ref() }.inc_weak();
        }
        Weak {
            block: self.block,
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe { BlockHeader::dec_weak(block) };
        }
    }
}

impl<T> Default for Weak<T> {
    fn default() -> Self {
        Weak::new()
    }
}

impl<T: ?Sized> Debug for Weak<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weak")
            .field("ptr", &self.ptr)
            .field("expired", &self.is_expired())
            .finish()
    }
}
