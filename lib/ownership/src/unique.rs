//! Sole ownership.
//!
//! [`Unique`] owns at most one object and disposes of it with its
//! [`Destroy`] policy. No counting is involved; ownership only moves. A
//! zero-sized policy takes no room, so `Unique<T>` is pointer-sized.

use crate::destroy::{DefaultDestroy, Destroy};
use alloc::boxed::Box;
use core::{
    fmt::{self, Debug},
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
};

pub struct Unique<T: ?Sized, D: Destroy<T> = DefaultDestroy> {
    ptr: Option<NonNull<T>>,
    destroy: D,
    _marker: PhantomData<T>,
}

impl<T> Unique<T> {
    pub fn new(value: T) -> Unique<T> {
        Unique::from_box(Box::new(value))
    }
}

impl<T: ?Sized> Unique<T> {
    pub fn from_box(value: Box<T>) -> Unique<T> {
        Unique {
            ptr: Some(NonNull::from(Box::leak(value))),
            destroy: DefaultDestroy,
            _marker: PhantomData,
        }
    }

    /// # Safety
    ///
    /// `ptr` is null or comes from [`Box::into_raw`], and nothing else owns it.
    pub unsafe fn from_raw(ptr: *mut T) -> Unique<T> {
        unsafe { Unique::from_raw_with(ptr, DefaultDestroy) }
    }
}

impl<T: ?Sized, D: Destroy<T>> Unique<T, D> {
    /// A handle owning nothing, with `destroy` for whatever it owns later.
    pub fn empty_with(destroy: D) -> Unique<T, D> {
        Unique {
            ptr: None,
            destroy,
            _marker: PhantomData,
        }
    }

    /// # Safety
    ///
    /// `ptr` is null or valid, nothing else owns it, and `destroy` can dispose
    /// of it.
    pub unsafe fn from_raw_with(ptr: *mut T, destroy: D) -> Unique<T, D> {
        Unique {
            ptr: NonNull::new(ptr),
            destroy,
            _marker: PhantomData,
        }
    }

    /// Gives up ownership without destroying the object.
    pub fn release(&mut self) -> Option<NonNull<T>> {
        self.ptr.take()
    }

    /// Destroys the owned object, if any.
    pub fn reset(&mut self) {
        if let Some(old) = self.ptr.take() {
            unsafe { self.destroy.destroy(old) };
        }
    }

    /// Takes ownership of `ptr` and destroys the previous object. Passing the
    /// pointer already owned changes nothing.
    ///
    /// # Safety
    ///
    /// As for [`Unique::from_raw_with`].
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        if let Some(current) = self.ptr {
            if ptr::addr_eq(current.as_ptr(), ptr) {
                return;
            }
        }
        let old = mem::replace(&mut self.ptr, NonNull::new(ptr));
        if let Some(old) = old {
            unsafe { self.destroy.destroy(old) };
        }
    }

    /// Takes ownership of `value` and destroys the previous object.
    pub fn reset_to(&mut self, value: Box<T>) {
        unsafe { self.reset_raw(Box::into_raw(value)) }
    }

    pub fn swap(&mut self, other: &mut Unique<T, D>) {
        mem::swap(self, other);
    }

    pub fn get(&self) -> Option<&T> {
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.ptr.map(|ptr| unsafe { &mut *ptr.as_ptr() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    pub fn destroyer(&self) -> &D {
        &self.destroy
    }

    pub fn destroyer_mut(&mut self) -> &mut D {
        &mut self.destroy
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }
}

impl<T: ?Sized, D: Destroy<T>> Drop for Unique<T, D> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: ?Sized, D: Destroy<T> + Default> Default for Unique<T, D> {
    fn default() -> Self {
        Unique::empty_with(D::default())
    }
}

impl<T: ?Sized, D: Destroy<T>> Deref for Unique<T, D> {
    type Target = T;

    /// # Panics
    ///
    /// If the handle is empty.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Unique handle"),
        }
    }
}

impl<T: ?Sized, D: Destroy<T>> DerefMut for Unique<T, D> {
    fn deref_mut(&mut self) -> &mut T {
        match self.get_mut() {
            Some(value) => value,
            None => panic!("dereferenced an empty Unique handle"),
        }
    }
}

impl<T: ?Sized + Debug, D: Destroy<T>> Debug for Unique<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Unique").field(&self.get()).finish()
    }
}
