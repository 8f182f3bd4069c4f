//! Intrusive reference counting.
//!
//! The object carries its own [`RefCounter`] and exposes it through
//! [`RefCounted`]. There is no control block and no weak side: the object is
//! destroyed as soon as its count drops to zero. Because the count lives in
//! the object, a raw pointer can be wrapped again at any time.

use alloc::boxed::Box;
use core::{
    cell::Cell,
    fmt::{self, Debug},
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::{self, NonNull},
};

/// Single counter embedded in a [`RefCounted`] object.
///
/// Only [`Intrusive`] handles move the count; other code can read it:
///
/// ```compile_fail
/// use ownership::RefCounter;
///
/// let counter = RefCounter::new();
/// counter.decrement();
/// ```
pub struct RefCounter {
    count: Cell<usize>,
}

impl RefCounter {
    pub const fn new() -> RefCounter {
        RefCounter {
            count: Cell::new(0),
        }
    }

    /// Returns the new count.
    pub(crate) fn increment(&self) -> usize {
        let count = self.count.get() + 1;
        self.count.set(count);
        count
    }

    /// Returns the new count.
    pub(crate) fn decrement(&self) -> usize {
        let count = self.count.get();
        debug_assert!(count > 0, "reference count underflow");
        self.count.set(count - 1);
        count - 1
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }
}

impl Default for RefCounter {
    fn default() -> Self {
        RefCounter::new()
    }
}

/// A copied object has no handles yet.
impl Clone for RefCounter {
    fn clone(&self) -> Self {
        RefCounter::new()
    }
}

impl Debug for RefCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefCounter").field(&self.count()).finish()
    }
}

/// An object that counts the [`Intrusive`] handles pointing at it.
///
/// # Safety
///
/// [`RefCounted::counter`] always returns the same counter, stored inside
/// `self` and used for nothing else. Handles trust that count to decide when
/// the object is destroyed.
pub unsafe trait RefCounted {
    fn counter(&self) -> &RefCounter;

    /// Disposes of an object whose count reached zero. Frees a [`Box`]
    /// allocation by default.
    ///
    /// # Safety
    ///
    /// `this` is not referenced by any handle anymore and was allocated the
    /// way this method expects.
    unsafe fn destroy(this: NonNull<Self>)
    where
        Self: Sized,
    {
        drop(unsafe { Box::from_raw(this.as_ptr()) });
    }
}

/// Handle to an object that counts its own references.
pub struct Intrusive<T: RefCounted> {
    ptr: Option<NonNull<T>>,
    _marker: PhantomData<T>,
}

impl<T: RefCounted> Intrusive<T> {
    pub const fn empty() -> Intrusive<T> {
        Intrusive {
            ptr: None,
            _marker: PhantomData,
        }
    }

    pub fn new(value: T) -> Intrusive<T> {
        Intrusive::from_box(Box::new(value))
    }

    pub fn from_box(value: Box<T>) -> Intrusive<T> {
        unsafe { Intrusive::from_raw(Box::into_raw(value)) }
    }

    /// Adds a reference to the object at `ptr`. A null `ptr` gives an empty
    /// handle.
    ///
    /// # Safety
    ///
    /// `ptr` is null or points to a live object that [`RefCounted::destroy`]
    /// can dispose of.
    pub unsafe fn from_raw(ptr: *mut T) -> Intrusive<T> {
        let ptr = NonNull::new(ptr);
        if let Some(object) = ptr {
            unsafe { object.as_ref() }.counter().increment();
        }
        Intrusive {
            ptr,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    pub fn as_ptr(&self) -> *const T {
        match self.ptr {
            Some(ptr) => ptr.as_ptr(),
            None => ptr::null(),
        }
    }

    /// Count stored in the object, 0 when empty.
    pub fn use_count(&self) -> usize {
        self.get().map_or(0, |value| value.counter().count())
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    /// Drops this reference, leaving the handle empty.
    pub fn reset(&mut self) {
        if let Some(object) = self.ptr.take() {
            if unsafe { object.as_ref() }.counter().decrement() == 0 {
                unsafe { T::destroy(object) };
            }
        }
    }

    /// Refers to `ptr` instead. Passing the current pointer changes nothing.
    ///
    /// # Safety
    ///
    /// As for [`Intrusive::from_raw`].
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        if ptr::eq(self.as_ptr(), ptr) {
            return;
        }
        self.reset();
        *self = unsafe { Intrusive::from_raw(ptr) };
    }

    pub fn reset_to(&mut self, value: Box<T>) {
        unsafe { self.reset_raw(Box::into_raw(value)) }
    }

    pub fn swap(&mut self, other: &mut Intrusive<T>) {
        mem::swap(self, other);
    }
}

impl<T: RefCounted> Clone for Intrusive<T> {
    fn clone(&self) -> Self {
        if let Some(value) = self.get() {
            value.counter().increment();
        }
        Intrusive {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: RefCounted> Drop for Intrusive<T> {
    fn drop(&mut self) {
        self.reset();
    }
}

impl<T: RefCounted> Default for Intrusive<T> {
    fn default() -> Self {
        Intrusive::empty()
    }
}

impl<T: RefCounted> Deref for Intrusive<T> {
    type Target = T;

    /// # Panics
    ///
    /// If the handle is empty.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Intrusive handle"),
        }
    }
}

impl<T: RefCounted, U: RefCounted> PartialEq<Intrusive<U>> for Intrusive<T> {
    fn eq(&self, other: &Intrusive<U>) -> bool {
        ptr::addr_eq(self.as_ptr(), other.as_ptr())
    }
}

impl<T: RefCounted> Eq for Intrusive<T> {}

impl<T: RefCounted + Debug> Debug for Intrusive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Intrusive")
            .field("value", &self.get())
            .field("use_count", &self.use_count())
            .finish()
    }
}
