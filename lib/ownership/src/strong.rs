//! The owning handle.

use crate::{
    block::{BlockHeader, BlockKind, EmbeddedBlock, PointerBlock},
    destroy::{DefaultDestroy, Destroy},
    error::RefError,
    this::Wire,
    trace::trace_ex,
    weak::Weak,
};
use alloc::boxed::Box;
use core::{
    fmt::{self, Debug},
    marker::{PhantomData, Unsize},
    mem,
    ops::{CoerceUnsized, Deref},
    ptr::{self, NonNull},
};

/// Shared owning handle.
///
/// A handle is a pair: the control block it holds a strong unit of, and the
/// referent it dereferences to. The referent is normally the managed object,
/// but an aliasing handle (see [`Strong::aliasing`] and [`Strong::map`]) can
/// point anywhere the owner keeps alive, such as one of its fields.
///
/// A handle may be empty. Cloning adds a strong unit; dropping or resetting
/// gives it back, and the last one destroys the object.
///
/// `Strong<T>` coerces to `Strong<U>` wherever `&T` coerces to `&U`, so a
/// handle to a concrete type can become a handle to a trait object. The block
/// keeps destroying the object as its concrete type.
pub struct Strong<T: ?Sized> {
    pub(crate) block: Option<NonNull<BlockHeader>>,
    pub(crate) ptr: *const T,
    _marker: PhantomData<T>,
}

impl<T> Strong<T> {
    /// A handle that owns nothing.
    pub const fn empty() -> Strong<T> {
        Strong {
            block: None,
            ptr: ptr::null(),
            _marker: PhantomData,
        }
    }

    /// Builds `value` inside a freshly allocated block.
    ///
    /// One allocation holds both the counters and the object.
    pub fn new(value: T) -> Strong<T> {
        let (block, object) = EmbeddedBlock::allocate(value);
        let strong = unsafe { Strong::from_parts(block, object.as_ptr()) };
        T::wire(&strong);
        strong
    }
}

impl<T: ?Sized> Strong<T> {
    /// Takes ownership of a boxed object.
    pub fn from_box(value: Box<T>) -> Strong<T> {
        unsafe { Strong::from_raw(Box::into_raw(value)) }
    }

    /// Takes ownership of `ptr`, to be freed as a [`Box`].
    ///
    /// A null `ptr` gives an empty handle.
    ///
    /// # Safety
    ///
    /// `ptr` comes from [`Box::into_raw`] and nothing else owns it. Wrapping
    /// the same pointer in two independent handles destroys it twice.
    pub unsafe fn from_raw(ptr: *mut T) -> Strong<T> {
        unsafe { Strong::from_raw_with(ptr, DefaultDestroy) }
    }

    /// Takes ownership of `ptr`, to be disposed of by `destroy` once the last
    /// strong handle is gone.
    ///
    /// A null `ptr` gives an empty handle and `destroy` is dropped unused.
    /// The policy is kept in the block for as long as any handle, strong or
    /// weak, refers to it, so it cannot borrow:
    ///
    /// ```compile_fail
    /// use ownership::{Destroy, Strong};
    /// use std::{cell::Cell, ptr::NonNull};
    ///
    /// struct Counting<'a>(&'a Cell<usize>);
    ///
    /// impl Destroy<u8> for Counting<'_> {
    ///     unsafe fn destroy(&mut self, object: NonNull<u8>) {
    ///         self.0.set(self.0.get() + 1);
    ///         drop(unsafe { Box::from_raw(object.as_ptr()) });
    ///     }
    /// }
    ///
    /// let calls = Cell::new(0);
    /// let raw = Box::into_raw(Box::new(1u8));
    /// let _strong = unsafe { Strong::from_raw_with(raw, Counting(&calls)) };
    /// ```
    ///
    /// # Safety
    ///
    /// `ptr` is valid, nothing else owns it, and `destroy` can dispose of it.
    pub unsafe fn from_raw_with<D>(ptr: *mut T, destroy: D) -> Strong<T>
    where
        D: Destroy<T> + 'static,
    {
        let Some(object) = NonNull::new(ptr) else {
            return Strong::detached(ptr);
        };
        let block = PointerBlock::allocate(object, destroy);
        let strong = unsafe { Strong::from_parts(block, ptr) };
        T::wire(&strong);
        strong
    }

    /// Shares `owner`'s block but dereferences to `ptr`.
    ///
    /// The result keeps `owner`'s object alive and counts as one of its
    /// strong handles. Nothing is wired: the referent is not the managed
    /// object. The result never grants mutable access through
    /// [`Strong::get_mut`] unless `ptr` is the managed object itself.
    ///
    /// # Safety
    ///
    /// `ptr` stays valid for reads for as long as `owner`'s object is alive.
    pub unsafe fn aliasing<U: ?Sized>(owner: &Strong<U>, ptr: *const T) -> Strong<T> {
        if let Some(block) = owner.block {
            unsafe { block.as_ref() }.inc_strong();
        }
        Strong {
            block: owner.block,
            ptr,
            _marker: PhantomData,
        }
    }

    /// Aliasing handle to a part of the referent, such as a field.
    ///
    /// An empty handle maps to an empty handle.
    ///
    /// The referent must not borrow anything, or the projection could outlive
    /// what it borrows:
    ///
    /// ```compile_fail
    /// use ownership::Strong;
    ///
    /// let escaped;
    /// {
    ///     let local = vec![1u64, 2, 3];
    ///     escaped = Strong::new(&local).map(|r| *r);
    /// }
    /// assert_eq!(escaped.len(), 3);
    /// ```
    pub fn map<U>(&self, project: impl FnOnce(&T) -> &U) -> Strong<U>
    where
        T: 'static,
    {
        match self.get() {
            Some(value) => {
                let target: *const U = project(value);
                unsafe { Strong::aliasing(self, target) }
            }
            None => Strong::empty(),
        }
    }

    /// Promotes `weak`, failing if its object is already gone.
    ///
    /// An empty weak handle counts as expired.
    pub fn try_from_weak(weak: &Weak<T>) -> Result<Strong<T>, RefError> {
        match weak.block {
            Some(block) if unsafe { block.as_ref() }.try_inc_strong() => Ok(Strong {
                block: Some(block),
                ptr: weak.ptr,
                _marker: PhantomData,
            }),
            _ => {
                trace_ex!(target: "ownership::block", "promotion of {:p} refused: expired", weak.ptr);
                Err(RefError::Expired)
            }
        }
    }

    /// Wraps a block the caller holds one strong unit of.
    unsafe fn from_parts(block: NonNull<BlockHeader>, ptr: *const T) -> Strong<T> {
        Strong {
            block: Some(block),
            ptr,
            _marker: PhantomData,
        }
    }

    /// An empty handle. `ptr` only lends its metadata.
    pub(crate) fn detached(ptr: *const T) -> Strong<T> {
        Strong {
            block: None,
            ptr: ptr.with_addr(0),
            _marker: PhantomData,
        }
    }

    /// A weak handle to the same block and referent.
    pub fn downgrade(&self) -> Weak<T> {
        Weak::from(self)
    }

    pub fn get(&self) -> Option<&T> {
        unsafe { self.ptr.as_ref() }
    }

    /// Mutable access, granted only while this is the sole handle of any
    /// kind on its block and it refers to the managed object itself.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        let block = self.block?;
        let header = unsafe { block.as_ref() };
        if header.strong_count() != 1 || header.weak_count() != 0 {
            return None;
        }
        // Aliases only have read access to their referent. Rebuild the
        // referent from the block's own pointer, which can write.
        let object = unsafe { BlockHeader::object(block) };
        if !ptr::addr_eq(object, self.ptr) {
            return None;
        }
        let writable = object.with_metadata_of(self.ptr);
        self.ptr = writable;
        unsafe { writable.as_mut() }
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    /// Number of strong handles sharing the block, 0 when empty.
    pub fn use_count(&self) -> usize {
        match self.block {
            Some(block) => unsafe { block.as_ref() }.strong_count(),
            None => 0,
        }
    }

    /// Number of weak handles on the block, 0 when empty.
    pub fn weak_count(&self) -> usize {
        match self.block {
            Some(block) => unsafe { block.as_ref() }.weak_count(),
            None => 0,
        }
    }

    pub fn block_kind(&self) -> Option<BlockKind> {
        self.block.map(|block| unsafe { block.as_ref() }.kind())
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_null()
    }

    /// Whether both handles share one control block, whatever their referents.
    pub fn ptr_eq<U: ?Sized>(this: &Strong<T>, other: &Strong<U>) -> bool {
        this.block == other.block
    }

    /// Moves the ownership out, leaving this handle empty.
    pub fn take(&mut self) -> Strong<T> {
        let empty = Strong::detached(self.ptr);
        mem::replace(self, empty)
    }

    /// Releases the ownership, leaving this handle empty.
    pub fn reset(&mut self) {
        drop(self.take());
    }

    /// Releases the current ownership and takes `value` instead.
    pub fn reset_to(&mut self, value: Box<T>) {
        unsafe { self.reset_raw(Box::into_raw(value)) }
    }

    /// Releases the current ownership and takes `ptr` instead. Passing the
    /// pointer this handle already refers to changes nothing.
    ///
    /// # Safety
    ///
    /// As for [`Strong::from_raw`].
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        if ptr::addr_eq(self.ptr, ptr) {
            return;
        }
        self.reset();
        *self = unsafe { Strong::from_raw(ptr) };
    }

    pub fn swap(&mut self, other: &mut Strong<T>) {
        mem::swap(self, other);
    }
}

impl<T: ?Sized + Unsize<U>, U: ?Sized> CoerceUnsized<Strong<U>> for Strong<T> {}

impl<T: ?Sized> Clone for Strong<T> {
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            unsafe { block.as_ref() }.inc_strong();
        }
        Strong {
            block: self.block,
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Drop for Strong<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe { BlockHeader::dec_strong(block) };
        }
    }
}

impl<T> Default for Strong<T> {
    fn default() -> Self {
        Strong::empty()
    }
}

impl<T: ?Sized> Deref for Strong<T> {
    type Target = T;

    /// # Panics
    ///
    /// If the handle is empty.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced an empty Strong handle"),
        }
    }
}

impl<T: ?Sized> From<Box<T>> for Strong<T> {
    fn from(value: Box<T>) -> Self {
        Strong::from_box(value)
    }
}

impl<T: ?Sized> TryFrom<&Weak<T>> for Strong<T> {
    type Error = RefError;

    fn try_from(weak: &Weak<T>) -> Result<Self, Self::Error> {
        Strong::try_from_weak(weak)
    }
}

/// Handles are equal when they refer to the same address, even through
/// different blocks.
impl<T: ?Sized, U: ?Sized> PartialEq<Strong<U>> for Strong<T> {
    fn eq(&self, other: &Strong<U>) -> bool {
        ptr::addr_eq(self.ptr, other.ptr)
    }
}

impl<T: ?Sized> Eq for Strong<T> {}

impl<T: ?Sized + Debug> Debug for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strong")
            .field("value", &self.get())
            .field("use_count", &self.use_count())
            .finish()
    }
}

impl<T: ?Sized> fmt::Pointer for Strong<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tally::{CountingDestroy, Tally, Tracked};
    use alloc::{string::String, vec, vec::Vec};

    #[test]
    fn test_new_owns_one_unit() {
        let s = Strong::new(42);
        assert_eq!(*s, 42);
        assert_eq!(s.use_count(), 1);
        assert_eq!(s.weak_count(), 0);
        assert_eq!(s.block_kind(), Some(BlockKind::Embedded));
        assert!(!s.is_empty());
    }

    #[test]
    fn test_from_box_uses_pointer_block() {
        let boxed = Box::new(String::from("owned"));
        let address: *const String = &*boxed;
        let s = Strong::from_box(boxed);
        assert_eq!(s.block_kind(), Some(BlockKind::Pointer));
        assert_eq!(s.as_ptr(), address);
        assert_eq!(s.as_str(), "owned");
    }

    #[test]
    fn test_empty_handle() {
        let s: Strong<u8> = Strong::empty();
        assert!(s.is_empty());
        assert_eq!(s.use_count(), 0);
        assert_eq!(s.get(), None);
        assert_eq!(s.block_kind(), None);
        let copy = s.clone();
        assert_eq!(copy.use_count(), 0);
    }

    #[test]
    fn test_null_raw_pointer_gives_empty_handle() {
        let s = unsafe { Strong::<u8>::from_raw(ptr::null_mut()) };
        assert!(s.is_empty());
        assert_eq!(s.use_count(), 0);
    }

    #[test]
    #[should_panic(expected = "empty Strong handle")]
    fn test_deref_empty_panics() {
        let s: Strong<u8> = Strong::default();
        let _value: u8 = *s;
    }

    #[test]
    fn test_use_count_tracks_live_handles() {
        let tally = Tally::new();
        let a = Strong::new(tally.track(1));
        let mut handles: Vec<Strong<_>> = (0..4).map(|_| a.clone()).collect();
        assert_eq!(a.use_count(), 5);

        let moved = handles.pop().unwrap();
        assert_eq!(a.use_count(), 5);
        drop(moved);
        assert_eq!(a.use_count(), 4);

        handles[0].reset();
        assert!(handles[0].is_empty());
        assert_eq!(a.use_count(), 3);

        let taken = handles[1].take();
        assert!(handles[1].is_empty());
        assert_eq!(taken.use_count(), 3);

        drop(handles);
        drop(taken);
        assert_eq!(a.use_count(), 1);
        assert_eq!(tally.dropped(), 0);
        drop(a);
        assert_eq!(tally.dropped(), 1);
    }

    #[test]
    fn test_last_handle_destroys_exactly_once() {
        let tally = Tally::new();
        let a = Strong::from_box(Box::new(tally.track(3)));
        let weak = a.downgrade();
        let weak_copy = weak.clone();
        let b = a.clone();
        drop(a);
        assert_eq!(tally.dropped(), 0);
        drop(b);
        assert_eq!(tally.created(), 1);
        assert_eq!(tally.dropped(), 1);
        drop(weak);
        drop(weak_copy);
        assert_eq!(tally.dropped(), 1);
    }

    #[test]
    fn test_custom_destroy_runs_once() {
        let destroy = CountingDestroy::default();
        let calls = destroy.calls.clone();
        let raw = Box::into_raw(Box::new(9u64));
        let a = unsafe { Strong::from_raw_with(raw, destroy) };
        let weak = a.downgrade();
        let b = a.clone();
        drop(a);
        assert_eq!(calls.get(), 0);
        drop(b);
        assert_eq!(calls.get(), 1);
        assert!(weak.is_expired());
        drop(weak);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_promotion_adds_one_unit() {
        let a = Strong::new(String::from("x"));
        let weak = a.downgrade();
        let b = Strong::try_from_weak(&weak).unwrap();
        assert_eq!(a.use_count(), 2);
        assert_eq!(b.as_ptr(), a.as_ptr());
        assert!(Strong::ptr_eq(&a, &b));
    }

    #[test]
    fn test_promotion_of_expired_fails() {
        let weak = Strong::new(1u8).downgrade();
        assert_eq!(weak.weak_count(), 1);
        assert_eq!(Strong::try_from_weak(&weak).unwrap_err(), RefError::Expired);
        assert_eq!(Strong::try_from(&weak).unwrap_err(), RefError::Expired);
        assert_eq!(weak.use_count(), 0);
        assert_eq!(weak.weak_count(), 1);

        let empty: Weak<u8> = Weak::new();
        assert_eq!(Strong::try_from_weak(&empty).unwrap_err(), RefError::Expired);
    }

    #[derive(Debug)]
    struct Pair {
        left: u32,
        right: String,
    }

    #[test]
    fn test_aliasing_keeps_owner_alive() {
        let tally = Tally::new();
        let a = Strong::new((tally.track(4), 17u32));
        let field: *const u32 = &a.1;
        let b: Strong<u32> = unsafe { Strong::aliasing(&a, field) };
        assert_eq!(b.as_ptr(), field);
        assert_eq!(a.use_count(), 2);
        assert!(Strong::ptr_eq(&a, &b));
        drop(a);
        assert_eq!(tally.dropped(), 0);
        assert_eq!(*b, 17);
        drop(b);
        assert_eq!(tally.dropped(), 1);
    }

    #[test]
    fn test_map_projects_a_field() {
        let pair = Strong::new(Pair {
            left: 5,
            right: String::from("right"),
        });
        let left = pair.map(|p| &p.left);
        let right = pair.map(|p| &p.right);
        assert_eq!(*left, 5);
        assert_eq!(right.as_str(), "right");
        assert_eq!(pair.use_count(), 3);
        drop(pair);
        assert_eq!(left.use_count(), 2);
        assert_eq!(right.as_str(), "right");

        let empty: Strong<Pair> = Strong::empty();
        assert!(empty.map(|p| &p.left).is_empty());
    }

    #[test]
    fn test_equality_follows_referent() {
        let a = Strong::new(Pair {
            left: 1,
            right: String::new(),
        });
        let b = a.clone();
        let left = a.map(|p| &p.left);
        let other = Strong::new(Pair {
            left: 1,
            right: String::new(),
        });
        assert_eq!(a, b);
        assert_ne!(a, other);
        let left_again = b.map(|p| &p.left);
        assert_eq!(left, left_again);
        assert!(Strong::<u8>::empty() == Strong::<u16>::empty());
    }

    #[test]
    fn test_get_mut_requires_sole_handle() {
        let mut a = Strong::new(10);
        *a.get_mut().unwrap() += 1;
        assert_eq!(*a, 11);

        let b = a.clone();
        assert!(a.get_mut().is_none());
        drop(b);

        let weak = a.downgrade();
        assert!(a.get_mut().is_none());
        drop(weak);
        assert!(a.get_mut().is_some());
    }

    #[test]
    fn test_get_mut_refuses_field_aliases() {
        let pair = Strong::new(Pair {
            left: 1,
            right: String::from("r"),
        });
        let mut right = pair.map(|p| &p.right);
        drop(pair);
        assert_eq!(right.use_count(), 1);
        assert_eq!(right.weak_count(), 0);
        assert!(right.get_mut().is_none());
        assert_eq!(right.as_str(), "r");
    }

    #[repr(C)]
    struct Header {
        tag: u32,
        len: u32,
    }

    #[test]
    fn test_get_mut_on_alias_at_object_address() {
        let header = Strong::new(Header { tag: 7, len: 2 });
        let mut tag = header.map(|h| &h.tag);
        let len = header.map(|h| &h.len);
        drop(header);
        assert!(tag.get_mut().is_none());
        assert_eq!(*len, 2);
        drop(len);

        *tag.get_mut().unwrap() = 8;
        assert_eq!(*tag, 8);
    }

    trait Shape {
        fn area(&self) -> u32;
    }

    struct Square {
        side: u32,
        _tracked: Tracked,
    }

    impl Shape for Square {
        fn area(&self) -> u32 {
            self.side * self.side
        }
    }

    #[test]
    fn test_coerces_to_trait_object() {
        let tally = Tally::new();
        let square = Strong::new(Square {
            side: 3,
            _tracked: tally.track(0),
        });
        let shape: Strong<dyn Shape> = square.clone();
        let observer: Weak<dyn Shape> = square.downgrade();
        assert_eq!(shape.area(), 9);
        assert!(shape == square);
        assert_eq!(shape.use_count(), 2);

        drop(square);
        assert_eq!(observer.upgrade().area(), 9);
        drop(shape);
        assert!(observer.is_expired());
        assert!(observer.upgrade().is_empty());
        assert_eq!(tally.created(), 1);
        assert_eq!(tally.dropped(), 1);
    }

    #[test]
    fn test_trait_object_keeps_concrete_destroy() {
        let tally = Tally::new();
        let boxed: Box<dyn Shape> = Box::new(Square {
            side: 2,
            _tracked: tally.track(0),
        });
        let destroy = CountingDestroy::default();
        let calls = destroy.calls.clone();
        let mut shape = unsafe { Strong::from_raw_with(Box::into_raw(boxed), destroy) };
        assert_eq!(shape.block_kind(), Some(BlockKind::Pointer));
        assert!(shape.get_mut().is_some());

        let taken = shape.take();
        assert!(shape.is_empty());
        assert_eq!(shape.use_count(), 0);
        assert_eq!(taken.area(), 4);
        drop(taken);
        assert_eq!(calls.get(), 1);
        assert_eq!(tally.dropped(), 1);
    }

    #[test]
    fn test_unsized_slices() {
        let numbers: Strong<[u32]> = Strong::new([1, 2, 3]);
        let mut boxed: Strong<[u32]> = Strong::from_box(vec![4, 5].into_boxed_slice());
        assert_eq!(numbers.len(), 3);
        boxed.get_mut().unwrap()[0] = 40;
        assert_eq!(&*boxed, &[40, 5]);
        boxed.reset();
        assert!(boxed.is_empty());
    }

    #[test]
    fn test_reset_to_replaces_object() {
        let tally = Tally::new();
        let mut a = Strong::new(tally.track(1));
        let weak = a.downgrade();
        a.reset_to(Box::new(tally.track(2)));
        assert_eq!(tally.dropped(), 1);
        assert!(weak.is_expired());
        assert_eq!(a.value, 2);
        assert_eq!(a.use_count(), 1);
        assert_eq!(a.block_kind(), Some(BlockKind::Pointer));
    }

    #[test]
    fn test_reset_to_same_pointer_is_noop() {
        let raw = Box::into_raw(Box::new(3i32));
        let mut a = unsafe { Strong::from_raw(raw) };
        let b = a.clone();
        unsafe { a.reset_raw(raw) };
        assert_eq!(a.use_count(), 2);
        assert!(Strong::ptr_eq(&a, &b));
    }

    #[test]
    fn test_swap_exchanges_ownership() {
        let mut a = Strong::new(1);
        let mut b = Strong::new(2);
        let a_copy = a.clone();
        a.swap(&mut b);
        assert_eq!((*a, *b), (2, 1));
        assert_eq!(b.use_count(), 2);
        assert_eq!(a.use_count(), 1);
        assert_eq!(a_copy, b);
    }

    #[test]
    fn test_debug_shows_value_and_count() {
        let a = Strong::new(7);
        let _b = a.clone();
        assert_eq!(
            alloc::format!("{:?}", a),
            "Strong { value: Some(7), use_count: 2 }"
        );
    }
}
