//! Control blocks shared by [`Strong`](crate::Strong) and [`Weak`](crate::Weak).
//!
//! A block carries two counters. `strong` counts owning handles and keeps the
//! managed object alive; `weak` counts observing handles. Each counter
//! reaching zero is a separate event:
//!
//! ```text
//! strong 1 -> 0 : destroy the object    (block stays while weak > 0)
//! weak   1 -> 0 : free the block        (only once strong == 0)
//! ```
//!
//! There are two layouts. A [`PointerBlock`] owns an object allocated
//! elsewhere and handed in as a raw pointer. An [`EmbeddedBlock`] stores the
//! object inline, so a single allocation serves both the bookkeeping and the
//! object; the storage stays reserved until the last weak handle is gone.
//!
//! Both layouts start with a [`BlockHeader`]. Handles only ever see a
//! `NonNull<BlockHeader>` and reach the layout-specific code through the
//! header's operation table.

use crate::{destroy::Destroy, trace::trace_ex};
use alloc::boxed::Box;
use bitflags::bitflags;
use core::{
    cell::{Cell, UnsafeCell},
    mem::MaybeUninit,
    ptr::{self, NonNull},
};

/// Which layout a block uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// The object has its own allocation; the block holds the pointer.
    Pointer,
    /// The object lives inside the block.
    Embedded,
}

bitflags! {
    pub(crate) struct BlockState: u8 {
        /// The object's destructor is running.
        const DESTROYING = 0b01;
        /// The object has been destroyed.
        const DEAD = 0b10;
    }
}

/// Layout-specific operations, monomorphized for the managed type.
#[derive(Clone, Copy)]
pub(crate) struct BlockOps {
    /// Run the object's destructor. The block itself stays allocated.
    destroy_object: unsafe fn(NonNull<BlockHeader>),
    /// Release the block allocation. The object is already gone.
    free_block: unsafe fn(NonNull<BlockHeader>),
    /// Address of the managed object, writable, or null once destroyed.
    object: unsafe fn(NonNull<BlockHeader>) -> *mut (),
}

/// Common prefix of every block layout.
#[repr(C)]
pub(crate) struct BlockHeader {
    strong: Cell<usize>,
    weak: Cell<usize>,
    state: Cell<BlockState>,
    kind: BlockKind,
    ops: BlockOps,
}

impl BlockHeader {
    /// A header owned by exactly one strong handle.
    fn new(kind: BlockKind, ops: BlockOps) -> BlockHeader {
        BlockHeader {
            strong: Cell::new(1),
            weak: Cell::new(0),
            state: Cell::new(BlockState::empty()),
            kind,
            ops,
        }
    }

    pub(crate) fn strong_count(&self) -> usize {
        self.strong.get()
    }

    pub(crate) fn weak_count(&self) -> usize {
        self.weak.get()
    }

    pub(crate) fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Adds a strong unit. The caller already holds one, so the object is alive.
    pub(crate) fn inc_strong(&self) {
        debug_assert!(self.strong.get() > 0, "strong count raised on a dead object");
        self.strong.set(self.strong.get() + 1);
    }

    /// Adds a strong unit unless the object is already dead.
    pub(crate) fn try_inc_strong(&self) -> bool {
        let strong = self.strong.get();
        if strong == 0 {
            return false;
        }
        self.strong.set(strong + 1);
        true
    }

    pub(crate) fn inc_weak(&self) {
        self.weak.set(self.weak.get() + 1);
    }
}

/// Unsafe Methods
impl BlockHeader {
    /// Gives up one strong unit.
    ///
    /// On the last unit the object is destroyed, and if no weak handle is left
    /// the block is freed as well. Weak units released by the object's own
    /// destructor (a self reference, for one) never free the block, since the
    /// weak count is only read after the destructor has returned.
    ///
    /// # Safety
    ///
    /// `block` is live and the caller owns one strong unit of it, which it
    /// must not use afterwards.
    pub(crate) unsafe fn dec_strong(block: NonNull<BlockHeader>) {
        let header = unsafe { block.as_ref() };
        let strong = header.strong.get();
        debug_assert!(strong > 0, "strong count underflow");
        header.strong.set(strong - 1);
        if strong > 1 {
            return;
        }

        header.state.set(header.state.get() | BlockState::DESTROYING);
        trace_ex!(target: "ownership::block", "{:?} block {:p}: destroying object", header.kind, block);
        unsafe { (header.ops.destroy_object)(block) };
        header.state.set(BlockState::DEAD);

        if header.weak.get() == 0 {
            unsafe { Self::free(block) };
        }
    }

    /// Gives up one weak unit, freeing the block if it was the last unit of
    /// either kind.
    ///
    /// # Safety
    ///
    /// `block` is live and the caller owns one weak unit of it, which it must
    /// not use afterwards.
    pub(crate) unsafe fn dec_weak(block: NonNull<BlockHeader>) {
        let header = unsafe { block.as_ref() };
        let weak = header.weak.get();
        debug_assert!(weak > 0, "weak count underflow");
        header.weak.set(weak - 1);
        if weak == 1
            && header.strong.get() == 0
            && !header.state.get().contains(BlockState::DESTROYING)
        {
            unsafe { Self::free(block) };
        }
    }

    /// Managed object of `block`, with write access to it. Null once the
    /// object is destroyed.
    ///
    /// # Safety
    ///
    /// `block` is live.
    pub(crate) unsafe fn object(block: NonNull<BlockHeader>) -> *mut () {
        let object = unsafe { block.as_ref() }.ops.object;
        unsafe { object(block) }
    }

    unsafe fn free(block: NonNull<BlockHeader>) {
        let header = unsafe { block.as_ref() };
        debug_assert!(header.state.get().contains(BlockState::DEAD));
        trace_ex!(target: "ownership::block", "{:?} block {:p}: freed", header.kind, block);
        let free_block = header.ops.free_block;
        unsafe { free_block(block) };
    }
}

// region: PointerBlock

/// Block owning an externally allocated object through a destroy policy.
#[repr(C)]
pub(crate) struct PointerBlock<U: ?Sized, D: Destroy<U>> {
    header: BlockHeader,
    object: Cell<Option<NonNull<U>>>,
    destroy: UnsafeCell<D>,
}

impl<U: ?Sized, D: Destroy<U>> PointerBlock<U, D> {
    const OPS: BlockOps = BlockOps {
        destroy_object: Self::destroy_object,
        free_block: Self::free_block,
        object: Self::object,
    };

    /// Allocates a block that owns `object`, with a strong count of one.
    pub(crate) fn allocate(object: NonNull<U>, destroy: D) -> NonNull<BlockHeader> {
        let block = Box::new(PointerBlock {
            header: BlockHeader::new(BlockKind::Pointer, Self::OPS),
            object: Cell::new(Some(object)),
            destroy: UnsafeCell::new(destroy),
        });
        let block = NonNull::from(Box::leak(block)).cast::<BlockHeader>();
        trace_ex!(target: "ownership::block", "Pointer block {:p}: allocated for {:p}", block, object);
        block
    }

    unsafe fn destroy_object(block: NonNull<BlockHeader>) {
        let block = unsafe { block.cast::<Self>().as_ref() };
        if let Some(object) = block.object.take() {
            unsafe { (*block.destroy.get()).destroy(object) };
        }
    }

    unsafe fn free_block(block: NonNull<BlockHeader>) {
        drop(unsafe { Box::from_raw(block.cast::<Self>().as_ptr()) });
    }

    unsafe fn object(block: NonNull<BlockHeader>) -> *mut () {
        let block = unsafe { block.cast::<Self>().as_ref() };
        block
            .object
            .get()
            .map_or(ptr::null_mut(), |object| object.as_ptr().cast())
    }
}

// endregion

// region: EmbeddedBlock

/// Block with inline storage for the object.
#[repr(C)]
pub(crate) struct EmbeddedBlock<U> {
    header: BlockHeader,
    storage: UnsafeCell<MaybeUninit<U>>,
}

impl<U> EmbeddedBlock<U> {
    const OPS: BlockOps = BlockOps {
        destroy_object: Self::destroy_object,
        free_block: Self::free_block,
        object: Self::object,
    };

    /// Allocates a block and builds `value` in its storage, with a strong
    /// count of one. Returns the block and the object's address.
    pub(crate) fn allocate(value: U) -> (NonNull<BlockHeader>, NonNull<U>) {
        let mut block = Box::<EmbeddedBlock<U>>::new_uninit();
        let raw = block.as_mut_ptr();
        unsafe {
            (&raw mut (*raw).header).write(BlockHeader::new(BlockKind::Embedded, Self::OPS));
            (&raw mut (*raw).storage).write(UnsafeCell::new(MaybeUninit::new(value)));
        }
        let block = NonNull::from(Box::leak(unsafe { block.assume_init() }));
        let object = unsafe { NonNull::new_unchecked(block.as_ref().storage.get().cast::<U>()) };
        trace_ex!(target: "ownership::block", "Embedded block {:p}: allocated", block);
        (block.cast(), object)
    }

    unsafe fn destroy_object(block: NonNull<BlockHeader>) {
        let block = unsafe { block.cast::<Self>().as_ref() };
        unsafe { (*block.storage.get()).assume_init_drop() };
    }

    unsafe fn free_block(block: NonNull<BlockHeader>) {
        // `MaybeUninit` storage is released without running the destructor again.
        drop(unsafe { Box::from_raw(block.cast::<Self>().as_ptr()) });
    }

    unsafe fn object(block: NonNull<BlockHeader>) -> *mut () {
        let header = unsafe { block.as_ref() };
        if !header.state.get().is_empty() {
            return ptr::null_mut();
        }
        let block = unsafe { block.cast::<Self>().as_ref() };
        block.storage.get().cast()
    }
}

// endregion
