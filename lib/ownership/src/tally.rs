//! Instrumented payloads for lifecycle tests.

use crate::destroy::Destroy;
use alloc::{boxed::Box, rc::Rc};
use core::{cell::Cell, ptr::NonNull};

/// Shared construction/destruction counters.
#[derive(Debug, Default, Clone)]
pub(crate) struct Tally {
    created: Rc<Cell<usize>>,
    dropped: Rc<Cell<usize>>,
}

impl Tally {
    pub(crate) fn new() -> Tally {
        Tally::default()
    }
    pub(crate) fn track(&self, value: i32) -> Tracked {
        self.created.set(self.created.get() + 1);
        Tracked {
            value,
            tally: self.clone(),
        }
    }
    pub(crate) fn created(&self) -> usize {
        self.created.get()
    }
    pub(crate) fn dropped(&self) -> usize {
        self.dropped.get()
    }
}

#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) value: i32,
    tally: Tally,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.tally.dropped.set(self.tally.dropped.get() + 1);
    }
}

/// Destroy policy that records each invocation and refuses a second one.
#[derive(Debug, Default, Clone)]
pub(crate) struct CountingDestroy {
    pub(crate) calls: Rc<Cell<usize>>,
}

impl<T: ?Sized> Destroy<T> for CountingDestroy {
    unsafe fn destroy(&mut self, object: NonNull<T>) {
        assert_eq!(self.calls.get(), 0, "object destroyed twice");
        self.calls.set(self.calls.get() + 1);
        drop(unsafe { Box::from_raw(object.as_ptr()) });
    }
}
