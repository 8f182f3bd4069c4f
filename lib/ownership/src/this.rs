//! Self references.
//!
//! An object that embeds a [`SelfRef`] and implements [`SharedFromThis`] can
//! produce handles to itself. The reference is wired by the first strong
//! handle that takes ownership of the object, through [`Strong::new`],
//! [`Strong::from_box`] or [`Strong::from_raw`]. Which types get wired is
//! decided at compile time; other types pay nothing.
//!
//! ```ignore
//! struct Node {
//!     this: SelfRef<Node>,
//! }
//!
//! impl SharedFromThis for Node {
//!     fn self_ref(&self) -> &SelfRef<Node> {
//!         &self.this
//!     }
//! }
//!
//! let node = Strong::new(Node { this: SelfRef::new() });
//! let again = node.strong_self()?;
//! ```

use crate::{error::RefError, strong::Strong, trace::trace_ex, weak::Weak};
use core::{
    cell::Cell,
    fmt::{self, Debug},
};

/// Storage for an object's weak handle to itself.
///
/// Empty until a strong handle takes ownership of the object. The stored
/// weak handle counts towards the block's weak count.
pub struct SelfRef<T> {
    weak: Cell<Weak<T>>,
}

impl<T> SelfRef<T> {
    pub const fn new() -> SelfRef<T> {
        SelfRef {
            weak: Cell::new(Weak::new()),
        }
    }

    fn load(&self) -> Weak<T> {
        let weak = self.weak.take();
        let copy = weak.clone();
        self.weak.set(weak);
        copy
    }

    /// Whether a strong handle has ever taken ownership of the object.
    pub fn is_wired(&self) -> bool {
        self.load().block.is_some()
    }

    /// A new strong handle to the object.
    ///
    /// Fails with [`RefError::EmptySelfReference`] before the object is owned,
    /// and with [`RefError::Expired`] while it is being destroyed.
    pub fn strong(&self) -> Result<Strong<T>, RefError> {
        let weak = self.load();
        if weak.block.is_none() {
            return Err(RefError::EmptySelfReference);
        }
        Strong::try_from_weak(&weak)
    }

    /// A new weak handle to the object, empty before the object is owned.
    pub fn weak(&self) -> Weak<T> {
        self.load()
    }

    /// Stores a weak handle derived from `owner`, unless the object already
    /// has a live one.
    pub(crate) fn wire(&self, owner: &Strong<T>) {
        let current = self.weak.take();
        if !current.is_expired() {
            self.weak.set(current);
            return;
        }
        self.weak.set(owner.downgrade());
        trace_ex!(target: "ownership::this", "self reference of {:p} wired", owner.as_ptr());
        drop(current);
    }
}

impl<T> Default for SelfRef<T> {
    fn default() -> Self {
        SelfRef::new()
    }
}

/// A copied object is a different object: its self reference starts empty.
impl<T> Clone for SelfRef<T> {
    fn clone(&self) -> Self {
        SelfRef::new()
    }
}

impl<T> Debug for SelfRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfRef")
            .field("wired", &self.is_wired())
            .finish()
    }
}

/// Capability of objects that can hand out handles to themselves.
pub trait SharedFromThis: Sized {
    fn self_ref(&self) -> &SelfRef<Self>;

    /// A strong handle to `self`.
    ///
    /// # Errors
    ///
    /// [`RefError::EmptySelfReference`] if no strong handle owns `self` yet,
    /// for instance while it is still being constructed.
    fn strong_self(&self) -> Result<Strong<Self>, RefError> {
        self.self_ref().strong()
    }

    /// A weak handle to `self`, empty if no strong handle owns `self` yet.
    fn weak_self(&self) -> Weak<Self> {
        self.self_ref().weak()
    }
}

/// Construction hook run by every owning [`Strong`] constructor.
pub(crate) trait Wire {
    fn wire(owner: &Strong<Self>);
}

impl<T: ?Sized> Wire for T {
    default fn wire(_: &Strong<T>) {}
}

impl<T: SharedFromThis> Wire for T {
    fn wire(owner: &Strong<T>) {
        if let Some(object) = owner.get() {
            object.self_ref().wire(owner);
        }
    }
}
