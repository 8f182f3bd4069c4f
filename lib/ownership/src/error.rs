//! Errors reported by handle operations.
//!
//! Only two failures are reported. Every other misuse (wrapping one raw
//! pointer twice, keeping an aliasing pointer past its owner) is a broken
//! safety contract on an `unsafe fn`, not an error value.

use core::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefError {
    /// A weak handle was promoted after its object had been destroyed.
    ///
    /// Recoverable: the object is gone and has to be acquired again.
    Expired,
    /// An object asked for a handle to itself before any strong handle had
    /// taken ownership of it.
    ///
    /// This is an ordering bug in the caller, typically a call made while the
    /// object is still being constructed.
    EmptySelfReference,
}

impl Display for RefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefError::Expired => f.write_str("expired reference: the object has been destroyed"),
            RefError::EmptySelfReference => {
                f.write_str("empty self reference: the object is not owned by any strong handle")
            }
        }
    }
}

impl core::error::Error for RefError {}
