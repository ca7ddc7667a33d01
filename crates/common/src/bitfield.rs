//! Bitfield algebra shared by permission, flag and effect types.

use std::ops::{BitAnd, BitOr, Not};

/// A set of single-bit flags packed into an integer.
pub trait BitField: Copy + PartialEq + BitAnd<Output = Self> + BitOr<Output = Self> + Not<Output = Self> {
    /// Whether every bit of `flag` is set.
    #[must_use]
    fn has(self, flag: Self) -> bool {
        (self & flag) == flag
    }

    /// Returns a copy with the bits of `flag` set.
    #[must_use]
    fn set(self, flag: Self) -> Self {
        self | flag
    }

    /// Returns a copy with the bits of `flag` cleared.
    #[must_use]
    fn unset(self, flag: Self) -> Self {
        self & !flag
    }

    /// Apply a role-style grant: clear `denied` then add `allowed`.
    #[must_use]
    fn apply(self, allowed: Self, denied: Self) -> Self {
        (self & !denied) | allowed
    }
}

impl BitField for i64 {}
impl BitField for i32 {}
impl BitField for u32 {}
