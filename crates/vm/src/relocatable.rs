//! Defines [`Relocatable`] and [`MaybeRelocatable`], the two address/value
//! types spec.md's data model is built around (see spec §3, GLOSSARY).
//!
//! A [`Relocatable`] is kept as a segment/offset *pair* rather than folded
//! into a flat integer until relocation time. This is deliberate (spec §9,
//! "Two registers of addresses"): write-once memory and relocation rules both
//! rely on segment identity, which a flat address would throw away too early.

use std::fmt;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::errors::math_errors::MathError;
use crate::felt::Felt;

/// A two-dimensional address `(segment_index, offset)`.
///
/// A positive (or zero) `segment_index` refers to a real segment; a negative
/// one refers to a temporary segment awaiting a relocation rule (spec §3,
/// §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Relocatable {
    /// The segment this address belongs to.
    pub segment_index: isize,
    /// The offset within the segment.
    pub offset: u64,
}

impl Relocatable {
    /// Builds a new relocatable address.
    pub const fn new(segment_index: isize, offset: u64) -> Self {
        Self {
            segment_index,
            offset,
        }
    }

    /// Returns `true` if this address belongs to a temporary segment.
    pub const fn is_temporary(&self) -> bool {
        self.segment_index < 0
    }

    /// Adds a signed offset to this address (used for instruction offsets,
    /// which are signed 16-bit values biased around zero).
    pub fn add_signed(&self, delta: i64) -> Result<Self, MathError> {
        let new_offset = if delta >= 0 {
            self.offset.checked_add(delta as u64)
        } else {
            self.offset.checked_sub((-delta) as u64)
        }
        .ok_or(MathError::Overflow)?;
        Ok(Self {
            segment_index: self.segment_index,
            offset: new_offset,
        })
    }

    /// Adds a non-negative integer offset to this address.
    pub fn add_usize(&self, delta: usize) -> Result<Self, MathError> {
        let new_offset = self
            .offset
            .checked_add(delta as u64)
            .ok_or(MathError::Overflow)?;
        Ok(Self {
            segment_index: self.segment_index,
            offset: new_offset,
        })
    }

    /// Adds a field element to this address: the offset is incremented modulo
    /// `P`, then the result is asserted to fit in a `u64` (spec §3,
    /// `MaybeRelocatable` arithmetic rules).
    pub fn add_felt(&self, delta: &Felt) -> Result<Self, MathError> {
        let delta_int = BigInt::from_bytes_be(num_bigint::Sign::Plus, &delta.to_bytes_be());
        let new_offset_big = BigInt::from(self.offset) + delta_int;
        let new_offset = new_offset_big
            .to_u64()
            .ok_or_else(|| MathError::ValueTooLarge(new_offset_big.to_string()))?;
        Ok(Self {
            segment_index: self.segment_index,
            offset: new_offset,
        })
    }

    /// Returns the signed distance `self - other`, provided both addresses
    /// share the same segment.
    pub fn sub(&self, other: &Self) -> Result<i64, MathError> {
        if self.segment_index != other.segment_index {
            return Err(MathError::RelocatableSubDifferentSegments(*self, *other));
        }
        Ok(self.offset as i64 - other.offset as i64)
    }

    /// Subtracts a plain integer offset from this address.
    pub fn sub_usize(&self, delta: usize) -> Result<Self, MathError> {
        let new_offset = self
            .offset
            .checked_sub(delta as u64)
            .ok_or(MathError::Overflow)?;
        Ok(Self {
            segment_index: self.segment_index,
            offset: new_offset,
        })
    }

    /// Relocates this address using a relocation rule table, if one applies
    /// to its segment (spec §4.1, relocation rules).
    pub fn relocate_with_rules(&self, rules: &std::collections::HashMap<isize, Relocatable>) -> Self {
        match rules.get(&self.segment_index) {
            Some(dst) => Relocatable {
                segment_index: dst.segment_index,
                offset: dst.offset.wrapping_add(self.offset),
            },
            None => *self,
        }
    }

    /// Maps this address to a flat address using a segment base table
    /// (spec §4.9). Returns `None` if the segment has no entry in `bases`.
    pub fn to_flat(&self, bases: &[u64]) -> Option<Felt> {
        if self.segment_index < 0 {
            return None;
        }
        let base = *bases.get(self.segment_index as usize)?;
        Some(Felt::from(base + self.offset))
    }
}

impl fmt::Display for Relocatable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_index, self.offset)
    }
}

/// Either a field element or a relocatable address (spec §3).
///
/// Forbidden arithmetic is deliberately *not* representable as methods that
/// silently succeed: adding two relocatables and multiplying any relocatable
/// both return [`MathError`] rather than a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaybeRelocatable {
    /// A field element with no provenance.
    Int(Felt),
    /// A relocatable address.
    RelocatableValue(Relocatable),
}

impl MaybeRelocatable {
    /// Returns the inner field element, if this is an [`MaybeRelocatable::Int`].
    pub fn get_int(&self) -> Option<Felt> {
        match self {
            Self::Int(felt) => Some(*felt),
            Self::RelocatableValue(_) => None,
        }
    }

    /// Returns the inner relocatable, if this is a [`MaybeRelocatable::RelocatableValue`].
    pub fn get_relocatable(&self) -> Option<Relocatable> {
        match self {
            Self::Int(_) => None,
            Self::RelocatableValue(r) => Some(*r),
        }
    }

    /// Returns `true` if this value is the felt zero, or a relocatable with
    /// both a zero segment and offset (spec §8, `Jnz` boundary behavior).
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Int(felt) => *felt == Felt::ZERO,
            Self::RelocatableValue(r) => r.segment_index == 0 && r.offset == 0,
        }
    }

    /// Adds `self + other`, forbidding relocatable + relocatable.
    pub fn add(&self, other: &Self) -> Result<Self, MathError> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(Self::Int(a + b)),
            (Self::RelocatableValue(r), Self::Int(f)) | (Self::Int(f), Self::RelocatableValue(r)) => {
                Ok(Self::RelocatableValue(r.add_felt(f)?))
            }
            (Self::RelocatableValue(a), Self::RelocatableValue(b)) => {
                Err(MathError::RelocatableAdd(*a, *b))
            }
        }
    }

    /// Subtracts `self - other`.
    pub fn sub(&self, other: &Self) -> Result<Self, MathError> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(Self::Int(a - b)),
            (Self::RelocatableValue(a), Self::RelocatableValue(b)) => {
                Ok(Self::Int(Felt::from(a.sub(b)?)))
            }
            (Self::RelocatableValue(r), Self::Int(f)) => Ok(Self::RelocatableValue(
                r.add_felt(&(Felt::ZERO - f))?,
            )),
            (Self::Int(_), Self::RelocatableValue(b)) => Err(MathError::SubRelocatableFromInt(*b)),
        }
    }

    /// Multiplies `self * other`, forbidding any relocatable operand.
    pub fn mul(&self, other: &Self) -> Result<Self, MathError> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(Self::Int(a * b)),
            (Self::RelocatableValue(r), _) | (_, Self::RelocatableValue(r)) => {
                Err(MathError::RelocatableMul(*r))
            }
        }
    }

    /// Divides `self / other` (field inverse), forbidding any relocatable operand.
    pub fn field_div(&self, other: &Self) -> Result<Self, MathError> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => {
                let nz: starknet_types_core::felt::NonZeroFelt =
                    (*b).try_into().map_err(|_| MathError::DivByZero)?;
                Ok(Self::Int(a.field_div(&nz)))
            }
            (Self::RelocatableValue(r), _) | (_, Self::RelocatableValue(r)) => {
                Err(MathError::RelocatableMul(*r))
            }
        }
    }

    /// Relocates this value using a relocation rule table (spec §4.1,
    /// `MaybeRelocatable::relocate`).
    pub fn relocate_with_rules(&self, rules: &std::collections::HashMap<isize, Relocatable>) -> Self {
        match self {
            Self::Int(_) => *self,
            Self::RelocatableValue(r) => Self::RelocatableValue(r.relocate_with_rules(rules)),
        }
    }

    /// Maps this value to a flat felt address using a segment base table
    /// (spec §4.9).
    pub fn to_flat(&self, bases: &[u64]) -> Option<Felt> {
        match self {
            Self::Int(f) => Some(*f),
            Self::RelocatableValue(r) => r.to_flat(bases),
        }
    }
}

impl From<Felt> for MaybeRelocatable {
    fn from(value: Felt) -> Self {
        Self::Int(value)
    }
}

impl From<Relocatable> for MaybeRelocatable {
    fn from(value: Relocatable) -> Self {
        Self::RelocatableValue(value)
    }
}

impl From<(isize, u64)> for Relocatable {
    fn from(value: (isize, u64)) -> Self {
        Relocatable::new(value.0, value.1)
    }
}

impl From<i64> for MaybeRelocatable {
    fn from(value: i64) -> Self {
        Self::Int(Felt::from(value))
    }
}
