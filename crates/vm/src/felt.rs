//! The field element type `F = Z/PZ` the virtual machine computes over.
//!
//! The machine is specified against an abstract prime field; in practice only
//! the Starknet field is ever used, so [`Felt`] is a direct re-export of
//! [`starknet_types_core::felt::Felt`] rather than a generic parameter. This
//! mirrors the teacher's own [`CairoVM`](crate::vm::VirtualMachine) choice to
//! hard-code the Starknet field instead of abstracting over it.

pub use starknet_types_core::felt::Felt;

/// Operations spec.md requires on [`Felt`] that `starknet-types-core` does not
/// expose directly.
pub trait FeltExt: Sized {
    /// Returns the number of bits needed to represent `self` as a nonnegative
    /// integer less than `P`.
    fn bit_length(&self) -> u32;

    /// Interprets `self` as a signed integer: `x` if `x < P/2`, else `x - P`.
    fn as_int(&self) -> num_bigint::BigInt;

    /// Returns `true` if `self` is zero.
    fn is_zero_felt(&self) -> bool;

    /// Computes a modular square root of `self`, following the rule in
    /// spec.md's Open Questions: if `self` is a quadratic residue, the
    /// principal square root is returned; otherwise the square root of
    /// `self / 3` is returned instead (the field's quadratic non-residue
    /// convention for the Starknet prime).
    fn sqrt_or_third(&self) -> Option<Self>;
}

impl FeltExt for Felt {
    fn bit_length(&self) -> u32 {
        let bytes = self.to_bytes_be();
        for (i, byte) in bytes.iter().enumerate() {
            if *byte != 0 {
                let bit_in_byte = 8 - byte.leading_zeros();
                return ((bytes.len() - i - 1) as u32) * 8 + bit_in_byte;
            }
        }
        0
    }

    fn as_int(&self) -> num_bigint::BigInt {
        use num_bigint::BigInt;

        let value = BigInt::from_bytes_be(num_bigint::Sign::Plus, &self.to_bytes_be());
        let prime = Felt::prime_as_bigint();
        let half = &prime >> 1u32;
        if value > half {
            value - prime
        } else {
            value
        }
    }

    fn is_zero_felt(&self) -> bool {
        *self == Felt::ZERO
    }

    fn sqrt_or_third(&self) -> Option<Self> {
        if let Some(root) = self.sqrt() {
            return Some(root);
        }
        let three = Felt::from(3u8);
        let candidate = self.field_div(&three.try_into().ok()?);
        candidate.sqrt()
    }
}

/// Extension helpers on [`Felt`] that need the modulus as a [`num_bigint::BigInt`].
trait PrimeAsBigInt {
    fn prime_as_bigint() -> num_bigint::BigInt;
}

impl PrimeAsBigInt for Felt {
    fn prime_as_bigint() -> num_bigint::BigInt {
        // The Starknet prime: 2^251 + 17 * 2^192 + 1.
        let one = num_bigint::BigInt::from(1u8);
        let base: num_bigint::BigInt = num_bigint::BigInt::from(2u8);
        (&base << 251u32) + (num_bigint::BigInt::from(17u8) << 192u32) + one
    }
}
