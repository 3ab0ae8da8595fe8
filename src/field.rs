//! Constant-time 256-bit modular arithmetic over a runtime-selectable prime
//! field.
//!
//! `Field` replaces the historical `setFieldToP`/`setFieldToN` global: every
//! operation that depends on a modulus takes it explicitly, so two callers
//! can never trip over a field left installed by a function they didn't
//! call.

use std::cmp::Ordering;
use subtle::{Choice, ConditionallySelectable};
use zeroize::Zeroize;

/// Number of 64-bit limbs in a 256-bit integer.
const LIMBS: usize = 4;

/// The field a [`BigInt256`] operation should reduce into.
///
/// secp256k1 needs two distinct moduli: the coordinate field prime `p` and
/// the scalar/group order `n`. Carrying this as an explicit argument (rather
/// than a process-wide "current field" flag) means `mul_mod` can never be
/// accidentally evaluated against the wrong modulus left installed by a
/// previous call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// secp256k1 coordinate field prime, `2^256 - 2^32 - 977`.
    P,
    /// secp256k1 group order.
    N,
}

impl Field {
    /// The modulus for this field, little-endian limbs.
    pub const fn modulus(self) -> BigInt256 {
        match self {
            Field::P => BigInt256 {
                limbs: [
                    0xFFFF_FFFE_FFFF_FC2F,
                    0xFFFF_FFFF_FFFF_FFFF,
                    0xFFFF_FFFF_FFFF_FFFF,
                    0xFFFF_FFFF_FFFF_FFFF,
                ],
            },
            Field::N => BigInt256 {
                limbs: [
                    0xBFD2_5E8C_D036_4141,
                    0xBAAE_DCE6_AF48_A03B,
                    0xFFFF_FFFF_FFFF_FFFE,
                    0xFFFF_FFFF_FFFF_FFFF,
                ],
            },
        }
    }
}

/// A 256-bit unsigned integer, stored as four little-endian 64-bit limbs.
///
/// All arithmetic is reduced modulo a [`Field`] passed explicitly at each
/// call; `BigInt256` itself carries no notion of "current modulus".
#[derive(Clone, Copy)]
pub struct BigInt256 {
    limbs: [u64; LIMBS],
}

impl Zeroize for BigInt256 {
    fn zeroize(&mut self) {
        self.limbs.zeroize();
    }
}

impl Drop for BigInt256 {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ConditionallySelectable for BigInt256 {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        let mut limbs = [0u64; LIMBS];
        for i in 0..LIMBS {
            limbs[i] = u64::conditional_select(&a.limbs[i], &b.limbs[i], choice);
        }
        BigInt256 { limbs }
    }
}

impl BigInt256 {
    /// The additive identity.
    pub const fn zero() -> Self {
        BigInt256 { limbs: [0; LIMBS] }
    }

    pub const fn one() -> Self {
        BigInt256 {
            limbs: [1, 0, 0, 0],
        }
    }

    /// Assigns `other`'s value into `self`.
    pub fn assign(&mut self, other: &BigInt256) {
        self.limbs = other.limbs;
    }

    /// Sets `self` to zero.
    pub fn set_zero(&mut self) {
        self.limbs = [0; LIMBS];
    }

    /// Constant-time check for zero: every limb is OR-folded before the
    /// single resulting comparison, so no limb's value individually causes
    /// an early return.
    pub fn is_zero(&self) -> Choice {
        let folded = self.limbs.iter().fold(0u64, |acc, &limb| acc | limb);
        Choice::from((folded == 0) as u8)
    }

    /// Three-way comparison.
    ///
    /// Not constant-time: differing high limbs return as soon as they are
    /// found. This is acceptable per the module's timing contract — every
    /// caller either compares public values (field moduli, curve
    /// coefficients) or uses [`BigInt256::is_zero`]/[`BigInt256::ct_eq`] for
    /// secret-dependent equality checks.
    pub fn compare(&self, other: &BigInt256) -> Ordering {
        for i in (0..LIMBS).rev() {
            match self.limbs[i].cmp(&other.limbs[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Constant-time equality, masked so the result reveals nothing beyond
    /// equal/unequal.
    pub fn ct_eq(&self, other: &BigInt256) -> Choice {
        let mut diff = 0u64;
        for i in 0..LIMBS {
            diff |= self.limbs[i] ^ other.limbs[i];
        }
        Choice::from((diff == 0) as u8)
    }

    pub fn from_bytes_le(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; LIMBS];
        for i in 0..LIMBS {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            limbs[i] = u64::from_le_bytes(buf);
        }
        BigInt256 { limbs }
    }

    pub fn to_bytes_le(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for i in 0..LIMBS {
            out[i * 8..i * 8 + 8].copy_from_slice(&self.limbs[i].to_le_bytes());
        }
        out
    }

    pub fn from_bytes_be(bytes: &[u8; 32]) -> Self {
        let mut le = *bytes;
        le.reverse();
        Self::from_bytes_le(&le)
    }

    pub fn to_bytes_be(&self) -> [u8; 32] {
        let mut out = self.to_bytes_le();
        out.reverse();
        out
    }

    /// `self + other`, without any reduction. Returns the carry-out.
    pub fn add_no_mod(&self, other: &BigInt256) -> (BigInt256, u64) {
        let mut limbs = [0u64; LIMBS];
        let mut carry: u128 = 0;
        for i in 0..LIMBS {
            let sum = self.limbs[i] as u128 + other.limbs[i] as u128 + carry;
            limbs[i] = sum as u64;
            carry = sum >> 64;
        }
        (BigInt256 { limbs }, carry as u64)
    }

    /// `self - other`, without any reduction. Returns the borrow-out (1 if
    /// the subtraction underflowed).
    pub fn sub_no_mod(&self, other: &BigInt256) -> (BigInt256, u64) {
        let mut limbs = [0u64; LIMBS];
        let mut borrow: i128 = 0;
        for i in 0..LIMBS {
            let diff = self.limbs[i] as i128 - other.limbs[i] as i128 - borrow;
            if diff < 0 {
                limbs[i] = (diff + (1i128 << 64)) as u64;
                borrow = 1;
            } else {
                limbs[i] = diff as u64;
                borrow = 0;
            }
        }
        (BigInt256 { limbs }, borrow as u64)
    }

    /// Right shift by one bit, without any reduction.
    pub fn shr1_no_mod(&self) -> BigInt256 {
        let mut limbs = [0u64; LIMBS];
        let mut carry_in = 0u64;
        for i in (0..LIMBS).rev() {
            let bit_out = self.limbs[i] & 1;
            limbs[i] = (self.limbs[i] >> 1) | (carry_in << 63);
            carry_in = bit_out;
        }
        BigInt256 { limbs }
    }

    /// Reduces `self` modulo `field`, assuming `self` may exceed the
    /// modulus by at most one subtraction's worth (i.e. `self < 2 * m`).
    pub fn reduce_once(&self, field: Field) -> BigInt256 {
        let m = field.modulus();
        let (sub, borrow) = self.sub_no_mod(&m);
        BigInt256::conditional_select(&sub, self, Choice::from(borrow as u8))
    }

    /// `(self + other) mod field`.
    pub fn add_mod(&self, other: &BigInt256, field: Field) -> BigInt256 {
        let (sum, carry) = self.add_no_mod(other);
        let m = field.modulus();
        let (sub, borrow) = sum.sub_no_mod(&m);
        // If the addition carried out of the top limb, the true value is
        // `sum + 2^256`, which is always >= m, so the subtraction must be
        // taken regardless of its own borrow.
        let take_sub = Choice::from(((carry != 0) || borrow == 0) as u8);
        BigInt256::conditional_select(&sum, &sub, take_sub)
    }

    /// `(self - other) mod field`.
    pub fn sub_mod(&self, other: &BigInt256, field: Field) -> BigInt256 {
        let (diff, borrow) = self.sub_no_mod(other);
        let m = field.modulus();
        let (wrapped, _) = diff.add_no_mod(&m);
        BigInt256::conditional_select(&diff, &wrapped, Choice::from(borrow as u8))
    }

    /// Widening multiply producing a 512-bit product as eight little-endian
    /// limbs.
    fn mul_wide(&self, other: &BigInt256) -> [u64; 8] {
        let mut acc = [0u128; 8];
        for i in 0..LIMBS {
            for j in 0..LIMBS {
                acc[i + j] += self.limbs[i] as u128 * other.limbs[j] as u128;
            }
        }
        let mut out = [0u64; 8];
        let mut carry: u128 = 0;
        for i in 0..8 {
            let v = acc[i] + carry;
            out[i] = v as u64;
            carry = v >> 64;
        }
        out
    }

    /// Reduces a 512-bit value modulo `field` via repeated constant-time
    /// conditional subtraction of `modulus << k` for `k` from 256 down to 0
    /// (binary long division). `modulus` is short (only the top limb
    /// differs from all-ones for both secp256k1 `p` and `n`), so each
    /// subtraction only ever touches a handful of limbs in practice, but the
    /// implementation below treats the full width uniformly for clarity.
    fn reduce_wide(wide: &[u64; 8], field: Field) -> BigInt256 {
        let m = field.modulus();
        let mut rem = *wide;
        for k in (0..=256u32).rev() {
            let shifted = shl_k(&m, k);
            let (sub, borrow) = sub_wide(&rem, &shifted);
            let take = Choice::from((borrow == 0) as u8);
            for i in 0..8 {
                rem[i] = u64::conditional_select(&rem[i], &sub[i], take);
            }
        }
        BigInt256 {
            limbs: [rem[0], rem[1], rem[2], rem[3]],
        }
    }

    /// `(self * other) mod field`.
    pub fn mul_mod(&self, other: &BigInt256, field: Field) -> BigInt256 {
        let wide = self.mul_wide(other);
        BigInt256::reduce_wide(&wide, field)
    }

    /// Reduces an arbitrary (possibly > modulus by more than one multiple)
    /// value modulo `field`. Used to bring externally supplied 256-bit
    /// values (hash digests, DRBG output) into range.
    pub fn reduce_mod(&self, field: Field) -> BigInt256 {
        let mut wide = [0u64; 8];
        wide[..LIMBS].copy_from_slice(&self.limbs);
        BigInt256::reduce_wide(&wide, field)
    }

    /// Modular inverse via Fermat's little theorem (`self^(m-2) mod m`),
    /// implemented as left-to-right binary square-and-multiply. The
    /// exponent bits are the curve/group parameters, not secret data, so
    /// branching on them (per the module's timing contract) is sound.
    pub fn invert_mod(&self, field: Field) -> BigInt256 {
        let m = field.modulus();
        let (exponent, _) = m.sub_no_mod(&BigInt256 {
            limbs: [2, 0, 0, 0],
        });

        let mut result = BigInt256::one();
        let mut found_one_bit = false;
        for i in (0..LIMBS).rev() {
            for bit in (0..64).rev() {
                if found_one_bit {
                    result = result.mul_mod(&result, field);
                }
                if (exponent.limbs[i] >> bit) & 1 == 1 {
                    if !found_one_bit {
                        found_one_bit = true;
                        result = *self;
                    } else {
                        result = result.mul_mod(self, field);
                    }
                }
            }
        }
        result
    }

    /// Reverses limb order (but not byte order within each limb). Used by
    /// callers that need a coarse endian swap distinct from the full
    /// byte-reversal of [`BigInt256::to_bytes_be`].
    pub fn endian_swap(&self) -> BigInt256 {
        let mut limbs = [0u64; LIMBS];
        for i in 0..LIMBS {
            limbs[i] = self.limbs[LIMBS - 1 - i].swap_bytes();
        }
        BigInt256 { limbs }
    }
}

/// Shifts a 256-bit value left by `k` bits (`0..=256`), producing a 512-bit
/// result as eight little-endian limbs.
fn shl_k(v: &BigInt256, k: u32) -> [u64; 8] {
    let mut wide = [0u64; 8];
    if k >= 512 {
        return wide;
    }
    let limb_shift = (k / 64) as usize;
    let bit_shift = k % 64;
    for i in 0..LIMBS {
        let dest = i + limb_shift;
        if dest >= 8 {
            continue;
        }
        let v_i = v.limb(i);
        if bit_shift == 0 {
            wide[dest] = wide[dest].wrapping_add(v_i);
        } else {
            wide[dest] = wide[dest].wrapping_add(v_i << bit_shift);
            if dest + 1 < 8 {
                wide[dest + 1] = wide[dest + 1].wrapping_add(v_i >> (64 - bit_shift));
            }
        }
    }
    wide
}

/// `a - b` over 512-bit values (eight little-endian limbs). Returns the
/// borrow-out.
fn sub_wide(a: &[u64; 8], b: &[u64; 8]) -> ([u64; 8], u64) {
    let mut out = [0u64; 8];
    let mut borrow: i128 = 0;
    for i in 0..8 {
        let diff = a[i] as i128 - b[i] as i128 - borrow;
        if diff < 0 {
            out[i] = (diff + (1i128 << 64)) as u64;
            borrow = 1;
        } else {
            out[i] = diff as u64;
            borrow = 0;
        }
    }
    (out, borrow as u64)
}

impl BigInt256 {
    fn limb(&self, i: usize) -> u64 {
        self.limbs[i]
    }
}

impl std::fmt::Debug for BigInt256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BigInt256({})", hex::encode(self.to_bytes_be()))
    }
}

impl PartialEq for BigInt256 {
    fn eq(&self, other: &Self) -> bool {
        bool::from(self.ct_eq(other))
    }
}
impl Eq for BigInt256 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_zero() {
        assert!(bool::from(BigInt256::zero().is_zero()));
        assert!(!bool::from(BigInt256::one().is_zero()));
    }

    #[test]
    fn round_trip_bytes() {
        let mut bytes = [0u8; 32];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let v = BigInt256::from_bytes_be(&bytes);
        assert_eq!(v.to_bytes_be(), bytes);
    }

    #[test]
    fn add_sub_roundtrip() {
        let a = BigInt256::from_bytes_be(&[0x11; 32]);
        let b = BigInt256::from_bytes_be(&[0x02; 32]);
        let sum = a.add_mod(&b, Field::P);
        let back = sum.sub_mod(&b, Field::P);
        assert_eq!(back, a);
    }

    #[test]
    fn mul_one_is_identity() {
        let a = BigInt256::from_bytes_be(&[0x07; 32]);
        let one = BigInt256::one();
        let product = a.mul_mod(&one, Field::N);
        assert_eq!(product.compare(&a.reduce_mod(Field::N)), Ordering::Equal);
    }

    #[test]
    fn invert_roundtrip() {
        let a = BigInt256::from_bytes_be(&[0x09; 32]).reduce_mod(Field::P);
        let inv = a.invert_mod(Field::P);
        let product = a.mul_mod(&inv, Field::P);
        assert_eq!(product, BigInt256::one());
    }

    #[test]
    fn modulus_values_are_distinct() {
        assert_ne!(Field::P.modulus().compare(&Field::N.modulus()), Ordering::Equal);
    }
}
