//! secp256k1 group operations: affine/Jacobian point representation,
//! doubling, mixed addition, scalar multiplication, and (de)serialisation.
//!
//! The scalar multiplication ladder deliberately performs the same amount
//! of work on every bit of the scalar (a "dummy write" pattern rather than
//! a Montgomery ladder) so that point-addition timing does not leak scalar
//! bits through branch prediction or operand-dependent instruction timing.
//! This trades roughly a quarter of performance for the ability to use the
//! cheaper mixed-coordinate addition formula, and is *not* fault-injection
//! resistant: a fault that corrupts the dummy addition reveals the
//! corresponding scalar bit. Callers requiring fault resistance must add
//! their own redundancy (e.g. re-deriving and comparing the result).

use crate::field::{BigInt256, Field};
use subtle::{Choice, ConditionallySelectable};
use zeroize::Zeroize;

/// `b` in the curve equation `y^2 = x^3 + a*x + b`. `a = 0` for secp256k1.
const CURVE_B: u64 = 7;

/// A point on secp256k1 in affine coordinates.
///
/// When `is_identity` is set, `x`/`y` are semantically undefined, but every
/// operation still writes to them so that the presence/absence of the
/// identity point does not change which memory locations are touched.
#[derive(Clone, Copy)]
pub struct AffinePoint {
    pub x: BigInt256,
    pub y: BigInt256,
    pub is_identity: Choice,
}

impl AffinePoint {
    pub fn identity() -> Self {
        AffinePoint {
            x: BigInt256::zero(),
            y: BigInt256::zero(),
            is_identity: Choice::from(1),
        }
    }

    pub fn new(x: BigInt256, y: BigInt256) -> Self {
        AffinePoint {
            x,
            y,
            is_identity: Choice::from(0),
        }
    }

    pub fn is_identity(&self) -> bool {
        bool::from(self.is_identity)
    }

    /// secp256k1 generator point.
    pub fn generator() -> Self {
        let gx = BigInt256::from_bytes_be(&[
            0x79, 0xbe, 0x66, 0x7e, 0xf9, 0xdc, 0xbb, 0xac, 0x55, 0xa0, 0x62, 0x95, 0xce, 0x87,
            0x0b, 0x07, 0x02, 0x9b, 0xfc, 0xdb, 0x2d, 0xce, 0x28, 0xd9, 0x59, 0xf2, 0x81, 0x5b,
            0x16, 0xf8, 0x17, 0x98,
        ]);
        let gy = BigInt256::from_bytes_be(&[
            0x48, 0x3a, 0xda, 0x77, 0x26, 0xa3, 0xc4, 0x65, 0x5d, 0xa4, 0xfb, 0xfc, 0x0e, 0x11,
            0x08, 0xa8, 0xfd, 0x17, 0xb4, 0x48, 0xa6, 0x85, 0x54, 0x19, 0x9c, 0x47, 0xd0, 0x8f,
            0xfb, 0x10, 0xd4, 0x4b,
        ]);
        AffinePoint::new(gx, gy)
    }

    /// Returns true if `(x, y)` satisfies `y^2 = x^3 + 7 (mod p)`.
    fn is_on_curve(&self) -> bool {
        let x3 = self.x.mul_mod(&self.x, Field::P).mul_mod(&self.x, Field::P);
        let b = BigInt256::from_bytes_le(&{
            let mut bytes = [0u8; 32];
            bytes[0] = CURVE_B as u8;
            bytes
        });
        let rhs = x3.add_mod(&b, Field::P);
        let lhs = self.y.mul_mod(&self.y, Field::P);
        lhs == rhs
    }

    pub fn to_jacobian(&self) -> JacobianPoint {
        JacobianPoint {
            x: self.x,
            y: self.y,
            z: BigInt256::one(),
            is_identity: self.is_identity,
        }
    }

    /// Serialises the point: 33-byte compressed form (`0x02`/`0x03` prefix
    /// plus big-endian `x`) or 65-byte uncompressed form (`0x04` prefix
    /// plus big-endian `x` and `y`). The identity serialises as a single
    /// `0x00` byte.
    pub fn serialize(&self, compressed: bool) -> Vec<u8> {
        if self.is_identity() {
            return vec![0x00];
        }
        if compressed {
            let mut out = Vec::with_capacity(33);
            let y_bytes = self.y.to_bytes_be();
            let parity = y_bytes[31] & 1;
            out.push(0x02 | parity);
            out.extend_from_slice(&self.x.to_bytes_be());
            out
        } else {
            let mut out = Vec::with_capacity(65);
            out.push(0x04);
            out.extend_from_slice(&self.x.to_bytes_be());
            out.extend_from_slice(&self.y.to_bytes_be());
            out
        }
    }

    /// Parses a point from its compressed or uncompressed serialisation.
    /// Decompression recovers `y` via the `p ≡ 3 (mod 4)` square root and
    /// verifies the result lies on the curve.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CurveError> {
        match bytes.len() {
            1 if bytes[0] == 0x00 => Ok(AffinePoint::identity()),
            33 if bytes[0] == 0x02 || bytes[0] == 0x03 => {
                let mut x_bytes = [0u8; 32];
                x_bytes.copy_from_slice(&bytes[1..33]);
                let x = BigInt256::from_bytes_be(&x_bytes);
                let want_odd = bytes[0] == 0x03;
                let y = recover_y(&x, want_odd)?;
                let point = AffinePoint::new(x, y);
                if !point.is_on_curve() {
                    return Err(CurveError::NotOnCurve);
                }
                Ok(point)
            }
            65 if bytes[0] == 0x04 => {
                let mut x_bytes = [0u8; 32];
                let mut y_bytes = [0u8; 32];
                x_bytes.copy_from_slice(&bytes[1..33]);
                y_bytes.copy_from_slice(&bytes[33..65]);
                let point = AffinePoint::new(
                    BigInt256::from_bytes_be(&x_bytes),
                    BigInt256::from_bytes_be(&y_bytes),
                );
                if !point.is_on_curve() {
                    return Err(CurveError::NotOnCurve);
                }
                Ok(point)
            }
            _ => Err(CurveError::InvalidEncoding),
        }
    }
}

/// Computes `y` such that `y^2 = x^3 + 7 (mod p)` and `y`'s parity matches
/// `want_odd`, using `y = (x^3 + 7)^((p+1)/4) mod p` (valid because
/// secp256k1's `p ≡ 3 (mod 4)`).
fn recover_y(x: &BigInt256, want_odd: bool) -> Result<BigInt256, CurveError> {
    let x3 = x.mul_mod(x, Field::P).mul_mod(x, Field::P);
    let mut seven_bytes = [0u8; 32];
    seven_bytes[0] = CURVE_B as u8;
    let seven = BigInt256::from_bytes_le(&seven_bytes);
    let rhs = x3.add_mod(&seven, Field::P);

    // exponent = (p + 1) / 4
    let p = Field::P.modulus();
    let (p_plus_one, _) = p.add_no_mod(&BigInt256::one());
    let exponent = p_plus_one.shr1_no_mod().shr1_no_mod();

    let candidate = pow_mod(&rhs, &exponent, Field::P);

    // Verify the candidate actually squares back to rhs: if x doesn't lie
    // on the curve for any y, the exponentiation above still returns some
    // value, which must be rejected.
    let squared = candidate.mul_mod(&candidate, Field::P);
    if squared != rhs {
        return Err(CurveError::NotOnCurve);
    }

    let candidate_bytes = candidate.to_bytes_be();
    let candidate_is_odd = candidate_bytes[31] & 1 == 1;
    if candidate_is_odd == want_odd {
        Ok(candidate)
    } else {
        Ok(p.sub_mod(&candidate, Field::P))
    }
}

/// `base^exponent mod field`, left-to-right square-and-multiply. `exponent`
/// here is always a public curve parameter (e.g. `(p+1)/4`), never secret.
fn pow_mod(base: &BigInt256, exponent: &BigInt256, field: Field) -> BigInt256 {
    let mut result = BigInt256::one();
    let bytes = exponent.to_bytes_be();
    let mut started = false;
    for byte in bytes.iter() {
        for bit in (0..8).rev() {
            if started {
                result = result.mul_mod(&result, field);
            }
            if (byte >> bit) & 1 == 1 {
                if !started {
                    started = true;
                    result = *base;
                } else {
                    result = result.mul_mod(base, field);
                }
            }
        }
    }
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CurveError {
    #[error("point encoding has the wrong length or prefix byte")]
    InvalidEncoding,
    #[error("decompressed or parsed point does not lie on the curve")]
    NotOnCurve,
}

/// A point on secp256k1 in Jacobian coordinates: `x_aff = x/z^2`,
/// `y_aff = y/z^3`.
#[derive(Clone, Copy)]
pub struct JacobianPoint {
    pub x: BigInt256,
    pub y: BigInt256,
    pub z: BigInt256,
    pub is_identity: Choice,
}

impl Zeroize for JacobianPoint {
    fn zeroize(&mut self) {
        self.x.zeroize();
        self.y.zeroize();
        self.z.zeroize();
    }
}

impl JacobianPoint {
    pub fn identity() -> Self {
        JacobianPoint {
            x: BigInt256::zero(),
            y: BigInt256::zero(),
            z: BigInt256::zero(),
            is_identity: Choice::from(1),
        }
    }

    /// Converts to affine coordinates. Requires one field inversion.
    pub fn to_affine(&self) -> AffinePoint {
        let z_inv = self.z.invert_mod(Field::P);
        let z_inv2 = z_inv.mul_mod(&z_inv, Field::P);
        let z_inv3 = z_inv2.mul_mod(&z_inv, Field::P);
        let x = self.x.mul_mod(&z_inv2, Field::P);
        let y = self.y.mul_mod(&z_inv3, Field::P);
        AffinePoint {
            x,
            y,
            is_identity: self.is_identity,
        }
    }

    /// Doubles `self`, exploiting `a = 0`. If `self` is the identity or has
    /// `y = 0`, the result is set to the identity; every intermediate
    /// field operation still executes so that timing does not depend on
    /// which case applies.
    pub fn double(&self) -> JacobianPoint {
        // Standard a=0 Jacobian doubling ("dbl-2009-l"):
        let a = self.x.mul_mod(&self.x, Field::P); // X1^2
        let b = self.y.mul_mod(&self.y, Field::P); // Y1^2
        let c = b.mul_mod(&b, Field::P); // B^2

        let xb = self.x.add_mod(&b, Field::P);
        let xb2 = xb.mul_mod(&xb, Field::P);
        let ac = a.add_mod(&c, Field::P);
        let d_inner = xb2.sub_mod(&ac, Field::P);
        let d = d_inner.add_mod(&d_inner, Field::P); // D = 2*((X1+B)^2 - A - C)

        let a2 = a.add_mod(&a, Field::P);
        let e = a2.add_mod(&a, Field::P); // E = 3*A

        let f = e.mul_mod(&e, Field::P); // F = E^2

        let d2 = d.add_mod(&d, Field::P);
        let x3 = f.sub_mod(&d2, Field::P); // X3 = F - 2*D

        let c2 = c.add_mod(&c, Field::P);
        let c4 = c2.add_mod(&c2, Field::P);
        let c8 = c4.add_mod(&c4, Field::P);
        let dx3 = d.sub_mod(&x3, Field::P);
        let edx3 = e.mul_mod(&dx3, Field::P);
        let y3 = edx3.sub_mod(&c8, Field::P); // Y3 = E*(D - X3) - 8*C

        let y1z1 = self.y.mul_mod(&self.z, Field::P);
        let z3 = y1z1.add_mod(&y1z1, Field::P); // Z3 = 2*Y1*Z1

        let y_is_zero = self.y.is_zero();
        let degenerate = self.is_identity | y_is_zero;

        JacobianPoint {
            x: BigInt256::conditional_select(&x3, &BigInt256::zero(), degenerate),
            y: BigInt256::conditional_select(&y3, &BigInt256::zero(), degenerate),
            z: BigInt256::conditional_select(&z3, &BigInt256::zero(), degenerate),
            is_identity: degenerate,
        }
    }

    /// Mixed addition of a Jacobian point and an affine point, using the
    /// 11-multiplication formula ("madd-2007-bl"). When either operand is
    /// the identity, or when `p1 == p2` (which would otherwise divide by
    /// zero), the write is redirected to `junk` so that the timing of the
    /// caller's loop does not reveal which case occurred. The `p1 == p2`
    /// branch is detected for correctness but is unreachable from the
    /// scalar-multiplication ladder below, which never causes that
    /// collision on secp256k1.
    pub fn mixed_add(&self, other: &AffinePoint, junk: &mut JacobianPoint) -> JacobianPoint {
        let z1z1 = self.z.mul_mod(&self.z, Field::P);
        let u2 = other.x.mul_mod(&z1z1, Field::P);
        let z1cubed = z1z1.mul_mod(&self.z, Field::P);
        let s2 = other.y.mul_mod(&z1cubed, Field::P);

        let h = u2.sub_mod(&self.x, Field::P);
        let hh = h.mul_mod(&h, Field::P);
        let i = hh.add_mod(&hh, Field::P).add_mod(&hh, Field::P).add_mod(&hh, Field::P); // 4*HH
        let j = h.mul_mod(&i, Field::P);
        let r_inner = s2.sub_mod(&self.y, Field::P);
        let r = r_inner.add_mod(&r_inner, Field::P); // 2*(S2-Y1)
        let v = self.x.mul_mod(&i, Field::P);

        let rr = r.mul_mod(&r, Field::P);
        let jv2 = j.add_mod(&v, Field::P).add_mod(&v, Field::P);
        let x3 = rr.sub_mod(&jv2, Field::P);

        let vx3 = v.sub_mod(&x3, Field::P);
        let rvx3 = r.mul_mod(&vx3, Field::P);
        let y1j = self.y.mul_mod(&j, Field::P);
        let y1j2 = y1j.add_mod(&y1j, Field::P);
        let y3 = rvx3.sub_mod(&y1j2, Field::P);

        let z1h = self.z.add_mod(&h, Field::P);
        let z1h2 = z1h.mul_mod(&z1h, Field::P);
        let z1z1_hh = self.z.mul_mod(&self.z, Field::P).add_mod(&hh, Field::P);
        let z3 = z1h2.sub_mod(&z1z1_hh, Field::P);

        let self_is_identity = self.is_identity;
        let other_is_identity = other.is_identity;
        let same_point = self.x.ct_eq(&u2) & self.y.ct_eq(&s2) & !self_is_identity & !other_is_identity;
        let redirect = self_is_identity | other_is_identity | same_point;

        let result = JacobianPoint {
            x: x3,
            y: y3,
            z: z3,
            is_identity: Choice::from(0),
        };

        // Write the real sum into `junk` when this call is one of the
        // "take the other operand" cases, and the appropriate operand's
        // value into the returned slot — every branch writes both outputs.
        let self_as_jacobian = JacobianPoint {
            x: self.x,
            y: self.y,
            z: self.z,
            is_identity: self.is_identity,
        };
        let other_as_jacobian = other.to_jacobian();

        *junk = JacobianPoint::conditional_select(&result, &self_as_jacobian, redirect);

        let chosen_for_identity_case =
            JacobianPoint::conditional_select(&other_as_jacobian, &self_as_jacobian, self_is_identity);
        JacobianPoint::conditional_select(&result, &chosen_for_identity_case, redirect)
    }
}

impl ConditionallySelectable for JacobianPoint {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        JacobianPoint {
            x: BigInt256::conditional_select(&a.x, &b.x, choice),
            y: BigInt256::conditional_select(&a.y, &b.y, choice),
            z: BigInt256::conditional_select(&a.z, &b.z, choice),
            is_identity: Choice::conditional_select(&a.is_identity, &b.is_identity, choice),
        }
    }
}

/// Left-to-right double-and-always-add scalar multiplication: for each of
/// the 256 scalar bits, both the identity and `point` are added (the
/// identity in the "0" bit case), so every bit does the same amount of
/// work. This is the module's accepted fault-injection weakness : a fault that corrupts a dummy addition reveals that bit.
pub fn scalar_mul(scalar: &BigInt256, point: &AffinePoint) -> JacobianPoint {
    let mut acc = JacobianPoint::identity();
    let bytes = scalar.to_bytes_be();
    let mut junk = JacobianPoint::identity();

    for byte in bytes.iter() {
        for bit_index in (0..8).rev() {
            acc = acc.double();
            let bit = Choice::from((byte >> bit_index) & 1);
            let table = [AffinePoint::identity(), *point];
            let chosen = AffinePoint {
                x: BigInt256::conditional_select(&table[0].x, &table[1].x, bit),
                y: BigInt256::conditional_select(&table[0].y, &table[1].y, bit),
                is_identity: Choice::conditional_select(&table[0].is_identity, &table[1].is_identity, bit),
            };
            acc = acc.mixed_add(&chosen, &mut junk);
        }
    }
    acc
}

/// Multiplies the secp256k1 generator by `scalar`.
pub fn scalar_base_mul(scalar: &BigInt256) -> JacobianPoint {
    scalar_mul(scalar, &AffinePoint::generator())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_is_on_curve() {
        assert!(AffinePoint::generator().is_on_curve());
    }

    #[test]
    fn identity_roundtrip_serialize() {
        let id = AffinePoint::identity();
        assert_eq!(id.serialize(true), vec![0x00]);
    }

    #[test]
    fn generator_compressed_roundtrip() {
        let g = AffinePoint::generator();
        let bytes = g.serialize(true);
        assert_eq!(bytes.len(), 33);
        let parsed = AffinePoint::deserialize(&bytes).unwrap();
        assert_eq!(parsed.x, g.x);
        assert_eq!(parsed.y, g.y);
    }

    #[test]
    fn generator_uncompressed_roundtrip() {
        let g = AffinePoint::generator();
        let bytes = g.serialize(false);
        assert_eq!(bytes.len(), 65);
        let parsed = AffinePoint::deserialize(&bytes).unwrap();
        assert_eq!(parsed.x, g.x);
        assert_eq!(parsed.y, g.y);
    }

    #[test]
    fn scalar_mul_by_one_is_generator() {
        let one = BigInt256::one();
        let p = scalar_base_mul(&one).to_affine();
        let g = AffinePoint::generator();
        assert_eq!(p.x, g.x);
        assert_eq!(p.y, g.y);
    }

    #[test]
    fn scalar_mul_by_two_is_double_generator() {
        let g = AffinePoint::generator();
        let two = BigInt256::one().add_mod(&BigInt256::one(), Field::N);
        let via_scalar = scalar_base_mul(&two).to_affine();
        let via_double = g.to_jacobian().double().to_affine();
        assert_eq!(via_scalar.x, via_double.x);
        assert_eq!(via_scalar.y, via_double.y);
    }

    #[test]
    fn point_plus_identity_is_point() {
        let g = AffinePoint::generator();
        let mut junk = JacobianPoint::identity();
        let sum = g.to_jacobian().mixed_add(&AffinePoint::identity(), &mut junk).to_affine();
        assert_eq!(sum.x, g.x);
        assert_eq!(sum.y, g.y);
    }
}
