//! Field and group elements of the NIST P-256 curve.
//!
//! Points are SEC1-compressed on the wire, with the identity encoded as [POINT_LENGTH] zero
//! bytes. Scalars are big-endian and must be canonical (strictly less than the group order).

use bytes::{Buf, BufMut};
use commonware_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_utils::hex;
use p256::{
    elliptic_curve::{
        group::GroupEncoding,
        hash2curve::{ExpandMsgXmd, GroupDigest},
        Field, PrimeField,
    },
    CompressedPoint, FieldBytes, NistP256, ProjectivePoint,
};
use rand::{CryptoRng, RngCore};
use sha2::Sha256;
use std::{
    fmt,
    ops::{Add, AddAssign, Mul, MulAssign, Sub, SubAssign},
};
use zeroize::Zeroize;

/// Size of an encoded [Scalar].
pub const SCALAR_LENGTH: usize = 32;

/// Size of an encoded [Point].
pub const POINT_LENGTH: usize = 33;

/// Element of the P-256 scalar field.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Scalar(p256::Scalar);

impl Scalar {
    /// The additive identity.
    pub const ZERO: Self = Self(<p256::Scalar as Field>::ZERO);

    /// The multiplicative identity.
    pub const ONE: Self = Self(<p256::Scalar as Field>::ONE);

    /// Sample a uniformly random scalar.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(p256::Scalar::random(&mut *rng))
    }

    /// Returns the multiplicative inverse, or `None` for zero.
    pub fn inverse(&self) -> Option<Self> {
        Option::<p256::Scalar>::from(self.0.invert()).map(Self)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        Self(p256::Scalar::from(value))
    }
}

impl Add for Scalar {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Scalar {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Scalar {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Scalar {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Scalar {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl MulAssign for Scalar {
    fn mul_assign(&mut self, rhs: Self) {
        self.0 *= rhs.0;
    }
}

impl Zeroize for Scalar {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Scalar(..)")
    }
}

impl Write for Scalar {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0.to_repr());
    }
}

impl Read for Scalar {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = <[u8; SCALAR_LENGTH]>::read(buf)?;
        let repr = FieldBytes::clone_from_slice(&raw);
        Option::<p256::Scalar>::from(p256::Scalar::from_repr(repr))
            .map(Self)
            .ok_or(CodecError::Invalid("Scalar", "not canonical"))
    }
}

impl FixedSize for Scalar {
    const SIZE: usize = SCALAR_LENGTH;
}

/// Point on the P-256 curve.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Point(ProjectivePoint);

impl Point {
    /// The point at infinity.
    pub const IDENTITY: Self = Self(ProjectivePoint::IDENTITY);

    /// The standard generator `G`.
    pub const GENERATOR: Self = Self(ProjectivePoint::GENERATOR);

    /// Hash `message` to the curve (SSWU, expand_message_xmd with SHA-256) under `dst`.
    pub fn hash_to_curve(dst: &[u8], message: &[u8]) -> Option<Self> {
        NistP256::hash_from_bytes::<ExpandMsgXmd<Sha256>>(&[message], &[dst])
            .ok()
            .map(Self)
    }

    fn is_identity(&self) -> bool {
        self.0 == ProjectivePoint::IDENTITY
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Point {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Mul<Scalar> for Point {
    type Output = Self;

    fn mul(self, rhs: Scalar) -> Self {
        Self(self.0 * rhs.0)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = Vec::with_capacity(POINT_LENGTH);
        self.write(&mut raw);
        write!(f, "Point({})", hex(&raw))
    }
}

impl Write for Point {
    fn write(&self, buf: &mut impl BufMut) {
        if self.is_identity() {
            buf.put_bytes(0, POINT_LENGTH);
            return;
        }
        buf.put_slice(&self.0.to_bytes());
    }
}

impl Read for Point {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = <[u8; POINT_LENGTH]>::read(buf)?;
        if raw.iter().all(|byte| *byte == 0) {
            return Ok(Self::IDENTITY);
        }
        let repr = CompressedPoint::clone_from_slice(&raw);
        Option::<ProjectivePoint>::from(ProjectivePoint::from_bytes(&repr))
            .map(Self)
            .ok_or(CodecError::Invalid("Point", "not on curve"))
    }
}

impl FixedSize for Point {
    const SIZE: usize = POINT_LENGTH;
}
