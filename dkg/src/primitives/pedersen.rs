//! Pedersen Verifiable Secret Sharing over P-256.
//!
//! A dealer shares `a(0)` by committing to a pair of private polynomials `a` and `b` with
//! `C_k = G*a_k + H*b_k`. A member `j` holding `(s = a(j), t = b(j))` checks its share against
//! the commitments with `G*s + H*t == sum_k C_k * j^k`, which reveals nothing about `a(0)`.
//!
//! Once shares are qualified, dealers publish `A_k = G*a_k` so members can check `G*s == sum_k A_k * j^k`
//! and later derive each dealer's individual public key `A_0`.
//!
//! `H` is derived by hashing a namespace to the curve, so nobody knows `log_G(H)`.

use crate::{
    group::MemberId,
    primitives::{
        poly::{Private, Public},
        Error, Point, Scalar,
    },
};

/// Domain separation tag used when hashing the namespace to `H`.
const H_DST: &[u8] = b"BEACON_DKG_V1_P256_XMD:SHA-256_SSWU_RO_PEDERSEN_H";

/// Public parameters of the Pedersen VSS: the curve generator `G` and a second generator `H`
/// with unknown discrete logarithm relative to `G`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Vss {
    g: Point,
    h: Point,
}

impl Vss {
    /// Derive `H` from `namespace`.
    ///
    /// Every member of a group must use the same namespace.
    pub fn new(namespace: &[u8]) -> Result<Self, Error> {
        let h = Point::hash_to_curve(H_DST, namespace).ok_or(Error::HashToCurve)?;
        Ok(Self {
            g: Point::GENERATOR,
            h,
        })
    }

    /// The curve generator.
    pub fn g(&self) -> &Point {
        &self.g
    }

    /// The second generator.
    pub fn h(&self) -> &Point {
        &self.h
    }

    /// Commit to `a` using `b` as the blinding polynomial (`C_k = G*a_k + H*b_k`).
    ///
    /// Both polynomials must have the same degree.
    pub fn commit(&self, a: &Private, b: &Private) -> Public {
        let commitments = a
            .coefficients()
            .iter()
            .zip(b.coefficients())
            .map(|(a_k, b_k)| self.g * *a_k + self.h * *b_k)
            .collect();
        Public::from(commitments)
    }

    /// Check the share `(s, t)` dealt to `index` against the dealer's commitments.
    pub fn verify(&self, commitments: &Public, index: MemberId, s: &Scalar, t: &Scalar) -> bool {
        let expected = commitments.evaluate(index).value;
        self.g * *s + self.h * *t == expected
    }

    /// Check the share `s` dealt to `index` against the dealer's public key share points
    /// (`A_k = G*a_k`).
    pub fn verify_points(&self, points: &Public, index: MemberId, s: &Scalar) -> bool {
        let expected = points.evaluate(index).value;
        self.g * *s == expected
    }
}

/// Combine individual public keys (`A_j0`) into the group public key (`Y = sum_j A_j0`).
///
/// The result does not depend on the order of `keys`.
pub fn combine<'a, I>(keys: I) -> Point
where
    I: IntoIterator<Item = &'a Point>,
{
    keys.into_iter()
        .fold(Point::IDENTITY, |group_key, key| group_key + *key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::poly::new_from;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_h_deterministic() {
        let a = Vss::new(b"test").unwrap();
        let b = Vss::new(b"test").unwrap();
        let c = Vss::new(b"other").unwrap();
        assert_eq!(a, b);
        assert_ne!(a.h(), c.h());
        assert_ne!(a.g(), a.h());
    }

    #[test]
    fn test_verify() {
        let mut rng = StdRng::seed_from_u64(0);
        let vss = Vss::new(b"test").unwrap();
        let a = new_from(2, &mut rng);
        let b = new_from(2, &mut rng);
        let commitments = vss.commit(&a, &b);
        let points = a.commit();
        for id in 1..=5u32 {
            let index = MemberId::new(id);
            let s = a.evaluate(index).value;
            let t = b.evaluate(index).value;
            assert!(vss.verify(&commitments, index, &s, &t));
            assert!(vss.verify_points(&points, index, &s));

            // Shares for another member do not verify
            let other = MemberId::new(id + 1);
            assert!(!vss.verify(&commitments, other, &s, &t));
            assert!(!vss.verify_points(&points, other, &s));

            // Tampered shares do not verify
            let tampered = s + Scalar::ONE;
            assert!(!vss.verify(&commitments, index, &tampered, &t));
            assert!(!vss.verify_points(&points, index, &tampered));
        }
    }

    #[test]
    fn test_verify_swapped_blinding() {
        let mut rng = StdRng::seed_from_u64(1);
        let vss = Vss::new(b"test").unwrap();
        let a = new_from(1, &mut rng);
        let b = new_from(1, &mut rng);
        let commitments = vss.commit(&a, &b);
        let index = MemberId::new(3);
        let s = a.evaluate(index).value;
        let t = b.evaluate(index).value;
        assert!(!vss.verify(&commitments, index, &t, &s));
    }

    #[test]
    fn test_combine_order_independent() {
        let mut rng = StdRng::seed_from_u64(2);
        let keys = (0..5)
            .map(|_| *new_from(0, &mut rng).commit().constant())
            .collect::<Vec<_>>();
        let forward = combine(&keys);
        let reversed = combine(keys.iter().rev());
        let rotated = combine(keys[2..].iter().chain(&keys[..2]));
        assert_eq!(forward, reversed);
        assert_eq!(forward, rotated);
        assert_eq!(combine(&[]), Point::IDENTITY);
    }
}
