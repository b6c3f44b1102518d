//! Polynomial operations over the P-256 scalar field.
//!
//! # Warning
//!
//! Polynomials are always evaluated at a member's non-zero identifier. Evaluating a private
//! polynomial at zero reveals the secret it shares.

use crate::{
    group::MemberId,
    primitives::{Error, Point, Scalar},
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, RangeCfg, Read, Write};
use rand::{CryptoRng, RngCore};
use std::ops::{Add, Mul};
use zeroize::Zeroize;

/// Coefficient type of a [Poly].
pub trait Element: Copy + Eq + Add<Output = Self> + Mul<Scalar, Output = Self> {
    /// The additive identity.
    const ZERO: Self;

    /// Overwrite the element when it is dropped.
    fn clear(&mut self);
}

impl Element for Scalar {
    const ZERO: Self = Scalar::ZERO;

    fn clear(&mut self) {
        self.zeroize();
    }
}

impl Element for Point {
    const ZERO: Self = Point::IDENTITY;

    fn clear(&mut self) {
        *self = Point::IDENTITY;
    }
}

/// Private polynomials are used to generate secret shares.
pub type Private = Poly<Scalar>;

/// Public polynomials are private polynomials "in the exponent" (`A_k = G*a_k`), or
/// Pedersen commitments to a pair of private polynomials (`C_k = G*a_k + H*b_k`).
pub type Public = Poly<Point>;

/// A polynomial evaluation at a member's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eval<C> {
    pub index: MemberId,
    pub value: C,
}

/// A polynomial with coefficients in `C` and a scalar variable.
///
/// Coefficients are overwritten on drop. Private coefficients are redacted when formatted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poly<C: Element>(Vec<C>);

/// Returns a new scalar polynomial of the given degree where each coefficient is
/// sampled at random from the provided RNG.
///
/// In the context of secret sharing, the threshold is the degree + 1.
pub fn new_from<R: RngCore + CryptoRng>(degree: u32, rng: &mut R) -> Private {
    let coeffs = (0..=degree).map(|_| Scalar::random(&mut *rng)).collect();
    Poly(coeffs)
}

impl<C: Element> Poly<C> {
    /// Creates a new polynomial from the given coefficients.
    pub fn from(coeffs: Vec<C>) -> Self {
        Self(coeffs)
    }

    /// Returns the constant term of the polynomial.
    pub fn constant(&self) -> &C {
        &self.0[0]
    }

    /// Returns the number of evaluations required to recover the constant term.
    pub fn required(&self) -> usize {
        self.0.len()
    }

    /// Returns the coefficients, lowest degree first.
    pub fn coefficients(&self) -> &[C] {
        &self.0
    }

    /// Evaluates the polynomial at the member's identifier.
    pub fn evaluate(&self, index: MemberId) -> Eval<C> {
        let x = index.scalar();

        // Horner's method
        let value = self
            .0
            .iter()
            .rev()
            .fold(C::ZERO, |sum, coeff| sum * x + *coeff);
        Eval { index, value }
    }

    /// Recovers the constant term of a polynomial of degree less than `t` using at least `t`
    /// evaluations of the polynomial.
    ///
    /// Evaluations are sorted by index so that two invocations over the same set select the
    /// same `t` evaluations.
    pub fn recover<'a, I>(t: usize, evals: I) -> Result<C, Error>
    where
        C: 'a,
        I: IntoIterator<Item = &'a Eval<C>>,
    {
        let mut evals = evals.into_iter().collect::<Vec<_>>();
        if evals.len() < t {
            return Err(Error::NotEnoughEvaluations(evals.len(), t));
        }
        evals.sort_by_key(|eval| eval.index);
        if let Some(pair) = evals.windows(2).find(|pair| pair[0].index == pair[1].index) {
            return Err(Error::DuplicateEvaluation(pair[0].index));
        }
        let xs = evals
            .into_iter()
            .take(t)
            .map(|eval| (eval.index.scalar(), eval.value))
            .collect::<Vec<_>>();

        // The constant term is `sum_i y_i * l_i(0)`, where `l_i(0) = prod_{j != i} x_j / (x_j - x_i)`.
        xs.iter()
            .enumerate()
            .try_fold(C::ZERO, |acc, (i, (xi, yi))| {
                let (num, den) = xs.iter().enumerate().filter(|(j, _)| *j != i).fold(
                    (Scalar::ONE, Scalar::ONE),
                    |(num, den), (_, (xj, _))| (num * *xj, den * (*xj - *xi)),
                );
                let inv = den.inverse().ok_or(Error::NoInverse)?;
                Ok(acc + *yi * (num * inv))
            })
    }
}

impl Private {
    /// Commits the scalar polynomial to the group by multiplying each coefficient with the
    /// generator.
    pub fn commit(&self) -> Public {
        Poly(self.0.iter().map(|coeff| Point::GENERATOR * *coeff).collect())
    }
}

impl<C: Element> Drop for Poly<C> {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(Element::clear);
    }
}

impl Write for Public {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for Public {
    /// Maximum number of coefficients.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        let coeffs = Vec::<Point>::read_cfg(buf, &(RangeCfg::from(1..=*max), ()))?;
        Ok(Self(coeffs))
    }
}

impl EncodeSize for Public {
    fn encode_size(&self) -> usize {
        self.0.encode_size()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use commonware_codec::{Decode, Encode};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn poly_required() {
        let mut rng = StdRng::seed_from_u64(0);
        let p = new_from(5, &mut rng);
        assert_eq!(p.required(), 6);
        assert_eq!(p.coefficients().len(), 6);
    }

    #[test]
    fn private_debug_redacted() {
        let mut rng = StdRng::seed_from_u64(7);
        let private = new_from(1, &mut rng);
        assert_eq!(format!("{private:?}"), "Poly([Scalar(..), Scalar(..)])");

        // Public coefficients stay visible
        let public = private.commit();
        assert!(format!("{public:?}").starts_with("Poly([Point("));
    }

    #[test]
    fn evaluate() {
        let mut rng = StdRng::seed_from_u64(0);
        for degree in 0..8u32 {
            let poly = new_from(degree, &mut rng);
            for id in 1..10u32 {
                let index = MemberId::new(id);
                let x = index.scalar();
                let mut expected = Scalar::ZERO;
                let mut power = Scalar::ONE;
                for coeff in poly.coefficients() {
                    expected += *coeff * power;
                    power *= x;
                }
                assert_eq!(poly.evaluate(index).value, expected, "degree={degree}");
            }
        }
    }

    #[test]
    fn commit_evaluate() {
        let mut rng = StdRng::seed_from_u64(1);
        let private = new_from(3, &mut rng);
        let public = private.commit();
        for id in 1..6u32 {
            let index = MemberId::new(id);
            assert_eq!(
                public.evaluate(index).value,
                Point::GENERATOR * private.evaluate(index).value
            );
        }
        assert_eq!(*public.constant(), Point::GENERATOR * *private.constant());
    }

    #[test]
    fn interpolation_insufficient_shares() {
        let mut rng = StdRng::seed_from_u64(2);
        let degree = 4;
        let threshold = degree as usize + 1;
        let poly = new_from(degree, &mut rng);
        let shares = (1..threshold as u32)
            .map(|i| poly.evaluate(MemberId::new(i)))
            .collect::<Vec<_>>();
        assert_eq!(
            Poly::recover(threshold, &shares),
            Err(Error::NotEnoughEvaluations(threshold - 1, threshold))
        );
    }

    #[test]
    fn interpolation() {
        let mut rng = StdRng::seed_from_u64(3);
        for degree in 0..10u32 {
            for num_evals in 1..12u32 {
                let poly = new_from(degree, &mut rng);
                let expected = *poly.constant();

                // Use sparse, unordered identifiers
                let shares = (1..=num_evals)
                    .rev()
                    .map(|i| poly.evaluate(MemberId::new(i * 3)))
                    .collect::<Vec<_>>();
                let recovered = Poly::recover(num_evals as usize, &shares).unwrap();
                if num_evals > degree {
                    assert_eq!(expected, recovered, "degree={degree}, num_evals={num_evals}");
                } else {
                    assert_ne!(expected, recovered, "degree={degree}, num_evals={num_evals}");
                }
            }
        }
    }

    #[test]
    fn interpolation_in_exponent() {
        let mut rng = StdRng::seed_from_u64(4);
        let private = new_from(2, &mut rng);
        let public = private.commit();
        let shares = [2u32, 5, 7]
            .into_iter()
            .map(|i| public.evaluate(MemberId::new(i)))
            .collect::<Vec<_>>();
        assert_eq!(Poly::recover(3, &shares).unwrap(), *public.constant());
    }

    #[test]
    fn interpolation_duplicate_index() {
        let mut rng = StdRng::seed_from_u64(5);
        let poly = new_from(1, &mut rng);
        let share = poly.evaluate(MemberId::new(4));
        let shares = vec![share.clone(), share];
        assert_eq!(
            Poly::recover(2, &shares),
            Err(Error::DuplicateEvaluation(MemberId::new(4)))
        );
    }

    #[test]
    fn test_codec() {
        let mut rng = StdRng::seed_from_u64(6);
        let public = new_from(5, &mut rng).commit();
        let encoded = public.encode();
        assert_eq!(encoded.len(), public.encode_size());
        assert_eq!(Public::decode_cfg(encoded.clone(), &6).unwrap(), public);

        // More coefficients than allowed
        assert!(matches!(
            Public::decode_cfg(encoded.freeze(), &5),
            Err(CodecError::InvalidLength(6))
        ));

        // No coefficients
        let empty = Vec::<Point>::new().encode();
        assert!(matches!(
            Public::decode_cfg(empty.freeze(), &6),
            Err(CodecError::InvalidLength(0))
        ));
    }
}
