//! Cryptographic building blocks over the NIST P-256 curve.
//!
//! * [group]: the [Scalar] and [Point] types and their encodings.
//! * [poly]: secret polynomials, polynomials "in the exponent", and Lagrange recovery at zero.
//! * [pedersen]: Pedersen commitments (`C_k = G*a_k + H*b_k`) and the [pedersen::Vss] parameters.
//! * [ephemeral]: per-pair ephemeral ECDH keys and the symmetric cipher used to deliver shares.

use crate::group::MemberId;
use thiserror::Error;

pub mod ephemeral;
pub mod group;
pub mod pedersen;
pub mod poly;

pub use group::{Point, Scalar};

/// Errors that can occur when working with cryptographic primitives.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("not enough evaluations: {0} < {1}")]
    NotEnoughEvaluations(usize, usize),
    #[error("duplicate evaluation: {0}")]
    DuplicateEvaluation(MemberId),
    #[error("no inverse")]
    NoInverse,
    #[error("hash to curve failed")]
    HashToCurve,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
}
