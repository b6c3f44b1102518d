//! The outcome of a DKG run and its on-chain publication.
//!
//! Members that completed the protocol sign the digest of their [DkgResult] ([signing]) and then
//! race, in a block-height staggered order, to submit it ([submission]).

use crate::{
    chain,
    group::{read_set, set_size, write_set, MemberId},
    primitives::Point,
};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::sha256::{hash, Digest};
use commonware_utils::union_unique;
use std::{collections::BTreeSet, fmt};
use thiserror::Error;

pub mod signing;
pub mod submission;

/// Domain separator hashed ahead of an encoded [DkgResult].
const DIGEST_NAMESPACE: &[u8] = b"_BEACON_DKG_RESULT";

/// Identifier of the DKG request a result answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a DKG run produced, as agreed by honest members.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DkgResult {
    pub group_public_key: Point,
    pub disqualified: BTreeSet<MemberId>,
    pub inactive: BTreeSet<MemberId>,
}

impl DkgResult {
    /// The digest members sign.
    pub fn digest(&self) -> Digest {
        hash(&union_unique(DIGEST_NAMESPACE, &self.encode()))
    }
}

impl Write for DkgResult {
    fn write(&self, buf: &mut impl BufMut) {
        self.group_public_key.write(buf);
        write_set(&self.disqualified, buf);
        write_set(&self.inactive, buf);
    }
}

impl Read for DkgResult {
    /// Maximum number of members in either set.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, CodecError> {
        Ok(Self {
            group_public_key: Point::read(buf)?,
            disqualified: read_set(buf, *max)?,
            inactive: read_set(buf, *max)?,
        })
    }
}

impl EncodeSize for DkgResult {
    fn encode_size(&self) -> usize {
        Point::SIZE + set_size(&self.disqualified) + set_size(&self.inactive)
    }
}

/// Errors that can occur while signing or publishing a result.
#[derive(Error, Debug)]
pub enum Error {
    #[error("insufficient signatures: {have} < {need}")]
    InsufficientSignatures { have: usize, need: usize },
    #[error("invalid signature from {0}")]
    InvalidSignature(MemberId),
    #[error("unknown signer: {0}")]
    UnknownSigner(MemberId),
    #[error("signature from {0} is over a different result")]
    DigestMismatch(MemberId),
    #[error("duplicate signature from {0}")]
    DuplicateSignature(MemberId),
    #[error("chain error: {0}")]
    Chain(#[from] chain::Error),
}
