//! Operator signatures over a [super::DkgResult].
//!
//! Operators sign the result digest with their secp256r1 keys under [NAMESPACE]. The scheme
//! signs deterministically and only accepts low-`s` signatures, so each signer has exactly one
//! valid signature per digest.

use super::Error;
use crate::group::MemberId;
use commonware_cryptography::{
    secp256r1::{PrivateKey, PublicKey, Signature},
    sha256::Digest,
    Signer as _, Verifier as _,
};
use std::collections::{btree_map::Entry, BTreeMap};
use tracing::debug;

/// Namespace result signatures are bound to.
pub const NAMESPACE: &[u8] = b"_BEACON_DKG_RESULT_SIGNATURE";

/// Operator keys that may sign results, keyed by member.
pub type Operators = BTreeMap<MemberId, PublicKey>;

/// Signatures over the same result digest, keyed by signer.
pub type Signatures = BTreeMap<MemberId, Signature>;

/// A member's signature over the digest of its result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultSignatureMessage {
    pub sender: MemberId,
    pub digest: Digest,
    pub signature: Signature,
}

/// Sign `digest` with `key`.
pub fn sign(key: &PrivateKey, digest: &Digest) -> Signature {
    key.sign(Some(NAMESPACE), digest.as_ref())
}

/// Verify a signature over `digest`.
pub fn verify(key: &PublicKey, digest: &Digest, signature: &Signature) -> bool {
    key.verify(Some(NAMESPACE), digest.as_ref(), signature)
}

/// Check that `signatures` holds at least `required` valid signatures over `digest` from
/// known operators.
pub fn verify_signatures(
    operators: &Operators,
    digest: &Digest,
    signatures: &Signatures,
    required: usize,
) -> Result<(), Error> {
    for (signer, signature) in signatures {
        let key = operators.get(signer).ok_or(Error::UnknownSigner(*signer))?;
        if !verify(key, digest, signature) {
            return Err(Error::InvalidSignature(*signer));
        }
    }
    if signatures.len() < required {
        return Err(Error::InsufficientSignatures {
            have: signatures.len(),
            need: required,
        });
    }
    Ok(())
}

/// Accumulates valid signatures over one digest.
pub struct Collector {
    digest: Digest,
    operators: Operators,
    signatures: Signatures,
}

impl Collector {
    pub fn new(digest: Digest, operators: Operators) -> Self {
        Self {
            digest,
            operators,
            signatures: Signatures::new(),
        }
    }

    /// Add a signature, keeping the first valid one from each signer.
    pub fn add(&mut self, message: ResultSignatureMessage) -> Result<(), Error> {
        let signer = message.sender;
        let key = self
            .operators
            .get(&signer)
            .ok_or(Error::UnknownSigner(signer))?;
        if message.digest != self.digest {
            return Err(Error::DigestMismatch(signer));
        }
        if !verify(key, &self.digest, &message.signature) {
            return Err(Error::InvalidSignature(signer));
        }
        match self.signatures.entry(signer) {
            Entry::Vacant(entry) => {
                entry.insert(message.signature);
                debug!(%signer, "collected result signature");
                Ok(())
            }
            Entry::Occupied(_) => Err(Error::DuplicateSignature(signer)),
        }
    }

    /// Return the collected signatures if there are at least `required`.
    pub fn finalize(self, required: usize) -> Result<Signatures, Error> {
        if self.signatures.len() < required {
            return Err(Error::InsufficientSignatures {
                have: self.signatures.len(),
                need: required,
            });
        }
        Ok(self.signatures)
    }
}
