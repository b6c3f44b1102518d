//! Decide which side of an accusation is disqualified.
//!
//! Every member runs the same deterministic checks on the same broadcast evidence, so all honest
//! members reach the same verdict. Exactly one of the accuser and the accused loses.

use crate::{
    gjkr::{
        evidence::EvidenceLog,
        message::{Justification, Shares},
    },
    group::MemberId,
    primitives::{ephemeral, pedersen::Vss, poly::Public},
};
use commonware_codec::DecodeExt;
use tracing::debug;

/// Reason an accused member failed to justify itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// No justification was published for the accusation.
    Missing,
    /// The revealed ephemeral private key does not match the published public key.
    KeyMismatch,
    /// The accused never dealt a ciphertext to the accuser.
    MissingCiphertext,
    /// The recorded ciphertext cannot be decrypted with the revealed key.
    Undecryptable,
    /// The decrypted shares differ from the revealed shares.
    SharesMismatch,
    /// The revealed shares do not verify against the commitments.
    InvalidShares,
    /// The revealed share does not verify against the public key share points.
    InvalidPoints,
}

/// Outcome of resolving one accusation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The accused justified itself: the accuser lied.
    AccuserLied,
    /// The accused failed to justify itself.
    AccusedFaulty(Fault),
}

impl Verdict {
    /// The member to disqualify.
    pub fn loser(&self, accuser: MemberId, accused: MemberId) -> MemberId {
        match self {
            Verdict::AccuserLied => accuser,
            Verdict::AccusedFaulty(_) => accused,
        }
    }
}

/// Resolve the accusation of `accuser` against `accused`.
///
/// The justification must reveal the ephemeral private key `accused` generated for `accuser`,
/// and the shares it dealt to `accuser`. The shares must match the recorded ciphertext and
/// verify against `commitments` (and, when resolving a points accusation, against `points`).
pub fn resolve(
    vss: &Vss,
    evidence: &EvidenceLog,
    accuser: MemberId,
    accused: MemberId,
    commitments: &Public,
    points: Option<&Public>,
    justification: Option<&Justification>,
) -> Verdict {
    let verdict = match check(
        vss,
        evidence,
        accuser,
        accused,
        commitments,
        points,
        justification,
    ) {
        Ok(()) => Verdict::AccuserLied,
        Err(fault) => Verdict::AccusedFaulty(fault),
    };
    debug!(%accuser, %accused, ?verdict, "resolved accusation");
    verdict
}

fn check(
    vss: &Vss,
    evidence: &EvidenceLog,
    accuser: MemberId,
    accused: MemberId,
    commitments: &Public,
    points: Option<&Public>,
    justification: Option<&Justification>,
) -> Result<(), Fault> {
    let justification = justification.ok_or(Fault::Missing)?;

    // The revealed key must be the one published for the accuser
    let revealed = justification.ephemeral_key.public_key();
    if evidence.ephemeral_public_key(accused, accuser) != Some(&revealed) {
        return Err(Fault::KeyMismatch);
    }

    // Rebuild the symmetric key from the accuser's published key
    let ciphertext = evidence
        .peer_shares(accused, accuser)
        .ok_or(Fault::MissingCiphertext)?;
    let accuser_key = evidence
        .ephemeral_public_key(accuser, accused)
        .ok_or(Fault::Undecryptable)?;
    let key = ephemeral::derive(&justification.ephemeral_key, accuser_key);
    let plaintext = key.decrypt(ciphertext).map_err(|_| Fault::Undecryptable)?;
    let dealt = Shares::decode(plaintext.as_slice()).map_err(|_| Fault::Undecryptable)?;
    if dealt != justification.shares {
        return Err(Fault::SharesMismatch);
    }

    // The dealt shares must be valid
    let Shares { s, t } = &justification.shares;
    if !vss.verify(commitments, accuser, s, t) {
        return Err(Fault::InvalidShares);
    }
    if let Some(points) = points {
        if !vss.verify_points(points, accuser, s) {
            return Err(Fault::InvalidPoints);
        }
    }
    Ok(())
}
