//! Gennaro-Jarecki-Krawczyk-Rabin Distributed Key Generation with Pedersen VSS.
//!
//! # Phases
//!
//! | Phase | Stage                                     | Broadcast                           |
//! |-------|-------------------------------------------|-------------------------------------|
//! | 1     | [member::EphemeralKeyPairGeneratingMember] | ephemeral public key per peer       |
//! | 2     | [member::SymmetricKeyGeneratingMember]    |                                     |
//! | 3     | [member::CommittingMember]                | encrypted shares, commitments       |
//! | 4     | [member::CommitmentsVerifyingMember]      | shares accusations                  |
//! | 5     | [member::SharesJustifyingMember]          | shares justifications               |
//! | 6     | [member::QualifiedMember]                 |                                     |
//! | 7     | [member::SharingMember]                   | public key share points             |
//! | 8     | [member::PointsVerifyingMember]           | points accusations                  |
//! | 9     | [member::PointsJustifyingMember]          | points justifications               |
//! | 10    | [member::RevealingMember]                 | shares of misbehaving members       |
//! | 11    | [member::ReconstructingMember]            |                                     |
//! | 12    | [member::CombiningMember]                 |                                     |
//!
//! Every member broadcasts exactly one message per round (possibly empty), so receivers know
//! when a round is complete. A member that does not send a required message before the round's
//! deadline is marked inactive.
//!
//! # Accusations
//!
//! Shares are dealt encrypted under a key derived from single-use ephemeral key pairs. A member
//! that receives shares that do not verify accuses the dealer, and the dealer must reveal both
//! the shares and its ephemeral private key for that pair. Every member re-derives the pairwise
//! key, decrypts the ciphertext it recorded in its [evidence::EvidenceLog] and checks the revealed
//! shares, so a dealer can neither lie about what it sent nor frame an honest accuser. Exactly one
//! of the accuser and the accused is disqualified.
//!
//! # Reconstruction
//!
//! Members disqualified before qualification (phase 6) do not contribute to the group key.
//! Members that qualified but were later disqualified or went silent do: their individual
//! private keys are reconstructed from the shares the remaining members reveal in phase 10.

use crate::{group::MemberId, primitives};
use thiserror::Error;

pub mod evidence;
pub mod member;
pub mod message;
pub mod resolver;

/// Errors that abort a member's run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("member {0} is not part of the group")]
    NotMember(MemberId),
    #[error("insufficient honest members: {qualified} < {required}")]
    InsufficientHonestMembers { qualified: usize, required: usize },
    #[error("disqualified")]
    Disqualified,
    #[error("missing shares from qualified member {0}")]
    MissingShares(MemberId),
    #[error("reconstruction of member {member} failed: {source}")]
    ReconstructionFailed {
        member: MemberId,
        source: primitives::Error,
    },
    #[error("primitive error: {0}")]
    Primitives(#[from] primitives::Error),
}
