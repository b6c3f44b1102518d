//! Messages broadcast between members during a DKG run.
//!
//! Every message carries its `sender`. Receivers drop any message whose embedded sender does not
//! match the transport-level sender.

use crate::{
    group::{map_size, read_map, read_set, set_size, write_map, write_set, MemberId},
    primitives::{
        ephemeral::{PrivateKey, PublicKey, NONCE_LENGTH, TAG_LENGTH},
        poly::Public,
        Scalar,
    },
    result::signing::ResultSignatureMessage,
};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, RangeCfg, Read, ReadExt, Write};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Largest ciphertext a dealer may send for one pair of [Shares].
pub const MAX_CIPHERTEXT_LENGTH: usize = NONCE_LENGTH + Shares::SIZE + TAG_LENGTH;

/// A pair of shares `(s = a(j), t = b(j))` dealt to member `j`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Shares {
    pub s: Scalar,
    pub t: Scalar,
}

impl fmt::Debug for Shares {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Shares(..)")
    }
}

impl Write for Shares {
    fn write(&self, buf: &mut impl BufMut) {
        self.s.write(buf);
        self.t.write(buf);
    }
}

impl Read for Shares {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let s = Scalar::read(buf)?;
        let t = Scalar::read(buf)?;
        Ok(Self { s, t })
    }
}

impl FixedSize for Shares {
    const SIZE: usize = 2 * Scalar::SIZE;
}

/// Evidence published by an accused dealer to refute an accusation.
///
/// Reveals the shares dealt to the accuser and the ephemeral private key the dealer generated
/// for the accuser, so any member can re-derive the symmetric key and decrypt the ciphertext
/// recorded in its evidence log.
#[derive(Clone, Debug)]
pub struct Justification {
    pub shares: Shares,
    pub ephemeral_key: PrivateKey,
}

impl Write for Justification {
    fn write(&self, buf: &mut impl BufMut) {
        self.shares.write(buf);
        self.ephemeral_key.write(buf);
    }
}

impl Read for Justification {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, Error> {
        let shares = Shares::read(buf)?;
        let ephemeral_key = PrivateKey::read(buf)?;
        Ok(Self {
            shares,
            ephemeral_key,
        })
    }
}

impl FixedSize for Justification {
    const SIZE: usize = Shares::SIZE + PrivateKey::SIZE;
}

/// Phase 1: one ephemeral public key per peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EphemeralPublicKeyMessage {
    pub sender: MemberId,
    pub keys: BTreeMap<MemberId, PublicKey>,
}

/// Phase 3: encrypted shares, one ciphertext per receiver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSharesMessage {
    pub sender: MemberId,
    pub shares: BTreeMap<MemberId, Vec<u8>>,
}

/// Phase 3: Pedersen commitments to the sender's polynomials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberCommitmentsMessage {
    pub sender: MemberId,
    pub commitments: Public,
}

/// Phase 4: dealers whose shares did not verify against their commitments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharesAccusationsMessage {
    pub sender: MemberId,
    pub accused: BTreeSet<MemberId>,
}

/// Phase 5: justifications keyed by accuser.
#[derive(Clone, Debug)]
pub struct SharesJustificationMessage {
    pub sender: MemberId,
    pub justifications: BTreeMap<MemberId, Justification>,
}

/// Phase 7: public key share points (`A_k = G*a_k`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKeySharePointsMessage {
    pub sender: MemberId,
    pub points: Public,
}

/// Phase 8: dealers whose points did not verify against the shares received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointsAccusationsMessage {
    pub sender: MemberId,
    pub accused: BTreeSet<MemberId>,
}

/// Phase 9: justifications keyed by accuser.
#[derive(Clone, Debug)]
pub struct PointsJustificationMessage {
    pub sender: MemberId,
    pub justifications: BTreeMap<MemberId, Justification>,
}

/// Phase 10: shares received from members disqualified after qualification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisqualifiedSharesMessage {
    pub sender: MemberId,
    pub shares: BTreeMap<MemberId, Shares>,
}

/// Round a [Message] belongs to, in protocol order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Round {
    EphemeralPublicKey,
    PeerShares,
    Commitments,
    SharesAccusations,
    SharesJustification,
    PublicKeySharePoints,
    PointsAccusations,
    PointsJustification,
    DisqualifiedShares,
    ResultSignature,
}

/// Any message sent during a DKG run.
#[derive(Clone, Debug)]
pub enum Message {
    EphemeralPublicKey(EphemeralPublicKeyMessage),
    PeerShares(PeerSharesMessage),
    Commitments(MemberCommitmentsMessage),
    SharesAccusations(SharesAccusationsMessage),
    SharesJustification(SharesJustificationMessage),
    PublicKeySharePoints(PublicKeySharePointsMessage),
    PointsAccusations(PointsAccusationsMessage),
    PointsJustification(PointsJustificationMessage),
    DisqualifiedShares(DisqualifiedSharesMessage),
    ResultSignature(ResultSignatureMessage),
}

impl Message {
    /// The member that created the message.
    pub fn sender(&self) -> MemberId {
        match self {
            Message::EphemeralPublicKey(msg) => msg.sender,
            Message::PeerShares(msg) => msg.sender,
            Message::Commitments(msg) => msg.sender,
            Message::SharesAccusations(msg) => msg.sender,
            Message::SharesJustification(msg) => msg.sender,
            Message::PublicKeySharePoints(msg) => msg.sender,
            Message::PointsAccusations(msg) => msg.sender,
            Message::PointsJustification(msg) => msg.sender,
            Message::DisqualifiedShares(msg) => msg.sender,
            Message::ResultSignature(msg) => msg.sender,
        }
    }

    /// The round the message belongs to.
    pub fn round(&self) -> Round {
        match self {
            Message::EphemeralPublicKey(_) => Round::EphemeralPublicKey,
            Message::PeerShares(_) => Round::PeerShares,
            Message::Commitments(_) => Round::Commitments,
            Message::SharesAccusations(_) => Round::SharesAccusations,
            Message::SharesJustification(_) => Round::SharesJustification,
            Message::PublicKeySharePoints(_) => Round::PublicKeySharePoints,
            Message::PointsAccusations(_) => Round::PointsAccusations,
            Message::PointsJustification(_) => Round::PointsJustification,
            Message::DisqualifiedShares(_) => Round::DisqualifiedShares,
            Message::ResultSignature(_) => Round::ResultSignature,
        }
    }
}

impl Write for Message {
    fn write(&self, buf: &mut impl BufMut) {
        (self.round() as u8).write(buf);
        self.sender().write(buf);
        match self {
            Message::EphemeralPublicKey(msg) => write_map(&msg.keys, buf),
            Message::PeerShares(msg) => write_map(&msg.shares, buf),
            Message::Commitments(msg) => msg.commitments.write(buf),
            Message::SharesAccusations(msg) => write_set(&msg.accused, buf),
            Message::SharesJustification(msg) => write_map(&msg.justifications, buf),
            Message::PublicKeySharePoints(msg) => msg.points.write(buf),
            Message::PointsAccusations(msg) => write_set(&msg.accused, buf),
            Message::PointsJustification(msg) => write_map(&msg.justifications, buf),
            Message::DisqualifiedShares(msg) => write_map(&msg.shares, buf),
            Message::ResultSignature(msg) => {
                msg.digest.write(buf);
                msg.signature.write(buf);
            }
        }
    }
}

impl Read for Message {
    /// Size of the group, which bounds every collection in a message.
    type Cfg = usize;

    fn read_cfg(buf: &mut impl Buf, max: &usize) -> Result<Self, Error> {
        let max = *max;
        let tag = u8::read(buf)?;
        let sender = MemberId::read(buf)?;
        let msg = match tag {
            0 => Message::EphemeralPublicKey(EphemeralPublicKeyMessage {
                sender,
                keys: read_map(buf, max, &())?,
            }),
            1 => Message::PeerShares(PeerSharesMessage {
                sender,
                shares: read_map(buf, max, &(RangeCfg::from(0..=MAX_CIPHERTEXT_LENGTH), ()))?,
            }),
            2 => Message::Commitments(MemberCommitmentsMessage {
                sender,
                commitments: Public::read_cfg(buf, &max)?,
            }),
            3 => Message::SharesAccusations(SharesAccusationsMessage {
                sender,
                accused: read_set(buf, max)?,
            }),
            4 => Message::SharesJustification(SharesJustificationMessage {
                sender,
                justifications: read_map(buf, max, &())?,
            }),
            5 => Message::PublicKeySharePoints(PublicKeySharePointsMessage {
                sender,
                points: Public::read_cfg(buf, &max)?,
            }),
            6 => Message::PointsAccusations(PointsAccusationsMessage {
                sender,
                accused: read_set(buf, max)?,
            }),
            7 => Message::PointsJustification(PointsJustificationMessage {
                sender,
                justifications: read_map(buf, max, &())?,
            }),
            8 => Message::DisqualifiedShares(DisqualifiedSharesMessage {
                sender,
                shares: read_map(buf, max, &())?,
            }),
            9 => Message::ResultSignature(ResultSignatureMessage {
                sender,
                digest: ReadExt::read(buf)?,
                signature: ReadExt::read(buf)?,
            }),
            tag => return Err(Error::InvalidEnum(tag)),
        };
        Ok(msg)
    }
}

impl EncodeSize for Message {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + MemberId::SIZE
            + match self {
                Message::EphemeralPublicKey(msg) => map_size(&msg.keys),
                Message::PeerShares(msg) => map_size(&msg.shares),
                Message::Commitments(msg) => msg.commitments.encode_size(),
                Message::SharesAccusations(msg) => set_size(&msg.accused),
                Message::SharesJustification(msg) => map_size(&msg.justifications),
                Message::PublicKeySharePoints(msg) => msg.points.encode_size(),
                Message::PointsAccusations(msg) => set_size(&msg.accused),
                Message::PointsJustification(msg) => map_size(&msg.justifications),
                Message::DisqualifiedShares(msg) => map_size(&msg.shares),
                Message::ResultSignature(msg) => {
                    msg.digest.encode_size() + msg.signature.encode_size()
                }
            }
    }
}
