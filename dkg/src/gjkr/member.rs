//! One type per protocol phase.
//!
//! A member starts as an [EphemeralKeyPairGeneratingMember] and ends as a [CombiningMember].
//! Every `initialize_*` transition consumes the current stage, processes the messages collected
//! for the previous round and returns the next stage. Protocol violations by peers never fail a
//! transition: they become accusations, disqualifications or inactivity marks carried forward.

use crate::{
    gjkr::{
        evidence::EvidenceLog,
        message::{
            DisqualifiedSharesMessage, EphemeralPublicKeyMessage, Justification,
            MemberCommitmentsMessage, PeerSharesMessage, PointsAccusationsMessage,
            PointsJustificationMessage, PublicKeySharePointsMessage, SharesAccusationsMessage,
            SharesJustificationMessage, Shares,
        },
        resolver, Error,
    },
    group::{Group, MemberId},
    primitives::{
        ephemeral::{KeyPair, SymmetricKey},
        pedersen::{self, Vss},
        poly::{self, Eval, Poly, Public},
        Error as PrimitivesError, Point, Scalar,
    },
    result::DkgResult,
};
use commonware_codec::{DecodeExt, FixedSize, Write};
use rand::{CryptoRng, RngCore};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Messages that name their creator.
trait Authored {
    fn sender(&self) -> MemberId;
}

macro_rules! impl_authored {
    ($($message:ty),+ $(,)?) => {
        $(
            impl Authored for $message {
                fn sender(&self) -> MemberId {
                    self.sender
                }
            }
        )+
    };
}

impl_authored!(
    EphemeralPublicKeyMessage,
    PeerSharesMessage,
    MemberCommitmentsMessage,
    SharesAccusationsMessage,
    SharesJustificationMessage,
    PublicKeySharePointsMessage,
    PointsAccusationsMessage,
    PointsJustificationMessage,
    DisqualifiedSharesMessage,
);

/// Accusations as `(accuser, accused)` pairs.
type Accusations = BTreeSet<(MemberId, MemberId)>;

/// State every stage carries.
struct Core {
    id: MemberId,
    group: Group,
    vss: Vss,
    evidence: EvidenceLog,
    disqualified: BTreeSet<MemberId>,
    inactive: BTreeSet<MemberId>,
}

impl Core {
    fn is_operating(&self, member: &MemberId) -> bool {
        !self.disqualified.contains(member) && !self.inactive.contains(member)
    }

    fn operating_peers(&self) -> BTreeSet<MemberId> {
        self.group
            .peers(self.id)
            .filter(|peer| self.is_operating(peer))
            .collect()
    }

    fn disqualify(&mut self, member: MemberId, reason: &'static str) {
        if self.disqualified.insert(member) {
            warn!(me = %self.id, %member, reason, "disqualified member");
        }
    }

    fn mark_inactive(&mut self, member: MemberId, round: &'static str) {
        if !self.disqualified.contains(&member) && self.inactive.insert(member) {
            warn!(me = %self.id, %member, round, "member inactive");
        }
    }

    /// Index messages by sender, keeping the first message from each operating peer.
    fn index<M: Authored>(&self, round: &'static str, messages: Vec<M>) -> BTreeMap<MemberId, M> {
        let mut indexed = BTreeMap::new();
        for message in messages {
            let sender = message.sender();
            if sender == self.id || !self.group.contains(&sender) {
                warn!(me = %self.id, %sender, round, "ignoring message from unexpected sender");
                continue;
            }
            if !self.is_operating(&sender) {
                debug!(me = %self.id, %sender, round, "ignoring message from excluded member");
                continue;
            }
            if indexed.contains_key(&sender) {
                warn!(me = %self.id, %sender, round, "ignoring duplicate message");
                continue;
            }
            indexed.insert(sender, message);
        }
        indexed
    }

    /// Collect accusations between operating members, including our own.
    fn accusations(
        &self,
        round: &'static str,
        own: &BTreeSet<MemberId>,
        received: impl IntoIterator<Item = (MemberId, BTreeSet<MemberId>)>,
    ) -> Accusations {
        let mut accusations = Accusations::new();
        let all = received.into_iter().chain([(self.id, own.clone())]);
        for (accuser, accused) in all {
            for accused in accused {
                if accused == accuser {
                    warn!(me = %self.id, %accuser, round, "ignoring self-accusation");
                    continue;
                }
                if !self.group.contains(&accused) {
                    warn!(me = %self.id, %accuser, %accused, round, "ignoring accusation against non-member");
                    continue;
                }
                if !self.is_operating(&accused) {
                    debug!(me = %self.id, %accuser, %accused, round, "ignoring accusation against excluded member");
                    continue;
                }
                accusations.insert((accuser, accused));
            }
        }
        accusations
    }

    /// Justify every accusation raised against us.
    fn justify(
        &self,
        accusations: &Accusations,
        dealt: &BTreeMap<MemberId, Shares>,
        ephemeral_keys: &BTreeMap<MemberId, KeyPair>,
    ) -> BTreeMap<MemberId, Justification> {
        accusations
            .iter()
            .filter(|(_, accused)| *accused == self.id)
            .filter_map(|(accuser, _)| {
                let shares = dealt.get(accuser)?;
                let key = ephemeral_keys.get(accuser)?;
                Some((
                    *accuser,
                    Justification {
                        shares: shares.clone(),
                        ephemeral_key: key.secret().clone(),
                    },
                ))
            })
            .collect()
    }

    /// Resolve all accusations and disqualify every loser.
    ///
    /// Verdicts are computed against the state before any of them is applied, so the outcome
    /// does not depend on the order accusations are processed in.
    fn resolve(
        &mut self,
        accusations: &Accusations,
        justifications: &BTreeMap<MemberId, BTreeMap<MemberId, Justification>>,
        commitments: &BTreeMap<MemberId, Public>,
        points: Option<&BTreeMap<MemberId, Public>>,
    ) -> Result<(), Error> {
        let mut losers = BTreeSet::new();
        for (accuser, accused) in accusations {
            let Some(accused_commitments) = commitments.get(accused) else {
                losers.insert(*accused);
                continue;
            };
            let accused_points = match points.map(|points| points.get(accused)) {
                Some(None) => {
                    losers.insert(*accused);
                    continue;
                }
                Some(Some(points)) => Some(points),
                None => None,
            };
            let justification = justifications
                .get(accused)
                .and_then(|justifications| justifications.get(accuser));
            let verdict = resolver::resolve(
                &self.vss,
                &self.evidence,
                *accuser,
                *accused,
                accused_commitments,
                accused_points,
                justification,
            );
            losers.insert(verdict.loser(*accuser, *accused));
        }
        for loser in &losers {
            self.disqualify(*loser, "lost accusation");
        }
        if losers.contains(&self.id) {
            return Err(Error::Disqualified);
        }
        Ok(())
    }
}

/// Decrypt and parse the shares a peer dealt to us.
fn open(key: Option<&SymmetricKey>, ciphertext: Option<&Vec<u8>>) -> Option<Shares> {
    let plaintext = key?.decrypt(ciphertext?).ok()?;
    Shares::decode(plaintext.as_slice()).ok()
}

macro_rules! stage {
    ($($stage:ident),+ $(,)?) => {
        $(
            impl $stage {
                /// This member's identifier.
                pub fn id(&self) -> MemberId {
                    self.core.id
                }

                /// The group this member belongs to.
                pub fn group(&self) -> &Group {
                    &self.core.group
                }

                /// Peers that are neither disqualified nor inactive.
                pub fn operating_peers(&self) -> BTreeSet<MemberId> {
                    self.core.operating_peers()
                }

                /// Members disqualified so far.
                pub fn disqualified(&self) -> &BTreeSet<MemberId> {
                    &self.core.disqualified
                }

                /// Members that failed to send a required message so far.
                pub fn inactive(&self) -> &BTreeSet<MemberId> {
                    &self.core.inactive
                }
            }
        )+
    };
}

stage!(
    EphemeralKeyPairGeneratingMember,
    SymmetricKeyGeneratingMember,
    CommittingMember,
    CommitmentsVerifyingMember,
    SharesJustifyingMember,
    QualifiedMember,
    SharingMember,
    PointsVerifyingMember,
    PointsJustifyingMember,
    RevealingMember,
    ReconstructingMember,
    CombiningMember,
);

/// Phase 1: generate one ephemeral key pair per peer.
pub struct EphemeralKeyPairGeneratingMember {
    core: Core,
    ephemeral_keys: BTreeMap<MemberId, KeyPair>,
}

impl EphemeralKeyPairGeneratingMember {
    /// Create a member of `group`.
    pub fn new<R: RngCore + CryptoRng>(
        id: MemberId,
        group: Group,
        vss: Vss,
        rng: &mut R,
    ) -> Result<Self, Error> {
        if !group.contains(&id) {
            return Err(Error::NotMember(id));
        }
        let ephemeral_keys = group
            .peers(id)
            .map(|peer| (peer, KeyPair::generate(rng)))
            .collect();
        Ok(Self {
            core: Core {
                id,
                group,
                vss,
                evidence: EvidenceLog::default(),
                disqualified: BTreeSet::new(),
                inactive: BTreeSet::new(),
            },
            ephemeral_keys,
        })
    }

    pub fn ephemeral_public_key_message(&self) -> EphemeralPublicKeyMessage {
        EphemeralPublicKeyMessage {
            sender: self.core.id,
            keys: self
                .ephemeral_keys
                .iter()
                .map(|(peer, pair)| (*peer, pair.public().clone()))
                .collect(),
        }
    }

    /// Phase 2: derive a symmetric key with every peer that published ephemeral keys.
    ///
    /// Peers that sent nothing are marked inactive. Peers whose message does not carry a key
    /// for every other member are disqualified.
    pub fn initialize_symmetric_key_generation(
        self,
        messages: Vec<EphemeralPublicKeyMessage>,
    ) -> SymmetricKeyGeneratingMember {
        let own = self.ephemeral_public_key_message();
        let Self {
            mut core,
            ephemeral_keys,
        } = self;
        core.evidence.put_ephemeral_public_keys(own);

        let received = core.index("ephemeral public key", messages);
        let mut symmetric_keys = BTreeMap::new();
        for peer in core.operating_peers() {
            let Some(message) = received.get(&peer) else {
                core.mark_inactive(peer, "ephemeral public key");
                continue;
            };
            let complete = message.keys.len() == core.group.size() - 1
                && core.group.peers(peer).all(|other| message.keys.contains_key(&other));
            if !complete {
                core.disqualify(peer, "incomplete ephemeral public keys");
                continue;
            }
            let (Some(pair), Some(peer_key)) =
                (ephemeral_keys.get(&peer), message.keys.get(&core.id))
            else {
                continue;
            };
            symmetric_keys.insert(peer, pair.derive(peer_key));
        }
        for message in received.into_values() {
            core.evidence.put_ephemeral_public_keys(message);
        }
        debug!(me = %core.id, peers = symmetric_keys.len(), "derived symmetric keys");

        SymmetricKeyGeneratingMember {
            core,
            ephemeral_keys,
            symmetric_keys,
        }
    }
}

/// Phase 2: symmetric keys derived.
pub struct SymmetricKeyGeneratingMember {
    core: Core,
    ephemeral_keys: BTreeMap<MemberId, KeyPair>,
    symmetric_keys: BTreeMap<MemberId, SymmetricKey>,
}

impl SymmetricKeyGeneratingMember {
    /// Phase 3: sample the secret polynomials, commit to them and deal shares.
    ///
    /// The polynomial coefficients are dropped (and zeroized) before returning.
    pub fn initialize_committing<R: RngCore + CryptoRng>(
        self,
        rng: &mut R,
    ) -> Result<CommittingMember, Error> {
        let Self {
            core,
            ephemeral_keys,
            symmetric_keys,
        } = self;
        let a = poly::new_from(core.group.dishonest_threshold(), rng);
        let b = poly::new_from(core.group.dishonest_threshold(), rng);
        let commitments = core.vss.commit(&a, &b);
        let points = a.commit();
        let deal = |member: MemberId| Shares {
            s: a.evaluate(member).value,
            t: b.evaluate(member).value,
        };

        let self_shares = deal(core.id);
        let mut dealt = BTreeMap::new();
        let mut ciphertexts = BTreeMap::new();
        for (peer, key) in &symmetric_keys {
            let shares = deal(*peer);
            let mut plaintext = Zeroizing::new(Vec::with_capacity(Shares::SIZE));
            shares.write(&mut *plaintext);
            ciphertexts.insert(*peer, key.encrypt(rng, &plaintext)?);
            dealt.insert(*peer, shares);
        }
        drop(a);
        drop(b);
        debug!(me = %core.id, dealt = dealt.len(), "committed to polynomials");

        Ok(CommittingMember {
            core,
            ephemeral_keys,
            symmetric_keys,
            self_shares,
            dealt,
            commitments,
            points,
            ciphertexts,
        })
    }
}

/// Phase 3: polynomials committed and shares dealt.
pub struct CommittingMember {
    core: Core,
    ephemeral_keys: BTreeMap<MemberId, KeyPair>,
    symmetric_keys: BTreeMap<MemberId, SymmetricKey>,
    self_shares: Shares,
    dealt: BTreeMap<MemberId, Shares>,
    commitments: Public,
    points: Public,
    ciphertexts: BTreeMap<MemberId, Vec<u8>>,
}

impl CommittingMember {
    pub fn peer_shares_message(&self) -> PeerSharesMessage {
        PeerSharesMessage {
            sender: self.core.id,
            shares: self.ciphertexts.clone(),
        }
    }

    pub fn commitments_message(&self) -> MemberCommitmentsMessage {
        MemberCommitmentsMessage {
            sender: self.core.id,
            commitments: self.commitments.clone(),
        }
    }

    /// Phase 4: verify the shares dealt to us against each dealer's commitments.
    ///
    /// Dealers missing either message are marked inactive. Dealers whose commitments have the
    /// wrong degree are disqualified. Dealers whose shares cannot be decrypted or do not verify
    /// are accused.
    pub fn initialize_commitments_verification(
        self,
        shares: Vec<PeerSharesMessage>,
        commitments: Vec<MemberCommitmentsMessage>,
    ) -> CommitmentsVerifyingMember {
        let own = self.peer_shares_message();
        let Self {
            mut core,
            ephemeral_keys,
            symmetric_keys,
            self_shares,
            dealt,
            commitments: own_commitments,
            points,
            ciphertexts: _,
        } = self;
        core.evidence.put_peer_shares(own);

        let shares = core.index("peer shares", shares);
        let mut received_commitments = core.index("commitments", commitments);
        let mut all_commitments = BTreeMap::from([(core.id, own_commitments)]);
        let mut received = BTreeMap::new();
        let mut accused = BTreeSet::new();
        for peer in core.operating_peers() {
            let (Some(sealed), Some(commitments)) =
                (shares.get(&peer), received_commitments.remove(&peer))
            else {
                core.mark_inactive(peer, "commitments");
                continue;
            };
            let commitments = commitments.commitments;
            if commitments.required() != core.group.quorum() {
                core.disqualify(peer, "invalid commitments degree");
                continue;
            }
            match open(symmetric_keys.get(&peer), sealed.shares.get(&core.id)) {
                Some(opened) if core.vss.verify(&commitments, core.id, &opened.s, &opened.t) => {
                    received.insert(peer, opened);
                }
                _ => {
                    warn!(me = %core.id, %peer, "invalid shares");
                    accused.insert(peer);
                }
            }
            all_commitments.insert(peer, commitments);
        }
        for message in shares.into_values() {
            core.evidence.put_peer_shares(message);
        }
        debug!(me = %core.id, valid = received.len(), accused = accused.len(), "verified shares");

        CommitmentsVerifyingMember {
            core,
            ephemeral_keys,
            self_shares,
            dealt,
            commitments: all_commitments,
            points,
            received,
            accused,
        }
    }
}

/// Phase 4: shares verified.
pub struct CommitmentsVerifyingMember {
    core: Core,
    ephemeral_keys: BTreeMap<MemberId, KeyPair>,
    self_shares: Shares,
    dealt: BTreeMap<MemberId, Shares>,
    commitments: BTreeMap<MemberId, Public>,
    points: Public,
    received: BTreeMap<MemberId, Shares>,
    accused: BTreeSet<MemberId>,
}

impl CommitmentsVerifyingMember {
    pub fn accusations_message(&self) -> SharesAccusationsMessage {
        SharesAccusationsMessage {
            sender: self.core.id,
            accused: self.accused.clone(),
        }
    }

    /// Phase 5: gather every accusation and justify the ones raised against us.
    pub fn initialize_shares_justification(
        self,
        messages: Vec<SharesAccusationsMessage>,
    ) -> SharesJustifyingMember {
        let received = self.core.index("shares accusations", messages);
        let accusations = self.core.accusations(
            "shares accusations",
            &self.accused,
            received
                .into_values()
                .map(|message| (message.sender, message.accused)),
        );
        let justifications = self
            .core
            .justify(&accusations, &self.dealt, &self.ephemeral_keys);
        debug!(me = %self.core.id, accusations = accusations.len(), justifications = justifications.len(), "collected shares accusations");

        SharesJustifyingMember {
            core: self.core,
            ephemeral_keys: self.ephemeral_keys,
            self_shares: self.self_shares,
            dealt: self.dealt,
            commitments: self.commitments,
            points: self.points,
            received: self.received,
            accusations,
            justifications,
        }
    }
}

/// Phase 5: justifying accusations against shares.
pub struct SharesJustifyingMember {
    core: Core,
    ephemeral_keys: BTreeMap<MemberId, KeyPair>,
    self_shares: Shares,
    dealt: BTreeMap<MemberId, Shares>,
    commitments: BTreeMap<MemberId, Public>,
    points: Public,
    received: BTreeMap<MemberId, Shares>,
    accusations: Accusations,
    justifications: BTreeMap<MemberId, Justification>,
}

impl SharesJustifyingMember {
    pub fn justification_message(&self) -> SharesJustificationMessage {
        SharesJustificationMessage {
            sender: self.core.id,
            justifications: self.justifications.clone(),
        }
    }

    /// Phase 6: resolve accusations, compute the qualified set and our master shares
    /// (`z_i = sum_j s_ji`, `x'_i = sum_j t_ji` over qualified `j`).
    ///
    /// Fails with [Error::InsufficientHonestMembers] if fewer than `dishonest_threshold + 1`
    /// members qualify.
    pub fn initialize_qualified(
        self,
        messages: Vec<SharesJustificationMessage>,
    ) -> Result<QualifiedMember, Error> {
        let Self {
            mut core,
            ephemeral_keys,
            self_shares,
            dealt,
            mut commitments,
            points,
            mut received,
            accusations,
            justifications: own,
        } = self;
        let mut justifications = core
            .index("shares justification", messages)
            .into_iter()
            .map(|(sender, message)| (sender, message.justifications))
            .collect::<BTreeMap<_, _>>();
        justifications.insert(core.id, own);
        core.resolve(&accusations, &justifications, &commitments, None)?;

        let qualified = core
            .group
            .members()
            .iter()
            .copied()
            .filter(|member| core.is_operating(member))
            .collect::<BTreeSet<_>>();
        if qualified.len() < core.group.quorum() {
            return Err(Error::InsufficientHonestMembers {
                qualified: qualified.len(),
                required: core.group.quorum(),
            });
        }
        received.retain(|member, _| qualified.contains(member));
        commitments.retain(|member, _| qualified.contains(member));

        let mut master = self_shares.clone();
        for member in qualified.iter().filter(|member| **member != core.id) {
            let shares = received.get(member).ok_or(Error::MissingShares(*member))?;
            master.s += shares.s;
            master.t += shares.t;
        }
        info!(me = %core.id, qualified = qualified.len(), "qualified members");

        Ok(QualifiedMember {
            core,
            ephemeral_keys,
            dealt,
            commitments,
            points,
            received,
            qualified,
            master,
        })
    }
}

/// Phase 6: qualified set fixed.
pub struct QualifiedMember {
    core: Core,
    ephemeral_keys: BTreeMap<MemberId, KeyPair>,
    dealt: BTreeMap<MemberId, Shares>,
    commitments: BTreeMap<MemberId, Public>,
    points: Public,
    received: BTreeMap<MemberId, Shares>,
    qualified: BTreeSet<MemberId>,
    master: Shares,
}

impl QualifiedMember {
    /// Members whose polynomials contribute to the group key.
    pub fn qualified(&self) -> &BTreeSet<MemberId> {
        &self.qualified
    }

    /// Phase 7: start publishing public key share points.
    pub fn initialize_sharing(self) -> SharingMember {
        SharingMember {
            core: self.core,
            ephemeral_keys: self.ephemeral_keys,
            dealt: self.dealt,
            commitments: self.commitments,
            points: self.points,
            received: self.received,
            qualified: self.qualified,
            master: self.master,
        }
    }
}

/// Phase 7: sharing public key share points.
pub struct SharingMember {
    core: Core,
    ephemeral_keys: BTreeMap<MemberId, KeyPair>,
    dealt: BTreeMap<MemberId, Shares>,
    commitments: BTreeMap<MemberId, Public>,
    points: Public,
    received: BTreeMap<MemberId, Shares>,
    qualified: BTreeSet<MemberId>,
    master: Shares,
}

impl SharingMember {
    pub fn public_key_share_points_message(&self) -> PublicKeySharePointsMessage {
        PublicKeySharePointsMessage {
            sender: self.core.id,
            points: self.points.clone(),
        }
    }

    /// Phase 8: verify each qualified dealer's points against the share it dealt to us
    /// (`G*s_ji == sum_k A_jk * i^k`).
    pub fn initialize_points_verification(
        self,
        messages: Vec<PublicKeySharePointsMessage>,
    ) -> PointsVerifyingMember {
        let Self {
            mut core,
            ephemeral_keys,
            dealt,
            commitments,
            points: own_points,
            received,
            qualified,
            master,
        } = self;
        let mut messages = core.index("public key share points", messages);
        let mut points = BTreeMap::from([(core.id, own_points)]);
        let mut accused = BTreeSet::new();
        for peer in core.operating_peers() {
            let Some(message) = messages.remove(&peer) else {
                core.mark_inactive(peer, "public key share points");
                continue;
            };
            if message.points.required() != core.group.quorum() {
                core.disqualify(peer, "invalid points degree");
                continue;
            }
            let valid = received
                .get(&peer)
                .is_some_and(|shares| core.vss.verify_points(&message.points, core.id, &shares.s));
            if !valid {
                warn!(me = %core.id, %peer, "invalid public key share points");
                accused.insert(peer);
            }
            points.insert(peer, message.points);
        }
        debug!(me = %core.id, accused = accused.len(), "verified public key share points");

        PointsVerifyingMember {
            core,
            ephemeral_keys,
            dealt,
            commitments,
            points,
            received,
            qualified,
            master,
            accused,
        }
    }
}

/// Phase 8: public key share points verified.
pub struct PointsVerifyingMember {
    core: Core,
    ephemeral_keys: BTreeMap<MemberId, KeyPair>,
    dealt: BTreeMap<MemberId, Shares>,
    commitments: BTreeMap<MemberId, Public>,
    points: BTreeMap<MemberId, Public>,
    received: BTreeMap<MemberId, Shares>,
    qualified: BTreeSet<MemberId>,
    master: Shares,
    accused: BTreeSet<MemberId>,
}

impl PointsVerifyingMember {
    pub fn accusations_message(&self) -> PointsAccusationsMessage {
        PointsAccusationsMessage {
            sender: self.core.id,
            accused: self.accused.clone(),
        }
    }

    /// Phase 9: gather every points accusation and justify the ones raised against us.
    pub fn initialize_points_justification(
        self,
        messages: Vec<PointsAccusationsMessage>,
    ) -> PointsJustifyingMember {
        let received = self.core.index("points accusations", messages);
        let accusations = self.core.accusations(
            "points accusations",
            &self.accused,
            received
                .into_values()
                .map(|message| (message.sender, message.accused)),
        );
        let justifications = self
            .core
            .justify(&accusations, &self.dealt, &self.ephemeral_keys);
        debug!(me = %self.core.id, accusations = accusations.len(), justifications = justifications.len(), "collected points accusations");

        PointsJustifyingMember {
            core: self.core,
            commitments: self.commitments,
            points: self.points,
            received: self.received,
            qualified: self.qualified,
            master: self.master,
            accusations,
            justifications,
        }
    }
}

/// Phase 9: justifying accusations against public key share points.
pub struct PointsJustifyingMember {
    core: Core,
    commitments: BTreeMap<MemberId, Public>,
    points: BTreeMap<MemberId, Public>,
    received: BTreeMap<MemberId, Shares>,
    qualified: BTreeSet<MemberId>,
    master: Shares,
    accusations: Accusations,
    justifications: BTreeMap<MemberId, Justification>,
}

impl PointsJustifyingMember {
    pub fn justification_message(&self) -> PointsJustificationMessage {
        PointsJustificationMessage {
            sender: self.core.id,
            justifications: self.justifications.clone(),
        }
    }

    /// Phase 10: resolve points accusations and select the qualified members whose keys must
    /// be reconstructed (disqualified or inactive since qualification).
    pub fn initialize_revealing(
        self,
        messages: Vec<PointsJustificationMessage>,
    ) -> Result<RevealingMember, Error> {
        let Self {
            mut core,
            commitments,
            points,
            received,
            qualified,
            master,
            accusations,
            justifications: own,
        } = self;
        let mut justifications = core
            .index("points justification", messages)
            .into_iter()
            .map(|(sender, message)| (sender, message.justifications))
            .collect::<BTreeMap<_, _>>();
        justifications.insert(core.id, own);
        core.resolve(&accusations, &justifications, &commitments, Some(&points))?;

        let misbehaving = qualified
            .iter()
            .copied()
            .filter(|member| !core.is_operating(member))
            .collect::<BTreeSet<_>>();
        debug!(me = %core.id, misbehaving = misbehaving.len(), "resolved points accusations");

        Ok(RevealingMember {
            core,
            commitments,
            points,
            received,
            qualified,
            master,
            misbehaving,
        })
    }
}

/// Phase 10: revealing shares of members excluded after qualification.
pub struct RevealingMember {
    core: Core,
    commitments: BTreeMap<MemberId, Public>,
    points: BTreeMap<MemberId, Public>,
    received: BTreeMap<MemberId, Shares>,
    qualified: BTreeSet<MemberId>,
    master: Shares,
    misbehaving: BTreeSet<MemberId>,
}

impl RevealingMember {
    /// Qualified members excluded after qualification.
    pub fn misbehaving(&self) -> &BTreeSet<MemberId> {
        &self.misbehaving
    }

    pub fn disqualified_shares_message(&self) -> DisqualifiedSharesMessage {
        DisqualifiedSharesMessage {
            sender: self.core.id,
            shares: self
                .misbehaving
                .iter()
                .filter_map(|member| Some((*member, self.received.get(member)?.clone())))
                .collect(),
        }
    }

    /// Phase 11: reconstruct the individual keys of misbehaving members from revealed shares.
    ///
    /// Revealed shares are checked against the misbehaving member's commitments. Fails with
    /// [Error::ReconstructionFailed] if fewer than `dishonest_threshold + 1` valid shares are
    /// available for any of them.
    pub fn initialize_reconstruction(
        self,
        messages: Vec<DisqualifiedSharesMessage>,
    ) -> Result<ReconstructingMember, Error> {
        let Self {
            core,
            commitments,
            points,
            received,
            qualified,
            master,
            misbehaving,
        } = self;
        let messages = core.index("disqualified shares", messages);
        let mut reconstructed = BTreeMap::new();
        for member in &misbehaving {
            let commitments =
                commitments
                    .get(member)
                    .ok_or_else(|| Error::ReconstructionFailed {
                        member: *member,
                        source: PrimitivesError::NotEnoughEvaluations(0, core.group.quorum()),
                    })?;
            let mut evals = Vec::new();
            if let Some(shares) = received.get(member) {
                evals.push(Eval {
                    index: core.id,
                    value: shares.s,
                });
            }
            for (sender, message) in &messages {
                let Some(shares) = message.shares.get(member) else {
                    continue;
                };
                if !core.vss.verify(commitments, *sender, &shares.s, &shares.t) {
                    warn!(me = %core.id, %sender, %member, "invalid revealed shares");
                    continue;
                }
                evals.push(Eval {
                    index: *sender,
                    value: shares.s,
                });
            }
            let private = Poly::recover(core.group.quorum(), &evals).map_err(|source| {
                Error::ReconstructionFailed {
                    member: *member,
                    source,
                }
            });
            evals.iter_mut().for_each(|eval| eval.value.zeroize());
            let private = Zeroizing::new(private?);
            info!(me = %core.id, %member, shares = evals.len(), "reconstructed individual key");
            reconstructed.insert(*member, private);
        }

        Ok(ReconstructingMember {
            core,
            points,
            qualified,
            master,
            reconstructed,
        })
    }
}

/// Phase 11: keys of misbehaving members reconstructed.
pub struct ReconstructingMember {
    core: Core,
    points: BTreeMap<MemberId, Public>,
    qualified: BTreeSet<MemberId>,
    master: Shares,
    reconstructed: BTreeMap<MemberId, Zeroizing<Scalar>>,
}

impl ReconstructingMember {
    /// Individual public keys (`y_m = G*z_m`) of reconstructed members.
    pub fn reconstructed_public_keys(&self) -> BTreeMap<MemberId, Point> {
        self.reconstructed
            .iter()
            .map(|(member, private)| (*member, Point::GENERATOR * **private))
            .collect()
    }

    /// Phase 12: combine the individual public keys of all qualified members into the group
    /// public key.
    pub fn initialize_combining(self) -> CombiningMember {
        let reconstructed = self.reconstructed_public_keys();
        let individual = self
            .qualified
            .iter()
            .filter_map(|member| {
                reconstructed
                    .get(member)
                    .or_else(|| self.points.get(member).map(Public::constant))
            })
            .collect::<Vec<_>>();
        let group_public_key = pedersen::combine(individual);
        info!(me = %self.core.id, qualified = self.qualified.len(), reconstructed = reconstructed.len(), "computed group public key");

        CombiningMember {
            core: self.core,
            qualified: self.qualified,
            master: self.master,
            group_public_key,
        }
    }
}

/// Phase 12: group public key computed.
pub struct CombiningMember {
    core: Core,
    qualified: BTreeSet<MemberId>,
    master: Shares,
    group_public_key: Point,
}

impl CombiningMember {
    pub fn group_public_key(&self) -> &Point {
        &self.group_public_key
    }

    /// The result to sign and submit.
    pub fn result(&self) -> DkgResult {
        DkgResult {
            group_public_key: self.group_public_key,
            disqualified: self.core.disqualified.clone(),
            inactive: self.core.inactive.clone(),
        }
    }

    /// Consume the member, keeping only what outlives the run.
    pub fn into_output(self) -> Output {
        Output {
            group_public_key: self.group_public_key,
            share: Share {
                index: self.core.id,
                private: self.master.s,
            },
            qualified: self.qualified,
            disqualified: self.core.disqualified,
            inactive: self.core.inactive,
        }
    }
}

/// A member's private key share of the group key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    #[zeroize(skip)]
    pub index: MemberId,
    pub private: Scalar,
}

impl Share {
    /// The public key share (`G*z_i`).
    pub fn public(&self) -> Point {
        Point::GENERATOR * self.private
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Terminal artifact of a successful run.
#[derive(Clone, Debug)]
pub struct Output {
    pub group_public_key: Point,
    pub share: Share,
    pub qualified: BTreeSet<MemberId>,
    pub disqualified: BTreeSet<MemberId>,
    pub inactive: BTreeSet<MemberId>,
}

impl Output {
    /// The result this output corresponds to.
    pub fn result(&self) -> DkgResult {
        DkgResult {
            group_public_key: self.group_public_key,
            disqualified: self.disqualified.clone(),
            inactive: self.inactive.clone(),
        }
    }
}
