//! Run one member end to end.
//!
//! The [Engine] drives a member through every DKG phase over a broadcast channel, signs the
//! result, collects operator signatures and finally hands the result to the submission arbiter.
//!
//! # Schedule
//!
//! Every member of a run shares the same block schedule, anchored at [Config::start_block].
//! The run collects peer messages in [WINDOWS] consecutive windows of `phase_duration` blocks
//! each: window `k` closes at `start_block + (k + 1) * phase_duration`. The result phase begins
//! once the last window closes, so every member derives the same submission priority windows
//! regardless of when it finished collecting.
//!
//! # Rounds
//!
//! At each round the member broadcasts its own message(s) and waits until every operating peer
//! has sent its message(s) for the round, or until the round's window closes. Messages for later
//! rounds are buffered (first message per sender and round wins). Messages for earlier rounds,
//! undecodable messages, messages from unknown operators and messages whose embedded sender
//! differs from the transport sender are dropped.

use crate::{
    chain::{self, Chain},
    gjkr::{
        self,
        member::{EphemeralKeyPairGeneratingMember, Output},
        message::{Message, Round},
    },
    group::{Group, MemberId},
    primitives::pedersen::Vss,
    result::{
        self,
        signing::{self, Collector, Operators, ResultSignatureMessage},
        submission::{Outcome, SubmittingMember},
        RequestId,
    },
};
use commonware_codec::{Decode, Encode};
use commonware_cryptography::secp256r1::{PrivateKey, PublicKey};
use commonware_macros::select;
use commonware_p2p::{Receiver, Recipients, Sender};
use rand::{CryptoRng, RngCore};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of message collection windows in a run.
pub const WINDOWS: u64 = 9;

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("dkg failed: {0}")]
    Dkg(#[from] gjkr::Error),
    #[error("result failed: {0}")]
    Result(#[from] result::Error),
    #[error("chain error: {0}")]
    Chain(#[from] chain::Error),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("no operator key for member {0}")]
    MissingOperator(MemberId),
}

/// Configuration for one member's run.
pub struct Config {
    /// Identifier of the local member.
    pub me: MemberId,

    /// The group running the protocol.
    pub group: Group,

    /// Commitment parameters shared by the group.
    pub vss: Vss,

    /// The request this run answers.
    pub request: RequestId,

    /// Operator key used to sign the result.
    pub signer: PrivateKey,

    /// Operator keys of every member. Also identifies peers on the broadcast channel.
    pub operators: Operators,

    /// Block the run is anchored at. Must be the same for every member.
    pub start_block: u64,

    /// Blocks in each message collection window.
    pub phase_duration: u64,

    /// Blocks between the submission windows of consecutive members.
    pub block_step: u64,
}

impl Config {
    /// Block at which collection window `window` closes.
    pub fn window_end(&self, window: u64) -> u64 {
        self.start_block
            .saturating_add(window.saturating_add(1).saturating_mul(self.phase_duration))
    }

    /// Block at which the result phase begins.
    pub fn result_start(&self) -> u64 {
        self.start_block
            .saturating_add(WINDOWS.saturating_mul(self.phase_duration))
    }
}

/// What a completed run produced.
#[derive(Debug)]
pub struct Report {
    pub output: Output,
    pub outcome: Outcome,
}

/// Messages of one kind, out of those collected for a round.
macro_rules! take {
    ($messages:expr, $variant:ident) => {
        $messages
            .iter()
            .filter_map(|message| match message {
                Message::$variant(inner) => Some(inner.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
}

/// Drives one member through a full run.
pub struct Engine<
    C: Chain,
    S: Sender<PublicKey = PublicKey>,
    R: Receiver<PublicKey = PublicKey>,
    G: RngCore + CryptoRng,
> {
    cfg: Config,
    chain: C,
    sender: S,
    receiver: R,
    rng: G,

    peers: BTreeMap<PublicKey, MemberId>,
    pending: BTreeMap<(Round, MemberId), Message>,
}

impl<
        C: Chain,
        S: Sender<PublicKey = PublicKey>,
        R: Receiver<PublicKey = PublicKey>,
        G: RngCore + CryptoRng + Send,
    > Engine<C, S, R, G>
{
    pub fn new(cfg: Config, chain: C, (sender, receiver): (S, R), rng: G) -> Self {
        let peers = cfg
            .operators
            .iter()
            .map(|(member, key)| (key.clone(), *member))
            .collect();
        Self {
            cfg,
            chain,
            sender,
            receiver,
            rng,
            peers,
            pending: BTreeMap::new(),
        }
    }

    async fn broadcast(&mut self, message: Message) -> Result<(), Error> {
        let round = message.round();
        let recipients = self
            .sender
            .send(Recipients::All, message.encode().freeze(), false)
            .await
            .map_err(|err| Error::Channel(err.to_string()))?;
        debug!(me = %self.cfg.me, ?round, recipients = recipients.len(), "broadcast message");
        Ok(())
    }

    /// Collect the messages `expected` peers send for `rounds`.
    ///
    /// Returns when every expected peer sent a message for every round or when collection
    /// window `window` closes, whichever comes first.
    async fn collect(
        &mut self,
        window: u64,
        rounds: &[Round],
        expected: &BTreeSet<MemberId>,
    ) -> Result<Vec<Message>, Error> {
        let mut collected = BTreeMap::new();
        for round in rounds {
            for sender in expected {
                if let Some(message) = self.pending.remove(&(*round, *sender)) {
                    collected.insert((*round, *sender), message);
                }
            }
        }
        let complete = |collected: &BTreeMap<(Round, MemberId), Message>| {
            collected.len() == rounds.len() * expected.len()
        };

        let chain = self.chain.clone();
        let deadline = self.cfg.window_end(window);
        let last = rounds.iter().max().copied();
        let max_size = self.cfg.group.size();
        while !complete(&collected) {
            let (key, payload) = select! {
                height = chain.wait_for_block(deadline) => {
                    let height = height?;
                    debug!(
                        me = %self.cfg.me,
                        ?rounds,
                        height,
                        missing = rounds.len() * expected.len() - collected.len(),
                        "round deadline reached"
                    );
                    break;
                },
                received = self.receiver.recv() => {
                    received.map_err(|err| Error::Channel(err.to_string()))?
                },
            };
            let Some(from) = self.peers.get(&key).copied() else {
                warn!(me = %self.cfg.me, peer = ?key, "dropping message from unknown operator");
                continue;
            };
            let message = match Message::decode_cfg(payload, &max_size) {
                Ok(message) => message,
                Err(err) => {
                    warn!(me = %self.cfg.me, %from, ?err, "dropping undecodable message");
                    continue;
                }
            };
            if message.sender() != from {
                warn!(me = %self.cfg.me, %from, claimed = %message.sender(), "dropping spoofed message");
                continue;
            }
            if from == self.cfg.me || !self.cfg.group.contains(&from) {
                warn!(me = %self.cfg.me, %from, "dropping message from unexpected sender");
                continue;
            }
            let round = message.round();
            let key = (round, from);
            if rounds.contains(&round) {
                if !expected.contains(&from) {
                    debug!(me = %self.cfg.me, %from, ?round, "dropping message from excluded member");
                } else if collected.contains_key(&key) {
                    debug!(me = %self.cfg.me, %from, ?round, "dropping duplicate message");
                } else {
                    collected.insert(key, message);
                }
            } else if Some(round) > last {
                self.pending.entry(key).or_insert(message);
            } else {
                debug!(me = %self.cfg.me, %from, ?round, "dropping stale message");
            }
        }
        Ok(collected.into_values().collect())
    }

    /// Run the protocol, sign the result and submit it.
    pub async fn run(mut self) -> Result<Report, Error> {
        let me = self.cfg.me;
        let quorum = self.cfg.group.quorum();
        if let Some(member) = self
            .cfg
            .group
            .members()
            .iter()
            .find(|member| !self.cfg.operators.contains_key(member))
        {
            return Err(Error::MissingOperator(*member));
        }
        info!(
            %me,
            request = %self.cfg.request,
            size = self.cfg.group.size(),
            quorum,
            start = self.cfg.start_block,
            "starting dkg"
        );

        // Phases 1-2
        let member = EphemeralKeyPairGeneratingMember::new(
            me,
            self.cfg.group.clone(),
            self.cfg.vss,
            &mut self.rng,
        )?;
        self.broadcast(Message::EphemeralPublicKey(member.ephemeral_public_key_message()))
            .await?;
        let messages = self
            .collect(0, &[Round::EphemeralPublicKey], &member.operating_peers())
            .await?;
        let member = member.initialize_symmetric_key_generation(take!(messages, EphemeralPublicKey));

        // Phases 3-4
        let member = member.initialize_committing(&mut self.rng)?;
        self.broadcast(Message::PeerShares(member.peer_shares_message()))
            .await?;
        self.broadcast(Message::Commitments(member.commitments_message()))
            .await?;
        let messages = self
            .collect(
                1,
                &[Round::PeerShares, Round::Commitments],
                &member.operating_peers(),
            )
            .await?;
        let member = member.initialize_commitments_verification(
            take!(messages, PeerShares),
            take!(messages, Commitments),
        );

        // Phase 5
        self.broadcast(Message::SharesAccusations(member.accusations_message()))
            .await?;
        let messages = self
            .collect(2, &[Round::SharesAccusations], &member.operating_peers())
            .await?;
        let member = member.initialize_shares_justification(take!(messages, SharesAccusations));

        // Phases 6-7
        self.broadcast(Message::SharesJustification(member.justification_message()))
            .await?;
        let messages = self
            .collect(3, &[Round::SharesJustification], &member.operating_peers())
            .await?;
        let member = member
            .initialize_qualified(take!(messages, SharesJustification))?
            .initialize_sharing();

        // Phase 8
        self.broadcast(Message::PublicKeySharePoints(
            member.public_key_share_points_message(),
        ))
        .await?;
        let messages = self
            .collect(4, &[Round::PublicKeySharePoints], &member.operating_peers())
            .await?;
        let member = member.initialize_points_verification(take!(messages, PublicKeySharePoints));

        // Phase 9
        self.broadcast(Message::PointsAccusations(member.accusations_message()))
            .await?;
        let messages = self
            .collect(5, &[Round::PointsAccusations], &member.operating_peers())
            .await?;
        let member = member.initialize_points_justification(take!(messages, PointsAccusations));

        // Phase 10
        self.broadcast(Message::PointsJustification(member.justification_message()))
            .await?;
        let messages = self
            .collect(6, &[Round::PointsJustification], &member.operating_peers())
            .await?;
        let member = member.initialize_revealing(take!(messages, PointsJustification))?;

        // Phases 11-12
        self.broadcast(Message::DisqualifiedShares(
            member.disqualified_shares_message(),
        ))
        .await?;
        let messages = self
            .collect(7, &[Round::DisqualifiedShares], &member.operating_peers())
            .await?;
        let member = member
            .initialize_reconstruction(take!(messages, DisqualifiedShares))?
            .initialize_combining();
        let result = member.result();
        info!(
            %me,
            disqualified = ?result.disqualified,
            inactive = ?result.inactive,
            "computed group public key"
        );

        // Sign the result and gather the signatures of peers that agree with it
        let digest = result.digest();
        let own = ResultSignatureMessage {
            sender: me,
            digest,
            signature: signing::sign(&self.cfg.signer, &digest),
        };
        let mut collector = Collector::new(digest, self.cfg.operators.clone());
        collector.add(own.clone())?;
        self.broadcast(Message::ResultSignature(own)).await?;
        let peers = member.operating_peers();
        let messages = self.collect(8, &[Round::ResultSignature], &peers).await?;
        for message in take!(messages, ResultSignature) {
            let sender = message.sender;
            if let Err(err) = collector.add(message) {
                warn!(%me, %sender, ?err, "rejected result signature");
            }
        }
        let signatures = collector.finalize(quorum)?;
        let output = member.into_output();

        // Submit
        let submitter = SubmittingMember::new(
            me,
            self.cfg.block_step,
            quorum,
            self.cfg.operators.clone(),
        );
        let outcome = submitter
            .submit(
                &self.chain,
                self.cfg.request,
                &result,
                &signatures,
                self.cfg.result_start(),
            )
            .await?;
        info!(%me, ?outcome, "dkg complete");
        Ok(Report { output, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::pedersen::Vss;
    use commonware_cryptography::{PrivateKeyExt as _, Signer as _};

    fn config(start_block: u64, phase_duration: u64) -> Config {
        let signer = PrivateKey::from_seed(1);
        let operators = [(MemberId::new(1), signer.public_key())].into_iter().collect();
        Config {
            me: MemberId::new(1),
            group: Group::new(1, (1..=3).map(MemberId::new).collect()).unwrap(),
            vss: Vss::new(b"engine").unwrap(),
            request: RequestId(1),
            signer,
            operators,
            start_block,
            phase_duration,
            block_step: 2,
        }
    }

    #[test]
    fn test_schedule() {
        let cfg = config(10, 5);
        assert_eq!(cfg.window_end(0), 15);
        assert_eq!(cfg.window_end(1), 20);
        assert_eq!(cfg.window_end(WINDOWS - 1), 55);
        assert_eq!(cfg.result_start(), 55);

        let cfg = config(u64::MAX - 1, 5);
        assert_eq!(cfg.window_end(0), u64::MAX);
        assert_eq!(cfg.result_start(), u64::MAX);
    }
}
