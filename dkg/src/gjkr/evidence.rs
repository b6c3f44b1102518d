//! Messages retained for resolving accusations.
//!
//! A justification reveals an ephemeral private key. To check it, every member needs the
//! ephemeral public keys and ciphertexts exactly as they were broadcast, so the first message
//! of each kind received from a sender is stored and never replaced.

use crate::{
    gjkr::message::{EphemeralPublicKeyMessage, PeerSharesMessage},
    group::MemberId,
    primitives::ephemeral::PublicKey,
};
use std::collections::{btree_map::Entry, BTreeMap};

/// Append-only record of ephemeral public keys and encrypted shares, keyed by sender.
#[derive(Clone, Debug, Default)]
pub struct EvidenceLog {
    ephemeral_public_keys: BTreeMap<MemberId, EphemeralPublicKeyMessage>,
    peer_shares: BTreeMap<MemberId, PeerSharesMessage>,
}

impl EvidenceLog {
    /// Record an ephemeral public key message.
    ///
    /// Returns `false` (and keeps the existing record) if the sender already has one.
    pub fn put_ephemeral_public_keys(&mut self, msg: EphemeralPublicKeyMessage) -> bool {
        match self.ephemeral_public_keys.entry(msg.sender) {
            Entry::Vacant(entry) => {
                entry.insert(msg);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Record a peer shares message.
    ///
    /// Returns `false` (and keeps the existing record) if the sender already has one.
    pub fn put_peer_shares(&mut self, msg: PeerSharesMessage) -> bool {
        match self.peer_shares.entry(msg.sender) {
            Entry::Vacant(entry) => {
                entry.insert(msg);
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// The ephemeral public key `sender` generated for `receiver`.
    pub fn ephemeral_public_key(&self, sender: MemberId, receiver: MemberId) -> Option<&PublicKey> {
        self.ephemeral_public_keys.get(&sender)?.keys.get(&receiver)
    }

    /// The ciphertext `sender` dealt to `receiver`.
    pub fn peer_shares(&self, sender: MemberId, receiver: MemberId) -> Option<&[u8]> {
        self.peer_shares
            .get(&sender)?
            .shares
            .get(&receiver)
            .map(Vec::as_slice)
    }
}
