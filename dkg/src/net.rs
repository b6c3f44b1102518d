//! In-process broadcast network.
//!
//! Every registered peer gets a [commonware_p2p::Sender] that delivers to the other registered
//! peers and a [commonware_p2p::Receiver] that yields messages tagged with the transport-level
//! sender. Peers are identified by their operator keys.

use bytes::Bytes;
use commonware_cryptography::secp256r1::PublicKey;
use commonware_p2p::{Message, Recipients};
use futures::{channel::mpsc, StreamExt};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum Error {
    #[error("message too large: {0}")]
    MessageTooLarge(usize),
    #[error("network closed")]
    NetworkClosed,
    #[error("peer already registered: {0}")]
    AlreadyRegistered(PublicKey),
}

type Peers = BTreeMap<PublicKey, mpsc::UnboundedSender<Message<PublicKey>>>;

/// Registry of peers connected to the network.
#[derive(Clone, Debug)]
pub struct Network {
    max_message_size: usize,
    peers: Arc<Mutex<Peers>>,
}

impl Network {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            peers: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Connect `peer` to the network.
    pub fn register(&self, peer: PublicKey) -> Result<(Sender, Receiver), Error> {
        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        if peers.contains_key(&peer) {
            return Err(Error::AlreadyRegistered(peer));
        }
        let (sender, receiver) = mpsc::unbounded();
        peers.insert(peer.clone(), sender);
        Ok((
            Sender {
                me: peer,
                max_message_size: self.max_message_size,
                peers: self.peers.clone(),
            },
            Receiver { receiver },
        ))
    }
}

/// Implementation of a [commonware_p2p::Sender] for the local network.
#[derive(Clone, Debug)]
pub struct Sender {
    me: PublicKey,
    max_message_size: usize,
    peers: Arc<Mutex<Peers>>,
}

impl commonware_p2p::Sender for Sender {
    type Error = Error;
    type PublicKey = PublicKey;

    async fn send(
        &mut self,
        recipients: Recipients<PublicKey>,
        message: Bytes,
        _priority: bool,
    ) -> Result<Vec<PublicKey>, Error> {
        if message.len() > self.max_message_size {
            return Err(Error::MessageTooLarge(message.len()));
        }
        let mut peers = self.peers.lock().unwrap_or_else(PoisonError::into_inner);
        let targets = match recipients {
            Recipients::All => peers.keys().cloned().collect(),
            Recipients::Some(keys) => keys,
            Recipients::One(key) => vec![key],
        };
        let mut delivered = Vec::new();
        for peer in targets {
            if peer == self.me {
                continue;
            }
            let Some(sender) = peers.get(&peer) else {
                continue;
            };
            if sender
                .unbounded_send((self.me.clone(), message.clone()))
                .is_err()
            {
                debug!(?peer, "dropping closed peer");
                peers.remove(&peer);
                continue;
            }
            delivered.push(peer);
        }
        Ok(delivered)
    }
}

/// Implementation of a [commonware_p2p::Receiver] for the local network.
#[derive(Debug)]
pub struct Receiver {
    receiver: mpsc::UnboundedReceiver<Message<PublicKey>>,
}

impl commonware_p2p::Receiver for Receiver {
    type Error = Error;
    type PublicKey = PublicKey;

    async fn recv(&mut self) -> Result<Message<PublicKey>, Error> {
        self.receiver.next().await.ok_or(Error::NetworkClosed)
    }
}
