//! Jointly generate a threshold group key among mutually distrusting members and publish
//! the result on-chain.
//!
//! # Overview
//!
//! Each member of a [group::Group] runs the Gennaro-Jarecki-Krawczyk-Rabin (GJKR) Distributed
//! Key Generation protocol with Pedersen Verifiable Secret Sharing. No member ever learns the
//! group private key, yet any `dishonest_threshold + 1` members can later combine their shares
//! to produce threshold signatures under the group public key.
//!
//! The protocol is split into twelve phases. Every phase is a distinct type in [gjkr::member]
//! that owns the accumulated state of all prior phases and exposes only the operations that are
//! legal in that phase. Moving to the next phase consumes the current one, so skipping or
//! repeating a phase does not compile.
//!
//! Once the group public key is known, members sign the [result::DkgResult] and submit it to the
//! chain using the staggered, block-height-gated priority scheme in [result::submission].
//!
//! # Collaborators
//!
//! Members exchange messages over any [commonware_p2p::Sender] and [commonware_p2p::Receiver]
//! pair keyed by operator keys, and read the chain through [chain::Chain]. In-process
//! implementations ([net::Network], [chain::local]) are provided for tests and simulations.
//!
//! # Status
//!
//! `beacon-dkg` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

pub mod chain;
pub mod engine;
pub mod gjkr;
pub mod group;
pub mod net;
pub mod primitives;
pub mod result;

pub use engine::{Config, Engine, Report};
pub use group::{Group, MemberId};
