//! Group membership and threshold configuration.

use crate::primitives::Scalar;
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, FixedSize, Read, ReadExt, Write};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use thiserror::Error;

/// Errors that can occur when configuring a [Group].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("member id must be non-zero")]
    ZeroMember,
    #[error("duplicate member: {0}")]
    DuplicateMember(MemberId),
    #[error("invalid threshold: dishonest threshold {threshold} for group of {size}")]
    InvalidThreshold { threshold: u32, size: usize },
}

/// Unique-in-group identifier of a member.
///
/// The identifier doubles as the member's evaluation point on every secret polynomial,
/// so it is never zero (`x = 0` is where the secret lives).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberId(u32);

impl MemberId {
    /// Create a new identifier.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// Returns the identifier as a field element (the member's evaluation point).
    pub fn scalar(&self) -> Scalar {
        Scalar::from(self.0 as u64)
    }
}

impl From<u32> for MemberId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Write for MemberId {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for MemberId {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let id = u32::read(buf)?;
        if id == 0 {
            return Err(CodecError::Invalid("MemberId", "zero"));
        }
        Ok(Self(id))
    }
}

impl FixedSize for MemberId {
    const SIZE: usize = u32::SIZE;
}

/// Read a collection length, rejecting anything above `max`.
fn read_len(buf: &mut impl Buf, max: usize) -> Result<usize, CodecError> {
    let len = u32::read(buf)? as usize;
    if len > max {
        return Err(CodecError::InvalidLength(len));
    }
    Ok(len)
}

/// Read the next key of a member-keyed collection, requiring keys to be strictly ascending.
fn read_key(
    buf: &mut impl Buf,
    last: &mut Option<MemberId>,
    context: &'static str,
) -> Result<MemberId, CodecError> {
    let member = MemberId::read(buf)?;
    if last.is_some_and(|last| member <= last) {
        return Err(CodecError::Invalid(context, "members not ascending"));
    }
    *last = Some(member);
    Ok(member)
}

/// Write a set of members as a length followed by ascending identifiers.
pub fn write_set(set: &BTreeSet<MemberId>, buf: &mut impl BufMut) {
    (set.len() as u32).write(buf);
    for member in set {
        member.write(buf);
    }
}

/// Read a set written by [write_set] holding at most `max` members.
pub fn read_set(buf: &mut impl Buf, max: usize) -> Result<BTreeSet<MemberId>, CodecError> {
    let len = read_len(buf, max)?;
    let mut set = BTreeSet::new();
    let mut last = None;
    for _ in 0..len {
        set.insert(read_key(buf, &mut last, "BTreeSet")?);
    }
    Ok(set)
}

/// Encoded size of a set written by [write_set].
pub fn set_size(set: &BTreeSet<MemberId>) -> usize {
    u32::SIZE + set.len() * MemberId::SIZE
}

/// Write a member-keyed map as a length followed by ascending `(member, value)` entries.
pub fn write_map<V: Write>(map: &BTreeMap<MemberId, V>, buf: &mut impl BufMut) {
    (map.len() as u32).write(buf);
    for (member, value) in map {
        member.write(buf);
        value.write(buf);
    }
}

/// Read a map written by [write_map] holding at most `max` entries.
pub fn read_map<V: Read>(
    buf: &mut impl Buf,
    max: usize,
    cfg: &V::Cfg,
) -> Result<BTreeMap<MemberId, V>, CodecError> {
    let len = read_len(buf, max)?;
    let mut map = BTreeMap::new();
    let mut last = None;
    for _ in 0..len {
        let member = read_key(buf, &mut last, "BTreeMap")?;
        map.insert(member, V::read_cfg(buf, cfg)?);
    }
    Ok(map)
}

/// Encoded size of a map written by [write_map].
pub fn map_size<V: EncodeSize>(map: &BTreeMap<MemberId, V>) -> usize {
    u32::SIZE
        + map
            .values()
            .map(|value| MemberId::SIZE + value.encode_size())
            .sum::<usize>()
}

/// Ordered set of members participating in one DKG run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    dishonest_threshold: u32,
    members: Vec<MemberId>,
}

impl Group {
    /// Create a new group.
    ///
    /// Members are sorted. The dishonest threshold must satisfy `0 < dishonest_threshold < size`.
    pub fn new(dishonest_threshold: u32, mut members: Vec<MemberId>) -> Result<Self, Error> {
        members.sort();
        if members.first().is_some_and(|member| member.get() == 0) {
            return Err(Error::ZeroMember);
        }
        if let Some(pair) = members.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::DuplicateMember(pair[0]));
        }
        if dishonest_threshold == 0 || dishonest_threshold as usize >= members.len() {
            return Err(Error::InvalidThreshold {
                threshold: dishonest_threshold,
                size: members.len(),
            });
        }
        Ok(Self {
            dishonest_threshold,
            members,
        })
    }

    /// Create a group of `size` members with identifiers `1..=size`.
    pub fn sequential(dishonest_threshold: u32, size: u32) -> Result<Self, Error> {
        Self::new(dishonest_threshold, (1..=size).map(MemberId::new).collect())
    }

    /// Maximum number of malicious members the group tolerates.
    pub fn dishonest_threshold(&self) -> u32 {
        self.dishonest_threshold
    }

    /// Minimum number of honest members (`dishonest_threshold + 1`) required to
    /// reconstruct a secret or accept a result.
    pub fn quorum(&self) -> usize {
        self.dishonest_threshold as usize + 1
    }

    /// Number of members in the group.
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// All members (sorted).
    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    /// Returns whether the member belongs to the group.
    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.binary_search(member).is_ok()
    }

    /// All members except `me`.
    pub fn peers(&self, me: MemberId) -> impl Iterator<Item = MemberId> + '_ {
        self.members.iter().copied().filter(move |member| *member != me)
    }
}
