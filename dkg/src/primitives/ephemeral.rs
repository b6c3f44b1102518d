//! Per-pair ephemeral keys and the symmetric cipher used to deliver shares.
//!
//! Every member generates a fresh P-256 key pair for each peer. The ECDH shared secret of a pair
//! is hashed into a [SymmetricKey] that encrypts the shares one member deals to the other. Because
//! the keys are single-use, a member can later reveal its ephemeral private key for one peer to
//! prove (to everybody) what it sent to that peer without exposing anything else.

use crate::primitives::{
    group::{POINT_LENGTH, SCALAR_LENGTH},
    Error,
};
use bytes::{Buf, BufMut};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit, Nonce};
use commonware_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::{Hasher, Sha256};
use p256::{ecdh, elliptic_curve::sec1::ToEncodedPoint};
use rand::{CryptoRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Prefix hashed with the ECDH shared secret to derive a [SymmetricKey].
const KDF_PREFIX: &[u8] = b"beacon-dkg/ephemeral/v1/";

/// Size of the random nonce prefixed to every ciphertext.
pub const NONCE_LENGTH: usize = 12;

/// Size of the authentication tag appended to every ciphertext.
pub const TAG_LENGTH: usize = 16;

/// Public half of an ephemeral key pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(p256::PublicKey);

impl Write for PublicKey {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.0.to_encoded_point(true).as_bytes());
    }
}

impl Read for PublicKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = <[u8; POINT_LENGTH]>::read(buf)?;
        p256::PublicKey::from_sec1_bytes(&raw)
            .map(Self)
            .map_err(|_| CodecError::Invalid("PublicKey", "not on curve"))
    }
}

impl FixedSize for PublicKey {
    const SIZE: usize = POINT_LENGTH;
}

/// Private half of an ephemeral key pair.
///
/// Revealed only to justify the shares dealt to an accuser.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(p256::SecretKey);

impl PrivateKey {
    /// Returns the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl Write for PrivateKey {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0.to_bytes());
    }
}

impl Read for PrivateKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let raw = Zeroizing::new(<[u8; SCALAR_LENGTH]>::read(buf)?);
        p256::SecretKey::from_slice(raw.as_slice())
            .map(Self)
            .map_err(|_| CodecError::Invalid("PrivateKey", "out of range"))
    }
}

impl FixedSize for PrivateKey {
    const SIZE: usize = SCALAR_LENGTH;
}

/// An ephemeral key pair generated for a single peer.
#[derive(Clone)]
pub struct KeyPair {
    secret: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_secret(PrivateKey(p256::SecretKey::random(rng)))
    }

    /// Rebuild a key pair from its private key.
    pub fn from_secret(secret: PrivateKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }

    pub fn secret(&self) -> &PrivateKey {
        &self.secret
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Derive the symmetric key shared with the owner of `peer`.
    pub fn derive(&self, peer: &PublicKey) -> SymmetricKey {
        derive(&self.secret, peer)
    }
}

/// Derive the symmetric key for the pair (`secret`, `peer`).
///
/// Both sides of a pair derive the same key.
pub fn derive(secret: &PrivateKey, peer: &PublicKey) -> SymmetricKey {
    let shared = ecdh::diffie_hellman(secret.0.to_nonzero_scalar(), peer.0.as_affine());
    let mut hasher = Sha256::new();
    hasher.update(KDF_PREFIX);
    hasher.update(shared.raw_secret_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(digest.as_ref());
    SymmetricKey(key)
}

/// ChaCha20-Poly1305 key shared by exactly two members.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Encrypt `plaintext` under a random nonce.
    ///
    /// Returns `nonce || ciphertext || tag`.
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let cipher = ChaCha20Poly1305::new(&self.0.into());
        let mut nonce = [0u8; NONCE_LENGTH];
        rng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::EncryptionFailed)?;
        let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a value produced by [SymmetricKey::encrypt].
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        if sealed.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(Error::DecryptionFailed);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LENGTH);
        let cipher = ChaCha20Poly1305::new(&self.0.into());
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| Error::DecryptionFailed)
    }
}
