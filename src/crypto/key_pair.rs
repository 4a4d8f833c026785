//! Schnorr signature key pairs on secp256k1.

use crate::types::address::{Address, ADDRESS_SIZE};
use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha3::{Digest, Sha3_256};

/// Private key for signing transactions.
///
/// Generated using cryptographically secure randomness from the OS.
/// Never serialized or transmitted.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

/// Public key for signature verification and address derivation.
///
/// The address is derived by hashing the verifying key with SHA3-256 and
/// taking the last 20 bytes. Derivation happens once at construction so
/// validation paths read it for free.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
    address: Address,
}

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn new() -> Self {
        let mut rng = OsRng;
        Self {
            key: SigningKey::random(&mut rng),
        }
    }

    /// Creates a private key from raw bytes.
    ///
    /// Returns `None` if the bytes do not represent a valid scalar for
    /// secp256k1. Useful for deterministic keys in tests.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_bytes(bytes).ok().map(|key| Self { key })
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self)
    }

    /// Signs arbitrary data, producing a Schnorr signature.
    pub fn sign(&self, data: &[u8]) -> SerializableSignature {
        SerializableSignature(self.key.sign(data))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicKey {
    /// Derives a public key from a private key and computes its address.
    ///
    /// Address derivation: SHA3-256(verifying_key_bytes)[12..32]
    fn new(private: &PrivateKey) -> Self {
        let vk = private.key.verifying_key();
        PublicKey {
            key: *vk,
            address: address_of(vk),
        }
    }

    /// Returns the account address owned by this key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Verifies a Schnorr signature against the given data.
    pub fn verify(&self, data: &[u8], signature: &SerializableSignature) -> bool {
        self.key.verify(data, &signature.0).is_ok()
    }
}

fn address_of(vk: &VerifyingKey) -> Address {
    let mut hasher = Sha3_256::new();
    hasher.update(vk.to_bytes());
    let full: [u8; 32] = hasher.finalize().into();

    let mut addr = [0u8; ADDRESS_SIZE];
    addr.copy_from_slice(&full[12..]);
    Address(addr)
}

impl Encode for PublicKey {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        out.write(self.key.to_bytes().as_slice());
    }
}

impl Decode for PublicKey {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let key_bytes = <[u8; 32]>::decode(input)?;
        let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| DecodeError::InvalidValue)?;

        // Re-derive the address so the key/address pairing always holds.
        Ok(PublicKey {
            address: address_of(&key),
            key,
        })
    }
}

/// Wrapper around `Signature` that plugs into the crate's binary codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializableSignature(pub Signature);

impl Encode for SerializableSignature {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        let bytes: [u8; 64] = self.0.to_bytes();
        out.write(&bytes);
    }
}

impl Decode for SerializableSignature {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = <[u8; 64]>::decode(input)?;
        let sig = Signature::try_from(bytes.as_slice()).map_err(|_| DecodeError::InvalidValue)?;
        Ok(SerializableSignature(sig))
    }
}
