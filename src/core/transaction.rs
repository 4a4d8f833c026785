//! Transaction structure and content hashing.

use crate::crypto::key_pair::{PrivateKey, PublicKey, SerializableSignature};
use crate::state::value::Value;
use crate::types::address::Address;
use crate::types::encoding::Encode;
use crate::types::hash::{Hash, HashCache};
use appchain_derive::BinaryCodec;

/// Structured invocation carried in a transaction's data field.
///
/// A closed payload model: admission's "well-formed data" check is simply
/// whether the raw bytes decode into one of these variants, consistent
/// with the recipient field.
#[derive(Clone, Debug, PartialEq, BinaryCodec)]
pub enum TxPayload {
    /// Plain value transfer; the data field carries nothing else.
    Transfer,
    /// Contract deployment: names a registered code unit and carries the
    /// parameters handed to the deployment hook.
    Deploy { code: String, params: Vec<Value> },
    /// Contract invocation: a function name and its parameters.
    Invoke { name: String, params: Vec<Value> },
}

/// A signed transaction.
///
/// Immutable once constructed. `to == None` is the deployment sentinel:
/// the recipient address does not exist yet and will be derived from the
/// sender and nonce.
#[derive(Clone, Debug, PartialEq, BinaryCodec)]
pub struct Transaction {
    /// Sender's public key, also used for signature verification.
    pub from: PublicKey,
    /// Schnorr signature over the signing hash.
    pub signature: SerializableSignature,

    /// Cached content hash, computed lazily on first access.
    cached_hash: HashCache,

    /// Recipient account or contract; `None` requests a deployment.
    pub to: Option<Address>,
    /// Native token amount transferred to the recipient.
    pub value: u128,
    /// Processing fee, charged whenever execution is attempted.
    pub fee: u128,
    /// Structured invocation data.
    pub payload: TxPayload,
    /// Monotonic counter preventing replay for this sender.
    pub nonce: u64,
}

impl Transaction {
    /// Creates a new signed transaction.
    pub fn new(
        to: Option<Address>,
        value: u128,
        fee: u128,
        payload: TxPayload,
        nonce: u64,
        key: &PrivateKey,
    ) -> Self {
        let from = key.public_key();
        let signing_hash = Self::signing_hash_from_parts(&from, &to, value, fee, &payload, nonce);

        Transaction {
            signature: key.sign(signing_hash.as_slice()),
            from,
            cached_hash: HashCache::new(),
            to,
            value,
            fee,
            payload,
            nonce,
        }
    }

    /// Returns the hash that was signed to produce this transaction's
    /// signature.
    pub fn signing_hash(&self) -> Hash {
        Self::signing_hash_from_parts(
            &self.from,
            &self.to,
            self.value,
            self.fee,
            &self.payload,
            self.nonce,
        )
    }

    /// Returns the transaction's content hash, its identity everywhere:
    /// receipts, queries, block listings.
    ///
    /// Computed over the full transaction including the signature, and
    /// cached after the first call.
    pub fn hash(&self) -> Hash {
        self.cached_hash.get_or_compute(|| {
            let mut h = Hash::sha3();
            h.update(b"TXID");
            self.encode(&mut h);
            h.finalize()
        })
    }

    /// Verifies the transaction signature against the sender's key.
    pub fn verify(&self) -> bool {
        let hash = self.signing_hash();
        self.from.verify(hash.as_slice(), &self.signature)
    }

    /// Address of the sending account.
    pub fn sender(&self) -> Address {
        self.from.address()
    }

    /// True when `to` is the deployment sentinel.
    pub fn is_deploy(&self) -> bool {
        self.to.is_none()
    }

    /// Computes the domain-separated signing hash from raw parts without
    /// allocations.
    fn signing_hash_from_parts(
        from: &PublicKey,
        to: &Option<Address>,
        value: u128,
        fee: u128,
        payload: &TxPayload,
        nonce: u64,
    ) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"TX");
        from.encode(&mut h);
        to.encode(&mut h);
        value.encode(&mut h);
        fee.encode(&mut h);
        payload.encode(&mut h);
        nonce.encode(&mut h);
        h.finalize()
    }
}
