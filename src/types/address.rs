//! 20-byte addresses identifying accounts and contracts.

use appchain_derive::BinaryCodec;
use std::fmt;

/// Address length in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Fixed-size 20-byte address identifying an account or contract.
///
/// Externally owned accounts derive their address from the public key via
/// SHA3-256, taking the last 20 bytes. Contract addresses are derived from
/// the deploying sender and nonce (see the contract registry), keeping the
/// two namespaces inside the same type.
///
/// `Copy` for efficient passing in validation and lookup operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Default, BinaryCodec)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    /// The all-zero address.
    pub const fn zero() -> Address {
        Address([0u8; ADDRESS_SIZE])
    }

    /// Returns the address as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Parses an address from its lowercase hex representation.
    pub fn from_hex(s: &str) -> Option<Address> {
        if s.len() != ADDRESS_SIZE * 2 {
            return None;
        }
        let mut out = [0u8; ADDRESS_SIZE];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
