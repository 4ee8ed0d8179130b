//! Core chain types: hashes, addresses, blocks.
//!
//! All content hashes are BLAKE3 over the canonical bincode encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::action::Action;
use crate::error::CodecError;

/// Identifier of a logical chain. Messages and blocks are tagged with it.
pub type ChainId = u32;

/// Opaque identifier of a remote peer, as reported by the transport.
pub type Peer = String;

/// A 32-byte hash value.
///
/// Used for block hashes, action hashes, and state trie roots.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Used for the genesis previous-hash and
    /// for non-contract account storage roots.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A ledger address.
///
/// The encoding scheme (and the signature scheme behind it) is owned by the
/// crypto layer; the ledger treats addresses as opaque non-empty strings.
/// The empty address is reserved: it marks "no votee" and the synthetic
/// sender of genesis/coinbase credits.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub struct Address(String);

impl Address {
    /// The empty (reserved) address.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Create an address from its string form.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Whether this is the reserved empty address.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String form of the address.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Block header.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u32,
    /// Chain this block belongs to.
    pub chain_id: ChainId,
    /// Height in the canonical chain. Genesis is height 0.
    pub height: u64,
    /// Hash of the previous block. Zero for genesis.
    pub prev_hash: Hash256,
    /// State trie root after applying this block.
    pub state_root: Hash256,
    /// BLAKE3 digest over the ordered action hashes.
    pub action_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

/// A complete block: header plus ordered actions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Ordered actions committed by this block.
    pub actions: Vec<Action>,
}

impl Block {
    /// Assemble a block, computing the action root from the given actions.
    pub fn new(
        chain_id: ChainId,
        height: u64,
        prev_hash: Hash256,
        timestamp: u64,
        actions: Vec<Action>,
    ) -> Result<Self, CodecError> {
        let action_root = action_root(&actions)?;
        Ok(Self {
            header: BlockHeader {
                version: 1,
                chain_id,
                height,
                prev_hash,
                state_root: Hash256::ZERO,
                action_root,
                timestamp,
            },
            actions,
        })
    }

    /// Block hash: BLAKE3 of the canonical header encoding.
    pub fn hash(&self) -> Result<Hash256, CodecError> {
        let encoded = bincode::serde::encode_to_vec(&self.header, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// Height shorthand.
    pub fn height(&self) -> u64 {
        self.header.height
    }
}

/// Digest over the ordered action hashes of a block.
pub fn action_root(actions: &[Action]) -> Result<Hash256, CodecError> {
    let mut hasher = blake3::Hasher::new();
    for action in actions {
        hasher.update(action.hash()?.as_bytes());
    }
    Ok(Hash256(hasher.finalize().into()))
}
