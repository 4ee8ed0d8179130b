//! Ledger actions: transfers, votes, and contract executions.
//!
//! The three kinds share nothing beyond sender and nonce, so the payload is a
//! tagged sum type consumed by pattern dispatch in the pool and dispatcher.

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::types::{Address, Hash256};

/// Kind-specific payload of an action.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ActionPayload {
    /// Move `amount` from the sender to `recipient`.
    Transfer { recipient: Address, amount: BigUint },
    /// Delegate the sender's vote to `votee`.
    Vote { votee: Address },
    /// Invoke `contract`, transferring `amount` alongside the call data.
    Execution {
        contract: Address,
        amount: BigUint,
        data: Vec<u8>,
    },
}

/// A signed ledger operation submitted by an address.
///
/// Nonce 0 is reserved for genesis/coinbase credits from the empty sender.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Action {
    /// Originating address.
    pub sender: Address,
    /// Per-sender sequence number.
    pub nonce: u64,
    /// Kind-specific payload.
    pub payload: ActionPayload,
}

impl Action {
    /// Build a transfer action.
    pub fn transfer(sender: Address, nonce: u64, recipient: Address, amount: BigUint) -> Self {
        Self {
            sender,
            nonce,
            payload: ActionPayload::Transfer { recipient, amount },
        }
    }

    /// Build a vote action.
    pub fn vote(sender: Address, nonce: u64, votee: Address) -> Self {
        Self {
            sender,
            nonce,
            payload: ActionPayload::Vote { votee },
        }
    }

    /// Build a contract execution action.
    pub fn execution(
        sender: Address,
        nonce: u64,
        contract: Address,
        amount: BigUint,
        data: Vec<u8>,
    ) -> Self {
        Self {
            sender,
            nonce,
            payload: ActionPayload::Execution { contract, amount, data },
        }
    }

    /// The balance this action spends from its sender, if any.
    ///
    /// Transfers and executions spend their amount; votes spend nothing.
    pub fn amount(&self) -> Option<&BigUint> {
        match &self.payload {
            ActionPayload::Transfer { amount, .. } => Some(amount),
            ActionPayload::Execution { amount, .. } => Some(amount),
            ActionPayload::Vote { .. } => None,
        }
    }

    /// Short kind name for log fields.
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            ActionPayload::Transfer { .. } => "transfer",
            ActionPayload::Vote { .. } => "vote",
            ActionPayload::Execution { .. } => "execution",
        }
    }

    /// Action hash: BLAKE3 of the canonical encoding.
    pub fn hash(&self) -> Result<Hash256, CodecError> {
        let encoded = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::new("alice")
    }

    #[test]
    fn amount_per_kind() {
        let transfer = Action::transfer(alice(), 1, Address::new("bob"), BigUint::from(5u64));
        let vote = Action::vote(alice(), 2, Address::new("carol"));
        let exec = Action::execution(
            alice(),
            3,
            Address::new("contract"),
            BigUint::from(7u64),
            vec![1, 2, 3],
        );

        assert_eq!(transfer.amount(), Some(&BigUint::from(5u64)));
        assert_eq!(vote.amount(), None);
        assert_eq!(exec.amount(), Some(&BigUint::from(7u64)));
    }

    #[test]
    fn hash_deterministic() {
        let a = Action::transfer(alice(), 1, Address::new("bob"), BigUint::from(5u64));
        assert_eq!(a.hash().unwrap(), a.hash().unwrap());
    }

    #[test]
    fn hash_changes_with_nonce() {
        let a = Action::transfer(alice(), 1, Address::new("bob"), BigUint::from(5u64));
        let b = Action::transfer(alice(), 2, Address::new("bob"), BigUint::from(5u64));
        assert_ne!(a.hash().unwrap(), b.hash().unwrap());
    }

    #[test]
    fn bincode_round_trip_action() {
        let a = Action::execution(
            alice(),
            4,
            Address::new("contract"),
            BigUint::from(9u64),
            vec![0xCA, 0xFE],
        );
        let encoded = bincode::serde::encode_to_vec(&a, bincode::config::standard()).unwrap();
        let (decoded, _): (Action, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(a, decoded);
    }
}
