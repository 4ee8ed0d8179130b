//! The per-address ledger record and its invariant-preserving mutators.
//!
//! Nonce 0 is reserved for genesis and coinbase-style credits; user-originated
//! actions start at nonce 1. Balances are arbitrary-precision and can never
//! go negative: a debit that would overdraw is rejected outright, not clamped.

use std::collections::HashMap;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, StateError};
use crate::types::{Address, Hash256};

/// Canonical representation of an account.
///
/// `voters` is a derived reverse index (who delegated to this account) with no
/// independent lifecycle: it is excluded from the codec surface and dropped by
/// [`Clone`]. The canonical copy is maintained by the ledger from commit
/// events (see [`Ledger`](crate::ledger::Ledger)).
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct AccountState {
    /// Next expected sequence number for user actions from this address.
    pub nonce: u64,
    /// Account balance. Never negative.
    pub balance: BigUint,
    /// Storage trie root for contract accounts; zero otherwise.
    pub storage_root: Hash256,
    /// Hash of the contract bytecode; `None` for non-contract accounts.
    pub code_hash: Option<Vec<u8>>,
    /// Whether this address has registered as a delegate candidate.
    pub is_candidate: bool,
    /// Total weight delegated to this address, if it is a candidate.
    pub voting_weight: BigUint,
    /// Address this account delegates its vote to. Empty if none.
    pub votee: Address,
    /// Derived reverse index of delegators. Not canonical state.
    #[serde(skip)]
    pub voters: HashMap<Address, BigUint>,
}

impl AccountState {
    /// Credit the account. Arbitrary-precision arithmetic cannot overflow.
    pub fn add_balance(&mut self, amount: &BigUint) {
        self.balance += amount;
    }

    /// Debit the account, strictly: either the full amount is debited or
    /// the balance is left untouched and `InsufficientBalance` is returned.
    pub fn sub_balance(&mut self, amount: &BigUint) -> Result<(), StateError> {
        if *amount > self.balance {
            return Err(StateError::InsufficientBalance {
                have: self.balance.clone(),
                need: amount.clone(),
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Canonical encoding of all fields except the derived `voters` index.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StateError::Codec(CodecError::Encode(e.to_string())))
    }

    /// Decode an account record. Malformed or truncated input is a codec
    /// error for that record only; it never aborts the caller.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        let (state, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StateError::Codec(CodecError::Decode(e.to_string())))?;
        Ok(state)
    }
}

impl Clone for AccountState {
    /// Value-independent copy. `balance` and `voting_weight` are copied by
    /// value and `code_hash` byte-for-byte; the derived `voters` index is
    /// dropped (empty in the copy).
    fn clone(&self) -> Self {
        Self {
            nonce: self.nonce,
            balance: self.balance.clone(),
            storage_root: self.storage_root,
            code_hash: self.code_hash.clone(),
            is_candidate: self.is_candidate,
            voting_weight: self.voting_weight.clone(),
            votee: self.votee.clone(),
            voters: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_state() -> AccountState {
        AccountState {
            nonce: 7,
            balance: BigUint::from(1_000u64),
            storage_root: Hash256([0x11; 32]),
            code_hash: Some(vec![0xDE, 0xAD, 0xBE, 0xEF]),
            is_candidate: true,
            voting_weight: BigUint::from(250u64),
            votee: Address::new("carol"),
            voters: HashMap::from([(Address::new("bob"), BigUint::from(250u64))]),
        }
    }

    #[test]
    fn add_balance_credits() {
        let mut st = AccountState::default();
        st.add_balance(&BigUint::from(50u64));
        assert_eq!(st.balance, BigUint::from(50u64));
    }

    #[test]
    fn sub_balance_debits() {
        let mut st = AccountState::default();
        st.add_balance(&BigUint::from(50u64));
        st.sub_balance(&BigUint::from(20u64)).unwrap();
        assert_eq!(st.balance, BigUint::from(30u64));
    }

    #[test]
    fn sub_balance_overdraw_leaves_balance_unchanged() {
        let mut st = AccountState::default();
        st.add_balance(&BigUint::from(10u64));
        let err = st.sub_balance(&BigUint::from(11u64)).unwrap_err();
        assert!(matches!(err, StateError::InsufficientBalance { .. }));
        assert_eq!(st.balance, BigUint::from(10u64));
    }

    #[test]
    fn sub_balance_exact_amount_empties_account() {
        let mut st = AccountState::default();
        st.add_balance(&BigUint::from(10u64));
        st.sub_balance(&BigUint::from(10u64)).unwrap();
        assert_eq!(st.balance, BigUint::default());
    }

    #[test]
    fn clone_drops_voters_and_is_independent() {
        let original = sample_state();
        let mut copy = original.clone();

        assert!(copy.voters.is_empty());
        assert_eq!(copy.nonce, original.nonce);
        assert_eq!(copy.balance, original.balance);
        assert_eq!(copy.voting_weight, original.voting_weight);
        assert_eq!(copy.code_hash, original.code_hash);
        assert_eq!(copy.votee, original.votee);

        copy.add_balance(&BigUint::from(1u64));
        copy.code_hash.as_mut().unwrap()[0] = 0x00;
        assert_eq!(original.balance, BigUint::from(1_000u64));
        assert_eq!(original.code_hash.as_ref().unwrap()[0], 0xDE);
    }

    #[test]
    fn codec_round_trip_excludes_voters() {
        let original = sample_state();
        let bytes = original.to_bytes().unwrap();
        let decoded = AccountState::from_bytes(&bytes).unwrap();

        assert!(decoded.voters.is_empty());
        assert_eq!(decoded.nonce, original.nonce);
        assert_eq!(decoded.balance, original.balance);
        assert_eq!(decoded.storage_root, original.storage_root);
        assert_eq!(decoded.code_hash, original.code_hash);
        assert_eq!(decoded.is_candidate, original.is_candidate);
        assert_eq!(decoded.voting_weight, original.voting_weight);
        assert_eq!(decoded.votee, original.votee);
    }

    #[test]
    fn decode_truncated_input_is_codec_error() {
        let bytes = sample_state().to_bytes().unwrap();
        let err = AccountState::from_bytes(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, StateError::Codec(CodecError::Decode(_))));
    }

    #[test]
    fn decode_garbage_is_codec_error() {
        let err = AccountState::from_bytes(&[0xFF; 3]).unwrap_err();
        assert!(matches!(err, StateError::Codec(_)));
    }

    proptest! {
        /// Debit followed by credit of the same amount restores the balance
        /// exactly, provided the debit was covered.
        #[test]
        fn sub_then_add_round_trips(start in 0u64..u64::MAX, amount in 0u64..u64::MAX) {
            prop_assume!(amount <= start);
            let mut st = AccountState::default();
            st.add_balance(&BigUint::from(start));
            st.sub_balance(&BigUint::from(amount)).unwrap();
            st.add_balance(&BigUint::from(amount));
            prop_assert_eq!(st.balance, BigUint::from(start));
        }
    }
}
