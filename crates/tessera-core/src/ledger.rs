//! Block and action application against committed account state.
//!
//! The ledger owns the only write path into the [`StateStore`]. Application
//! is transactional at the block boundary: every action mutates a per-block
//! working set, and nothing reaches the store or the delegation index until
//! the whole block has validated. A failing action discards the working set,
//! so the legitimate block at that height can still apply later.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::Zero;
use parking_lot::RwLock;
use tracing::debug;

use crate::account::AccountState;
use crate::action::{Action, ActionPayload};
use crate::error::LedgerError;
use crate::traits::StateStore;
use crate::types::{Address, Block, Hash256};

/// Applies actions to account state and maintains the vote delegation index.
///
/// The voter index maps votee to (voter, delegated weight). It is in-memory
/// working data, rebuilt by replaying blocks; only `votee` and
/// `voting_weight` persist inside the account records themselves.
pub struct Ledger {
    store: Arc<dyn StateStore>,
    voters: RwLock<HashMap<Address, HashMap<Address, BigUint>>>,
}

/// Uncommitted view of the accounts and delegations one block touches.
///
/// Reads fall through to committed state; writes stay here until the whole
/// block validates. Dropping the set on error leaves the store and the
/// delegation index exactly as they were.
struct WorkingSet<'a> {
    ledger: &'a Ledger,
    accounts: HashMap<Address, AccountState>,
    delegations: HashMap<Address, HashMap<Address, BigUint>>,
}

impl<'a> WorkingSet<'a> {
    fn new(ledger: &'a Ledger) -> Self {
        Self {
            ledger,
            accounts: HashMap::new(),
            delegations: HashMap::new(),
        }
    }

    /// Working copy of an account, read through to committed state.
    fn account(&mut self, address: &Address) -> Result<AccountState, LedgerError> {
        if let Some(state) = self.accounts.get(address) {
            return Ok(state.clone());
        }
        Ok(self.ledger.store.get(address)?.unwrap_or_default())
    }

    fn put(&mut self, address: Address, state: AccountState) {
        self.accounts.insert(address, state);
    }

    /// Working copy of a votee's delegation map, snapshotted from the live
    /// index on first touch.
    fn delegations(&mut self, votee: &Address) -> &mut HashMap<Address, BigUint> {
        let ledger = self.ledger;
        self.delegations
            .entry(votee.clone())
            .or_insert_with(|| ledger.voters.read().get(votee).cloned().unwrap_or_default())
    }

    /// Write everything back: accounts to the store, delegation maps to the
    /// live index. Only called once the whole unit of work has validated.
    fn flush(self) -> Result<(), LedgerError> {
        let Self {
            ledger,
            accounts,
            delegations,
        } = self;
        for (address, state) in accounts {
            ledger.store.put(&address, state)?;
        }
        if !delegations.is_empty() {
            let mut index = ledger.voters.write();
            for (votee, map) in delegations {
                if map.is_empty() {
                    index.remove(&votee);
                } else {
                    index.insert(votee, map);
                }
            }
        }
        Ok(())
    }
}

impl Ledger {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            voters: RwLock::new(HashMap::new()),
        }
    }

    /// The committed-state view this ledger writes.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Apply every action of a block in order, then commit.
    ///
    /// Returns the state root after the commit. An action failure discards
    /// the block's working set before anything is written, so committed
    /// state and the delegation index are untouched.
    pub fn apply_block(&self, block: &Block) -> Result<Hash256, LedgerError> {
        let mut working = WorkingSet::new(self);
        for action in &block.actions {
            self.apply_action_in(&mut working, action)?;
        }
        working.flush()?;
        let root = self.store.commit()?;
        debug!(
            height = block.height(),
            actions = block.actions.len(),
            root = %root,
            "applied block"
        );
        Ok(root)
    }

    /// Apply a single action as its own unit of work.
    ///
    /// Nonce 0 with the empty sender is the genesis/coinbase credit path;
    /// nonce 0 from a real sender is rejected, as is any other nonce from
    /// the empty sender.
    pub fn apply_action(&self, action: &Action) -> Result<(), LedgerError> {
        let mut working = WorkingSet::new(self);
        self.apply_action_in(&mut working, action)?;
        working.flush()
    }

    /// Current delegations toward a votee, as (voter, weight).
    pub fn voters_of(&self, votee: &Address) -> HashMap<Address, BigUint> {
        self.voters.read().get(votee).cloned().unwrap_or_default()
    }

    fn apply_action_in(
        &self,
        working: &mut WorkingSet<'_>,
        action: &Action,
    ) -> Result<(), LedgerError> {
        match (action.nonce, action.sender.is_empty()) {
            (0, true) => return self.apply_credit(working, action),
            (0, false) => return Err(LedgerError::ReservedNonce),
            (_, true) => {
                return Err(LedgerError::InvalidCredit(
                    "credit action must carry nonce 0".to_string(),
                ));
            }
            _ => {}
        }

        let mut sender_state = working.account(&action.sender)?;
        let expected = sender_state.nonce.max(1);
        if action.nonce != expected {
            return Err(LedgerError::NonceGap {
                sender: action.sender.clone(),
                expected,
                got: action.nonce,
            });
        }
        sender_state.nonce = expected + 1;

        match &action.payload {
            ActionPayload::Transfer { recipient, amount } => {
                sender_state.sub_balance(amount)?;
                working.put(action.sender.clone(), sender_state);
                let mut recipient_state = working.account(recipient)?;
                recipient_state.add_balance(amount);
                working.put(recipient.clone(), recipient_state);
            }
            ActionPayload::Vote { votee } => {
                self.apply_vote(working, &action.sender, sender_state, votee)?;
            }
            ActionPayload::Execution { contract, amount, .. } => {
                sender_state.sub_balance(amount)?;
                working.put(action.sender.clone(), sender_state);
                let mut contract_state = working.account(contract)?;
                contract_state.add_balance(amount);
                working.put(contract.clone(), contract_state);
            }
        }
        Ok(())
    }

    fn apply_credit(
        &self,
        working: &mut WorkingSet<'_>,
        action: &Action,
    ) -> Result<(), LedgerError> {
        let ActionPayload::Transfer { recipient, amount } = &action.payload else {
            return Err(LedgerError::InvalidCredit(
                "credit action must be a transfer".to_string(),
            ));
        };
        if recipient.is_empty() {
            return Err(LedgerError::InvalidCredit(
                "credit recipient is empty".to_string(),
            ));
        }
        let mut state = working.account(recipient)?;
        state.add_balance(amount);
        working.put(recipient.clone(), state);
        Ok(())
    }

    /// Move the sender's delegation to `votee`.
    ///
    /// The delegated weight is the sender's balance at application time. A
    /// prior delegation is withdrawn first; voting for oneself declares
    /// candidacy. An empty votee withdraws without re-delegating. The
    /// delegation index is the only home of the reverse mapping; the
    /// in-record `voters` field is a derived view that does not survive the
    /// codec, so the ledger never writes it.
    fn apply_vote(
        &self,
        working: &mut WorkingSet<'_>,
        sender: &Address,
        mut sender_state: AccountState,
        votee: &Address,
    ) -> Result<(), LedgerError> {
        let weight = sender_state.balance.clone();
        let prior = std::mem::replace(&mut sender_state.votee, votee.clone());

        if !prior.is_empty() {
            let withdrawn = working.delegations(&prior).remove(sender);
            if let Some(old_weight) = withdrawn {
                if prior == *sender {
                    sender_state.voting_weight =
                        saturating_sub(&sender_state.voting_weight, &old_weight);
                } else {
                    let mut prior_state = working.account(&prior)?;
                    prior_state.voting_weight =
                        saturating_sub(&prior_state.voting_weight, &old_weight);
                    working.put(prior.clone(), prior_state);
                }
            }
        }

        if votee.is_empty() {
            working.put(sender.clone(), sender_state);
            return Ok(());
        }

        if votee == sender {
            sender_state.is_candidate = true;
            sender_state.voting_weight += &weight;
            working.put(sender.clone(), sender_state);
        } else {
            working.put(sender.clone(), sender_state);
            let mut votee_state = working.account(votee)?;
            votee_state.voting_weight += &weight;
            working.put(votee.clone(), votee_state);
        }
        working.delegations(votee).insert(sender.clone(), weight);
        Ok(())
    }
}

fn saturating_sub(a: &BigUint, b: &BigUint) -> BigUint {
    if b > a { BigUint::zero() } else { a - b }
}
