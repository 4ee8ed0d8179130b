//! Admission-control pool of pending actions.
//!
//! The pool is the gatekeeper between "an action was received" and "an action
//! is eligible for block inclusion". It validates nonces and balance
//! reservations against the committed state plus the sender's own in-flight
//! queue, and re-validates the whole queue after every commit.
//!
//! Per-sender admission is linearized by the sharded map's entry lock; there
//! is no pool-wide critical section, so unrelated senders never contend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use num_bigint::BigUint;
use num_traits::Zero;
use tracing::{debug, warn};

use crate::action::{Action, ActionPayload};
use crate::error::PoolError;
use crate::traits::StateStore;
use crate::types::Address;

/// Default maximum pending actions per sender.
pub const DEFAULT_MAX_PER_SENDER: usize = 256;

/// A pooled action with its admission order.
#[derive(Clone, Debug)]
struct PendingAction {
    /// Global admission sequence number, used for snapshot ordering.
    arrival: u64,
    action: Action,
}

/// Per-sender pending queue, positions fixed by nonce.
#[derive(Debug, Default)]
struct SenderQueue {
    actions: BTreeMap<u64, PendingAction>,
}

impl SenderQueue {
    fn earliest_arrival(&self) -> Option<u64> {
        self.actions.values().map(|p| p.arrival).min()
    }
}

/// Pool of validated, not-yet-committed actions.
///
/// Holds a read-only view of committed state; it never writes it. Admission
/// failures are local to one action and never disturb other senders' entries.
pub struct ActionPool {
    store: Arc<dyn StateStore>,
    pending: DashMap<Address, SenderQueue>,
    arrivals: AtomicU64,
    max_per_sender: usize,
}

impl ActionPool {
    /// Create a pool over the given committed-state view.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::with_limits(store, DEFAULT_MAX_PER_SENDER)
    }

    /// Create a pool with a custom per-sender queue cap.
    pub fn with_limits(store: Arc<dyn StateStore>, max_per_sender: usize) -> Self {
        Self {
            store,
            pending: DashMap::new(),
            arrivals: AtomicU64::new(0),
            max_per_sender,
        }
    }

    /// Validate and insert a pending action.
    ///
    /// Checks, in order: nonce freshness and uniqueness (strict rejection of
    /// an occupied nonce, no replacement), balance reservation against the
    /// sender's lower-nonce pending actions, then kind-specific structure.
    pub fn admit(&self, action: Action) -> Result<(), PoolError> {
        let sender = action.sender.clone();
        let mut entry = self.pending.entry(sender.clone()).or_default();
        let outcome = self.admit_into(&mut entry, action);
        if outcome.is_err() && entry.actions.is_empty() {
            // A rejected first action must not leave an empty queue behind.
            // The entry guard is released before remove_if; both touch the
            // same shard lock.
            drop(entry);
            self.pending.remove_if(&sender, |_, queue| queue.actions.is_empty());
        }
        outcome
    }

    fn admit_into(&self, entry: &mut SenderQueue, action: Action) -> Result<(), PoolError> {
        let committed = self.store.get(&action.sender)?.unwrap_or_default();

        // Nonce 0 is reserved for genesis/coinbase credits, so the effective
        // floor for user actions is at least 1.
        let floor = committed.nonce.max(1);
        if action.nonce < floor || entry.actions.contains_key(&action.nonce) {
            return Err(PoolError::DuplicateNonce {
                sender: action.sender.clone(),
                nonce: action.nonce,
            });
        }
        if entry.actions.len() >= self.max_per_sender {
            return Err(PoolError::SenderQueueFull(action.sender.clone()));
        }

        if let Some(need) = action.amount() {
            let reserved = entry
                .actions
                .range(..action.nonce)
                .filter_map(|(_, p)| p.action.amount())
                .fold(BigUint::zero(), |acc, a| acc + a);
            let available = if reserved > committed.balance {
                BigUint::zero()
            } else {
                &committed.balance - &reserved
            };
            if *need > available {
                return Err(PoolError::InsufficientBalance {
                    sender: action.sender.clone(),
                    available,
                    need: need.clone(),
                });
            }
        }

        match &action.payload {
            ActionPayload::Transfer { recipient, .. } if recipient.is_empty() => {
                return Err(PoolError::EmptyRecipient);
            }
            ActionPayload::Vote { votee } if votee.is_empty() => {
                return Err(PoolError::EmptyVotee);
            }
            _ => {}
        }

        let arrival = self.arrivals.fetch_add(1, Ordering::Relaxed);
        debug!(sender = %action.sender, nonce = action.nonce, kind = action.kind(), "admitted action");
        entry.actions.insert(action.nonce, PendingAction { arrival, action });
        Ok(())
    }

    /// Re-validate the queues of every sender touched by a committed block.
    ///
    /// Entries below the sender's updated on-chain nonce are removed, and the
    /// reservation chain over the survivors is recomputed against the new
    /// committed balance; entries no longer affordable are dropped silently.
    pub fn evict(&self, committed: &[Action]) {
        let senders: BTreeSet<&Address> = committed
            .iter()
            .map(|a| &a.sender)
            .filter(|s| !s.is_empty())
            .collect();

        for sender in senders {
            let state = match self.store.get(sender) {
                Ok(state) => state.unwrap_or_default(),
                Err(e) => {
                    warn!(%sender, error = %e, "state read failed; leaving queue for next eviction");
                    continue;
                }
            };
            if let Some(mut entry) = self.pending.get_mut(sender) {
                let before = entry.actions.len();
                let queue = std::mem::take(&mut entry.actions);
                entry.actions = revalidate_queue(state.nonce.max(1), &state.balance, queue);
                let dropped = before - entry.actions.len();
                if dropped > 0 {
                    debug!(%sender, dropped, "evicted stale or unaffordable actions");
                }
            }
            self.pending.remove_if(sender, |_, queue| queue.actions.is_empty());
        }
    }

    /// Deterministic proposal ordering, bounded by `limit`.
    ///
    /// Senders are ordered by the arrival of their earliest pending action;
    /// within a sender, actions come out in increasing nonce order.
    pub fn snapshot(&self, limit: usize) -> Vec<Action> {
        let mut senders: Vec<(u64, Address)> = self
            .pending
            .iter()
            .filter_map(|r| r.value().earliest_arrival().map(|a| (a, r.key().clone())))
            .collect();
        senders.sort();

        let mut out = Vec::new();
        'senders: for (_, sender) in senders {
            if let Some(queue) = self.pending.get(&sender) {
                for pending in queue.actions.values() {
                    if out.len() == limit {
                        break 'senders;
                    }
                    out.push(pending.action.clone());
                }
            }
        }
        out
    }

    /// Total pending actions across all senders.
    pub fn len(&self) -> usize {
        self.pending.iter().map(|r| r.value().actions.len()).sum()
    }

    /// Whether the pool holds no pending actions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of senders with at least one pending action.
    pub fn sender_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a specific (sender, nonce) slot is occupied.
    pub fn contains(&self, sender: &Address, nonce: u64) -> bool {
        self.pending
            .get(sender)
            .map(|q| q.actions.contains_key(&nonce))
            .unwrap_or(false)
    }
}

/// Re-run admission validation over one sender's ordered pending queue.
///
/// Pure over (committed nonce floor, committed balance, queue): an entry is
/// kept when its nonce is still pending and the reservation chain of kept
/// lower-nonce entries leaves enough balance for it.
fn revalidate_queue(
    nonce_floor: u64,
    balance: &BigUint,
    queue: BTreeMap<u64, PendingAction>,
) -> BTreeMap<u64, PendingAction> {
    let mut retained = BTreeMap::new();
    let mut reserved = BigUint::zero();
    for (nonce, pending) in queue {
        if nonce < nonce_floor {
            continue;
        }
        match pending.action.amount() {
            Some(need) => {
                if &reserved + need <= *balance {
                    reserved += need;
                    retained.insert(nonce, pending);
                }
            }
            None => {
                retained.insert(nonce, pending);
            }
        }
    }
    retained
}
