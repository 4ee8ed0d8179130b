//! Network message envelope routed by the dispatcher.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::types::{Block, Peer};

/// Everything a node can receive from the overlay.
///
/// Consensus payloads are opaque here; the dispatcher forwards them verbatim
/// to the consensus engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A broadcast action seeking pool admission.
    Action(Action),
    /// A freshly produced block, broadcast by its proposer.
    Block(Block),
    /// A block sent in response to a sync request.
    BlockSync(Block),
    /// A request to serve blocks `start..=end` back to `peer`.
    SyncRequest { peer: Peer, start: u64, end: u64 },
    /// Opaque consensus view-change payload.
    ViewChange(Vec<u8>),
    /// Opaque consensus block-proposal payload.
    BlockPropose(Vec<u8>),
}

impl Message {
    /// Short kind name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Action(_) => "action",
            Message::Block(_) => "block",
            Message::BlockSync(_) => "block_sync",
            Message::SyncRequest { .. } => "sync_request",
            Message::ViewChange(_) => "view_change",
            Message::BlockPropose(_) => "block_propose",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use num_bigint::BigUint;

    #[test]
    fn kind_names() {
        let action = Action::transfer(
            Address::new("alice"),
            1,
            Address::new("bob"),
            BigUint::from(1u64),
        );
        assert_eq!(Message::Action(action).kind(), "action");
        assert_eq!(Message::ViewChange(vec![]).kind(), "view_change");
        assert_eq!(
            Message::SyncRequest { peer: "p1".to_string(), start: 1, end: 2 }.kind(),
            "sync_request"
        );
    }

    #[test]
    fn bincode_round_trip() {
        let msg = Message::SyncRequest {
            peer: "peer-7".to_string(),
            start: 3,
            end: 9,
        };
        let encoded = bincode::serde::encode_to_vec(&msg, bincode::config::standard()).unwrap();
        let (decoded, _): (Message, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(msg, decoded);
    }
}
