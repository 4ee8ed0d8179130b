//! Genesis block construction.

use num_bigint::BigUint;

use crate::action::Action;
use crate::error::CodecError;
use crate::types::{Address, Block, ChainId, Hash256};

/// Build the height-0 block from the initial balance allocation.
///
/// Each allocation becomes a nonce-0 credit from the empty sender; the
/// previous-hash field is all zeros. Applying the same allocation always
/// yields the same block hash, so independently bootstrapped nodes agree.
pub fn genesis_block(
    chain_id: ChainId,
    credits: &[(Address, BigUint)],
) -> Result<Block, CodecError> {
    let actions = credits
        .iter()
        .map(|(recipient, amount)| {
            Action::transfer(Address::empty(), 0, recipient.clone(), amount.clone())
        })
        .collect();
    Block::new(chain_id, 0, Hash256::ZERO, 0, actions)
}
