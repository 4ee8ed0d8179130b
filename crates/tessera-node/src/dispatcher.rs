//! Inbound message routing.
//!
//! The overlay hands every decoded [`Message`] to the [`Dispatcher`], which
//! routes it to the [`Subscriber`] registered for the message's chain. A
//! handler failure is reported to the caller; it never tears down routing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{info, warn};

use tessera_core::action::Action;
use tessera_core::error::{DispatchError, TesseraError};
use tessera_core::message::Message;
use tessera_core::traits::Lifecycle;
use tessera_core::types::{Block, ChainId, Peer};

/// Per-chain handler set for inbound messages.
///
/// Handlers run on the dispatch call path; long work belongs inside the
/// subscriber, not the dispatcher.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn handle_action(&self, action: Action) -> Result<(), TesseraError>;
    async fn handle_block(&self, block: Block) -> Result<(), TesseraError>;
    async fn handle_block_sync(&self, block: Block) -> Result<(), TesseraError>;
    async fn handle_sync_request(
        &self,
        peer: Peer,
        start: u64,
        end: u64,
    ) -> Result<(), TesseraError>;
    async fn handle_view_change(&self, msg: Vec<u8>) -> Result<(), TesseraError>;
    async fn handle_block_propose(&self, msg: Vec<u8>) -> Result<(), TesseraError>;
}

/// Routes inbound messages to per-chain subscribers.
pub struct Dispatcher {
    subscribers: DashMap<ChainId, Arc<dyn Subscriber>>,
    running: AtomicBool,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Register the handler set for a chain. At most one per chain.
    pub fn add_subscriber(
        &self,
        chain_id: ChainId,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<(), DispatchError> {
        match self.subscribers.entry(chain_id) {
            Entry::Occupied(_) => Err(DispatchError::DuplicateSubscriber(chain_id)),
            Entry::Vacant(slot) => {
                slot.insert(subscriber);
                Ok(())
            }
        }
    }

    /// Route one message to the subscriber for `chain_id`.
    ///
    /// Routing problems (unknown chain, stopped dispatcher) and subscriber
    /// failures are both returned to the caller to log or count; neither
    /// disturbs the routing table, so the next message proceeds normally.
    pub async fn dispatch(&self, chain_id: ChainId, message: Message) -> Result<(), TesseraError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(DispatchError::NotRunning.into());
        }
        let subscriber = self
            .subscribers
            .get(&chain_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or(DispatchError::UnknownChain(chain_id))?;

        let kind = message.kind();
        let outcome = match message {
            Message::Action(action) => subscriber.handle_action(action).await,
            Message::Block(block) => subscriber.handle_block(block).await,
            Message::BlockSync(block) => subscriber.handle_block_sync(block).await,
            Message::SyncRequest { peer, start, end } => {
                subscriber.handle_sync_request(peer, start, end).await
            }
            Message::ViewChange(msg) => subscriber.handle_view_change(msg).await,
            Message::BlockPropose(msg) => subscriber.handle_block_propose(msg).await,
        };
        if let Err(e) = &outcome {
            warn!(chain_id, kind, error = %e, "subscriber failed to handle message");
        }
        outcome
    }
}

#[async_trait]
impl Lifecycle for Dispatcher {
    async fn start(&self) -> Result<(), TesseraError> {
        self.running.store(true, Ordering::Release);
        info!(chains = self.subscribers.len(), "dispatcher started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TesseraError> {
        self.running.store(false, Ordering::Release);
        info!("dispatcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    use num_bigint::BigUint;
    use tessera_core::error::ConsensusError;
    use tessera_core::types::{Address, Hash256};

    #[derive(Default)]
    struct CountingSubscriber {
        actions: AtomicU64,
        blocks: AtomicU64,
        fail_actions: bool,
    }

    #[async_trait]
    impl Subscriber for CountingSubscriber {
        async fn handle_action(&self, _action: Action) -> Result<(), TesseraError> {
            if self.fail_actions {
                return Err(ConsensusError::Handler("boom".into()).into());
            }
            self.actions.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn handle_block(&self, _block: Block) -> Result<(), TesseraError> {
            self.blocks.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn handle_block_sync(&self, _block: Block) -> Result<(), TesseraError> {
            Ok(())
        }

        async fn handle_sync_request(
            &self,
            _peer: Peer,
            _start: u64,
            _end: u64,
        ) -> Result<(), TesseraError> {
            Ok(())
        }

        async fn handle_view_change(&self, _msg: Vec<u8>) -> Result<(), TesseraError> {
            Ok(())
        }

        async fn handle_block_propose(&self, _msg: Vec<u8>) -> Result<(), TesseraError> {
            Ok(())
        }
    }

    fn action() -> Message {
        Message::Action(Action::transfer(
            Address::new("alice"),
            1,
            Address::new("bob"),
            BigUint::from(1u64),
        ))
    }

    #[tokio::test]
    async fn routes_by_chain_id() {
        let dispatcher = Dispatcher::new();
        let one = Arc::new(CountingSubscriber::default());
        let two = Arc::new(CountingSubscriber::default());
        dispatcher.add_subscriber(1, Arc::clone(&one) as Arc<dyn Subscriber>).unwrap();
        dispatcher.add_subscriber(2, Arc::clone(&two) as Arc<dyn Subscriber>).unwrap();
        dispatcher.start().await.unwrap();

        dispatcher.dispatch(1, action()).await.unwrap();
        dispatcher.dispatch(1, action()).await.unwrap();
        dispatcher.dispatch(2, action()).await.unwrap();

        assert_eq!(one.actions.load(Ordering::Relaxed), 2);
        assert_eq!(two.actions.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unknown_chain_is_an_error() {
        let dispatcher = Dispatcher::new();
        dispatcher.start().await.unwrap();
        let err = dispatcher.dispatch(9, action()).await.unwrap_err();
        assert!(matches!(
            err,
            TesseraError::Dispatch(DispatchError::UnknownChain(9))
        ));
    }

    #[tokio::test]
    async fn duplicate_subscriber_rejected() {
        let dispatcher = Dispatcher::new();
        let sub = Arc::new(CountingSubscriber::default());
        dispatcher.add_subscriber(1, Arc::clone(&sub) as Arc<dyn Subscriber>).unwrap();
        let err = dispatcher
            .add_subscriber(1, sub as Arc<dyn Subscriber>)
            .unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateSubscriber(1)));
    }

    #[tokio::test]
    async fn rejects_when_not_running() {
        let dispatcher = Dispatcher::new();
        let sub = Arc::new(CountingSubscriber::default());
        dispatcher.add_subscriber(1, sub as Arc<dyn Subscriber>).unwrap();

        let err = dispatcher.dispatch(1, action()).await.unwrap_err();
        assert!(matches!(err, TesseraError::Dispatch(DispatchError::NotRunning)));

        dispatcher.start().await.unwrap();
        dispatcher.stop().await.unwrap();
        let err = dispatcher.dispatch(1, action()).await.unwrap_err();
        assert!(matches!(err, TesseraError::Dispatch(DispatchError::NotRunning)));
    }

    #[tokio::test]
    async fn handler_failure_is_contained() {
        let dispatcher = Dispatcher::new();
        let sub = Arc::new(CountingSubscriber {
            fail_actions: true,
            ..Default::default()
        });
        dispatcher.add_subscriber(1, Arc::clone(&sub) as Arc<dyn Subscriber>).unwrap();
        dispatcher.start().await.unwrap();

        // The failure is returned to the caller; routing stays up.
        assert!(dispatcher.dispatch(1, action()).await.is_err());
        let block = Block::new(1, 0, Hash256::ZERO, 0, vec![]).unwrap();
        dispatcher.dispatch(1, Message::Block(block)).await.unwrap();
        assert_eq!(sub.blocks.load(Ordering::Relaxed), 1);
    }
}
