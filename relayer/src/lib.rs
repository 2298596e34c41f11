#![deny(unused_crate_dependencies)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![warn(unused_imports)]

//! Delivery of checked bridge messages to their destination chain.
//!
//! A [`Relayer`] reads the events of its source chain. Originating events are
//! delivered to the bridge contract on the other chain and recorded as `Sent`
//! cross messages. Confirmation events mark the cross message of the opposite
//! direction `Consumed`.

use std::time::Duration;

use async_trait::async_trait;
use chain_events::{BridgePayload, PayloadType};
use client::ContractClient;
use ethers::{
    abi::Token,
    signers::LocalWallet,
    types::{Bytes, H256},
};
use scheduler::Task;
use storage::{Chain, ProcessStatus, RawBridgeEvent, RelayedMessage, Store};

mod error;
mod message;
pub mod metrics;
pub mod multisig;

pub use error::{Error, Result};
pub use message::cross_message;
pub use metrics::{RelayerMetrics, RELAYER_METRICS};
pub use multisig::{encode_upward_preimage, sign_digest, upward_digest, RelayMessage};

/// Revert reason fragment reported for messages delivered before.
pub const ALREADY_EXECUTED: &str = "already executed";

const EXECUTED_MESSAGES: &str = "executedMessages";

/// Direction messages are relayed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// L1 to L2.
    Downward,
    /// L2 to L1.
    Upward,
}

impl Direction {
    /// Chain the relayed messages originate on.
    pub fn source(&self) -> Chain {
        match self {
            Direction::Downward => Chain::L1,
            Direction::Upward => Chain::L2,
        }
    }

    /// Metric and log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Downward => "downward",
            Direction::Upward => "upward",
        }
    }

    /// Bridge method receiving the messages on the destination chain.
    pub fn method(&self) -> &'static str {
        match self {
            Direction::Downward => "receiveDownwardMessages",
            Direction::Upward => "receiveUpwardMessages",
        }
    }
}

/// Configuration of a [`Relayer`].
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    /// Events handled in a single pass.
    pub batch_size: u64,

    /// Failed deliveries of an event are retried until this many attempts were made.
    pub max_process_attempts: u32,

    /// Time between two passes.
    pub poll_interval: Duration,
}

/// Counts of what a single [`Relayer::relay`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Messages delivered by a transaction of this pass.
    pub delivered: u64,

    /// Messages found executed on the destination chain.
    pub already_executed: u64,

    /// Messages that failed to be delivered.
    pub failed: u64,

    /// Cross messages marked consumed.
    pub consumed: u64,

    /// Confirmations left for a later pass.
    pub unmatched: u64,
}

enum Delivery {
    Submitted(H256),
    AlreadyExecuted,
}

/// Relays the events of one chain to the other.
pub struct Relayer<C, St> {
    direction: Direction,
    contract: C,
    signers: Vec<LocalWallet>,
    store: St,
    config: RelayerConfig,
    metrics: &'static RelayerMetrics,
}

impl<C, St> Relayer<C, St>
where
    C: ContractClient,
    St: Store,
{
    /// Create a relayer delivering L1 messages to L2.
    ///
    /// # Arguments
    ///
    /// * `contract`: The L2 bridge, submitting through the downward relayer key
    /// * `store`: Bridge storage
    /// * `config`: Relayer configuration
    /// * `metrics`: Metrics to report progress to
    pub fn downward(
        contract: C,
        store: St,
        config: RelayerConfig,
        metrics: &'static RelayerMetrics,
    ) -> Self {
        Self {
            direction: Direction::Downward,
            contract,
            signers: vec![],
            store,
            config,
            metrics,
        }
    }

    /// Create a relayer delivering L2 messages to L1.
    ///
    /// `signers` sign every delivery in the given order, which has to be the
    /// order the L1 bridge expects the signatures in.
    pub fn upward(
        contract: C,
        signers: Vec<LocalWallet>,
        store: St,
        config: RelayerConfig,
        metrics: &'static RelayerMetrics,
    ) -> Result<Self> {
        if signers.is_empty() {
            return Err(Error::NoSigners);
        }

        Ok(Self {
            direction: Direction::Upward,
            contract,
            signers,
            store,
            config,
            metrics,
        })
    }

    /// The direction messages are relayed in.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Handles a batch of checked, not yet processed events of each watched
    /// event type.
    ///
    /// Originating events are handled first. Confirmations waiting for their
    /// cross message take up their own batch and never hold deliveries back.
    ///
    /// A failed delivery is recorded on its event and does not stop the pass.
    /// Storage errors and transient node failures do, without counting an attempt.
    pub async fn relay(&self) -> Result<RelayOutcome> {
        let chain = self.direction.source();
        let mut outcome = RelayOutcome::default();

        for event_type in chain.watched_events() {
            let events = self
                .store
                .query_unprocessed(
                    chain,
                    event_type,
                    self.config.batch_size,
                    self.config.max_process_attempts,
                )
                .await?;

            for event in events {
                if event.event_type.is_origination() {
                    self.deliver(&event, &mut outcome).await?;
                } else {
                    self.confirm(&event, &mut outcome).await?;
                }
            }
        }

        if outcome != RelayOutcome::default() {
            tracing::info!("{} relayer pass: {outcome:?}", self.direction.as_str());
        }

        Ok(outcome)
    }

    async fn deliver(&self, event: &RawBridgeEvent, outcome: &mut RelayOutcome) -> Result<()> {
        let chain = self.direction.source();
        let labels = (
            self.direction.as_str(),
            PayloadType::try_from(event.message_payload_type)
                .map(|t| t.as_str())
                .unwrap_or("unknown"),
        );
        self.metrics.received[&labels].inc();

        let mut proof = vec![];
        let delivery = async {
            let payload = BridgePayload::decode(event.message_payload_type, &event.message_payload)?;
            let delivery = self.submit(event, &mut proof).await?;
            Ok::<_, Error>((payload, delivery))
        }
        .await;

        let (payload, delivery) = match delivery {
            Ok(res) => res,
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "{} delivery of message {:?} with nonce {} interrupted: {e}",
                    self.direction.as_str(),
                    event.message_hash,
                    event.message_nonce
                );

                return Err(e);
            }
            Err(e) => {
                tracing::error!(
                    "{} delivery of message {:?} with nonce {} failed: {e}",
                    self.direction.as_str(),
                    event.message_hash,
                    event.message_nonce
                );
                self.store
                    .update_process_fail(chain, event.id, &e.to_string())
                    .await?;
                self.metrics.failure[&labels].inc();
                outcome.failed += 1;

                return Ok(());
            }
        };

        let relay_tx_hash = match delivery {
            Delivery::Submitted(tx_hash) => {
                tracing::info!(
                    "{} message {:?} with nonce {} delivered in tx {tx_hash:?}",
                    self.direction.as_str(),
                    event.message_hash,
                    event.message_nonce
                );
                outcome.delivered += 1;
                Some(tx_hash)
            }
            Delivery::AlreadyExecuted => {
                tracing::info!(
                    "{} message {:?} with nonce {} is already executed",
                    self.direction.as_str(),
                    event.message_hash,
                    event.message_nonce
                );
                self.metrics.already_executed[&self.direction.as_str()].inc();
                outcome.already_executed += 1;
                None
            }
        };

        let message = cross_message(event, &payload, relay_tx_hash, proof);
        self.store.upsert_cross_messages(&[message]).await?;
        self.store
            .update_process_status(chain, event.id, ProcessStatus::Processed)
            .await?;
        self.metrics.success[&labels].inc();

        Ok(())
    }

    async fn submit(&self, event: &RawBridgeEvent, proof: &mut Vec<Bytes>) -> Result<Delivery> {
        if self.is_executed(event.message_hash).await? {
            return Ok(Delivery::AlreadyExecuted);
        }

        let message = RelayMessage::from_event(event);
        let mut args = vec![Token::Array(vec![message.to_token()])];

        if self.direction == Direction::Upward {
            let digest = upward_digest(&[message]);
            *proof = sign_digest(&self.signers, digest)?
                .into_iter()
                .map(|s| Bytes::from(s.to_vec()))
                .collect();
            args.push(Token::Array(
                proof.iter().map(|s| Token::Bytes(s.to_vec())).collect(),
            ));
        }

        match self.contract.transact(self.direction.method(), args).await {
            Ok(receipt) => Ok(Delivery::Submitted(receipt.transaction_hash)),
            Err(e)
                if e
                    .revert_reason()
                    .map_or(false, |reason| reason.contains(ALREADY_EXECUTED)) =>
            {
                Ok(Delivery::AlreadyExecuted)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn is_executed(&self, message_hash: H256) -> Result<bool> {
        let output = self
            .contract
            .call(
                EXECUTED_MESSAGES,
                vec![Token::FixedBytes(message_hash.as_bytes().to_vec())],
            )
            .await?;

        match output.as_slice() {
            [Token::Bool(executed)] => Ok(*executed),
            other => Err(Error::UnexpectedOutput {
                method: EXECUTED_MESSAGES,
                output: format!("{other:?}"),
            }),
        }
    }

    async fn confirm(&self, event: &RawBridgeEvent, outcome: &mut RelayOutcome) -> Result<()> {
        let Some(relayed) = RelayedMessage::from_confirmation(event) else {
            return Ok(());
        };
        let chain = self.direction.source();

        let updated = self.store.update_consumed_status(&relayed).await?;

        if updated == 0 {
            tracing::warn!(
                "{chain} confirmation of message {:?} in tx {:?} has no sent cross message",
                relayed.message_hash,
                relayed.tx_hash
            );
            self.metrics.unmatched_confirmations[&self.direction.as_str()].inc();
            outcome.unmatched += 1;

            return Ok(());
        }

        self.store
            .update_process_status(chain, event.id, ProcessStatus::Processed)
            .await?;
        self.metrics.consumed[&self.direction.as_str()].inc();
        outcome.consumed += 1;

        Ok(())
    }
}

#[async_trait]
impl<C, St> Task for Relayer<C, St>
where
    C: ContractClient + 'static,
    St: Store + 'static,
{
    type Error = Error;

    fn name(&self) -> &'static str {
        match self.direction {
            Direction::Downward => "downward_relayer",
            Direction::Upward => "upward_relayer",
        }
    }

    fn interval(&self) -> Duration {
        self.config.poll_interval
    }

    async fn run(&self) -> Result<()> {
        self.relay().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use chain_events::testing::{confirmation_log, origination_log};
    use ethers::{
        signers::Signer,
        types::{Address, Signature, TransactionReceipt, U256},
    };
    use pretty_assertions::assert_eq;
    use storage::{
        CheckStatus, CrossMessage, CrossMessageStore, EventType, InMemoryStore, MessageType,
        RawEventStore, TokenType, TxStatus, TxType,
    };

    use super::*;

    const BRIDGE: Address = Address::repeat_byte(0xb1);
    const RELAY_TX: H256 = H256::repeat_byte(0xee);

    /// Bridge contract on the destination chain.
    #[derive(Default)]
    struct FakeBridge {
        executed: Mutex<HashSet<H256>>,
        revert: Mutex<Option<String>>,
        sent: Mutex<Vec<(String, Vec<Token>)>>,
        // Number of upcoming calls failing as if the node was unreachable.
        outage: Mutex<u32>,
    }

    impl FakeBridge {
        fn revert_with(&self, reason: &str) {
            *self.revert.lock().unwrap() = Some(reason.to_string());
        }

        fn sent(&self) -> Vec<(String, Vec<Token>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContractClient for FakeBridge {
        fn address(&self) -> Address {
            BRIDGE
        }

        async fn call(&self, method: &str, args: Vec<Token>) -> client::Result<Vec<Token>> {
            assert_eq!(method, EXECUTED_MESSAGES);

            let mut outage = self.outage.lock().unwrap();
            if *outage > 0 {
                *outage -= 1;
                return Err(client::Error::Middleware("connection refused".to_string()));
            }
            drop(outage);

            let hash = match args.as_slice() {
                [Token::FixedBytes(hash)] => H256::from_slice(hash),
                other => panic!("unexpected args {other:?}"),
            };

            Ok(vec![Token::Bool(
                self.executed.lock().unwrap().contains(&hash),
            )])
        }

        async fn transact(
            &self,
            method: &str,
            args: Vec<Token>,
        ) -> client::Result<TransactionReceipt> {
            self.sent.lock().unwrap().push((method.to_string(), args));

            if let Some(reason) = self.revert.lock().unwrap().clone() {
                return Err(client::Error::Reverted {
                    method: method.to_string(),
                    reason,
                });
            }

            Ok(TransactionReceipt {
                transaction_hash: RELAY_TX,
                ..Default::default()
            })
        }
    }

    fn config() -> RelayerConfig {
        RelayerConfig {
            batch_size: 10,
            max_process_attempts: 2,
            poll_interval: Duration::from_secs(1),
        }
    }

    fn metrics() -> &'static RelayerMetrics {
        Box::leak(Box::default())
    }

    fn signers() -> Vec<LocalWallet> {
        [
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        ]
        .iter()
        .map(|k| k.parse().unwrap())
        .collect()
    }

    fn payload(amount: u64) -> BridgePayload {
        BridgePayload::Erc20 {
            l1_token: Address::repeat_byte(0x01),
            l2_token: Address::repeat_byte(0x02),
            from: Address::repeat_byte(0xaa),
            to: Address::repeat_byte(0xbb),
            amount: amount.into(),
        }
    }

    async fn store_checked(store: &InMemoryStore, chain: Chain, log: ethers::types::Log) -> H256 {
        let block = log.block_number.unwrap().as_u64();
        let timestamps = HashMap::from([(block, 1_700_000_000)]);
        let event = chain_events::decode_log(chain, 1, &log, &timestamps)
            .unwrap()
            .unwrap();

        store.insert_raw_events(chain, &[event.clone()]).await.unwrap();
        store
            .update_check_status_by_range(
                chain,
                event.event_type,
                event.message_nonce,
                event.message_nonce,
                CheckStatus::Unchecked,
                CheckStatus::CheckedStep1,
            )
            .await
            .unwrap();

        event.message_hash
    }

    async fn deposit(store: &InMemoryStore, nonce: u64) -> H256 {
        let log = origination_log(
            Chain::L1,
            BRIDGE,
            100 + nonce,
            H256::from_low_u64_be(nonce),
            nonce,
            &payload(nonce),
        );
        store_checked(store, Chain::L1, log).await
    }

    fn event(store: &InMemoryStore, chain: Chain, hash: H256) -> RawBridgeEvent {
        store.raw_event(chain, hash).unwrap()
    }

    fn only_cross_message(store: &InMemoryStore) -> CrossMessage {
        let mut messages = store.cross_messages();
        assert_eq!(messages.len(), 1);
        messages.remove(0)
    }

    #[tokio::test]
    async fn downward_delivery_creates_sent_cross_message() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());
        let hash = deposit(&store, 5).await;

        let relayer = Relayer::downward(bridge.clone(), store.clone(), config(), metrics());
        assert_eq!(
            relayer.relay().await.unwrap(),
            RelayOutcome {
                delivered: 1,
                ..Default::default()
            }
        );

        let relayed = event(&store, Chain::L1, hash);
        let sent = bridge.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "receiveDownwardMessages");
        assert_eq!(
            sent[0].1,
            vec![Token::Array(vec![RelayMessage::from_event(&relayed).to_token()])]
        );

        assert_eq!(relayed.process_status, ProcessStatus::Processed);

        let message = only_cross_message(&store);
        assert_eq!(message.message_hash, hash);
        assert_eq!(message.message_type, MessageType::L1Message);
        assert_eq!(message.tx_type, TxType::Deposit);
        assert_eq!(message.tx_status, TxStatus::Sent);
        assert_eq!(message.token_type, TokenType::Erc20);
        assert_eq!(message.l1_token_address, Address::repeat_byte(0x01));
        assert_eq!(message.l2_token_address, Address::repeat_byte(0x02));
        assert_eq!(message.token_amounts, vec![U256::from(5)]);
        assert_eq!(message.l1_tx_hash, Some(H256::from_low_u64_be(5)));
        assert_eq!(message.l1_block_number, Some(105));
        assert_eq!(message.relay_tx_hash, Some(RELAY_TX));
        assert!(message.multi_sign_proof.is_empty());

        // Nothing left to do.
        assert_eq!(relayer.relay().await.unwrap(), RelayOutcome::default());
        assert_eq!(bridge.sent().len(), 1);
    }

    #[tokio::test]
    async fn unchecked_events_are_not_relayed() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());

        let log = origination_log(Chain::L1, BRIDGE, 101, H256::repeat_byte(1), 1, &payload(1));
        let timestamps = HashMap::from([(101, 0)]);
        let unchecked = chain_events::decode_log(Chain::L1, 1, &log, &timestamps)
            .unwrap()
            .unwrap();
        store.insert_raw_events(Chain::L1, &[unchecked]).await.unwrap();

        let relayer = Relayer::downward(bridge.clone(), store, config(), metrics());
        assert_eq!(relayer.relay().await.unwrap(), RelayOutcome::default());
        assert!(bridge.sent().is_empty());
    }

    #[tokio::test]
    async fn executed_message_is_recorded_without_a_transaction() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());
        let hash = deposit(&store, 1).await;
        bridge.executed.lock().unwrap().insert(hash);

        let relayer = Relayer::downward(bridge.clone(), store.clone(), config(), metrics());
        assert_eq!(
            relayer.relay().await.unwrap(),
            RelayOutcome {
                already_executed: 1,
                ..Default::default()
            }
        );

        assert!(bridge.sent().is_empty());
        assert_eq!(
            event(&store, Chain::L1, hash).process_status,
            ProcessStatus::Processed
        );
        let message = only_cross_message(&store);
        assert_eq!(message.message_hash, hash);
        assert_eq!(message.relay_tx_hash, None);
    }

    #[tokio::test]
    async fn already_executed_revert_counts_as_delivered() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());
        let hash = deposit(&store, 1).await;
        bridge.revert_with("execution reverted: message already executed");

        let relayer = Relayer::downward(bridge.clone(), store.clone(), config(), metrics());
        assert_eq!(
            relayer.relay().await.unwrap(),
            RelayOutcome {
                already_executed: 1,
                ..Default::default()
            }
        );

        assert_eq!(
            event(&store, Chain::L1, hash).process_status,
            ProcessStatus::Processed
        );
        assert_eq!(only_cross_message(&store).tx_status, TxStatus::Sent);
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_up_to_the_attempt_cap() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());
        let hash = deposit(&store, 1).await;
        bridge.revert_with("execution reverted: paused");

        let relayer = Relayer::downward(bridge.clone(), store.clone(), config(), metrics());

        for attempt in 1..=2 {
            assert_eq!(
                relayer.relay().await.unwrap(),
                RelayOutcome {
                    failed: 1,
                    ..Default::default()
                }
            );

            let failed = event(&store, Chain::L1, hash);
            assert_eq!(failed.process_status, ProcessStatus::ProcessFailed);
            assert_eq!(failed.process_attempts, attempt);
            assert!(failed.fail_reason.unwrap().contains("paused"));
        }

        // The cap is reached, the event waits for an operator.
        assert_eq!(relayer.relay().await.unwrap(), RelayOutcome::default());
        assert_eq!(bridge.sent().len(), 2);
        assert!(store.cross_messages().is_empty());

        let id = event(&store, Chain::L1, hash).id;
        assert!(store.reset_process_status(Chain::L1, id).await.unwrap());
        *bridge.revert.lock().unwrap() = None;

        assert_eq!(
            relayer.relay().await.unwrap(),
            RelayOutcome {
                delivered: 1,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn node_outage_does_not_count_as_an_attempt() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());
        let hash = deposit(&store, 1).await;
        *bridge.outage.lock().unwrap() = 3;

        let relayer = Relayer::downward(bridge.clone(), store.clone(), config(), metrics());

        // More failing passes than the attempt cap allows.
        for _ in 0..3 {
            assert!(matches!(
                relayer.relay().await,
                Err(Error::ClientError(client::Error::Middleware(_)))
            ));

            let pending = event(&store, Chain::L1, hash);
            assert_eq!(pending.process_status, ProcessStatus::UnProcessed);
            assert_eq!(pending.process_attempts, 0);
            assert_eq!(pending.fail_reason, None);
        }
        assert!(bridge.sent().is_empty());

        assert_eq!(
            relayer.relay().await.unwrap(),
            RelayOutcome {
                delivered: 1,
                ..Default::default()
            }
        );
        assert_eq!(
            event(&store, Chain::L1, hash).process_status,
            ProcessStatus::Processed
        );
    }

    #[tokio::test]
    async fn upward_delivery_carries_ordered_signatures() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());
        let signers = signers();

        let log = origination_log(
            Chain::L2,
            BRIDGE,
            300,
            H256::repeat_byte(3),
            9,
            &BridgePayload::NativeCoin {
                from: Address::repeat_byte(0xaa),
                to: Address::repeat_byte(0xbb),
                amount: 1000.into(),
            },
        );
        let hash = store_checked(&store, Chain::L2, log).await;

        let relayer = Relayer::upward(
            bridge.clone(),
            signers.clone(),
            store.clone(),
            config(),
            metrics(),
        )
        .unwrap();
        assert_eq!(relayer.direction(), Direction::Upward);
        assert_eq!(
            relayer.relay().await.unwrap(),
            RelayOutcome {
                delivered: 1,
                ..Default::default()
            }
        );

        let relayed = event(&store, Chain::L2, hash);
        let message = RelayMessage::from_event(&relayed);
        let digest = upward_digest(&[message.clone()]);

        let sent = bridge.sent();
        assert_eq!(sent[0].0, "receiveUpwardMessages");
        let [Token::Array(messages), Token::Array(proof)] = sent[0].1.as_slice() else {
            panic!("unexpected args {:?}", sent[0].1);
        };
        assert_eq!(messages, &vec![message.to_token()]);
        assert_eq!(proof.len(), 2);

        for (token, signer) in proof.iter().zip(&signers) {
            let Token::Bytes(bytes) = token else {
                panic!("unexpected proof {token:?}");
            };
            let signature = Signature::try_from(bytes.as_slice()).unwrap();
            assert_eq!(signature.recover(digest).unwrap(), signer.address());
        }

        let cross = only_cross_message(&store);
        assert_eq!(cross.message_type, MessageType::L2Message);
        assert_eq!(cross.tx_type, TxType::Withdraw);
        assert_eq!(cross.l2_tx_hash, Some(H256::repeat_byte(3)));
        assert_eq!(cross.l1_tx_hash, None);
        assert_eq!(cross.multi_sign_proof.len(), 2);
    }

    #[tokio::test]
    async fn upward_relayer_needs_signers() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());

        assert!(matches!(
            Relayer::upward(bridge, vec![], store, config(), metrics()),
            Err(Error::NoSigners)
        ));
    }

    #[tokio::test]
    async fn confirmation_consumes_the_sent_message() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());
        let hash = deposit(&store, 5).await;

        let downward = Relayer::downward(bridge.clone(), store.clone(), config(), metrics());
        downward.relay().await.unwrap();

        // The deposit is executed on L2; the upward relayer reads L2 events.
        let log = confirmation_log(Chain::L2, BRIDGE, 500, H256::repeat_byte(0x42), hash, 5);
        let confirmation = store_checked(&store, Chain::L2, log).await;
        assert_eq!(
            event(&store, Chain::L2, confirmation).event_type,
            EventType::L2Relayed
        );

        let upward =
            Relayer::upward(bridge.clone(), signers(), store.clone(), config(), metrics()).unwrap();
        assert_eq!(
            upward.relay().await.unwrap(),
            RelayOutcome {
                consumed: 1,
                ..Default::default()
            }
        );

        let message = only_cross_message(&store);
        assert_eq!(message.tx_status, TxStatus::Consumed);
        assert_eq!(message.l2_tx_hash, Some(H256::repeat_byte(0x42)));
        assert_eq!(message.l2_block_number, Some(500));
        assert_eq!(
            event(&store, Chain::L2, confirmation).process_status,
            ProcessStatus::Processed
        );

        // A later upsert of the same message does not revert the status.
        downward.relay().await.unwrap();
        let sent = cross_message(
            &event(&store, Chain::L1, hash),
            &payload(5),
            Some(RELAY_TX),
            vec![],
        );
        store.upsert_cross_messages(&[sent]).await.unwrap();
        assert_eq!(only_cross_message(&store).tx_status, TxStatus::Consumed);
    }

    #[tokio::test]
    async fn unmatched_confirmation_is_left_for_retry() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());

        let log = confirmation_log(
            Chain::L1,
            BRIDGE,
            700,
            H256::repeat_byte(0x43),
            H256::repeat_byte(0x99),
            1,
        );
        let confirmation = store_checked(&store, Chain::L1, log).await;

        let relayer = Relayer::downward(bridge.clone(), store.clone(), config(), metrics());
        for _ in 0..2 {
            assert_eq!(
                relayer.relay().await.unwrap(),
                RelayOutcome {
                    unmatched: 1,
                    ..Default::default()
                }
            );
        }

        assert_eq!(
            event(&store, Chain::L1, confirmation).process_status,
            ProcessStatus::UnProcessed
        );
        assert!(bridge.sent().is_empty());
    }

    #[tokio::test]
    async fn unmatched_confirmations_do_not_hold_deliveries_back() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());
        let config = RelayerConfig {
            batch_size: 2,
            ..config()
        };

        // A full batch of confirmations older than the deposit, none matching.
        for nonce in 1..=2 {
            let log = confirmation_log(
                Chain::L1,
                BRIDGE,
                700 + nonce,
                H256::from_low_u64_be(0x700 + nonce),
                H256::from_low_u64_be(0x900 + nonce),
                nonce,
            );
            store_checked(&store, Chain::L1, log).await;
        }
        let hash = deposit(&store, 3).await;

        let relayer = Relayer::downward(bridge.clone(), store.clone(), config, metrics());
        assert_eq!(
            relayer.relay().await.unwrap(),
            RelayOutcome {
                delivered: 1,
                unmatched: 2,
                ..Default::default()
            }
        );

        assert_eq!(bridge.sent().len(), 1);
        assert_eq!(only_cross_message(&store).message_hash, hash);
    }

    #[tokio::test]
    async fn task_is_named_after_its_direction() {
        let store = Arc::new(InMemoryStore::new());
        let bridge = Arc::new(FakeBridge::default());

        let relayer = Relayer::downward(bridge, store, config(), metrics());
        assert_eq!(relayer.name(), "downward_relayer");
        assert_eq!(relayer.interval(), Duration::from_secs(1));
        relayer.run().await.unwrap();
    }
}
