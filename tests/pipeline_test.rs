//! End-to-end pipeline tests: mock chain sources feeding real trackers,
//! the real relay with a recording destination chain, and the replay
//! indexer against a mock event service.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_relayer::chains::{Chain, DepositHandler, ObserverHandle};
use bridge_relayer::error::{ChainError, QueryError, RelayError};
use bridge_relayer::indexer::sink::{FinalizedVisitor, MinedVisitor};
use bridge_relayer::indexer::{
    visit_all, EventSink, EventVisitor, TxEvent, TxEventPage, TxEventQuery,
    EVENT_SEND_FINALIZED, EVENT_SEND_MINED,
};
use bridge_relayer::memo::encode_utxo_memo;
use bridge_relayer::registry::ChainRegistry;
use bridge_relayer::relay::Relay;
use bridge_relayer::signer::ThresholdSigner;
use bridge_relayer::tracker::{
    BlockData, BlockSource, BlockTracker, TrackerConfig, TxData, TxOutput,
};
use bridge_relayer::types::{ChainId, ChainKind, CrossChainPayload};

mod helpers {
    use super::*;

    pub const DEPOSIT_SCRIPT: &[u8] = &[0x76, 0xa9, 0x14, 0x42];

    /// In-memory UTXO chain: blocks by height, everything confirmed unless
    /// overridden.
    pub struct MockSource {
        pub tip: u64,
        pub confirmations: HashMap<u64, u64>,
        pub blocks: HashMap<u64, Vec<TxData>>,
    }

    #[async_trait]
    impl BlockSource for MockSource {
        async fn block_hash(&self, height: u64) -> Result<Option<String>, ChainError> {
            if height > self.tip {
                return Ok(None);
            }
            Ok(Some(format!("hash-{height}")))
        }

        async fn block(&self, hash: &str) -> Result<BlockData, ChainError> {
            let height: u64 = hash
                .trim_start_matches("hash-")
                .parse()
                .map_err(|_| ChainError::BadResponse(format!("bad hash {hash}")))?;
            Ok(BlockData {
                hash: hash.to_string(),
                confirmations: *self.confirmations.get(&height).unwrap_or(&100),
                tx_ids: self
                    .blocks
                    .get(&height)
                    .map(|txs| txs.iter().map(|t| t.tx_id.clone()).collect())
                    .unwrap_or_default(),
            })
        }

        async fn transaction(&self, tx_id: &str) -> Result<TxData, ChainError> {
            for txs in self.blocks.values() {
                if let Some(tx) = txs.iter().find(|t| t.tx_id == tx_id) {
                    return Ok(tx.clone());
                }
            }
            Err(ChainError::BadResponse(format!("unknown tx {tx_id}")))
        }
    }

    /// Destination chain that records every relayed payload.
    pub struct RecordingChain {
        pub id: ChainId,
        pub name: &'static str,
        pub relayed: Mutex<Vec<CrossChainPayload>>,
    }

    impl RecordingChain {
        pub fn new(id: u32, name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id: ChainId(id),
                name,
                relayed: Mutex::new(vec![]),
            })
        }
    }

    #[async_trait]
    impl Chain for RecordingChain {
        fn id(&self) -> ChainId {
            self.id
        }

        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ChainKind {
            ChainKind::Account
        }

        async fn start_observing(
            &self,
            _handler: Arc<dyn DepositHandler>,
        ) -> Result<ObserverHandle, ChainError> {
            unimplemented!("recording chains are destinations only")
        }

        async fn relay_receive(
            &self,
            payload: &CrossChainPayload,
            _signer: &dyn ThresholdSigner,
        ) -> Result<String, RelayError> {
            self.relayed.lock().unwrap().push(payload.clone());
            Ok(format!("0xout{}", self.relayed.lock().unwrap().len()))
        }
    }

    pub struct NoopSigner;

    #[async_trait]
    impl ThresholdSigner for NoopSigner {
        async fn sign_digest(
            &self,
            _digest: alloy::primitives::B256,
        ) -> Result<alloy::primitives::PrimitiveSignature, bridge_relayer::error::SignerError> {
            Err(bridge_relayer::error::SignerError::Sign(
                "not used by recording chains".to_string(),
            ))
        }

        fn address(&self) -> alloy::primitives::Address {
            alloy::primitives::Address::ZERO
        }
    }

    pub fn tracker_config(chain_id: u32) -> TrackerConfig {
        TrackerConfig {
            chain_id: ChainId(chain_id),
            chain_name: "utxonet".to_string(),
            deposit_script: DEPOSIT_SCRIPT.to_vec(),
            min_confirmations: 6,
            poll_interval: Duration::from_millis(5),
            dedup_retention_blocks: 1_000,
        }
    }

    /// A deposit transaction paying the bridge script with a valid memo.
    pub fn deposit_tx(tx_id: &str, dest_chain: u32, dest_address: &[u8], value: u64) -> TxData {
        let memo = encode_utxo_memo(&CrossChainPayload {
            src_chain: ChainId(1),
            dest_chain: ChainId(dest_chain),
            dest_address: dest_address.to_vec(),
            amount: value as u128,
            message: None,
            gas_limit: None,
        })
        .expect("test memo must encode");
        let mut op_return = vec![0x6a, memo.len() as u8];
        op_return.extend_from_slice(&memo);

        TxData {
            tx_id: tx_id.to_string(),
            outputs: vec![
                TxOutput {
                    value,
                    script: DEPOSIT_SCRIPT.to_vec(),
                },
                TxOutput {
                    value: 0,
                    script: op_return,
                },
            ],
        }
    }

    pub fn relay_with(dest: Arc<RecordingChain>) -> Arc<Relay> {
        let mut registry = ChainRegistry::new();
        registry.register(dest).unwrap();
        Arc::new(Relay::new(Arc::new(registry), Arc::new(NoopSigner)))
    }

    pub async fn run_tracker_until_idle(
        source: MockSource,
        config: TrackerConfig,
        start_height: u64,
        relay: Arc<Relay>,
    ) {
        let handle = BlockTracker::spawn(Arc::new(source), config, start_height, relay);
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await.expect("tracker must stop cleanly");
    }
}

use helpers::*;

#[tokio::test]
async fn scenario_a_valid_deposit_relayed_exactly_once() {
    let dest = RecordingChain::new(5, "evmnet");
    let relay = relay_with(dest.clone());

    let source = MockSource {
        tip: 10,
        confirmations: HashMap::new(),
        blocks: HashMap::from([(10, vec![deposit_tx("tx-a", 5, &[0xab, 0xcd], 100_000)])]),
    };

    run_tracker_until_idle(source, tracker_config(1), 10, relay).await;

    let relayed = dest.relayed.lock().unwrap();
    assert_eq!(relayed.len(), 1, "one confirmed deposit, one relay");
    assert_eq!(relayed[0].dest_chain, ChainId(5));
    assert_eq!(relayed[0].dest_address, vec![0xab, 0xcd]);
    assert_eq!(relayed[0].amount, 100_000);
    assert_eq!(relayed[0].src_chain, ChainId(1));
}

#[tokio::test]
async fn scenario_b_duplicate_tx_hash_relayed_once() {
    let dest = RecordingChain::new(5, "evmnet");
    let relay = relay_with(dest.clone());

    // The same transaction id appears in two consecutive blocks, as a
    // replayed delivery would.
    let tx = deposit_tx("tx-dup", 5, &[0xab], 42_000);
    let source = MockSource {
        tip: 11,
        confirmations: HashMap::new(),
        blocks: HashMap::from([(10, vec![tx.clone()]), (11, vec![tx])]),
    };

    run_tracker_until_idle(source, tracker_config(1), 10, relay).await;

    assert_eq!(
        dest.relayed.lock().unwrap().len(),
        1,
        "a replayed transaction id must relay exactly once"
    );
}

#[tokio::test]
async fn scenario_c_undecodable_memo_skipped_and_pipeline_continues() {
    let dest = RecordingChain::new(5, "evmnet");
    let relay = relay_with(dest.clone());

    let mut bad = deposit_tx("tx-bad", 5, &[0xab], 9_000);
    bad.outputs[1].script = vec![0x6a, 0x04, 0xde, 0xad, 0xbe, 0xef];
    let good = deposit_tx("tx-good", 5, &[0xcd], 8_000);

    let source = MockSource {
        tip: 11,
        confirmations: HashMap::new(),
        blocks: HashMap::from([(10, vec![bad]), (11, vec![good])]),
    };

    run_tracker_until_idle(source, tracker_config(1), 10, relay).await;

    let relayed = dest.relayed.lock().unwrap();
    assert_eq!(relayed.len(), 1, "only the decodable deposit relays");
    assert_eq!(relayed[0].dest_address, vec![0xcd]);
}

#[tokio::test]
async fn scenario_e_unknown_destination_dropped_process_continues() {
    let dest = RecordingChain::new(5, "evmnet");
    let relay = relay_with(dest.clone());

    let source = MockSource {
        tip: 11,
        confirmations: HashMap::new(),
        blocks: HashMap::from([
            // Chain 9 is not registered; this payload is dropped
            (10, vec![deposit_tx("tx-unknown", 9, &[0xab], 5_000)]),
            (11, vec![deposit_tx("tx-known", 5, &[0xcd], 6_000)]),
        ]),
    };

    run_tracker_until_idle(source, tracker_config(1), 10, relay).await;

    let relayed = dest.relayed.lock().unwrap();
    assert_eq!(
        relayed.len(),
        1,
        "the unresolvable payload is dropped without stopping the observer"
    );
    assert_eq!(relayed[0].amount, 6_000);
}

#[tokio::test]
async fn confirmation_gate_holds_until_threshold() {
    let dest = RecordingChain::new(5, "evmnet");
    let relay = relay_with(dest.clone());

    let source = MockSource {
        tip: 10,
        confirmations: HashMap::from([(10, 2)]),
        blocks: HashMap::from([(10, vec![deposit_tx("tx-a", 5, &[0xab], 1_000)])]),
    };

    run_tracker_until_idle(source, tracker_config(1), 10, relay).await;

    assert!(
        dest.relayed.lock().unwrap().is_empty(),
        "a block below the confirmation threshold must not be analyzed"
    );
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

/// Mock event service with its own page size, independent of the requested
/// limit, counting fetches.
struct MockEventService {
    events: Vec<TxEvent>,
    page_size: usize,
    fetches: AtomicU32,
}

#[async_trait]
impl TxEventQuery for MockEventService {
    async fn tx_events(
        &self,
        _subtype: &str,
        offset: u64,
        _limit: u64,
    ) -> Result<TxEventPage, QueryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let offset = offset as usize;
        let end = (offset + self.page_size).min(self.events.len());
        Ok(TxEventPage {
            events: self.events.get(offset..end).unwrap_or(&[]).to_vec(),
            total: self.events.len() as u64,
        })
    }
}

fn finalized_event(i: usize) -> TxEvent {
    TxEvent {
        tx_hash: format!("0xin{i}"),
        height: i as u64,
        attributes: vec![
            ("send_hash".to_string(), format!("0xsend{i}")),
            ("in_tx_hash".to_string(), format!("0xin{i}")),
        ],
    }
}

#[tokio::test]
async fn scenario_d_five_events_page_two() {
    let service = MockEventService {
        events: (0..5).map(finalized_event).collect(),
        page_size: 2,
        fetches: AtomicU32::new(0),
    };
    let sink = EventSink::in_memory().await.unwrap();
    sink.init_schema().await.unwrap();

    let processed = visit_all(
        &service,
        EVENT_SEND_FINALIZED,
        0,
        &mut FinalizedVisitor { sink: &sink },
    )
    .await
    .unwrap();

    assert_eq!(processed, 5);
    assert_eq!(service.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(sink.finalized_count().await.unwrap(), 5);
    assert_eq!(
        sink.finalized_in_tx("0xsend3").await.unwrap().as_deref(),
        Some("0xin3")
    );
}

#[tokio::test]
async fn indexer_replay_is_idempotent_over_overlap() {
    let service = MockEventService {
        events: (0..4).map(finalized_event).collect(),
        page_size: 3,
        fetches: AtomicU32::new(0),
    };
    let sink = EventSink::in_memory().await.unwrap();
    sink.init_schema().await.unwrap();

    visit_all(&service, EVENT_SEND_FINALIZED, 0, &mut FinalizedVisitor { sink: &sink })
        .await
        .unwrap();
    // Replaying the same history skips every duplicate without error
    visit_all(&service, EVENT_SEND_FINALIZED, 0, &mut FinalizedVisitor { sink: &sink })
        .await
        .unwrap();

    assert_eq!(sink.finalized_count().await.unwrap(), 4);
}

#[tokio::test]
async fn indexer_mined_rows_correlate_with_finalized() {
    let sink = EventSink::in_memory().await.unwrap();
    sink.init_schema().await.unwrap();

    let mut finalized = FinalizedVisitor { sink: &sink };
    finalized.visit(&finalized_event(0)).await.unwrap();

    let mined = TxEvent {
        tx_hash: "0xchain".to_string(),
        height: 9,
        attributes: vec![
            ("send_hash".to_string(), "0xsend0".to_string()),
            ("out_tx_hash".to_string(), "0xout0".to_string()),
        ],
    };
    let mut visitor = MinedVisitor { sink: &sink };
    visit_all(
        &MockEventService {
            events: vec![mined],
            page_size: 10,
            fetches: AtomicU32::new(0),
        },
        EVENT_SEND_MINED,
        0,
        &mut visitor,
    )
    .await
    .unwrap();

    assert_eq!(
        sink.finalized_in_tx("0xsend0").await.unwrap().as_deref(),
        Some("0xin0"),
        "inbound leg recorded"
    );
    assert_eq!(
        sink.mined_out_tx("0xsend0").await.unwrap().as_deref(),
        Some("0xout0"),
        "outbound leg recorded under the same send identifier"
    );
}
