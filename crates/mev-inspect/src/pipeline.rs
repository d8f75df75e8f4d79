//! Block analysis pipeline.
//!
//! One block costs O(1) batched round trips: the block fetch, one receipt
//! batch, one account/code batch for the touched-address union, and one
//! pool-token batch for pools seen in swap topics. Everything after that
//! runs locally against the shared state cache; nothing downstream issues
//! a per-transaction RPC. Per-transaction failures are captured in the
//! result and never abort the block.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy::primitives::{Address, B256};
use mev_data::cache::StateCache;
use mev_data::pool_store::PoolTokenStore;
use mev_data::types::{
    BlockHeader, InspectionResult, Receipt, Swap, Transaction, TransactionInfo,
};
use mev_data::{Result, RpcClient};
use mev_detect::swaps::SwapDetectorStats;
use mev_detect::{find_arbitrages, find_sandwiches, whatif, SwapDetector};
use mev_replay::decoder;
use mev_replay::Replayer;

use crate::options::InspectOptions;

/// Everything fetched for one block, memoized so re-analysis of the same
/// block is RPC-free.
struct BlockData {
    header: BlockHeader,
    transactions: Vec<Transaction>,
    receipts: HashMap<B256, Receipt>,
}

/// The inspection engine. Owns the RPC facade and the persistent
/// pool-token store; builds a per-block state cache on demand and keeps
/// the most recent block's data and cache warm.
pub struct Inspector {
    rpc: Arc<RpcClient>,
    pool_store: Arc<PoolTokenStore>,
    block_memo: Mutex<Option<(u64, Arc<BlockData>)>>,
    cache_memo: Mutex<Option<(u64, Arc<StateCache>)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inspector {
    pub fn new(rpc: Arc<RpcClient>, pool_store: Arc<PoolTokenStore>) -> Self {
        Self {
            rpc,
            pool_store,
            block_memo: Mutex::new(None),
            cache_memo: Mutex::new(None),
        }
    }

    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }

    /// Analyze one block end to end.
    #[tracing::instrument(skip(self, options), fields(block_number))]
    pub async fn analyze_block(
        &self,
        block_number: u64,
        options: &InspectOptions,
    ) -> Result<InspectionResult> {
        let block = self.fetch_block_data(block_number).await?;
        let cache = self.cache_for(block_number, options);

        tracing::info!(
            block_number,
            transactions = block.transactions.len(),
            "analyzing block"
        );

        self.seed_block_state(&block, &cache, block_number).await?;

        let replayer = Replayer::new(cache.clone(), &block.header);
        let mut detector = SwapDetector::new(options.min_confidence);

        let mut transactions_info = Vec::with_capacity(block.transactions.len());
        let mut all_swaps = Vec::new();
        let mut multi_hop_swaps = Vec::new();
        let mut arbitrages = Vec::new();
        let mut gas_costs: HashMap<B256, u128> = HashMap::new();

        for tx in &block.transactions {
            let Some(receipt) = block.receipts.get(&tx.hash) else {
                transactions_info.push(missing_receipt_info(tx));
                continue;
            };
            gas_costs.insert(tx.hash, receipt.gas_cost_wei());

            let mut info = transaction_info(tx, receipt);
            if receipt.status {
                match self
                    .analyze_transaction(&replayer, &mut detector, &cache, tx, receipt)
                    .await
                {
                    Ok(mut swaps) => {
                        multi_hop_swaps.extend(detector.group_multi_hops(&mut swaps));
                        info.parsed_swaps = swaps.len();
                        arbitrages.extend(find_arbitrages(
                            &swaps,
                            receipt.gas_cost_wei(),
                            options.arb_epsilon,
                        ));
                        all_swaps.extend(swaps);
                    }
                    Err(err) => {
                        tracing::warn!(tx_hash = %tx.hash, %err, "transaction analysis failed");
                        info.error = Some(err.to_string());
                    }
                }
            }
            transactions_info.push(info);
        }

        let sandwiches = find_sandwiches(&all_swaps, &gas_costs);

        let mut whatif_opportunities = Vec::new();
        if options.what_if {
            whatif_opportunities.extend(
                whatif::find_arbitrage_whatif(
                    &cache,
                    &self.rpc,
                    &all_swaps,
                    options.whatif_max_depth,
                    block_number,
                )
                .await?,
            );
            whatif_opportunities
                .extend(whatif::find_sandwich_whatif(&cache, &self.rpc, &all_swaps, block_number).await?);
        }

        log_detector_stats(block_number, detector.stats());

        Ok(InspectionResult {
            block_number,
            transactions: transactions_info,
            swaps: all_swaps,
            multi_hop_swaps,
            arbitrages,
            sandwiches,
            whatif_opportunities,
        })
    }

    /// Replay then detect; the replay result is dropped as soon as the
    /// detectors have consumed it.
    async fn analyze_transaction(
        &self,
        replayer: &Replayer,
        detector: &mut SwapDetector,
        cache: &Arc<StateCache>,
        tx: &Transaction,
        receipt: &Receipt,
    ) -> Result<Vec<Swap>> {
        let replay = replayer.replay(tx, receipt).await?;
        detector.detect(cache, &self.rpc, tx, receipt, &replay).await
    }

    /// Steps 3 and 4: one batched round trip for the touched-address
    /// union, factory-event seeding with no RPC at all, and one batched
    /// round trip for unknown pool tokens.
    async fn seed_block_state(
        &self,
        block: &BlockData,
        cache: &Arc<StateCache>,
        block_number: u64,
    ) -> Result<()> {
        if block.transactions.is_empty() {
            return Ok(());
        }

        let mut addresses: BTreeSet<Address> = BTreeSet::new();
        let mut pools: BTreeSet<Address> = BTreeSet::new();

        // Every replay touches the coinbase.
        addresses.insert(block.header.miner);

        for tx in &block.transactions {
            addresses.insert(tx.from);
            if let Some(to) = tx.to {
                addresses.insert(to);
            }
            let Some(receipt) = block.receipts.get(&tx.hash) else {
                continue;
            };
            for log in &receipt.logs {
                addresses.insert(log.address);
                // Address-shaped indexed topics join the union so the
                // replayer's candidate preload is already cached.
                for topic in log.topics.iter().skip(1) {
                    if let Some(address) =
                        decoder::address_from_word(alloy::primitives::U256::from_be_bytes(topic.0))
                    {
                        addresses.insert(address);
                    }
                }
                if let Some((pool, tokens)) = decoder::factory_created_pool(log) {
                    cache.install_many_pool_tokens([(pool, tokens)], block_number)?;
                }
                if log.topic0().is_some_and(decoder::is_swap_topic) {
                    pools.insert(log.address);
                }
            }
        }

        let address_list: Vec<Address> = addresses.into_iter().collect();
        let preloaded = cache.preload_addresses(&address_list).await?;
        tracing::debug!(preloaded, total = address_list.len(), "seeded account cache");

        let unknown_pools: Vec<Address> = pools
            .into_iter()
            .filter(|pool| cache.pool_tokens(*pool).is_none())
            .collect();
        if !unknown_pools.is_empty() {
            let fetched = self.rpc.batch_pool_tokens(&unknown_pools, block_number).await?;
            let installed = cache.install_many_pool_tokens(fetched, block_number)?;
            tracing::debug!(installed, requested = unknown_pools.len(), "seeded pool tokens");
        }
        Ok(())
    }

    async fn fetch_block_data(&self, block_number: u64) -> Result<Arc<BlockData>> {
        if let Some((memoized, data)) = lock(&self.block_memo).as_ref() {
            if *memoized == block_number {
                return Ok(data.clone());
            }
        }

        let (header, transactions) = self.rpc.get_block(block_number, true).await?;
        let hashes: Vec<B256> = transactions.iter().map(|tx| tx.hash).collect();
        let receipts = self.rpc.batch_receipts(&hashes).await?;

        let data = Arc::new(BlockData {
            header,
            transactions,
            receipts,
        });
        *lock(&self.block_memo) = Some((block_number, data.clone()));
        Ok(data)
    }

    /// Process-wide cache per block number: re-analysis of the warm block
    /// reuses its cache (and therefore issues no state RPCs).
    fn cache_for(&self, block_number: u64, options: &InspectOptions) -> Arc<StateCache> {
        let mut memo = lock(&self.cache_memo);
        if let Some((memoized, cache)) = memo.as_ref() {
            if *memoized == block_number {
                return cache.clone();
            }
        }
        let cache = Arc::new(StateCache::new(
            self.rpc.clone(),
            self.pool_store.clone(),
            block_number,
            options.cache_sizes,
        ));
        *memo = Some((block_number, cache.clone()));
        cache
    }
}

fn transaction_info(tx: &Transaction, receipt: &Receipt) -> TransactionInfo {
    let event_signatures: Vec<B256> = receipt.logs.iter().filter_map(|log| log.topic0()).collect();
    let swap_events_found = event_signatures
        .iter()
        .filter(|topic| decoder::is_swap_topic(**topic))
        .count();
    TransactionInfo {
        hash: tx.hash,
        from: tx.from,
        to: tx.to,
        value: tx.value,
        gas_used: receipt.gas_used,
        gas_price: receipt.effective_gas_price,
        status: receipt.status,
        log_count: receipt.logs.len(),
        swap_events_found,
        parsed_swaps: 0,
        method_signature: tx
            .selector()
            .map(|sel| format!("0x{}", alloy::hex::encode(sel))),
        event_signatures,
        error: None,
    }
}

fn missing_receipt_info(tx: &Transaction) -> TransactionInfo {
    TransactionInfo {
        hash: tx.hash,
        from: tx.from,
        to: tx.to,
        value: tx.value,
        gas_used: 0,
        gas_price: tx.gas_price,
        status: false,
        log_count: 0,
        swap_events_found: 0,
        parsed_swaps: 0,
        method_signature: tx
            .selector()
            .map(|sel| format!("0x{}", alloy::hex::encode(sel))),
        event_signatures: Vec::new(),
        error: Some("receipt not found".to_string()),
    }
}

fn log_detector_stats(block_number: u64, stats: SwapDetectorStats) {
    tracing::info!(
        block_number,
        transactions = stats.transactions_analyzed,
        hybrid = stats.swaps_hybrid,
        log_only = stats.swaps_log_only,
        call_only = stats.swaps_call_only,
        multi_hop = stats.multi_hop_groups,
        filtered = stats.false_positives_filtered,
        token_failures = stats.token_resolution_failures,
        "swap detection finished"
    );
}
