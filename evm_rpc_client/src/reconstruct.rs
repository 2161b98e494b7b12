use std::collections::{HashMap, HashSet};

use serde_json::json;
use tracing::{debug, info, warn};

use tracker_core::BlockRange;

use crate::block_time::{estimate_timestamp_of, BlockAnchor};
use crate::error::EvmRpcError;
use crate::executor::EvmCall;
use crate::types::{
    pad_topic_address, parse_hex_i64, parse_hex_u64, to_hex_block, RawTransferCandidate,
    RpcBlock, RpcBlockHeader, RpcLog, RpcOutcome, RpcTransaction, TRANSFER_EVENT_TOPIC,
};

/// Cost ceilings for the scan strategies.
#[derive(Debug, Clone, Copy)]
pub struct ScanLimits {
    /// Widest range the per-block walk will attempt
    pub direct_block_parse_limit: u64,
    /// Most logs the unfiltered sweep will resolve
    pub broad_log_limit: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            direct_block_parse_limit: 500,
            broad_log_limit: 1_000,
        }
    }
}

/// Reconstructs incoming transfers for one address over one block range.
///
/// Bare JSON-RPC nodes keep no per-address transfer index, so native
/// discovery runs as an escalation ladder: a narrow log scan first, a
/// per-block walk when the range is small enough, then an unfiltered log
/// sweep. Later rungs are strictly more expensive and only run when the
/// previous one came back empty.
pub struct TransferScanner<'a> {
    call: &'a dyn EvmCall,
    address: String,
    limits: ScanLimits,
}

impl<'a> TransferScanner<'a> {
    pub fn new(call: &'a dyn EvmCall, address: &str, limits: ScanLimits) -> Self {
        Self {
            call,
            address: address.to_lowercase(),
            limits,
        }
    }

    /// Native transfer discovery over the escalation ladder. Stops at the
    /// first strategy that yields candidates; an all-empty run is a valid
    /// "nothing happened in this window" answer.
    pub async fn find_native_candidates(
        &self,
        range: BlockRange,
    ) -> Result<Vec<RawTransferCandidate>, EvmRpcError> {
        if range.is_degenerate() {
            debug!("📭 Degenerate block range, skipping native scan");
            return Ok(Vec::new());
        }

        let candidates = self.scan_filtered_logs(range).await?;
        if !candidates.is_empty() {
            info!(
                "💰 Found {} native transfer(s) via filtered log scan",
                candidates.len()
            );
            return Ok(candidates);
        }

        if range.span() <= self.limits.direct_block_parse_limit {
            debug!(
                "🔄 Escalating to direct block scan over {} block(s)",
                range.span() + 1
            );
            let candidates = self.scan_blocks_direct(range).await?;
            if !candidates.is_empty() {
                info!(
                    "💰 Found {} native transfer(s) via direct block scan",
                    candidates.len()
                );
                return Ok(candidates);
            }
        }

        debug!("🔄 Escalating to broad log scan");
        let candidates = self.scan_broad_logs(range).await?;
        if candidates.is_empty() {
            debug!(
                "📭 No native transfers in blocks {}..{}",
                range.start_block, range.end_block
            );
        } else {
            info!(
                "💰 Found {} native transfer(s) via broad log scan",
                candidates.len()
            );
        }
        Ok(candidates)
    }

    /// Token transfer discovery: one filtered `eth_getLogs` call keyed on
    /// the Transfer event signature and the padded destination address.
    /// Logs are the only legitimate source for token transfers, so there
    /// is no fallback ladder here.
    pub async fn find_token_candidates(
        &self,
        range: BlockRange,
    ) -> Result<Vec<RawTransferCandidate>, EvmRpcError> {
        if range.is_degenerate() {
            debug!("📭 Degenerate block range, skipping token scan");
            return Ok(Vec::new());
        }
        let params = json!([{
            "fromBlock": to_hex_block(range.start_block),
            "toBlock": to_hex_block(range.end_block),
            "topics": [
                TRANSFER_EVENT_TOPIC,
                null,
                pad_topic_address(&self.address),
            ],
        }]);
        let logs = match self.call.call("eth_getLogs", params).await {
            RpcOutcome::Success(value) => serde_json::from_value::<Vec<RpcLog>>(value)?,
            RpcOutcome::Empty => Vec::new(),
            RpcOutcome::Recoverable(reason) | RpcOutcome::Fatal(reason) => {
                return Err(EvmRpcError::CallFailed { message: reason });
            }
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for log in &logs {
            if let Some(candidate) = token_candidate_from_log(log) {
                if seen.insert(candidate.hash().to_string()) {
                    candidates.push(candidate);
                }
            }
        }
        if !candidates.is_empty() {
            info!(
                "📄 Found {} token transfer log(s) in blocks {}..{}",
                candidates.len(),
                range.start_block,
                range.end_block
            );
        }
        Ok(candidates)
    }

    /// Strategy 1: one narrow `eth_getLogs` call matching any event that
    /// carries the padded destination address as a topic, then resolve
    /// each matched transaction.
    async fn scan_filtered_logs(
        &self,
        range: BlockRange,
    ) -> Result<Vec<RawTransferCandidate>, EvmRpcError> {
        let params = json!([{
            "fromBlock": to_hex_block(range.start_block),
            "toBlock": to_hex_block(range.end_block),
            "topics": [null, null, pad_topic_address(&self.address)],
        }]);
        let logs = match self.call.call("eth_getLogs", params).await {
            RpcOutcome::Success(value) => serde_json::from_value::<Vec<RpcLog>>(value)?,
            RpcOutcome::Empty => return Ok(Vec::new()),
            RpcOutcome::Recoverable(reason) | RpcOutcome::Fatal(reason) => {
                return Err(EvmRpcError::CallFailed { message: reason });
            }
        };
        let hashes = unique_tx_hashes(logs.iter());
        self.native_candidates_from_hashes(hashes).await
    }

    /// Strategy 2: walk every block with full transaction bodies. Does not
    /// depend on event-log indexing at all, which makes it the
    /// authoritative fallback, but it is O(blocks) and therefore gated on
    /// small ranges.
    async fn scan_blocks_direct(
        &self,
        range: BlockRange,
    ) -> Result<Vec<RawTransferCandidate>, EvmRpcError> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for number in range.start_block..=range.end_block {
            let params = json!([to_hex_block(number), true]);
            let block = match self.call.call("eth_getBlockByNumber", params).await {
                RpcOutcome::Success(value) => serde_json::from_value::<RpcBlock>(value)?,
                RpcOutcome::Empty => continue,
                RpcOutcome::Recoverable(reason) | RpcOutcome::Fatal(reason) => {
                    return Err(EvmRpcError::CallFailed { message: reason });
                }
            };
            let timestamp = parse_hex_i64(&block.timestamp);
            for tx in &block.transactions {
                if let Some(candidate) = self.native_candidate_from_tx(tx, timestamp) {
                    if seen.insert(candidate.hash().to_string()) {
                        candidates.push(candidate);
                    }
                }
            }
        }
        Ok(candidates)
    }

    /// Strategy 3: unfiltered log sweep over the range. The number of logs
    /// resolved is capped; anything past the cap is dropped and logged as
    /// a known blind spot.
    async fn scan_broad_logs(
        &self,
        range: BlockRange,
    ) -> Result<Vec<RawTransferCandidate>, EvmRpcError> {
        let params = json!([{
            "fromBlock": to_hex_block(range.start_block),
            "toBlock": to_hex_block(range.end_block),
        }]);
        let logs = match self.call.call("eth_getLogs", params).await {
            RpcOutcome::Success(value) => serde_json::from_value::<Vec<RpcLog>>(value)?,
            RpcOutcome::Empty => return Ok(Vec::new()),
            RpcOutcome::Recoverable(reason) | RpcOutcome::Fatal(reason) => {
                return Err(EvmRpcError::CallFailed { message: reason });
            }
        };
        if logs.len() > self.limits.broad_log_limit {
            warn!(
                "⚠️  Broad log scan returned {} logs, resolving only the first {}",
                logs.len(),
                self.limits.broad_log_limit
            );
        }
        let hashes = unique_tx_hashes(logs.iter().take(self.limits.broad_log_limit));
        self.native_candidates_from_hashes(hashes).await
    }

    /// Resolve candidate hashes to full transactions, keeping the ones
    /// that pay positive native value into the tracked address.
    async fn native_candidates_from_hashes(
        &self,
        hashes: Vec<String>,
    ) -> Result<Vec<RawTransferCandidate>, EvmRpcError> {
        let mut candidates = Vec::new();
        for hash in hashes {
            let tx = match self
                .call
                .call("eth_getTransactionByHash", json!([hash]))
                .await
            {
                RpcOutcome::Success(value) => serde_json::from_value::<RpcTransaction>(value)?,
                RpcOutcome::Empty => {
                    debug!("📭 Transaction {} vanished during resolution", hash);
                    continue;
                }
                RpcOutcome::Recoverable(reason) | RpcOutcome::Fatal(reason) => {
                    return Err(EvmRpcError::CallFailed { message: reason });
                }
            };
            if let Some(candidate) = self.native_candidate_from_tx(&tx, None) {
                candidates.push(candidate);
            }
        }
        Ok(candidates)
    }

    fn native_candidate_from_tx(
        &self,
        tx: &RpcTransaction,
        timestamp: Option<i64>,
    ) -> Option<RawTransferCandidate> {
        let to = tx.to.as_deref()?;
        if !to.eq_ignore_ascii_case(&self.address) {
            return None;
        }
        let value_hex = tx.value.as_deref()?;
        if !hex_value_is_positive(value_hex) {
            return None;
        }
        Some(RawTransferCandidate::Native {
            hash: tx.hash.clone(),
            from: tx.from.clone().unwrap_or_default().to_lowercase(),
            to: to.to_lowercase(),
            value_hex: value_hex.to_string(),
            block_number: tx.block_number.as_deref().and_then(parse_hex_u64),
            timestamp,
        })
    }

    /// Fill in missing candidate timestamps. Headers are fetched at most
    /// once per block; a block whose header cannot be fetched gets an
    /// anchor-relative estimate instead of failing the scan.
    pub async fn resolve_timestamps(
        &self,
        candidates: &mut [RawTransferCandidate],
        anchor: BlockAnchor,
        avg_block_seconds: u64,
    ) {
        let mut block_times: HashMap<u64, Option<i64>> = HashMap::new();
        for candidate in candidates.iter_mut() {
            if candidate.timestamp().is_some() {
                continue;
            }
            let number = match candidate.block_number() {
                Some(number) => number,
                None => {
                    candidate.set_timestamp(anchor.timestamp);
                    continue;
                }
            };
            let timestamp = match block_times.get(&number) {
                Some(cached) => *cached,
                None => {
                    let fetched = self.block_timestamp(number).await;
                    block_times.insert(number, fetched);
                    fetched
                }
            };
            match timestamp {
                Some(ts) => candidate.set_timestamp(ts),
                None => candidate
                    .set_timestamp(estimate_timestamp_of(anchor, number, avg_block_seconds)),
            }
        }
    }

    async fn block_timestamp(&self, number: u64) -> Option<i64> {
        match self
            .call
            .call("eth_getBlockByNumber", json!([to_hex_block(number), false]))
            .await
        {
            RpcOutcome::Success(value) => serde_json::from_value::<RpcBlockHeader>(value)
                .ok()
                .and_then(|header| parse_hex_i64(&header.timestamp)),
            RpcOutcome::Empty => None,
            RpcOutcome::Recoverable(reason) | RpcOutcome::Fatal(reason) => {
                warn!("⚠️  Header fetch for block {} failed: {}", number, reason);
                None
            }
        }
    }
}

fn unique_tx_hashes<'l>(logs: impl IntoIterator<Item = &'l RpcLog>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut hashes = Vec::new();
    for log in logs {
        if seen.insert(log.transaction_hash.clone()) {
            hashes.push(log.transaction_hash.clone());
        }
    }
    hashes
}

fn token_candidate_from_log(log: &RpcLog) -> Option<RawTransferCandidate> {
    if log.topics.len() < 3 {
        return None;
    }
    if !log.topics[0].eq_ignore_ascii_case(TRANSFER_EVENT_TOPIC) {
        return None;
    }
    Some(RawTransferCandidate::TokenLog {
        tx_hash: log.transaction_hash.clone(),
        contract: log.address.to_lowercase(),
        topics: log.topics.clone(),
        data: log.data.clone(),
        block_number: log.block_number.as_deref().and_then(parse_hex_u64),
        timestamp: None,
    })
}

/// True when the hex quantity carries any non-zero digit. Transfer values
/// can exceed u64, so this never parses the number.
fn hex_value_is_positive(value: &str) -> bool {
    value.trim_start_matches("0x").chars().any(|c| c != '0')
}
