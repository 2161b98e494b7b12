//! Merging per-chain scan outputs into one deduplicated, time-filtered,
//! chronologically sorted transfer list.

use crate::{ScanWindow, TrackerResult, Transfer};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Merge per-chain results into a single list.
///
/// Native and token transfers from every result are concatenated in the
/// order the results arrive, deduplicated by transaction hash (first
/// occurrence wins), filtered to the scan window and sorted by timestamp
/// ascending. The window filter is a backstop: block-number estimation on
/// RPC chains can let transfers slightly outside the requested period slip
/// through.
pub fn merge_results(
    results: impl IntoIterator<Item = TrackerResult>,
    window: ScanWindow,
) -> Vec<Transfer> {
    let mut combined = Vec::new();
    for result in results {
        combined.extend(result.native);
        combined.extend(result.tokens);
    }
    merge_transfers(combined, window)
}

/// Same as [`merge_results`], for callers that already hold a flat list.
pub fn merge_transfers(transfers: Vec<Transfer>, window: ScanWindow) -> Vec<Transfer> {
    let before = transfers.len();
    let mut merged = filter_window(dedup_by_hash(transfers), window);
    merged.sort_by_key(|t| t.timestamp);

    debug!(
        "📊 Merged {} raw transfers into {} ({}..{})",
        before,
        merged.len(),
        window.start_ts,
        window.end_ts
    );
    merged
}

/// Drop repeated transaction hashes, keeping the first occurrence.
/// Order-preserving, so running it twice changes nothing.
pub fn dedup_by_hash(transfers: Vec<Transfer>) -> Vec<Transfer> {
    let mut seen: HashSet<String> = HashSet::with_capacity(transfers.len());
    transfers
        .into_iter()
        .filter(|t| seen.insert(t.hash.clone()))
        .collect()
}

fn filter_window(transfers: Vec<Transfer>, window: ScanWindow) -> Vec<Transfer> {
    transfers
        .into_iter()
        .filter(|t| window.contains(t.timestamp))
        .collect()
}

/// Sum transfer amounts per token symbol, for report rendering.
/// Returned in symbol order for stable output.
pub fn sum_by_symbol(transfers: &[Transfer]) -> Vec<(String, Decimal)> {
    let mut sums: BTreeMap<String, Decimal> = BTreeMap::new();
    for transfer in transfers {
        *sums.entry(transfer.token_symbol.clone()).or_default() += transfer.amount;
    }
    sums.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChainId;

    fn transfer(hash: &str, amount: Decimal, symbol: &str, timestamp: i64) -> Transfer {
        Transfer {
            hash: hash.to_string(),
            chain: ChainId::Evm(56),
            from: "0x1111111111111111111111111111111111111111".to_string(),
            to: "0x2222222222222222222222222222222222222222".to_string(),
            amount,
            token_symbol: symbol.to_string(),
            is_native: false,
            timestamp,
        }
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let transfers = vec![
            transfer("0xa", Decimal::new(1, 0), "USDT", 100),
            transfer("0xb", Decimal::new(2, 0), "USDT", 110),
            transfer("0xa", Decimal::new(99, 0), "USDT", 120),
        ];

        let deduped = dedup_by_hash(transfers);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].hash, "0xa");
        assert_eq!(deduped[0].amount, Decimal::new(1, 0));
        assert_eq!(deduped[1].hash, "0xb");
    }

    #[test]
    fn dedup_is_idempotent() {
        let transfers = vec![
            transfer("0xa", Decimal::new(1, 0), "USDT", 100),
            transfer("0xa", Decimal::new(1, 0), "USDT", 100),
            transfer("0xb", Decimal::new(2, 0), "USDT", 110),
        ];

        let once = dedup_by_hash(transfers);
        let twice = dedup_by_hash(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_filters_window_and_sorts_ascending() {
        let window = ScanWindow::new(100, 200);
        let result = TrackerResult {
            native: vec![
                transfer("0xc", Decimal::new(3, 0), "BNB", 150),
                transfer("0xd", Decimal::new(4, 0), "BNB", 250),
            ],
            tokens: vec![
                transfer("0xa", Decimal::new(1, 0), "USDT", 200),
                transfer("0xb", Decimal::new(2, 0), "USDT", 100),
                transfer("0xe", Decimal::new(5, 0), "USDT", 99),
            ],
            network: "bnb".to_string(),
        };

        let merged = merge_results(vec![result], window);
        let hashes: Vec<&str> = merged.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xb", "0xc", "0xa"]);
    }

    #[test]
    fn merge_dedups_across_results() {
        let window = ScanWindow::new(0, 1_000);
        let first = TrackerResult {
            native: vec![transfer("0xa", Decimal::new(1, 0), "BNB", 10)],
            tokens: vec![],
            network: "bnb".to_string(),
        };
        let second = TrackerResult {
            native: vec![transfer("0xa", Decimal::new(7, 0), "BNB", 10)],
            tokens: vec![transfer("0xb", Decimal::new(2, 0), "USDT", 20)],
            network: "bnb".to_string(),
        };

        let merged = merge_results(vec![first, second], window);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].amount, Decimal::new(1, 0));
    }

    #[test]
    fn sums_group_by_symbol() {
        let transfers = vec![
            transfer("0xa", Decimal::new(15, 1), "USDT", 100),
            transfer("0xb", Decimal::new(25, 1), "USDT", 110),
            transfer("0xc", Decimal::new(5, 1), "BNB", 120),
        ];

        let sums = sum_by_symbol(&transfers);
        assert_eq!(
            sums,
            vec![
                ("BNB".to_string(), Decimal::new(5, 1)),
                ("USDT".to_string(), Decimal::new(40, 1)),
            ]
        );
    }
}
