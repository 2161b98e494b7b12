use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use num_bigint::BigUint;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, warn};

use tracker_core::{chains, ChainId, Transfer};

use crate::executor::EvmCall;
use crate::types::{topic_to_address, RawTransferCandidate, RpcOutcome};

/// ERC20 `symbol()` function selector.
const SYMBOL_SELECTOR: &str = "0x95d89b41";

/// Converts raw scan candidates into canonical [`Transfer`] records.
///
/// A malformed candidate is dropped with a warning; one corrupt log must
/// never abort a whole scan. Token symbols resolve through a static
/// per-chain table first, then an on-chain `symbol()` call, then a
/// truncated contract address, with per-contract caching of the RPC
/// results.
pub struct EvmNormalizer<'a> {
    call: &'a dyn EvmCall,
    chain: ChainId,
    address: String,
    dust_enabled: bool,
    symbol_cache: Mutex<HashMap<String, String>>,
}

impl<'a> EvmNormalizer<'a> {
    pub fn new(call: &'a dyn EvmCall, chain: ChainId, address: &str, dust_enabled: bool) -> Self {
        Self {
            call,
            chain,
            address: address.to_lowercase(),
            dust_enabled,
            symbol_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Normalize native-coin candidates. `amount = value_wei / 10^18`,
    /// symbol from the static chain table.
    pub fn native_transfers(&self, candidates: &[RawTransferCandidate]) -> Vec<Transfer> {
        let symbol = chains::native_symbol(self.chain);
        let mut transfers = Vec::new();
        for candidate in candidates {
            if let RawTransferCandidate::Native {
                hash,
                from,
                to,
                value_hex,
                timestamp,
                ..
            } = candidate
            {
                if !to.eq_ignore_ascii_case(&self.address) {
                    continue;
                }
                let amount = match wei_to_decimal(value_hex, 18) {
                    Some(amount) => amount,
                    None => {
                        warn!(
                            "⚠️  Dropping native candidate {}: unparseable value {}",
                            hash, value_hex
                        );
                        continue;
                    }
                };
                if amount <= Decimal::ZERO || !self.passes_dust_filter(amount, symbol) {
                    continue;
                }
                transfers.push(Transfer {
                    hash: hash.clone(),
                    chain: self.chain,
                    from: from.to_lowercase(),
                    to: self.address.clone(),
                    amount,
                    token_symbol: symbol.to_string(),
                    is_native: true,
                    timestamp: timestamp.unwrap_or(0),
                });
            }
        }
        transfers
    }

    /// Normalize token-log candidates: addresses from the topic words,
    /// amount from the big-endian log data scaled by the token's decimals.
    pub async fn token_transfers(&self, candidates: &[RawTransferCandidate]) -> Vec<Transfer> {
        let mut transfers = Vec::new();
        for candidate in candidates {
            if let RawTransferCandidate::TokenLog {
                tx_hash,
                contract,
                topics,
                data,
                timestamp,
                ..
            } = candidate
            {
                if topics.len() < 3 {
                    warn!(
                        "⚠️  Dropping token log {}: only {} topic(s)",
                        tx_hash,
                        topics.len()
                    );
                    continue;
                }
                let to = match topic_to_address(&topics[2]) {
                    Some(to) => to,
                    None => {
                        warn!(
                            "⚠️  Dropping token log {}: malformed destination topic",
                            tx_hash
                        );
                        continue;
                    }
                };
                if !to.eq_ignore_ascii_case(&self.address) {
                    continue;
                }
                let from = topic_to_address(&topics[1]).unwrap_or_default();
                let raw = match biguint_from_hex(data) {
                    Some(raw) => raw,
                    None => {
                        warn!("⚠️  Dropping token log {}: undecodable amount data", tx_hash);
                        continue;
                    }
                };
                let decimals = chains::known_token_decimals(self.chain, contract).unwrap_or(18);
                let amount = match scale_amount(&raw, decimals) {
                    Some(amount) => amount,
                    None => {
                        warn!(
                            "⚠️  Dropping token log {}: amount {} does not fit at {} decimals",
                            tx_hash, raw, decimals
                        );
                        continue;
                    }
                };
                if amount <= Decimal::ZERO {
                    continue;
                }
                let symbol = self.resolve_symbol(contract).await;
                if !self.passes_dust_filter(amount, &symbol) {
                    continue;
                }
                transfers.push(Transfer {
                    hash: tx_hash.clone(),
                    chain: self.chain,
                    from,
                    to: self.address.clone(),
                    amount,
                    token_symbol: symbol,
                    is_native: false,
                    timestamp: timestamp.unwrap_or(0),
                });
            }
        }
        transfers
    }

    /// Amounts at or below the per-symbol threshold are discarded when
    /// dust filtering is enabled.
    fn passes_dust_filter(&self, amount: Decimal, symbol: &str) -> bool {
        if !self.dust_enabled {
            return true;
        }
        let threshold = chains::min_amount_threshold(symbol);
        if amount <= threshold {
            debug!("📭 Skipping dust transfer of {} {}", amount, symbol);
            return false;
        }
        true
    }

    async fn resolve_symbol(&self, contract: &str) -> String {
        if let Some(symbol) = chains::known_token_symbol(self.chain, contract) {
            return symbol.to_string();
        }
        if let Some(symbol) = self.lock_cache().get(contract) {
            return symbol.clone();
        }
        let symbol = match self.query_symbol(contract).await {
            Some(symbol) => symbol,
            None => {
                debug!(
                    "🔍 symbol() lookup failed for {}, falling back to truncated address",
                    contract
                );
                chains::truncate_address(contract)
            }
        };
        self.lock_cache()
            .insert(contract.to_string(), symbol.clone());
        symbol
    }

    async fn query_symbol(&self, contract: &str) -> Option<String> {
        let params = json!([{"to": contract, "data": SYMBOL_SELECTOR}, "latest"]);
        match self.call.call("eth_call", params).await {
            RpcOutcome::Success(value) => value.as_str().and_then(decode_symbol_result),
            _ => None,
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.symbol_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Hex wei quantity to a human-denominated amount. Values beyond what a
/// `Decimal` can hold are rejected rather than silently truncated.
pub fn wei_to_decimal(value_hex: &str, decimals: u32) -> Option<Decimal> {
    let raw = biguint_from_hex(value_hex)?;
    scale_amount(&raw, decimals)
}

fn biguint_from_hex(value: &str) -> Option<BigUint> {
    let hex = value.trim_start_matches("0x");
    if hex.is_empty() {
        return Some(BigUint::from(0u8));
    }
    BigUint::parse_bytes(hex.as_bytes(), 16)
}

fn scale_amount(raw: &BigUint, decimals: u32) -> Option<Decimal> {
    let amount = Decimal::from_str(&raw.to_string()).ok()?;
    let divisor = Decimal::from(10u64.checked_pow(decimals)?);
    amount.checked_div(divisor)
}

/// Decode a `symbol()` return payload. Handles the ABI string encoding
/// and the legacy bytes32 form some older tokens use.
fn decode_symbol_result(hex: &str) -> Option<String> {
    let bytes = hex::decode(hex.trim_start_matches("0x")).ok()?;
    if bytes.is_empty() {
        return None;
    }
    let symbol = if bytes.len() >= 64 {
        let mut length_word = [0u8; 8];
        length_word.copy_from_slice(&bytes[56..64]);
        let length = u64::from_be_bytes(length_word) as usize;
        let end = 64usize.checked_add(length)?;
        if end > bytes.len() {
            return None;
        }
        String::from_utf8(bytes[64..end].to_vec()).ok()?
    } else {
        let taken: Vec<u8> = bytes.iter().take_while(|b| **b != 0).copied().collect();
        String::from_utf8(taken).ok()?
    };
    let symbol = symbol.trim().to_string();
    if symbol.is_empty() || symbol.len() > 32 {
        return None;
    }
    Some(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::pad_topic_address;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;

    const ADDRESS: &str = "0x1234567890abcdef1234567890abcdef12345678";
    const SENDER: &str = "0x00000000000000000000000000000000000000aa";

    struct ScriptedCall {
        outcomes: Mutex<VecDeque<RpcOutcome>>,
        calls: Mutex<usize>,
    }

    impl ScriptedCall {
        fn new(outcomes: Vec<RpcOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl EvmCall for ScriptedCall {
        async fn call(&self, _method: &str, _params: Value) -> RpcOutcome {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RpcOutcome::Empty)
        }
    }

    fn native(hash: &str, value_hex: &str) -> RawTransferCandidate {
        RawTransferCandidate::Native {
            hash: hash.to_string(),
            from: SENDER.to_string(),
            to: ADDRESS.to_string(),
            value_hex: value_hex.to_string(),
            block_number: Some(100),
            timestamp: Some(1_700_000_000),
        }
    }

    fn token_log(
        tx_hash: &str,
        contract: &str,
        to: &str,
        data: &str,
    ) -> RawTransferCandidate {
        RawTransferCandidate::TokenLog {
            tx_hash: tx_hash.to_string(),
            contract: contract.to_string(),
            topics: vec![
                crate::types::TRANSFER_EVENT_TOPIC.to_string(),
                pad_topic_address(SENDER),
                pad_topic_address(to),
            ],
            data: data.to_string(),
            block_number: Some(100),
            timestamp: Some(1_700_000_000),
        }
    }

    fn normalizer<'a>(call: &'a ScriptedCall, dust_enabled: bool) -> EvmNormalizer<'a> {
        EvmNormalizer::new(call, ChainId::Evm(56), ADDRESS, dust_enabled)
    }

    #[test]
    fn native_amount_divides_by_ten_to_the_eighteenth() {
        let call = ScriptedCall::new(vec![]);
        let normalizer = normalizer(&call, true);

        // 2.5e18 wei
        let transfers =
            normalizer.native_transfers(&[native("0xaaa", "0x22b1c8c1227a0000")]);

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, Decimal::new(25, 1));
        assert_eq!(transfers[0].token_symbol, "BNB");
        assert!(transfers[0].is_native);
        assert_eq!(transfers[0].timestamp, 1_700_000_000);
    }

    #[test]
    fn native_dust_is_filtered() {
        let call = ScriptedCall::new(vec![]);
        let normalizer = normalizer(&call, true);

        // 0.0005 BNB, under the 0.001 threshold
        let transfers =
            normalizer.native_transfers(&[native("0xaaa", "0x1c6bf52634000")]);

        assert!(transfers.is_empty());
    }

    #[test]
    fn dust_filter_can_be_disabled() {
        let call = ScriptedCall::new(vec![]);
        let normalizer = normalizer(&call, false);

        let transfers =
            normalizer.native_transfers(&[native("0xaaa", "0x1c6bf52634000")]);

        assert_eq!(transfers.len(), 1);
    }

    #[test]
    fn unparseable_native_value_is_dropped_not_fatal() {
        let call = ScriptedCall::new(vec![]);
        let normalizer = normalizer(&call, true);

        let transfers = normalizer.native_transfers(&[
            native("0xbad", "0xnothex"),
            native("0xgood", "0x22b1c8c1227a0000"),
        ]);

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].hash, "0xgood");
    }

    #[tokio::test]
    async fn token_amount_scales_by_known_decimals() {
        let call = ScriptedCall::new(vec![]);
        let normalizer = normalizer(&call, true);

        // USDT on BSC is in the static table with 18 decimals; use a raw
        // amount of 5e18 for 5.0 USDT
        let transfers = normalizer
            .token_transfers(&[token_log(
                "0xaaa",
                "0x55d398326f99059ff775485246999027b3197955",
                ADDRESS,
                "0x0000000000000000000000000000000000000000000000004563918244f40000",
            )])
            .await;

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, Decimal::new(5, 0));
        assert_eq!(transfers[0].token_symbol, "USDT");
        assert!(!transfers[0].is_native);
        assert_eq!(call.call_count(), 0);
    }

    #[tokio::test]
    async fn token_transfers_to_other_wallets_are_discarded() {
        let call = ScriptedCall::new(vec![]);
        let normalizer = normalizer(&call, true);

        let transfers = normalizer
            .token_transfers(&[token_log(
                "0xaaa",
                "0x55d398326f99059ff775485246999027b3197955",
                "0x00000000000000000000000000000000000000bb",
                "0x0000000000000000000000000000000000000000000000004563918244f40000",
            )])
            .await;

        assert!(transfers.is_empty());
    }

    #[tokio::test]
    async fn token_dust_at_threshold_is_excluded() {
        let call = ScriptedCall::new(vec![]);
        let normalizer = normalizer(&call, true);

        // exactly 1.0 USDT, equal to the threshold
        let transfers = normalizer
            .token_transfers(&[token_log(
                "0xaaa",
                "0x55d398326f99059ff775485246999027b3197955",
                ADDRESS,
                "0x0000000000000000000000000000000000000000000000000de0b6b3a7640000",
            )])
            .await;

        assert!(transfers.is_empty());
    }

    #[tokio::test]
    async fn unknown_contract_resolves_symbol_on_chain_and_caches_it() {
        // ABI string encoding of "WOOF"
        let encoded = format!(
            "0x{}{}{}",
            "0000000000000000000000000000000000000000000000000000000000000020",
            "0000000000000000000000000000000000000000000000000000000000000004",
            "574f4f4600000000000000000000000000000000000000000000000000000000",
        );
        let call = ScriptedCall::new(vec![RpcOutcome::Success(Value::String(encoded))]);
        let normalizer = normalizer(&call, false);
        let contract = "0xc0ffee254729296a45a3885639ac7e10f9d54979";
        let data = "0x0000000000000000000000000000000000000000000000004563918244f40000";

        let first = normalizer
            .token_transfers(&[token_log("0xaaa", contract, ADDRESS, data)])
            .await;
        let second = normalizer
            .token_transfers(&[token_log("0xbbb", contract, ADDRESS, data)])
            .await;

        assert_eq!(first[0].token_symbol, "WOOF");
        assert_eq!(second[0].token_symbol, "WOOF");
        assert_eq!(call.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_symbol_lookup_falls_back_to_truncated_address() {
        let call = ScriptedCall::new(vec![RpcOutcome::Fatal("no endpoints".to_string())]);
        let normalizer = normalizer(&call, false);
        let contract = "0xc0ffee254729296a45a3885639ac7e10f9d54979";
        let data = "0x0000000000000000000000000000000000000000000000004563918244f40000";

        let transfers = normalizer
            .token_transfers(&[token_log("0xaaa", contract, ADDRESS, data)])
            .await;

        assert_eq!(transfers[0].token_symbol, "0xc0ff...4979");
    }

    #[tokio::test]
    async fn oversized_token_amount_is_dropped_not_fatal() {
        let call = ScriptedCall::new(vec![]);
        let normalizer = normalizer(&call, true);
        let contract = "0x55d398326f99059ff775485246999027b3197955";
        let oversized = format!("0x{}", "ff".repeat(32));
        let fine = "0x0000000000000000000000000000000000000000000000004563918244f40000";

        let transfers = normalizer
            .token_transfers(&[
                token_log("0xbad", contract, ADDRESS, &oversized),
                token_log("0xgood", contract, ADDRESS, fine),
            ])
            .await;

        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].hash, "0xgood");
    }

    #[test]
    fn symbol_decoding_handles_both_abi_forms() {
        let string_form = format!(
            "{}{}{}",
            "0x0000000000000000000000000000000000000000000000000000000000000020",
            "0000000000000000000000000000000000000000000000000000000000000003",
            "4254430000000000000000000000000000000000000000000000000000000000",
        );
        assert_eq!(decode_symbol_result(&string_form).as_deref(), Some("BTC"));

        let bytes32_form =
            "0x4d4b520000000000000000000000000000000000000000000000000000000000";
        assert_eq!(decode_symbol_result(bytes32_form).as_deref(), Some("MKR"));

        assert_eq!(decode_symbol_result("0x"), None);
    }

    #[test]
    fn six_decimal_scaling() {
        let raw = BigUint::from(1_000_000u64);
        assert_eq!(scale_amount(&raw, 6), Some(Decimal::new(1, 0)));
    }
}
