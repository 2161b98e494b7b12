use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use tracker_core::{chains, ChainId, Transfer};

use crate::types::{TronTransaction, Trc20Transfer};

/// TRX has 6 decimals; amounts arrive in sun.
const TRX_DECIMALS: u32 = 6;

/// Converts TronGrid payloads into canonical [`Transfer`] records for one
/// queried wallet. Candidates that fail to decode are dropped
/// individually so one bad entry cannot sink the scan.
pub struct TronNormalizer {
    address: String,
    dust_enabled: bool,
}

impl TronNormalizer {
    pub fn new(address: &str, dust_enabled: bool) -> Self {
        Self {
            address: address.to_lowercase(),
            dust_enabled,
        }
    }

    /// Native TRX transfers: `TransferContract` entries paying into the
    /// queried wallet. Other contract types (staking, smart-contract
    /// triggers) are not native transfers and are skipped.
    pub fn native_transfers(&self, transactions: &[TronTransaction]) -> Vec<Transfer> {
        let mut transfers = Vec::new();
        for tx in transactions {
            let contract = match tx.raw_data.contract.first() {
                Some(contract) => contract,
                None => continue,
            };
            if contract.contract_type != "TransferContract" {
                continue;
            }
            let value = &contract.parameter.value;
            if !value.to_address.eq_ignore_ascii_case(&self.address) {
                continue;
            }
            if value.amount <= 0 {
                continue;
            }
            let amount = Decimal::new(value.amount, TRX_DECIMALS);
            if !self.passes_dust_filter(amount, "TRX") {
                continue;
            }
            transfers.push(Transfer {
                hash: tx.tx_id.clone(),
                chain: ChainId::Tron,
                from: value.owner_address.to_lowercase(),
                to: self.address.clone(),
                amount,
                token_symbol: "TRX".to_string(),
                is_native: true,
                timestamp: millis_to_seconds(tx.raw_data.timestamp),
            });
        }
        transfers
    }

    /// TRC20 transfers into the queried wallet. Symbols come from the
    /// provider's token_info, then the known-token table, then a truncated
    /// contract address; decimals are token-supplied with a default of 6.
    pub fn token_transfers(&self, transfers: &[Trc20Transfer]) -> Vec<Transfer> {
        let mut out = Vec::new();
        for transfer in transfers {
            if !transfer.to.eq_ignore_ascii_case(&self.address) {
                continue;
            }
            let amount = match scale_value(&transfer.value, transfer.token_info.decimals) {
                Some(amount) => amount,
                None => {
                    warn!(
                        "⚠️  Dropping TRC20 transfer {}: unparseable value {:?} at {} decimals",
                        transfer.transaction_id, transfer.value, transfer.token_info.decimals
                    );
                    continue;
                }
            };
            if amount <= Decimal::ZERO {
                continue;
            }
            let symbol = self.resolve_symbol(transfer);
            if !self.passes_dust_filter(amount, &symbol) {
                continue;
            }
            out.push(Transfer {
                hash: transfer.transaction_id.clone(),
                chain: ChainId::Tron,
                from: transfer.from.to_lowercase(),
                to: self.address.clone(),
                amount,
                token_symbol: symbol,
                is_native: false,
                timestamp: millis_to_seconds(transfer.block_timestamp),
            });
        }
        out
    }

    fn resolve_symbol(&self, transfer: &Trc20Transfer) -> String {
        let provided = transfer.token_info.symbol.trim();
        if !provided.is_empty() && provided != "UNKNOWN" {
            return provided.to_string();
        }
        let contract = &transfer.token_info.address;
        if let Some(symbol) = chains::known_token_symbol(ChainId::Tron, contract) {
            return symbol.to_string();
        }
        chains::truncate_address(contract)
    }

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
}

/// Missing timestamps fall back to "now" rather than the epoch, so the
/// window filter does not silently discard the transfer.
fn millis_to_seconds(millis: i64) -> i64 {
    if millis > 0 {
        millis / 1000
    } else {
        Utc::now().timestamp()
    }
}

fn scale_value(raw: &str, decimals: u32) -> Option<Decimal> {
    let value = Decimal::from_str(raw.trim()).ok()?;
    let divisor = Decimal::from(10u64.checked_pow(decimals)?);
    value.checked_div(divisor)
}
