//! Static chain registries: network-name resolution, native symbols,
//! gateway slugs, explorer links and known-token fallbacks.

use crate::ChainId;
use rust_decimal::Decimal;

/// Resolve a user-facing network identifier to a chain id.
///
/// Accepts the short names used throughout configuration ("bnb", "eth",
/// "polygon", "tron", ...) plus a few common aliases. Unknown names return
/// `None`; callers decide whether that is an error or a gateway fallback.
pub fn chain_id_for_network(network: &str) -> Option<ChainId> {
    let id = match network.to_lowercase().as_str() {
        "tron" => return Some(ChainId::Tron),
        "eth" | "ethereum" => 1,
        "bnb" | "bsc" | "binance" => 56,
        "polygon" | "matic" => 137,
        "arbitrum" => 42161,
        "optimism" => 10,
        "base" => 8453,
        "avalanche" => 43114,
        "fantom" => 250,
        "gnosis" => 100,
        "celo" => 42220,
        "aurora" => 1313161554,
        "cronos" => 25,
        "harmony" => 1666600000,
        "moonbeam" => 1284,
        "moonriver" => 1285,
        "klaytn" => 8217,
        "metis" => 1088,
        "okc" => 66,
        "linea" => 59144,
        "scroll" => 534352,
        "polygon_zkevm" => 1101,
        "zksync" => 324,
        "apechain" => 33139,
        "sei" => 1329,
        _ => return None,
    };
    Some(ChainId::Evm(id))
}

/// Human-readable network name for reports.
pub fn display_name(chain: ChainId) -> &'static str {
    match chain {
        ChainId::Tron => "TRON",
        ChainId::Evm(1) => "Ethereum",
        ChainId::Evm(42161) => "Arbitrum One",
        ChainId::Evm(10) => "Optimism",
        ChainId::Evm(8453) => "Base",
        ChainId::Evm(324) => "zkSync Era",
        ChainId::Evm(56) => "BNB Smart Chain",
        ChainId::Evm(137) => "Polygon",
        ChainId::Evm(43114) => "Avalanche C-Chain",
        ChainId::Evm(250) => "Fantom",
        ChainId::Evm(100) => "Gnosis Chain",
        ChainId::Evm(42220) => "Celo",
        ChainId::Evm(1313161554) => "Aurora",
        ChainId::Evm(25) => "Cronos",
        ChainId::Evm(1666600000) => "Harmony",
        ChainId::Evm(1284) => "Moonbeam",
        ChainId::Evm(1285) => "Moonriver",
        ChainId::Evm(8217) => "Klaytn",
        ChainId::Evm(1088) => "Metis",
        ChainId::Evm(66) => "OKC",
        ChainId::Evm(59144) => "Linea",
        ChainId::Evm(534352) => "Scroll",
        ChainId::Evm(1101) => "Polygon zkEVM",
        ChainId::Evm(33139) => "ApeChain",
        ChainId::Evm(1329) => "Sei",
        ChainId::Evm(_) => "Unknown EVM",
    }
}

/// Native coin symbol for a chain. Unlisted EVM chains report ETH, the
/// most common case for rollups.
pub fn native_symbol(chain: ChainId) -> &'static str {
    match chain {
        ChainId::Tron => "TRX",
        ChainId::Evm(56) => "BNB",
        ChainId::Evm(137) => "MATIC",
        ChainId::Evm(43114) => "AVAX",
        ChainId::Evm(250) => "FTM",
        ChainId::Evm(100) => "xDAI",
        ChainId::Evm(42220) => "CELO",
        ChainId::Evm(25) => "CRO",
        ChainId::Evm(1666600000) => "ONE",
        ChainId::Evm(1284) => "GLMR",
        ChainId::Evm(1285) => "MOVR",
        ChainId::Evm(8217) => "KLAY",
        ChainId::Evm(1088) => "METIS",
        ChainId::Evm(66) => "OKT",
        ChainId::Evm(33139) => "APE",
        ChainId::Evm(1329) => "SEI",
        ChainId::Evm(_) => "ETH",
    }
}

/// Gateway (Ankr-style) chain slug for an EVM chain id.
pub fn gateway_slug(chain: ChainId) -> Option<&'static str> {
    let slug = match chain {
        ChainId::Tron => return None,
        ChainId::Evm(1) => "eth",
        ChainId::Evm(56) => "bsc",
        ChainId::Evm(137) => "polygon",
        ChainId::Evm(42161) => "arbitrum",
        ChainId::Evm(10) => "optimism",
        ChainId::Evm(8453) => "base",
        ChainId::Evm(43114) => "avalanche",
        ChainId::Evm(250) => "fantom",
        ChainId::Evm(100) => "gnosis",
        ChainId::Evm(42220) => "celo",
        ChainId::Evm(1313161554) => "aurora",
        ChainId::Evm(25) => "cronos",
        ChainId::Evm(1666600000) => "harmony",
        ChainId::Evm(1284) => "moonbeam",
        ChainId::Evm(1285) => "moonriver",
        ChainId::Evm(8217) => "klaytn",
        ChainId::Evm(1088) => "metis",
        ChainId::Evm(66) => "okc",
        ChainId::Evm(59144) => "linea",
        ChainId::Evm(534352) => "scroll",
        ChainId::Evm(1101) => "polygon_zkevm",
        ChainId::Evm(324) => "zksync",
        ChainId::Evm(_) => return None,
    };
    Some(slug)
}

/// Explorer link for a transaction hash, for report rendering.
pub fn explorer_tx_url(chain: ChainId, hash: &str) -> Option<String> {
    let template = match chain {
        ChainId::Tron => "https://tronscan.org/#/transaction/{}",
        ChainId::Evm(1) => "https://etherscan.io/tx/{}",
        ChainId::Evm(56) => "https://bscscan.com/tx/{}",
        ChainId::Evm(137) => "https://polygonscan.com/tx/{}",
        ChainId::Evm(42161) => "https://arbiscan.io/tx/{}",
        ChainId::Evm(10) => "https://optimistic.etherscan.io/tx/{}",
        ChainId::Evm(8453) => "https://basescan.org/tx/{}",
        ChainId::Evm(43114) => "https://snowtrace.io/tx/{}",
        ChainId::Evm(250) => "https://ftmscan.com/tx/{}",
        ChainId::Evm(100) => "https://gnosisscan.io/tx/{}",
        ChainId::Evm(42220) => "https://celoscan.io/tx/{}",
        ChainId::Evm(1313161554) => "https://aurorascan.dev/tx/{}",
        ChainId::Evm(25) => "https://cronoscan.com/tx/{}",
        ChainId::Evm(1666600000) => "https://explorer.harmony.one/tx/{}",
        ChainId::Evm(1284) => "https://moonscan.io/tx/{}",
        ChainId::Evm(1285) => "https://moonriver.moonscan.io/tx/{}",
        ChainId::Evm(8217) => "https://scope.klaytn.com/tx/{}",
        ChainId::Evm(1088) => "https://andromeda-explorer.metis.io/tx/{}",
        ChainId::Evm(66) => "https://www.oklink.com/okc/tx/{}",
        ChainId::Evm(59144) => "https://lineascan.build/tx/{}",
        ChainId::Evm(534352) => "https://scrollscan.com/tx/{}",
        ChainId::Evm(1101) => "https://zkevm.polygonscan.com/tx/{}",
        ChainId::Evm(324) => "https://explorer.zksync.io/tx/{}",
        ChainId::Evm(33139) => "https://apescan.io/tx/{}",
        ChainId::Evm(1329) => "https://seiscan.io/tx/{}",
        ChainId::Evm(_) => return None,
    };
    Some(template.replace("{}", hash))
}

/// Known token contract -> symbol fallback, per chain.
///
/// TRON contracts are base58 and case-sensitive; EVM contracts are hex and
/// compared lowercased.
pub fn known_token_symbol(chain: ChainId, contract: &str) -> Option<&'static str> {
    match chain {
        ChainId::Tron => {
            let symbol = match contract {
                "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t" => "USDT",
                "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8" => "USDC",
                "TSSMHYeV2uE9qYH95DqyoCuNCzEL1NvU3S" => "SUN",
                "TVj7RNVHy6thbM7BWdSe9G6gXwKhjhdNZS" => "JST",
                "TCFLL5dx5ZJdKnWuesXxi1VPwjLVmWZZy9" => "JST",
                "TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7" => "WIN",
                "TNUC9Qb1rRpS5CbWLmNxN3N8f6zzJP2DPY" => "BTT",
                "TKfjV9RNKJJCqPvBtK8L7Knykh7DNWvnYt" => "NFT",
                "TMwFHYXLJaRUPeW6421aqXL4ZEzPRFGkGT" => "USDJ",
                "TFczxzPhnThNSqr5by8tvxsdCFRRz6cPNq" => "DICE",
                _ => return None,
            };
            Some(symbol)
        }
        ChainId::Evm(56) => {
            let symbol = match contract.to_lowercase().as_str() {
                "0x55d398326f99059ff775485246999027b3197955" => "USDT",
                "0xe9e7cea3dedca5984780bafc599bd69add087d56" => "BUSD",
                "0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d" => "USDC",
                "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c" => "WBNB",
                "0x0e09fabb73bd3ade0a17ecc321fd13a19e81ce82" => "CAKE",
                "0x7130d2a12b9bcbfae4f2634d864a1ee1ce3ead9c" => "BTCB",
                "0x2170ed0880ac9a755fd29b2688956bd959f933f8" => "ETH",
                "0x1af3f329e8be154074d8769d1ffa4ee058b1dbc3" => "DAI",
                "0xba2ae424d960c26247dd6c32edc70b295c744c43" => "DOGE",
                "0x7083609fce4d1d8dc0c979aab8c869ea2c873402" => "DOT",
                _ => return None,
            };
            Some(symbol)
        }
        ChainId::Evm(1) => {
            let symbol = match contract.to_lowercase().as_str() {
                "0xdac17f958d2ee523a2206206994597c13d831ec7" => "USDT",
                "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48" => "USDC",
                "0x6b175474e89094c44da98b954eedeac495271d0f" => "DAI",
                "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599" => "WBTC",
                _ => return None,
            };
            Some(symbol)
        }
        _ => None,
    }
}

/// Token decimal overrides for contracts known to deviate from the
/// 18-decimal default.
pub fn known_token_decimals(chain: ChainId, contract: &str) -> Option<u32> {
    match chain {
        ChainId::Evm(1) => match contract.to_lowercase().as_str() {
            "0xdac17f958d2ee523a2206206994597c13d831ec7" => Some(6),
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48" => Some(6),
            "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599" => Some(8),
            _ => None,
        },
        _ => None,
    }
}

/// Estimated block interval for block-number-from-timestamp math.
pub fn avg_block_seconds(chain: ChainId) -> u64 {
    match chain {
        ChainId::Evm(1) => 12,
        ChainId::Evm(137) => 2,
        // BSC-class chains run at roughly 3 second blocks; it is also a
        // usable default for other EVM networks.
        _ => 3,
    }
}

/// Minimum amount a transfer must reach to appear in reports. Keeps dust
/// spam out of the results.
pub fn min_amount_threshold(symbol: &str) -> Decimal {
    match symbol {
        "USDT" | "USDC" | "BUSD" => Decimal::new(1, 0),
        "BNB" | "ETH" => Decimal::new(1, 3),
        "TRX" => Decimal::new(10, 0),
        "MATIC" => Decimal::new(1, 0),
        _ => Decimal::new(1, 2),
    }
}

/// Shortened address for display when no symbol can be resolved,
/// e.g. `0x7083...3402`.
pub fn truncate_address(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_names_resolve_with_aliases() {
        assert_eq!(chain_id_for_network("bnb"), Some(ChainId::Evm(56)));
        assert_eq!(chain_id_for_network("BSC"), Some(ChainId::Evm(56)));
        assert_eq!(chain_id_for_network("ethereum"), Some(ChainId::Evm(1)));
        assert_eq!(chain_id_for_network("tron"), Some(ChainId::Tron));
        assert_eq!(chain_id_for_network("emerald-chain"), None);
    }

    #[test]
    fn native_symbols_match_registry() {
        assert_eq!(native_symbol(ChainId::Evm(56)), "BNB");
        assert_eq!(native_symbol(ChainId::Evm(137)), "MATIC");
        assert_eq!(native_symbol(ChainId::Tron), "TRX");
        // rollups fall through to ETH
        assert_eq!(native_symbol(ChainId::Evm(59144)), "ETH");
        assert_eq!(native_symbol(ChainId::Evm(999999)), "ETH");
    }

    #[test]
    fn gateway_slug_covers_known_chains_only() {
        assert_eq!(gateway_slug(ChainId::Evm(56)), Some("bsc"));
        assert_eq!(gateway_slug(ChainId::Evm(1101)), Some("polygon_zkevm"));
        assert_eq!(gateway_slug(ChainId::Tron), None);
        assert_eq!(gateway_slug(ChainId::Evm(33139)), None);
    }

    #[test]
    fn known_tokens_resolve_case_insensitively_on_evm() {
        assert_eq!(
            known_token_symbol(ChainId::Evm(56), "0x55D398326f99059fF775485246999027B3197955"),
            Some("USDT")
        );
        assert_eq!(
            known_token_symbol(ChainId::Tron, "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"),
            Some("USDT")
        );
        assert_eq!(known_token_symbol(ChainId::Evm(56), "0xdeadbeef"), None);
    }

    #[test]
    fn dust_thresholds_follow_symbol_table() {
        assert_eq!(min_amount_threshold("USDT"), Decimal::new(1, 0));
        assert_eq!(min_amount_threshold("BNB"), Decimal::new(1, 3));
        assert_eq!(min_amount_threshold("TRX"), Decimal::new(10, 0));
        assert_eq!(min_amount_threshold("PEPE"), Decimal::new(1, 2));
    }

    #[test]
    fn truncate_address_keeps_prefix_and_suffix() {
        assert_eq!(
            truncate_address("0x7083609fce4d1d8dc0c979aab8c869ea2c873402"),
            "0x7083...3402"
        );
        assert_eq!(truncate_address("0xshort"), "0xshort");
    }

    #[test]
    fn explorer_links_render_per_chain() {
        assert_eq!(
            explorer_tx_url(ChainId::Evm(56), "0xabc").as_deref(),
            Some("https://bscscan.com/tx/0xabc")
        );
        assert_eq!(
            explorer_tx_url(ChainId::Tron, "deadbeef").as_deref(),
            Some("https://tronscan.org/#/transaction/deadbeef")
        );
        assert_eq!(explorer_tx_url(ChainId::Evm(424242), "0xabc"), None);
    }
}
