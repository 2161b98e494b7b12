use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// General system settings
    pub system: SystemSettings,

    /// Wallets to scan and the networks to scan them on
    pub tracking: TrackingConfig,

    /// Direct JSON-RPC scanning (rotating public endpoints)
    pub evm_rpc: EvmRpcConfig,

    /// TronGrid REST API
    pub trongrid: TronGridConfig,

    /// Etherscan-compatible explorer API (V2, multi-chain)
    pub etherscan: EtherscanConfig,

    /// Ankr multichain gateway
    pub ankr: AnkrConfig,

    /// Result filtering
    pub filters: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    /// Enable debug mode
    pub debug_mode: bool,

    /// How many (wallet, network) scan units run concurrently
    pub scan_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Wallet addresses to scan (EVM 0x... or TRON T...)
    pub wallets: Vec<String>,

    /// Networks to scan, by short name ("bnb", "eth", "tron", "polygon", ...)
    /// Names without a dedicated pipeline fall back to the gateway.
    pub networks: Vec<String>,

    /// Networks routed to the explorer API instead of the gateway
    pub explorer_networks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmRpcConfig {
    /// RPC endpoint lists keyed by network name. A network listed here is
    /// scanned over JSON-RPC with endpoint rotation.
    pub endpoints: HashMap<String, Vec<String>>,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Liveness-probe timeout in seconds (latest-block call after rotation)
    pub probe_timeout_seconds: u64,

    /// Retry attempts per RPC call before giving up
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles per attempt
    pub base_retry_delay_ms: u64,

    /// Retry delay ceiling in milliseconds
    pub max_retry_delay_ms: u64,

    /// Sleep after an HTTP 429 before retrying the same endpoint
    pub rate_limit_delay_ms: u64,

    /// Widest block range a single scan may cover; wider requests are
    /// clamped toward the newest blocks
    pub max_blocks_to_scan: u64,

    /// Block-range width up to which full blocks are parsed directly
    pub direct_block_parse_limit: u64,

    /// Cap on logs processed by the unfiltered fallback scan
    pub broad_log_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TronGridConfig {
    /// TronGrid API key (TRON-PRO-API-KEY header). Required to scan TRON.
    pub api_key: String,

    /// API base URL
    pub api_base_url: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Page size for transaction queries
    pub page_limit: u32,

    /// Retry attempts for transient errors
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtherscanConfig {
    /// Explorer API key. Required to scan explorer-routed networks.
    pub api_key: String,

    /// API base URL (V2 endpoint, chain selected per request)
    pub api_base_url: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Pause before each request, to stay under the free-tier rate limit
    pub rate_limit_delay_ms: u64,

    /// Retry attempts for transient errors
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnkrConfig {
    /// Gateway API key appended to per-chain endpoints
    pub api_key: String,

    /// Gateway base URL
    pub api_base_url: String,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Page size for ankr_getTransactionsByAddress
    pub page_size: u32,

    /// Retry attempts for transient errors
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Drop transfers below the per-symbol minimum amount
    pub dust_enabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            "bnb".to_string(),
            vec![
                "https://bsc-dataseed.binance.org".to_string(),
                "https://bsc-dataseed1.binance.org".to_string(),
                "https://bsc-dataseed1.defibit.io".to_string(),
                "https://bsc-dataseed2.defibit.io".to_string(),
                "https://bsc-dataseed3.defibit.io".to_string(),
                "https://bsc-dataseed4.defibit.io".to_string(),
            ],
        );

        Self {
            system: SystemSettings {
                debug_mode: false,
                scan_batch_size: 4,
            },
            tracking: TrackingConfig {
                wallets: Vec::new(),
                networks: vec!["bnb".to_string(), "eth".to_string(), "tron".to_string()],
                explorer_networks: vec!["eth".to_string()],
            },
            evm_rpc: EvmRpcConfig {
                endpoints,
                request_timeout_seconds: 15,
                probe_timeout_seconds: 5,
                max_retries: 3,
                base_retry_delay_ms: 500,
                max_retry_delay_ms: 8_000,
                rate_limit_delay_ms: 1_000,
                max_blocks_to_scan: 10_000,
                direct_block_parse_limit: 500,
                broad_log_limit: 1_000,
            },
            trongrid: TronGridConfig {
                api_key: "".to_string(), // Must be set in .env or config file
                api_base_url: "https://api.trongrid.io/v1".to_string(),
                request_timeout_seconds: 20,
                page_limit: 100,
                max_retries: 5,
            },
            etherscan: EtherscanConfig {
                api_key: "".to_string(), // Must be set in .env or config file
                api_base_url: "https://api.etherscan.io/v2/api".to_string(),
                request_timeout_seconds: 10,
                rate_limit_delay_ms: 1_000,
                max_retries: 5,
            },
            ankr: AnkrConfig {
                api_key: "".to_string(), // Must be set in .env or config file
                api_base_url: "https://rpc.ankr.com".to_string(),
                request_timeout_seconds: 30,
                page_size: 100,
                max_retries: 3,
            },
            filters: FilterConfig { dust_enabled: true },
        }
    }
}

impl EvmRpcConfig {
    pub fn validate(&self) -> Result<()> {
        for (network, urls) in &self.endpoints {
            if urls.is_empty() {
                return Err(ConfigurationError::InvalidValue(format!(
                    "RPC endpoint list for '{}' is empty",
                    network
                )));
            }
        }

        if self.request_timeout_seconds == 0 || self.probe_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "RPC timeouts must be greater than 0".to_string(),
            ));
        }

        if self.max_blocks_to_scan == 0 || self.direct_block_parse_limit == 0 {
            return Err(ConfigurationError::InvalidValue(
                "RPC scan limits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl TrackerConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&TrackerConfig::default())?);

        // Add config file if it exists
        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        // Add environment variables with prefix
        config_builder = config_builder.add_source(
            Environment::with_prefix("TRACKER")
                .try_parsing(true)
                .separator("__")
                .list_separator(","),
        );

        let config = config_builder.build()?;
        let mut tracker_config: TrackerConfig = config.try_deserialize()?;

        // Canonicalize network names so the rest of the system only ever
        // sees short names
        tracker_config.tracking.networks = tracker_config
            .tracking
            .networks
            .iter()
            .map(|n| normalize_network(n))
            .collect();
        tracker_config.tracking.explorer_networks = tracker_config
            .tracking
            .explorer_networks
            .iter()
            .map(|n| normalize_network(n))
            .collect();

        tracker_config.validate()?;

        Ok(tracker_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.evm_rpc.validate()?;

        if self.system.scan_batch_size == 0 {
            return Err(ConfigurationError::InvalidValue(
                "scan_batch_size must be greater than 0".to_string(),
            ));
        }

        for timeout in [
            self.trongrid.request_timeout_seconds,
            self.etherscan.request_timeout_seconds,
            self.ankr.request_timeout_seconds,
        ] {
            if timeout == 0 {
                return Err(ConfigurationError::InvalidValue(
                    "Request timeouts must be greater than 0".to_string(),
                ));
            }
        }

        for wallet in &self.tracking.wallets {
            if !is_valid_evm_address(wallet) && !is_valid_tron_address(wallet) {
                return Err(ConfigurationError::InvalidValue(format!(
                    "Wallet address '{}' is neither a valid EVM nor TRON address",
                    wallet
                )));
            }
        }

        // Missing API keys are surfaced per request, but an early warning
        // saves a confused empty report
        if self.tracking.networks.iter().any(|n| n == "tron") && self.trongrid.api_key.is_empty() {
            warn!("⚠️ TRON is enabled but trongrid.api_key is empty; TRON scans will fail");
        }
        if self
            .tracking
            .networks
            .iter()
            .any(|n| self.tracking.explorer_networks.contains(n))
            && self.etherscan.api_key.is_empty()
        {
            warn!("⚠️ Explorer networks are enabled but etherscan.api_key is empty");
        }

        Ok(())
    }
}

/// Canonical short name for a network ("ethereum" -> "eth",
/// "bsc" -> "bnb", ...). Unknown names pass through lowercased so the
/// gateway fallback can still try them.
pub fn normalize_network(input: &str) -> String {
    match input.trim().to_lowercase().as_str() {
        "eth" | "ethereum" => "eth".to_string(),
        "bnb" | "bsc" | "binance" | "binance-smart-chain" => "bnb".to_string(),
        "polygon" | "matic" => "polygon".to_string(),
        "tron" | "trx" => "tron".to_string(),
        other => other.to_string(),
    }
}

/// EVM address check: 0x followed by 40 hex characters.
pub fn is_valid_evm_address(address: &str) -> bool {
    Regex::new(r"^0x[0-9a-fA-F]{40}$")
        .map(|re| re.is_match(address))
        .unwrap_or(false)
}

/// TRON base58 address check: T followed by 33 base58 characters.
pub fn is_valid_tron_address(address: &str) -> bool {
    Regex::new(r"^T[1-9A-HJ-NP-Za-km-z]{33}$")
        .map(|re| re.is_match(address))
        .unwrap_or(false)
}

/// Whether an address is usable on a network. TRON wallets only pair with
/// TRON; EVM wallets pair with everything else.
pub fn address_matches_network(address: &str, network: &str) -> bool {
    if normalize_network(network) == "tron" {
        is_valid_tron_address(address)
    } else {
        is_valid_evm_address(address)
    }
}

/// Configuration manager for loading and holding the system configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: TrackerConfig,
}

impl ConfigManager {
    /// Create a new configuration manager from config.toml + environment
    pub fn new() -> Result<Self> {
        let config = TrackerConfig::load()?;
        info!("Configuration loaded successfully");
        debug!("Configuration: {:#?}", config);

        Ok(Self { config })
    }

    /// Create configuration manager from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = TrackerConfig::load_from_path(path)?;
        Ok(Self { config })
    }

    /// Get a reference to the current configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn default_config_is_valid() {
        TrackerConfig::default().validate().unwrap();
    }

    #[test]
    fn address_validation_accepts_both_families() {
        assert!(is_valid_evm_address(
            "0x55d398326f99059fF775485246999027B3197955"
        ));
        assert!(!is_valid_evm_address("0x55d398"));
        assert!(!is_valid_evm_address(
            "55d398326f99059ff775485246999027b3197955"
        ));

        assert!(is_valid_tron_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        // 0 and O are not in the base58 alphabet
        assert!(!is_valid_tron_address("TR0NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        assert!(!is_valid_tron_address("0x55d398326f99059ff775485246999027b3197955"));
    }

    #[test]
    fn addresses_pair_with_matching_networks_only() {
        let evm = "0x55d398326f99059ff775485246999027b3197955";
        let tron = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

        assert!(address_matches_network(evm, "bnb"));
        assert!(address_matches_network(evm, "polygon"));
        assert!(!address_matches_network(evm, "tron"));

        assert!(address_matches_network(tron, "tron"));
        assert!(!address_matches_network(tron, "bnb"));
    }

    #[test]
    fn network_names_normalize_to_short_forms() {
        assert_eq!(normalize_network("Ethereum"), "eth");
        assert_eq!(normalize_network("bsc"), "bnb");
        assert_eq!(normalize_network("MATIC"), "polygon");
        assert_eq!(normalize_network("emerald"), "emerald");
    }

    #[test]
    fn validation_rejects_bad_wallets_and_empty_endpoint_lists() {
        let mut config = TrackerConfig::default();
        config.tracking.wallets = vec!["not-an-address".to_string()];
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.evm_rpc.endpoints.insert("eth".to_string(), vec![]);
        assert!(config.validate().is_err());

        let mut config = TrackerConfig::default();
        config.system.scan_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_overrides_land_on_top_of_defaults() {
        let toml = r#"
            [tracking]
            wallets = ["0x2222222222222222222222222222222222222222"]
            networks = ["BSC", "Ethereum"]

            [trongrid]
            api_key = "test-key"

            [evm_rpc]
            max_blocks_to_scan = 5000
        "#;

        let config = Config::builder()
            .add_source(Config::try_from(&TrackerConfig::default()).unwrap())
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        let mut parsed: TrackerConfig = config.try_deserialize().unwrap();
        parsed.tracking.networks = parsed
            .tracking
            .networks
            .iter()
            .map(|n| normalize_network(n))
            .collect();

        parsed.validate().unwrap();
        assert_eq!(parsed.tracking.networks, vec!["bnb", "eth"]);
        assert_eq!(parsed.evm_rpc.max_blocks_to_scan, 5_000);
        assert_eq!(parsed.trongrid.api_key, "test-key");
        // untouched defaults survive
        assert_eq!(parsed.etherscan.rate_limit_delay_ms, 1_000);
        assert_eq!(parsed.evm_rpc.endpoints["bnb"].len(), 6);
    }
}
