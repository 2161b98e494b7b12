//! EVM event-log address encoding shared by every pipeline that reads
//! Transfer logs, whether they arrive from a raw node or an indexer.

/// Keccak topic of the ERC20 `Transfer(address,address,uint256)` event.
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Left-pad a 20-byte address to the 32-byte topic form used in log
/// filters.
pub fn pad_topic_address(address: &str) -> String {
    format!(
        "0x{:0>64}",
        address.trim_start_matches("0x").to_lowercase()
    )
}

/// Recover an address from a 32-byte topic word (last 20 bytes).
pub fn topic_to_address(topic: &str) -> Option<String> {
    let hex = topic.trim_start_matches("0x");
    if hex.len() < 40 {
        return None;
    }
    Some(format!("0x{}", hex[hex.len() - 40..].to_lowercase()))
}
