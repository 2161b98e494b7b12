//! Scan runner: loads configuration, computes the report window, scans
//! every configured wallet across its networks, and prints the incoming
//! transfers with per-token totals. Stands in for the daily report job.
//!
//! Usage: `transfer_tracker [WINDOW] [--csv PATH]` where WINDOW is
//! `yesterday` (default), `today`, or a relative span like `24h` / `7d`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config_manager::ConfigManager;
use tracker_core::{chains, sum_by_symbol, ScanWindow};
use tracker_orchestrator::{ScanOrchestrator, ScanReport};

struct RunnerArgs {
    window_spec: String,
    csv_path: Option<String>,
}

fn parse_args(args: &[String]) -> Result<RunnerArgs> {
    let mut window_spec: Option<String> = None;
    let mut csv_path: Option<String> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--csv" => {
                let path = iter
                    .next()
                    .context("--csv requires a file path argument")?;
                csv_path = Some(path.clone());
            }
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            spec => {
                if window_spec.is_some() {
                    bail!("Only one window argument is accepted, got extra: {}", spec);
                }
                window_spec = Some(spec.to_string());
            }
        }
    }

    Ok(RunnerArgs {
        window_spec: window_spec.unwrap_or_else(|| "yesterday".to_string()),
        csv_path,
    })
}

fn resolve_window(spec: &str, now: DateTime<Utc>) -> Result<ScanWindow> {
    let window = match spec {
        "yesterday" => tracker_core::previous_report_day(now)?,
        "today" => tracker_core::current_report_day(now)?,
        relative => tracker_core::relative_window(relative, now)?,
    };
    Ok(window)
}

fn print_report(report: &ScanReport) {
    println!();
    println!("Wallet {}", report.wallet);
    if report.transfers.is_empty() {
        println!("  No incoming transfers found");
        return;
    }

    for transfer in &report.transfers {
        let when = DateTime::from_timestamp(transfer.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| transfer.timestamp.to_string());
        let kind = if transfer.is_native { "native" } else { "token" };
        println!(
            "  {} {} ({}) from {} on {} at {}",
            transfer.amount.round_dp(3),
            transfer.token_symbol,
            kind,
            transfer.from,
            chains::display_name(transfer.chain),
            when
        );
        if let Some(url) = chains::explorer_tx_url(transfer.chain, &transfer.hash) {
            println!("    {}", url);
        }
    }

    println!("  Totals:");
    for (symbol, total) in sum_by_symbol(&report.transfers) {
        println!("    {}: {}", symbol, total.round_dp(3));
    }
}

fn export_csv(path: &str, reports: &[ScanReport]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create CSV file {}", path))?;
    writer.write_record([
        "wallet",
        "network",
        "hash",
        "token_symbol",
        "amount",
        "is_native",
        "timestamp",
    ])?;
    for report in reports {
        for transfer in &report.transfers {
            writer.write_record([
                report.wallet.as_str(),
                chains::display_name(transfer.chain),
                transfer.hash.as_str(),
                transfer.token_symbol.as_str(),
                &transfer.amount.to_string(),
                if transfer.is_native { "true" } else { "false" },
                &transfer.timestamp.to_string(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let manager = ConfigManager::new().context("failed to load configuration")?;
    let config = manager.config();
    if config.tracking.wallets.is_empty() {
        warn!("No wallets configured; set tracking.wallets in config.toml or TRACKER__TRACKING__WALLETS");
        return Ok(());
    }

    let now = Utc::now();
    let window = resolve_window(&args.window_spec, now)
        .with_context(|| format!("invalid window argument {:?}", args.window_spec))?;
    info!(
        "Scanning {} wallet(s) over window {}..{}",
        config.tracking.wallets.len(),
        window.start_ts,
        window.end_ts
    );

    let orchestrator =
        ScanOrchestrator::from_config(config).context("failed to build scan pipelines")?;
    let reports = orchestrator
        .scan_all(&config.tracking.wallets, window)
        .await;

    for report in &reports {
        print_report(report);
    }

    if let Some(path) = &args.csv_path {
        export_csv(path, &reports)?;
        info!("Exported transfer report to {}", path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_window_is_yesterday() {
        let args = parse_args(&[]).unwrap();
        assert_eq!(args.window_spec, "yesterday");
        assert!(args.csv_path.is_none());
    }

    #[test]
    fn window_and_csv_arguments_parse() {
        let args = parse_args(&strings(&["7d", "--csv", "report.csv"])).unwrap();
        assert_eq!(args.window_spec, "7d");
        assert_eq!(args.csv_path.as_deref(), Some("report.csv"));
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(parse_args(&strings(&["--nope"])).is_err());
        assert!(parse_args(&strings(&["24h", "7d"])).is_err());
        assert!(parse_args(&strings(&["--csv"])).is_err());
    }

    #[test]
    fn window_specs_resolve() {
        let now = DateTime::from_timestamp(1_705_320_000, 0).unwrap();
        assert!(resolve_window("yesterday", now).is_ok());
        assert!(resolve_window("today", now).is_ok());

        let day = resolve_window("24h", now).unwrap();
        assert_eq!(day.end_ts - day.start_ts, 86_400);

        assert!(resolve_window("sometime", now).is_err());
    }
}
