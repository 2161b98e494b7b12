//! Report-window helpers. Daily reports cover calendar days in the
//! UTC+3 reporting timezone; ad-hoc scans accept relative windows such
//! as "24h" or "7d".

use crate::{Result, ScanWindow, TrackerError};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use regex::Regex;
use tracing::debug;

const REPORT_UTC_OFFSET_HOURS: i32 = 3;

fn report_offset() -> Result<FixedOffset> {
    FixedOffset::east_opt(REPORT_UTC_OFFSET_HOURS * 3600)
        .ok_or_else(|| TrackerError::WindowParse("invalid report timezone offset".to_string()))
}

fn day_window(day: NaiveDate, tz: FixedOffset) -> Result<ScanWindow> {
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| TrackerError::WindowParse("invalid day start".to_string()))?;
    let start = midnight
        .and_local_timezone(tz)
        .single()
        .ok_or_else(|| TrackerError::WindowParse(format!("ambiguous day start for {}", day)))?;

    let start_ts = start.timestamp();
    Ok(ScanWindow::new(start_ts, start_ts + 86_399))
}

/// Window covering the previous calendar day in the reporting timezone.
/// This is the range the daily report runs over.
pub fn previous_report_day(now: DateTime<Utc>) -> Result<ScanWindow> {
    let tz = report_offset()?;
    let today = now.with_timezone(&tz).date_naive();
    let yesterday = today
        .pred_opt()
        .ok_or_else(|| TrackerError::WindowParse("date underflow".to_string()))?;
    let window = day_window(yesterday, tz)?;
    debug!(
        "Report window for {}: {}..{}",
        yesterday, window.start_ts, window.end_ts
    );
    Ok(window)
}

/// Window covering the current (incomplete) calendar day in the
/// reporting timezone, capped at `now`.
pub fn current_report_day(now: DateTime<Utc>) -> Result<ScanWindow> {
    let tz = report_offset()?;
    let today = now.with_timezone(&tz).date_naive();
    let window = day_window(today, tz)?;
    Ok(ScanWindow::new(window.start_ts, now.timestamp()))
}

/// Parse a relative window like "30min", "24h" or "7d" into a scan window
/// ending at `now`.
pub fn relative_window(spec: &str, now: DateTime<Utc>) -> Result<ScanWindow> {
    let re = Regex::new(r"^(\d+)(s|min|h|d|m|y)$")
        .map_err(|e| TrackerError::WindowParse(format!("Regex error: {}", e)))?;

    let captures = re
        .captures(spec.trim())
        .ok_or_else(|| TrackerError::WindowParse(format!("Invalid window format: {}", spec)))?;

    let amount: i64 = captures[1]
        .parse()
        .map_err(|e| TrackerError::WindowParse(format!("Invalid number: {}", e)))?;

    let unit_secs: i64 = match &captures[2] {
        "s" => 1,
        "min" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "m" => 2_592_000,
        "y" => 31_536_000,
        other => {
            return Err(TrackerError::WindowParse(format!(
                "Unknown time unit: {}",
                other
            )))
        }
    };

    let offset = amount
        .checked_mul(unit_secs)
        .ok_or_else(|| TrackerError::WindowParse(format!("Window too large: {}", spec)))?;

    let end = now.timestamp();
    let start = end
        .checked_sub(offset)
        .ok_or_else(|| TrackerError::WindowParse(format!("Window too large: {}", spec)))?;

    debug!("Relative window {} => {}..{}", spec, start, end);
    Ok(ScanWindow::new(start, end))
}
