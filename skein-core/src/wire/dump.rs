//! Debug CSV dumps
//!
//! Two per-asset-day files for eyeballing the pipeline: the gated
//! snapshot series (`snapshot_3s`) and the resampled run bars
//! (`bar_resampled`). Prices print at 0.01 precision.

use crate::core::{price_to_cny, PipelineError, RunBar, SnapshotRecord};
use std::fmt::Write as _;
use std::path::Path;

fn write_file(path: &Path, content: &str) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::Output {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, content).map_err(|e| PipelineError::Output {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Dump the gated snapshot series as `<asset>_snapshot_3s.csv`.
pub fn dump_snapshot_csv(
    records: &[SnapshotRecord],
    asset: &str,
    output_dir: &Path,
) -> Result<(), PipelineError> {
    if records.is_empty() {
        return Ok(());
    }
    let mut out = String::with_capacity(records.len() * 160);
    out.push_str("seconds,latest_price,trade_count,turnover,volume,");
    for side in ["bid", "ask"] {
        for i in 1..=5 {
            let _ = write!(out, "{}_price_{},", side, i);
        }
        for i in 1..=5 {
            let _ = write!(out, "{}_vol_{},", side, i);
        }
    }
    out.push_str("direction\n");

    for r in records {
        let _ = write!(
            out,
            "{},{:.2},{},{},{},",
            r.seconds_in_day,
            price_to_cny(r.latest_price),
            r.trade_count,
            r.turnover,
            r.volume
        );
        for i in 0..5 {
            let _ = write!(out, "{:.2},", price_to_cny(r.bid_prices[i]));
        }
        for i in 0..5 {
            let _ = write!(out, "{},", r.bid_volumes[i]);
        }
        for i in 0..5 {
            let _ = write!(out, "{:.2},", price_to_cny(r.ask_prices[i]));
        }
        for i in 0..5 {
            let _ = write!(out, "{},", r.ask_volumes[i]);
        }
        let _ = writeln!(out, "{}", r.direction);
    }

    write_file(&output_dir.join(format!("{}_snapshot_3s.csv", asset)), &out)
}

/// Dump the run bars as `<asset>_bar_resampled.csv`.
pub fn dump_bar_csv(bars: &[RunBar], asset: &str, output_dir: &Path) -> Result<(), PipelineError> {
    if bars.is_empty() {
        return Ok(());
    }
    let mut out = String::with_capacity(bars.len() * 80);
    out.push_str("year,month,day,hour,minute,second,open,high,low,close,vwap,delta_t\n");
    for b in bars {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{}",
            b.year,
            b.month,
            b.day,
            b.hour,
            b.minute,
            b.second,
            b.open,
            b.high,
            b.low,
            b.close,
            b.vwap,
            b.delta_t
        );
    }
    write_file(&output_dir.join(format!("{}_bar_resampled.csv", asset)), &out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let snap = SnapshotRecord {
            seconds_in_day: 34_200,
            latest_price: 1000,
            volume: 10,
            turnover: 10_000,
            ..Default::default()
        };
        dump_snapshot_csv(&[snap], "000001.SZ", dir.path()).unwrap();

        let bar = RunBar {
            year: 2017,
            month: 1,
            day: 4,
            hour: 9,
            minute: 31,
            second: 3,
            open: 10.0,
            high: 10.1,
            low: 9.95,
            close: 10.05,
            vwap: 10.02,
            delta_t: 30,
        };
        dump_bar_csv(&[bar], "000001.SZ", dir.path()).unwrap();

        let snap_text =
            std::fs::read_to_string(dir.path().join("000001.SZ_snapshot_3s.csv")).unwrap();
        assert!(snap_text.starts_with("seconds,"));
        assert!(snap_text.contains("34200,10.00"));

        let bar_text =
            std::fs::read_to_string(dir.path().join("000001.SZ_bar_resampled.csv")).unwrap();
        assert_eq!(bar_text.lines().count(), 2);
        assert!(bar_text.contains("2017,1,4,9,31,3,10.00,10.10,9.95,10.05,10.02,30"));
    }

    #[test]
    fn test_empty_inputs_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        dump_snapshot_csv(&[], "X", dir.path()).unwrap();
        dump_bar_csv(&[], "X", dir.path()).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
