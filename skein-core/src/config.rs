//! JSON configuration
//!
//! Two files, resolved relative to the working directory at startup:
//! `config.json` for the pipeline run (input base, month range, thread
//! split, temp/output bases) and `stock_info.json` mapping asset codes
//! to listing metadata. The stock map filters the asset universe by
//! ipo/delist dates against the configured month range.

use crate::core::PipelineError;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn default_temp_base() -> PathBuf {
    PathBuf::from("/tmp/skein")
}

fn default_output_base() -> PathBuf {
    PathBuf::from("./output")
}

fn default_decompression_threads() -> usize {
    2
}

fn default_max_temp_folders() -> usize {
    4
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Archive base: `<dir>/YYYY/MM/YYYYMMDD.7z`.
    pub dir: PathBuf,
    /// Inclusive start month, "YYYY-MM".
    pub start_month: String,
    /// Inclusive end month, "YYYY-MM".
    pub end_month: String,

    #[serde(default = "default_temp_base")]
    pub temp_base: PathBuf,
    #[serde(default = "default_output_base")]
    pub output_base: PathBuf,
    #[serde(default = "default_decompression_threads")]
    pub decompression_threads: usize,
    /// Extracted temp folders allowed on disk at once.
    #[serde(default = "default_max_temp_folders")]
    pub max_temp_folders: usize,
    /// Debug mode: reuse already-extracted temp folders.
    #[serde(default)]
    pub skip_decompression: bool,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigInvalid {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let config: PipelineConfig =
            serde_json::from_str(&text).map_err(|e| PipelineError::ConfigInvalid {
                reason: format!("{}: {}", path.display(), e),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let start = parse_month(&self.start_month)?;
        let end = parse_month(&self.end_month)?;
        if start > end {
            return Err(PipelineError::ConfigInvalid {
                reason: format!(
                    "start_month {} is after end_month {}",
                    self.start_month, self.end_month
                ),
            });
        }
        if self.decompression_threads == 0 || self.max_temp_folders == 0 {
            return Err(PipelineError::ConfigInvalid {
                reason: "thread and temp-folder counts must be positive".into(),
            });
        }
        Ok(())
    }

    /// All weekdays in the configured month range, oldest first.
    pub fn trading_days(&self) -> Result<Vec<NaiveDate>, PipelineError> {
        let (sy, sm) = parse_month(&self.start_month)?;
        let (ey, em) = parse_month(&self.end_month)?;
        let mut days = Vec::new();
        let mut date = NaiveDate::from_ymd_opt(sy as i32, sm as u32, 1).ok_or_else(|| {
            PipelineError::ConfigInvalid {
                reason: format!("invalid start month {}", self.start_month),
            }
        })?;
        while (date.year() as u16, date.month() as u8) <= (ey, em) {
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                days.push(date);
            }
            date = date.succ_opt().expect("date range within chrono bounds");
        }
        Ok(days)
    }

    /// Archive path for one trading day.
    pub fn archive_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{}.7z", date.format("%Y%m%d")))
    }

    /// Per-asset output directory for one trading day.
    pub fn output_dir(&self, date: NaiveDate, asset: &str) -> PathBuf {
        self.output_base
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
            .join(asset)
    }
}

/// Listing metadata per asset code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockInfo {
    pub name: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub sub_industry: String,
    /// "YYYY-MM" or "YYYY-MM-DD".
    pub ipo_date: String,
    /// Empty while the asset is listed.
    #[serde(default)]
    pub delist_date: String,
}

pub type StockInfoMap = HashMap<String, StockInfo>;

pub fn load_stock_info(path: &Path) -> Result<StockInfoMap, PipelineError> {
    let text = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigInvalid {
        reason: format!("{}: {}", path.display(), e),
    })?;
    serde_json::from_str(&text).map_err(|e| PipelineError::ConfigInvalid {
        reason: format!("{}: {}", path.display(), e),
    })
}

/// Asset codes alive anywhere inside [start_month, end_month], sorted.
pub fn active_assets(
    info: &StockInfoMap,
    start_month: &str,
    end_month: &str,
) -> Result<Vec<String>, PipelineError> {
    let start = parse_month(start_month)?;
    let end = parse_month(end_month)?;

    let mut assets: Vec<String> = info
        .iter()
        .filter_map(|(code, stock)| {
            let ipo = parse_month(&stock.ipo_date).ok()?;
            if ipo > end {
                return None;
            }
            if !stock.delist_date.is_empty() {
                let delist = parse_month(&stock.delist_date).ok()?;
                if delist < start {
                    return None;
                }
            }
            Some(code.clone())
        })
        .collect();
    assets.sort();
    Ok(assets)
}

/// Parse "YYYY-MM" (a trailing "-DD" is accepted and ignored).
pub fn parse_month(s: &str) -> Result<(u16, u8), PipelineError> {
    let invalid = || PipelineError::ConfigInvalid {
        reason: format!("unparseable month: {:?}", s),
    };
    let mut parts = s.splitn(3, '-');
    let year: u16 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let month: u8 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    if !(1..=12).contains(&month) || year < 1990 {
        return Err(invalid());
    }
    Ok((year, month))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(start: &str, end: &str) -> PipelineConfig {
        PipelineConfig {
            dir: PathBuf::from("/data/l2"),
            start_month: start.into(),
            end_month: end.into(),
            temp_base: default_temp_base(),
            output_base: default_output_base(),
            decompression_threads: 2,
            max_temp_folders: 4,
            skip_decompression: false,
        }
    }

    #[test]
    fn test_parse_month_variants() {
        assert_eq!(parse_month("2017-01").unwrap(), (2017, 1));
        assert_eq!(parse_month("2017-01-15").unwrap(), (2017, 1));
        assert!(parse_month("2017").is_err());
        assert!(parse_month("2017-13").is_err());
        assert!(parse_month("garbage").is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let cfg = config("2017-06", "2017-01");
        assert!(cfg.validate().is_err());
        assert!(config("2017-01", "2017-06").validate().is_ok());
    }

    #[test]
    fn test_trading_days_skip_weekends() {
        let cfg = config("2017-01", "2017-01");
        let days = cfg.trading_days().unwrap();
        // January 2017: 22 weekdays
        assert_eq!(days.len(), 22);
        assert!(days
            .iter()
            .all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2017, 1, 2).unwrap());
    }

    #[test]
    fn test_archive_and_output_paths() {
        let cfg = config("2017-01", "2017-01");
        let date = NaiveDate::from_ymd_opt(2017, 1, 4).unwrap();
        assert_eq!(
            cfg.archive_path(date),
            PathBuf::from("/data/l2/2017/01/20170104.7z")
        );
        assert_eq!(
            cfg.output_dir(date, "000001.SZ"),
            PathBuf::from("./output/2017/01/04/000001.SZ")
        );
    }

    #[test]
    fn test_active_assets_filters_by_listing_window() {
        let mut info = StockInfoMap::new();
        info.insert(
            "000001.SZ".into(),
            StockInfo {
                name: "PAB".into(),
                industry: "bank".into(),
                sub_industry: String::new(),
                ipo_date: "1991-04".into(),
                delist_date: String::new(),
            },
        );
        info.insert(
            "LATE.SZ".into(),
            StockInfo {
                name: "late ipo".into(),
                industry: String::new(),
                sub_industry: String::new(),
                ipo_date: "2019-05".into(),
                delist_date: String::new(),
            },
        );
        info.insert(
            "GONE.SH".into(),
            StockInfo {
                name: "delisted early".into(),
                industry: String::new(),
                sub_industry: String::new(),
                ipo_date: "1995-01".into(),
                delist_date: "2016-12-15".into(),
            },
        );

        let assets = active_assets(&info, "2017-01", "2017-06").unwrap();
        assert_eq!(assets, vec!["000001.SZ".to_string()]);
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(err.is_fatal());
    }
}
