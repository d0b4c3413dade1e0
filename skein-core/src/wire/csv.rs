//! Raw exchange CSV → typed records
//!
//! Each extracted asset folder carries three files: 行情.csv (3 s
//! snapshots), 逐笔委托.csv (order placements), 逐笔成交.csv (trades and,
//! on Shenzhen, cancels). Scalings on the way in: prices arrive ×10000
//! and land as fen (÷100), all-side vwaps keep 0.001 precision (÷10),
//! share volumes become lots of 100 (÷100).
//!
//! Market conventions differ per exchange, detected from the code
//! suffix: Shenzhen (.SZ) orders are always placements with B/S side and
//! trades distinguish '0' trade / 'C' cancel; Shanghai (.SH) orders
//! carry 'A' add / 'D' delete and every trade row is a trade.
//!
//! A row with too few fields is skipped silently; file-level IO errors
//! surface as [`PipelineError::Parse`].

use crate::core::{EventKind, OrderEvent, PipelineError, Side, SnapshotRecord};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Canonical file names inside an extracted asset folder.
pub const SNAPSHOT_CSV: &str = "行情.csv";
pub const ORDER_CSV: &str = "逐笔委托.csv";
pub const TRADE_CSV: &str = "逐笔成交.csv";

/// Market detection by code suffix; codes must end .SZ or .SH.
pub fn is_szse(stock_code: &str) -> bool {
    stock_code.ends_with(".SZ")
}

#[inline]
fn field_u64(fields: &[&str], idx: usize) -> u64 {
    fields
        .get(idx)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

#[inline]
fn field_f64(fields: &[&str], idx: usize) -> f64 {
    fields
        .get(idx)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

#[inline]
fn field_char(fields: &[&str], idx: usize) -> char {
    fields
        .get(idx)
        .and_then(|s| s.trim().chars().next())
        .unwrap_or(' ')
}

/// Price ×10000 → fen (0.01 CNY), saturating into u16.
#[inline]
fn price_to_fen(fields: &[&str], idx: usize) -> u16 {
    (field_u64(fields, idx) / 100).min(u16::MAX as u64) as u16
}

/// Price ×10000 → 0.001 CNY units.
#[inline]
fn price_to_milli(fields: &[&str], idx: usize) -> u32 {
    (field_u64(fields, idx) / 10).min(u32::MAX as u64) as u32
}

/// Shares → lots of 100, saturating into the given width.
#[inline]
fn shares_to_lots(fields: &[&str], idx: usize) -> u64 {
    field_u64(fields, idx) / 100
}

/// HHMMSSmmm → (hour, minute, second, 10 ms units).
#[inline]
fn split_time(time: u64) -> (u8, u8, u8, u8) {
    let ms = time % 1000;
    let time = time / 1000;
    let second = (time % 100) as u8;
    let time = time / 100;
    let minute = (time % 100) as u8;
    let hour = (time / 100) as u8;
    (hour, minute, second, (ms / 10) as u8)
}

fn open_lines(path: &Path) -> Result<std::io::Lines<BufReader<File>>, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(BufReader::new(file).lines())
}

/// Parse the snapshot CSV. Cumulative trade counts are differenced; a
/// decrease (seen at day boundaries in real feeds) clamps to zero.
pub fn parse_snapshot_csv(path: &Path) -> Result<Vec<SnapshotRecord>, PipelineError> {
    let mut lines = open_lines(path)?;
    // Header
    let _ = lines.next();

    let mut records = Vec::new();
    let mut prev_trade_count: u64 = 0;

    for line in lines {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                return Err(PipelineError::Parse {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 61 {
            continue;
        }

        let date = field_u64(&fields, 2);
        let time = field_u64(&fields, 3);
        let (hour, minute, second, _) = split_time(time);

        let trade_count_cum = field_u64(&fields, 7);
        let trade_count = if trade_count_cum >= prev_trade_count {
            trade_count_cum - prev_trade_count
        } else {
            tracing::debug!(
                target: "skein::encode",
                "trade count decreased {} -> {}, clamping",
                prev_trade_count,
                trade_count_cum
            );
            0
        };
        prev_trade_count = trade_count_cum;

        let mut snap = SnapshotRecord {
            year: (date / 10_000) as u16,
            month: ((date / 100) % 100) as u8,
            day: (date % 100) as u8,
            hour,
            minute,
            second,
            seconds_in_day: hour as u32 * 3600 + minute as u32 * 60 + second as u32,
            latest_price: price_to_fen(&fields, 4),
            trade_count: trade_count.min(u8::MAX as u64) as u8,
            volume: shares_to_lots(&fields, 5).min(u16::MAX as u64) as u16,
            turnover: field_f64(&fields, 6).max(0.0).min(u32::MAX as f64) as u32,
            high: price_to_fen(&fields, 13),
            low: price_to_fen(&fields, 14),
            open: price_to_fen(&fields, 15),
            prev_close: price_to_fen(&fields, 16),
            direction: 0,
            all_ask_vwap: price_to_milli(&fields, 57),
            all_bid_vwap: price_to_milli(&fields, 58),
            all_ask_volume: shares_to_lots(&fields, 59).min(u32::MAX as u64) as u32,
            all_bid_volume: shares_to_lots(&fields, 60).min(u32::MAX as u64) as u32,
            ..Default::default()
        };
        for i in 0..10 {
            snap.ask_prices[i] = price_to_fen(&fields, 17 + i);
            snap.ask_volumes[i] = shares_to_lots(&fields, 27 + i).min(u16::MAX as u64) as u16;
            snap.bid_prices[i] = price_to_fen(&fields, 37 + i);
            snap.bid_volumes[i] = shares_to_lots(&fields, 47 + i).min(u16::MAX as u64) as u16;
        }
        records.push(snap);
    }
    Ok(records)
}

/// Parse the order-placement CSV into maker/cancel events.
pub fn parse_order_csv(path: &Path, stock_code: &str) -> Result<Vec<OrderEvent>, PipelineError> {
    let szse = is_szse(stock_code);
    let mut lines = open_lines(path)?;
    let _ = lines.next();

    let mut events = Vec::new();
    for line in lines {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                return Err(PipelineError::Parse {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 10 {
            continue;
        }

        let (hour, minute, second, decisecond) = split_time(field_u64(&fields, 3));
        let order_id = field_u64(&fields, 4) as u32;

        // Shenzhen order rows are always placements; Shanghai encodes
        // add/delete in the type column
        let kind = if szse {
            EventKind::Maker
        } else if field_char(&fields, 6) == 'D' {
            EventKind::Cancel
        } else {
            EventKind::Maker
        };
        let side = if field_char(&fields, 7) == 'S' {
            Side::Ask
        } else {
            Side::Bid
        };
        let (bid_id, ask_id) = match side {
            Side::Bid => (order_id, 0),
            Side::Ask => (0, order_id),
        };

        events.push(OrderEvent {
            hour,
            minute,
            second,
            decisecond,
            kind,
            side,
            price: price_to_fen(&fields, 8),
            volume: shares_to_lots(&fields, 9).min(u16::MAX as u64) as u16,
            bid_id,
            ask_id,
        });
    }
    Ok(events)
}

/// Parse the trade CSV into taker (and, on Shenzhen, cancel) events.
pub fn parse_trade_csv(path: &Path, stock_code: &str) -> Result<Vec<OrderEvent>, PipelineError> {
    let szse = is_szse(stock_code);
    let mut lines = open_lines(path)?;
    let _ = lines.next();

    let mut events = Vec::new();
    for line in lines {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                return Err(PipelineError::Parse {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 12 {
            continue;
        }

        let (hour, minute, second, decisecond) = split_time(field_u64(&fields, 3));
        let kind = if szse && field_char(&fields, 5) == 'C' {
            EventKind::Cancel
        } else {
            EventKind::Taker
        };
        let side = if field_char(&fields, 7) == 'S' {
            Side::Ask
        } else {
            Side::Bid
        };

        events.push(OrderEvent {
            hour,
            minute,
            second,
            decisecond,
            kind,
            side,
            price: price_to_fen(&fields, 8),
            volume: shares_to_lots(&fields, 9).min(u16::MAX as u64) as u16,
            ask_id: field_u64(&fields, 10) as u32,
            bid_id: field_u64(&fields, 11) as u32,
        });
    }
    Ok(events)
}

/// Merge order and trade events into one stream ordered by timestamp.
/// The sort is stable so same-timestamp events keep file order.
pub fn merge_events(mut orders: Vec<OrderEvent>, trades: Vec<OrderEvent>) -> Vec<OrderEvent> {
    orders.extend(trades);
    orders.sort_by_key(|e| e.time());
    orders
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn snapshot_line(date: u64, time: u64, price: u64, volume: u64, trade_count: u64) -> String {
        let mut fields = vec![String::new(); 61];
        fields[0] = "000001.SZ".into();
        fields[1] = "SZ".into();
        fields[2] = date.to_string();
        fields[3] = time.to_string();
        fields[4] = price.to_string();
        fields[5] = volume.to_string();
        fields[6] = "123456".into();
        fields[7] = trade_count.to_string();
        for i in 0..10 {
            fields[17 + i] = (price + 100 + i as u64 * 100).to_string(); // asks
            fields[27 + i] = "5000".into();
            fields[37 + i] = (price - 100 - i as u64 * 100).to_string(); // bids
            fields[47 + i] = "6000".into();
        }
        fields[57] = (price + 50).to_string();
        fields[58] = (price - 50).to_string();
        fields[59] = "100000".into();
        fields[60] = "120000".into();
        fields.join(",")
    }

    #[test]
    fn test_parse_snapshot_scalings() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!(
            "header\n{}\n{}\n",
            snapshot_line(20170104, 93_000_000, 100_000, 12_300, 10),
            snapshot_line(20170104, 93_003_000, 100_100, 5_600, 25),
        );
        let path = write_file(&dir, "行情.csv", &content);
        let records = parse_snapshot_csv(&path).unwrap();
        assert_eq!(records.len(), 2);

        let r = &records[0];
        assert_eq!((r.year, r.month, r.day), (2017, 1, 4));
        assert_eq!((r.hour, r.minute, r.second), (9, 30, 0));
        assert_eq!(r.seconds_in_day, 9 * 3600 + 30 * 60);
        // 100000 / 100 = 1000 fen = 10.00 CNY
        assert_eq!(r.latest_price, 1000);
        // 12300 shares = 123 lots
        assert_eq!(r.volume, 123);
        assert_eq!(r.trade_count, 10);
        assert_eq!(r.ask_prices[0], 1001);
        assert_eq!(r.bid_prices[0], 999);
        assert_eq!(r.ask_volumes[0], 50);
        // vwap at 0.001 precision: (100000+50)/10
        assert_eq!(r.all_ask_vwap, 10_005);

        // Cumulative 10 -> 25 differenced to 15
        assert_eq!(records[1].trade_count, 15);
    }

    #[test]
    fn test_trade_count_decrease_clamps_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!(
            "header\n{}\n{}\n",
            snapshot_line(20170104, 93_000_000, 100_000, 1_000, 50),
            snapshot_line(20170104, 93_003_000, 100_000, 1_000, 20),
        );
        let path = write_file(&dir, "行情.csv", &content);
        let records = parse_snapshot_csv(&path).unwrap();
        assert_eq!(records[1].trade_count, 0);
    }

    #[test]
    fn test_short_rows_skipped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let content = format!(
            "header\nshort,row\n{}\n",
            snapshot_line(20170104, 93_000_000, 100_000, 1_000, 1),
        );
        let path = write_file(&dir, "行情.csv", &content);
        let records = parse_snapshot_csv(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_parse_order_csv_markets() {
        let dir = tempfile::tempdir().unwrap();
        // SZ: type column unused, side from column 7
        let sz = "header\n000001.SZ,SZ,20170104,93000500,42,9042,0,B,100000,500\n";
        let path = write_file(&dir, "逐笔委托.csv", sz);
        let events = parse_order_csv(&path, "000001.SZ").unwrap();
        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.kind, EventKind::Maker);
        assert_eq!(e.side, Side::Bid);
        assert_eq!(e.bid_id, 42);
        assert_eq!(e.ask_id, 0);
        assert_eq!(e.price, 1000);
        assert_eq!(e.volume, 5);

        // SH: 'D' rows are cancels
        let sh = "header\n600000.SH,SH,20170104,93000500,7,1007,D,S,101000,200\n";
        let path = write_file(&dir, "sh_orders.csv", sh);
        let events = parse_order_csv(&path, "600000.SH").unwrap();
        let e = &events[0];
        assert_eq!(e.kind, EventKind::Cancel);
        assert_eq!(e.side, Side::Ask);
        assert_eq!(e.ask_id, 7);
    }

    #[test]
    fn test_parse_trade_csv_markets() {
        let dir = tempfile::tempdir().unwrap();
        // SZ trade: code '0', both ids populated
        let sz = "header\n000001.SZ,SZ,20170104,93001000,1,0,,B,100000,300,11,22\n";
        let path = write_file(&dir, "逐笔成交.csv", sz);
        let events = parse_trade_csv(&path, "000001.SZ").unwrap();
        let e = &events[0];
        assert_eq!(e.kind, EventKind::Taker);
        assert_eq!(e.side, Side::Bid);
        assert_eq!(e.ask_id, 11);
        assert_eq!(e.bid_id, 22);

        // SZ cancel: code 'C', blank side
        let szc = "header\n000001.SZ,SZ,20170104,93001000,2,C,,,100000,300,0,33\n";
        let path = write_file(&dir, "cancel.csv", szc);
        let events = parse_trade_csv(&path, "000001.SZ").unwrap();
        assert_eq!(events[0].kind, EventKind::Cancel);
        assert_eq!(events[0].side, Side::Bid);

        // SH never uses the trade code
        let sh = "header\n600000.SH,SH,20170104,93001000,3,C,,S,101000,100,44,55\n";
        let path = write_file(&dir, "sh_trades.csv", sh);
        let events = parse_trade_csv(&path, "600000.SH").unwrap();
        assert_eq!(events[0].kind, EventKind::Taker);
        assert_eq!(events[0].side, Side::Ask);
    }

    #[test]
    fn test_merge_events_ordered_by_time() {
        let mk = |h: u8, m: u8, s: u8| OrderEvent {
            hour: h,
            minute: m,
            second: s,
            decisecond: 0,
            kind: EventKind::Maker,
            side: Side::Bid,
            price: 1000,
            volume: 1,
            bid_id: 1,
            ask_id: 0,
        };
        let merged = merge_events(
            vec![mk(9, 31, 5), mk(9, 30, 1)],
            vec![mk(9, 30, 30), mk(9, 31, 0)],
        );
        let times: Vec<u32> = merged.iter().map(|e| e.time().0).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }
}
