//! Columnar, hierarchical feature store
//!
//! Three levels (tick / minute / hour), each a set of append-only typed
//! columns plus a `parent_index` column linking every row to the
//! parent-level row that produced it (tick rows are roots with parent
//! 0). Rows across the columns of a level share indices.
//!
//! Writers are per-asset and strictly sequential; cross-sectional
//! readers on other threads only poll the per-level publication counter
//! through a cloned [`PublicationHandle`]. The counter is bumped with a
//! release store after all columns of a row are written, so a true
//! `is_timeslot_ready` acquire-observes the completed row.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Store level in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum StoreLevel {
    Tick = 0,
    Minute = 1,
    Hour = 2,
}

pub const STORE_LEVELS: usize = 3;

/// Column element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    F32,
    F64,
    U32,
    U64,
    Bool,
}

/// One value of a row, matching its column's type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowValue {
    F32(f32),
    F64(f64),
    U32(u32),
    U64(u64),
    Bool(bool),
}

/// Homogeneous backing storage per column.
#[derive(Debug)]
enum ColumnData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    Bool(Vec<bool>),
}

impl ColumnData {
    fn new(ty: ColumnType, capacity: usize) -> Self {
        match ty {
            ColumnType::F32 => ColumnData::F32(Vec::with_capacity(capacity)),
            ColumnType::F64 => ColumnData::F64(Vec::with_capacity(capacity)),
            ColumnType::U32 => ColumnData::U32(Vec::with_capacity(capacity)),
            ColumnType::U64 => ColumnData::U64(Vec::with_capacity(capacity)),
            ColumnType::Bool => ColumnData::Bool(Vec::with_capacity(capacity)),
        }
    }

    fn push(&mut self, value: RowValue) {
        match (self, value) {
            (ColumnData::F32(v), RowValue::F32(x)) => v.push(x),
            (ColumnData::F64(v), RowValue::F64(x)) => v.push(x),
            (ColumnData::U32(v), RowValue::U32(x)) => v.push(x),
            (ColumnData::U64(v), RowValue::U64(x)) => v.push(x),
            (ColumnData::Bool(v), RowValue::Bool(x)) => v.push(x),
            _ => debug_assert!(false, "row value type does not match column type"),
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnData::F32(v) => v.len(),
            ColumnData::F64(v) => v.len(),
            ColumnData::U32(v) => v.len(),
            ColumnData::U64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
        }
    }

    fn clear(&mut self) {
        match self {
            ColumnData::F32(v) => v.clear(),
            ColumnData::F64(v) => v.clear(),
            ColumnData::U32(v) => v.clear(),
            ColumnData::U64(v) => v.clear(),
            ColumnData::Bool(v) => v.clear(),
        }
    }
}

#[derive(Debug)]
struct Column {
    name: &'static str,
    data: ColumnData,
}

/// Schema of one level: (column name, type) in row order.
pub type LevelSchema<'a> = &'a [(&'static str, ColumnType)];

struct LevelStore {
    columns: Vec<Column>,
    parent_index: Vec<u32>,
    published: Arc<AtomicUsize>,
}

impl LevelStore {
    fn new(schema: LevelSchema<'_>, capacity: usize) -> Self {
        Self {
            columns: schema
                .iter()
                .map(|&(name, ty)| Column {
                    name,
                    data: ColumnData::new(ty, capacity),
                })
                .collect(),
            parent_index: Vec::with_capacity(capacity),
            published: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// Shared read-side view of the publication counters; cheap to clone
/// across threads.
#[derive(Clone)]
pub struct PublicationHandle {
    published: [Arc<AtomicUsize>; STORE_LEVELS],
    date_complete: Arc<AtomicBool>,
}

impl PublicationHandle {
    /// True once row `t` of `level` is fully written across all columns.
    pub fn is_timeslot_ready(&self, level: StoreLevel, t: usize) -> bool {
        self.published[level as usize].load(Ordering::Acquire) > t
    }

    pub fn size(&self, level: StoreLevel) -> usize {
        self.published[level as usize].load(Ordering::Acquire)
    }

    pub fn is_date_complete(&self) -> bool {
        self.date_complete.load(Ordering::Acquire)
    }
}

/// Per-asset feature store. Owned by the asset's worker; readers hold a
/// [`PublicationHandle`].
pub struct FeatureStore {
    levels: [LevelStore; STORE_LEVELS],
    date_complete: Arc<AtomicBool>,
}

impl FeatureStore {
    pub fn new(schemas: [LevelSchema<'_>; STORE_LEVELS], capacity: [usize; STORE_LEVELS]) -> Self {
        Self {
            levels: [
                LevelStore::new(schemas[0], capacity[0]),
                LevelStore::new(schemas[1], capacity[1]),
                LevelStore::new(schemas[2], capacity[2]),
            ],
            date_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Append one row. The writer sees all columns appended atomically;
    /// readers see the row only after the publication bump.
    pub fn push_row(&mut self, level: StoreLevel, values: &[RowValue], parent_index: u32) {
        let store = &mut self.levels[level as usize];
        debug_assert_eq!(values.len(), store.columns.len(), "row arity mismatch");
        for (column, &value) in store.columns.iter_mut().zip(values) {
            column.data.push(value);
        }
        store.parent_index.push(parent_index);
        store.published.fetch_add(1, Ordering::Release);
    }

    pub fn size(&self, level: StoreLevel) -> usize {
        self.levels[level as usize].published.load(Ordering::Acquire)
    }

    /// Contiguous f32 view of a column.
    pub fn column_f32(&self, level: StoreLevel, column: usize) -> Option<&[f32]> {
        match &self.levels[level as usize].columns.get(column)?.data {
            ColumnData::F32(v) => Some(v),
            _ => None,
        }
    }

    /// Contiguous f64 view of a column.
    pub fn column_f64(&self, level: StoreLevel, column: usize) -> Option<&[f64]> {
        match &self.levels[level as usize].columns.get(column)?.data {
            ColumnData::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Contiguous u64 view of a column.
    pub fn column_u64(&self, level: StoreLevel, column: usize) -> Option<&[u64]> {
        match &self.levels[level as usize].columns.get(column)?.data {
            ColumnData::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn column_name(&self, level: StoreLevel, column: usize) -> Option<&'static str> {
        Some(self.levels[level as usize].columns.get(column)?.name)
    }

    pub fn column_count(&self, level: StoreLevel) -> usize {
        self.levels[level as usize].columns.len()
    }

    /// Parent-row back-references for hierarchical joins.
    pub fn parent_index(&self, level: StoreLevel) -> &[u32] {
        &self.levels[level as usize].parent_index
    }

    /// Read-side handle for cross-thread readiness polling.
    pub fn publication(&self) -> PublicationHandle {
        PublicationHandle {
            published: [
                Arc::clone(&self.levels[0].published),
                Arc::clone(&self.levels[1].published),
                Arc::clone(&self.levels[2].published),
            ],
            date_complete: Arc::clone(&self.date_complete),
        }
    }

    /// Signal that the asset-day is fully written; upstream consumers
    /// may recycle buffers past this point.
    pub fn mark_date_complete(&self) {
        self.date_complete.store(true, Ordering::Release);
    }

    /// Reset for the next asset-day; columns keep their capacity.
    pub fn clear(&mut self) {
        for level in &mut self.levels {
            for column in &mut level.columns {
                column.data.clear();
            }
            level.parent_index.clear();
            level.published.store(0, Ordering::Release);
        }
        self.date_complete.store(false, Ordering::Release);
    }
}

/// Asset-keyed registry of publication handles for the multi-producer
/// mode: writers own their stores, readers discover handles here.
#[derive(Default)]
pub struct GlobalFeatureStore {
    handles: DashMap<String, PublicationHandle>,
    completed_dates: DashMap<String, usize>,
}

impl GlobalFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, asset: &str, handle: PublicationHandle) {
        self.handles.insert(asset.to_string(), handle);
    }

    pub fn handle(&self, asset: &str) -> Option<PublicationHandle> {
        self.handles.get(asset).map(|h| h.clone())
    }

    pub fn is_timeslot_ready(&self, asset: &str, level: StoreLevel, t: usize) -> bool {
        self.handles
            .get(asset)
            .map(|h| h.is_timeslot_ready(level, t))
            .unwrap_or(false)
    }

    /// Count one finished asset for `date`; returns the running total.
    pub fn mark_date_complete(&self, date: &str) -> usize {
        let mut entry = self.completed_dates.entry(date.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn completed_assets(&self, date: &str) -> usize {
        self.completed_dates.get(date).map(|c| *c).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK_SCHEMA: LevelSchema<'static> =
        &[("f_a", ColumnType::F32), ("f_b", ColumnType::F32)];
    const MINUTE_SCHEMA: LevelSchema<'static> =
        &[("close", ColumnType::F64), ("volume", ColumnType::U64)];
    const HOUR_SCHEMA: LevelSchema<'static> = &[("close", ColumnType::F64)];

    fn store() -> FeatureStore {
        FeatureStore::new([TICK_SCHEMA, MINUTE_SCHEMA, HOUR_SCHEMA], [64, 8, 2])
    }

    #[test]
    fn test_push_and_read_columns() {
        let mut fs = store();
        fs.push_row(
            StoreLevel::Tick,
            &[RowValue::F32(1.0), RowValue::F32(2.0)],
            0,
        );
        fs.push_row(
            StoreLevel::Tick,
            &[RowValue::F32(3.0), RowValue::F32(4.0)],
            0,
        );
        fs.push_row(
            StoreLevel::Minute,
            &[RowValue::F64(10.5), RowValue::U64(1000)],
            1,
        );

        assert_eq!(fs.size(StoreLevel::Tick), 2);
        assert_eq!(fs.size(StoreLevel::Minute), 1);
        assert_eq!(fs.column_f32(StoreLevel::Tick, 0).unwrap(), &[1.0, 3.0]);
        assert_eq!(fs.column_f32(StoreLevel::Tick, 1).unwrap(), &[2.0, 4.0]);
        assert_eq!(fs.column_f64(StoreLevel::Minute, 0).unwrap(), &[10.5]);
        assert_eq!(fs.column_u64(StoreLevel::Minute, 1).unwrap(), &[1000]);
        assert_eq!(fs.parent_index(StoreLevel::Minute), &[1]);
        assert_eq!(fs.column_name(StoreLevel::Tick, 1), Some("f_b"));
    }

    #[test]
    fn test_timeslot_readiness_tracks_writes() {
        // E5: ready flips exactly at the commit of row t
        let mut fs = store();
        let handle = fs.publication();
        for t in 0..100usize {
            assert!(!handle.is_timeslot_ready(StoreLevel::Tick, t));
            fs.push_row(
                StoreLevel::Tick,
                &[RowValue::F32(t as f32), RowValue::F32(0.0)],
                0,
            );
            assert!(handle.is_timeslot_ready(StoreLevel::Tick, t));
            assert!(!handle.is_timeslot_ready(StoreLevel::Tick, t + 1));
        }
    }

    #[test]
    fn test_concurrent_reader_never_sees_future_rows() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::thread;

        let mut fs = store();
        let handle = fs.publication();
        let written = Arc::new(AtomicUsize::new(0));
        let written_reader = Arc::clone(&written);

        let reader = thread::spawn(move || {
            for _ in 0..10_000 {
                // The writer announces intent before each push, so a
                // visible row count beyond the announced count would be
                // a false positive.
                let visible = handle.size(StoreLevel::Tick);
                let announced = written_reader.load(Ordering::Acquire);
                assert!(
                    visible <= announced,
                    "visible {} rows but only {} announced",
                    visible,
                    announced
                );
                if visible > 0 {
                    assert!(handle.is_timeslot_ready(StoreLevel::Tick, visible - 1));
                }
            }
        });

        for t in 0..1000usize {
            written.store(t + 1, Ordering::Release);
            fs.push_row(
                StoreLevel::Tick,
                &[RowValue::F32(t as f32), RowValue::F32(0.0)],
                0,
            );
        }
        reader.join().unwrap();
    }

    #[test]
    fn test_clear_resets_rows_and_flags() {
        let mut fs = store();
        fs.push_row(
            StoreLevel::Tick,
            &[RowValue::F32(1.0), RowValue::F32(2.0)],
            0,
        );
        fs.mark_date_complete();
        let handle = fs.publication();
        assert!(handle.is_date_complete());

        fs.clear();
        assert_eq!(fs.size(StoreLevel::Tick), 0);
        assert!(!handle.is_date_complete());
        assert!(!handle.is_timeslot_ready(StoreLevel::Tick, 0));
    }

    #[test]
    fn test_global_registry_and_date_counting() {
        let fs = store();
        let global = GlobalFeatureStore::new();
        global.register("000001.SZ", fs.publication());

        assert!(!global.is_timeslot_ready("000001.SZ", StoreLevel::Tick, 0));
        assert!(!global.is_timeslot_ready("missing", StoreLevel::Tick, 0));

        assert_eq!(global.mark_date_complete("20170104"), 1);
        assert_eq!(global.mark_date_complete("20170104"), 2);
        assert_eq!(global.completed_assets("20170104"), 2);
        assert_eq!(global.completed_assets("20170105"), 0);
    }
}
