//! Deduction-model limit order book
//!
//! Reconstructs price levels and per-order residual quantities from a
//! mixed maker / cancel / taker stream that may arrive out of order. A
//! deduction (cancel or taker) whose maker has not arrived yet creates a
//! negative-quantity placeholder under the target id; the maker merges
//! into it later. Only `max(0, qty)` ever counts toward visible depth.
//!
//! Levels are unified, with no side field. Which side a price belongs to is
//! derived dynamically from the tracked top of book, which takers advance
//! in O(log n) walks over the ordered visible-price set.
//!
//! Storage: slab arenas for orders and levels (stable keys across
//! inserts), a pre-reserved `HashMap` order index kept at low load, and a
//! `BTreeSet` of prices with positive visible quantity.

use crate::core::{Cached, EventKind, OrderEvent, OrderId, PackedTime, Price, Qty, Side};
use slab::Slab;
use std::collections::{BTreeSet, HashMap};

/// Expected live orders per asset-day; sizes the arenas and the index.
pub const EXPECTED_ORDERS: usize = 100_000;
/// Expected distinct price levels per asset-day.
pub const EXPECTED_LEVELS: usize = 200;
/// Expected resting orders per level.
const EXPECTED_QUEUE: usize = 128;

/// Resting order: residual quantity plus its wire id.
///
/// `qty <= 0` marks a placeholder created by an out-of-order deduction.
#[derive(Debug, Clone, Copy)]
struct BookOrder {
    qty: Qty,
    id: OrderId,
}

impl BookOrder {
    #[inline(always)]
    fn visible(&self) -> Qty {
        self.qty.max(0)
    }
}

/// Unified price level owning the order queue at one price.
#[derive(Debug)]
struct BookLevel {
    price: Price,
    /// Cached sum of positive residuals only.
    total_visible: Qty,
    /// Arena keys of the orders queued here.
    orders: Vec<usize>,
}

impl BookLevel {
    fn new(price: Price) -> Self {
        Self {
            price,
            total_visible: 0,
            orders: Vec::with_capacity(EXPECTED_QUEUE),
        }
    }

    #[inline(always)]
    fn push(&mut self, order_key: usize, visible: Qty) {
        self.orders.push(order_key);
        self.total_visible += visible;
    }

    /// Swap-and-pop removal. Returns the arena key now occupying `pos`,
    /// if any; its index entry must be repaired by the caller.
    #[inline]
    fn swap_remove(&mut self, pos: usize, removed_visible: Qty) -> Option<usize> {
        self.total_visible -= removed_visible;
        self.orders.swap_remove(pos);
        (pos < self.orders.len()).then(|| self.orders[pos])
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    #[inline(always)]
    fn has_visible(&self) -> bool {
        self.total_visible > 0
    }
}

/// Location of a live order: owning level arena key + queue position.
#[derive(Debug, Clone, Copy)]
struct OrderLoc {
    level: usize,
    pos: usize,
}

/// The deduction book.
pub struct DeductionBook {
    orders: Slab<BookOrder>,
    levels: Slab<BookLevel>,
    price_levels: HashMap<Price, usize>,
    visible_prices: BTreeSet<Price>,
    index: HashMap<OrderId, OrderLoc>,

    /// Cached (best_bid, best_ask); 0 means no price on that side yet.
    tob: Cached<(Price, Price)>,

    current_time: PackedTime,
    rejected: u64,
}

impl Default for DeductionBook {
    fn default() -> Self {
        Self::new()
    }
}

impl DeductionBook {
    pub fn new() -> Self {
        let mut index = HashMap::new();
        // 4x headroom keeps the open-addressed table far from its load cap
        index.reserve(EXPECTED_ORDERS * 4);
        Self {
            orders: Slab::with_capacity(EXPECTED_ORDERS),
            levels: Slab::with_capacity(EXPECTED_LEVELS),
            price_levels: HashMap::with_capacity(EXPECTED_LEVELS * 2),
            visible_prices: BTreeSet::new(),
            index,
            tob: Cached::new((0, 0)),
            current_time: PackedTime::default(),
            rejected: 0,
        }
    }

    // ------------------------------------------------------------------
    // Event entry point
    // ------------------------------------------------------------------

    /// Apply one wire event. Returns false only for a rejected event
    /// (maker with zero volume); out-of-order deductions are absorbed.
    #[inline]
    pub fn apply(&mut self, event: &OrderEvent) -> bool {
        self.current_time = event.time();
        match event.kind {
            EventKind::Maker => self.add_maker(event),
            EventKind::Cancel => self.deduct(event, false),
            EventKind::Taker => self.deduct(event, true),
        }
    }

    fn add_maker(&mut self, event: &OrderEvent) -> bool {
        if event.volume == 0 {
            self.rejected += 1;
            return false;
        }
        let order_id = event.target_id();
        let volume = event.volume as Qty;

        match self.index.get(&order_id).copied() {
            None => {
                // Common path: brand-new resting order
                let order_key = self.orders.insert(BookOrder {
                    qty: volume,
                    id: order_id,
                });
                let level_key = self.level_at(event.price);
                let level = &mut self.levels[level_key];
                let pos = level.orders.len();
                level.push(order_key, volume);
                self.index.insert(
                    order_id,
                    OrderLoc {
                        level: level_key,
                        pos,
                    },
                );
                self.update_visible(level_key);
            }
            Some(loc) => {
                // Out-of-order: merge into the placeholder (or duplicate)
                let order_key = self.levels[loc.level].orders[loc.pos];
                let old_qty = self.orders[order_key].qty;
                let new_qty = old_qty + volume;
                self.orders[order_key].qty = new_qty;

                if new_qty == 0 {
                    self.remove_order(loc, order_key, old_qty.max(0));
                    let level = &self.levels[loc.level];
                    if level.is_empty() {
                        self.remove_level(loc.level, true);
                    } else {
                        self.update_visible(loc.level);
                    }
                } else {
                    let delta = new_qty.max(0) - old_qty.max(0);
                    self.levels[loc.level].total_visible += delta;
                    self.update_visible(loc.level);
                }
            }
        }
        true
    }

    /// Shared cancel/taker path. `is_taker` selects the target id rule
    /// and the top-of-book maintenance.
    fn deduct(&mut self, event: &OrderEvent, is_taker: bool) -> bool {
        let target_id = event.target_id();
        let volume = event.volume as Qty;
        let taker_is_bid = event.side.is_bid();

        match self.index.get(&target_id).copied() {
            Some(loc) => {
                let order_key = self.levels[loc.level].orders[loc.pos];
                let old_qty = self.orders[order_key].qty;
                let new_qty = old_qty - volume;
                self.orders[order_key].qty = new_qty;
                let counterparty_price = self.levels[loc.level].price;

                if new_qty <= 0 {
                    // Fully consumed
                    self.remove_order(loc, order_key, old_qty.max(0));
                    let emptied_visible = !self.levels[loc.level].has_visible();

                    if is_taker {
                        if emptied_visible {
                            // Advance past the exhausted level
                            self.visible_prices.remove(&counterparty_price);
                            let (bid, ask) = self.tob.get_unchecked();
                            if taker_is_bid {
                                let next =
                                    self.next_visible_above(counterparty_price).unwrap_or(0);
                                self.tob.set((bid, next));
                            } else {
                                let next =
                                    self.next_visible_below(counterparty_price).unwrap_or(0);
                                self.tob.set((next, ask));
                            }
                        } else {
                            // Level still live: the consumed price is the best
                            self.snap_tob(taker_is_bid, counterparty_price);
                        }
                        if self.levels[loc.level].is_empty() {
                            self.remove_level(loc.level, false);
                        }
                    } else if self.levels[loc.level].is_empty() {
                        self.remove_level(loc.level, true);
                    } else {
                        self.update_visible(loc.level);
                    }
                } else {
                    // Partial deduction: O(1) delta on the cached total
                    let delta = new_qty.max(0) - old_qty.max(0);
                    self.levels[loc.level].total_visible += delta;
                    self.update_visible(loc.level);
                    if is_taker {
                        self.snap_tob(taker_is_bid, counterparty_price);
                    }
                }
            }
            None => {
                // Deduction before its maker: negative placeholder
                let order_key = self.orders.insert(BookOrder {
                    qty: -volume,
                    id: target_id,
                });
                let level_key = self.level_at(event.price);
                let level = &mut self.levels[level_key];
                let pos = level.orders.len();
                level.push(order_key, 0);
                self.index.insert(
                    target_id,
                    OrderLoc {
                        level: level_key,
                        pos,
                    },
                );
                self.update_visible(level_key);

                if is_taker {
                    // Missing maker: the traded price is the best estimate
                    self.snap_tob(taker_is_bid, event.price);
                }
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Level and index maintenance
    // ------------------------------------------------------------------

    #[inline]
    fn level_at(&mut self, price: Price) -> usize {
        if let Some(&key) = self.price_levels.get(&price) {
            return key;
        }
        let key = self.levels.insert(BookLevel::new(price));
        self.price_levels.insert(price, key);
        key
    }

    fn remove_level(&mut self, level_key: usize, erase_visible: bool) {
        let price = self.levels[level_key].price;
        self.price_levels.remove(&price);
        if erase_visible {
            self.visible_prices.remove(&price);
        }
        self.levels.remove(level_key);
    }

    /// Remove an order from its level (swap-and-pop), drop it from the
    /// index and the arena, and repair the moved neighbor's index entry.
    fn remove_order(&mut self, loc: OrderLoc, order_key: usize, removed_visible: Qty) {
        let removed_id = self.orders[order_key].id;
        self.index.remove(&removed_id);

        if let Some(moved_key) = self.levels[loc.level].swap_remove(loc.pos, removed_visible) {
            let moved_id = self.orders[moved_key].id;
            if let Some(moved_loc) = self.index.get_mut(&moved_id) {
                moved_loc.pos = loc.pos;
            }
        }
        self.orders.remove(order_key);
    }

    /// Keep the visible-price set in sync with a level's cached total,
    /// invalidating the TOB cache when a cached best price goes dark.
    fn update_visible(&mut self, level_key: usize) {
        let level = &self.levels[level_key];
        if level.has_visible() {
            self.visible_prices.insert(level.price);
        } else if self.visible_prices.remove(&level.price) {
            let (bid, ask) = self.tob.get_unchecked();
            if level.price == bid || level.price == ask {
                self.tob.invalidate();
            }
        }
    }

    #[inline]
    fn snap_tob(&mut self, taker_is_bid: bool, price: Price) {
        let (bid, ask) = self.tob.get_unchecked();
        if taker_is_bid {
            self.tob.set((bid, price));
        } else {
            self.tob.set((price, ask));
        }
    }

    #[inline]
    fn next_visible_above(&self, price: Price) -> Option<Price> {
        use std::ops::Bound::{Excluded, Unbounded};
        self.visible_prices
            .range((Excluded(price), Unbounded))
            .next()
            .copied()
    }

    #[inline]
    fn next_visible_below(&self, price: Price) -> Option<Price> {
        self.visible_prices.range(..price).next_back().copied()
    }

    /// Fill sides never anchored by a taker (still 0) from the visible
    /// set, staying on the correct side of the anchored price.
    fn fill_missing_tob(&self, mut bid: Price, mut ask: Price) -> (Price, Price) {
        use std::ops::Bound::{Excluded, Unbounded};
        if bid == 0 {
            bid = match ask {
                0 => self.visible_prices.iter().next_back().copied().unwrap_or(0),
                a => self.visible_prices.range(..a).next_back().copied().unwrap_or(0),
            };
        }
        if ask == 0 {
            ask = match bid {
                0 => self.visible_prices.iter().next().copied().unwrap_or(0),
                b => self
                    .visible_prices
                    .range((Excluded(b), Unbounded))
                    .next()
                    .copied()
                    .unwrap_or(0),
            };
        }
        (bid, ask)
    }

    /// Full recompute after an invalidation: anchored prices that went
    /// dark (cancelled away) walk inward to the next visible price, then
    /// missing sides are filled from the set bounds.
    fn resolve_tob(&self) -> (Price, Price) {
        let (bid0, ask0) = self.tob.get_unchecked();

        let bid = if bid0 == 0 || self.visible_prices.contains(&bid0) {
            bid0
        } else {
            self.visible_prices.range(..=bid0).next_back().copied().unwrap_or(0)
        };
        let ask = if ask0 == 0 || self.visible_prices.contains(&ask0) {
            ask0
        } else {
            self.visible_prices.range(ask0..).next().copied().unwrap_or(0)
        };
        self.fill_missing_tob(bid, ask)
    }

    /// Resolve the cached TOB. O(1) when both sides are anchored and
    /// fresh. A taker-anchored price is honored even with no visible
    /// quantity behind it (out-of-order estimate); only invalidation
    /// triggers the inward walk.
    fn tob_prices(&self) -> (Price, Price) {
        let (bid, ask) = self.tob.get_or_recompute(|| self.resolve_tob());
        if bid == 0 || ask == 0 {
            let filled = self.fill_missing_tob(bid, ask);
            if filled != (bid, ask) {
                self.tob.set(filled);
            }
            return filled;
        }
        (bid, ask)
    }

    // ------------------------------------------------------------------
    // Market data access
    // ------------------------------------------------------------------

    #[inline]
    pub fn best_bid(&self) -> Price {
        self.tob_prices().0
    }

    #[inline]
    pub fn best_ask(&self) -> Price {
        self.tob_prices().1
    }

    #[inline]
    pub fn best_bid_qty(&self) -> Qty {
        let bid = self.best_bid();
        if bid == 0 {
            return 0;
        }
        self.price_levels
            .get(&bid)
            .map_or(0, |&key| self.levels[key].total_visible)
    }

    #[inline]
    pub fn best_ask_qty(&self) -> Qty {
        let ask = self.best_ask();
        if ask == 0 {
            return 0;
        }
        self.price_levels
            .get(&ask)
            .map_or(0, |&key| self.levels[key].total_visible)
    }

    #[inline]
    pub fn spread(&self) -> Price {
        let (bid, ask) = self.tob_prices();
        if bid != 0 && ask != 0 {
            ask.saturating_sub(bid)
        } else {
            0
        }
    }

    /// Residual quantity of a live order, if present.
    pub fn order_qty(&self, id: OrderId) -> Option<Qty> {
        let loc = self.index.get(&id)?;
        let key = self.levels[loc.level].orders[loc.pos];
        Some(self.orders[key].qty)
    }

    /// Classify a price against the current top of book.
    ///
    /// At or above the best bid reads as bid side, at or below the best
    /// ask as ask side; strictly inside the spread, the nearer of the two
    /// by midpoint. With an empty book this defaults to bid.
    pub fn judge_side(&self, price: Price) -> Side {
        let (bid, ask) = self.tob_prices();
        if bid == 0 && ask == 0 {
            return Side::Bid;
        }
        if bid > 0 && price >= bid {
            return Side::Bid;
        }
        if ask > 0 && price <= ask {
            return Side::Ask;
        }
        if bid > 0 && ask > 0 {
            let mid = (bid + ask) / 2;
            return if price >= mid { Side::Bid } else { Side::Ask };
        }
        if bid > 0 {
            Side::Bid
        } else {
            Side::Ask
        }
    }

    /// Visit up to `max_levels` bid levels best-first as (price, qty).
    pub fn for_each_visible_bid(&self, mut f: impl FnMut(Price, Qty), max_levels: usize) {
        let bid = self.best_bid();
        if bid == 0 {
            return;
        }
        for &price in self.visible_prices.range(..=bid).rev().take(max_levels) {
            if let Some(&key) = self.price_levels.get(&price) {
                let level = &self.levels[key];
                if level.has_visible() {
                    f(price, level.total_visible);
                }
            }
        }
    }

    /// Visit up to `max_levels` ask levels best-first as (price, qty).
    pub fn for_each_visible_ask(&self, mut f: impl FnMut(Price, Qty), max_levels: usize) {
        let ask = self.best_ask();
        if ask == 0 {
            return;
        }
        for &price in self.visible_prices.range(ask..).take(max_levels) {
            if let Some(&key) = self.price_levels.get(&price) {
                let level = &self.levels[key];
                if level.has_visible() {
                    f(price, level.total_visible);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Statistics and lifecycle
    // ------------------------------------------------------------------

    pub fn total_orders(&self) -> usize {
        self.index.len()
    }

    pub fn total_levels(&self) -> usize {
        self.price_levels.len()
    }

    pub fn rejected_events(&self) -> u64 {
        self.rejected
    }

    pub fn last_event_time(&self) -> PackedTime {
        self.current_time
    }

    /// Sum of all positive residuals (the conservation test oracle).
    pub fn total_visible_quantity(&self) -> Qty {
        self.orders.iter().map(|(_, o)| o.visible()).sum()
    }

    /// Full reset; arenas keep their capacity for the next asset-day.
    pub fn clear(&mut self) {
        self.orders.clear();
        self.levels.clear();
        self.price_levels.clear();
        self.visible_prices.clear();
        self.index.clear();
        self.tob.set((0, 0));
        self.tob.invalidate();
        self.current_time = PackedTime::default();
        self.rejected = 0;
    }

    /// Structural self-check used by tests: level totals match their
    /// orders, the visible set matches level totals, and every index
    /// entry points at the order bearing its id. O(book), not for the
    /// event path.
    pub fn check_invariants(&self) -> bool {
        for (_, level) in self.levels.iter() {
            let sum: Qty = level
                .orders
                .iter()
                .map(|&k| self.orders[k].visible())
                .sum();
            if sum != level.total_visible {
                return false;
            }
            if level.has_visible() != self.visible_prices.contains(&level.price) {
                return false;
            }
        }
        for (&id, loc) in &self.index {
            let Some(level) = self.levels.get(loc.level) else {
                return false;
            };
            let Some(&key) = level.orders.get(loc.pos) else {
                return false;
            };
            if self.orders[key].id != id {
                return false;
            }
        }
        true
    }
}
