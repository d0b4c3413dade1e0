//! Inter-tick order-flow tallies
//!
//! The dynamic-flow and behavior feature families need event counts and
//! volumes accumulated between consecutive gated snapshots: arrivals,
//! cancels, taker executions, aggressiveness of new quotes, and fleeting
//! (post-then-cancel) activity. The asset-day context records every
//! order event here; the tick engine drains one [`FlowWindow`] per tick.

use crate::core::{price_to_cny, EventKind, OrderEvent, OrderId, PackedTime};
use std::collections::HashMap;

/// An order posted and cancelled within this many 10 ms units counts
/// as fleeting (50 ms).
const FLEETING_CENTIS: u32 = 5;

/// Drained tallies for one inter-tick window.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowWindow {
    pub bid_arrivals: u32,
    pub ask_arrivals: u32,
    pub bid_cancels: u32,
    pub ask_cancels: u32,
    pub taker_buys: u32,
    pub taker_sells: u32,

    /// Volumes in lots.
    pub bid_arrival_vol: f32,
    pub ask_arrival_vol: f32,
    pub cancel_vol: f32,
    pub post_vol: f32,
    pub taker_buy_vol: f32,
    pub taker_sell_vol: f32,
    pub fleeting_vol: f32,

    pub agg_buy_sum: f32,
    pub agg_buy_count: u32,
    pub agg_sell_sum: f32,
    pub agg_sell_count: u32,

    pub order_size_sum: f32,
    pub order_count: u32,
    pub events: u32,
}

impl FlowWindow {
    #[inline]
    pub fn net_order_flow(&self) -> f32 {
        (self.bid_arrivals as f32 - self.bid_cancels as f32)
            - (self.ask_arrivals as f32 - self.ask_cancels as f32)
    }

    #[inline]
    pub fn flow_imbalance(&self) -> f32 {
        let denom = self.bid_arrival_vol + self.ask_arrival_vol;
        if denom > 0.0 {
            (self.bid_arrival_vol - self.ask_arrival_vol) / denom
        } else {
            0.0
        }
    }

    #[inline]
    pub fn mean_agg_buy(&self) -> f32 {
        if self.agg_buy_count > 0 {
            self.agg_buy_sum / self.agg_buy_count as f32
        } else {
            0.0
        }
    }

    #[inline]
    pub fn mean_agg_sell(&self) -> f32 {
        if self.agg_sell_count > 0 {
            self.agg_sell_sum / self.agg_sell_count as f32
        } else {
            0.0
        }
    }
}

/// Accumulator fed by the raw event stream.
#[derive(Debug, Default)]
pub struct FlowCounters {
    window: FlowWindow,
    /// Posts seen this window, for the fleeting-order match.
    recent_posts: HashMap<OrderId, (PackedTime, f32)>,
}

impl FlowCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event. `best_bid` / `best_ask` (CNY) anchor the
    /// aggressiveness of new quotes; zeros skip that term.
    pub fn record(&mut self, event: &OrderEvent, best_bid: f32, best_ask: f32) {
        let w = &mut self.window;
        w.events += 1;
        let vol = event.volume as f32;
        let price = price_to_cny(event.price);

        match event.kind {
            EventKind::Maker => {
                w.post_vol += vol;
                w.order_size_sum += vol;
                w.order_count += 1;
                self.recent_posts
                    .insert(event.target_id(), (event.time(), vol));
                if event.side.is_bid() {
                    w.bid_arrivals += 1;
                    w.bid_arrival_vol += vol;
                    if best_bid > 0.0 && price > 0.0 {
                        w.agg_buy_sum += (best_bid / price).ln();
                        w.agg_buy_count += 1;
                    }
                } else {
                    w.ask_arrivals += 1;
                    w.ask_arrival_vol += vol;
                    if best_ask > 0.0 && price > 0.0 {
                        w.agg_sell_sum += (price / best_ask).ln();
                        w.agg_sell_count += 1;
                    }
                }
            }
            EventKind::Cancel => {
                w.cancel_vol += vol;
                if event.side.is_bid() {
                    w.bid_cancels += 1;
                } else {
                    w.ask_cancels += 1;
                }
                if let Some((posted_at, posted_vol)) =
                    self.recent_posts.remove(&event.target_id())
                {
                    // Absolute sub-second arithmetic: raw packed values
                    // jump at second/minute boundaries
                    let dt = event
                        .time()
                        .intraday_centis()
                        .saturating_sub(posted_at.intraday_centis());
                    if dt <= FLEETING_CENTIS {
                        w.fleeting_vol += posted_vol;
                    }
                }
            }
            EventKind::Taker => {
                if event.side.is_bid() {
                    w.taker_buys += 1;
                    w.taker_buy_vol += vol;
                } else {
                    w.taker_sells += 1;
                    w.taker_sell_vol += vol;
                }
            }
        }
    }

    /// Drain the current window and start a fresh one.
    pub fn take(&mut self) -> FlowWindow {
        self.recent_posts.clear();
        std::mem::take(&mut self.window)
    }

    pub fn clear(&mut self) {
        self.window = FlowWindow::default();
        self.recent_posts.clear();
    }
}
