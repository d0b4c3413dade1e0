//! Tick-level microstructure features
//!
//! On every gated snapshot the engine reads the top-K depth view plus
//! the inter-tick flow window and computes the feature battery below.
//! Every raw value runs through its own rolling z-score; the z-scored
//! row is what lands in the tick level of the feature store.
//!
//! Families: structural depth (imbalances, shape), dynamic order flow,
//! behavior, clustering, resiliency, impact cost, and anomaly.

use crate::features::flow::FlowWindow;
use crate::features::zscore::RollingZScore;
use crate::lob::{DepthView, DEPTH_LEVELS};

/// Rolling z-score window (ticks).
pub const ZSCORE_WINDOW: usize = 1800;

/// Convexity weights for the multi-level imbalance.
const CWI_GAMMA: [f32; 3] = [1.0, 2.0, 3.0];
/// Distance-discount factors, per tick of distance from mid.
const DDI_LAMBDA: [f32; 3] = [0.01, 0.05, 0.1];

/// Column order of the tick feature row.
pub const TICK_FEATURES: [&str; 42] = [
    "sd_sprd",
    "sd_mpg",
    "sd_tobi",
    "sd_cwi_1",
    "sd_cwi_2",
    "sd_cwi_3",
    "sd_ddi_1",
    "sd_ddi_2",
    "sd_ddi_3",
    "sd_cum_rat",
    "sd_adj_rat",
    "sd_cvx_bid",
    "sd_cvx_ask",
    "sd_slp_bid",
    "sd_slp_ask",
    "sd_ent_bid",
    "sd_ent_ask",
    "df_arr_bid",
    "df_arr_ask",
    "df_can_bid",
    "df_can_ask",
    "df_trd_buy",
    "df_trd_sell",
    "df_net_ord",
    "df_foi",
    "bh_agg_buy",
    "bh_agg_sell",
    "bh_agg_dif",
    "bh_cpr",
    "bh_fleet_rt",
    "bh_ord_size",
    "cd_can_clst",
    "cd_evt_idx",
    "rs_rpl_vol",
    "rs_ratio",
    "ic_sim_buy",
    "ic_sim_sell",
    "ic_ldr_bid",
    "ic_ldr_ask",
    "an_ext_bid",
    "an_ext_ask",
    "an_spike",
];

pub const TICK_FEATURE_COUNT: usize = TICK_FEATURES.len();

const TICK_SIZE: f32 = 0.01;

pub struct TickFeatureEngine {
    zs: Vec<RollingZScore<ZSCORE_WINDOW>>,
    prev_bid_depth: f32,
    prev_ask_depth: f32,
    has_prev_depth: bool,
}

impl Default for TickFeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TickFeatureEngine {
    pub fn new() -> Self {
        Self {
            zs: (0..TICK_FEATURE_COUNT)
                .map(|_| RollingZScore::new())
                .collect(),
            prev_bid_depth: 0.0,
            prev_ask_depth: 0.0,
            has_prev_depth: false,
        }
    }

    /// Compute the z-scored feature row for one tick.
    ///
    /// Returns `None` when either side shows fewer than K levels: the
    /// tick produces no row and the rolling windows are left untouched.
    pub fn update(
        &mut self,
        depth: &DepthView,
        flow: &FlowWindow,
        delta_t: f32,
    ) -> Option<[f32; TICK_FEATURE_COUNT]> {
        if !depth.is_complete() {
            return None;
        }
        let raw = self.raw_features(depth, flow, delta_t);

        let mut row = [0.0f32; TICK_FEATURE_COUNT];
        for (i, (&r, zs)) in raw.iter().zip(self.zs.iter_mut()).enumerate() {
            row[i] = zs.update(r);
        }

        self.prev_bid_depth = depth.total_bid_volume(DEPTH_LEVELS);
        self.prev_ask_depth = depth.total_ask_volume(DEPTH_LEVELS);
        self.has_prev_depth = true;
        Some(row)
    }

    /// Raw (un-normalized) feature values. Reads previous-tick depth
    /// state but does not advance it.
    fn raw_features(
        &self,
        depth: &DepthView,
        flow: &FlowWindow,
        delta_t: f32,
    ) -> [f32; TICK_FEATURE_COUNT] {
        let mut raw = [0.0f32; TICK_FEATURE_COUNT];
        let dt = delta_t.max(1.0);

        let bid_vol1 = depth.best_bid_volume();
        let ask_vol1 = depth.best_ask_volume();
        let mid = depth.mid();
        let spread = depth.spread();

        // --- structural depth -----------------------------------------
        raw[0] = spread;

        let tob_denom = bid_vol1 + ask_vol1;
        let micro = if tob_denom > 0.0 {
            (depth.best_ask() * bid_vol1 + depth.best_bid() * ask_vol1) / tob_denom
        } else {
            mid
        };
        raw[1] = micro - mid;
        raw[2] = if tob_denom > 0.0 {
            (bid_vol1 - ask_vol1) / tob_denom
        } else {
            0.0
        };

        // Convexity-weighted imbalance, w_i = 1 / i^gamma
        for (k, gamma) in CWI_GAMMA.iter().enumerate() {
            let mut numer = 0.0;
            let mut denom = 0.0;
            for i in 0..DEPTH_LEVELS {
                let w = 1.0 / ((i + 1) as f32).powf(*gamma);
                numer += w * (depth.bid_volumes[i] - depth.ask_volumes[i]);
                denom += w * (depth.bid_volumes[i] + depth.ask_volumes[i]);
            }
            raw[3 + k] = if denom > 0.0 { numer / denom } else { 0.0 };
        }

        // Distance-discounted imbalance, w = exp(-lambda * ticks-from-mid)
        for (k, lambda) in DDI_LAMBDA.iter().enumerate() {
            let mut numer = 0.0;
            let mut denom = 0.0;
            for i in 0..DEPTH_LEVELS {
                let dist_bid = (mid - depth.bid_prices[i]) / TICK_SIZE;
                let dist_ask = (depth.ask_prices[i] - mid) / TICK_SIZE;
                let wb = (-lambda * dist_bid).exp();
                let wa = (-lambda * dist_ask).exp();
                numer += wb * depth.bid_volumes[i] - wa * depth.ask_volumes[i];
                denom += wb * depth.bid_volumes[i] + wa * depth.ask_volumes[i];
            }
            raw[6 + k] = if denom > 0.0 { numer / denom } else { 0.0 };
        }

        let total_bid = depth.total_bid_volume(DEPTH_LEVELS);
        let total_ask = depth.total_ask_volume(DEPTH_LEVELS);
        let total = total_bid + total_ask;
        raw[9] = if total > 0.0 { tob_denom / total } else { 0.0 };
        raw[10] = 0.5
            * (safe_div(depth.bid_volumes[0], depth.bid_volumes[1])
                + safe_div(depth.ask_volumes[0], depth.ask_volumes[1]));
        raw[11] = convexity(&depth.bid_volumes);
        raw[12] = convexity(&depth.ask_volumes);
        raw[13] = slope(&depth.bid_volumes);
        raw[14] = slope(&depth.ask_volumes);
        raw[15] = entropy(&depth.bid_volumes);
        raw[16] = entropy(&depth.ask_volumes);

        // --- dynamic order flow ---------------------------------------
        raw[17] = flow.bid_arrivals as f32 / dt;
        raw[18] = flow.ask_arrivals as f32 / dt;
        raw[19] = flow.bid_cancels as f32 / dt;
        raw[20] = flow.ask_cancels as f32 / dt;
        raw[21] = flow.taker_buys as f32 / dt;
        raw[22] = flow.taker_sells as f32 / dt;
        raw[23] = flow.net_order_flow();
        raw[24] = flow.flow_imbalance();

        // --- behavior -------------------------------------------------
        raw[25] = flow.mean_agg_buy();
        raw[26] = flow.mean_agg_sell();
        raw[27] = raw[25] - raw[26];
        raw[28] = safe_div(flow.cancel_vol, flow.post_vol);
        raw[29] = safe_div(flow.fleeting_vol, flow.post_vol);
        raw[30] = if flow.order_count > 0 {
            flow.order_size_sum / flow.order_count as f32
        } else {
            0.0
        };

        // --- clustering -----------------------------------------------
        raw[31] = (flow.bid_cancels + flow.ask_cancels) as f32 / dt;
        raw[32] = flow.events as f32 / dt;

        // --- resiliency -----------------------------------------------
        if self.has_prev_depth {
            let repl = (total_bid - self.prev_bid_depth).max(0.0)
                + (total_ask - self.prev_ask_depth).max(0.0);
            let removed = (self.prev_bid_depth - total_bid).max(0.0)
                + (self.prev_ask_depth - total_ask).max(0.0);
            raw[33] = repl - removed;
            raw[34] = if removed > 0.0 { repl / removed } else { 0.0 };
        }

        // --- impact cost ----------------------------------------------
        let mut ask_pv = 0.0;
        let mut bid_pv = 0.0;
        for i in 0..DEPTH_LEVELS {
            ask_pv += depth.ask_prices[i] * depth.ask_volumes[i];
            bid_pv += depth.bid_prices[i] * depth.bid_volumes[i];
        }
        raw[35] = ask_pv - mid * total_ask;
        raw[36] = mid * total_bid - bid_pv;
        if self.has_prev_depth {
            raw[37] = (self.prev_bid_depth - total_bid).max(0.0) / dt;
            raw[38] = (self.prev_ask_depth - total_ask).max(0.0) / dt;
        }

        // --- anomaly --------------------------------------------------
        let mean_bid = total_bid / DEPTH_LEVELS as f32;
        let mean_ask = total_ask / DEPTH_LEVELS as f32;
        raw[39] = safe_div(depth.bid_volumes[DEPTH_LEVELS - 1], mean_bid);
        raw[40] = safe_div(depth.ask_volumes[DEPTH_LEVELS - 1], mean_ask);
        if self.has_prev_depth {
            let prev_total = self.prev_bid_depth + self.prev_ask_depth;
            raw[41] = if prev_total > 0.0 {
                (total - prev_total) / prev_total
            } else {
                0.0
            };
        }

        raw
    }

    pub fn clear(&mut self) {
        for zs in &mut self.zs {
            zs.clear();
        }
        self.prev_bid_depth = 0.0;
        self.prev_ask_depth = 0.0;
        self.has_prev_depth = false;
    }
}

#[inline(always)]
fn safe_div(a: f32, b: f32) -> f32 {
    if b > 0.0 {
        a / b
    } else {
        0.0
    }
}

/// Mean second difference of the volume profile.
fn convexity(v: &[f32; DEPTH_LEVELS]) -> f32 {
    let mut acc = 0.0;
    for i in 1..DEPTH_LEVELS - 1 {
        acc += v[i + 1] - 2.0 * v[i] + v[i - 1];
    }
    acc / (DEPTH_LEVELS - 2) as f32
}

/// Least-squares slope of volume against level index.
fn slope(v: &[f32; DEPTH_LEVELS]) -> f32 {
    let n = DEPTH_LEVELS as f32;
    let x_mean = (n - 1.0) * 0.5;
    let v_mean: f32 = v.iter().sum::<f32>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &vi) in v.iter().enumerate() {
        let dx = i as f32 - x_mean;
        num += dx * (vi - v_mean);
        den += dx * dx;
    }
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Shannon entropy of the volume distribution across levels.
fn entropy(v: &[f32; DEPTH_LEVELS]) -> f32 {
    let total: f32 = v.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let mut h = 0.0;
    for &vi in v {
        if vi > 0.0 {
            let p = vi / total;
            h -= p * p.ln();
        }
    }
    h
}
