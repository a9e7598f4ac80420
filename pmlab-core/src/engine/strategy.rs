//! Strategy engine: the shared state machine every family runs through.
//!
//! States: WarmingUp → Flat → {Long, Short} → Flat → …
//!
//! Per aligned, warmed-up update:
//! 1. Flat and |deviation| > net_change: enter, sized from the risk budget
//! 2. In position and adverse excursion > loss_ticks: stop out
//! 3. In position and |deviation| < net_change / 2: exit on convergence
//! 4. Otherwise: a no-op record carrying realized + unrealized PnL
//!
//! Exactly one record is appended per update that reaches step 1, so the
//! log stays dense for per-day alignment downstream.

use super::performance::StrategyMetrics;
use crate::domain::{Bar, Instrument, Position, Side, StrategyId, TradeRecord};
use crate::signals::{build_model, Observation, Observe, SignalModel, StrategyError, StrategyFamily, StrategyParams};
use chrono::NaiveDate;
use tracing::{debug, trace};

/// Fraction of `net_change` under which an open position is closed.
const CONVERGENCE_FRACTION: f64 = 0.5;

/// Contracts to trade for a risk budget: `floor(risk / tick_value / loss_ticks) + 1`.
///
/// `None` when the stop distance or tick value is zero, negative or not finite.
pub fn trade_size(risk_dollars: f64, tick_value: f64, loss_ticks: f64) -> Option<i64> {
    if !(loss_ticks > 0.0 && tick_value > 0.0 && risk_dollars.is_finite()) {
        return None;
    }
    let units = (risk_dollars / tick_value / loss_ticks).floor();
    if !units.is_finite() || units < 0.0 {
        return None;
    }
    Some(units as i64 + 1)
}

/// What happened to one bar handed to a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The bar's symbol is not one of this strategy's legs.
    Ignored,
    /// Void or inverted bar, dropped without state change.
    Malformed,
    /// Waiting for the other leg to reach the same date.
    Unaligned,
    WarmingUp,
    /// Numerical failure in the family's measurement.
    Skipped,
    /// A record was appended with this side.
    Recorded(Side),
}

#[derive(Debug)]
pub struct StrategyEngine {
    id: StrategyId,
    family: StrategyFamily,
    params: StrategyParams,
    instruments: Vec<Instrument>,
    model: Box<dyn SignalModel>,
    latest: Vec<Option<Bar>>,
    last_aligned: Option<NaiveDate>,
    position: Position,
    trades: Vec<TradeRecord>,
    allocations: Vec<f64>,
    daily_pnl: Vec<f64>,
    pct_pnl_change: Vec<f64>,
}

impl StrategyEngine {
    pub fn new(family: StrategyFamily, params: StrategyParams, instruments: Vec<Instrument>) -> Result<Self, StrategyError> {
        let model = build_model(family, &params, &instruments)?;
        let symbols: Vec<String> = instruments.iter().map(|i| i.symbol.clone()).collect();
        Ok(Self {
            id: StrategyId::new(family.name(), &symbols),
            family,
            params,
            latest: vec![None; instruments.len()],
            instruments,
            model,
            last_aligned: None,
            position: Position::default(),
            trades: Vec::new(),
            allocations: Vec::new(),
            daily_pnl: Vec::new(),
            pct_pnl_change: Vec::new(),
        })
    }

    pub fn id(&self) -> &StrategyId {
        &self.id
    }

    pub fn family(&self) -> StrategyFamily {
        self.family
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn subscribes(&self, symbol: &str) -> bool {
        self.instruments.iter().any(|i| i.symbol == symbol)
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Risk budget in force at each record.
    pub fn allocations(&self) -> &[f64] {
        &self.allocations
    }

    /// Day-over-day PnL deltas (one fewer than records).
    pub fn daily_pnl(&self) -> &[f64] {
        &self.daily_pnl
    }

    /// Percent PnL change per record, where the previous PnL was non-zero.
    pub fn pct_pnl_change(&self) -> &[f64] {
        &self.pct_pnl_change
    }

    pub fn cumulative_pnl(&self) -> f64 {
        self.trades.last().map_or(0.0, |t| t.pnl)
    }

    pub fn metrics(&self) -> StrategyMetrics {
        let trades = self.trades.iter().filter(|t| t.side.is_trade()).count();
        StrategyMetrics::new(self.trades.len(), trades, self.cumulative_pnl(), &self.daily_pnl)
    }

    /// BLAKE3 digest of the trade and allocation logs.
    pub fn log_digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.id.as_str().as_bytes());
        for record in &self.trades {
            hasher.update(&serde_json::to_vec(record).expect("TradeRecord serialization failed"));
        }
        for alloc in &self.allocations {
            hasher.update(&alloc.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Feed one bar with the strategy's current risk budget.
    pub fn on_bar(&mut self, bar: &Bar, risk_dollars: f64) -> UpdateOutcome {
        let Some(leg) = self.instruments.iter().position(|i| i.symbol == bar.symbol) else {
            return UpdateOutcome::Ignored;
        };
        if !bar.is_sane() {
            debug!(strategy = %self.id, date = %bar.date, "malformed bar skipped");
            return UpdateOutcome::Malformed;
        }
        self.latest[leg] = Some(bar.clone());

        // Every leg must sit on the same, not yet processed, date.
        let aligned: Vec<&Bar> = self.latest.iter().flatten().collect();
        if aligned.len() != self.latest.len()
            || aligned.iter().any(|b| b.date != bar.date)
            || self.last_aligned == Some(bar.date)
        {
            return UpdateOutcome::Unaligned;
        }

        let observation = match self.model.observe(&aligned) {
            Observe::WarmingUp => {
                self.last_aligned = Some(bar.date);
                return UpdateOutcome::WarmingUp;
            }
            Observe::Skipped(reason) => {
                self.last_aligned = Some(bar.date);
                debug!(strategy = %self.id, date = %bar.date, reason, "update skipped");
                return UpdateOutcome::Skipped;
            }
            Observe::Ready(obs) => obs,
        };
        self.last_aligned = Some(bar.date);

        let side = self.transition(&observation, risk_dollars);
        self.allocations.push(risk_dollars);
        self.record_pnl_delta();
        UpdateOutcome::Recorded(side)
    }

    fn transition(&mut self, obs: &Observation, risk_dollars: f64) -> Side {
        let leg_closes: Vec<f64> = obs.legs.iter().map(|q| q.close).collect();
        let pos = &mut self.position;
        let mut side = Side::None;
        let mut size = 0;
        let mut price = obs.price.close;

        if pos.is_flat() {
            if obs.entry_allowed && obs.deviation.abs() > obs.net_change {
                match trade_size(risk_dollars, obs.tick_value, obs.loss_ticks) {
                    Some(units) => {
                        let sign = self.model.direction().entry_sign(obs.deviation);
                        pos.open(sign * units, obs.price.close, &obs.legs);
                        side = if sign > 0 { Side::Buy } else { Side::Sell };
                        size = units;
                    }
                    None => debug!(strategy = %self.id, date = %obs.date, "zero stop distance, entry skipped"),
                }
            }
        } else if pos.adverse_excursion(obs.price.high, obs.price.low) > obs.loss_ticks {
            let held = pos.size;
            price = if held > 0 { pos.vwap - obs.loss_ticks } else { pos.vwap + obs.loss_ticks };
            pos.realized_pnl -= held.unsigned_abs() as f64 * obs.loss_ticks * obs.tick_value;
            pos.flatten();
            side = if held > 0 { Side::Sell } else { Side::Buy };
            size = held.abs();
        } else if obs.deviation.abs() < CONVERGENCE_FRACTION * obs.net_change {
            let held = pos.size;
            pos.realized_pnl += pos.unrealized_pnl(obs.price.close, obs.tick_value, &leg_closes);
            pos.flatten();
            side = if held > 0 { Side::Sell } else { Side::Buy };
            size = held.abs();
        }

        let pnl = pos.realized_pnl + pos.unrealized_pnl(obs.price.close, obs.tick_value, &leg_closes);
        if side.is_trade() {
            trace!(strategy = %self.id, date = %obs.date, ?side, size, price, pnl, "trade");
        }
        self.trades.push(TradeRecord {
            date: obs.date,
            side,
            size,
            price,
            position: pos.size,
            pnl,
            volatility: obs.volatility,
            moving_average: obs.moving_average,
            deviation: obs.deviation,
            high: obs.price.high,
            low: obs.price.low,
            projected_price: obs.projected_price,
            correlation: obs.correlation,
        });
        side
    }

    fn record_pnl_delta(&mut self) {
        let [.., prev, last] = self.trades.as_slice() else { return };
        let delta = last.pnl - prev.pnl;
        self.daily_pnl.push(delta);
        if prev.pnl != 0.0 {
            self.pct_pnl_change.push(100.0 * delta / prev.pnl.abs());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn day(d: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2014, 1, 1).unwrap() + chrono::Duration::days(d)
    }

    fn bar(symbol: &str, d: i64, close: f64, half_range: f64) -> Bar {
        Bar::new(symbol, day(d), close, close + half_range, close - half_range, close)
    }

    fn engine(family: StrategyFamily, lookback: usize) -> StrategyEngine {
        let params = StrategyParams { ma_lookback_days: lookback, ..StrategyParams::for_family(family) };
        StrategyEngine::new(family, params, vec![Instrument::new("ES", 0.25, 12.5)]).unwrap()
    }

    fn warm(engine: &mut StrategyEngine, lookback: i64) {
        for d in 0..=lookback {
            engine.on_bar(&bar("ES", d, 100.0, 1.0), 1000.0);
        }
    }

    #[test]
    fn trade_size_formula() {
        assert_eq!(trade_size(1000.0, 12.5, 2.0), Some(41));
        assert_eq!(trade_size(10.0, 12.5, 2.0), Some(1));
        assert_eq!(trade_size(1000.0, 12.5, 0.0), None);
        assert_eq!(trade_size(1000.0, 12.5, f64::NAN), None);
    }

    #[test]
    fn trend_enters_with_deviation() {
        let mut e = engine(StrategyFamily::TrendFollowing, 4);
        warm(&mut e, 4);
        assert_eq!(e.trades().len(), 1);
        assert_eq!(e.trades()[0].side, Side::None);

        let outcome = e.on_bar(&bar("ES", 5, 110.0, 1.0), 1000.0);
        assert_eq!(outcome, UpdateOutcome::Recorded(Side::Buy));
        assert!(e.position().is_long());
        // vol = 2, loss_ticks = 0.2 → floor(1000 / 12.5 / 0.2) + 1 = 401
        assert_eq!(e.position().size, 401);
    }

    #[test]
    fn mean_reversion_enters_against_deviation() {
        let mut e = engine(StrategyFamily::MeanReversion, 4);
        warm(&mut e, 4);
        assert_eq!(e.on_bar(&bar("ES", 5, 110.0, 1.0), 1000.0), UpdateOutcome::Recorded(Side::Sell));
        assert!(e.position().is_short());
    }

    #[test]
    fn stop_loss_debits_loss_ticks() {
        let mut e = engine(StrategyFamily::TrendFollowing, 4);
        warm(&mut e, 4);
        e.on_bar(&bar("ES", 5, 110.0, 1.0), 1000.0);
        let size = e.position().size;
        let entry = e.position().vwap;

        // Next bar trades well below entry.
        let outcome = e.on_bar(&bar("ES", 6, 105.0, 1.0), 1000.0);
        assert_eq!(outcome, UpdateOutcome::Recorded(Side::Sell));
        assert!(e.position().is_flat());
        let last = e.trades().last().unwrap();
        let loss_ticks = 0.1 * 2.0;
        assert_approx(last.price, entry - loss_ticks, DEFAULT_EPSILON);
        assert_approx(last.pnl, -(size as f64) * loss_ticks * 12.5, 1e-9);
    }

    #[test]
    fn convergence_exit_credits_gain() {
        let params = StrategyParams {
            ma_lookback_days: 4,
            loss_ticks_multiple: 10.0,
            net_change_multiple: 2.0,
            min_correlation: 0.0,
        };
        let mut e = StrategyEngine::new(StrategyFamily::MeanReversion, params, vec![Instrument::new("ES", 0.25, 12.5)]).unwrap();
        warm(&mut e, 4);
        // Drop: deviation −8 vs net_change 4 → long (against deviation).
        assert_eq!(e.on_bar(&bar("ES", 5, 90.0, 1.0), 1000.0), UpdateOutcome::Recorded(Side::Buy));
        let size = e.position().size;
        // Partial recovery without hitting the 20-tick stop; still far from MA.
        assert_eq!(e.on_bar(&bar("ES", 6, 93.0, 1.0), 1000.0), UpdateOutcome::Recorded(Side::None));
        let open_pnl = e.trades().last().unwrap().pnl;
        assert_approx(open_pnl, size as f64 * 3.0 * 12.5, 1e-9);
        // Back on the average: converge.
        let mut outcome = UpdateOutcome::Ignored;
        for d in 7..12 {
            outcome = e.on_bar(&bar("ES", d, 94.0, 1.0), 1000.0);
            if outcome == UpdateOutcome::Recorded(Side::Sell) {
                break;
            }
        }
        assert_eq!(outcome, UpdateOutcome::Recorded(Side::Sell));
        assert!(e.position().is_flat());
        assert_approx(e.cumulative_pnl(), size as f64 * 4.0 * 12.5, 1e-9);
    }

    #[test]
    fn records_are_dense_and_deltas_follow() {
        let mut e = engine(StrategyFamily::TrendFollowing, 3);
        let mut recorded = 0;
        for d in 0..30 {
            let close = 100.0 + (d as f64 * 0.7).sin() * 5.0;
            if let UpdateOutcome::Recorded(_) = e.on_bar(&bar("ES", d, close, 1.5), 1000.0) {
                recorded += 1;
            }
        }
        assert_eq!(recorded, 30 - 3);
        assert_eq!(e.trades().len(), recorded);
        assert_eq!(e.allocations().len(), recorded);
        assert_eq!(e.daily_pnl().len(), recorded - 1);
    }

    #[test]
    fn malformed_and_foreign_bars_leave_state_alone() {
        let mut e = engine(StrategyFamily::TrendFollowing, 3);
        warm(&mut e, 3);
        let before = e.trades().len();
        assert_eq!(e.on_bar(&bar("NQ", 10, 100.0, 1.0), 1000.0), UpdateOutcome::Ignored);
        let mut broken = bar("ES", 10, 100.0, 1.0);
        broken.close = f64::NAN;
        assert_eq!(e.on_bar(&broken, 1000.0), UpdateOutcome::Malformed);
        assert_eq!(e.trades().len(), before);
    }

    #[test]
    fn two_leg_strategies_wait_for_alignment() {
        let family = StrategyFamily::Pairs;
        let params = StrategyParams { ma_lookback_days: 2, ..StrategyParams::for_family(family) };
        let mut e = StrategyEngine::new(
            family,
            params,
            vec![Instrument::new("CL", 0.01, 10.0), Instrument::new("HO", 0.01, 4.2)],
        )
        .unwrap();
        assert_eq!(e.id().as_str(), "pairs:CL/HO");
        assert_eq!(e.on_bar(&bar("CL", 0, 100.0, 1.0), 1000.0), UpdateOutcome::Unaligned);
        assert_eq!(e.on_bar(&bar("HO", 0, 30.0, 1.0), 1000.0), UpdateOutcome::WarmingUp);
        assert_eq!(e.on_bar(&bar("CL", 1, 100.0, 1.0), 1000.0), UpdateOutcome::Unaligned);
        // Same-date duplicate is not processed twice.
        assert_eq!(e.on_bar(&bar("HO", 0, 30.0, 1.0), 1000.0), UpdateOutcome::Unaligned);
        assert_eq!(e.on_bar(&bar("HO", 1, 30.0, 1.0), 1000.0), UpdateOutcome::WarmingUp);
        assert_eq!(e.on_bar(&bar("HO", 2, 30.0, 1.0), 1000.0), UpdateOutcome::Unaligned);
        assert!(matches!(e.on_bar(&bar("CL", 2, 100.0, 1.0), 1000.0), UpdateOutcome::Recorded(_)));
    }

    #[test]
    fn digest_is_reproducible() {
        let run = || {
            let mut e = engine(StrategyFamily::MeanReversion, 5);
            for d in 0..60 {
                let close = 100.0 + (d as f64 * 0.3).cos() * 8.0;
                e.on_bar(&bar("ES", d, close, 1.0), 1000.0);
            }
            e.log_digest()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn digest_tracks_every_record() {
        let entered = |risk: f64| {
            let mut e = engine(StrategyFamily::TrendFollowing, 4);
            warm(&mut e, 4);
            e.on_bar(&bar("ES", 5, 110.0, 1.0), risk);
            e
        };
        let small = entered(1000.0);
        let large = entered(2000.0);
        assert_ne!(small.trades().last().unwrap().size, large.trades().last().unwrap().size);
        assert_ne!(small.log_digest(), large.log_digest());
        assert_eq!(small.log_digest(), entered(1000.0).log_digest());
    }
}
