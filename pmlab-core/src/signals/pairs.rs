//! Pairs: mean reversion on a synthetic spread of two legs.
//!
//! The hedge ratio equalizes the legs' dollar volatility (range volatility
//! × tick value). The spread always weights the calmer leg more heavily:
//! `A − B·ratio` when A is the more volatile leg, `A·ratio − B` otherwise.
//! The spread keeps its own window, moving average and volatility.

use super::{Observation, Observe, SignalModel, StrategyFamily, StrategyParams};
use crate::domain::{Bar, Instrument, LegQuote};
use crate::indicators::{average_range, moving_average, LookbackWindow, PriceSample};
use serde::{Deserialize, Serialize};

/// Dollar-volatility hedge ratio between two legs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HedgeRatio {
    /// Always ≥ 1.
    pub ratio: f64,
    /// True when leg B is the more volatile leg and the ratio was flipped.
    pub is_inverted: bool,
}

impl HedgeRatio {
    /// `None` when either dollar volatility is zero or non-finite.
    pub fn from_dollar_volatility(dollar_vol_a: f64, dollar_vol_b: f64) -> Option<Self> {
        let ratio = dollar_vol_a / dollar_vol_b;
        if !ratio.is_finite() || ratio <= 0.0 {
            return None;
        }
        if ratio < 1.0 {
            Some(Self { ratio: 1.0 / ratio, is_inverted: true })
        } else {
            Some(Self { ratio, is_inverted: false })
        }
    }

    pub fn spread(&self, price_a: f64, price_b: f64) -> f64 {
        if self.is_inverted {
            price_a * self.ratio - price_b
        } else {
            price_a - price_b * self.ratio
        }
    }

    /// Units of (A, B) per unit of spread.
    pub fn leg_weights(&self) -> (f64, f64) {
        if self.is_inverted {
            (self.ratio, 1.0)
        } else {
            (1.0, self.ratio)
        }
    }

    /// Tick value used to size spread trades: the smaller ratio-adjusted leg value.
    pub fn spread_tick_value(&self, tick_value_a: f64, tick_value_b: f64) -> f64 {
        let (wa, wb) = self.leg_weights();
        (tick_value_a * wa).min(tick_value_b * wb)
    }
}

#[derive(Debug, Clone)]
pub struct PairsModel {
    legs: [Instrument; 2],
    params: StrategyParams,
    prices: [LookbackWindow<PriceSample>; 2],
    spread: LookbackWindow<PriceSample>,
}

impl PairsModel {
    pub fn new(leg_a: Instrument, leg_b: Instrument, params: StrategyParams) -> Self {
        let depth = params.ma_lookback_days;
        Self {
            legs: [leg_a, leg_b],
            params,
            prices: [LookbackWindow::new(depth), LookbackWindow::new(depth)],
            spread: LookbackWindow::new(depth),
        }
    }
}

impl SignalModel for PairsModel {
    fn family(&self) -> StrategyFamily {
        StrategyFamily::Pairs
    }

    fn observe(&mut self, bars: &[&Bar]) -> Observe {
        let [a, b] = bars else {
            return Observe::Skipped("pairs needs two legs");
        };
        self.prices[0].push(PriceSample::from(*a));
        self.prices[1].push(PriceSample::from(*b));
        if !self.prices[0].is_warm() {
            return Observe::WarmingUp;
        }

        let vol_a = average_range(self.prices[0].as_slice());
        let vol_b = average_range(self.prices[1].as_slice());
        self.prices.iter_mut().for_each(LookbackWindow::trim);
        let (Some(vol_a), Some(vol_b)) = (vol_a, vol_b) else {
            return Observe::Skipped("empty window");
        };

        let [inst_a, inst_b] = &self.legs;
        let Some(hedge) =
            HedgeRatio::from_dollar_volatility(vol_a * inst_a.tick_value, vol_b * inst_b.tick_value)
        else {
            return Observe::Skipped("zero dollar volatility");
        };

        let high = hedge.spread(a.high, b.high);
        let low = hedge.spread(a.low, b.low);
        let sample = PriceSample { high: high.max(low), low: high.min(low), close: hedge.spread(a.close, b.close) };
        self.spread.push(sample);
        let ma = moving_average(self.spread.as_slice());
        let vol = average_range(self.spread.as_slice());
        self.spread.trim();
        let (Some(ma), Some(vol)) = (ma, vol) else {
            return Observe::Skipped("empty spread window");
        };

        let (wa, wb) = hedge.leg_weights();
        Observe::Ready(Observation {
            date: a.date,
            price: sample,
            deviation: sample.close - ma,
            net_change: self.params.net_change_multiple * vol,
            loss_ticks: self.params.loss_ticks_multiple * vol,
            tick_value: hedge.spread_tick_value(inst_a.tick_value, inst_b.tick_value),
            moving_average: ma,
            volatility: vol,
            projected_price: None,
            correlation: None,
            entry_allowed: true,
            legs: vec![
                LegQuote { close: a.close, tick_value: inst_a.tick_value, weight: wa },
                LegQuote { close: b.close, tick_value: inst_b.tick_value, weight: -wb },
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::NaiveDate;

    #[test]
    fn hedge_ratio_orientation() {
        let h = HedgeRatio::from_dollar_volatility(10.0, 4.0).unwrap();
        assert_approx(h.ratio, 2.5, DEFAULT_EPSILON);
        assert!(!h.is_inverted);
        assert_approx(h.spread(100.0, 10.0), 75.0, DEFAULT_EPSILON);

        let h = HedgeRatio::from_dollar_volatility(4.0, 10.0).unwrap();
        assert_approx(h.ratio, 2.5, DEFAULT_EPSILON);
        assert!(h.is_inverted);
        assert_approx(h.spread(100.0, 10.0), 240.0, DEFAULT_EPSILON);
    }

    #[test]
    fn hedge_ratio_rejects_zero_volatility() {
        assert!(HedgeRatio::from_dollar_volatility(0.0, 4.0).is_none());
        assert!(HedgeRatio::from_dollar_volatility(4.0, 0.0).is_none());
    }

    #[test]
    fn spread_tick_value_is_min_of_adjusted_legs() {
        let h = HedgeRatio { ratio: 2.0, is_inverted: false };
        assert_eq!(h.spread_tick_value(12.5, 5.0), 10.0);
        let h = HedgeRatio { ratio: 2.0, is_inverted: true };
        assert_eq!(h.spread_tick_value(12.5, 5.0), 5.0);
        assert_eq!(h.leg_weights(), (2.0, 1.0));
    }

    #[test]
    fn observation_carries_signed_leg_weights() {
        let params = StrategyParams { ma_lookback_days: 2, ..StrategyParams::for_family(StrategyFamily::Pairs) };
        // A: range 2 ticks × $10 = $20; B: range 2 ticks × $4 = $8 → ratio 2.5, not inverted.
        let mut m = PairsModel::new(Instrument::new("CL", 0.01, 10.0), Instrument::new("HO", 0.01, 4.0), params);
        let day = |d: i64| NaiveDate::from_ymd_opt(2014, 1, 1).unwrap() + chrono::Duration::days(d);
        let mut last = Observe::WarmingUp;
        for d in 0..4 {
            let a = Bar::new("CL", day(d), 100.0, 101.0, 99.0, 100.0);
            let b = Bar::new("HO", day(d), 30.0, 31.0, 29.0, 30.0);
            last = m.observe(&[&a, &b]);
        }
        let Observe::Ready(obs) = last else { panic!("expected ready") };
        assert_approx(obs.price.close, 25.0, DEFAULT_EPSILON);
        assert_approx(obs.deviation, 0.0, DEFAULT_EPSILON);
        assert_approx(obs.tick_value, 10.0, DEFAULT_EPSILON);
        assert_eq!(obs.legs[0].weight, 1.0);
        assert_approx(obs.legs[1].weight, -2.5, DEFAULT_EPSILON);
    }
}
