//! Single-instrument deviation from a moving average.
//!
//! Trend following enters with the deviation, mean reversion against it.
//! Both measure `close − MA(close)` and scale thresholds by range volatility.

use super::{Observation, Observe, SignalModel, StrategyFamily, StrategyParams};
use crate::domain::{Bar, Instrument};
use crate::indicators::{average_range, moving_average, LookbackWindow, PriceSample};

#[derive(Debug, Clone)]
pub struct MaDeviationModel {
    family: StrategyFamily,
    instrument: Instrument,
    params: StrategyParams,
    window: LookbackWindow<PriceSample>,
}

impl MaDeviationModel {
    pub fn new(family: StrategyFamily, instrument: Instrument, params: StrategyParams) -> Self {
        let window = LookbackWindow::new(params.ma_lookback_days);
        Self { family, instrument, params, window }
    }
}

impl SignalModel for MaDeviationModel {
    fn family(&self) -> StrategyFamily {
        self.family
    }

    fn observe(&mut self, bars: &[&Bar]) -> Observe {
        let Some(bar) = bars.first() else {
            return Observe::Skipped("no bar");
        };
        let sample = PriceSample::from(*bar);
        self.window.push(sample);
        if !self.window.is_warm() {
            return Observe::WarmingUp;
        }

        let stats = moving_average(self.window.as_slice()).zip(average_range(self.window.as_slice()));
        self.window.trim();
        let Some((ma, vol)) = stats else {
            return Observe::Skipped("empty window");
        };

        Observe::Ready(Observation {
            date: bar.date,
            price: sample,
            deviation: sample.close - ma,
            net_change: self.params.net_change_multiple * vol,
            loss_ticks: self.params.loss_ticks_multiple * vol,
            tick_value: self.instrument.tick_value,
            moving_average: ma,
            volatility: vol,
            projected_price: None,
            correlation: None,
            entry_allowed: true,
            legs: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};
    use chrono::NaiveDate;

    fn bar(day: i64, close: f64) -> Bar {
        let date = NaiveDate::from_ymd_opt(2014, 1, 1).unwrap() + chrono::Duration::days(day);
        Bar::new("ES", date, close, close + 1.0, close - 1.0, close)
    }

    fn model(lookback: usize) -> MaDeviationModel {
        let params = StrategyParams { ma_lookback_days: lookback, ..StrategyParams::for_family(StrategyFamily::TrendFollowing) };
        MaDeviationModel::new(StrategyFamily::TrendFollowing, Instrument::new("ES", 0.25, 12.5), params)
    }

    #[test]
    fn warms_up_on_lookback_plus_one() {
        let mut m = model(3);
        for d in 0..3 {
            assert_eq!(m.observe(&[&bar(d, 100.0)]), Observe::WarmingUp);
        }
        assert!(matches!(m.observe(&[&bar(3, 100.0)]), Observe::Ready(_)));
    }

    #[test]
    fn deviation_and_thresholds() {
        let mut m = model(3);
        for d in 0..3 {
            m.observe(&[&bar(d, 100.0)]);
        }
        let Observe::Ready(obs) = m.observe(&[&bar(3, 104.0)]) else { panic!("expected ready") };
        // MA over 4 closes: (300 + 104) / 4 = 101
        assert_approx(obs.moving_average, 101.0, DEFAULT_EPSILON);
        assert_approx(obs.deviation, 3.0, DEFAULT_EPSILON);
        assert_approx(obs.volatility, 2.0, DEFAULT_EPSILON);
        assert_approx(obs.net_change, 0.5, DEFAULT_EPSILON);
        assert_approx(obs.loss_ticks, 0.2, DEFAULT_EPSILON);
        assert_eq!(obs.tick_value, 12.5);
        assert!(obs.legs.is_empty());
    }

    #[test]
    fn window_rolls_forward() {
        let mut m = model(2);
        for (d, c) in [(0, 10.0), (1, 20.0), (2, 30.0)] {
            m.observe(&[&bar(d, c)]);
        }
        let Observe::Ready(obs) = m.observe(&[&bar(3, 40.0)]) else { panic!("expected ready") };
        // Window held [20, 30] and then took 40.
        assert_approx(obs.moving_average, 30.0, DEFAULT_EPSILON);
    }
}
