//! Relative value: instrument A traded on a projection from instrument B.
//!
//! Both legs keep a series of deviations from their own moving averages.
//! B's deviation is projected onto A through a regression-style slope
//! (`var(A) / cov(A, B)`) and dampened by |correlation|. The signal is how
//! far A's actual deviation lags that projection; its entry threshold scales
//! with the mean absolute size of past signals, while the stop scales with
//! A's own range volatility.

use super::{Observation, Observe, SignalModel, StrategyFamily, StrategyParams};
use crate::domain::{Bar, Instrument};
use crate::indicators::{average_range, correlation, covariance, mean_abs, moving_average, LookbackWindow, PriceSample};

#[derive(Debug, Clone)]
pub struct RelativeValueModel {
    traded: Instrument,
    params: StrategyParams,
    prices: [LookbackWindow<PriceSample>; 2],
    deviations: [LookbackWindow<f64>; 2],
    projection_errors: LookbackWindow<f64>,
}

impl RelativeValueModel {
    /// Only the traded leg's contract matters; the driver contributes prices.
    pub fn new(traded: Instrument, params: StrategyParams) -> Self {
        let depth = params.ma_lookback_days;
        Self {
            traded,
            params,
            prices: [LookbackWindow::new(depth), LookbackWindow::new(depth)],
            deviations: [LookbackWindow::new(depth), LookbackWindow::new(depth)],
            projection_errors: LookbackWindow::new(depth),
        }
    }

    fn trim_deviations(&mut self) {
        self.deviations.iter_mut().for_each(LookbackWindow::trim);
        self.projection_errors.trim();
    }
}

impl SignalModel for RelativeValueModel {
    fn family(&self) -> StrategyFamily {
        StrategyFamily::RelativeValue
    }

    fn observe(&mut self, bars: &[&Bar]) -> Observe {
        let [a, b] = bars else {
            return Observe::Skipped("relative value needs two legs");
        };
        let sample_a = PriceSample::from(*a);
        self.prices[0].push(sample_a);
        self.prices[1].push(PriceSample::from(*b));
        if !self.prices[0].is_warm() {
            return Observe::WarmingUp;
        }

        let ma_a = moving_average(self.prices[0].as_slice());
        let vol_a = average_range(self.prices[0].as_slice());
        let ma_b = moving_average(self.prices[1].as_slice());
        self.prices.iter_mut().for_each(LookbackWindow::trim);
        let (Some(ma_a), Some(vol_a), Some(ma_b)) = (ma_a, vol_a, ma_b) else {
            return Observe::Skipped("empty window");
        };

        let dev_a = a.close - ma_a;
        let dev_b = b.close - ma_b;
        self.deviations[0].push(dev_a);
        self.deviations[1].push(dev_b);
        if self.deviations[0].len() < 2 {
            return Observe::WarmingUp;
        }

        let devs_a = self.deviations[0].as_slice();
        let devs_b = self.deviations[1].as_slice();
        let corr = correlation(devs_a, devs_b);
        let slope = covariance(devs_a, devs_a).zip(covariance(devs_a, devs_b)).map(|(var_a, cov_ab)| var_a / cov_ab);
        let (Some(corr), Some(slope)) = (corr, slope.filter(|s| s.is_finite())) else {
            self.trim_deviations();
            return Observe::Skipped("non-finite correlation or slope");
        };

        let projected_dev = dev_b * slope;
        let deviation = projected_dev * corr.abs() - dev_a;
        if !deviation.is_finite() {
            self.trim_deviations();
            return Observe::Skipped("non-finite projection");
        }
        self.projection_errors.push(deviation);
        let signal_vol = mean_abs(self.projection_errors.as_slice()).unwrap_or(0.0);

        if !self.deviations[0].is_warm() {
            return Observe::WarmingUp;
        }
        self.trim_deviations();

        Observe::Ready(Observation {
            date: a.date,
            price: sample_a,
            deviation,
            net_change: self.params.net_change_multiple * signal_vol,
            loss_ticks: self.params.loss_ticks_multiple * vol_a,
            tick_value: self.traded.tick_value,
            moving_average: ma_a,
            volatility: signal_vol,
            projected_price: Some(ma_a + projected_dev),
            correlation: Some(corr),
            entry_allowed: corr >= self.params.min_correlation,
            legs: Vec::new(),
        })
    }
}
