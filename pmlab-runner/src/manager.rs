//! Portfolio manager: dispatches replay events to its strategies and
//! periodically hands the risk budget to its allocation policy.

use crate::allocation::{AllocationMap, AllocationPolicy, PerformanceSnapshot};
use crate::config::{AllocationStyle, PortfolioLimits};
use crate::summary::PortfolioSummary;
use chrono::NaiveDate;
use pmlab_core::data::days_between;
use pmlab_core::domain::StrategyId;
use pmlab_core::engine::{ReplayEvent, ReplayScheduler, StrategyEngine};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Events between progress lines.
const PROGRESS_INTERVAL: usize = 1_000;

#[derive(Debug, Error)]
pub enum ManagerError {
    /// Fatal: the allocation sum left the tolerance band after rescaling.
    #[error("{manager} under/over allocation: total {total:.2}, target {target:.2}")]
    ConservationBreach { manager: String, total: f64, target: f64 },

    #[error("strategy {0} registered twice")]
    DuplicateStrategy(StrategyId),
}

pub struct PortfolioManager {
    style: AllocationStyle,
    limits: PortfolioLimits,
    policy: Box<dyn AllocationPolicy>,
    strategies: BTreeMap<StrategyId, StrategyEngine>,
    allocations: AllocationMap,
    last_recal_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
    events: usize,
    recalibrations: usize,
    skipped_recalibrations: usize,
}

impl std::fmt::Debug for PortfolioManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioManager")
            .field("style", &self.style)
            .field("strategies", &self.strategies.len())
            .field("events", &self.events)
            .field("recalibrations", &self.recalibrations)
            .finish()
    }
}

impl PortfolioManager {
    pub fn new(limits: PortfolioLimits, policy: Box<dyn AllocationPolicy>) -> Self {
        Self {
            style: policy.style(),
            limits,
            policy,
            strategies: BTreeMap::new(),
            allocations: AllocationMap::new(),
            last_recal_date: None,
            last_date: None,
            events: 0,
            recalibrations: 0,
            skipped_recalibrations: 0,
        }
    }

    /// Register a strategy with the starting allocation.
    pub fn add_strategy(&mut self, engine: StrategyEngine) -> Result<(), ManagerError> {
        let id = engine.id().clone();
        if self.strategies.contains_key(&id) {
            return Err(ManagerError::DuplicateStrategy(id));
        }
        self.allocations.insert(id.clone(), self.limits.first_allocation);
        self.strategies.insert(id, engine);
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        self.style.name()
    }

    pub fn style(&self) -> AllocationStyle {
        self.style
    }

    pub fn limits(&self) -> &PortfolioLimits {
        &self.limits
    }

    pub fn allocations(&self) -> &AllocationMap {
        &self.allocations
    }

    pub fn strategies(&self) -> impl Iterator<Item = &StrategyEngine> {
        self.strategies.values()
    }

    pub fn strategy(&self, id: &StrategyId) -> Option<&StrategyEngine> {
        self.strategies.get(id)
    }

    /// Symbols any registered strategy trades, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> =
            self.strategies.values().flat_map(|s| s.instruments().iter().map(|i| i.symbol.clone())).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    pub fn events(&self) -> usize {
        self.events
    }

    pub fn recalibrations(&self) -> usize {
        self.recalibrations
    }

    pub fn skipped_recalibrations(&self) -> usize {
        self.skipped_recalibrations
    }

    pub fn last_recal_date(&self) -> Option<NaiveDate> {
        self.last_recal_date
    }

    /// Date of the most recent event.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    /// Drain a scheduler through this manager.
    pub fn run(&mut self, scheduler: ReplayScheduler<'_>) -> Result<(), ManagerError> {
        for event in scheduler {
            self.on_event(&event)?;
        }
        debug!(manager = self.name(), events = self.events, "replay exhausted");
        Ok(())
    }

    /// Dispatch one event to subscribed strategies, then recalibrate if a
    /// full period has elapsed since the last recalibration.
    pub fn on_event(&mut self, event: &ReplayEvent<'_>) -> Result<(), ManagerError> {
        let date = event.date();
        self.last_date = Some(date);
        self.events += 1;
        if self.events % PROGRESS_INTERVAL == 0 {
            debug!(manager = self.name(), events = self.events, %date, "progress");
        }

        for (id, engine) in self.strategies.iter_mut() {
            if engine.subscribes(event.symbol) {
                let risk = self.allocations.get(id).copied().unwrap_or(0.0);
                engine.on_bar(event.bar, risk);
            }
        }

        let Some(last_recal) = self.last_recal_date else {
            self.last_recal_date = Some(date);
            return Ok(());
        };
        if days_between(last_recal, date, self.limits.weekend_adjustment_days) >= self.limits.recalibration_period_days {
            self.recalibrate(date)?;
            self.last_recal_date = Some(date);
        }
        Ok(())
    }

    /// Run the policy, rescale to the total budget, and check conservation.
    pub fn recalibrate(&mut self, date: NaiveDate) -> Result<(), ManagerError> {
        let snapshot = PerformanceSnapshot::new(date, &self.limits, &self.allocations, &self.strategies);
        let outcome = self.policy.recalibrate(&snapshot);
        match outcome {
            Ok(update) => {
                for (id, allocation) in update {
                    if let Some(slot) = self.allocations.get_mut(&id) {
                        *slot = allocation;
                    }
                }
            }
            Err(e) => {
                self.skipped_recalibrations += 1;
                debug!(manager = self.name(), %date, error = %e, "rebalancing skipped, allocations kept");
            }
        }
        self.recalibrations += 1;
        self.enforce_conservation()?;
        info!(
            manager = self.name(),
            %date,
            total = self.allocations.values().sum::<f64>(),
            "recalibrated"
        );
        Ok(())
    }

    /// Rescales every allocation by the same factor so the sum is the total.
    /// Strategies the policy left untouched, ineligible ones included, scale too.
    fn enforce_conservation(&mut self) -> Result<(), ManagerError> {
        let target = self.limits.total_allocation;
        let total: f64 = self.allocations.values().sum();
        if total.is_finite() && total > 0.0 {
            for allocation in self.allocations.values_mut() {
                *allocation = *allocation * target / total;
            }
        }

        let total: f64 = self.allocations.values().sum();
        let tolerance = self.limits.conservation_tolerance;
        if !(total > target * (1.0 - tolerance) && total < target * (1.0 + tolerance)) {
            return Err(ManagerError::ConservationBreach { manager: self.name().to_string(), total, target });
        }
        Ok(())
    }

    pub fn summary(&self) -> PortfolioSummary {
        PortfolioSummary::build(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{AllocationError, UniformPolicy};
    use pmlab_core::data::generate_synthetic_bars;
    use pmlab_core::domain::{Bar, ContractTable, InstrumentLookup};
    use pmlab_core::signals::{StrategyFamily, StrategyParams};

    fn engine(family: StrategyFamily, legs: &[&str]) -> StrategyEngine {
        let table = ContractTable::futures();
        let instruments = legs.iter().map(|s| table.lookup(s).unwrap()).collect();
        StrategyEngine::new(family, StrategyParams::for_family(family), instruments).unwrap()
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 1, 5).unwrap()
    }

    /// A policy that hands out whatever it was told to.
    struct Fixed(AllocationMap);

    impl AllocationPolicy for Fixed {
        fn style(&self) -> AllocationStyle {
            AllocationStyle::Momentum
        }

        fn recalibrate(&mut self, _: &PerformanceSnapshot<'_>) -> Result<AllocationMap, AllocationError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl AllocationPolicy for Failing {
        fn style(&self) -> AllocationStyle {
            AllocationStyle::MeanVariance
        }

        fn recalibrate(&mut self, _: &PerformanceSnapshot<'_>) -> Result<AllocationMap, AllocationError> {
            Err(AllocationError::InsufficientHistory("test".into()))
        }
    }

    #[test]
    fn rejects_duplicate_strategy() {
        let mut pm = PortfolioManager::new(PortfolioLimits::default(), Box::new(UniformPolicy));
        pm.add_strategy(engine(StrategyFamily::TrendFollowing, &["ES"])).unwrap();
        let err = pm.add_strategy(engine(StrategyFamily::TrendFollowing, &["ES"])).unwrap_err();
        assert!(matches!(err, ManagerError::DuplicateStrategy(_)));
        assert_eq!(pm.allocations().len(), 1);
    }

    #[test]
    fn first_event_sets_recal_date_and_period_triggers() {
        let mut pm = PortfolioManager::new(PortfolioLimits::default(), Box::new(UniformPolicy));
        pm.add_strategy(engine(StrategyFamily::TrendFollowing, &["ES"])).unwrap();
        pm.add_strategy(engine(StrategyFamily::MeanReversion, &["ES"])).unwrap();
        let bar = |offset: i64| Bar::new("ES", start() + chrono::Duration::days(offset), 100.0, 101.0, 99.0, 100.0);

        let b0 = bar(0);
        pm.on_event(&ReplayEvent { symbol: "ES", bar: &b0 }).unwrap();
        assert_eq!(pm.last_recal_date(), Some(start()));

        // 35 calendar days minus the 8-day adjustment is 27: not yet.
        let b1 = bar(35);
        pm.on_event(&ReplayEvent { symbol: "ES", bar: &b1 }).unwrap();
        assert_eq!(pm.recalibrations(), 0);

        let b2 = bar(36);
        pm.on_event(&ReplayEvent { symbol: "ES", bar: &b2 }).unwrap();
        assert_eq!(pm.recalibrations(), 1);
        assert_eq!(pm.last_recal_date(), Some(b2.date));
        assert!(pm.allocations().values().all(|v| (*v - 210_000.0).abs() < 1e-9));
    }

    #[test]
    fn rescales_policy_output_to_total() {
        let a = engine(StrategyFamily::TrendFollowing, &["ES"]);
        let b = engine(StrategyFamily::TrendFollowing, &["NQ"]);
        let wanted: AllocationMap = [(a.id().clone(), 30_000.0), (b.id().clone(), 10_000.0)].into_iter().collect();
        let mut pm = PortfolioManager::new(PortfolioLimits::default(), Box::new(Fixed(wanted)));
        let (ida, idb) = (a.id().clone(), b.id().clone());
        pm.add_strategy(a).unwrap();
        pm.add_strategy(b).unwrap();
        pm.recalibrate(start()).unwrap();
        assert!((pm.allocations()[&ida] - 315_000.0).abs() < 1e-6);
        assert!((pm.allocations()[&idb] - 105_000.0).abs() < 1e-6);
    }

    #[test]
    fn zero_total_is_a_fatal_breach() {
        let a = engine(StrategyFamily::TrendFollowing, &["ES"]);
        let wanted: AllocationMap = [(a.id().clone(), 0.0)].into_iter().collect();
        let mut pm = PortfolioManager::new(PortfolioLimits::default(), Box::new(Fixed(wanted)));
        pm.add_strategy(a).unwrap();
        match pm.recalibrate(start()) {
            Err(ManagerError::ConservationBreach { manager, total, target }) => {
                assert_eq!(manager, "momentum");
                assert_eq!(total, 0.0);
                assert_eq!(target, 420_000.0);
            }
            other => panic!("expected breach, got {other:?}"),
        }
    }

    #[test]
    fn failed_policy_keeps_allocations() {
        let mut pm = PortfolioManager::new(PortfolioLimits::default(), Box::new(Failing));
        for s in ["ES", "NQ", "CL"] {
            pm.add_strategy(engine(StrategyFamily::MeanReversion, &[s])).unwrap();
        }
        pm.recalibrate(start()).unwrap();
        assert_eq!(pm.skipped_recalibrations(), 1);
        // 3 × 10k rescaled to the total, evenly.
        assert!(pm.allocations().values().all(|v| (*v - 140_000.0).abs() < 1e-9));
    }

    #[test]
    fn run_dispatches_only_subscribed_symbols() {
        let es = generate_synthetic_bars("ES", start(), 120);
        let cl = generate_synthetic_bars("CL", start(), 120);
        let mut pm = PortfolioManager::new(PortfolioLimits::default(), Box::new(UniformPolicy));
        pm.add_strategy(engine(StrategyFamily::TrendFollowing, &["ES"])).unwrap();
        let scheduler = ReplayScheduler::from_series([("CL", cl.as_slice()), ("ES", es.as_slice())]);
        pm.run(scheduler).unwrap();

        assert_eq!(pm.events(), 240);
        let strategy = pm.strategies().next().unwrap();
        // The 41st ES bar completes warm-up; every bar from there writes a record.
        assert_eq!(strategy.trades().len(), 120 - 40);
        assert!(pm.recalibrations() > 0);
        assert_eq!(pm.symbols(), vec!["ES".to_string()]);
    }
}
