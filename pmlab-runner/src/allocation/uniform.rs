//! Baseline policy: equal capital for everyone, every period.

use super::{AllocationError, AllocationMap, AllocationPolicy, PerformanceSnapshot};
use crate::config::AllocationStyle;

#[derive(Debug, Clone, Copy, Default)]
pub struct UniformPolicy;

impl AllocationPolicy for UniformPolicy {
    fn style(&self) -> AllocationStyle {
        AllocationStyle::Uniform
    }

    fn recalibrate(&mut self, snapshot: &PerformanceSnapshot<'_>) -> Result<AllocationMap, AllocationError> {
        let count = snapshot.current.len();
        if count == 0 {
            return Ok(AllocationMap::new());
        }
        let share = snapshot.limits.total_allocation / count as f64;
        Ok(snapshot.current.keys().map(|id| (id.clone(), share)).collect())
    }
}
