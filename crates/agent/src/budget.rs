//! Human-in-loop budget guard.
//!
//! Counts steps and spend since the last human confirmation and decides,
//! before each step, whether the run must pause.

use stepwise_config::HumanInLoopConfig;
use stepwise_core::signal::SuspendReason;

#[derive(Debug, Clone)]
pub struct BudgetGuard {
    config: HumanInLoopConfig,
    iterations: u32,
    baseline: f64,
}

impl BudgetGuard {
    /// `starting_cost` is the run's cost when the loop starts; spend is
    /// measured from there.
    pub fn new(config: HumanInLoopConfig, starting_cost: f64) -> Self {
        Self {
            config: config.normalized(),
            iterations: 0,
            baseline: starting_cost,
        }
    }

    /// Called once before every step with the run's current total cost.
    pub fn check(&mut self, total_cost: f64) -> Option<SuspendReason> {
        let threshold = self.config.iteration_threshold;
        let ceiling = self.config.cost_ceiling;
        let spent = total_cost - self.baseline;

        let reason = if threshold > 0 && self.iterations >= threshold {
            let iterations = std::mem::take(&mut self.iterations);
            Some(SuspendReason::IterationThreshold {
                iterations,
                threshold,
            })
        } else if ceiling > 0.0 && spent > ceiling {
            self.baseline = total_cost;
            Some(SuspendReason::CostCeiling {
                spent,
                ceiling,
                total: total_cost,
            })
        } else {
            None
        };

        self.iterations += 1;
        reason
    }

    pub fn config(&self) -> HumanInLoopConfig {
        self.config
    }
}
