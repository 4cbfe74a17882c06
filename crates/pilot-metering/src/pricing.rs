//! Per-unit prices, loaded from the environment the same way the rest of
//! the orchestrator's `*_from_env()` configs do.

use anyhow::Context;

#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub per_task_usd: f64,
    pub per_compute_minute_usd: f64,
    pub per_token_input_usd: f64,
    pub per_token_output_usd: f64,
}

impl Pricing {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            per_task_usd: env_f64("PILOT_PRICE_PER_TASK_USD", 0.05)?,
            per_compute_minute_usd: env_f64("PILOT_PRICE_PER_COMPUTE_MINUTE_USD", 0.02)?,
            per_token_input_usd: env_f64("PILOT_PRICE_PER_TOKEN_INPUT_USD", 0.000003)?,
            per_token_output_usd: env_f64("PILOT_PRICE_PER_TOKEN_OUTPUT_USD", 0.000015)?,
        })
    }

    pub fn cost_usd(&self, summary: &pilot_store::UsageSummary) -> f64 {
        summary.task_count * self.per_task_usd
            + (summary.compute_seconds / 60.0) * self.per_compute_minute_usd
            + summary.tokens_input * self.per_token_input_usd
            + summary.tokens_output * self.per_token_output_usd
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            per_task_usd: 0.05,
            per_compute_minute_usd: 0.02,
            per_token_input_usd: 0.000003,
            per_token_output_usd: 0.000015,
        }
    }
}

fn env_f64(key: &str, default: f64) -> anyhow::Result<f64> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_store::UsageSummary;

    #[test]
    fn cost_usd_combines_all_four_rates() {
        let pricing = Pricing {
            per_task_usd: 1.0,
            per_compute_minute_usd: 2.0,
            per_token_input_usd: 0.1,
            per_token_output_usd: 0.2,
        };
        let summary = UsageSummary {
            task_count: 3.0,
            compute_seconds: 120.0,
            tokens_input: 10.0,
            tokens_output: 5.0,
        };
        // 3*1.0 + 2*2.0 + 10*0.1 + 5*0.2 = 3 + 4 + 1 + 1 = 9
        assert_eq!(pricing.cost_usd(&summary), 9.0);
    }
}
