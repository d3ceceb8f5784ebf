use serde::Serialize;
use thiserror::Error;

pub const MIN_PATHS: u32 = 100;
pub const MAX_PATHS: u32 = 200_000;
pub const MAX_YEARS: u32 = 70;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub current_age: u32,
    pub retire_age: u32,
    pub current_balance: f64,
    pub annual_contrib: f64,
    pub employer_match_rate: f64,
    pub expected_return: f64,
    pub return_volatility: f64,
    pub inflation: f64,
    pub salary_growth: f64,
    pub n_paths: u32,
    pub seed: Option<u64>,
    pub fees_annual: f64,
    pub glidepath: bool,
    /// Accepted and validated for contract compatibility; the engine does
    /// not consult it.
    pub rebalance_annually: bool,
    pub target_goal: Option<TargetGoal>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TargetGoal {
    pub retirement_spend: Option<f64>,
    pub horizon_years: Option<u32>,
}

impl SimulationConfig {
    pub fn years(&self) -> u32 {
        self.retire_age.saturating_sub(self.current_age)
    }

    pub fn realized_seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut reject = |field: &'static str, message: &str| {
            errors.push(FieldError {
                field,
                message: message.to_string(),
            });
        };

        if self.current_age == 0 {
            reject("current_age", "current_age must be positive");
        }
        if self.retire_age <= self.current_age {
            reject("retire_age", "retire_age must be greater than current_age");
        }
        if !self.current_balance.is_finite() || self.current_balance < 0.0 {
            reject("current_balance", "current_balance must be non-negative");
        }
        if !self.annual_contrib.is_finite() || self.annual_contrib < 0.0 {
            reject("annual_contrib", "annual_contrib must be non-negative");
        }
        if !self.employer_match_rate.is_finite() || self.employer_match_rate < 0.0 {
            reject(
                "employer_match_rate",
                "employer_match_rate must be non-negative",
            );
        }
        if !self.expected_return.is_finite() || self.expected_return <= -0.9 {
            reject(
                "expected_return",
                "expected_return must be greater than -0.9",
            );
        }
        if !self.return_volatility.is_finite() || self.return_volatility < 0.0 {
            reject(
                "return_volatility",
                "return_volatility must be non-negative",
            );
        }
        if !self.inflation.is_finite() || self.inflation < 0.0 {
            reject("inflation", "inflation must be non-negative");
        }
        if !self.salary_growth.is_finite() {
            reject("salary_growth", "salary_growth must be finite");
        }
        if !(MIN_PATHS..=MAX_PATHS).contains(&self.n_paths) {
            reject("n_paths", "n_paths must be between 100 and 200,000");
        }
        if !self.fees_annual.is_finite() || !(0.0..=0.05).contains(&self.fees_annual) {
            reject("fees_annual", "fees_annual must be between 0 and 0.05");
        }
        if let Some(goal) = &self.target_goal {
            if let Some(spend) = goal.retirement_spend {
                if !spend.is_finite() {
                    reject(
                        "target_goal.retirement_spend",
                        "retirement_spend must be finite",
                    );
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

impl TargetGoal {
    pub fn complete(&self) -> Option<(f64, u32)> {
        Some((self.retirement_spend?, self.horizon_years?))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("{}", field_error_summary(.0))]
    InvalidConfig(Vec<FieldError>),
    #[error("{0}")]
    BoundsExceeded(String),
    #[error("simulation produced non-finite balances")]
    NonFiniteOutput,
}

fn field_error_summary(errors: &[FieldError]) -> String {
    let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
    format!("invalid configuration: {}", fields.join(", "))
}

#[derive(Debug, Clone, Serialize)]
pub struct PercentileBands {
    pub p5: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
    pub p95: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct BalanceStats {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SamplePoint {
    pub age: u32,
    pub nominal: f64,
    pub real: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub percentiles: PercentileBands,
    pub final_balances_nominal: BalanceStats,
    pub final_balances_real: BalanceStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_probability: Option<f64>,
    pub sample_path: Vec<SamplePoint>,
}

#[derive(Debug, Clone)]
pub struct CompoundProjection {
    pub nominal: Vec<f64>,
    pub real: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SimulationConfig {
        SimulationConfig {
            current_age: 35,
            retire_age: 65,
            current_balance: 50_000.0,
            annual_contrib: 10_000.0,
            employer_match_rate: 0.5,
            expected_return: 0.07,
            return_volatility: 0.15,
            inflation: 0.02,
            salary_growth: 0.03,
            n_paths: 10_000,
            seed: Some(42),
            fees_annual: 0.005,
            glidepath: false,
            rebalance_annually: true,
            target_goal: None,
        }
    }

    #[test]
    fn validate_accepts_reference_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validate_collects_every_failing_field() {
        let mut config = valid_config();
        config.retire_age = config.current_age;
        config.return_volatility = -0.1;
        config.fees_annual = 0.2;
        config.n_paths = 50;

        let errors = config.validate().expect_err("config must be rejected");
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["retire_age", "return_volatility", "n_paths", "fees_annual"]
        );
    }

    #[test]
    fn validate_rejects_non_finite_floats() {
        let mut config = valid_config();
        config.expected_return = f64::NAN;
        config.salary_growth = f64::INFINITY;

        let errors = config.validate().expect_err("config must be rejected");
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"expected_return"));
        assert!(fields.contains(&"salary_growth"));
    }

    #[test]
    fn seed_defaults_when_omitted() {
        let mut config = valid_config();
        config.seed = None;
        assert_eq!(config.realized_seed(), DEFAULT_SEED);
        config.seed = Some(7);
        assert_eq!(config.realized_seed(), 7);
    }

    #[test]
    fn goal_is_complete_only_with_both_fields() {
        let goal = TargetGoal {
            retirement_spend: Some(40_000.0),
            horizon_years: None,
        };
        assert!(goal.complete().is_none());

        let goal = TargetGoal {
            retirement_spend: Some(40_000.0),
            horizon_years: Some(25),
        };
        assert_eq!(goal.complete(), Some((40_000.0, 25)));
    }
}
