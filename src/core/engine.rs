use std::f64::consts::PI;

use rayon::prelude::*;

use super::schedule::{ReturnModel, contribution_schedule, discount_curve, return_model};
use super::types::{
    BalanceStats, CompoundProjection, MAX_PATHS, MAX_YEARS, PercentileBands, SamplePoint,
    SimulationConfig, SimulationError, SimulationResult, TargetGoal,
};

struct BalanceMatrix {
    width: usize,
    data: Vec<f64>,
}

impl BalanceMatrix {
    fn n_paths(&self) -> usize {
        self.data.len() / self.width
    }

    fn row(&self, path: usize) -> &[f64] {
        &self.data[path * self.width..(path + 1) * self.width]
    }

    fn column_into(&self, t: usize, out: &mut Vec<f64>) {
        out.clear();
        out.extend(self.data.iter().skip(t).step_by(self.width).copied());
    }

    fn column(&self, t: usize) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.n_paths());
        self.column_into(t, &mut values);
        values
    }
}

pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationResult, SimulationError> {
    config.validate().map_err(SimulationError::InvalidConfig)?;

    let years = config.years();
    if years > MAX_YEARS || config.n_paths > MAX_PATHS {
        return Err(SimulationError::BoundsExceeded(format!(
            "n_paths must be <= {MAX_PATHS} and years <= {MAX_YEARS}"
        )));
    }
    let years = years as usize;
    let n_paths = config.n_paths as usize;

    let returns = return_model(
        years,
        config.expected_return,
        config.return_volatility,
        config.glidepath,
    );
    let contribs = contribution_schedule(
        years,
        config.annual_contrib,
        config.employer_match_rate,
        config.salary_growth,
    );
    let discount = discount_curve(years, config.inflation);

    let nominal = simulate_paths(config, &returns, &contribs, n_paths, years);
    let real = deflate(&nominal, &discount);

    aggregate(config, &nominal, &real)
}

fn simulate_paths(
    config: &SimulationConfig,
    returns: &ReturnModel,
    contribs: &[f64],
    n_paths: usize,
    years: usize,
) -> BalanceMatrix {
    let width = years + 1;
    let base_seed = config.realized_seed();
    let start_balance = config.current_balance;
    let fees = config.fees_annual;
    let mu = returns.mu.as_slice();
    let sigma = returns.sigma.as_slice();

    let mut data = vec![0.0_f64; n_paths * width];
    // Path p draws from its own stream seeded by splitmix64(seed ^ p), consumed
    // in year order; results are bit-identical regardless of thread scheduling.
    data.par_chunks_mut(width)
        .enumerate()
        .for_each(|(path, row)| {
            let mut rng = Rng::new(derive_seed(base_seed, path as u64));
            let mut balance = start_balance;
            row[0] = balance;
            for t in 0..years {
                let z = rng.standard_normal();
                let drift = mu[t] - 0.5 * sigma[t] * sigma[t];
                let period_return = (drift + sigma[t] * z).exp() - 1.0;
                balance += contribs[t];
                let gross = balance * (1.0 + period_return);
                balance = gross * (1.0 - fees);
                row[t + 1] = balance;
            }
        });

    BalanceMatrix { width, data }
}

fn deflate(nominal: &BalanceMatrix, discount: &[f64]) -> BalanceMatrix {
    let width = nominal.width;
    let mut data = nominal.data.clone();
    data.par_chunks_mut(width).for_each(|row| {
        for (t, value) in row.iter_mut().enumerate() {
            *value /= discount[t];
        }
    });
    BalanceMatrix { width, data }
}

fn aggregate(
    config: &SimulationConfig,
    nominal: &BalanceMatrix,
    real: &BalanceMatrix,
) -> Result<SimulationResult, SimulationError> {
    let width = nominal.width;
    let years = width - 1;

    let final_nominal = nominal.column(years);
    let final_real = real.column(years);
    if final_nominal.iter().any(|v| !v.is_finite()) || final_real.iter().any(|v| !v.is_finite()) {
        return Err(SimulationError::NonFiniteOutput);
    }

    let mut bands = PercentileBands {
        p5: Vec::with_capacity(width),
        p25: Vec::with_capacity(width),
        p50: Vec::with_capacity(width),
        p75: Vec::with_capacity(width),
        p95: Vec::with_capacity(width),
    };
    let mut scratch = Vec::with_capacity(nominal.n_paths());
    for t in 0..width {
        real.column_into(t, &mut scratch);
        bands.p5.push(percentile(&mut scratch, 5.0));
        bands.p25.push(percentile(&mut scratch, 25.0));
        bands.p50.push(percentile(&mut scratch, 50.0));
        bands.p75.push(percentile(&mut scratch, 75.0));
        bands.p95.push(percentile(&mut scratch, 95.0));
    }

    let final_balances_nominal = BalanceStats {
        mean: mean(&final_nominal),
        std: population_std(&final_nominal),
    };
    let final_balances_real = BalanceStats {
        mean: mean(&final_real),
        std: population_std(&final_real),
    };

    let success_probability = config
        .target_goal
        .as_ref()
        .and_then(|goal| success_probability(config, goal, &final_real));

    let sample_path = (0..width)
        .map(|t| SamplePoint {
            age: config.current_age + t as u32,
            nominal: nominal.row(0)[t],
            real: real.row(0)[t],
        })
        .collect();

    Ok(SimulationResult {
        percentiles: bands,
        final_balances_nominal,
        final_balances_real,
        success_probability,
        sample_path,
    })
}

fn success_probability(
    config: &SimulationConfig,
    goal: &TargetGoal,
    final_real: &[f64],
) -> Option<f64> {
    let (spend, horizon) = goal.complete()?;
    let r_real = (1.0 + config.expected_return) / (1.0 + config.inflation) - 1.0;
    let pv = if r_real == 0.0 {
        spend * horizon as f64
    } else {
        spend * (1.0 - (1.0 + r_real).powf(-(horizon as f64))) / r_real
    };
    let hits = final_real.iter().filter(|&&balance| balance >= pv).count();
    Some(hits as f64 / final_real.len() as f64)
}

pub fn compound_projection(
    initial_balance: f64,
    annual_contribution: f64,
    years: u32,
    annual_return: f64,
    inflation: f64,
) -> CompoundProjection {
    let mut nominal = Vec::with_capacity(years as usize + 1);
    let mut real = Vec::with_capacity(years as usize + 1);
    nominal.push(initial_balance);
    real.push(initial_balance);
    for i in 1..=years {
        let next = nominal[i as usize - 1] * (1.0 + annual_return) + annual_contribution;
        nominal.push(next);
        real.push(next / (1.0 + inflation).powf(i as f64));
    }
    CompoundProjection { nominal, real }
}

fn derive_seed(base_seed: u64, path: u64) -> u64 {
    splitmix64(base_seed ^ path)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

struct Rng {
    state: u64,
    cached_normal: Option<f64>,
}

impl Rng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 {
            0xA5A5_A5A5_A5A5_A5A5
        } else {
            seed
        };
        Self {
            state,
            cached_normal: None,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    fn next_f64(&mut self) -> f64 {
        const DENOM: f64 = (1_u64 << 53) as f64;
        let v = self.next_u64() >> 11;
        ((v as f64) + 0.5) / DENOM
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached_normal.take() {
            return z;
        }

        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        let z0 = r * theta.cos();
        let z1 = r * theta.sin();
        self.cached_normal = Some(z1);
        z0
    }
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper || values[lower] == values[upper] {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
