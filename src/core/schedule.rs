use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

const CACHE_CAP: usize = 32;

const GLIDEPATH_MEAN_DROP: f64 = 0.02;
const GLIDEPATH_VOL_SCALE: f64 = 0.7;

#[derive(Debug, Clone)]
pub(crate) struct ReturnModel {
    pub mu: Arc<Vec<f64>>,
    pub sigma: Arc<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReturnKey {
    years: usize,
    mu_bits: u64,
    sigma_bits: u64,
    glidepath: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DiscountKey {
    years: usize,
    inflation_bits: u64,
}

static RETURN_CACHE: OnceLock<Mutex<HashMap<ReturnKey, ReturnModel>>> = OnceLock::new();
static DISCOUNT_CACHE: OnceLock<Mutex<HashMap<DiscountKey, Arc<Vec<f64>>>>> = OnceLock::new();

pub(crate) fn return_model(years: usize, mu: f64, sigma: f64, glidepath: bool) -> ReturnModel {
    let key = ReturnKey {
        years,
        mu_bits: mu.to_bits(),
        sigma_bits: sigma.to_bits(),
        glidepath,
    };
    let cache = RETURN_CACHE.get_or_init(Default::default);
    let Ok(mut map) = cache.lock() else {
        return compute_return_model(years, mu, sigma, glidepath);
    };
    if let Some(hit) = map.get(&key) {
        return hit.clone();
    }
    let computed = compute_return_model(years, mu, sigma, glidepath);
    if map.len() >= CACHE_CAP {
        map.clear();
    }
    map.insert(key, computed.clone());
    computed
}

fn compute_return_model(years: usize, mu: f64, sigma: f64, glidepath: bool) -> ReturnModel {
    if glidepath {
        ReturnModel {
            mu: Arc::new(linspace(mu, mu - GLIDEPATH_MEAN_DROP, years)),
            sigma: Arc::new(linspace(sigma, sigma * GLIDEPATH_VOL_SCALE, years)),
        }
    } else {
        ReturnModel {
            mu: Arc::new(vec![mu; years]),
            sigma: Arc::new(vec![sigma; years]),
        }
    }
}

pub(crate) fn contribution_schedule(
    years: usize,
    annual_contrib: f64,
    employer_match_rate: f64,
    salary_growth: f64,
) -> Vec<f64> {
    let mut base = annual_contrib;
    let mut contribs = Vec::with_capacity(years);
    for _ in 0..years {
        contribs.push(base * (1.0 + employer_match_rate));
        base *= 1.0 + salary_growth;
    }
    contribs
}

pub(crate) fn discount_curve(years: usize, inflation: f64) -> Arc<Vec<f64>> {
    let key = DiscountKey {
        years,
        inflation_bits: inflation.to_bits(),
    };
    let cache = DISCOUNT_CACHE.get_or_init(Default::default);
    let Ok(mut map) = cache.lock() else {
        return Arc::new(compute_discount_curve(years, inflation));
    };
    if let Some(hit) = map.get(&key) {
        return hit.clone();
    }
    let computed = Arc::new(compute_discount_curve(years, inflation));
    if map.len() >= CACHE_CAP {
        map.clear();
    }
    map.insert(key, computed.clone());
    computed
}

fn compute_discount_curve(years: usize, inflation: f64) -> Vec<f64> {
    (0..=years)
        .map(|t| (1.0 + inflation).powi(t as i32))
        .collect()
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut values: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            // Pin the endpoint: accumulated rounding must not move the last element.
            values[n - 1] = end;
            values
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn flat_model_repeats_base_parameters() {
        let model = return_model(30, 0.07, 0.15, false);
        assert_eq!(model.mu.len(), 30);
        assert_eq!(model.sigma.len(), 30);
        assert!(model.mu.iter().all(|&m| m == 0.07));
        assert!(model.sigma.iter().all(|&s| s == 0.15));
    }

    #[test]
    fn glidepath_interpolates_between_exact_endpoints() {
        let model = return_model(30, 0.07, 0.15, true);
        assert_eq!(model.mu[0], 0.07);
        assert_approx(model.mu[29], 0.05);
        assert_eq!(model.sigma[0], 0.15);
        assert_approx(model.sigma[29], 0.15 * 0.7);
        for window in model.mu.windows(2) {
            assert!(window[1] < window[0]);
        }
        for window in model.sigma.windows(2) {
            assert!(window[1] < window[0]);
        }
    }

    #[test]
    fn single_year_glidepath_keeps_start_values() {
        let model = return_model(1, 0.06, 0.12, true);
        assert_eq!(model.mu.len(), 1);
        assert_eq!(model.mu[0], 0.06);
        assert_eq!(model.sigma[0], 0.12);
    }

    #[test]
    fn return_model_is_memoized() {
        let first = return_model(17, 0.065, 0.14, true);
        let second = return_model(17, 0.065, 0.14, true);
        assert!(Arc::ptr_eq(&first.mu, &second.mu));
        assert!(Arc::ptr_eq(&first.sigma, &second.sigma));
    }

    #[test]
    fn contributions_apply_match_then_compound_salary_growth() {
        let contribs = contribution_schedule(3, 10_000.0, 0.5, 0.03);
        assert_approx(contribs[0], 15_000.0);
        assert_approx(contribs[1], 15_000.0 * 1.03);
        assert_approx(contribs[2], 15_000.0 * 1.03 * 1.03);
    }

    #[test]
    fn negative_salary_growth_decays_contributions() {
        let contribs = contribution_schedule(3, 10_000.0, 0.0, -0.10);
        assert_approx(contribs[0], 10_000.0);
        assert_approx(contribs[1], 9_000.0);
        assert_approx(contribs[2], 8_100.0);
    }

    #[test]
    fn discount_curve_compounds_from_unity() {
        let curve = discount_curve(3, 0.02);
        assert_eq!(curve.len(), 4);
        assert_eq!(curve[0], 1.0);
        assert_approx(curve[1], 1.02);
        assert_approx(curve[2], 1.02 * 1.02);
        assert_approx(curve[3], 1.02 * 1.02 * 1.02);
    }

    #[test]
    fn discount_curve_is_memoized() {
        let first = discount_curve(25, 0.025);
        let second = discount_curve(25, 0.025);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn zero_inflation_leaves_balances_undiscounted() {
        let curve = discount_curve(5, 0.0);
        assert!(curve.iter().all(|&f| f == 1.0));
    }
}
