use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;
use statrs::statistics::Statistics;

use crate::error::{ChromalignError, Result};

/// Mean of a sequence of values.
///
/// Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Population standard deviation (ddof = 0) of a sequence of values.
///
/// Returns NaN for an empty slice and 0.0 for a single value.
pub fn std_dev(values: &[f64]) -> f64 {
    values.iter().population_std_dev()
}

/// Mean of the non-missing entries of a sequence.
///
/// Missing observations (`None`) are excluded from the calculation entirely,
/// so inserting any number of them leaves the result unchanged. Returns NaN
/// when every entry is missing.
///
/// # Examples
///
/// ```rust
/// # use chromalign::utility::nan_mean;
/// let values = vec![Some(900.0), Some(910.0), None, Some(905.0)];
/// assert!((nan_mean(&values) - 905.0).abs() < 1e-9);
/// ```
pub fn nan_mean(values: &[Option<f64>]) -> f64 {
    values.iter().filter_map(|v| *v).mean()
}

/// Population standard deviation of the non-missing entries of a sequence.
///
/// Missing observations (`None`) are excluded from the calculation entirely.
pub fn nan_std(values: &[Option<f64>]) -> f64 {
    values.iter().filter_map(|v| *v).population_std_dev()
}

/// Draws `count` values from a normal distribution truncated to `[low, upp]`.
///
/// Sampling is by rejection; pass a `seed` for reproducible sequences.
pub fn get_truncated_normal(
    mean: f64,
    sd: f64,
    low: f64,
    upp: f64,
    count: usize,
    seed: Option<u64>,
) -> Result<Vec<f64>> {
    if low >= upp {
        return Err(ChromalignError::invalid_parameter(
            "low",
            format!("lower bound {} must be below upper bound {}", low, upp),
        ));
    }
    let normal = Normal::new(mean, sd).map_err(|e| {
        ChromalignError::invalid_parameter("sd", format!("invalid normal distribution: {}", e))
    })?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut values = Vec::with_capacity(count);
    while values.len() < count {
        let x = normal.sample(&mut rng);
        if x >= low && x <= upp {
            values.push(x);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std_dev() {
        let values = vec![900.0, 910.0, 895.0, 905.0];
        assert!((mean(&values) - 902.5).abs() < 1e-9);
        // Population standard deviation: sqrt(125 / 4)
        assert!((std_dev(&values) - 31.25_f64.sqrt()).abs() < 1e-9);
        assert!((std_dev(&[626.0]) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_nan_statistics_skip_missing() {
        let with_missing = vec![Some(900.0), Some(910.0), Some(895.0), None, Some(905.0)];
        let without_missing = vec![Some(900.0), Some(910.0), Some(895.0), Some(905.0)];

        assert!((nan_mean(&with_missing) - 902.5).abs() < 1e-9);
        assert!((nan_mean(&with_missing) - nan_mean(&without_missing)).abs() < 1e-12);
        assert!((nan_std(&with_missing) - nan_std(&without_missing)).abs() < 1e-12);
    }

    #[test]
    fn test_nan_statistics_all_missing() {
        let values: Vec<Option<f64>> = vec![None, None];
        assert!(nan_mean(&values).is_nan());
        assert!(nan_std(&values).is_nan());
    }

    #[test]
    fn test_inserting_missing_leaves_statistic_unchanged() {
        let base: Vec<Option<f64>> = vec![Some(1.0), Some(2.0), Some(3.0)];
        let mut padded = base.clone();
        for i in 0..5 {
            padded.insert(i, None);
        }
        assert!((nan_mean(&base) - nan_mean(&padded)).abs() < 1e-12);
        assert!((nan_std(&base) - nan_std(&padded)).abs() < 1e-12);
    }

    #[test]
    fn test_get_truncated_normal() {
        let values = get_truncated_normal(5.0, 2.0, 0.0, 10.0, 25, Some(42)).unwrap();
        assert_eq!(values.len(), 25);
        assert!(values.iter().all(|&v| (0.0..=10.0).contains(&v)));

        // Seeded draws are reproducible
        let again = get_truncated_normal(5.0, 2.0, 0.0, 10.0, 25, Some(42)).unwrap();
        assert_eq!(values, again);
    }

    #[test]
    fn test_get_truncated_normal_invalid_bounds() {
        assert!(get_truncated_normal(5.0, 2.0, 10.0, 0.0, 5, None).is_err());
    }
}
