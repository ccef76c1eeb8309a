//! Numerical utilities shared by the scoring and accumulation code.
//!
//! The central function here is the max-shifted log-sum-exp used to turn raw
//! per-component log-likelihoods into normalized posterior responsibilities.
//! Raw likelihoods underflow double precision for high-dimensional features,
//! so normalization has to stay in log space until the final exponentiation.

/// ln(2π), the per-dimension constant of the Gaussian log-density.
pub const LOG_2PI: f64 = 1.837877066409345483560659472811;

/// Safe comparison for floating point values (pushes NaN to the end).
pub fn float_total_cmp(a: &f64, b: &f64) -> std::cmp::Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => std::cmp::Ordering::Equal,
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap(),
    }
}

/// Computes `log(Σ exp(values_i))` without overflow or underflow.
///
/// Uses the standard max-subtraction form: the largest exponent is factored
/// out so every remaining `exp` argument is ≤ 0. Returns negative infinity
/// for an empty slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max_val.is_finite() {
        // All -inf (or empty): the sum is zero; +inf or NaN propagates.
        return max_val;
    }
    max_val
        + values
            .iter()
            .map(|&v| (v - max_val).exp())
            .sum::<f64>()
            .ln()
}

/// Converts log-likelihoods to posterior responsibilities in place and
/// returns the total log-likelihood of the frame.
///
/// After the call, the slice holds `exp(loglike_i - total)` and sums to 1
/// within floating-point rounding for any non-empty, finite input. Behavior
/// on an empty slice is a caller-contract violation and yields NaN entries
/// rather than a panic.
pub fn softmax_in_place(loglikes: &mut [f64]) -> f64 {
    let total = log_sum_exp(loglikes);
    for v in loglikes.iter_mut() {
        *v = (*v - total).exp();
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_log_sum_exp_matches_direct_computation() {
        let values: Vec<f64> = vec![-1.0, -2.0, -3.0];
        let direct = values.iter().map(|v| v.exp()).sum::<f64>().ln();
        assert_approx_eq!(log_sum_exp(&values), direct, 1e-12);
    }

    #[test]
    fn test_log_sum_exp_extreme_magnitudes() {
        // Direct exponentiation of these would under/overflow.
        let values = vec![-1000.0, -1001.0];
        let expected = -1000.0 + (1.0 + (-1.0f64).exp()).ln();
        assert_approx_eq!(log_sum_exp(&values), expected, 1e-12);

        let values = vec![800.0, 799.0];
        let expected = 800.0 + (1.0 + (-1.0f64).exp()).ln();
        assert_approx_eq!(log_sum_exp(&values), expected, 1e-12);
    }

    #[test]
    fn test_log_sum_exp_single_element() {
        assert_approx_eq!(log_sum_exp(&[-5.3]), -5.3, 1e-15);
    }

    #[test]
    fn test_log_sum_exp_empty_is_neg_infinity() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        for scale in [1.0, 100.0, 10000.0] {
            let mut values = vec![-1.3 * scale, 0.2 * scale, -0.7 * scale, 0.9 * scale];
            softmax_in_place(&mut values);
            let sum: f64 = values.iter().sum();
            assert_approx_eq!(sum, 1.0, 1e-6);
            assert!(values.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_softmax_returns_total_log_likelihood() {
        let mut values = vec![(0.3f64).ln(), (0.7f64).ln()];
        let total = softmax_in_place(&mut values);
        assert_approx_eq!(total, 0.0, 1e-12); // log(0.3 + 0.7)
        assert_approx_eq!(values[0], 0.3, 1e-12);
        assert_approx_eq!(values[1], 0.7, 1e-12);
    }

    #[test]
    fn test_float_total_cmp_orders_nan_last() {
        let mut v = vec![3.0, f64::NAN, 1.0];
        v.sort_by(float_total_cmp);
        assert_eq!(v[0], 1.0);
        assert_eq!(v[1], 3.0);
        assert!(v[2].is_nan());
    }
}
