use std::cmp::Ordering;

use sift_core::{Statistics, nan_to_zero};

pub const HISTOGRAM_BUCKETS: usize = 10;

pub fn job_statistics(pass_percentages: &[f64]) -> Statistics {
    let mut sorted = pass_percentages
        .iter()
        .copied()
        .filter(|value| !value.is_nan())
        .collect::<Vec<_>>();
    sorted.sort_by(|left, right| left.partial_cmp(right).unwrap_or(Ordering::Equal));

    let mut histogram = vec![0; HISTOGRAM_BUCKETS];
    for value in &sorted {
        histogram[histogram_bucket(*value)] += 1;
    }

    let (q1, q2, q3) = quartiles(&sorted);
    Statistics {
        mean: nan_to_zero(mean(&sorted)),
        standard_deviation: nan_to_zero(standard_deviation(&sorted)),
        quartiles: vec![nan_to_zero(q1), nan_to_zero(q2), nan_to_zero(q3)],
        p95: nan_to_zero(percentile(&sorted, 95.0)),
        histogram,
    }
}

/// 100% lands in the last bucket alongside 90-99%.
pub fn histogram_bucket(percentage: f64) -> usize {
    let index = (percentage / 10.0).floor().max(0.0) as usize;
    index.min(HISTOGRAM_BUCKETS - 1)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn standard_deviation(values: &[f64]) -> f64 {
    let mean = mean(values);
    let variance =
        values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn median(sorted: &[f64]) -> f64 {
    let len = sorted.len();
    if len == 0 {
        return f64::NAN;
    }
    if len % 2 == 0 {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
    } else {
        sorted[len / 2]
    }
}

/// Tukey hinges: the median splits the sample and is excluded from both
/// halves when the sample size is odd.
fn quartiles(sorted: &[f64]) -> (f64, f64, f64) {
    let len = sorted.len();
    let (lower_end, upper_start) = if len % 2 == 0 {
        (len / 2, len / 2)
    } else {
        (len / 2, len / 2 + 1)
    };
    (
        median(&sorted[..lower_end]),
        median(sorted),
        median(&sorted[upper_start.min(len)..]),
    )
}

/// Nearest-rank percentile, averaging the neighbours when the rank falls
/// between two samples. Undefined (NaN) below the first rank.
fn percentile(sorted: &[f64], percent: f64) -> f64 {
    let rank = percent / 100.0 * sorted.len() as f64;
    if rank.fract() == 0.0 && rank >= 1.0 {
        sorted[rank as usize - 1]
    } else if rank > 1.0 {
        let index = rank as usize;
        (sorted[index - 1] + sorted[index]) / 2.0
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample_yields_zeroes_not_nan() {
        let stats = job_statistics(&[]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.standard_deviation, 0.0);
        assert_eq!(stats.quartiles, vec![0.0, 0.0, 0.0]);
        assert_eq!(stats.p95, 0.0);
        assert_eq!(stats.histogram, vec![0; 10]);
    }

    #[test]
    fn statistics_over_known_sample() {
        let stats = job_statistics(&[100.0, 20.0, 40.0, 60.0, 80.0]);
        assert!((stats.mean - 60.0).abs() < 1e-9);
        assert!((stats.standard_deviation - 800.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(stats.quartiles, vec![30.0, 60.0, 90.0]);
        assert_eq!(stats.histogram, vec![0, 0, 1, 0, 1, 0, 1, 0, 1, 1]);
    }

    #[test]
    fn percentile_interpolates_between_neighbours() {
        let sorted = (1..=20).map(f64::from).collect::<Vec<_>>();
        assert_eq!(percentile(&sorted, 95.0), 19.0);
        let sorted = (1..=10).map(f64::from).collect::<Vec<_>>();
        assert_eq!(percentile(&sorted, 95.0), 9.5);
        assert!(percentile(&[42.0], 95.0).is_nan());
    }

    #[test]
    fn full_pass_rate_lands_in_last_bucket() {
        assert_eq!(histogram_bucket(100.0), 9);
        assert_eq!(histogram_bucket(99.9), 9);
        assert_eq!(histogram_bucket(0.0), 0);
        assert_eq!(histogram_bucket(59.99), 5);
    }
}
