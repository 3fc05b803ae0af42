use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Standard deviation of the error distribution, the usual RLWE choice.
pub const DEFAULT_NOISE_STANDARD_DEVIATION: f64 = 3.2;

/// Sample n coefficients from the discrete Gaussian over Z with standard
/// deviation σ, via a constant-time CDT scan.
///
/// The scan is branchless: every CDF entry is visited and a conditional
/// select on integer masks picks the result, so the access pattern does not
/// depend on the sampled value. For σ = 3.2 the tail beyond ±6σ is
/// negligible.
pub fn sample_gaussian_signed<R: Rng>(n: usize, sigma: f64, rng: &mut R) -> Vec<i64> {
    let tail = (6.0 * sigma).ceil() as i64;
    let table_size = (2 * tail + 1) as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut cdf = Vec::with_capacity(table_size);
    let mut cumulative = 0.0f64;
    for x in -tail..=tail {
        cumulative += (-((x * x) as f64) / two_sigma_sq).exp();
        cdf.push(cumulative);
    }
    let total = cumulative;

    (0..n)
        .map(|_| {
            let u: f64 = rng.random::<f64>() * total;
            let mut result = tail;
            for i in (0..table_size).rev() {
                let mask = ((u < cdf[i]) as i64).wrapping_neg();
                let candidate = -tail + i as i64;
                result = (candidate & mask) | (result & !mask);
            }
            result
        })
        .collect()
}

/// Rounded continuous Gaussian. Not constant time; testing only.
pub fn sample_gaussian_rounded<R: Rng>(n: usize, sigma: f64, rng: &mut R) -> Vec<i64> {
    let normal = Normal::new(0.0, sigma).expect("sigma must be positive and finite");
    (0..n).map(|_| normal.sample(rng).round() as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_gaussian_moments() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sigma = DEFAULT_NOISE_STANDARD_DEVIATION;
        let samples = sample_gaussian_signed(10000, sigma, &mut rng);

        let mean: f64 = samples.iter().map(|&x| x as f64).sum::<f64>() / 10000.0;
        assert!(mean.abs() < 0.5, "mean = {mean}");

        let var: f64 =
            samples.iter().map(|&x| (x as f64 - mean).powi(2)).sum::<f64>() / 10000.0;
        assert!((var - sigma * sigma).abs() < 2.0, "var = {var}");

        let tail = (6.0 * sigma).ceil() as i64;
        assert!(samples.iter().all(|&s| s.abs() <= tail));
    }

    #[test]
    fn test_rounded_gaussian_agrees() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let samples = sample_gaussian_rounded(10000, 3.2, &mut rng);
        let var: f64 = samples.iter().map(|&x| (x * x) as f64).sum::<f64>() / 10000.0;
        assert!((var - 10.24).abs() < 2.0);
    }
}
