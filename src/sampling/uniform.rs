use rand::Rng;

use crate::ring::modular::Modulus;

/// Sample one limb of n coefficients uniformly from [0, q).
pub fn sample_uniform_limb<R: Rng>(n: usize, modulus: &Modulus, rng: &mut R) -> Vec<u64> {
    let q = modulus.value();
    (0..n).map(|_| rng.random_range(0..q)).collect()
}

/// Sample a ternary polynomial with coefficients in {-1, 0, 1}.
pub fn sample_ternary_signed<R: Rng>(n: usize, rng: &mut R) -> Vec<i64> {
    (0..n).map(|_| rng.random_range(-1i64..=1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_uniform_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let m = Modulus::new(97).unwrap();
        let v = sample_uniform_limb(1024, &m, &mut rng);
        assert_eq!(v.len(), 1024);
        assert!(v.iter().all(|&x| x < 97));
        // A uniform sample over a small modulus hits most residues
        let distinct: std::collections::HashSet<_> = v.iter().collect();
        assert!(distinct.len() > 80);
    }

    #[test]
    fn test_ternary_range() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let v = sample_ternary_signed(4096, &mut rng);
        assert!(v.iter().all(|&x| (-1..=1).contains(&x)));
        assert!(v.iter().any(|&x| x == -1));
        assert!(v.iter().any(|&x| x == 1));
    }
}
