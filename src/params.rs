use std::hash::{Hash, Hasher};

use crate::error::{LeveeError, Result};
use crate::ring::modular::{generate_ntt_primes, is_prime, Modulus};

/// The two supported leveled schemes: exact integer arithmetic (BFV) and
/// approximate fixed-point arithmetic (CKKS).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SchemeType {
    Bfv,
    Ckks,
}

/// Identifier of one node of the modulus chain; a hash over the full
/// parameter set, so equal ids mean equal parameters.
pub type ParmsId = [u64; 4];

pub const PARMS_ID_ZERO: ParmsId = [0u64; 4];

pub const POLY_MODULUS_DEGREE_MIN: usize = 8;
pub const POLY_MODULUS_DEGREE_MAX: usize = 32768;
pub const COEFF_MODULUS_COUNT_MAX: usize = 64;
pub const COEFF_MODULUS_USER_BIT_COUNT_MAX: u32 = 60;

/// Encryption parameters: scheme, ring degree N, RNS coefficient modulus,
/// and (for BFV) the plain modulus t.
#[derive(Clone, Debug)]
pub struct EncryptionParams {
    scheme: SchemeType,
    poly_modulus_degree: usize,
    coeff_modulus: Vec<Modulus>,
    plain_modulus: Option<Modulus>,
    parms_id: ParmsId,
}

impl EncryptionParams {
    pub fn bfv(
        poly_modulus_degree: usize,
        coeff_modulus: Vec<u64>,
        plain_modulus: u64,
    ) -> Result<Self> {
        let plain = Modulus::new(plain_modulus)?;
        Self::build(SchemeType::Bfv, poly_modulus_degree, coeff_modulus, Some(plain))
    }

    pub fn ckks(poly_modulus_degree: usize, coeff_modulus: Vec<u64>) -> Result<Self> {
        Self::build(SchemeType::Ckks, poly_modulus_degree, coeff_modulus, None)
    }

    fn build(
        scheme: SchemeType,
        poly_modulus_degree: usize,
        coeff_modulus: Vec<u64>,
        plain_modulus: Option<Modulus>,
    ) -> Result<Self> {
        if !poly_modulus_degree.is_power_of_two()
            || !(POLY_MODULUS_DEGREE_MIN..=POLY_MODULUS_DEGREE_MAX).contains(&poly_modulus_degree)
        {
            return Err(LeveeError::InvalidParam(format!(
                "poly_modulus_degree must be a power of two in [{POLY_MODULUS_DEGREE_MIN}, \
                 {POLY_MODULUS_DEGREE_MAX}], got {poly_modulus_degree}"
            )));
        }
        if coeff_modulus.is_empty() || coeff_modulus.len() > COEFF_MODULUS_COUNT_MAX {
            return Err(LeveeError::InvalidParam(format!(
                "coefficient modulus must hold 1..={COEFF_MODULUS_COUNT_MAX} primes"
            )));
        }
        let factor = 2 * poly_modulus_degree as u64;
        let moduli = coeff_modulus
            .iter()
            .map(|&q| {
                let m = Modulus::new(q)?;
                // The key-switching accumulator bound assumes user primes of
                // at most 60 bits; wider primes are reserved for internal
                // auxiliary bases.
                if m.bit_count() > COEFF_MODULUS_USER_BIT_COUNT_MAX {
                    return Err(LeveeError::InvalidParam(format!(
                        "coefficient modulus {q} exceeds {COEFF_MODULUS_USER_BIT_COUNT_MAX} bits"
                    )));
                }
                if (q - 1) % factor != 0 {
                    return Err(LeveeError::InvalidParam(format!(
                        "coefficient modulus {q} is not congruent to 1 mod 2N"
                    )));
                }
                Ok(m)
            })
            .collect::<Result<Vec<_>>>()?;

        let parms_id = compute_parms_id(scheme, poly_modulus_degree, &moduli, &plain_modulus);
        Ok(Self {
            scheme,
            poly_modulus_degree,
            coeff_modulus: moduli,
            plain_modulus,
            parms_id,
        })
    }

    /// Parameters for the next chain level: drop the last coefficient prime.
    pub(crate) fn next_level(&self) -> Option<Self> {
        if self.coeff_modulus.len() < 2 {
            return None;
        }
        let moduli = self.coeff_modulus[..self.coeff_modulus.len() - 1].to_vec();
        let parms_id = compute_parms_id(
            self.scheme,
            self.poly_modulus_degree,
            &moduli,
            &self.plain_modulus,
        );
        Some(Self {
            scheme: self.scheme,
            poly_modulus_degree: self.poly_modulus_degree,
            coeff_modulus: moduli,
            plain_modulus: self.plain_modulus.clone(),
            parms_id,
        })
    }

    #[inline]
    pub fn scheme(&self) -> SchemeType {
        self.scheme
    }

    #[inline]
    pub fn poly_modulus_degree(&self) -> usize {
        self.poly_modulus_degree
    }

    #[inline]
    pub fn coeff_modulus(&self) -> &[Modulus] {
        &self.coeff_modulus
    }

    /// Only meaningful for BFV; CKKS parameters carry no plain modulus.
    #[inline]
    pub fn plain_modulus(&self) -> Option<&Modulus> {
        self.plain_modulus.as_ref()
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        &self.parms_id
    }
}

fn compute_parms_id(
    scheme: SchemeType,
    poly_modulus_degree: usize,
    coeff_modulus: &[Modulus],
    plain_modulus: &Option<Modulus>,
) -> ParmsId {
    let mut id = PARMS_ID_ZERO;
    for (word, slot) in id.iter_mut().enumerate() {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        (word as u64).hash(&mut hasher);
        scheme.hash(&mut hasher);
        poly_modulus_degree.hash(&mut hasher);
        for m in coeff_modulus {
            m.value().hash(&mut hasher);
        }
        if let Some(t) = plain_modulus {
            t.value().hash(&mut hasher);
        }
        *slot = hasher.finish();
    }
    id
}

/// Generate an RNS coefficient modulus of NTT-friendly primes with the given
/// bit sizes, largest-first within each size class, all distinct.
pub fn coeff_modulus_create(poly_modulus_degree: usize, bit_sizes: &[u32]) -> Result<Vec<u64>> {
    if !poly_modulus_degree.is_power_of_two() {
        return Err(LeveeError::InvalidParam(
            "poly_modulus_degree must be a power of two".into(),
        ));
    }
    let factor = 2 * poly_modulus_degree as u64;
    let mut result: Vec<u64> = Vec::with_capacity(bit_sizes.len());
    for &bits in bit_sizes {
        // Earlier picks are excluded, so this returns the next fresh prime
        // of the requested size.
        let next = generate_ntt_primes(bits, 1, factor, &result)?;
        result.push(next[0]);
    }
    Ok(result)
}

/// A batching-compatible plain modulus: a prime ≡ 1 mod 2N of the given
/// bit size.
pub fn plain_modulus_batching(poly_modulus_degree: usize, bit_size: u32) -> Result<u64> {
    let factor = 2 * poly_modulus_degree as u64;
    Ok(generate_ntt_primes(bit_size, 1, factor, &[])?[0])
}

/// Whether t supports batching for degree n: prime and ≡ 1 mod 2n.
pub(crate) fn supports_batching(plain_modulus: u64, poly_modulus_degree: usize) -> bool {
    is_prime(plain_modulus) && (plain_modulus - 1) % (2 * poly_modulus_degree as u64) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parms_id_distinguishes_levels() {
        let moduli = coeff_modulus_create(16, &[30, 30, 30]).unwrap();
        let parms = EncryptionParams::bfv(16, moduli, 97).unwrap();
        let next = parms.next_level().unwrap();
        assert_ne!(parms.parms_id(), next.parms_id());
        assert_eq!(next.coeff_modulus().len(), 2);
        let last = next.next_level().unwrap();
        assert!(last.next_level().is_none());
    }

    #[test]
    fn test_rejects_bad_degree_and_modulus() {
        assert!(EncryptionParams::bfv(17, vec![97], 17).is_err());
        assert!(EncryptionParams::bfv(16, vec![], 17).is_err());
        // 101 is prime but not ≡ 1 mod 32
        assert!(EncryptionParams::bfv(16, vec![101], 17).is_err());
    }

    #[test]
    fn test_coeff_modulus_create() {
        let moduli = coeff_modulus_create(1024, &[30, 30, 40]).unwrap();
        assert_eq!(moduli.len(), 3);
        assert_ne!(moduli[0], moduli[1]);
        for &q in &moduli {
            assert_eq!((q - 1) % 2048, 0);
        }
        assert_eq!(64 - moduli[2].leading_zeros(), 40);
    }

    #[test]
    fn test_batching_support() {
        assert!(supports_batching(1032193, 8192));
        assert!(!supports_batching(1032193, 16384));
        assert!(!supports_batching(65536, 1024));
    }
}
