pub mod gaussian;
pub mod uniform;

pub use gaussian::{sample_gaussian_signed, DEFAULT_NOISE_STANDARD_DEVIATION};
pub use uniform::{sample_ternary_signed, sample_uniform_limb};

use crate::ring::modular::Modulus;

/// Spread a signed coefficient vector across RNS limbs: each value v maps to
/// v mod q_i, negatives wrapping to q_i - |v|.
pub(crate) fn signed_poly_to_rns(values: &[i64], moduli: &[Modulus], destination: &mut [u64]) {
    let n = values.len();
    debug_assert_eq!(destination.len(), n * moduli.len());
    for (i, m) in moduli.iter().enumerate() {
        let q = m.value();
        let limb = &mut destination[i * n..(i + 1) * n];
        for (d, &v) in limb.iter_mut().zip(values.iter()) {
            *d = if v >= 0 {
                m.reduce(v as u64)
            } else {
                let r = m.reduce(v.unsigned_abs());
                if r == 0 {
                    0
                } else {
                    q - r
                }
            };
        }
    }
}
