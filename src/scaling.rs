//! The BFV plaintext scaling variant: fold ⌊Q/t·m⌉ into the first component
//! of a ciphertext without ever forming the multiprecision product. For each
//! coefficient m_i the rounding correction is
//! fix = ⌊((Q mod t)·m_i + (t+1)/2) / t⌋, and per limb the contribution is
//! m_i·(⌊Q/t⌋ mod q_j) + fix.

use crate::context::ContextData;
use crate::plaintext::Plaintext;
use crate::ring::modular::{add_mod, multiply_add_operand_mod, sub_mod};

fn scaled_coefficient(
    value: u64,
    context_data: &ContextData,
    limb_index: usize,
) -> (u64, &crate::ring::modular::Modulus) {
    let parms = context_data.parms();
    let modulus = &parms.coeff_modulus()[limb_index];
    let t = parms.plain_modulus().unwrap().value();
    let q_mod_t = context_data.coeff_modulus_mod_plain_modulus();

    let numerator = value as u128 * q_mod_t as u128 + context_data.plain_upper_half_threshold() as u128;
    let fix = (numerator / t as u128) as u64;
    let scaled = multiply_add_operand_mod(
        modulus.reduce(value),
        &context_data.coeff_div_plain_modulus()[limb_index],
        modulus.reduce(fix),
        modulus,
    );
    (scaled, modulus)
}

/// destination += round(Q/t · plain), limb by limb. `destination` is one
/// RNS polynomial of L·N words in coefficient form.
pub(crate) fn multiply_add_plain_with_scaling_variant(
    plain: &Plaintext,
    context_data: &ContextData,
    destination: &mut [u64],
) {
    let n = context_data.parms().poly_modulus_degree();
    let limb_count = context_data.parms().coeff_modulus().len();
    debug_assert_eq!(destination.len(), limb_count * n);
    for j in 0..limb_count {
        let limb = &mut destination[j * n..(j + 1) * n];
        for (i, &value) in plain.data().iter().enumerate() {
            let (scaled, modulus) = scaled_coefficient(value, context_data, j);
            limb[i] = add_mod(limb[i], scaled, modulus.value());
        }
    }
}

/// destination -= round(Q/t · plain), limb by limb.
pub(crate) fn multiply_sub_plain_with_scaling_variant(
    plain: &Plaintext,
    context_data: &ContextData,
    destination: &mut [u64],
) {
    let n = context_data.parms().poly_modulus_degree();
    let limb_count = context_data.parms().coeff_modulus().len();
    debug_assert_eq!(destination.len(), limb_count * n);
    for j in 0..limb_count {
        let limb = &mut destination[j * n..(j + 1) * n];
        for (i, &value) in plain.data().iter().enumerate() {
            let (scaled, modulus) = scaled_coefficient(value, context_data, j);
            limb[i] = sub_mod(limb[i], scaled, modulus.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::params::{coeff_modulus_create, EncryptionParams};
    use num_bigint::BigUint;
    use num_traits::ToPrimitive;

    #[test]
    fn test_scaling_matches_multiprecision() {
        let n = 16usize;
        let moduli = coeff_modulus_create(n, &[30, 30]).unwrap();
        let parms = EncryptionParams::bfv(n, moduli, 97).unwrap();
        let context = Context::new(parms).unwrap();
        let cd = context.first_context_data();

        let q: BigUint = cd
            .parms()
            .coeff_modulus()
            .iter()
            .fold(BigUint::from(1u8), |acc, m| acc * m.value());
        let t = 97u64;

        let plain = Plaintext::from_coeffs(vec![5, 0, 96, 1]);
        let limbs = cd.parms().coeff_modulus().len();
        let mut dest = vec![0u64; limbs * n];
        multiply_add_plain_with_scaling_variant(&plain, &cd, &mut dest);

        for (i, &m_i) in plain.data().iter().enumerate() {
            // round(Q·m/t) computed exactly, rounding half away from zero
            let exact = (&q * m_i + (t + 1) / 2) / t;
            for (j, modulus) in cd.parms().coeff_modulus().iter().enumerate() {
                let expected = (&exact % modulus.value()).to_u64().unwrap();
                assert_eq!(dest[j * n + i], expected, "coeff {i}, limb {j}");
            }
        }
    }

    #[test]
    fn test_add_then_sub_is_identity() {
        let n = 16usize;
        let moduli = coeff_modulus_create(n, &[30, 30]).unwrap();
        let parms = EncryptionParams::bfv(n, moduli, 97).unwrap();
        let context = Context::new(parms).unwrap();
        let cd = context.first_context_data();

        let plain = Plaintext::from_coeffs(vec![1, 2, 3, 4, 5]);
        let limbs = cd.parms().coeff_modulus().len();
        let mut dest = vec![0u64; limbs * n];
        multiply_add_plain_with_scaling_variant(&plain, &cd, &mut dest);
        multiply_sub_plain_with_scaling_variant(&plain, &cd, &mut dest);
        assert!(dest.iter().all(|&x| x == 0));
    }
}
