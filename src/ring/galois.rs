//! Application of the Galois automorphisms X ↦ X^e of Z_q[X]/(X^n + 1),
//! for odd e with 0 < e < 2n, in both coefficient and NTT representation,
//! and the translation between batching rotation steps and Galois elements.

use crate::error::{LeveeError, Result};
use crate::ring::modular::{neg_mod, reverse_bits, Modulus};

/// Generator of the rotation subgroup of (Z/2nZ)*; 3 generates the
/// n/2-element subgroup whose action on slots is a cyclic row rotation.
const GENERATOR: u64 = 3;

#[derive(Clone, Debug)]
pub struct GaloisTool {
    coeff_count: usize,
    coeff_count_power: u32,
}

impl GaloisTool {
    pub fn new(coeff_count_power: u32) -> Self {
        Self {
            coeff_count: 1usize << coeff_count_power,
            coeff_count_power,
        }
    }

    /// The Galois element performing a cyclic row rotation by `step` slots;
    /// step 0 maps to 2n-1, the column-swap (conjugation) element.
    pub fn get_elt_from_step(&self, step: i32) -> Result<u64> {
        let n = self.coeff_count as u64;
        let m = n << 1;
        if step == 0 {
            return Ok(m - 1);
        }
        let row_size = n >> 1;
        let pos_step = (step as i64).unsigned_abs();
        if pos_step >= row_size {
            return Err(LeveeError::InvalidArgument(format!(
                "step count {step} too large for {row_size} slots per row"
            )));
        }
        let exponent = if step < 0 {
            row_size - pos_step
        } else {
            pos_step
        };
        let mut elt = 1u64;
        for _ in 0..exponent {
            elt = (elt * GENERATOR) & (m - 1);
        }
        Ok(elt)
    }

    pub fn get_elts_from_steps(&self, steps: &[i32]) -> Result<Vec<u64>> {
        steps.iter().map(|&s| self.get_elt_from_step(s)).collect()
    }

    /// Apply X ↦ X^e to one coefficient-domain limb. Not in-place: each input
    /// coefficient is routed (with a sign flip past X^n) to a fresh slot.
    pub fn apply_galois(&self, operand: &[u64], elt: u64, modulus: &Modulus, result: &mut [u64]) {
        let n = self.coeff_count;
        debug_assert_eq!(operand.len(), n);
        debug_assert_eq!(result.len(), n);
        debug_assert!(elt & 1 == 1 && (elt as usize) < 2 * n);
        let m_mask = (2 * n - 1) as u64;
        let q = modulus.value();
        for (i, &c) in operand.iter().enumerate() {
            let index_raw = (i as u64).wrapping_mul(elt) & m_mask;
            let index = index_raw as usize;
            if index < n {
                result[index] = c;
            } else {
                result[index - n] = neg_mod(c, q);
            }
        }
    }

    /// Apply X ↦ X^e to an NTT-domain limb: a pure permutation of the
    /// evaluation points ψ^(2·rev(i)+1).
    pub fn apply_galois_ntt(&self, operand: &[u64], elt: u64, result: &mut [u64]) {
        let n = self.coeff_count;
        debug_assert_eq!(operand.len(), n);
        debug_assert_eq!(result.len(), n);
        let logn = self.coeff_count_power;
        let mask = (n - 1) as u64;
        for (i, r) in result.iter_mut().enumerate() {
            let reversed = reverse_bits(i, logn) as u64;
            let index_raw = (elt.wrapping_mul(2 * reversed + 1) >> 1) & mask;
            *r = operand[reverse_bits(index_raw as usize, logn)];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::ntt::NttTables;

    #[test]
    fn test_elt_from_step() {
        let tool = GaloisTool::new(3); // n = 8, m = 16
        assert_eq!(tool.get_elt_from_step(0).unwrap(), 15);
        assert_eq!(tool.get_elt_from_step(1).unwrap(), 3);
        assert_eq!(tool.get_elt_from_step(2).unwrap(), 9);
        // -1 step is the 3^(row_size - 1) element
        assert_eq!(tool.get_elt_from_step(-1).unwrap(), 3u64.pow(3) & 15);
        assert!(tool.get_elt_from_step(4).is_err());
    }

    #[test]
    fn test_apply_galois_coeff() {
        // X ↦ X^3 on 1 + X + X^2 + X^3 in Z_17[X]/(X^4+1):
        // X^2 ↦ X^6 = -X^2, X^3 ↦ X^9 = X
        let tool = GaloisTool::new(2);
        let m = Modulus::new(17).unwrap();
        let input = vec![1u64, 1, 1, 1];
        let mut out = vec![0u64; 4];
        tool.apply_galois(&input, 3, &m, &mut out);
        assert_eq!(out, vec![1, 1, 16, 1]);
    }

    #[test]
    fn test_galois_identity() {
        let tool = GaloisTool::new(3);
        let m = Modulus::new(97).unwrap();
        let input: Vec<u64> = (0..8).collect();
        let mut out = vec![0u64; 8];
        tool.apply_galois(&input, 1, &m, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn test_ntt_domain_matches_coeff_domain() {
        // NTT(σ_e(f)) must equal the NTT-domain permutation of NTT(f).
        let power = 4u32;
        let n = 1usize << power;
        let q = 65537u64;
        let modulus = Modulus::new(q).unwrap();
        let tables = NttTables::new(power, &modulus).unwrap();
        let tool = GaloisTool::new(power);

        let input: Vec<u64> = (0..n as u64).map(|i| (i * 31 + 7) % q).collect();
        for elt in [3u64, 9, 2 * n as u64 - 1] {
            let mut via_coeff = vec![0u64; n];
            tool.apply_galois(&input, elt, &modulus, &mut via_coeff);
            tables.forward(&mut via_coeff);

            let mut input_ntt = input.clone();
            tables.forward(&mut input_ntt);
            let mut via_ntt = vec![0u64; n];
            tool.apply_galois_ntt(&input_ntt, elt, &mut via_ntt);

            assert_eq!(via_coeff, via_ntt, "elt = {elt}");
        }
    }
}
