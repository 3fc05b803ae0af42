//! Negacyclic number-theoretic transform over a single word-sized prime.
//!
//! Forward and inverse transforms come in two flavors: the plain variants
//! return fully reduced coefficients in [0, q); the lazy variants skip the
//! final normalization and leave values in [0, 4q) (forward) or [0, 2q)
//! (inverse), which the multiplication and key-switching pipelines exploit.
//!
//! Twiddle factors are powers of a primitive 2n-th root ψ stored in
//! bit-reversed order with Shoup quotients, so each butterfly costs one
//! multiply-high and one correction. After the forward transform, position i
//! holds the evaluation at ψ^(2·rev(i)+1); the Galois permutation tables and
//! the batching index maps assume exactly this ordering.

use crate::error::{LeveeError, Result};
use crate::ring::modular::{
    inv_mod, mul_operand_lazy, pow_mod, reverse_bits, Modulus, MultiplyOperand,
};

#[derive(Clone, Debug)]
pub struct NttTables {
    modulus: Modulus,
    coeff_count: usize,
    coeff_count_power: u32,
    root: u64,
    root_powers: Vec<MultiplyOperand>,
    inv_root_powers: Vec<MultiplyOperand>,
    inv_degree: MultiplyOperand,
}

impl NttTables {
    pub fn new(coeff_count_power: u32, modulus: &Modulus) -> Result<Self> {
        let n = 1usize << coeff_count_power;
        let q = modulus.value();
        if (q - 1) % (2 * n as u64) != 0 {
            return Err(LeveeError::InvalidParam(format!(
                "modulus {q} does not support an NTT of degree {n}"
            )));
        }

        let root = find_minimal_primitive_root(n, modulus)?;
        let inv_root = inv_mod(root, q).ok_or_else(|| {
            LeveeError::InvalidParam("2n-th root of unity is not invertible".into())
        })?;

        // root_powers[rev(i)] = ψ^i
        let mut root_powers = vec![MultiplyOperand::new(1, modulus); n];
        let mut power = 1u64;
        for i in 1..n {
            power = crate::ring::modular::mul_mod(power, root, modulus);
            root_powers[reverse_bits(i, coeff_count_power)] = MultiplyOperand::new(power, modulus);
        }

        // inv_root_powers[rev(i - 1) + 1] = ψ^{-i}; consumed sequentially by
        // the Gentleman-Sande stages of the inverse transform.
        let mut inv_root_powers = vec![MultiplyOperand::new(1, modulus); n];
        let mut power = 1u64;
        for i in 1..n {
            power = crate::ring::modular::mul_mod(power, inv_root, modulus);
            inv_root_powers[reverse_bits(i - 1, coeff_count_power) + 1] =
                MultiplyOperand::new(power, modulus);
        }

        let inv_degree_value = inv_mod(n as u64 % q, q).ok_or_else(|| {
            LeveeError::InvalidParam("polynomial degree is not invertible mod q".into())
        })?;
        let inv_degree = MultiplyOperand::new(inv_degree_value, modulus);

        Ok(Self {
            modulus: modulus.clone(),
            coeff_count: n,
            coeff_count_power,
            root,
            root_powers,
            inv_root_powers,
            inv_degree,
        })
    }

    #[inline]
    pub fn modulus(&self) -> &Modulus {
        &self.modulus
    }

    #[inline]
    pub fn coeff_count(&self) -> usize {
        self.coeff_count
    }

    #[inline]
    pub fn coeff_count_power(&self) -> u32 {
        self.coeff_count_power
    }

    #[inline]
    pub fn root(&self) -> u64 {
        self.root
    }

    /// Forward transform with lazy reduction: input in [0, q), output in
    /// [0, 4q).
    pub fn forward_lazy(&self, operand: &mut [u64]) {
        debug_assert_eq!(operand.len(), self.coeff_count);
        let n = self.coeff_count;
        let q = self.modulus.value();
        let two_q = q << 1;

        let mut t = n;
        let mut m = 1;
        while m < n {
            t >>= 1;
            for i in 0..m {
                let w = &self.root_powers[m + i];
                let j1 = 2 * i * t;
                for j in j1..j1 + t {
                    // Harvey butterfly: (x, y) -> (x + Wy, x - Wy) mod 4q
                    let mut u = operand[j];
                    if u >= two_q {
                        u -= two_q;
                    }
                    let v = mul_operand_lazy(operand[j + t], w, &self.modulus);
                    operand[j] = u + v;
                    operand[j + t] = u + two_q - v;
                }
            }
            m <<= 1;
        }
    }

    /// Forward transform, fully reduced output in [0, q).
    pub fn forward(&self, operand: &mut [u64]) {
        self.forward_lazy(operand);
        let q = self.modulus.value();
        let two_q = q << 1;
        for x in operand.iter_mut() {
            if *x >= two_q {
                *x -= two_q;
            }
            if *x >= q {
                *x -= q;
            }
        }
    }

    /// Inverse transform with lazy reduction: input in [0, 2q), output in
    /// [0, 2q).
    pub fn inverse_lazy(&self, operand: &mut [u64]) {
        debug_assert_eq!(operand.len(), self.coeff_count);
        let n = self.coeff_count;
        let q = self.modulus.value();
        let two_q = q << 1;

        let mut root_index = 1usize;
        let mut gap = 1usize;
        let mut m = n >> 1;
        while m >= 1 {
            for i in 0..m {
                let w = &self.inv_root_powers[root_index];
                root_index += 1;
                let offset = 2 * i * gap;
                for j in offset..offset + gap {
                    // Gentleman-Sande butterfly: (x, y) -> (x + y, (x - y)·W)
                    let u = operand[j];
                    let v = operand[j + gap];
                    let mut s = u + v;
                    if s >= two_q {
                        s -= two_q;
                    }
                    operand[j] = s;
                    operand[j + gap] = mul_operand_lazy(u + two_q - v, w, &self.modulus);
                }
            }
            gap <<= 1;
            m >>= 1;
        }

        // Fold in n^{-1}
        for x in operand.iter_mut() {
            *x = mul_operand_lazy(*x, &self.inv_degree, &self.modulus);
        }
    }

    /// Inverse transform, fully reduced output in [0, q).
    pub fn inverse(&self, operand: &mut [u64]) {
        self.inverse_lazy(operand);
        let q = self.modulus.value();
        for x in operand.iter_mut() {
            if *x >= q {
                *x -= q;
            }
        }
    }
}

/// A primitive 2n-th root of unity mod q, found by powering small group
/// elements to (q-1)/2n and checking that the order is exactly 2n.
fn find_minimal_primitive_root(n: usize, modulus: &Modulus) -> Result<u64> {
    let q = modulus.value();
    let exponent = (q - 1) / (2 * n as u64);
    for candidate in 2..1024u64 {
        let psi = pow_mod(candidate, exponent, modulus);
        // ψ has order dividing 2n; order exactly 2n iff ψ^n = -1
        if pow_mod(psi, n as u64, modulus) == q - 1 {
            return Ok(psi);
        }
    }
    Err(LeveeError::InvalidParam(format!(
        "no primitive 2n-th root of unity mod {q}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::modular::{add_mod, mul_mod, sub_mod};

    fn tables(n_power: u32, q: u64) -> NttTables {
        NttTables::new(n_power, &Modulus::new(q).unwrap()).unwrap()
    }

    /// Schoolbook negacyclic product used as ground truth.
    fn negacyclic_mul(a: &[u64], b: &[u64], m: &Modulus) -> Vec<u64> {
        let n = a.len();
        let mut result = vec![0u64; n];
        for i in 0..n {
            for j in 0..n {
                let prod = mul_mod(a[i], b[j], m);
                if i + j < n {
                    result[i + j] = add_mod(result[i + j], prod, m.value());
                } else {
                    result[i + j - n] = sub_mod(result[i + j - n], prod, m.value());
                }
            }
        }
        result
    }

    #[test]
    fn test_roundtrip() {
        let t = tables(4, 65537);
        let original: Vec<u64> = (1..=16).collect();
        let mut v = original.clone();
        t.forward(&mut v);
        assert_ne!(v, original);
        t.inverse(&mut v);
        assert_eq!(v, original);
    }

    #[test]
    fn test_roundtrip_60bit() {
        let t = tables(5, 1152921504606584833);
        let original: Vec<u64> = (0..32).map(|i| i * 1234567 + 42).collect();
        let mut v = original.clone();
        t.forward(&mut v);
        t.inverse(&mut v);
        assert_eq!(v, original);
    }

    #[test]
    fn test_lazy_bounds() {
        let q = 65537u64;
        let t = tables(4, q);
        let mut v: Vec<u64> = (1..=16).collect();
        t.forward_lazy(&mut v);
        assert!(v.iter().all(|&x| x < 4 * q));
        let mut w = v.clone();
        for x in w.iter_mut() {
            *x %= q;
        }
        t.inverse_lazy(&mut w);
        assert!(w.iter().all(|&x| x < 2 * q));
        for (i, x) in w.iter().enumerate() {
            assert_eq!(x % q, (i as u64) + 1);
        }
    }

    #[test]
    fn test_pointwise_matches_schoolbook() {
        let q = 65537u64;
        let m = Modulus::new(q).unwrap();
        let t = tables(3, q);
        let a = vec![1u64, 2, 3, 4, 5, 6, 7, 8];
        let b = vec![8u64, 7, 6, 5, 4, 3, 2, 1];
        let expected = negacyclic_mul(&a, &b, &m);

        let mut a_ntt = a.clone();
        let mut b_ntt = b.clone();
        t.forward(&mut a_ntt);
        t.forward(&mut b_ntt);
        let mut c: Vec<u64> = a_ntt
            .iter()
            .zip(b_ntt.iter())
            .map(|(&x, &y)| mul_mod(x, y, &m))
            .collect();
        t.inverse(&mut c);
        assert_eq!(c, expected);
    }

    #[test]
    fn test_negacyclic_wraparound() {
        // X^{n-1} · X = X^n = -1
        let q = 65537u64;
        let m = Modulus::new(q).unwrap();
        let t = tables(3, q);
        let mut a = vec![0u64; 8];
        a[7] = 1;
        let mut b = vec![0u64; 8];
        b[1] = 1;
        t.forward(&mut a);
        t.forward(&mut b);
        let mut c: Vec<u64> = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| mul_mod(x, y, &m))
            .collect();
        t.inverse(&mut c);
        assert_eq!(c[0], q - 1);
        assert!(c[1..].iter().all(|&x| x == 0));
    }

    #[test]
    fn test_root_properties() {
        let t = tables(4, 65537);
        let m = Modulus::new(65537).unwrap();
        let psi = t.root();
        assert_eq!(pow_mod(psi, 16, &m), 65536);
        assert_eq!(pow_mod(psi, 32, &m), 1);
    }
}
