//! Residue number system bases, fast base conversion, and the auxiliary-base
//! machinery behind full-RNS BFV multiplication (Bajard-Eynard-Hasan-Zucca)
//! and modulus switching.
//!
//! All polynomial arguments are flat slices of `size × n` words, one limb of
//! n coefficients per base modulus, in base order.

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

use crate::error::{LeveeError, Result};
use crate::ring::modular::{
    generate_ntt_primes, inv_mod, mul_operand_mod, sub_mod, Modulus, MultiplyOperand,
};
use crate::ring::ntt::NttTables;
use crate::ring::poly::{multiply_poly_scalar, reduce_poly, sub_poly_inplace};

/// An ordered RNS base q_0, …, q_{L-1} of pairwise coprime moduli with the
/// precomputed punctured products Q/q_i and their inverses mod q_i.
#[derive(Clone, Debug)]
pub struct RnsBase {
    base: Vec<Modulus>,
    base_prod: BigUint,
    punctured_prod: Vec<BigUint>,
    inv_punctured_prod_mod_base: Vec<MultiplyOperand>,
}

impl RnsBase {
    pub fn new(moduli: &[Modulus]) -> Result<Self> {
        if moduli.is_empty() {
            return Err(LeveeError::InvalidParam("RNS base cannot be empty".into()));
        }
        for i in 0..moduli.len() {
            for j in 0..i {
                if gcd(moduli[i].value(), moduli[j].value()) != 1 {
                    return Err(LeveeError::InvalidParam(
                        "RNS base moduli must be pairwise coprime".into(),
                    ));
                }
            }
        }

        let base_prod = moduli
            .iter()
            .fold(BigUint::one(), |acc, m| acc * m.value());
        let punctured_prod: Vec<BigUint> =
            moduli.iter().map(|m| &base_prod / m.value()).collect();
        let inv_punctured_prod_mod_base = moduli
            .iter()
            .zip(punctured_prod.iter())
            .map(|(m, p)| {
                let reduced = (p % m.value()).to_u64().unwrap();
                let inv = inv_mod(reduced, m.value()).ok_or_else(|| {
                    LeveeError::InvalidParam("punctured product is not invertible".into())
                })?;
                Ok(MultiplyOperand::new(inv, m))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            base: moduli.to_vec(),
            base_prod,
            punctured_prod,
            inv_punctured_prod_mod_base,
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.base.len()
    }

    #[inline]
    pub fn base(&self) -> &[Modulus] {
        &self.base
    }

    #[inline]
    pub fn modulus(&self, index: usize) -> &Modulus {
        &self.base[index]
    }

    #[inline]
    pub fn prod(&self) -> &BigUint {
        &self.base_prod
    }

    /// Residues of a (multiprecision) integer in this base.
    pub fn decompose(&self, value: &BigUint) -> Vec<u64> {
        self.base
            .iter()
            .map(|m| (value % m.value()).to_u64().unwrap())
            .collect()
    }

    /// CRT composition of residues back into [0, Q).
    pub fn compose(&self, residues: &[u64]) -> BigUint {
        debug_assert_eq!(residues.len(), self.size());
        let mut acc = BigUint::zero();
        for (i, &r) in residues.iter().enumerate() {
            let t = mul_operand_mod(r, &self.inv_punctured_prod_mod_base[i], &self.base[i]);
            acc += &self.punctured_prod[i] * t;
        }
        acc % &self.base_prod
    }
}

/// Fast conversion of residue vectors from one base to another:
/// x ↦ Σ_i [x_i · (Q/q_i)^{-1}]_{q_i} · (Q/q_i) mod p_j, which equals
/// x + αQ mod p_j for some small α < L.
#[derive(Clone, Debug)]
pub struct BaseConverter {
    ibase: RnsBase,
    obase: RnsBase,
    // base_change_matrix[j][i] = (Q/q_i) mod p_j
    base_change_matrix: Vec<Vec<u64>>,
}

impl BaseConverter {
    pub fn new(ibase: &RnsBase, obase: &RnsBase) -> Self {
        let base_change_matrix = obase
            .base()
            .iter()
            .map(|p| {
                ibase
                    .punctured_prod
                    .iter()
                    .map(|q| (q % p.value()).to_u64().unwrap())
                    .collect()
            })
            .collect();
        Self {
            ibase: ibase.clone(),
            obase: obase.clone(),
            base_change_matrix,
        }
    }

    /// Convert `count` coefficients per limb from the input base to the
    /// output base. `input` is ibase.size()×count, `output` obase.size()×count.
    pub fn fast_convert_array(&self, input: &[u64], output: &mut [u64], count: usize) {
        let isize = self.ibase.size();
        let osize = self.obase.size();
        debug_assert_eq!(input.len(), isize * count);
        debug_assert_eq!(output.len(), osize * count);

        // temp[i][k] = [x_i · (Q/q_i)^{-1}]_{q_i}
        let mut temp = vec![0u64; isize * count];
        for i in 0..isize {
            let w = &self.ibase.inv_punctured_prod_mod_base[i];
            let m = &self.ibase.base[i];
            for k in 0..count {
                temp[i * count + k] = mul_operand_mod(input[i * count + k], w, m);
            }
        }

        for j in 0..osize {
            let p = &self.obase.base[j];
            let row = &self.base_change_matrix[j];
            let out = &mut output[j * count..(j + 1) * count];
            for k in 0..count {
                let mut acc = 0u128;
                for i in 0..isize {
                    acc += temp[i * count + k] as u128 * row[i] as u128;
                }
                out[k] = p.reduce_u128(acc);
            }
        }
    }
}

/// Per-level RNS toolbox: the working base q, the auxiliary base
/// Bsk = B ∪ {m_sk} with the Montgomery factor m̃ = 2^32, conversions between
/// them, and the divide-and-round primitives used by modulus switching.
#[derive(Clone, Debug)]
pub struct RnsTool {
    coeff_count: usize,
    base_q: RnsBase,
    base_b: RnsBase,
    base_bsk: RnsBase,
    base_bsk_m_tilde: RnsBase,
    base_q_to_bsk_conv: BaseConverter,
    base_q_to_m_tilde_conv: BaseConverter,
    base_b_to_q_conv: BaseConverter,
    base_b_to_m_sk_conv: BaseConverter,
    base_bsk_ntt_tables: Vec<NttTables>,
    m_tilde: Modulus,
    m_sk: Modulus,
    // m̃ mod q_i, used when lifting into the extended base
    m_tilde_mod_q: Vec<MultiplyOperand>,
    // Q^{-1} mod each Bsk modulus
    inv_prod_q_mod_bsk: Vec<MultiplyOperand>,
    // -(Q^{-1}) mod m̃
    neg_inv_prod_q_mod_m_tilde: MultiplyOperand,
    // B^{-1} mod m_sk
    inv_prod_b_mod_m_sk: MultiplyOperand,
    // m̃^{-1} mod each Bsk modulus
    inv_m_tilde_mod_bsk: Vec<MultiplyOperand>,
    // Q mod each Bsk modulus
    prod_q_mod_bsk: Vec<u64>,
    // B mod each q_i
    prod_b_mod_q: Vec<u64>,
    // q_last^{-1} mod q_i for i < L-1
    inv_q_last_mod_q: Vec<MultiplyOperand>,
}

/// Bit width of the auxiliary Bsk primes. Wide enough that ∏B · m_sk
/// dominates n·t·Q against the base q, per the BEHZ overflow analysis.
const BSK_PRIME_BIT_SIZE: u32 = 61;

impl RnsTool {
    pub fn new(coeff_count_power: u32, base_q: &RnsBase) -> Result<Self> {
        let coeff_count = 1usize << coeff_count_power;
        let base_q_size = base_q.size();
        let factor = 2 * coeff_count as u64;

        // Auxiliary base: |B| = |q| primes plus m_sk, all NTT-friendly and
        // coprime to q.
        let exclude: Vec<u64> = base_q.base().iter().map(|m| m.value()).collect();
        let aux = generate_ntt_primes(BSK_PRIME_BIT_SIZE, base_q_size + 1, factor, &exclude)?;
        let aux: Vec<Modulus> = aux
            .into_iter()
            .map(Modulus::new)
            .collect::<Result<Vec<_>>>()?;
        let (b_primes, m_sk_prime) = aux.split_at(base_q_size);
        let m_sk = m_sk_prime[0].clone();
        let m_tilde = Modulus::new(1u64 << 32)?;

        let base_b = RnsBase::new(b_primes)?;
        let mut bsk_moduli = b_primes.to_vec();
        bsk_moduli.push(m_sk.clone());
        let base_bsk = RnsBase::new(&bsk_moduli)?;
        let mut bsk_m_tilde_moduli = bsk_moduli.clone();
        bsk_m_tilde_moduli.push(m_tilde.clone());
        let base_bsk_m_tilde = RnsBase::new(&bsk_m_tilde_moduli)?;

        let base_m_tilde = RnsBase::new(std::slice::from_ref(&m_tilde))?;
        let base_m_sk = RnsBase::new(std::slice::from_ref(&m_sk))?;

        let base_q_to_bsk_conv = BaseConverter::new(base_q, &base_bsk);
        let base_q_to_m_tilde_conv = BaseConverter::new(base_q, &base_m_tilde);
        let base_b_to_q_conv = BaseConverter::new(&base_b, base_q);
        let base_b_to_m_sk_conv = BaseConverter::new(&base_b, &base_m_sk);

        let base_bsk_ntt_tables = base_bsk
            .base()
            .iter()
            .map(|m| NttTables::new(coeff_count_power, m))
            .collect::<Result<Vec<_>>>()?;

        let prod_q = base_q.prod();
        let prod_b = base_b.prod();

        let m_tilde_mod_q = base_q
            .base()
            .iter()
            .map(|m| MultiplyOperand::new(m.reduce(m_tilde.value()), m))
            .collect();

        let inv_prod_q_mod_bsk = base_bsk
            .base()
            .iter()
            .map(|m| {
                let q_mod = (prod_q % m.value()).to_u64().unwrap();
                let inv = inv_mod(q_mod, m.value()).ok_or_else(|| {
                    LeveeError::InvalidParam("Q is not invertible in the auxiliary base".into())
                })?;
                Ok(MultiplyOperand::new(inv, m))
            })
            .collect::<Result<Vec<_>>>()?;

        let q_mod_m_tilde = (prod_q % m_tilde.value()).to_u64().unwrap();
        let inv_q_m_tilde = inv_mod(q_mod_m_tilde, m_tilde.value()).ok_or_else(|| {
            LeveeError::InvalidParam("Q is not invertible mod m_tilde".into())
        })?;
        let neg_inv_prod_q_mod_m_tilde = MultiplyOperand::new(
            crate::ring::modular::neg_mod(inv_q_m_tilde, m_tilde.value()),
            &m_tilde,
        );

        let b_mod_m_sk = (prod_b % m_sk.value()).to_u64().unwrap();
        let inv_b_m_sk = inv_mod(b_mod_m_sk, m_sk.value()).ok_or_else(|| {
            LeveeError::InvalidParam("B is not invertible mod m_sk".into())
        })?;
        let inv_prod_b_mod_m_sk = MultiplyOperand::new(inv_b_m_sk, &m_sk);

        let inv_m_tilde_mod_bsk = base_bsk
            .base()
            .iter()
            .map(|m| {
                let inv = inv_mod(m.reduce(m_tilde.value()), m.value()).ok_or_else(|| {
                    LeveeError::InvalidParam("m_tilde is not invertible in Bsk".into())
                })?;
                Ok(MultiplyOperand::new(inv, m))
            })
            .collect::<Result<Vec<_>>>()?;

        let prod_q_mod_bsk = base_bsk
            .base()
            .iter()
            .map(|m| (prod_q % m.value()).to_u64().unwrap())
            .collect();

        let prod_b_mod_q = base_q
            .base()
            .iter()
            .map(|m| (prod_b % m.value()).to_u64().unwrap())
            .collect();

        let q_last = base_q.modulus(base_q_size - 1);
        let inv_q_last_mod_q = base_q.base()[..base_q_size - 1]
            .iter()
            .map(|m| {
                let inv = inv_mod(m.reduce(q_last.value()), m.value()).ok_or_else(|| {
                    LeveeError::InvalidParam("q_last is not invertible mod q_i".into())
                })?;
                Ok(MultiplyOperand::new(inv, m))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            coeff_count,
            base_q: base_q.clone(),
            base_b,
            base_bsk,
            base_bsk_m_tilde,
            base_q_to_bsk_conv,
            base_q_to_m_tilde_conv,
            base_b_to_q_conv,
            base_b_to_m_sk_conv,
            base_bsk_ntt_tables,
            m_tilde,
            m_sk,
            m_tilde_mod_q,
            inv_prod_q_mod_bsk,
            neg_inv_prod_q_mod_m_tilde,
            inv_prod_b_mod_m_sk,
            inv_m_tilde_mod_bsk,
            prod_q_mod_bsk,
            prod_b_mod_q,
            inv_q_last_mod_q,
        })
    }

    #[inline]
    pub fn base_q(&self) -> &RnsBase {
        &self.base_q
    }

    #[inline]
    pub fn base_bsk(&self) -> &RnsBase {
        &self.base_bsk
    }

    #[inline]
    pub fn base_bsk_m_tilde(&self) -> &RnsBase {
        &self.base_bsk_m_tilde
    }

    #[inline]
    pub fn base_bsk_ntt_tables(&self) -> &[NttTables] {
        &self.base_bsk_ntt_tables
    }

    #[inline]
    pub fn inv_q_last_mod_q(&self) -> &[MultiplyOperand] {
        &self.inv_q_last_mod_q
    }

    /// Lift a polynomial from base q into base Bsk ∪ {m̃}, pre-multiplied by
    /// m̃ so that `sm_mrq` can later remove the conversion overflow.
    ///
    /// `input` is |q|×n, `destination` (|Bsk|+1)×n with the m̃ limb last.
    pub fn fastbconv_m_tilde(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let q_size = self.base_q.size();
        let bsk_size = self.base_bsk.size();
        debug_assert_eq!(input.len(), q_size * n);
        debug_assert_eq!(destination.len(), (bsk_size + 1) * n);

        // temp = m̃·input mod q
        let mut temp = vec![0u64; q_size * n];
        for i in 0..q_size {
            multiply_poly_scalar(
                &input[i * n..(i + 1) * n],
                &self.m_tilde_mod_q[i],
                self.base_q.modulus(i),
                &mut temp[i * n..(i + 1) * n],
            );
        }

        let (bsk_part, m_tilde_part) = destination.split_at_mut(bsk_size * n);
        self.base_q_to_bsk_conv.fast_convert_array(&temp, bsk_part, n);
        self.base_q_to_m_tilde_conv
            .fast_convert_array(&temp, m_tilde_part, n);
    }

    /// Small Montgomery reduction mod q: removes the multiple-of-q overflow
    /// introduced by fast conversion, dividing out m̃.
    ///
    /// `input` is (|Bsk|+1)×n (m̃ limb last), `destination` |Bsk|×n.
    pub fn sm_mrq(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let bsk_size = self.base_bsk.size();
        debug_assert_eq!(input.len(), (bsk_size + 1) * n);
        debug_assert_eq!(destination.len(), bsk_size * n);

        let m_tilde_value = self.m_tilde.value();
        let m_tilde_half = m_tilde_value >> 1;
        let m_tilde_limb = &input[bsk_size * n..];

        for j in 0..bsk_size {
            let m = self.base_bsk.modulus(j);
            let prod_q = self.prod_q_mod_bsk[j];
            let inv_m_tilde = &self.inv_m_tilde_mod_bsk[j];
            let in_limb = &input[j * n..(j + 1) * n];
            let out = &mut destination[j * n..(j + 1) * n];
            for k in 0..n {
                // r ≡ -x/Q mod m̃, taken centered
                let r = mul_operand_mod(
                    m_tilde_limb[k],
                    &self.neg_inv_prod_q_mod_m_tilde,
                    &self.m_tilde,
                );
                let r_centered = if r >= m_tilde_half {
                    r + m.value() - m_tilde_value
                } else {
                    r
                };
                let t = m.reduce_u128(prod_q as u128 * r_centered as u128 + in_limb[k] as u128);
                out[k] = mul_operand_mod(t, inv_m_tilde, m);
            }
        }
    }

    /// ⌊x/Q⌋ in base Bsk for x given in the combined base q ∪ Bsk.
    ///
    /// `input` is (|q|+|Bsk|)×n with the q limbs first, `destination` |Bsk|×n.
    pub fn fast_floor(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let q_size = self.base_q.size();
        let bsk_size = self.base_bsk.size();
        debug_assert_eq!(input.len(), (q_size + bsk_size) * n);
        debug_assert_eq!(destination.len(), bsk_size * n);

        self.base_q_to_bsk_conv
            .fast_convert_array(&input[..q_size * n], destination, n);

        for j in 0..bsk_size {
            let m = self.base_bsk.modulus(j);
            let in_limb = &input[(q_size + j) * n..(q_size + j + 1) * n];
            let out = &mut destination[j * n..(j + 1) * n];
            for k in 0..n {
                // (x - x mod Q)/Q, computed as (x_Bsk - conv(x_q))·Q^{-1}
                let diff = sub_mod(in_limb[k], out[k], m.value());
                out[k] = mul_operand_mod(diff, &self.inv_prod_q_mod_bsk[j], m);
            }
        }
    }

    /// Shenoy-Kumaresan conversion from base Bsk back to base q, exact for
    /// inputs whose magnitude stays below B·m_sk/2.
    ///
    /// `input` is |Bsk|×n (m_sk limb last), `destination` |q|×n (overwritten).
    pub fn fastbconv_sk(&self, input: &[u64], destination: &mut [u64]) {
        let n = self.coeff_count;
        let q_size = self.base_q.size();
        let b_size = self.base_b.size();
        debug_assert_eq!(input.len(), (b_size + 1) * n);
        debug_assert_eq!(destination.len(), q_size * n);

        self.base_b_to_q_conv
            .fast_convert_array(&input[..b_size * n], destination, n);

        // α_sk = (conv_B→m_sk(x) - x_m_sk)·B^{-1} mod m_sk, centered
        let mut temp = vec![0u64; n];
        self.base_b_to_m_sk_conv
            .fast_convert_array(&input[..b_size * n], &mut temp, n);
        let m_sk_value = self.m_sk.value();
        let m_sk_half = m_sk_value >> 1;
        let m_sk_limb = &input[b_size * n..];
        for k in 0..n {
            let diff = sub_mod(temp[k], m_sk_limb[k], m_sk_value);
            temp[k] = mul_operand_mod(diff, &self.inv_prod_b_mod_m_sk, &self.m_sk);
        }

        for i in 0..q_size {
            let m = self.base_q.modulus(i);
            let prod_b = self.prod_b_mod_q[i];
            let out = &mut destination[i * n..(i + 1) * n];
            for k in 0..n {
                let alpha = temp[k];
                if alpha > m_sk_half {
                    // negative correction: x += B·(m_sk - α)
                    let add = m.reduce_u128(prod_b as u128 * (m_sk_value - alpha) as u128);
                    out[k] = crate::ring::modular::add_mod(out[k], add, m.value());
                } else {
                    let sub = m.reduce_u128(prod_b as u128 * alpha as u128);
                    out[k] = sub_mod(out[k], sub, m.value());
                }
            }
        }
    }

    /// Divide a coefficient-domain polynomial by the last prime of base q,
    /// rounding, leaving a valid polynomial in the first L-1 limbs.
    pub fn divide_and_round_q_last_inplace(&self, input: &mut [u64]) {
        let n = self.coeff_count;
        let q_size = self.base_q.size();
        debug_assert!(q_size > 1);
        debug_assert_eq!(input.len(), q_size * n);

        let q_last = self.base_q.modulus(q_size - 1);
        let half = q_last.value() >> 1;

        let (head, last) = input.split_at_mut((q_size - 1) * n);
        // Add q_last/2 so that flooring becomes rounding
        for x in last.iter_mut() {
            *x = crate::ring::modular::add_mod(*x, half, q_last.value());
        }

        let mut temp = vec![0u64; n];
        for i in 0..q_size - 1 {
            let m = self.base_q.modulus(i);
            reduce_poly(last, m, &mut temp);
            let half_mod = m.reduce(half);
            for x in temp.iter_mut() {
                *x = sub_mod(*x, half_mod, m.value());
            }
            let limb = &mut head[i * n..(i + 1) * n];
            sub_poly_inplace(limb, &temp, m);
            crate::ring::poly::multiply_poly_scalar_inplace(limb, &self.inv_q_last_mod_q[i], m);
        }
    }

    /// NTT-domain variant of [`Self::divide_and_round_q_last_inplace`]:
    /// the last limb is taken out of NTT form, divided out, and the
    /// correction re-transformed so the surviving limbs stay in NTT form.
    pub fn divide_and_round_q_last_ntt_inplace(
        &self,
        input: &mut [u64],
        rns_ntt_tables: &[NttTables],
    ) {
        let n = self.coeff_count;
        let q_size = self.base_q.size();
        debug_assert!(q_size > 1);
        debug_assert_eq!(input.len(), q_size * n);
        debug_assert_eq!(rns_ntt_tables.len(), q_size);

        let q_last = self.base_q.modulus(q_size - 1);
        let half = q_last.value() >> 1;

        let (head, last) = input.split_at_mut((q_size - 1) * n);
        rns_ntt_tables[q_size - 1].inverse(last);
        for x in last.iter_mut() {
            *x = crate::ring::modular::add_mod(*x, half, q_last.value());
        }

        let mut temp = vec![0u64; n];
        for i in 0..q_size - 1 {
            let m = self.base_q.modulus(i);
            reduce_poly(last, m, &mut temp);
            let half_mod = m.reduce(half);
            for x in temp.iter_mut() {
                *x = sub_mod(*x, half_mod, m.value());
            }
            rns_ntt_tables[i].forward(&mut temp);
            let limb = &mut head[i * n..(i + 1) * n];
            sub_poly_inplace(limb, &temp, m);
            crate::ring::poly::multiply_poly_scalar_inplace(limb, &self.inv_q_last_mod_q[i], m);
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use num_traits::ToPrimitive;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn base_from(values: &[u64]) -> RnsBase {
        let moduli: Vec<Modulus> = values.iter().map(|&v| Modulus::new(v).unwrap()).collect();
        RnsBase::new(&moduli).unwrap()
    }

    #[test]
    fn test_compose_decompose_roundtrip() {
        let base = base_from(&[65537, 114689, 147457]);
        let value = BigUint::from(123456789012345u64);
        let residues = base.decompose(&value);
        assert_eq!(base.compose(&residues), value);
    }

    #[test]
    fn test_base_conversion_membership() {
        // Fast conversion may add a multiple αQ with α < L; check membership.
        let ibase = base_from(&[65537, 114689]);
        let obase = base_from(&[147457, 163841]);
        let conv = BaseConverter::new(&ibase, &obase);

        let value = BigUint::from(987654321u64);
        let input = ibase.decompose(&value);
        let mut output = vec![0u64; 2];
        conv.fast_convert_array(&input, &mut output, 1);

        let q = ibase.prod();
        let found = (0..ibase.size() as u64 + 1).any(|alpha| {
            let shifted = &value + q * alpha;
            obase
                .base()
                .iter()
                .zip(output.iter())
                .all(|(m, &o)| (&shifted % m.value()).to_u64().unwrap() == o)
        });
        assert!(found);
    }

    #[test]
    fn test_montgomery_lift_is_exact() {
        // fastbconv_m_tilde followed by sm_mrq must reproduce x mod Bsk
        // exactly for x well below Q.
        let power = 3u32;
        let n = 1usize << power;
        let q_values =
            generate_ntt_primes(30, 2, 2 * n as u64, &[]).unwrap();
        let base = base_from(&q_values);
        let tool = RnsTool::new(power, &base).unwrap();

        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let bound = (base.prod() / 4u32).to_u64().unwrap_or(u64::MAX);
        let values: Vec<u64> = (0..n).map(|_| rng.random_range(0..bound)).collect();

        let mut input = vec![0u64; base.size() * n];
        for (i, m) in base.base().iter().enumerate() {
            for k in 0..n {
                input[i * n + k] = m.reduce(values[k]);
            }
        }

        let bsk_size = tool.base_bsk().size();
        let mut extended = vec![0u64; (bsk_size + 1) * n];
        tool.fastbconv_m_tilde(&input, &mut extended);
        let mut bsk = vec![0u64; bsk_size * n];
        tool.sm_mrq(&extended, &mut bsk);

        for (j, m) in tool.base_bsk().base().iter().enumerate() {
            for k in 0..n {
                assert_eq!(bsk[j * n + k], m.reduce(values[k]), "limb {j}, coeff {k}");
            }
        }
    }

    #[test]
    fn test_shenoy_kumaresan_roundtrip() {
        // Converting exact residues from Bsk back to q must be exact.
        let power = 3u32;
        let n = 1usize << power;
        let q_values = generate_ntt_primes(30, 2, 2 * n as u64, &[]).unwrap();
        let base = base_from(&q_values);
        let tool = RnsTool::new(power, &base).unwrap();

        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let values: Vec<u64> = (0..n).map(|_| rng.random_range(0..1u64 << 40)).collect();

        let bsk = tool.base_bsk();
        let mut input = vec![0u64; bsk.size() * n];
        for (j, m) in bsk.base().iter().enumerate() {
            for k in 0..n {
                input[j * n + k] = m.reduce(values[k]);
            }
        }
        let mut dest = vec![0u64; base.size() * n];
        tool.fastbconv_sk(&input, &mut dest);
        for (i, m) in base.base().iter().enumerate() {
            for k in 0..n {
                assert_eq!(dest[i * n + k], m.reduce(values[k]));
            }
        }
    }

    #[test]
    fn test_divide_and_round_q_last() {
        let power = 3u32;
        let n = 1usize << power;
        let q_values = generate_ntt_primes(30, 3, 2 * n as u64, &[]).unwrap();
        let base = base_from(&q_values);
        let tool = RnsTool::new(power, &base).unwrap();
        let q_last = base.modulus(base.size() - 1).value();

        // x = k·q_last + r with small r rounds to k
        for r in [0u64, 1, 5] {
            let k = 123456u64;
            let x = BigUint::from(k) * q_last + r;
            let mut input = vec![0u64; base.size() * n];
            for (i, m) in base.base().iter().enumerate() {
                input[i * n] = (&x % m.value()).to_u64().unwrap();
            }
            tool.divide_and_round_q_last_inplace(&mut input);
            for (i, m) in base.base()[..base.size() - 1].iter().enumerate() {
                assert_eq!(input[i * n], k % m.value(), "r = {r}");
                for c in 1..n {
                    assert_eq!(input[i * n + c], 0);
                }
            }
        }
    }

    #[test]
    fn test_divide_and_round_q_last_ntt() {
        let power = 3u32;
        let n = 1usize << power;
        let q_values = generate_ntt_primes(30, 2, 2 * n as u64, &[]).unwrap();
        let base = base_from(&q_values);
        let tool = RnsTool::new(power, &base).unwrap();
        let tables: Vec<NttTables> = base
            .base()
            .iter()
            .map(|m| NttTables::new(power, m).unwrap())
            .collect();

        let q_last = base.modulus(base.size() - 1).value();
        let k = 987u64;
        let x = BigUint::from(k) * q_last;
        let mut input = vec![0u64; base.size() * n];
        for (i, m) in base.base().iter().enumerate() {
            input[i * n] = (&x % m.value()).to_u64().unwrap();
            tables[i].forward(&mut input[i * n..(i + 1) * n]);
        }
        tool.divide_and_round_q_last_ntt_inplace(&mut input, &tables);
        let m0 = base.modulus(0);
        let limb = &mut input[..n];
        tables[0].inverse(limb);
        assert_eq!(limb[0], k % m0.value());
        assert!(limb[1..].iter().all(|&c| c == 0));
    }
}
