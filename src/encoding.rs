//! Slot encoders.
//!
//! [`BatchEncoder`] views a BFV plaintext as a 2×(N/2) matrix over Z_t and
//! maps it onto polynomial coefficients through the generator-3 index map
//! and an inverse NTT mod t, so Galois rotations act as row rotations and
//! the element 2N-1 swaps the rows.
//!
//! [`CkksEncoder`] embeds N/2 complex slots through the canonical embedding,
//! realized by a complex negacyclic FFT with the same evaluation-point
//! ordering as the integer NTT, so the same index map and the same Galois
//! elements drive slot rotations.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex64;
use num_traits::ToPrimitive;

use crate::context::Context;
use crate::error::{LeveeError, Result};
use crate::params::{ParmsId, SchemeType};
use crate::plaintext::Plaintext;
use crate::ring::modular::reverse_bits;

/// matrix_reps_index_map: slot i of the first row lands at the bit-reversed
/// position of (3^i - 1)/2, the second row at that of (2N - 3^i - 1)/2.
fn matrix_reps_index_map(n: usize) -> Vec<usize> {
    let logn = n.trailing_zeros();
    let row_size = n / 2;
    let m = 2 * n;
    let mut map = vec![0usize; n];
    let mut pos = 1usize;
    for i in 0..row_size {
        let idx1 = (pos - 1) >> 1;
        let idx2 = (m - pos - 1) >> 1;
        map[i] = reverse_bits(idx1, logn);
        map[row_size + i] = reverse_bits(idx2, logn);
        pos = (pos * 3) & (m - 1);
    }
    map
}

/// BFV slot encoder. Requires a batching-compatible plain modulus
/// (prime, ≡ 1 mod 2N).
pub struct BatchEncoder {
    context: Arc<Context>,
    slots: usize,
    matrix_reps_index_map: Vec<usize>,
}

impl BatchEncoder {
    pub fn new(context: Arc<Context>) -> Result<Self> {
        let cd = context.first_context_data();
        if cd.parms().scheme() != SchemeType::Bfv {
            return Err(LeveeError::InvalidArgument(
                "batch encoding requires the BFV scheme".into(),
            ));
        }
        if !cd.qualifiers().using_batching {
            return Err(LeveeError::InvalidArgument(
                "encryption parameters do not support batching".into(),
            ));
        }
        let n = cd.parms().poly_modulus_degree();
        Ok(Self {
            context,
            slots: n,
            matrix_reps_index_map: matrix_reps_index_map(n),
        })
    }

    /// Total slot count N (two rows of N/2).
    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn encode(&self, values: &[u64]) -> Result<Plaintext> {
        let cd = self.context.first_context_data();
        let t = cd.parms().plain_modulus().unwrap().value();
        if values.len() > self.slots {
            return Err(LeveeError::InvalidArgument(format!(
                "too many values: {} > {} slots",
                values.len(),
                self.slots
            )));
        }
        if values.iter().any(|&v| v >= t) {
            return Err(LeveeError::InvalidArgument(
                "slot value exceeds the plain modulus".into(),
            ));
        }

        let mut buffer = vec![0u64; self.slots];
        for (i, &v) in values.iter().enumerate() {
            buffer[self.matrix_reps_index_map[i]] = v;
        }
        cd.plain_ntt_tables().unwrap().inverse(&mut buffer);
        Ok(Plaintext::from_coeffs(buffer))
    }

    pub fn decode(&self, plain: &Plaintext) -> Result<Vec<u64>> {
        if plain.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "cannot decode a plaintext in NTT form".into(),
            ));
        }
        if plain.coeff_count() > self.slots {
            return Err(LeveeError::InvalidArgument(
                "plaintext is not valid for the encryption parameters".into(),
            ));
        }
        let cd = self.context.first_context_data();
        let mut buffer = plain.data().to_vec();
        buffer.resize(self.slots, 0);
        cd.plain_ntt_tables().unwrap().forward(&mut buffer);
        Ok((0..self.slots)
            .map(|i| buffer[self.matrix_reps_index_map[i]])
            .collect())
    }
}

/// Negacyclic FFT over C with the NTT's evaluation-point ordering: after the
/// forward transform, position i holds the evaluation at
/// e^(iπ(2·rev(i)+1)/N).
struct ComplexFft {
    n: usize,
    root_powers: Vec<Complex64>,
    inv_root_powers: Vec<Complex64>,
}

impl ComplexFft {
    fn new(n: usize) -> Self {
        let logn = n.trailing_zeros();
        let mut root_powers = vec![Complex64::new(1.0, 0.0); n];
        let mut inv_root_powers = vec![Complex64::new(1.0, 0.0); n];
        for i in 1..n {
            let angle = PI * i as f64 / n as f64;
            root_powers[reverse_bits(i, logn)] = Complex64::from_polar(1.0, angle);
            inv_root_powers[reverse_bits(i - 1, logn) + 1] = Complex64::from_polar(1.0, -angle);
        }
        Self {
            n,
            root_powers,
            inv_root_powers,
        }
    }

    fn forward(&self, values: &mut [Complex64]) {
        let n = self.n;
        let mut t = n;
        let mut m = 1;
        while m < n {
            t >>= 1;
            for i in 0..m {
                let w = self.root_powers[m + i];
                let j1 = 2 * i * t;
                for j in j1..j1 + t {
                    let u = values[j];
                    let v = values[j + t] * w;
                    values[j] = u + v;
                    values[j + t] = u - v;
                }
            }
            m <<= 1;
        }
    }

    fn inverse(&self, values: &mut [Complex64]) {
        let n = self.n;
        let mut root_index = 1usize;
        let mut gap = 1usize;
        let mut m = n >> 1;
        while m >= 1 {
            for i in 0..m {
                let w = self.inv_root_powers[root_index];
                root_index += 1;
                let offset = 2 * i * gap;
                for j in offset..offset + gap {
                    let u = values[j];
                    let v = values[j + gap];
                    values[j] = u + v;
                    values[j + gap] = (u - v) * w;
                }
            }
            gap <<= 1;
            m >>= 1;
        }
        let scale = 1.0 / n as f64;
        for v in values.iter_mut() {
            *v *= scale;
        }
    }
}

/// CKKS canonical-embedding encoder for N/2 complex slots.
pub struct CkksEncoder {
    context: Arc<Context>,
    slots: usize,
    matrix_reps_index_map: Vec<usize>,
    fft: ComplexFft,
}

impl CkksEncoder {
    pub fn new(context: Arc<Context>) -> Result<Self> {
        let cd = context.first_context_data();
        if cd.parms().scheme() != SchemeType::Ckks {
            return Err(LeveeError::InvalidArgument(
                "CKKS encoding requires the CKKS scheme".into(),
            ));
        }
        let n = cd.parms().poly_modulus_degree();
        Ok(Self {
            context,
            slots: n / 2,
            matrix_reps_index_map: matrix_reps_index_map(n),
            fft: ComplexFft::new(n),
        })
    }

    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn encode_f64(&self, values: &[f64], parms_id: &ParmsId, scale: f64) -> Result<Plaintext> {
        let complex: Vec<Complex64> = values.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        self.encode_c64(&complex, parms_id, scale)
    }

    pub fn encode_c64(
        &self,
        values: &[Complex64],
        parms_id: &ParmsId,
        scale: f64,
    ) -> Result<Plaintext> {
        let cd = self.context.get_context_data(parms_id).ok_or_else(|| {
            LeveeError::InvalidArgument("parms_id is not valid for the context".into())
        })?;
        if values.len() > self.slots {
            return Err(LeveeError::InvalidArgument(format!(
                "too many values: {} > {} slots",
                values.len(),
                self.slots
            )));
        }
        if scale <= 0.0 || (scale.log2() as i64) >= cd.total_coeff_modulus_bit_count() as i64 {
            return Err(LeveeError::ScaleOutOfBounds);
        }

        let n = cd.parms().poly_modulus_degree();
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];
        for (i, &z) in values.iter().enumerate() {
            buffer[self.matrix_reps_index_map[i]] = z;
            buffer[self.matrix_reps_index_map[i + self.slots]] = z.conj();
        }
        self.fft.inverse(&mut buffer);

        // Round the now-real coefficients; anything past 2^63 cannot be
        // carried into the RNS representation from a double.
        let mut signed = vec![0i64; n];
        for (s, b) in signed.iter_mut().zip(buffer.iter()) {
            let v = b.re * scale;
            if !v.is_finite() || v.abs() >= 9.223_372_036_854_775e18 {
                return Err(LeveeError::InvalidArgument(
                    "encoded values are too large for the scale".into(),
                ));
            }
            *s = v.round() as i64;
        }

        let moduli = cd.parms().coeff_modulus();
        let mut data = vec![0u64; moduli.len() * n];
        crate::sampling::signed_poly_to_rns(&signed, moduli, &mut data);
        for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
            tables.forward(&mut data[j * n..(j + 1) * n]);
        }

        let mut plain = Plaintext::new();
        plain.resize(data.len());
        plain.data_mut().copy_from_slice(&data);
        plain.set_parms_id(*parms_id);
        plain.set_scale(scale);
        Ok(plain)
    }

    pub fn decode_c64(&self, plain: &Plaintext) -> Result<Vec<Complex64>> {
        if !plain.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "CKKS plaintext must be in NTT form".into(),
            ));
        }
        let cd = self.context.get_context_data(plain.parms_id()).ok_or_else(|| {
            LeveeError::InvalidArgument("plaintext is not valid for the context".into())
        })?;
        let n = cd.parms().poly_modulus_degree();
        let limb_count = cd.parms().coeff_modulus().len();
        if plain.coeff_count() != limb_count * n || plain.scale() <= 0.0 {
            return Err(LeveeError::InvalidArgument(
                "plaintext is not valid for the encryption parameters".into(),
            ));
        }

        let mut data = plain.data().to_vec();
        for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
            tables.inverse(&mut data[j * n..(j + 1) * n]);
        }

        let base_q = cd.rns_tool().base_q();
        let q = base_q.prod();
        let half_q = q >> 1;
        let inv_scale = 1.0 / plain.scale();
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];
        let mut residues = vec![0u64; limb_count];
        for k in 0..n {
            for j in 0..limb_count {
                residues[j] = data[j * n + k];
            }
            let x = base_q.compose(&residues);
            let centered = if x > half_q {
                -((q - &x).to_f64().unwrap_or(f64::INFINITY))
            } else {
                x.to_f64().unwrap_or(f64::INFINITY)
            };
            buffer[k] = Complex64::new(centered * inv_scale, 0.0);
        }

        self.fft.forward(&mut buffer);
        Ok((0..self.slots)
            .map(|i| buffer[self.matrix_reps_index_map[i]])
            .collect())
    }

    pub fn decode_f64(&self, plain: &Plaintext) -> Result<Vec<f64>> {
        Ok(self.decode_c64(plain)?.iter().map(|z| z.re).collect())
    }
}
