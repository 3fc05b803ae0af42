//! Plaintext polynomials. A BFV plaintext is a single polynomial in
//! Z_t[X]/(X^N+1) in coefficient form, carrying the zero parms-id. A CKKS
//! plaintext (and a BFV plaintext lifted by an NTT transform) is a full RNS
//! polynomial at a chain level in NTT form, and its parms-id names that
//! level.

use crate::params::{ParmsId, PARMS_ID_ZERO};

#[derive(Clone, Debug)]
pub struct Plaintext {
    data: Vec<u64>,
    parms_id: ParmsId,
    scale: f64,
}

impl Default for Plaintext {
    fn default() -> Self {
        Self::new()
    }
}

impl Plaintext {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            parms_id: PARMS_ID_ZERO,
            scale: 1.0,
        }
    }

    /// A coefficient-form plaintext from raw coefficients (already < t).
    pub fn from_coeffs(coeffs: Vec<u64>) -> Self {
        Self {
            data: coeffs,
            parms_id: PARMS_ID_ZERO,
            scale: 1.0,
        }
    }

    #[inline]
    pub fn coeff_count(&self) -> usize {
        self.data.len()
    }

    /// Number of coefficients up to and including the highest nonzero one.
    pub fn significant_coeff_count(&self) -> usize {
        match self.data.iter().rposition(|&c| c != 0) {
            Some(i) => i + 1,
            None => 0,
        }
    }

    pub fn nonzero_coeff_count(&self) -> usize {
        self.data.iter().filter(|&&c| c != 0).count()
    }

    /// Zero-padding resize; never truncates NTT metadata.
    pub fn resize(&mut self, coeff_count: usize) {
        self.data.resize(coeff_count, 0);
    }

    #[inline]
    pub fn data(&self) -> &[u64] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u64] {
        &mut self.data
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        &self.parms_id
    }

    #[inline]
    pub fn set_parms_id(&mut self, parms_id: ParmsId) {
        self.parms_id = parms_id;
    }

    /// NTT form is synonymous with being bound to a chain level.
    #[inline]
    pub fn is_ntt_form(&self) -> bool {
        self.parms_id != PARMS_ID_ZERO
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }
}

impl std::ops::Index<usize> for Plaintext {
    type Output = u64;
    fn index(&self, index: usize) -> &u64 {
        &self.data[index]
    }
}
