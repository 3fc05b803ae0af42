//! Ciphertexts: k ≥ 2 RNS polynomials in one flat buffer of
//! size·L·N words, with shared level, NTT flag, and (for CKKS) scale.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{LeveeError, Result};
use crate::params::{ParmsId, PARMS_ID_ZERO};

#[derive(Clone, Debug)]
pub struct Ciphertext {
    data: Vec<u64>,
    size: usize,
    poly_modulus_degree: usize,
    coeff_modulus_size: usize,
    parms_id: ParmsId,
    is_ntt_form: bool,
    scale: f64,
}

impl Default for Ciphertext {
    fn default() -> Self {
        Self::new()
    }
}

impl Ciphertext {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            size: 0,
            poly_modulus_degree: 0,
            coeff_modulus_size: 0,
            parms_id: PARMS_ID_ZERO,
            is_ntt_form: false,
            scale: 1.0,
        }
    }

    /// Reshape to `size` components at the chain level `parms_id`,
    /// preserving the overlapping components and limbs of existing data.
    pub fn resize(&mut self, context: &Arc<Context>, parms_id: &ParmsId, size: usize) -> Result<()> {
        let context_data = context.get_context_data(parms_id).ok_or_else(|| {
            LeveeError::InvalidArgument("parms_id is not valid for the context".into())
        })?;
        let parms = context_data.parms();
        let n = parms.poly_modulus_degree();
        let l = parms.coeff_modulus().len();
        if !crate::context::product_fits_in(&[size, n, l]) {
            return Err(LeveeError::LogicError("ciphertext size overflow".into()));
        }
        if self.parms_id == *parms_id
            && self.size == size
            && self.poly_modulus_degree == n
            && self.coeff_modulus_size == l
        {
            return Ok(());
        }

        let mut data = vec![0u64; size * l * n];
        let copy_polys = self.size.min(size);
        let copy_limbs = self.coeff_modulus_size.min(l);
        if self.poly_modulus_degree == n {
            for p in 0..copy_polys {
                for j in 0..copy_limbs {
                    let src = (p * self.coeff_modulus_size + j) * n;
                    let dst = (p * l + j) * n;
                    data[dst..dst + n].copy_from_slice(&self.data[src..src + n]);
                }
            }
        }

        self.data = data;
        self.size = size;
        self.poly_modulus_degree = n;
        self.coeff_modulus_size = l;
        self.parms_id = *parms_id;
        Ok(())
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn poly_modulus_degree(&self) -> usize {
        self.poly_modulus_degree
    }

    #[inline]
    pub fn coeff_modulus_size(&self) -> usize {
        self.coeff_modulus_size
    }

    #[inline]
    pub fn data(&self) -> &[u64] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u64] {
        &mut self.data
    }

    /// One component (an RNS polynomial of L·N words).
    #[inline]
    pub fn poly(&self, index: usize) -> &[u64] {
        let len = self.coeff_modulus_size * self.poly_modulus_degree;
        &self.data[index * len..(index + 1) * len]
    }

    #[inline]
    pub fn poly_mut(&mut self, index: usize) -> &mut [u64] {
        let len = self.coeff_modulus_size * self.poly_modulus_degree;
        &mut self.data[index * len..(index + 1) * len]
    }

    /// One limb of one component.
    #[inline]
    pub fn limb(&self, poly_index: usize, limb_index: usize) -> &[u64] {
        let n = self.poly_modulus_degree;
        let start = (poly_index * self.coeff_modulus_size + limb_index) * n;
        &self.data[start..start + n]
    }

    #[inline]
    pub fn limb_mut(&mut self, poly_index: usize, limb_index: usize) -> &mut [u64] {
        let n = self.poly_modulus_degree;
        let start = (poly_index * self.coeff_modulus_size + limb_index) * n;
        &mut self.data[start..start + n]
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        &self.parms_id
    }

    #[inline]
    pub fn set_parms_id(&mut self, parms_id: ParmsId) {
        self.parms_id = parms_id;
    }

    #[inline]
    pub fn is_ntt_form(&self) -> bool {
        self.is_ntt_form
    }

    #[inline]
    pub fn set_ntt_form(&mut self, is_ntt_form: bool) {
        self.is_ntt_form = is_ntt_form;
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    #[inline]
    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// A ciphertext whose second component vanishes decrypts without the
    /// secret key; producing one indicates a logic error upstream.
    pub fn is_transparent(&self) -> bool {
        if self.size < 2 {
            return true;
        }
        self.poly(1).iter().all(|&c| c == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::params::{coeff_modulus_create, EncryptionParams};

    fn test_context() -> Arc<Context> {
        let moduli = coeff_modulus_create(16, &[30, 30]).unwrap();
        Context::new(EncryptionParams::bfv(16, moduli, 97).unwrap()).unwrap()
    }

    #[test]
    fn test_resize_and_layout() {
        let context = test_context();
        let first_id = *context.first_parms_id();
        let mut ct = Ciphertext::new();
        ct.resize(&context, &first_id, 2).unwrap();
        assert_eq!(ct.size(), 2);
        assert_eq!(ct.coeff_modulus_size(), 1);
        assert_eq!(ct.data().len(), 2 * 16);

        ct.limb_mut(1, 0)[3] = 42;
        ct.resize(&context, &first_id, 3).unwrap();
        assert_eq!(ct.size(), 3);
        assert_eq!(ct.limb(1, 0)[3], 42);
        assert!(ct.poly(2).iter().all(|&c| c == 0));
    }

    #[test]
    fn test_transparency() {
        let context = test_context();
        let first_id = *context.first_parms_id();
        let mut ct = Ciphertext::new();
        assert!(ct.is_transparent());
        ct.resize(&context, &first_id, 2).unwrap();
        assert!(ct.is_transparent());
        ct.limb_mut(1, 0)[0] = 1;
        assert!(!ct.is_transparent());
    }
}
