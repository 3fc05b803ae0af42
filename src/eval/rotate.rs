//! Galois automorphisms and slot rotations.
//!
//! `apply_galois_inplace` performs the three-step dance whose order is
//! load-bearing (the automorphism is not in-place): transform c0, transform
//! c1 into scratch, wipe c1, then key-switch the scratch back onto (c0, c1).
//! `rotate_internal` maps a step count to a Galois element and, when the key
//! for it is missing, decomposes the step into non-adjacent form over the
//! power-of-two key set.

use tracing::trace;

use crate::ciphertext::Ciphertext;
use crate::context::product_fits_in;
use crate::error::{LeveeError, Result};
use crate::eval::Evaluator;
use crate::keys::GaloisKeys;
use crate::params::SchemeType;
use crate::ring::modular::non_adjacent_form;

impl Evaluator {
    /// Apply X ↦ X^elt and key-switch back under the original secret.
    pub fn apply_galois_inplace(
        &self,
        ct: &mut Ciphertext,
        galois_elt: u64,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        if galois_keys.parms_id() != self.context().key_parms_id() {
            return Err(LeveeError::InvalidArgument(
                "galois_keys is not valid for encryption parameters".into(),
            ));
        }

        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let moduli = parms.coeff_modulus();
        let limb_count = moduli.len();
        if !product_fits_in(&[n, limb_count]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }
        if !galois_keys.has_key(galois_elt) {
            return Err(LeveeError::MissingGaloisKey);
        }
        // Every valid element is odd and lies in (0, 2N); the generator
        // table enumerates exactly those.
        if self.generator_exponent(galois_elt).is_none() {
            return Err(LeveeError::InvalidArgument(format!(
                "Galois element {galois_elt} is not valid"
            )));
        }
        if ct.size() > 2 {
            return Err(LeveeError::InvalidArgument(
                "ciphertext size must be 2".into(),
            ));
        }
        trace!(galois_elt, "apply_galois");

        let key_cd = self.context().key_context_data();
        let galois_tool = key_cd.galois_tool();
        let mut temp = vec![0u64; limb_count * n];

        // The execution order below is sensitive: the automorphism routes
        // coefficients to fresh slots, so each component is transformed
        // through scratch before c1 is wiped and rebuilt by key switching.
        match parms.scheme() {
            SchemeType::Bfv => {
                if ct.is_ntt_form() {
                    return Err(LeveeError::InvalidArgument(
                        "BFV ciphertext cannot be in NTT form".into(),
                    ));
                }
                // First transform c0 and copy back
                for (j, modulus) in moduli.iter().enumerate() {
                    galois_tool.apply_galois(
                        ct.limb(0, j),
                        galois_elt,
                        modulus,
                        &mut temp[j * n..(j + 1) * n],
                    );
                }
                ct.poly_mut(0).copy_from_slice(&temp);
                // Next transform c1 into scratch
                for (j, modulus) in moduli.iter().enumerate() {
                    galois_tool.apply_galois(
                        ct.limb(1, j),
                        galois_elt,
                        modulus,
                        &mut temp[j * n..(j + 1) * n],
                    );
                }
            }
            SchemeType::Ckks => {
                if !ct.is_ntt_form() {
                    return Err(LeveeError::InvalidArgument(
                        "CKKS ciphertext must be in NTT form".into(),
                    ));
                }
                for j in 0..limb_count {
                    galois_tool.apply_galois_ntt(
                        ct.limb(0, j),
                        galois_elt,
                        &mut temp[j * n..(j + 1) * n],
                    );
                }
                ct.poly_mut(0).copy_from_slice(&temp);
                for j in 0..limb_count {
                    galois_tool.apply_galois_ntt(
                        ct.limb(1, j),
                        galois_elt,
                        &mut temp[j * n..(j + 1) * n],
                    );
                }
            }
        }

        // Wipe c1; the key switch rebuilds (c0, c1) += KS(σ(c1))
        ct.poly_mut(1).fill(0);
        self.switch_key_inplace(
            ct,
            &temp,
            galois_keys.as_kswitch_keys(),
            GaloisKeys::get_index(galois_elt),
        )?;
        self.check_transparent(ct)
    }

    pub fn apply_galois(
        &self,
        ct: &Ciphertext,
        galois_elt: u64,
        galois_keys: &GaloisKeys,
    ) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.apply_galois_inplace(&mut destination, galois_elt, galois_keys)?;
        Ok(destination)
    }

    /// Rotate by `steps` slots: directly when the key exists, otherwise by
    /// composing the non-adjacent-form decomposition of the step count over
    /// the power-of-two keys.
    pub(crate) fn rotate_internal(
        &self,
        ct: &mut Ciphertext,
        steps: i32,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        if !cd.qualifiers().using_batching {
            return Err(LeveeError::LogicError(
                "encryption parameters do not support batching".into(),
            ));
        }
        if galois_keys.parms_id() != self.context().key_parms_id() {
            return Err(LeveeError::InvalidArgument(
                "galois_keys is not valid for encryption parameters".into(),
            ));
        }
        if steps == 0 {
            return Ok(());
        }

        let n = cd.parms().poly_modulus_degree();
        let galois_tool = cd.galois_tool();
        let elt = galois_tool.get_elt_from_step(steps)?;
        if galois_keys.has_key(elt) {
            self.apply_galois_inplace(ct, elt, galois_keys)
        } else {
            let naf_steps = non_adjacent_form(steps);
            // A single-term decomposition is itself a power-of-two rotation;
            // arriving here means its key is genuinely absent.
            if naf_steps.len() == 1 {
                return Err(LeveeError::MissingGaloisKey);
            }
            for naf_step in naf_steps {
                // ±N/2 is a full row rotation, a no-op
                if naf_step.unsigned_abs() as usize != n / 2 {
                    self.rotate_internal(ct, naf_step, galois_keys)?;
                }
            }
            Ok(())
        }
    }

    /// BFV: cyclically rotate both matrix rows by `steps`.
    pub fn rotate_rows_inplace(
        &self,
        ct: &mut Ciphertext,
        steps: i32,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        if self.context().scheme() != SchemeType::Bfv {
            return Err(LeveeError::LogicError("unsupported scheme".into()));
        }
        self.rotate_internal(ct, steps, galois_keys)
    }

    pub fn rotate_rows(
        &self,
        ct: &Ciphertext,
        steps: i32,
        galois_keys: &GaloisKeys,
    ) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.rotate_rows_inplace(&mut destination, steps, galois_keys)?;
        Ok(destination)
    }

    /// BFV: swap the two matrix rows (the element 2N-1).
    pub fn rotate_columns_inplace(
        &self,
        ct: &mut Ciphertext,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        if self.context().scheme() != SchemeType::Bfv {
            return Err(LeveeError::LogicError("unsupported scheme".into()));
        }
        let n = self.check_ciphertext(ct)?.parms().poly_modulus_degree();
        self.apply_galois_inplace(ct, 2 * n as u64 - 1, galois_keys)
    }

    pub fn rotate_columns(&self, ct: &Ciphertext, galois_keys: &GaloisKeys) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.rotate_columns_inplace(&mut destination, galois_keys)?;
        Ok(destination)
    }

    /// CKKS: cyclically rotate the slot vector by `steps`.
    pub fn rotate_vector_inplace(
        &self,
        ct: &mut Ciphertext,
        steps: i32,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        if self.context().scheme() != SchemeType::Ckks {
            return Err(LeveeError::LogicError("unsupported scheme".into()));
        }
        self.rotate_internal(ct, steps, galois_keys)
    }

    pub fn rotate_vector(
        &self,
        ct: &Ciphertext,
        steps: i32,
        galois_keys: &GaloisKeys,
    ) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.rotate_vector_inplace(&mut destination, steps, galois_keys)?;
        Ok(destination)
    }

    /// CKKS: conjugate every slot (the element 2N-1).
    pub fn complex_conjugate_inplace(
        &self,
        ct: &mut Ciphertext,
        galois_keys: &GaloisKeys,
    ) -> Result<()> {
        if self.context().scheme() != SchemeType::Ckks {
            return Err(LeveeError::LogicError("unsupported scheme".into()));
        }
        let n = self.check_ciphertext(ct)?.parms().poly_modulus_degree();
        self.apply_galois_inplace(ct, 2 * n as u64 - 1, galois_keys)
    }

    pub fn complex_conjugate(
        &self,
        ct: &Ciphertext,
        galois_keys: &GaloisKeys,
    ) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.complex_conjugate_inplace(&mut destination, galois_keys)?;
        Ok(destination)
    }
}
