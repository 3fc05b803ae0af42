//! The homomorphic evaluator.
//!
//! All arithmetic on ciphertexts lives here: negation, addition and
//! subtraction, BEHZ-style BFV multiplication and CKKS multiplication in
//! NTT form, squaring, plaintext operations, and NTT transforms.
//! Relinearization and the key-switching primitive are in [`keyswitch`],
//! modulus switching and rescaling in [`modswitch`], Galois application and
//! slot rotations in [`rotate`].
//!
//! The evaluator itself is stateless after construction apart from one
//! read-only table (the Zmstar-to-generator map used by rotation planning),
//! so distinct ciphertexts may be operated on from distinct threads. All
//! scratch is call-scoped.

pub mod keyswitch;
pub mod modswitch;
pub mod rotate;

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::trace;

use crate::ciphertext::Ciphertext;
use crate::context::{product_fits_in, Context, ContextData};
use crate::error::{LeveeError, Result};
use crate::keys::RelinKeys;
use crate::params::SchemeType;
use crate::plaintext::Plaintext;
use crate::ring::modular::{are_close_f64, Modulus, MultiplyOperand};
use crate::ring::poly::{
    add_poly_inplace, dyadic_product_poly, dyadic_product_poly_inplace,
    multiply_poly_scalar, negacyclic_multiply_mono_inplace, negate_poly_inplace,
    sub_poly_inplace,
};

pub struct Evaluator {
    context: Arc<Context>,
    // g ↦ (i, s) with g ≡ (-1)^s·3^i (mod 2N), for every odd g in (0, 2N)
    zmstar_to_generator: HashMap<u64, (u64, u64)>,
}

impl Evaluator {
    pub fn new(context: Arc<Context>) -> Result<Self> {
        let mut evaluator = Self {
            context,
            zmstar_to_generator: HashMap::new(),
        };
        evaluator.populate_zmstar_to_generator();
        Ok(evaluator)
    }

    #[inline]
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    fn populate_zmstar_to_generator(&mut self) {
        let n = self
            .context
            .first_context_data()
            .parms()
            .poly_modulus_degree() as u64;
        let m = n << 1;
        // 2N is a power of two, so exponentiation reduces by masking
        let mut power = 1u64;
        for i in 0..n / 2 {
            self.zmstar_to_generator.insert(power & (m - 1), (i, 0));
            self.zmstar_to_generator
                .insert((power.wrapping_mul(m - 1)) & (m - 1), (i, 1));
            power = (power * 3) & (m - 1);
        }
    }

    /// Generator-form of a Galois element: (i, s) with g ≡ (-1)^s·3^i mod 2N.
    pub(crate) fn generator_exponent(&self, galois_elt: u64) -> Option<(u64, u64)> {
        self.zmstar_to_generator.get(&galois_elt).copied()
    }

    // ---- shared checks ---------------------------------------------------

    pub(crate) fn check_ciphertext(&self, ct: &Ciphertext) -> Result<Arc<ContextData>> {
        let cd = self.context.get_context_data(ct.parms_id()).ok_or_else(|| {
            LeveeError::InvalidArgument("ciphertext is not valid for the context".into())
        })?;
        let parms = cd.parms();
        let expected =
            ct.size() * parms.coeff_modulus().len() * parms.poly_modulus_degree();
        if ct.size() < 2 || ct.data().len() != expected {
            return Err(LeveeError::InvalidArgument(
                "ciphertext buffer is not valid for the encryption parameters".into(),
            ));
        }
        Ok(cd)
    }

    pub(crate) fn check_same_parms(&self, ct1: &Ciphertext, ct2: &Ciphertext) -> Result<()> {
        if ct1.parms_id() != ct2.parms_id() {
            return Err(LeveeError::InvalidArgument(
                "ciphertext encryption parameters mismatch".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn check_same_scale(&self, scale1: f64, scale2: f64) -> Result<()> {
        if !are_close_f64(scale1, scale2) {
            return Err(LeveeError::InvalidArgument("scale mismatch".into()));
        }
        Ok(())
    }

    pub(crate) fn is_scale_within_bounds(&self, scale: f64, cd: &ContextData) -> bool {
        let bound = match cd.parms().scheme() {
            SchemeType::Bfv => cd.parms().plain_modulus().unwrap().bit_count() as i64,
            SchemeType::Ckks => cd.total_coeff_modulus_bit_count() as i64,
        };
        !(scale <= 0.0 || (scale.log2() as i64) >= bound)
    }

    /// Optional safety net: a result whose second component vanished would
    /// hand the plaintext to anyone. Compiled in under debug or the
    /// `throw-on-transparent` feature.
    #[cfg(any(debug_assertions, feature = "throw-on-transparent"))]
    pub(crate) fn check_transparent(&self, ct: &Ciphertext) -> Result<()> {
        if ct.is_transparent() {
            return Err(LeveeError::TransparentCiphertext);
        }
        Ok(())
    }

    #[cfg(not(any(debug_assertions, feature = "throw-on-transparent")))]
    pub(crate) fn check_transparent(&self, _ct: &Ciphertext) -> Result<()> {
        Ok(())
    }

    // ---- negate / add / subtract ----------------------------------------

    pub fn negate_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        let moduli = cd.parms().coeff_modulus();
        for p in 0..ct.size() {
            for (j, modulus) in moduli.iter().enumerate() {
                negate_poly_inplace(ct.limb_mut(p, j), modulus);
            }
        }
        self.check_transparent(ct)
    }

    pub fn negate(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.negate_inplace(&mut destination)?;
        Ok(destination)
    }

    pub fn add_inplace(&self, ct1: &mut Ciphertext, ct2: &Ciphertext) -> Result<()> {
        let cd = self.check_ciphertext(ct1)?;
        self.check_ciphertext(ct2)?;
        self.check_same_parms(ct1, ct2)?;
        if ct1.is_ntt_form() != ct2.is_ntt_form() {
            return Err(LeveeError::InvalidArgument("NTT form mismatch".into()));
        }
        self.check_same_scale(ct1.scale(), ct2.scale())?;

        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let moduli = parms.coeff_modulus();
        let max_count = ct1.size().max(ct2.size());
        let min_count = ct1.size().min(ct2.size());
        if !product_fits_in(&[max_count, n]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }

        let parms_id = *ct1.parms_id();
        ct1.resize(&self.context, &parms_id, max_count)?;
        for p in 0..min_count {
            for (j, modulus) in moduli.iter().enumerate() {
                add_poly_inplace(ct1.limb_mut(p, j), ct2.limb(p, j), modulus);
            }
        }
        for p in min_count..ct2.size() {
            ct1.poly_mut(p).copy_from_slice(ct2.poly(p));
        }
        self.check_transparent(ct1)
    }

    pub fn add(&self, ct1: &Ciphertext, ct2: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = ct1.clone();
        self.add_inplace(&mut destination, ct2)?;
        Ok(destination)
    }

    /// Left-to-right reduction of the operands by addition.
    pub fn add_many(&self, encrypteds: &[Ciphertext]) -> Result<Ciphertext> {
        if encrypteds.is_empty() {
            return Err(LeveeError::InvalidArgument(
                "encrypteds cannot be empty".into(),
            ));
        }
        let mut destination = encrypteds[0].clone();
        for ct in &encrypteds[1..] {
            self.add_inplace(&mut destination, ct)?;
        }
        Ok(destination)
    }

    pub fn sub_inplace(&self, ct1: &mut Ciphertext, ct2: &Ciphertext) -> Result<()> {
        let cd = self.check_ciphertext(ct1)?;
        self.check_ciphertext(ct2)?;
        self.check_same_parms(ct1, ct2)?;
        if ct1.is_ntt_form() != ct2.is_ntt_form() {
            return Err(LeveeError::InvalidArgument("NTT form mismatch".into()));
        }
        self.check_same_scale(ct1.scale(), ct2.scale())?;

        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let moduli = parms.coeff_modulus();
        let max_count = ct1.size().max(ct2.size());
        let min_count = ct1.size().min(ct2.size());
        if !product_fits_in(&[max_count, n]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }

        let parms_id = *ct1.parms_id();
        ct1.resize(&self.context, &parms_id, max_count)?;
        for p in 0..min_count {
            for (j, modulus) in moduli.iter().enumerate() {
                sub_poly_inplace(ct1.limb_mut(p, j), ct2.limb(p, j), modulus);
            }
        }
        // Extra components of the larger right operand come in negated
        for p in min_count..ct2.size() {
            ct1.poly_mut(p).copy_from_slice(ct2.poly(p));
            for (j, modulus) in moduli.iter().enumerate() {
                negate_poly_inplace(ct1.limb_mut(p, j), modulus);
            }
        }
        self.check_transparent(ct1)
    }

    pub fn sub(&self, ct1: &Ciphertext, ct2: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = ct1.clone();
        self.sub_inplace(&mut destination, ct2)?;
        Ok(destination)
    }

    // ---- multiplication --------------------------------------------------

    pub fn multiply_inplace(&self, ct1: &mut Ciphertext, ct2: &Ciphertext) -> Result<()> {
        self.check_ciphertext(ct1)?;
        self.check_ciphertext(ct2)?;
        self.check_same_parms(ct1, ct2)?;
        match self.context.scheme() {
            SchemeType::Bfv => self.bfv_multiply(ct1, ct2)?,
            SchemeType::Ckks => self.ckks_multiply(ct1, ct2)?,
        }
        self.check_transparent(ct1)
    }

    pub fn multiply(&self, ct1: &Ciphertext, ct2: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = ct1.clone();
        self.multiply_inplace(&mut destination, ct2)?;
        Ok(destination)
    }

    pub fn square_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        self.check_ciphertext(ct)?;
        match self.context.scheme() {
            SchemeType::Bfv => self.bfv_square(ct)?,
            SchemeType::Ckks => self.ckks_square(ct)?,
        }
        self.check_transparent(ct)
    }

    pub fn square(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.square_inplace(&mut destination)?;
        Ok(destination)
    }

    /// Lift one component from base q into lazy-NTT copies in base q and in
    /// base Bsk (BEHZ steps 1-3).
    fn behz_extend_base_convert_to_ntt(
        &self,
        cd: &ContextData,
        poly: &[u64],
        q_out: &mut [u64],
        bsk_out: &mut [u64],
    ) {
        let n = cd.parms().poly_modulus_degree();
        let rns_tool = cd.rns_tool();
        let base_bsk_size = rns_tool.base_bsk().size();

        // Copy in base q, then lazy forward NTT limb by limb
        q_out.copy_from_slice(poly);
        for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
            tables.forward_lazy(&mut q_out[j * n..(j + 1) * n]);
        }

        // Lift to Bsk ∪ {m̃}, clear the conversion overflow, then NTT in Bsk
        let mut temp = vec![0u64; (base_bsk_size + 1) * n];
        rns_tool.fastbconv_m_tilde(poly, &mut temp);
        rns_tool.sm_mrq(&temp, bsk_out);
        for (j, tables) in rns_tool.base_bsk_ntt_tables().iter().enumerate() {
            tables.forward_lazy(&mut bsk_out[j * n..(j + 1) * n]);
        }
    }

    /// BEHZ full-RNS BFV multiplication; both operands in coefficient form.
    fn bfv_multiply(&self, ct1: &mut Ciphertext, ct2: &Ciphertext) -> Result<()> {
        if ct1.is_ntt_form() || ct2.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "BFV multiplication operands cannot be in NTT form".into(),
            ));
        }
        let cd = self.check_ciphertext(ct1)?;
        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let base_q_size = parms.coeff_modulus().len();
        let rns_tool = cd.rns_tool();
        let base_bsk_size = rns_tool.base_bsk().size();
        let base_bsk_m_tilde_size = base_bsk_size + 1;
        let plain_modulus = parms.plain_modulus().unwrap().value();

        let ct1_size = ct1.size();
        let ct2_size = ct2.size();
        let dest_size = ct1_size + ct2_size - 1;
        if !product_fits_in(&[dest_size, n, base_bsk_m_tilde_size]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }
        trace!(dest_size, base_q_size, base_bsk_size, "bfv_multiply");

        // Steps (1)-(3): base-extend every component of both inputs
        let q_stride = base_q_size * n;
        let bsk_stride = base_bsk_size * n;
        let mut ct1_q = vec![0u64; ct1_size * q_stride];
        let mut ct1_bsk = vec![0u64; ct1_size * bsk_stride];
        ct1_q
            .par_chunks_exact_mut(q_stride)
            .zip(ct1_bsk.par_chunks_exact_mut(bsk_stride))
            .enumerate()
            .for_each(|(p, (q_out, bsk_out))| {
                self.behz_extend_base_convert_to_ntt(&cd, ct1.poly(p), q_out, bsk_out);
            });

        let mut ct2_q = vec![0u64; ct2_size * q_stride];
        let mut ct2_bsk = vec![0u64; ct2_size * bsk_stride];
        ct2_q
            .par_chunks_exact_mut(q_stride)
            .zip(ct2_bsk.par_chunks_exact_mut(bsk_stride))
            .enumerate()
            .for_each(|(p, (q_out, bsk_out))| {
                self.behz_extend_base_convert_to_ntt(&cd, ct2.poly(p), q_out, bsk_out);
            });

        // Step (4): dyadic cross-term accumulation, separately per base
        let base_q = parms.coeff_modulus();
        let base_bsk = rns_tool.base_bsk().base();
        let mut dest_q = vec![0u64; dest_size * q_stride];
        let mut dest_bsk = vec![0u64; dest_size * bsk_stride];
        dest_q
            .par_chunks_exact_mut(q_stride)
            .zip(dest_bsk.par_chunks_exact_mut(bsk_stride))
            .enumerate()
            .for_each(|(p, (dq, db))| {
                let curr1_last = p.min(ct1_size - 1);
                let curr2_first = p.min(ct2_size - 1);
                let curr1_first = p - curr2_first;
                let steps = curr1_last - curr1_first + 1;
                let mut prod = vec![0u64; n];
                for s in 0..steps {
                    let i = curr1_first + s;
                    let j = curr2_first - s;
                    for (l, modulus) in base_q.iter().enumerate() {
                        dyadic_product_poly(
                            &ct1_q[i * q_stride + l * n..i * q_stride + (l + 1) * n],
                            &ct2_q[j * q_stride + l * n..j * q_stride + (l + 1) * n],
                            modulus,
                            &mut prod,
                        );
                        add_poly_inplace(&mut dq[l * n..(l + 1) * n], &prod, modulus);
                    }
                    for (l, modulus) in base_bsk.iter().enumerate() {
                        dyadic_product_poly(
                            &ct1_bsk[i * bsk_stride + l * n..i * bsk_stride + (l + 1) * n],
                            &ct2_bsk[j * bsk_stride + l * n..j * bsk_stride + (l + 1) * n],
                            modulus,
                            &mut prod,
                        );
                        add_poly_inplace(&mut db[l * n..(l + 1) * n], &prod, modulus);
                    }
                }
            });

        // Step (5): back to coefficient form in both bases
        dest_q
            .par_chunks_exact_mut(q_stride)
            .zip(dest_bsk.par_chunks_exact_mut(bsk_stride))
            .for_each(|(dq, db)| {
                for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
                    tables.inverse(&mut dq[j * n..(j + 1) * n]);
                }
                for (j, tables) in rns_tool.base_bsk_ntt_tables().iter().enumerate() {
                    tables.inverse(&mut db[j * n..(j + 1) * n]);
                }
            });

        // Steps (6)-(8): scale by t, fast-floor by q, convert back to base q
        let parms_id = *ct1.parms_id();
        ct1.resize(&self.context, &parms_id, dest_size)?;
        let t_mod_q: Vec<MultiplyOperand> = base_q
            .iter()
            .map(|m| MultiplyOperand::new(m.reduce(plain_modulus), m))
            .collect();
        let t_mod_bsk: Vec<MultiplyOperand> = base_bsk
            .iter()
            .map(|m| MultiplyOperand::new(m.reduce(plain_modulus), m))
            .collect();

        for p in 0..dest_size {
            let mut temp_q_bsk = vec![0u64; (base_q_size + base_bsk_size) * n];
            for (j, modulus) in base_q.iter().enumerate() {
                multiply_poly_scalar(
                    &dest_q[p * q_stride + j * n..p * q_stride + (j + 1) * n],
                    &t_mod_q[j],
                    modulus,
                    &mut temp_q_bsk[j * n..(j + 1) * n],
                );
            }
            for (j, modulus) in base_bsk.iter().enumerate() {
                let offset = (base_q_size + j) * n;
                multiply_poly_scalar(
                    &dest_bsk[p * bsk_stride + j * n..p * bsk_stride + (j + 1) * n],
                    &t_mod_bsk[j],
                    modulus,
                    &mut temp_q_bsk[offset..offset + n],
                );
            }
            let mut temp_bsk = vec![0u64; base_bsk_size * n];
            rns_tool.fast_floor(&temp_q_bsk, &mut temp_bsk);
            rns_tool.fastbconv_sk(&temp_bsk, ct1.poly_mut(p));
        }
        Ok(())
    }

    /// CKKS multiplication: dyadic cross-term accumulation in NTT form with
    /// scale product.
    fn ckks_multiply(&self, ct1: &mut Ciphertext, ct2: &Ciphertext) -> Result<()> {
        if !(ct1.is_ntt_form() && ct2.is_ntt_form()) {
            return Err(LeveeError::InvalidArgument(
                "CKKS multiplication operands must be in NTT form".into(),
            ));
        }
        let cd = self.check_ciphertext(ct1)?;
        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let moduli = parms.coeff_modulus();
        let limb_count = moduli.len();

        let new_scale = ct1.scale() * ct2.scale();
        if !self.is_scale_within_bounds(new_scale, &cd) {
            return Err(LeveeError::ScaleOutOfBounds);
        }

        let ct1_size = ct1.size();
        let ct2_size = ct2.size();
        let dest_size = ct1_size + ct2_size - 1;
        if !product_fits_in(&[dest_size, n, limb_count]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }
        trace!(dest_size, limb_count, "ckks_multiply");

        let stride = limb_count * n;
        let ct1_data = ct1.data().to_vec();
        let mut temp = vec![0u64; dest_size * stride];
        temp.par_chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(p, out)| {
                let curr1_last = p.min(ct1_size - 1);
                let curr2_first = p.min(ct2_size - 1);
                let curr1_first = p - curr2_first;
                let steps = curr1_last - curr1_first + 1;
                let mut prod = vec![0u64; n];
                for s in 0..steps {
                    let i = curr1_first + s;
                    let j = curr2_first - s;
                    for (l, modulus) in moduli.iter().enumerate() {
                        dyadic_product_poly(
                            &ct1_data[i * stride + l * n..i * stride + (l + 1) * n],
                            &ct2.data()[j * stride + l * n..j * stride + (l + 1) * n],
                            modulus,
                            &mut prod,
                        );
                        add_poly_inplace(&mut out[l * n..(l + 1) * n], &prod, modulus);
                    }
                }
            });

        let parms_id = *ct1.parms_id();
        ct1.resize(&self.context, &parms_id, dest_size)?;
        ct1.data_mut().copy_from_slice(&temp);
        ct1.set_scale(new_scale);
        Ok(())
    }

    /// Size-2 BFV squaring via the (c0², 2·c0·c1, c1²) shortcut inside the
    /// BEHZ envelope; larger ciphertexts fall back to the generic product.
    fn bfv_square(&self, ct: &mut Ciphertext) -> Result<()> {
        if ct.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "BFV squaring operand cannot be in NTT form".into(),
            ));
        }
        if ct.size() != 2 {
            let copy = ct.clone();
            return self.bfv_multiply(ct, &copy);
        }
        let cd = self.check_ciphertext(ct)?;
        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let base_q_size = parms.coeff_modulus().len();
        let rns_tool = cd.rns_tool();
        let base_bsk_size = rns_tool.base_bsk().size();
        let plain_modulus = parms.plain_modulus().unwrap().value();
        let dest_size = 3;
        if !product_fits_in(&[dest_size, n, base_bsk_size + 1]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }

        let q_stride = base_q_size * n;
        let bsk_stride = base_bsk_size * n;
        let mut ct_q = vec![0u64; 2 * q_stride];
        let mut ct_bsk = vec![0u64; 2 * bsk_stride];
        ct_q.par_chunks_exact_mut(q_stride)
            .zip(ct_bsk.par_chunks_exact_mut(bsk_stride))
            .enumerate()
            .for_each(|(p, (q_out, bsk_out))| {
                self.behz_extend_base_convert_to_ntt(&cd, ct.poly(p), q_out, bsk_out);
            });

        let base_q = parms.coeff_modulus();
        let base_bsk = rns_tool.base_bsk().base();
        let mut dest_q = vec![0u64; dest_size * q_stride];
        let mut dest_bsk = vec![0u64; dest_size * bsk_stride];

        let square_into = |input: &[u64], stride: usize, base: &[Modulus], out: &mut [u64]| {
            let (c0, c1) = input.split_at(stride);
            for (l, modulus) in base.iter().enumerate() {
                let lo = l * n;
                let hi = (l + 1) * n;
                // c0²
                dyadic_product_poly(&c0[lo..hi], &c0[lo..hi], modulus, &mut out[lo..hi]);
                // 2·c0·c1
                let mid = stride + lo;
                dyadic_product_poly(&c0[lo..hi], &c1[lo..hi], modulus, &mut out[mid..mid + n]);
                let doubled = out[mid..mid + n].to_vec();
                add_poly_inplace(&mut out[mid..mid + n], &doubled, modulus);
                // c1²
                let top = 2 * stride + lo;
                dyadic_product_poly(&c1[lo..hi], &c1[lo..hi], modulus, &mut out[top..top + n]);
            }
        };
        square_into(&ct_q, q_stride, base_q, &mut dest_q);
        square_into(&ct_bsk, bsk_stride, base_bsk, &mut dest_bsk);

        dest_q
            .par_chunks_exact_mut(q_stride)
            .zip(dest_bsk.par_chunks_exact_mut(bsk_stride))
            .for_each(|(dq, db)| {
                for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
                    tables.inverse(&mut dq[j * n..(j + 1) * n]);
                }
                for (j, tables) in rns_tool.base_bsk_ntt_tables().iter().enumerate() {
                    tables.inverse(&mut db[j * n..(j + 1) * n]);
                }
            });

        let parms_id = *ct.parms_id();
        ct.resize(&self.context, &parms_id, dest_size)?;
        let t_mod_q: Vec<MultiplyOperand> = base_q
            .iter()
            .map(|m| MultiplyOperand::new(m.reduce(plain_modulus), m))
            .collect();
        let t_mod_bsk: Vec<MultiplyOperand> = base_bsk
            .iter()
            .map(|m| MultiplyOperand::new(m.reduce(plain_modulus), m))
            .collect();
        for p in 0..dest_size {
            let mut temp_q_bsk = vec![0u64; (base_q_size + base_bsk_size) * n];
            for (j, modulus) in base_q.iter().enumerate() {
                multiply_poly_scalar(
                    &dest_q[p * q_stride + j * n..p * q_stride + (j + 1) * n],
                    &t_mod_q[j],
                    modulus,
                    &mut temp_q_bsk[j * n..(j + 1) * n],
                );
            }
            for (j, modulus) in base_bsk.iter().enumerate() {
                let offset = (base_q_size + j) * n;
                multiply_poly_scalar(
                    &dest_bsk[p * bsk_stride + j * n..p * bsk_stride + (j + 1) * n],
                    &t_mod_bsk[j],
                    modulus,
                    &mut temp_q_bsk[offset..offset + n],
                );
            }
            let mut temp_bsk = vec![0u64; base_bsk_size * n];
            rns_tool.fast_floor(&temp_q_bsk, &mut temp_bsk);
            rns_tool.fastbconv_sk(&temp_bsk, ct.poly_mut(p));
        }
        Ok(())
    }

    fn ckks_square(&self, ct: &mut Ciphertext) -> Result<()> {
        if !ct.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "CKKS squaring operand must be in NTT form".into(),
            ));
        }
        if ct.size() != 2 {
            let copy = ct.clone();
            return self.ckks_multiply(ct, &copy);
        }
        let cd = self.check_ciphertext(ct)?;
        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let moduli = parms.coeff_modulus();

        let new_scale = ct.scale() * ct.scale();
        if !self.is_scale_within_bounds(new_scale, &cd) {
            return Err(LeveeError::ScaleOutOfBounds);
        }

        let stride = moduli.len() * n;
        let mut temp = vec![0u64; 3 * stride];
        {
            let c0 = ct.poly(0);
            let c1 = ct.poly(1);
            let (t0, rest) = temp.split_at_mut(stride);
            let (t1, t2) = rest.split_at_mut(stride);
            for (l, modulus) in moduli.iter().enumerate() {
                let lo = l * n;
                let hi = (l + 1) * n;
                dyadic_product_poly(&c0[lo..hi], &c0[lo..hi], modulus, &mut t0[lo..hi]);
                dyadic_product_poly(&c0[lo..hi], &c1[lo..hi], modulus, &mut t1[lo..hi]);
                let doubled = t1[lo..hi].to_vec();
                add_poly_inplace(&mut t1[lo..hi], &doubled, modulus);
                dyadic_product_poly(&c1[lo..hi], &c1[lo..hi], modulus, &mut t2[lo..hi]);
            }
        }

        let parms_id = *ct.parms_id();
        ct.resize(&self.context, &parms_id, 3)?;
        ct.data_mut().copy_from_slice(&temp);
        ct.set_scale(new_scale);
        Ok(())
    }

    // ---- multiply_many / exponentiate -----------------------------------

    /// Balanced product tree with relinearization after every node.
    pub fn multiply_many(
        &self,
        encrypteds: &[Ciphertext],
        relin_keys: &RelinKeys,
    ) -> Result<Ciphertext> {
        if encrypteds.is_empty() {
            return Err(LeveeError::InvalidArgument(
                "encrypteds cannot be empty".into(),
            ));
        }
        if self.context.scheme() != SchemeType::Bfv {
            return Err(LeveeError::LogicError("unsupported scheme".into()));
        }
        if encrypteds.len() == 1 {
            return Ok(encrypteds[0].clone());
        }

        let mut product_vec: Vec<Ciphertext> = Vec::with_capacity(encrypteds.len());
        let mut i = 0;
        while i + 1 < encrypteds.len() {
            let mut temp = if encrypteds[i].data() == encrypteds[i + 1].data() {
                self.square(&encrypteds[i])?
            } else {
                self.multiply(&encrypteds[i], &encrypteds[i + 1])?
            };
            self.relinearize_inplace(&mut temp, relin_keys)?;
            product_vec.push(temp);
            i += 2;
        }
        if encrypteds.len() & 1 == 1 {
            product_vec.push(encrypteds.last().unwrap().clone());
        }

        let mut i = 0;
        while i + 1 < product_vec.len() {
            let mut temp = self.multiply(&product_vec[i], &product_vec[i + 1])?;
            self.relinearize_inplace(&mut temp, relin_keys)?;
            product_vec.push(temp);
            i += 2;
        }
        Ok(product_vec.pop().unwrap())
    }

    pub fn exponentiate_inplace(
        &self,
        ct: &mut Ciphertext,
        exponent: u64,
        relin_keys: &RelinKeys,
    ) -> Result<()> {
        self.check_ciphertext(ct)?;
        if exponent == 0 {
            return Err(LeveeError::InvalidArgument("exponent cannot be 0".into()));
        }
        if exponent == 1 {
            return Ok(());
        }
        let exp_vector = vec![ct.clone(); exponent as usize];
        *ct = self.multiply_many(&exp_vector, relin_keys)?;
        Ok(())
    }

    pub fn exponentiate(
        &self,
        ct: &Ciphertext,
        exponent: u64,
        relin_keys: &RelinKeys,
    ) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.exponentiate_inplace(&mut destination, exponent, relin_keys)?;
        Ok(destination)
    }

    // ---- plaintext operations -------------------------------------------

    pub fn add_plain_inplace(&self, ct: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        self.plain_add_sub_inplace(ct, plain, false)
    }

    pub fn add_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.add_plain_inplace(&mut destination, plain)?;
        Ok(destination)
    }

    pub fn sub_plain_inplace(&self, ct: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        self.plain_add_sub_inplace(ct, plain, true)
    }

    pub fn sub_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.sub_plain_inplace(&mut destination, plain)?;
        Ok(destination)
    }

    fn plain_add_sub_inplace(
        &self,
        ct: &mut Ciphertext,
        plain: &Plaintext,
        subtract: bool,
    ) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        let parms = cd.parms();
        match parms.scheme() {
            SchemeType::Bfv => {
                if ct.is_ntt_form() || plain.is_ntt_form() {
                    return Err(LeveeError::InvalidArgument(
                        "BFV plain addition requires coefficient form".into(),
                    ));
                }
                self.check_same_scale(ct.scale(), plain.scale())?;
                if subtract {
                    crate::scaling::multiply_sub_plain_with_scaling_variant(
                        plain,
                        &cd,
                        ct.poly_mut(0),
                    );
                } else {
                    crate::scaling::multiply_add_plain_with_scaling_variant(
                        plain,
                        &cd,
                        ct.poly_mut(0),
                    );
                }
            }
            SchemeType::Ckks => {
                if !ct.is_ntt_form() || !plain.is_ntt_form() {
                    return Err(LeveeError::InvalidArgument(
                        "CKKS plain addition requires NTT form".into(),
                    ));
                }
                if ct.parms_id() != plain.parms_id() {
                    return Err(LeveeError::InvalidArgument(
                        "ciphertext and plaintext parameter mismatch".into(),
                    ));
                }
                self.check_same_scale(ct.scale(), plain.scale())?;
                let n = parms.poly_modulus_degree();
                for (j, modulus) in parms.coeff_modulus().iter().enumerate() {
                    let limb = ct.limb_mut(0, j);
                    if subtract {
                        sub_poly_inplace(limb, &plain.data()[j * n..(j + 1) * n], modulus);
                    } else {
                        add_poly_inplace(limb, &plain.data()[j * n..(j + 1) * n], modulus);
                    }
                }
            }
        }
        self.check_transparent(ct)
    }

    pub fn multiply_plain_inplace(&self, ct: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        self.check_ciphertext(ct)?;
        if ct.is_ntt_form() != plain.is_ntt_form() {
            return Err(LeveeError::InvalidArgument("NTT form mismatch".into()));
        }
        if ct.is_ntt_form() {
            self.multiply_plain_ntt(ct, plain)?;
        } else {
            self.multiply_plain_normal(ct, plain)?;
        }
        self.check_transparent(ct)
    }

    pub fn multiply_plain(&self, ct: &Ciphertext, plain: &Plaintext) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.multiply_plain_inplace(&mut destination, plain)?;
        Ok(destination)
    }

    fn multiply_plain_ntt(&self, ct: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        if ct.parms_id() != plain.parms_id() {
            return Err(LeveeError::InvalidArgument(
                "ciphertext and plaintext parameter mismatch".into(),
            ));
        }
        let cd = self.check_ciphertext(ct)?;
        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let moduli = parms.coeff_modulus();

        let new_scale = ct.scale() * plain.scale();
        if !self.is_scale_within_bounds(new_scale, &cd) {
            return Err(LeveeError::ScaleOutOfBounds);
        }

        for p in 0..ct.size() {
            for (j, modulus) in moduli.iter().enumerate() {
                dyadic_product_poly_inplace(
                    ct.limb_mut(p, j),
                    &plain.data()[j * n..(j + 1) * n],
                    modulus,
                );
            }
        }
        ct.set_scale(new_scale);
        Ok(())
    }

    /// Coefficient-domain plain multiplication (BFV). A plaintext with a
    /// single nonzero coefficient takes the negacyclic-monomial shortcut.
    ///
    /// The monomial path's running time depends on the plaintext, so it is a
    /// timing side channel; use it only when the plaintext is public.
    fn multiply_plain_normal(&self, ct: &mut Ciphertext, plain: &Plaintext) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        let parms = cd.parms();
        if parms.scheme() != SchemeType::Bfv {
            return Err(LeveeError::InvalidArgument(
                "coefficient-form plaintext multiplication requires the BFV scheme".into(),
            ));
        }
        let n = parms.poly_modulus_degree();
        let moduli = parms.coeff_modulus();
        let limb_count = moduli.len();

        if !product_fits_in(&[ct.size(), n, limb_count]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }
        let new_scale = ct.scale() * plain.scale();
        if !self.is_scale_within_bounds(new_scale, &cd) {
            return Err(LeveeError::ScaleOutOfBounds);
        }
        let plain_upper_half_threshold = cd.plain_upper_half_threshold();

        if plain.nonzero_coeff_count() == 1 {
            let mono_exponent = plain.significant_coeff_count() - 1;
            let coeff = plain[mono_exponent];
            let adjusted = self.lift_coefficient(coeff, &cd)?;
            for p in 0..ct.size() {
                for (j, modulus) in moduli.iter().enumerate() {
                    let c = if coeff >= plain_upper_half_threshold {
                        adjusted[j]
                    } else {
                        coeff
                    };
                    negacyclic_multiply_mono_inplace(
                        ct.limb_mut(p, j),
                        c,
                        mono_exponent,
                        modulus,
                    );
                }
            }
            ct.set_scale(new_scale);
            return Ok(());
        }

        // General case: lift the plaintext into an RNS polynomial, transform
        // it once, then dyadic-multiply every component through a lazy NTT.
        let temp = self.lift_plain_to_rns_ntt(plain, &cd)?;
        for p in 0..ct.size() {
            for (j, modulus) in moduli.iter().enumerate() {
                let tables = &cd.small_ntt_tables()[j];
                let limb = ct.limb_mut(p, j);
                tables.forward_lazy(limb);
                dyadic_product_poly_inplace(limb, &temp[j * n..(j + 1) * n], modulus);
                tables.inverse(limb);
            }
        }
        ct.set_scale(new_scale);
        Ok(())
    }

    /// Per-limb representation of one plaintext coefficient, with the
    /// upper-half adjustment applied (negative residues lifted into each q_i).
    fn lift_coefficient(&self, value: u64, cd: &ContextData) -> Result<Vec<u64>> {
        let moduli = cd.parms().coeff_modulus();
        if value < cd.plain_upper_half_threshold() {
            return Ok(moduli.iter().map(|m| m.reduce(value)).collect());
        }
        if cd.qualifiers().using_fast_plain_lift {
            Ok(moduli
                .iter()
                .zip(cd.plain_upper_half_increment())
                .map(|(m, &inc)| m.reduce(value + inc))
                .collect())
        } else {
            let big = cd.plain_upper_half_increment_big().ok_or_else(|| {
                LeveeError::LogicError("missing multiprecision plain lift data".into())
            })? + value;
            Ok(cd.rns_tool().base_q().decompose(&big))
        }
    }

    /// Lift a coefficient-form plaintext into a full RNS polynomial at the
    /// level of `cd` and transform it to NTT form.
    pub(crate) fn lift_plain_to_rns_ntt(
        &self,
        plain: &Plaintext,
        cd: &ContextData,
    ) -> Result<Vec<u64>> {
        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let moduli = parms.coeff_modulus();
        let limb_count = moduli.len();
        let threshold = cd.plain_upper_half_threshold();

        let mut temp = vec![0u64; limb_count * n];
        if cd.qualifiers().using_fast_plain_lift {
            for (j, (m, &inc)) in moduli
                .iter()
                .zip(cd.plain_upper_half_increment())
                .enumerate()
            {
                let limb = &mut temp[j * n..(j + 1) * n];
                for (i, &value) in plain.data().iter().enumerate() {
                    limb[i] = if value >= threshold {
                        m.reduce(value + inc)
                    } else {
                        value
                    };
                }
            }
        } else {
            let increment = cd.plain_upper_half_increment_big().ok_or_else(|| {
                LeveeError::LogicError("missing multiprecision plain lift data".into())
            })?;
            let base_q = cd.rns_tool().base_q();
            for (i, &value) in plain.data().iter().enumerate() {
                let residues = if value >= threshold {
                    base_q.decompose(&(increment + value))
                } else {
                    moduli.iter().map(|m| m.reduce(value)).collect()
                };
                for (j, r) in residues.into_iter().enumerate() {
                    temp[j * n + i] = r;
                }
            }
        }
        for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
            tables.forward(&mut temp[j * n..(j + 1) * n]);
        }
        Ok(temp)
    }

    // ---- NTT transforms --------------------------------------------------

    /// Lift a coefficient-form plaintext to NTT form at the given level.
    pub fn transform_plain_to_ntt_inplace(
        &self,
        plain: &mut Plaintext,
        parms_id: &crate::params::ParmsId,
    ) -> Result<()> {
        if plain.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "plaintext is already in NTT form".into(),
            ));
        }
        let cd = self.context.get_context_data(parms_id).ok_or_else(|| {
            LeveeError::InvalidArgument("parms_id is not valid for the context".into())
        })?;
        if cd.parms().scheme() != SchemeType::Bfv {
            return Err(LeveeError::InvalidArgument(
                "plaintext NTT lifting requires the BFV scheme".into(),
            ));
        }
        let n = cd.parms().poly_modulus_degree();
        let limb_count = cd.parms().coeff_modulus().len();
        if !product_fits_in(&[n, limb_count]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }
        let lifted = self.lift_plain_to_rns_ntt(plain, &cd)?;
        plain.resize(lifted.len());
        plain.data_mut().copy_from_slice(&lifted);
        plain.set_parms_id(*parms_id);
        Ok(())
    }

    pub fn transform_to_ntt_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        if ct.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "ciphertext is already in NTT form".into(),
            ));
        }
        let n = cd.parms().poly_modulus_degree();
        let stride = cd.parms().coeff_modulus().len() * n;
        ct.data_mut()
            .par_chunks_exact_mut(stride)
            .for_each(|poly| {
                for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
                    tables.forward(&mut poly[j * n..(j + 1) * n]);
                }
            });
        ct.set_ntt_form(true);
        self.check_transparent(ct)
    }

    pub fn transform_to_ntt(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.transform_to_ntt_inplace(&mut destination)?;
        Ok(destination)
    }

    pub fn transform_from_ntt_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        if !ct.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "ciphertext is not in NTT form".into(),
            ));
        }
        let n = cd.parms().poly_modulus_degree();
        let stride = cd.parms().coeff_modulus().len() * n;
        ct.data_mut()
            .par_chunks_exact_mut(stride)
            .for_each(|poly| {
                for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
                    tables.inverse(&mut poly[j * n..(j + 1) * n]);
                }
            });
        ct.set_ntt_form(false);
        self.check_transparent(ct)
    }

    pub fn transform_from_ntt(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.transform_from_ntt_inplace(&mut destination)?;
        Ok(destination)
    }
}

