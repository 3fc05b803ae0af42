//! The key-switching primitive and relinearization.
//!
//! `switch_key_inplace` adds into a ciphertext the contribution of moving a
//! target polynomial from one secret to the current one: the target is
//! RNS-decomposed against the key-level primes, the 128-bit products with
//! the key material are accumulated lazily, and the special prime is divided
//! out at the end. Relinearization peels components off the top of an
//! oversized ciphertext through this primitive, one secret power at a time.

use tracing::trace;

use crate::ciphertext::Ciphertext;
use crate::context::product_fits_in;
use crate::error::{LeveeError, Result};
use crate::eval::Evaluator;
use crate::keys::{KSwitchKeys, RelinKeys};
use crate::params::SchemeType;
use crate::ring::modular::MOD_BIT_COUNT_MAX;
use crate::ring::poly::{
    add_poly_inplace, multiply_poly_scalar_inplace, reduce_poly, sub_poly_inplace,
};

/// Number of 128-bit products that may be accumulated before a reduction is
/// owed: 2^(128 - 2·60) for up-to-60-bit user moduli. The decomposition
/// count never comes close, so in practice only the final reduction fires.
const LAZY_REDUCTION_SUMMAND_BOUND: usize = 1 << (128 - 2 * 60);

// The modulus cap guarantees the bound stays meaningful.
const _: () = assert!(MOD_BIT_COUNT_MAX <= 61);

impl Evaluator {
    /// ct += KS(target), where `target` is one RNS polynomial at ct's level
    /// (in NTT form for CKKS, coefficient form for BFV) and KS is the
    /// key-switching map for `kswitch_keys.data()[kswitch_keys_index]`.
    pub(crate) fn switch_key_inplace(
        &self,
        ct: &mut Ciphertext,
        target: &[u64],
        kswitch_keys: &KSwitchKeys,
        kswitch_keys_index: usize,
    ) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        let parms = cd.parms();
        let scheme = parms.scheme();

        if !self.context().using_keyswitching() {
            return Err(LeveeError::LogicError(
                "keyswitching is not supported by the context".into(),
            ));
        }
        if kswitch_keys.parms_id() != self.context().key_parms_id() {
            return Err(LeveeError::InvalidArgument(
                "kswitch_keys is not valid for encryption parameters".into(),
            ));
        }
        if kswitch_keys_index >= kswitch_keys.data().len() {
            return Err(LeveeError::OutOfRange {
                index: kswitch_keys_index,
                len: kswitch_keys.data().len(),
            });
        }
        if scheme == SchemeType::Bfv && ct.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "BFV ciphertext cannot be in NTT form".into(),
            ));
        }
        if scheme == SchemeType::Ckks && !ct.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "CKKS ciphertext must be in NTT form".into(),
            ));
        }

        let key_cd = self.context().key_context_data();
        let key_parms = key_cd.parms();
        let key_modulus = key_parms.coeff_modulus();
        let key_ntt_tables = key_cd.small_ntt_tables();
        let modswitch_factors = key_cd.rns_tool().inv_q_last_mod_q();

        let n = parms.poly_modulus_degree();
        let decomp_mod_count = parms.coeff_modulus().len();
        let key_mod_count = key_modulus.len();
        let rns_mod_count = decomp_mod_count + 1;
        if target.len() != decomp_mod_count * n {
            return Err(LeveeError::InvalidArgument("target".into()));
        }
        if !product_fits_in(&[n, rns_mod_count, 2]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }

        let key_vector = &kswitch_keys.data()[kswitch_keys_index];
        if key_vector.len() < decomp_mod_count {
            return Err(LeveeError::InvalidArgument(
                "key switching key does not cover the decomposition".into(),
            ));
        }
        let key_component_count = key_vector[0].size();
        for each_key in key_vector {
            if each_key.parms_id() != self.context().key_parms_id()
                || !each_key.is_ntt_form()
                || each_key.size() != key_component_count
            {
                return Err(LeveeError::InvalidArgument(
                    "kswitch_keys is not valid for encryption parameters".into(),
                ));
            }
        }
        trace!(decomp_mod_count, key_component_count, "switch_key");

        // The ciphertext-side operand enters the inner loop in coefficient
        // form; CKKS targets get an inverse transform on a copy.
        let mut t_target = target.to_vec();
        if scheme == SchemeType::Ckks {
            for i in 0..decomp_mod_count {
                key_ntt_tables[i].inverse(&mut t_target[i * n..(i + 1) * n]);
            }
        }

        debug_assert!(LAZY_REDUCTION_SUMMAND_BOUND >= decomp_mod_count);
        let mut t_poly_prod = vec![0u64; key_component_count * rns_mod_count * n];
        let mut t_poly_lazy = vec![0u128; key_component_count * n];
        let mut t_ntt = vec![0u64; n];

        for j in 0..rns_mod_count {
            let key_index = if j == decomp_mod_count {
                key_mod_count - 1
            } else {
                j
            };
            let key_mod_j = &key_modulus[key_index];
            let mut lazy_reduction_counter = LAZY_REDUCTION_SUMMAND_BOUND;
            t_poly_lazy.fill(0);

            // Fold every decomposition limb of the target into this key prime
            for i in 0..decomp_mod_count {
                let operand: &[u64] = if scheme == SchemeType::Ckks && i == j {
                    // An NTT-form limb for this prime already exists in the
                    // original input
                    &target[i * n..(i + 1) * n]
                } else {
                    let source = &t_target[i * n..(i + 1) * n];
                    if parms.coeff_modulus()[i].value() <= key_mod_j.value() {
                        t_ntt.copy_from_slice(source);
                    } else {
                        reduce_poly(source, key_mod_j, &mut t_ntt);
                    }
                    // Lazy transform leaves values in [0, 4q)
                    key_ntt_tables[key_index].forward_lazy(&mut t_ntt);
                    &t_ntt
                };

                for k in 0..key_component_count {
                    let key_limb = key_vector[i].limb(k, key_index);
                    let acc = &mut t_poly_lazy[k * n..(k + 1) * n];
                    if lazy_reduction_counter == 0 {
                        for l in 0..n {
                            let sum = acc[l] + operand[l] as u128 * key_limb[l] as u128;
                            acc[l] = key_mod_j.reduce_u128(sum) as u128;
                        }
                    } else {
                        for l in 0..n {
                            acc[l] += operand[l] as u128 * key_limb[l] as u128;
                        }
                    }
                }
                lazy_reduction_counter -= 1;
                if lazy_reduction_counter == 0 {
                    lazy_reduction_counter = LAZY_REDUCTION_SUMMAND_BOUND;
                }
            }

            // Final reduction of whatever is still owed
            for k in 0..key_component_count {
                let acc = &t_poly_lazy[k * n..(k + 1) * n];
                let out = &mut t_poly_prod[(k * rns_mod_count + j) * n..][..n];
                if lazy_reduction_counter == LAZY_REDUCTION_SUMMAND_BOUND {
                    for (o, &a) in out.iter_mut().zip(acc.iter()) {
                        *o = a as u64;
                    }
                } else {
                    for (o, &a) in out.iter_mut().zip(acc.iter()) {
                        *o = key_mod_j.reduce_u128(a);
                    }
                }
            }
        }

        // Modulus-down: divide the accumulated products by the special prime
        // and fold them into the ciphertext.
        let q_special = &key_modulus[key_mod_count - 1];
        let half = q_special.value() >> 1;
        for k in 0..key_component_count {
            let region = &mut t_poly_prod[k * rns_mod_count * n..(k + 1) * rns_mod_count * n];
            let (head, t_last) = region.split_at_mut(decomp_mod_count * n);

            key_ntt_tables[key_mod_count - 1].inverse_lazy(t_last);
            // Add (q_special-1)/2 so flooring becomes rounding
            for x in t_last.iter_mut() {
                *x = q_special.reduce(*x + half);
            }

            for j in 0..decomp_mod_count {
                let modulus = &key_modulus[j];
                reduce_poly(t_last, modulus, &mut t_ntt);
                let fix = modulus.reduce(half);
                for x in t_ntt.iter_mut() {
                    *x = crate::ring::modular::sub_mod(*x, fix, modulus.value());
                }

                let limb = &mut head[j * n..(j + 1) * n];
                match scheme {
                    SchemeType::Ckks => key_ntt_tables[j].forward(&mut t_ntt),
                    SchemeType::Bfv => key_ntt_tables[j].inverse(limb),
                }

                // (prod - t_last)·q_special^{-1} mod q_j, added into ct
                sub_poly_inplace(limb, &t_ntt, modulus);
                multiply_poly_scalar_inplace(limb, &modswitch_factors[j], modulus);
                add_poly_inplace(ct.limb_mut(k, j), limb, modulus);
            }
        }
        Ok(())
    }

    /// Collapse a size-k ciphertext down to `destination_size` components,
    /// key-switching the top component away one secret power at a time.
    pub(crate) fn relinearize_internal(
        &self,
        ct: &mut Ciphertext,
        relin_keys: &RelinKeys,
        destination_size: usize,
    ) -> Result<()> {
        self.check_ciphertext(ct)?;
        if relin_keys.parms_id() != self.context().key_parms_id() {
            return Err(LeveeError::InvalidArgument(
                "relin_keys is not valid for encryption parameters".into(),
            ));
        }
        let ct_size = ct.size();
        if destination_size < 2 || destination_size > ct_size {
            return Err(LeveeError::InvalidArgument(
                "destination_size must be at least 2 and at most the current size".into(),
            ));
        }
        if relin_keys.data().len() < ct_size - 2 {
            return Err(LeveeError::InvalidArgument(
                "not enough relinearization keys".into(),
            ));
        }
        if destination_size == ct_size {
            return Ok(());
        }

        let mut current_size = ct_size;
        while current_size > destination_size {
            let target = ct.poly(current_size - 1).to_vec();
            self.switch_key_inplace(
                ct,
                &target,
                relin_keys.as_kswitch_keys(),
                RelinKeys::get_index(current_size - 1),
            )?;
            current_size -= 1;
        }

        let parms_id = *ct.parms_id();
        ct.resize(self.context(), &parms_id, destination_size)?;
        self.check_transparent(ct)
    }

    pub fn relinearize_inplace(&self, ct: &mut Ciphertext, relin_keys: &RelinKeys) -> Result<()> {
        self.relinearize_internal(ct, relin_keys, 2)
    }

    pub fn relinearize(&self, ct: &Ciphertext, relin_keys: &RelinKeys) -> Result<Ciphertext> {
        let mut destination = ct.clone();
        self.relinearize_inplace(&mut destination, relin_keys)?;
        Ok(destination)
    }
}
