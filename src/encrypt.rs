//! Encryption and decryption for both schemes.
//!
//! BFV ciphertexts are produced in coefficient form at the first data level
//! with the message folded in as ⌊Q/t·m⌉; CKKS ciphertexts are produced in
//! NTT form at the plaintext's level with the message added directly.
//! Decryption evaluates the phase c_0 + c_1·s + c_2·s² + …; BFV then
//! scale-and-rounds by t/Q through a CRT composition, CKKS hands the phase
//! back as an NTT plaintext carrying the scale.

use std::sync::Arc;

use num_traits::ToPrimitive;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::ciphertext::Ciphertext;
use crate::context::{Context, ContextData};
use crate::error::{LeveeError, Result};
use crate::keys::{PublicKey, SecretKey};
use crate::params::SchemeType;
use crate::plaintext::Plaintext;
use crate::ring::poly::{add_poly_inplace, dyadic_product_poly_inplace};
use crate::sampling::{
    sample_gaussian_signed, sample_ternary_signed, signed_poly_to_rns,
    DEFAULT_NOISE_STANDARD_DEVIATION,
};
use crate::scaling::multiply_add_plain_with_scaling_variant;

pub fn encrypt(plain: &Plaintext, pk: &PublicKey, context: &Arc<Context>) -> Result<Ciphertext> {
    let mut rng = ChaCha20Rng::from_os_rng();
    encrypt_with_rng(plain, pk, context, &mut rng)
}

pub fn encrypt_with_rng<R: Rng>(
    plain: &Plaintext,
    pk: &PublicKey,
    context: &Arc<Context>,
    rng: &mut R,
) -> Result<Ciphertext> {
    if pk.parms_id() != context.key_parms_id() {
        return Err(LeveeError::InvalidArgument(
            "public key does not match the context".into(),
        ));
    }
    match context.scheme() {
        SchemeType::Bfv => bfv_encrypt(plain, pk.ciphertext(), context, rng),
        SchemeType::Ckks => ckks_encrypt(plain, pk.ciphertext(), context, rng),
    }
}

pub fn encrypt_symmetric_with_rng<R: Rng>(
    plain: &Plaintext,
    sk: &SecretKey,
    context: &Arc<Context>,
    rng: &mut R,
) -> Result<Ciphertext> {
    if sk.parms_id() != context.key_parms_id() {
        return Err(LeveeError::InvalidArgument(
            "secret key does not match the context".into(),
        ));
    }
    // (-(a·s + e), a) is an encryption of zero under s; reuse the public-key
    // paths with a fresh zero encryption in place of pk.
    let pad = crate::keygen::encrypt_zero_symmetric_ntt(sk, context, rng)?;
    match context.scheme() {
        SchemeType::Bfv => bfv_encrypt(plain, &pad, context, rng),
        SchemeType::Ckks => ckks_encrypt(plain, &pad, context, rng),
    }
}

fn bfv_encrypt<R: Rng>(
    plain: &Plaintext,
    pk_ct: &Ciphertext,
    context: &Arc<Context>,
    rng: &mut R,
) -> Result<Ciphertext> {
    if plain.is_ntt_form() {
        return Err(LeveeError::InvalidArgument(
            "BFV plaintext must be in coefficient form".into(),
        ));
    }
    let cd = context.first_context_data();
    let parms = cd.parms();
    let n = parms.poly_modulus_degree();
    let moduli = parms.coeff_modulus();
    let t = parms.plain_modulus().unwrap().value();
    if plain.coeff_count() > n || plain.data().iter().any(|&c| c >= t) {
        return Err(LeveeError::InvalidArgument(
            "plaintext is not valid for the encryption parameters".into(),
        ));
    }

    let mut ct = encryption_of_zero(pk_ct, &cd, context, rng)?;

    // Transform to coefficient form and fold in ⌊Q/t·m⌉
    for p in 0..2 {
        for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
            tables.inverse(ct.limb_mut(p, j));
        }
    }
    ct.set_ntt_form(false);
    add_noise(&mut ct, &cd, rng);
    multiply_add_plain_with_scaling_variant(plain, &cd, ct.poly_mut(0));
    Ok(ct)
}

fn ckks_encrypt<R: Rng>(
    plain: &Plaintext,
    pk_ct: &Ciphertext,
    context: &Arc<Context>,
    rng: &mut R,
) -> Result<Ciphertext> {
    if !plain.is_ntt_form() {
        return Err(LeveeError::InvalidArgument(
            "CKKS plaintext must be in NTT form".into(),
        ));
    }
    let cd = context.get_context_data(plain.parms_id()).ok_or_else(|| {
        LeveeError::InvalidArgument("plaintext level is not valid for the context".into())
    })?;
    let n = cd.parms().poly_modulus_degree();
    let moduli = cd.parms().coeff_modulus();

    let mut ct = encryption_of_zero(pk_ct, &cd, context, rng)?;
    add_noise_ntt(&mut ct, &cd, rng);
    for (j, modulus) in moduli.iter().enumerate() {
        add_poly_inplace(ct.limb_mut(0, j), &plain.data()[j * n..(j + 1) * n], modulus);
    }
    ct.set_scale(plain.scale());
    Ok(ct)
}

/// (pk0·u, pk1·u) at the level of `cd`, in NTT form, u ternary. The key-level
/// pk is truncated to the level's limbs; limb order is preserved by the
/// chain, so per-limb arithmetic stays valid.
fn encryption_of_zero<R: Rng>(
    pk_ct: &Ciphertext,
    cd: &Arc<ContextData>,
    context: &Arc<Context>,
    rng: &mut R,
) -> Result<Ciphertext> {
    let parms = cd.parms();
    let n = parms.poly_modulus_degree();
    let moduli = parms.coeff_modulus();
    let limb_count = moduli.len();

    let u = sample_ternary_signed(n, rng);
    let mut u_rns = vec![0u64; limb_count * n];
    signed_poly_to_rns(&u, moduli, &mut u_rns);

    let mut ct = Ciphertext::new();
    ct.resize(context, cd.parms_id(), 2)?;
    ct.set_ntt_form(true);
    for j in 0..limb_count {
        let modulus = &moduli[j];
        let tables = &cd.small_ntt_tables()[j];
        let u_limb = &mut u_rns[j * n..(j + 1) * n];
        tables.forward(u_limb);
        for p in 0..2 {
            let mut limb = pk_ct.limb(p, j).to_vec();
            dyadic_product_poly_inplace(&mut limb, u_limb, modulus);
            ct.limb_mut(p, j).copy_from_slice(&limb);
        }
    }
    Ok(ct)
}

/// Add fresh coefficient-domain noise to both components.
fn add_noise<R: Rng>(ct: &mut Ciphertext, cd: &Arc<ContextData>, rng: &mut R) {
    let n = cd.parms().poly_modulus_degree();
    let moduli = cd.parms().coeff_modulus();
    for p in 0..2 {
        let noise = sample_gaussian_signed(n, DEFAULT_NOISE_STANDARD_DEVIATION, rng);
        let mut e = vec![0u64; moduli.len() * n];
        signed_poly_to_rns(&noise, moduli, &mut e);
        for (j, modulus) in moduli.iter().enumerate() {
            add_poly_inplace(ct.limb_mut(p, j), &e[j * n..(j + 1) * n], modulus);
        }
    }
}

fn add_noise_ntt<R: Rng>(ct: &mut Ciphertext, cd: &Arc<ContextData>, rng: &mut R) {
    let n = cd.parms().poly_modulus_degree();
    let moduli = cd.parms().coeff_modulus();
    for p in 0..2 {
        let noise = sample_gaussian_signed(n, DEFAULT_NOISE_STANDARD_DEVIATION, rng);
        let mut e = vec![0u64; moduli.len() * n];
        signed_poly_to_rns(&noise, moduli, &mut e);
        for (j, modulus) in moduli.iter().enumerate() {
            let e_limb = &mut e[j * n..(j + 1) * n];
            cd.small_ntt_tables()[j].forward(e_limb);
            add_poly_inplace(ct.limb_mut(p, j), e_limb, modulus);
        }
    }
}

/// Decrypt a ciphertext of any size; the caller keeps responsibility for the
/// noise budget.
pub fn decrypt(ct: &Ciphertext, sk: &SecretKey, context: &Arc<Context>) -> Result<Plaintext> {
    if sk.parms_id() != context.key_parms_id() {
        return Err(LeveeError::InvalidArgument(
            "secret key does not match the context".into(),
        ));
    }
    if ct.size() < 2 {
        return Err(LeveeError::InvalidArgument("ciphertext is empty".into()));
    }
    let cd = context.get_context_data(ct.parms_id()).ok_or_else(|| {
        LeveeError::InvalidArgument("ciphertext is not valid for the context".into())
    })?;
    match cd.parms().scheme() {
        SchemeType::Bfv => bfv_decrypt(ct, sk, &cd),
        SchemeType::Ckks => ckks_decrypt(ct, sk, &cd),
    }
}

/// Phase c_0 + c_1·s + … in NTT form at the ciphertext's level.
fn compute_phase_ntt(ct: &Ciphertext, sk: &SecretKey, cd: &Arc<ContextData>) -> Vec<u64> {
    let parms = cd.parms();
    let n = parms.poly_modulus_degree();
    let moduli = parms.coeff_modulus();
    let limb_count = moduli.len();
    let in_ntt = ct.is_ntt_form();

    let mut acc = vec![0u64; limb_count * n];
    for (j, modulus) in moduli.iter().enumerate() {
        let tables = &cd.small_ntt_tables()[j];
        let s_base = &sk.data()[j * n..(j + 1) * n];
        let mut s_limb = s_base.to_vec();
        let acc_limb = &mut acc[j * n..(j + 1) * n];
        let mut c0 = ct.limb(0, j).to_vec();
        if !in_ntt {
            tables.forward(&mut c0);
        }
        acc_limb.copy_from_slice(&c0);
        for p in 1..ct.size() {
            let mut c = ct.limb(p, j).to_vec();
            if !in_ntt {
                tables.forward(&mut c);
            }
            dyadic_product_poly_inplace(&mut c, &s_limb, modulus);
            add_poly_inplace(acc_limb, &c, modulus);
            if p + 1 < ct.size() {
                dyadic_product_poly_inplace(&mut s_limb, s_base, modulus);
            }
        }
    }
    acc
}

fn bfv_decrypt(ct: &Ciphertext, sk: &SecretKey, cd: &Arc<ContextData>) -> Result<Plaintext> {
    if ct.is_ntt_form() {
        return Err(LeveeError::InvalidArgument(
            "BFV ciphertext cannot be in NTT form".into(),
        ));
    }
    let parms = cd.parms();
    let n = parms.poly_modulus_degree();
    let t = parms.plain_modulus().unwrap().value();
    let limb_count = parms.coeff_modulus().len();

    let mut phase = compute_phase_ntt(ct, sk, cd);
    for (j, tables) in cd.small_ntt_tables().iter().enumerate() {
        tables.inverse(&mut phase[j * n..(j + 1) * n]);
    }

    // Scale and round by t/Q through an exact CRT composition
    let base_q = cd.rns_tool().base_q();
    let q = base_q.prod().clone();
    let mut result = vec![0u64; n];
    let mut residues = vec![0u64; limb_count];
    for k in 0..n {
        for j in 0..limb_count {
            residues[j] = phase[j * n + k];
        }
        let x = base_q.compose(&residues);
        let scaled = (x * t + (&q >> 1)) / &q;
        let reduced: num_bigint::BigUint = scaled % t;
        result[k] = reduced.to_u64().unwrap();
    }
    Ok(Plaintext::from_coeffs(result))
}

fn ckks_decrypt(ct: &Ciphertext, sk: &SecretKey, cd: &Arc<ContextData>) -> Result<Plaintext> {
    if !ct.is_ntt_form() {
        return Err(LeveeError::InvalidArgument(
            "CKKS ciphertext must be in NTT form".into(),
        ));
    }
    let phase = compute_phase_ntt(ct, sk, cd);
    let mut plain = Plaintext::new();
    plain.resize(phase.len());
    plain.data_mut().copy_from_slice(&phase);
    plain.set_parms_id(*ct.parms_id());
    plain.set_scale(ct.scale());
    Ok(plain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::{gen_public_key_with_rng, gen_secret_key_with_rng};
    use crate::params::{coeff_modulus_create, EncryptionParams};
    use rand_chacha::ChaCha20Rng;

    fn bfv_context(n: usize) -> Arc<Context> {
        let moduli = coeff_modulus_create(n, &[40, 40]).unwrap();
        Context::new(EncryptionParams::bfv(n, moduli, 193).unwrap()).unwrap()
    }

    #[test]
    fn test_bfv_encrypt_decrypt_roundtrip() {
        let context = bfv_context(32);
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
        let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();

        let plain = Plaintext::from_coeffs(vec![1, 2, 3, 0, 192]);
        let ct = encrypt_with_rng(&plain, &pk, &context, &mut rng).unwrap();
        assert_eq!(ct.size(), 2);
        assert!(!ct.is_ntt_form());

        let decrypted = decrypt(&ct, &sk, &context).unwrap();
        assert_eq!(&decrypted.data()[..5], &[1, 2, 3, 0, 192]);
        assert!(decrypted.data()[5..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_bfv_symmetric_roundtrip() {
        let context = bfv_context(32);
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();

        for value in [0u64, 1, 100, 192] {
            let plain = Plaintext::from_coeffs(vec![value]);
            let ct = encrypt_symmetric_with_rng(&plain, &sk, &context, &mut rng).unwrap();
            let decrypted = decrypt(&ct, &sk, &context).unwrap();
            assert_eq!(decrypted.data()[0], value);
        }
    }

    #[test]
    fn test_rejects_oversized_plaintext() {
        let context = bfv_context(32);
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
        let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();
        let plain = Plaintext::from_coeffs(vec![500]); // >= t
        assert!(encrypt_with_rng(&plain, &pk, &context, &mut rng).is_err());
    }
}
