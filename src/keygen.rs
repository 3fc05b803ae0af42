//! Key generation: secret and public keys at the key level, and the
//! key-switching key material (relinearization and Galois keys).
//!
//! A key-switching key for a target secret s' is, per decomposition limb i,
//! an encryption of zero under s whose first component additionally carries
//! q_special·s' in limb i only. Summing T_i-weighted keys over i and
//! dividing out the special prime then realizes the switch of T from s'
//! to s.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::ciphertext::Ciphertext;
use crate::context::Context;
use crate::error::{LeveeError, Result};
use crate::keys::{GaloisKeys, KSwitchKeys, PublicKey, RelinKeys, SecretKey};
use crate::ring::poly::{
    add_poly_inplace, dyadic_product_poly, multiply_poly_scalar, negate_poly_inplace,
};
use crate::sampling::{
    sample_gaussian_signed, sample_ternary_signed, sample_uniform_limb, signed_poly_to_rns,
    DEFAULT_NOISE_STANDARD_DEVIATION,
};

pub fn gen_secret_key(context: &Arc<Context>) -> Result<SecretKey> {
    let mut rng = ChaCha20Rng::from_os_rng();
    gen_secret_key_with_rng(context, &mut rng)
}

/// Sample a ternary secret and store it in RNS-NTT form at the key level.
pub fn gen_secret_key_with_rng<R: Rng>(context: &Arc<Context>, rng: &mut R) -> Result<SecretKey> {
    let key_cd = context.key_context_data();
    let parms = key_cd.parms();
    let n = parms.poly_modulus_degree();
    let moduli = parms.coeff_modulus();

    let ternary = sample_ternary_signed(n, rng);
    let mut data = vec![0u64; moduli.len() * n];
    signed_poly_to_rns(&ternary, moduli, &mut data);
    for (j, tables) in key_cd.small_ntt_tables().iter().enumerate() {
        tables.forward(&mut data[j * n..(j + 1) * n]);
    }

    Ok(SecretKey {
        data,
        parms_id: *context.key_parms_id(),
    })
}

pub fn gen_public_key(sk: &SecretKey, context: &Arc<Context>) -> Result<PublicKey> {
    let mut rng = ChaCha20Rng::from_os_rng();
    gen_public_key_with_rng(sk, context, &mut rng)
}

/// pk = (-(a·s + e), a) at the key level, NTT form.
pub fn gen_public_key_with_rng<R: Rng>(
    sk: &SecretKey,
    context: &Arc<Context>,
    rng: &mut R,
) -> Result<PublicKey> {
    Ok(PublicKey(encrypt_zero_symmetric_ntt(sk, context, rng)?))
}

/// An encryption of zero under `sk` at the key level, in NTT form.
pub(crate) fn encrypt_zero_symmetric_ntt<R: Rng>(
    sk: &SecretKey,
    context: &Arc<Context>,
    rng: &mut R,
) -> Result<Ciphertext> {
    if sk.parms_id() != context.key_parms_id() {
        return Err(LeveeError::InvalidArgument(
            "secret key does not match the context".into(),
        ));
    }
    let key_cd = context.key_context_data();
    let parms = key_cd.parms();
    let n = parms.poly_modulus_degree();
    let moduli = parms.coeff_modulus();
    let limb_count = moduli.len();

    let noise = sample_gaussian_signed(n, DEFAULT_NOISE_STANDARD_DEVIATION, rng);
    let mut e = vec![0u64; limb_count * n];
    signed_poly_to_rns(&noise, moduli, &mut e);

    let mut ct = Ciphertext::new();
    ct.resize(context, context.key_parms_id(), 2)?;
    ct.set_ntt_form(true);

    for j in 0..limb_count {
        let modulus = &moduli[j];
        let tables = &key_cd.small_ntt_tables()[j];
        let e_limb = &mut e[j * n..(j + 1) * n];
        tables.forward(e_limb);

        // a is uniform in either representation; sample it directly in NTT
        let a = sample_uniform_limb(n, modulus, rng);
        let s_limb = &sk.data()[j * n..(j + 1) * n];

        let mut c0 = vec![0u64; n];
        dyadic_product_poly(&a, s_limb, modulus, &mut c0);
        add_poly_inplace(&mut c0, e_limb, modulus);
        negate_poly_inplace(&mut c0, modulus);

        ct.limb_mut(0, j).copy_from_slice(&c0);
        ct.limb_mut(1, j).copy_from_slice(&a);
    }
    Ok(ct)
}

/// One key-switching key for the target secret `new_key` (given in key-level
/// RNS-NTT form): per decomposition limb, encrypt-zero plus the
/// special-prime-weighted target in that limb.
fn gen_one_kswitch_key<R: Rng>(
    sk: &SecretKey,
    context: &Arc<Context>,
    new_key: &[u64],
    rng: &mut R,
) -> Result<Vec<Ciphertext>> {
    if !context.using_keyswitching() {
        return Err(LeveeError::LogicError(
            "key switching requires at least two coefficient primes".into(),
        ));
    }
    let key_cd = context.key_context_data();
    let parms = key_cd.parms();
    let n = parms.poly_modulus_degree();
    let moduli = parms.coeff_modulus();
    let key_limb_count = moduli.len();
    let decomp_count = key_limb_count - 1;
    let q_special = moduli[key_limb_count - 1].value();
    debug_assert_eq!(new_key.len(), key_limb_count * n);

    let mut keys = Vec::with_capacity(decomp_count);
    let mut temp = vec![0u64; n];
    for i in 0..decomp_count {
        let mut ct = encrypt_zero_symmetric_ntt(sk, context, rng)?;
        let modulus = &moduli[i];
        let factor = crate::ring::modular::MultiplyOperand::new(modulus.reduce(q_special), modulus);
        multiply_poly_scalar(&new_key[i * n..(i + 1) * n], &factor, modulus, &mut temp);
        add_poly_inplace(ct.limb_mut(0, i), &temp, modulus);
        keys.push(ct);
    }
    Ok(keys)
}

pub fn gen_relin_keys(sk: &SecretKey, context: &Arc<Context>) -> Result<RelinKeys> {
    let mut rng = ChaCha20Rng::from_os_rng();
    gen_relin_keys_with_rng(sk, context, 1, &mut rng)
}

/// Keys for collapsing secret powers s^2, …, s^{count+1}; `count` = 1
/// suffices when relinearization follows every multiplication.
pub fn gen_relin_keys_with_rng<R: Rng>(
    sk: &SecretKey,
    context: &Arc<Context>,
    count: usize,
    rng: &mut R,
) -> Result<RelinKeys> {
    if count == 0 {
        return Err(LeveeError::InvalidArgument(
            "at least one relinearization key is required".into(),
        ));
    }
    let key_cd = context.key_context_data();
    let n = key_cd.parms().poly_modulus_degree();
    let moduli = key_cd.parms().coeff_modulus();

    let mut keys = Vec::with_capacity(count);
    let mut power = sk.data().to_vec();
    for _ in 0..count {
        // next secret power, limb by limb in NTT form
        let mut next = vec![0u64; power.len()];
        for (j, modulus) in moduli.iter().enumerate() {
            dyadic_product_poly(
                &power[j * n..(j + 1) * n],
                &sk.data()[j * n..(j + 1) * n],
                modulus,
                &mut next[j * n..(j + 1) * n],
            );
        }
        keys.push(gen_one_kswitch_key(sk, context, &next, rng)?);
        power = next;
    }

    Ok(RelinKeys(KSwitchKeys {
        keys,
        parms_id: *context.key_parms_id(),
    }))
}

pub fn gen_galois_keys(sk: &SecretKey, context: &Arc<Context>, elts: &[u64]) -> Result<GaloisKeys> {
    let mut rng = ChaCha20Rng::from_os_rng();
    gen_galois_keys_with_rng(sk, context, elts, &mut rng)
}

/// Keys for the automorphisms X ↦ X^e, e odd in (0, 2N), keyed by
/// `GaloisKeys::get_index`.
pub fn gen_galois_keys_with_rng<R: Rng>(
    sk: &SecretKey,
    context: &Arc<Context>,
    elts: &[u64],
    rng: &mut R,
) -> Result<GaloisKeys> {
    let key_cd = context.key_context_data();
    let parms = key_cd.parms();
    let n = parms.poly_modulus_degree();
    let moduli = parms.coeff_modulus();
    let galois_tool = key_cd.galois_tool();

    let mut keys: Vec<Vec<Ciphertext>> = Vec::new();
    for &elt in elts {
        if elt & 1 == 0 || elt as usize >= 2 * n {
            return Err(LeveeError::InvalidArgument(format!(
                "Galois element {elt} is not valid"
            )));
        }
        // s(X^e) in NTT form is a permutation of the NTT values of s
        let mut rotated = vec![0u64; moduli.len() * n];
        for j in 0..moduli.len() {
            galois_tool.apply_galois_ntt(
                &sk.data()[j * n..(j + 1) * n],
                elt,
                &mut rotated[j * n..(j + 1) * n],
            );
        }
        let key = gen_one_kswitch_key(sk, context, &rotated, rng)?;
        let index = GaloisKeys::get_index(elt);
        if keys.len() <= index {
            keys.resize(index + 1, Vec::new());
        }
        keys[index] = key;
    }

    Ok(GaloisKeys(KSwitchKeys {
        keys,
        parms_id: *context.key_parms_id(),
    }))
}

pub fn gen_galois_keys_from_steps_with_rng<R: Rng>(
    sk: &SecretKey,
    context: &Arc<Context>,
    steps: &[i32],
    rng: &mut R,
) -> Result<GaloisKeys> {
    let elts = context
        .key_context_data()
        .galois_tool()
        .get_elts_from_steps(steps)?;
    gen_galois_keys_with_rng(sk, context, &elts, rng)
}

/// The default rotation key set: every power-of-two step in both directions
/// plus the column-swap element 2N-1. Arbitrary steps then decompose into
/// these via non-adjacent form.
pub fn default_galois_elts(context: &Arc<Context>) -> Result<Vec<u64>> {
    let key_cd = context.key_context_data();
    let n = key_cd.parms().poly_modulus_degree();
    let galois_tool = key_cd.galois_tool();
    let row_size = n / 2;

    let mut steps = Vec::new();
    let mut step = 1i32;
    while (step as usize) < row_size {
        steps.push(step);
        steps.push(-step);
        step *= 2;
    }
    let mut elts = galois_tool.get_elts_from_steps(&steps)?;
    elts.push(2 * n as u64 - 1);
    Ok(elts)
}
