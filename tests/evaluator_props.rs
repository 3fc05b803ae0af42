//! End-to-end properties of the evaluator: algebraic laws under
//! encryption, transform round trips, rotation behavior, and the boundary
//! conditions every operation is required to reject.

use std::sync::Arc;

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use levee::encoding::{BatchEncoder, CkksEncoder};
use levee::encrypt::{decrypt, encrypt_with_rng};
use levee::eval::Evaluator;
use levee::keygen::{
    gen_galois_keys_from_steps_with_rng, gen_galois_keys_with_rng, gen_public_key_with_rng,
    gen_relin_keys_with_rng, gen_secret_key_with_rng,
};
use levee::keys::{PublicKey, SecretKey};
use levee::params::{coeff_modulus_create, EncryptionParams};
use levee::{Ciphertext, Context, Plaintext};

struct BfvFixture {
    context: Arc<Context>,
    sk: SecretKey,
    pk: PublicKey,
    evaluator: Evaluator,
    rng: ChaCha20Rng,
}

fn bfv_fixture(n: usize, bit_sizes: &[u32], plain_modulus: u64, seed: u64) -> BfvFixture {
    let moduli = coeff_modulus_create(n, bit_sizes).unwrap();
    let parms = EncryptionParams::bfv(n, moduli, plain_modulus).unwrap();
    let context = Context::new(parms).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
    let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();
    let evaluator = Evaluator::new(context.clone()).unwrap();
    BfvFixture {
        context,
        sk,
        pk,
        evaluator,
        rng,
    }
}

fn enc(f: &mut BfvFixture, coeffs: Vec<u64>) -> Ciphertext {
    encrypt_with_rng(&Plaintext::from_coeffs(coeffs), &f.pk, &f.context, &mut f.rng).unwrap()
}

fn dec(f: &BfvFixture, ct: &Ciphertext) -> Vec<u64> {
    decrypt(ct, &f.sk, &f.context).unwrap().data().to_vec()
}

// ---- concrete scenarios -----------------------------------------------

#[test]
fn bfv_polynomial_product() {
    let mut f = bfv_fixture(8192, &[60, 60, 60], 1032193, 42);
    let ct1 = enc(&mut f, vec![1, 2, 3]);
    let ct2 = enc(&mut f, vec![4, 5, 6]);
    let product = f.evaluator.multiply(&ct1, &ct2).unwrap();
    assert_eq!(product.size(), 3);
    let result = dec(&f, &product);
    assert_eq!(&result[..5], &[4, 13, 28, 27, 18]);
    assert!(result[5..].iter().all(|&c| c == 0));
}

#[test]
fn bfv_add_many_constants() {
    let mut f = bfv_fixture(8192, &[60, 60, 60], 1032193, 43);
    let cts: Vec<Ciphertext> = (0..7).map(|_| enc(&mut f, vec![5])).collect();
    let sum = f.evaluator.add_many(&cts).unwrap();
    assert_eq!(dec(&f, &sum)[0], 35);
}

#[test]
fn bfv_exponentiate() {
    let mut f = bfv_fixture(8192, &[50, 50, 50, 50, 50], 1032193, 44);
    let rk = gen_relin_keys_with_rng(&f.sk, &f.context, 1, &mut f.rng).unwrap();
    let ct = enc(&mut f, vec![2]);
    let power = f.evaluator.exponentiate(&ct, 6, &rk).unwrap();
    assert_eq!(power.size(), 2);
    assert_eq!(dec(&f, &power)[0], 64);
}

#[test]
fn ckks_multiply_and_rescale() {
    let n = 8192usize;
    let moduli = coeff_modulus_create(n, &[60, 40, 40, 60]).unwrap();
    let q_to_drop = moduli[2];
    let parms = EncryptionParams::ckks(n, moduli).unwrap();
    let context = Context::new(parms).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(45);
    let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
    let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();
    let rk = gen_relin_keys_with_rng(&sk, &context, 1, &mut rng).unwrap();
    let evaluator = Evaluator::new(context.clone()).unwrap();
    let encoder = CkksEncoder::new(context.clone()).unwrap();

    let scale = 2f64.powi(40);
    let plain = encoder
        .encode_f64(&[0.5, 0.25], context.first_parms_id(), scale)
        .unwrap();
    let ct = encrypt_with_rng(&plain, &pk, &context, &mut rng).unwrap();

    let mut product = evaluator.multiply(&ct, &ct).unwrap();
    assert!((product.scale().log2() - 80.0).abs() < 1e-9);
    evaluator.relinearize_inplace(&mut product, &rk).unwrap();
    evaluator.rescale_to_next_inplace(&mut product).unwrap();
    // new scale = s²/q_dropped
    let expected_scale = scale * scale / q_to_drop as f64;
    assert!((product.scale() / expected_scale - 1.0).abs() < 1e-12);

    let decoded = encoder
        .decode_f64(&decrypt(&product, &sk, &context).unwrap())
        .unwrap();
    let tolerance = 2f64.powi(-20);
    assert!((decoded[0] - 0.25).abs() < tolerance, "{}", decoded[0]);
    assert!((decoded[1] - 0.0625).abs() < tolerance, "{}", decoded[1]);
}

#[test]
fn bfv_rotate_with_naf_decomposition() {
    let n = 8192usize;
    let row_size = n / 2;
    let mut f = bfv_fixture(n, &[60, 60, 60], 1032193, 46);
    let encoder = BatchEncoder::new(f.context.clone()).unwrap();

    // Keys for power-of-two steps only; step 3 must go through 4 - 1
    let mut steps = Vec::new();
    let mut s = 1i32;
    while (s as usize) < row_size {
        steps.push(s);
        steps.push(-s);
        s *= 2;
    }
    let gk = gen_galois_keys_from_steps_with_rng(&f.sk, &f.context, &steps, &mut f.rng).unwrap();

    let values: Vec<u64> = (0..row_size as u64)
        .map(|i| i + 1)
        .chain((1..=row_size as u64).rev())
        .collect();
    let plain = encoder.encode(&values).unwrap();
    let ct = encrypt_with_rng(&plain, &f.pk, &f.context, &mut f.rng).unwrap();

    for rotation in [1i32, 3] {
        let rotated = f.evaluator.rotate_rows(&ct, rotation, &gk).unwrap();
        let decoded = encoder
            .decode(&decrypt(&rotated, &f.sk, &f.context).unwrap())
            .unwrap();
        for i in 0..row_size {
            let src = (i + rotation as usize) % row_size;
            assert_eq!(decoded[i], values[src], "row 0, slot {i}");
            assert_eq!(decoded[row_size + i], values[row_size + src], "row 1, slot {i}");
        }
    }

    // Rotating back must restore the original matrix
    let there = f.evaluator.rotate_rows(&ct, 2, &gk).unwrap();
    let back = f.evaluator.rotate_rows(&there, -2, &gk).unwrap();
    let decoded = encoder
        .decode(&decrypt(&back, &f.sk, &f.context).unwrap())
        .unwrap();
    assert_eq!(decoded, values);
}

#[test]
fn bfv_conjugation_swaps_rows() {
    let n = 8192usize;
    let mut f = bfv_fixture(n, &[60, 60, 60], 1032193, 47);
    let encoder = BatchEncoder::new(f.context.clone()).unwrap();
    let conj_elt = 2 * n as u64 - 1;
    let gk = gen_galois_keys_with_rng(&f.sk, &f.context, &[conj_elt], &mut f.rng).unwrap();

    let values: Vec<u64> = (0..n as u64).collect();
    let plain = encoder.encode(&values).unwrap();
    let ct = encrypt_with_rng(&plain, &f.pk, &f.context, &mut f.rng).unwrap();

    let mut swapped = ct.clone();
    f.evaluator
        .apply_galois_inplace(&mut swapped, conj_elt, &gk)
        .unwrap();
    let decoded = encoder
        .decode(&decrypt(&swapped, &f.sk, &f.context).unwrap())
        .unwrap();
    let row_size = n / 2;
    assert_eq!(&decoded[..row_size], &values[row_size..]);
    assert_eq!(&decoded[row_size..], &values[..row_size]);
}

// ---- algebraic laws ----------------------------------------------------

#[test]
fn bfv_add_sub_negate() {
    let mut f = bfv_fixture(1024, &[40, 40], 65537, 48);
    let ct1 = enc(&mut f, vec![100, 200, 300]);
    let ct2 = enc(&mut f, vec![40, 60, 80]);

    let sum = f.evaluator.add(&ct1, &ct2).unwrap();
    assert_eq!(&dec(&f, &sum)[..3], &[140, 260, 380]);

    let diff = f.evaluator.sub(&ct1, &ct2).unwrap();
    assert_eq!(&dec(&f, &diff)[..3], &[60, 140, 220]);

    let neg = f.evaluator.negate(&ct1).unwrap();
    assert_eq!(&dec(&f, &neg)[..3], &[65437, 65337, 65237]);
}

#[test]
fn bfv_square_matches_multiply() {
    let mut f = bfv_fixture(1024, &[40, 40, 40], 65537, 49);
    let ct = enc(&mut f, vec![3, 1]);
    let squared = f.evaluator.square(&ct).unwrap();
    let multiplied = f.evaluator.multiply(&ct, &ct).unwrap();
    assert_eq!(squared.size(), multiplied.size());
    assert_eq!(dec(&f, &squared), dec(&f, &multiplied));
    assert_eq!(&dec(&f, &squared)[..3], &[9, 6, 1]);
}

#[test]
fn bfv_relinearize_after_multiply() {
    let mut f = bfv_fixture(1024, &[40, 40, 40], 65537, 50);
    let rk = gen_relin_keys_with_rng(&f.sk, &f.context, 1, &mut f.rng).unwrap();
    let ct1 = enc(&mut f, vec![12]);
    let ct2 = enc(&mut f, vec![34]);
    let mut product = f.evaluator.multiply(&ct1, &ct2).unwrap();
    assert_eq!(product.size(), 3);
    f.evaluator.relinearize_inplace(&mut product, &rk).unwrap();
    assert_eq!(product.size(), 2);
    assert_eq!(dec(&f, &product)[0], 408);
}

#[test]
fn bfv_mod_switch_preserves_plaintext() {
    let mut f = bfv_fixture(1024, &[40, 40, 40], 65537, 51);
    let ct = enc(&mut f, vec![7, 11, 13]);
    let switched = f.evaluator.mod_switch_to_next(&ct).unwrap();
    assert_eq!(
        switched.coeff_modulus_size(),
        ct.coeff_modulus_size() - 1
    );
    assert_eq!(&dec(&f, &switched)[..3], &[7, 11, 13]);

    // And once more, down to the last level
    let mut again = switched.clone();
    f.evaluator
        .mod_switch_to_inplace(&mut again, f.context.last_parms_id())
        .unwrap();
    assert_eq!(&dec(&f, &again)[..3], &[7, 11, 13]);
}

#[test]
fn bfv_plain_operations() {
    let mut f = bfv_fixture(1024, &[40, 40], 65537, 52);
    let ct = enc(&mut f, vec![10, 20]);

    let plus = f
        .evaluator
        .add_plain(&ct, &Plaintext::from_coeffs(vec![5, 1]))
        .unwrap();
    assert_eq!(&dec(&f, &plus)[..2], &[15, 21]);

    let minus = f
        .evaluator
        .sub_plain(&ct, &Plaintext::from_coeffs(vec![5, 1]))
        .unwrap();
    assert_eq!(&dec(&f, &minus)[..2], &[5, 19]);

    // Monomial fast path: multiply by 2X
    let mono = f
        .evaluator
        .multiply_plain(&ct, &Plaintext::from_coeffs(vec![0, 2]))
        .unwrap();
    assert_eq!(&dec(&f, &mono)[..3], &[0, 20, 40]);

    // Monomial with a negative residue: multiply by (t-1)·X = -X
    let neg_mono = f
        .evaluator
        .multiply_plain(&ct, &Plaintext::from_coeffs(vec![0, 65536]))
        .unwrap();
    assert_eq!(&dec(&f, &neg_mono)[..3], &[0, 65527, 65517]);

    // General plaintext path
    let general = f
        .evaluator
        .multiply_plain(&ct, &Plaintext::from_coeffs(vec![3, 1]))
        .unwrap();
    assert_eq!(&dec(&f, &general)[..3], &[30, 70, 20]);
}

#[test]
fn bfv_multiply_plain_in_ntt_domain() {
    let mut f = bfv_fixture(1024, &[40, 40], 65537, 53);
    let ct = enc(&mut f, vec![10, 20]);
    let mut ct_ntt = ct.clone();
    f.evaluator.transform_to_ntt_inplace(&mut ct_ntt).unwrap();

    let mut plain = Plaintext::from_coeffs(vec![3, 1]);
    let parms_id = *ct_ntt.parms_id();
    f.evaluator
        .transform_plain_to_ntt_inplace(&mut plain, &parms_id)
        .unwrap();

    let mut product = f.evaluator.multiply_plain(&ct_ntt, &plain).unwrap();
    f.evaluator.transform_from_ntt_inplace(&mut product).unwrap();
    assert_eq!(&dec(&f, &product)[..3], &[30, 70, 20]);
}

#[test]
fn transform_round_trips_are_bit_identical() {
    let mut f = bfv_fixture(1024, &[40, 40], 65537, 54);
    let ct = enc(&mut f, vec![1, 2, 3]);

    let ntt = f.evaluator.transform_to_ntt(&ct).unwrap();
    let back = f.evaluator.transform_from_ntt(&ntt).unwrap();
    assert_eq!(back.data(), ct.data());

    let forth = f.evaluator.transform_to_ntt(&back).unwrap();
    assert_eq!(forth.data(), ntt.data());
}

#[test]
fn ckks_add_and_rotate() {
    let n = 4096usize;
    let moduli = coeff_modulus_create(n, &[50, 40, 50]).unwrap();
    let parms = EncryptionParams::ckks(n, moduli).unwrap();
    let context = Context::new(parms).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(55);
    let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
    let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();
    let gk =
        gen_galois_keys_from_steps_with_rng(&sk, &context, &[1, -1], &mut rng).unwrap();
    let evaluator = Evaluator::new(context.clone()).unwrap();
    let encoder = CkksEncoder::new(context.clone()).unwrap();

    let scale = 2f64.powi(40);
    let values = vec![1.0, 2.0, 3.0, 4.0];
    let plain = encoder
        .encode_f64(&values, context.first_parms_id(), scale)
        .unwrap();
    let ct = encrypt_with_rng(&plain, &pk, &context, &mut rng).unwrap();

    let doubled = evaluator.add(&ct, &ct).unwrap();
    let decoded = encoder
        .decode_f64(&decrypt(&doubled, &sk, &context).unwrap())
        .unwrap();
    for (d, v) in decoded.iter().zip(values.iter()) {
        assert!((d - 2.0 * v).abs() < 1e-4, "{d} vs {v}");
    }

    let rotated = evaluator.rotate_vector(&ct, 1, &gk).unwrap();
    let decoded = encoder
        .decode_f64(&decrypt(&rotated, &sk, &context).unwrap())
        .unwrap();
    for i in 0..3 {
        assert!((decoded[i] - values[i + 1]).abs() < 1e-3, "slot {i}");
    }
}

#[test]
fn ckks_mod_switch_drop_preserves_values() {
    let n = 4096usize;
    let moduli = coeff_modulus_create(n, &[50, 40, 50]).unwrap();
    let parms = EncryptionParams::ckks(n, moduli).unwrap();
    let context = Context::new(parms).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(56);
    let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
    let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();
    let evaluator = Evaluator::new(context.clone()).unwrap();
    let encoder = CkksEncoder::new(context.clone()).unwrap();

    let scale = 2f64.powi(30);
    let plain = encoder
        .encode_f64(&[1.5, -2.5], context.first_parms_id(), scale)
        .unwrap();
    let ct = encrypt_with_rng(&plain, &pk, &context, &mut rng).unwrap();
    let dropped = evaluator.mod_switch_to_next(&ct).unwrap();
    assert_eq!(dropped.coeff_modulus_size(), ct.coeff_modulus_size() - 1);
    assert!((dropped.scale() - scale).abs() < 1e-9);

    let decoded = encoder
        .decode_f64(&decrypt(&dropped, &sk, &context).unwrap())
        .unwrap();
    assert!((decoded[0] - 1.5).abs() < 1e-4);
    assert!((decoded[1] + 2.5).abs() < 1e-4);
}

// ---- boundary behaviors ------------------------------------------------

#[test]
fn multiply_rejects_ntt_mismatch() {
    let mut f = bfv_fixture(1024, &[40, 40], 65537, 57);
    let ct1 = enc(&mut f, vec![1]);
    let mut ct2 = enc(&mut f, vec![2]);
    f.evaluator.transform_to_ntt_inplace(&mut ct2).unwrap();
    assert!(f.evaluator.multiply(&ct1, &ct2).is_err());
    assert!(f.evaluator.multiply(&ct2, &ct2.clone()).is_err());
}

#[test]
fn add_rejects_scale_mismatch() {
    let n = 4096usize;
    let moduli = coeff_modulus_create(n, &[50, 40, 50]).unwrap();
    let parms = EncryptionParams::ckks(n, moduli).unwrap();
    let context = Context::new(parms).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(58);
    let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
    let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();
    let evaluator = Evaluator::new(context.clone()).unwrap();
    let encoder = CkksEncoder::new(context.clone()).unwrap();

    let p1 = encoder
        .encode_f64(&[1.0], context.first_parms_id(), 2f64.powi(30))
        .unwrap();
    let p2 = encoder
        .encode_f64(&[1.0], context.first_parms_id(), 2f64.powi(31))
        .unwrap();
    let ct1 = encrypt_with_rng(&p1, &pk, &context, &mut rng).unwrap();
    let ct2 = encrypt_with_rng(&p2, &pk, &context, &mut rng).unwrap();
    assert!(evaluator.add(&ct1, &ct2).is_err());
}

#[test]
fn mod_switch_at_last_level_fails() {
    let mut f = bfv_fixture(1024, &[40, 40], 65537, 59);
    let ct = enc(&mut f, vec![1]);
    let switched = f.evaluator.mod_switch_to_next(&ct).unwrap();
    assert!(f.evaluator.mod_switch_to_next(&switched).is_err());
}

#[test]
fn apply_galois_rejects_oversized_ciphertext() {
    let mut f = bfv_fixture(1024, &[40, 40, 40], 65537, 60);
    let gk = gen_galois_keys_with_rng(&f.sk, &f.context, &[3], &mut f.rng).unwrap();
    let ct1 = enc(&mut f, vec![1]);
    let ct2 = enc(&mut f, vec![2]);
    let mut product = f.evaluator.multiply(&ct1, &ct2).unwrap();
    assert!(f
        .evaluator
        .apply_galois_inplace(&mut product, 3, &gk)
        .is_err());
}

#[test]
fn rotation_without_key_reports_missing_key() {
    let mut f = bfv_fixture(1024, &[40, 40, 40], 65537, 61);
    // Only the +2 step key exists; rotating by 1 is a single-term NAF
    let gk = gen_galois_keys_from_steps_with_rng(&f.sk, &f.context, &[2], &mut f.rng).unwrap();
    let mut ct = enc(&mut f, vec![1]);
    let err = f.evaluator.rotate_rows_inplace(&mut ct, 1, &gk);
    assert!(matches!(err, Err(levee::LeveeError::MissingGaloisKey)));
}

#[test]
fn multiply_many_edge_cases() {
    let mut f = bfv_fixture(1024, &[40, 40, 40], 65537, 62);
    let rk = gen_relin_keys_with_rng(&f.sk, &f.context, 1, &mut f.rng).unwrap();
    assert!(f.evaluator.multiply_many(&[], &rk).is_err());

    let ct = enc(&mut f, vec![9]);
    let single = f.evaluator.multiply_many(std::slice::from_ref(&ct), &rk).unwrap();
    assert_eq!(dec(&f, &single), dec(&f, &ct));

    let err = f.evaluator.exponentiate(&ct, 0, &rk);
    assert!(err.is_err());
}

// ---- randomized laws ---------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_add_sub_roundtrip(
        a in proptest::collection::vec(0u64..193, 8),
        b in proptest::collection::vec(0u64..193, 8),
        seed in any::<u64>()
    ) {
        let mut f = bfv_fixture(32, &[40, 40], 193, seed);
        let ct_a = enc(&mut f, a.clone());
        let ct_b = enc(&mut f, b.clone());
        let mut sum = f.evaluator.add(&ct_a, &ct_b).unwrap();
        f.evaluator.sub_inplace(&mut sum, &ct_b).unwrap();
        prop_assert_eq!(&dec(&f, &sum)[..8], &a[..]);
    }

    #[test]
    fn prop_multiply_matches_negacyclic_product(
        a in proptest::collection::vec(0u64..16, 4),
        b in proptest::collection::vec(0u64..16, 4),
        seed in any::<u64>()
    ) {
        let t = 193u64;
        let n = 32usize;
        let mut f = bfv_fixture(n, &[40, 40], t, seed);

        let mut expected = vec![0u64; n];
        for (i, &x) in a.iter().enumerate() {
            for (j, &y) in b.iter().enumerate() {
                let prod = x * y % t;
                let idx = i + j;
                if idx < n {
                    expected[idx] = (expected[idx] + prod) % t;
                } else {
                    expected[idx - n] = (expected[idx - n] + t - prod) % t;
                }
            }
        }

        let ct_a = enc(&mut f, a);
        let ct_b = enc(&mut f, b);
        let product = f.evaluator.multiply(&ct_a, &ct_b).unwrap();
        prop_assert_eq!(dec(&f, &product), expected);
    }
}
