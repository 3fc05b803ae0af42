use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use levee::encrypt::encrypt_with_rng;
use levee::eval::Evaluator;
use levee::keygen::{
    gen_galois_keys_from_steps_with_rng, gen_public_key_with_rng, gen_relin_keys_with_rng,
    gen_secret_key_with_rng,
};
use levee::params::{coeff_modulus_create, EncryptionParams};
use levee::{Context, Plaintext};

fn bfv_eval(c: &mut Criterion) {
    let n = 4096usize;
    let moduli = coeff_modulus_create(n, &[50, 50, 50]).unwrap();
    let parms = EncryptionParams::bfv(n, moduli, 1032193).unwrap();
    let context = Context::new(parms).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
    let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();
    let rk = gen_relin_keys_with_rng(&sk, &context, 1, &mut rng).unwrap();
    let gk = gen_galois_keys_from_steps_with_rng(&sk, &context, &[1], &mut rng).unwrap();
    let evaluator = Evaluator::new(context.clone()).unwrap();

    let pt1 = Plaintext::from_coeffs(vec![10, 20, 30]);
    let pt2 = Plaintext::from_coeffs(vec![40, 50, 60]);
    let ct1 = encrypt_with_rng(&pt1, &pk, &context, &mut rng).unwrap();
    let ct2 = encrypt_with_rng(&pt2, &pk, &context, &mut rng).unwrap();

    c.bench_function("bfv_add", |b| {
        b.iter(|| evaluator.add(black_box(&ct1), black_box(&ct2)).unwrap())
    });

    c.bench_function("bfv_multiply", |b| {
        b.iter(|| evaluator.multiply(black_box(&ct1), black_box(&ct2)).unwrap())
    });

    let product = evaluator.multiply(&ct1, &ct2).unwrap();
    c.bench_function("bfv_relinearize", |b| {
        b.iter(|| evaluator.relinearize(black_box(&product), &rk).unwrap())
    });

    c.bench_function("bfv_rotate_rows", |b| {
        b.iter(|| evaluator.rotate_rows(black_box(&ct1), 1, &gk).unwrap())
    });

    c.bench_function("bfv_mod_switch", |b| {
        b.iter(|| evaluator.mod_switch_to_next(black_box(&ct1)).unwrap())
    });
}

fn ntt_transform(c: &mut Criterion) {
    let n = 4096usize;
    let moduli = coeff_modulus_create(n, &[50, 50, 50]).unwrap();
    let parms = EncryptionParams::bfv(n, moduli, 1032193).unwrap();
    let context = Context::new(parms).unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(1);
    let sk = gen_secret_key_with_rng(&context, &mut rng).unwrap();
    let pk = gen_public_key_with_rng(&sk, &context, &mut rng).unwrap();
    let evaluator = Evaluator::new(context.clone()).unwrap();
    let ct = encrypt_with_rng(&Plaintext::from_coeffs(vec![1, 2, 3]), &pk, &context, &mut rng)
        .unwrap();

    c.bench_function("transform_to_ntt", |b| {
        b.iter(|| evaluator.transform_to_ntt(black_box(&ct)).unwrap())
    });
}

criterion_group!(benches, bfv_eval, ntt_transform);
criterion_main!(benches);
