//! # Levee: leveled BFV/CKKS homomorphic evaluation
//!
//! A leveled Ring-LWE homomorphic encryption library over RNS polynomial
//! rings, supporting exact integer arithmetic (BFV) and approximate
//! fixed-point arithmetic (CKKS). The centerpiece is the [`Evaluator`]:
//! negation, addition, full-RNS (BEHZ) multiplication, relinearization,
//! modulus switching and rescaling, plaintext operations, NTT transforms,
//! and Galois rotations with non-adjacent-form planning over an incomplete
//! rotation key set.
//!
//! ## Quick start
//!
//! ```no_run
//! use levee::prelude::*;
//!
//! let moduli = coeff_modulus_create(8192, &[50, 50, 50]).unwrap();
//! let parms = EncryptionParams::bfv(8192, moduli, 1032193).unwrap();
//! let context = Context::new(parms).unwrap();
//!
//! let sk = gen_secret_key(&context).unwrap();
//! let pk = gen_public_key(&sk, &context).unwrap();
//! let rk = gen_relin_keys(&sk, &context).unwrap();
//! let evaluator = Evaluator::new(context.clone()).unwrap();
//!
//! let ct1 = encrypt(&Plaintext::from_coeffs(vec![3]), &pk, &context).unwrap();
//! let ct2 = encrypt(&Plaintext::from_coeffs(vec![7]), &pk, &context).unwrap();
//! let mut product = evaluator.multiply(&ct1, &ct2).unwrap();
//! evaluator.relinearize_inplace(&mut product, &rk).unwrap();
//! let result = decrypt(&product, &sk, &context).unwrap();
//! assert_eq!(result.data()[0], 21);
//! ```

pub mod ciphertext;
pub mod context;
pub mod encoding;
pub mod encrypt;
pub mod error;
pub mod eval;
pub mod keygen;
pub mod keys;
pub mod params;
pub mod plaintext;
pub mod ring;
pub mod sampling;

mod scaling;

pub use ciphertext::Ciphertext;
pub use context::Context;
pub use error::{LeveeError, Result};
pub use eval::Evaluator;
pub use keys::{GaloisKeys, KSwitchKeys, PublicKey, RelinKeys, SecretKey};
pub use params::{EncryptionParams, ParmsId, SchemeType, PARMS_ID_ZERO};
pub use plaintext::Plaintext;

/// Convenient re-exports for common types and functions.
pub mod prelude {
    pub use crate::ciphertext::Ciphertext;
    pub use crate::context::Context;
    pub use crate::encoding::{BatchEncoder, CkksEncoder};
    pub use crate::encrypt::{
        decrypt, encrypt, encrypt_symmetric_with_rng, encrypt_with_rng,
    };
    pub use crate::error::{LeveeError, Result};
    pub use crate::eval::Evaluator;
    pub use crate::keygen::{
        default_galois_elts, gen_galois_keys, gen_galois_keys_from_steps_with_rng,
        gen_galois_keys_with_rng, gen_public_key, gen_public_key_with_rng, gen_relin_keys,
        gen_relin_keys_with_rng, gen_secret_key, gen_secret_key_with_rng,
    };
    pub use crate::keys::{GaloisKeys, PublicKey, RelinKeys, SecretKey};
    pub use crate::params::{
        coeff_modulus_create, plain_modulus_batching, EncryptionParams, SchemeType,
    };
    pub use crate::plaintext::Plaintext;
}
