//! Coefficient-wise operations on single RNS limbs of a polynomial in
//! Z_q[X]/(X^n + 1), stored as flat `u64` slices.
//!
//! Callers iterate explicitly over the (component, limb, coefficient) axes;
//! these helpers handle one limb at a time so the innermost loop stays a
//! plain slice traversal the compiler can vectorize.

use crate::ring::modular::{
    add_mod, mul_operand_mod, neg_mod, sub_mod, Modulus, MultiplyOperand,
};

/// result = -v (coefficient-wise), assumes v < q.
pub fn negate_poly(v: &[u64], modulus: &Modulus, result: &mut [u64]) {
    let q = modulus.value();
    for (r, &x) in result.iter_mut().zip(v.iter()) {
        *r = neg_mod(x, q);
    }
}

pub fn negate_poly_inplace(v: &mut [u64], modulus: &Modulus) {
    let q = modulus.value();
    for x in v.iter_mut() {
        *x = neg_mod(*x, q);
    }
}

/// result = a + b (coefficient-wise), assumes a, b < q.
pub fn add_poly(a: &[u64], b: &[u64], modulus: &Modulus, result: &mut [u64]) {
    let q = modulus.value();
    for ((r, &x), &y) in result.iter_mut().zip(a.iter()).zip(b.iter()) {
        *r = add_mod(x, y, q);
    }
}

pub fn add_poly_inplace(a: &mut [u64], b: &[u64], modulus: &Modulus) {
    let q = modulus.value();
    for (x, &y) in a.iter_mut().zip(b.iter()) {
        *x = add_mod(*x, y, q);
    }
}

/// result = a - b (coefficient-wise), assumes a, b < q.
pub fn sub_poly(a: &[u64], b: &[u64], modulus: &Modulus, result: &mut [u64]) {
    let q = modulus.value();
    for ((r, &x), &y) in result.iter_mut().zip(a.iter()).zip(b.iter()) {
        *r = sub_mod(x, y, q);
    }
}

pub fn sub_poly_inplace(a: &mut [u64], b: &[u64], modulus: &Modulus) {
    let q = modulus.value();
    for (x, &y) in a.iter_mut().zip(b.iter()) {
        *x = sub_mod(*x, y, q);
    }
}

/// result = scalar · v (coefficient-wise). The scalar must already be reduced.
pub fn multiply_poly_scalar(
    v: &[u64],
    scalar: &MultiplyOperand,
    modulus: &Modulus,
    result: &mut [u64],
) {
    for (r, &x) in result.iter_mut().zip(v.iter()) {
        *r = mul_operand_mod(x, scalar, modulus);
    }
}

pub fn multiply_poly_scalar_inplace(v: &mut [u64], scalar: &MultiplyOperand, modulus: &Modulus) {
    for x in v.iter_mut() {
        *x = mul_operand_mod(*x, scalar, modulus);
    }
}

/// result = a ⊙ b, the coefficient-wise (dyadic) product.
pub fn dyadic_product_poly(a: &[u64], b: &[u64], modulus: &Modulus, result: &mut [u64]) {
    for ((r, &x), &y) in result.iter_mut().zip(a.iter()).zip(b.iter()) {
        *r = modulus.reduce_u128(x as u128 * y as u128);
    }
}

pub fn dyadic_product_poly_inplace(a: &mut [u64], b: &[u64], modulus: &Modulus) {
    for (x, &y) in a.iter_mut().zip(b.iter()) {
        *x = modulus.reduce_u128(*x as u128 * y as u128);
    }
}

/// result = v mod q, Barrett-reducing each coefficient from the full 64-bit
/// range.
pub fn reduce_poly(v: &[u64], modulus: &Modulus, result: &mut [u64]) {
    for (r, &x) in result.iter_mut().zip(v.iter()) {
        *r = modulus.reduce(x);
    }
}

/// Multiply by X^shift in Z_q[X]/(X^n + 1). Coefficients wrapping past X^n
/// pick up a sign flip. `shift` is taken mod 2n.
pub fn negacyclic_shift_poly(v: &[u64], shift: usize, modulus: &Modulus, result: &mut [u64]) {
    let n = result.len();
    debug_assert!(n.is_power_of_two());
    if shift == 0 {
        result.copy_from_slice(v);
        return;
    }
    let q = modulus.value();
    let mask = n - 1;
    let mut index_raw = shift;
    for &c in v.iter() {
        let index = index_raw & mask;
        if c == 0 || (index_raw & n) == 0 {
            result[index] = c;
        } else {
            result[index] = q - c;
        }
        index_raw += 1;
    }
}

/// In-place multiply by the monomial coeff·X^exponent in Z_q[X]/(X^n + 1).
pub fn negacyclic_multiply_mono_inplace(
    v: &mut [u64],
    mono_coeff: u64,
    mono_exponent: usize,
    modulus: &Modulus,
) {
    let w = MultiplyOperand::new(modulus.reduce(mono_coeff), modulus);
    let mut temp = vec![0u64; v.len()];
    multiply_poly_scalar(v, &w, modulus, &mut temp);
    negacyclic_shift_poly(&temp, mono_exponent, modulus, v);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modulus() -> Modulus {
        Modulus::new(17).unwrap()
    }

    #[test]
    fn test_add_sub_negate() {
        let m = modulus();
        let a = vec![1u64, 2, 3, 16];
        let b = vec![5u64, 6, 15, 8];
        let mut c = vec![0u64; 4];
        add_poly(&a, &b, &m, &mut c);
        assert_eq!(c, vec![6, 8, 1, 7]);
        sub_poly_inplace(&mut c, &b, &m);
        assert_eq!(c, a);
        let mut n = vec![0u64; 4];
        negate_poly(&a, &m, &mut n);
        add_poly_inplace(&mut n, &a, &m);
        assert_eq!(n, vec![0; 4]);
    }

    #[test]
    fn test_scalar_and_dyadic() {
        let m = modulus();
        let mut a = vec![1u64, 2, 3, 4];
        let w = MultiplyOperand::new(3, &m);
        multiply_poly_scalar_inplace(&mut a, &w, &m);
        assert_eq!(a, vec![3, 6, 9, 12]);
        let b = vec![2u64, 2, 2, 2];
        dyadic_product_poly_inplace(&mut a, &b, &m);
        assert_eq!(a, vec![6, 12, 1, 7]);
    }

    #[test]
    fn test_reduce() {
        let m = modulus();
        let a = vec![17u64, 18, 35, u64::MAX];
        let mut r = vec![0u64; 4];
        reduce_poly(&a, &m, &mut r);
        assert_eq!(r, vec![0, 1, 1, u64::MAX % 17]);
    }

    #[test]
    fn test_negacyclic_shift() {
        let m = modulus();
        // (1 + 2X + 3X^2 + 4X^3)·X in Z_17[X]/(X^4+1) = -4 + X + 2X^2 + 3X^3
        let a = vec![1u64, 2, 3, 4];
        let mut r = vec![0u64; 4];
        negacyclic_shift_poly(&a, 1, &m, &mut r);
        assert_eq!(r, vec![13, 1, 2, 3]);
        // Shift by 2n is the identity
        negacyclic_shift_poly(&a, 8, &m, &mut r);
        assert_eq!(r, a);
        // Shift by n negates
        negacyclic_shift_poly(&a, 4, &m, &mut r);
        assert_eq!(r, vec![16, 15, 14, 13]);
    }

    #[test]
    fn test_mono_multiply() {
        let m = modulus();
        // (1 + X^3)·2X = 2X + 2X^4 = -2 + 2X
        let mut a = vec![1u64, 0, 0, 1];
        negacyclic_multiply_mono_inplace(&mut a, 2, 1, &m);
        assert_eq!(a, vec![15, 2, 0, 0]);
    }
}
