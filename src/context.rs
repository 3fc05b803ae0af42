//! The modulus-switching chain. A [`Context`] validates a parameter set and
//! precomputes, for every level, the tables the evaluator consumes: NTT
//! tables per prime, the RNS toolbox, the Galois tool, and the plain-lift
//! constants for BFV. The key level (all primes, including the special one)
//! sits above the first data level and is used only during key switching.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};

use crate::error::{LeveeError, Result};
use crate::params::{supports_batching, EncryptionParams, ParmsId, SchemeType};
use crate::ring::galois::GaloisTool;
use crate::ring::modular::MultiplyOperand;
use crate::ring::ntt::NttTables;
use crate::ring::rns::{RnsBase, RnsTool};

#[derive(Clone, Copy, Debug, Default)]
pub struct EncryptionQualifiers {
    /// Slot encoding is available: CKKS always, BFV when t is a prime
    /// ≡ 1 mod 2N.
    pub using_batching: bool,
    /// Every coefficient prime exceeds t, so plaintext lifting works
    /// limb-by-limb without multiprecision arithmetic.
    pub using_fast_plain_lift: bool,
}

/// Precomputed state for one node of the modulus chain.
pub struct ContextData {
    parms: EncryptionParams,
    chain_index: usize,
    next_parms_id: Option<ParmsId>,
    small_ntt_tables: Vec<NttTables>,
    plain_ntt_tables: Option<NttTables>,
    rns_tool: RnsTool,
    galois_tool: GaloisTool,
    total_coeff_modulus_bit_count: u32,
    // Δ = ⌊Q/t⌋ mod q_i (BFV)
    coeff_div_plain_modulus: Vec<MultiplyOperand>,
    // (t+1)/2: plaintext coefficients at or above this represent negatives
    plain_upper_half_threshold: u64,
    // q_i - t per limb, present iff using_fast_plain_lift
    plain_upper_half_increment: Vec<u64>,
    // Q - t, for the multiprecision lift path
    plain_upper_half_increment_big: Option<BigUint>,
    // Q mod t
    coeff_modulus_mod_plain_modulus: u64,
    qualifiers: EncryptionQualifiers,
}

impl ContextData {
    fn new(parms: EncryptionParams) -> Result<Self> {
        let n = parms.poly_modulus_degree();
        let power = n.trailing_zeros();
        let moduli = parms.coeff_modulus().to_vec();

        let small_ntt_tables = moduli
            .iter()
            .map(|m| NttTables::new(power, m))
            .collect::<Result<Vec<_>>>()?;
        let rns_tool = RnsTool::new(power, &RnsBase::new(&moduli)?)?;
        let galois_tool = GaloisTool::new(power);

        let total_q: BigUint = moduli.iter().fold(BigUint::from(1u8), |acc, m| acc * m.value());
        let total_coeff_modulus_bit_count = total_q.bits() as u32;

        let chain_index = moduli.len() - 1;

        let mut coeff_div_plain_modulus = Vec::new();
        let mut plain_upper_half_threshold = 0u64;
        let mut plain_upper_half_increment = Vec::new();
        let mut plain_upper_half_increment_big = None;
        let mut coeff_modulus_mod_plain_modulus = 0u64;
        let mut qualifiers = EncryptionQualifiers::default();

        match parms.scheme() {
            SchemeType::Bfv => {
                let t = parms
                    .plain_modulus()
                    .ok_or_else(|| LeveeError::InvalidParam("BFV requires a plain modulus".into()))?
                    .clone();
                let delta = &total_q / t.value();
                if delta.is_zero() {
                    return Err(LeveeError::InvalidParam(
                        "plain modulus exceeds the coefficient modulus".into(),
                    ));
                }
                coeff_div_plain_modulus = moduli
                    .iter()
                    .map(|m| {
                        MultiplyOperand::new((&delta % m.value()).to_u64().unwrap(), m)
                    })
                    .collect();
                coeff_modulus_mod_plain_modulus =
                    (&total_q % t.value()).to_u64().unwrap();
                plain_upper_half_threshold = (t.value() + 1) >> 1;

                qualifiers.using_fast_plain_lift =
                    moduli.iter().all(|m| m.value() > t.value());
                if qualifiers.using_fast_plain_lift {
                    plain_upper_half_increment =
                        moduli.iter().map(|m| m.value() - t.value()).collect();
                } else {
                    plain_upper_half_increment_big = Some(&total_q - t.value());
                }
                qualifiers.using_batching = supports_batching(t.value(), n);
            }
            SchemeType::Ckks => {
                qualifiers.using_batching = true;
            }
        }

        let plain_ntt_tables = match parms.scheme() {
            SchemeType::Bfv if qualifiers.using_batching => {
                Some(NttTables::new(power, parms.plain_modulus().unwrap())?)
            }
            _ => None,
        };

        Ok(Self {
            parms,
            chain_index,
            next_parms_id: None,
            small_ntt_tables,
            plain_ntt_tables,
            rns_tool,
            galois_tool,
            total_coeff_modulus_bit_count,
            coeff_div_plain_modulus,
            plain_upper_half_threshold,
            plain_upper_half_increment,
            plain_upper_half_increment_big,
            coeff_modulus_mod_plain_modulus,
            qualifiers,
        })
    }

    #[inline]
    pub fn parms(&self) -> &EncryptionParams {
        &self.parms
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        self.parms.parms_id()
    }

    /// Position in the chain; the last (smallest-modulus) level has index 0.
    #[inline]
    pub fn chain_index(&self) -> usize {
        self.chain_index
    }

    #[inline]
    pub fn next_parms_id(&self) -> Option<&ParmsId> {
        self.next_parms_id.as_ref()
    }

    #[inline]
    pub fn small_ntt_tables(&self) -> &[NttTables] {
        &self.small_ntt_tables
    }

    #[inline]
    pub fn plain_ntt_tables(&self) -> Option<&NttTables> {
        self.plain_ntt_tables.as_ref()
    }

    #[inline]
    pub fn rns_tool(&self) -> &RnsTool {
        &self.rns_tool
    }

    #[inline]
    pub fn galois_tool(&self) -> &GaloisTool {
        &self.galois_tool
    }

    #[inline]
    pub fn total_coeff_modulus_bit_count(&self) -> u32 {
        self.total_coeff_modulus_bit_count
    }

    #[inline]
    pub fn coeff_div_plain_modulus(&self) -> &[MultiplyOperand] {
        &self.coeff_div_plain_modulus
    }

    #[inline]
    pub fn plain_upper_half_threshold(&self) -> u64 {
        self.plain_upper_half_threshold
    }

    #[inline]
    pub fn plain_upper_half_increment(&self) -> &[u64] {
        &self.plain_upper_half_increment
    }

    #[inline]
    pub fn plain_upper_half_increment_big(&self) -> Option<&BigUint> {
        self.plain_upper_half_increment_big.as_ref()
    }

    #[inline]
    pub fn coeff_modulus_mod_plain_modulus(&self) -> u64 {
        self.coeff_modulus_mod_plain_modulus
    }

    #[inline]
    pub fn qualifiers(&self) -> &EncryptionQualifiers {
        &self.qualifiers
    }
}

/// The validated parameter chain shared read-only by every component.
pub struct Context {
    key_parms_id: ParmsId,
    first_parms_id: ParmsId,
    last_parms_id: ParmsId,
    data: HashMap<ParmsId, Arc<ContextData>>,
    using_keyswitching: bool,
}

impl Context {
    pub fn new(parms: EncryptionParams) -> Result<Arc<Self>> {
        if parms.scheme() == SchemeType::Bfv {
            let t = parms
                .plain_modulus()
                .ok_or_else(|| LeveeError::InvalidParam("BFV requires a plain modulus".into()))?;
            // The chain terminus must still leave room for Δ ≥ 1
            if t.value() >= parms.coeff_modulus()[0].value() {
                return Err(LeveeError::InvalidParam(
                    "plain modulus must be smaller than the last-level coefficient modulus".into(),
                ));
            }
            for m in parms.coeff_modulus() {
                let mut a = m.value();
                let mut b = t.value();
                while b != 0 {
                    let r = a % b;
                    a = b;
                    b = r;
                }
                if a != 1 {
                    return Err(LeveeError::InvalidParam(
                        "plain modulus must be coprime to the coefficient modulus".into(),
                    ));
                }
            }
        }

        // Walk the chain: key level first, dropping the last prime per level.
        let mut levels = Vec::new();
        let mut current = Some(parms);
        while let Some(p) = current {
            current = p.next_level();
            levels.push(ContextData::new(p)?);
        }
        for i in 0..levels.len() - 1 {
            levels[i].next_parms_id = Some(*levels[i + 1].parms_id());
        }

        let key_parms_id = *levels[0].parms_id();
        let using_keyswitching = levels.len() > 1;
        let first_parms_id = if using_keyswitching {
            *levels[1].parms_id()
        } else {
            key_parms_id
        };
        let last_parms_id = *levels.last().unwrap().parms_id();

        let data = levels
            .into_iter()
            .map(|cd| (*cd.parms_id(), Arc::new(cd)))
            .collect();

        Ok(Arc::new(Self {
            key_parms_id,
            first_parms_id,
            last_parms_id,
            data,
            using_keyswitching,
        }))
    }

    #[inline]
    pub fn get_context_data(&self, parms_id: &ParmsId) -> Option<Arc<ContextData>> {
        self.data.get(parms_id).cloned()
    }

    /// The key level: all primes, including the special one.
    #[inline]
    pub fn key_context_data(&self) -> Arc<ContextData> {
        self.data[&self.key_parms_id].clone()
    }

    /// The highest data level, where fresh ciphertexts live.
    #[inline]
    pub fn first_context_data(&self) -> Arc<ContextData> {
        self.data[&self.first_parms_id].clone()
    }

    pub fn next_context_data(&self, parms_id: &ParmsId) -> Option<Arc<ContextData>> {
        self.data
            .get(parms_id)
            .and_then(|cd| cd.next_parms_id())
            .map(|id| self.data[id].clone())
    }

    #[inline]
    pub fn key_parms_id(&self) -> &ParmsId {
        &self.key_parms_id
    }

    #[inline]
    pub fn first_parms_id(&self) -> &ParmsId {
        &self.first_parms_id
    }

    #[inline]
    pub fn last_parms_id(&self) -> &ParmsId {
        &self.last_parms_id
    }

    #[inline]
    pub fn using_keyswitching(&self) -> bool {
        self.using_keyswitching
    }

    #[inline]
    pub fn scheme(&self) -> SchemeType {
        self.key_context_data().parms().scheme()
    }

    /// Convenience used by tests and callers that address levels by their
    /// distance from the key level.
    pub fn context_data_at_chain_index(&self, chain_index: usize) -> Option<Arc<ContextData>> {
        self.data
            .values()
            .find(|cd| cd.chain_index() == chain_index)
            .cloned()
    }
}

pub(crate) fn product_fits_in(factors: &[usize]) -> bool {
    let mut acc: usize = 1;
    for &f in factors {
        match acc.checked_mul(f) {
            Some(v) => acc = v,
            None => return false,
        }
    }
    true
}
