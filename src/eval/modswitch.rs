//! Modulus switching and rescaling: one step down the chain at a time,
//! either dividing-and-rounding by the dropped prime (BFV mod switch, CKKS
//! rescale) or truncating the RNS representation losslessly (CKKS mod
//! switch). Iterative drivers walk the chain to a requested level.

use tracing::trace;

use crate::ciphertext::Ciphertext;
use crate::context::product_fits_in;
use crate::error::{LeveeError, Result};
use crate::eval::Evaluator;
use crate::params::{ParmsId, SchemeType};
use crate::plaintext::Plaintext;

impl Evaluator {
    /// Divide every component by the last prime of the level, rounding,
    /// producing a ciphertext at the next level. CKKS inputs stay in NTT
    /// form throughout; the scale is divided by the dropped prime.
    fn mod_switch_scale_to_next(
        &self,
        ct: &Ciphertext,
        destination: &mut Ciphertext,
    ) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        let scheme = cd.parms().scheme();
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
        let next_cd = self
            .context()
            .next_context_data(ct.parms_id())
            .ok_or(LeveeError::EndOfChain)?;

        let parms = cd.parms();
        let n = parms.poly_modulus_degree();
        let limb_count = parms.coeff_modulus().len();
        let next_limb_count = next_cd.parms().coeff_modulus().len();
        let rns_tool = cd.rns_tool();
        let q_last = parms.coeff_modulus()[limb_count - 1].value();
        trace!(next_limb_count, "mod_switch_scale_to_next");

        let size = ct.size();
        destination.resize(self.context(), next_cd.parms_id(), size)?;
        let mut buffer = vec![0u64; limb_count * n];
        for p in 0..size {
            buffer.copy_from_slice(ct.poly(p));
            match scheme {
                SchemeType::Bfv => rns_tool.divide_and_round_q_last_inplace(&mut buffer),
                SchemeType::Ckks => rns_tool
                    .divide_and_round_q_last_ntt_inplace(&mut buffer, cd.small_ntt_tables()),
            }
            destination
                .poly_mut(p)
                .copy_from_slice(&buffer[..next_limb_count * n]);
        }

        destination.set_ntt_form(ct.is_ntt_form());
        destination.set_scale(match scheme {
            SchemeType::Ckks => ct.scale() / q_last as f64,
            SchemeType::Bfv => ct.scale(),
        });
        Ok(())
    }

    /// Lossless level change: truncate every component to the next level's
    /// limbs. The scale must still fit under the smaller modulus.
    fn mod_switch_drop_to_next(
        &self,
        ct: &Ciphertext,
        destination: &mut Ciphertext,
    ) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        if cd.parms().scheme() == SchemeType::Ckks && !ct.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "CKKS ciphertext must be in NTT form".into(),
            ));
        }
        let next_cd = self
            .context()
            .next_context_data(ct.parms_id())
            .ok_or(LeveeError::EndOfChain)?;
        if !self.is_scale_within_bounds(ct.scale(), &next_cd) {
            return Err(LeveeError::ScaleOutOfBounds);
        }

        let n = next_cd.parms().poly_modulus_degree();
        let next_limb_count = next_cd.parms().coeff_modulus().len();
        let size = ct.size();
        if !product_fits_in(&[size, n, next_limb_count]) {
            return Err(LeveeError::LogicError("invalid parameters".into()));
        }

        let scale = ct.scale();
        let ntt_form = ct.is_ntt_form();
        let polys: Vec<Vec<u64>> = (0..size)
            .map(|p| ct.poly(p)[..next_limb_count * n].to_vec())
            .collect();
        destination.resize(self.context(), next_cd.parms_id(), size)?;
        for (p, poly) in polys.iter().enumerate() {
            destination.poly_mut(p).copy_from_slice(poly);
        }
        destination.set_ntt_form(ntt_form);
        destination.set_scale(scale);
        Ok(())
    }

    /// One step down the chain: BFV switches with scaling, CKKS drops.
    pub fn mod_switch_to_next(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.check_ciphertext(ct)?;
        if self.context().last_parms_id() == ct.parms_id() {
            return Err(LeveeError::EndOfChain);
        }
        let mut destination = Ciphertext::new();
        match self.context().scheme() {
            SchemeType::Bfv => self.mod_switch_scale_to_next(ct, &mut destination)?,
            SchemeType::Ckks => self.mod_switch_drop_to_next(ct, &mut destination)?,
        }
        self.check_transparent(&destination)?;
        Ok(destination)
    }

    pub fn mod_switch_to_next_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        *ct = self.mod_switch_to_next(ct)?;
        Ok(())
    }

    /// Walk the chain until the ciphertext reaches `parms_id`; switching
    /// toward a larger modulus is rejected.
    pub fn mod_switch_to_inplace(&self, ct: &mut Ciphertext, parms_id: &ParmsId) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        let target_cd = self.context().get_context_data(parms_id).ok_or_else(|| {
            LeveeError::InvalidArgument("parms_id is not valid for the context".into())
        })?;
        if cd.chain_index() < target_cd.chain_index() {
            return Err(LeveeError::InvalidArgument(
                "cannot switch to a higher-level modulus".into(),
            ));
        }
        while ct.parms_id() != parms_id {
            self.mod_switch_to_next_inplace(ct)?;
        }
        Ok(())
    }

    /// Plaintext level change: drop the trailing RNS limbs (NTT form only).
    pub fn mod_switch_plain_to_next_inplace(&self, plain: &mut Plaintext) -> Result<()> {
        if !plain.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "plain is not in NTT form".into(),
            ));
        }
        let cd = self.context().get_context_data(plain.parms_id()).ok_or_else(|| {
            LeveeError::InvalidArgument("plain is not valid for the context".into())
        })?;
        let next_cd = self
            .context()
            .next_context_data(cd.parms_id())
            .ok_or(LeveeError::EndOfChain)?;
        if !self.is_scale_within_bounds(plain.scale(), &next_cd) {
            return Err(LeveeError::ScaleOutOfBounds);
        }

        let n = next_cd.parms().poly_modulus_degree();
        let next_limb_count = next_cd.parms().coeff_modulus().len();
        let next_id = *next_cd.parms_id();
        plain.resize(next_limb_count * n);
        plain.set_parms_id(next_id);
        Ok(())
    }

    pub fn mod_switch_plain_to_inplace(
        &self,
        plain: &mut Plaintext,
        parms_id: &ParmsId,
    ) -> Result<()> {
        if !plain.is_ntt_form() {
            return Err(LeveeError::InvalidArgument(
                "plain is not in NTT form".into(),
            ));
        }
        let cd = self.context().get_context_data(plain.parms_id()).ok_or_else(|| {
            LeveeError::InvalidArgument("plain is not valid for the context".into())
        })?;
        let target_cd = self.context().get_context_data(parms_id).ok_or_else(|| {
            LeveeError::InvalidArgument("parms_id is not valid for the context".into())
        })?;
        if cd.chain_index() < target_cd.chain_index() {
            return Err(LeveeError::InvalidArgument(
                "cannot switch to a higher-level modulus".into(),
            ));
        }
        while plain.parms_id() != parms_id {
            self.mod_switch_plain_to_next_inplace(plain)?;
        }
        Ok(())
    }

    /// CKKS rescale: divide by the dropped prime, shrinking the scale.
    pub fn rescale_to_next(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        self.check_ciphertext(ct)?;
        if self.context().scheme() != SchemeType::Ckks {
            return Err(LeveeError::InvalidArgument(
                "unsupported operation for scheme type".into(),
            ));
        }
        if self.context().last_parms_id() == ct.parms_id() {
            return Err(LeveeError::EndOfChain);
        }
        let mut destination = Ciphertext::new();
        self.mod_switch_scale_to_next(ct, &mut destination)?;
        self.check_transparent(&destination)?;
        Ok(destination)
    }

    pub fn rescale_to_next_inplace(&self, ct: &mut Ciphertext) -> Result<()> {
        *ct = self.rescale_to_next(ct)?;
        Ok(())
    }

    pub fn rescale_to_inplace(&self, ct: &mut Ciphertext, parms_id: &ParmsId) -> Result<()> {
        let cd = self.check_ciphertext(ct)?;
        if self.context().scheme() != SchemeType::Ckks {
            return Err(LeveeError::InvalidArgument(
                "unsupported operation for scheme type".into(),
            ));
        }
        let target_cd = self.context().get_context_data(parms_id).ok_or_else(|| {
            LeveeError::InvalidArgument("parms_id is not valid for the context".into())
        })?;
        if cd.chain_index() < target_cd.chain_index() {
            return Err(LeveeError::InvalidArgument(
                "cannot switch to a higher-level modulus".into(),
            ));
        }
        while ct.parms_id() != parms_id {
            self.rescale_to_next_inplace(ct)?;
        }
        Ok(())
    }
}
