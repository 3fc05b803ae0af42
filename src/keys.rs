//! Key material. The secret key lives at the key level in NTT form and is
//! wiped on drop; all key-switching keys are lists of key-level NTT
//! ciphertexts indexed by a static convention per key kind.

use zeroize::Zeroize;

use crate::ciphertext::Ciphertext;
use crate::params::ParmsId;

/// Secret key: a ternary ring element in RNS-NTT form at the key level.
pub struct SecretKey {
    pub(crate) data: Vec<u64>,
    pub(crate) parms_id: ParmsId,
}

impl SecretKey {
    #[inline]
    pub fn data(&self) -> &[u64] {
        &self.data
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        &self.parms_id
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// Public key: a size-2 encryption of zero at the key level, NTT form.
#[derive(Clone, Debug)]
pub struct PublicKey(pub(crate) Ciphertext);

impl PublicKey {
    #[inline]
    pub fn ciphertext(&self) -> &Ciphertext {
        &self.0
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        self.0.parms_id()
    }
}

/// A list of key-switching keys. `keys[index]` holds, per decomposition
/// limb, one key-level ciphertext; an empty inner list means "no key at
/// this index".
#[derive(Clone, Debug, Default)]
pub struct KSwitchKeys {
    pub(crate) keys: Vec<Vec<Ciphertext>>,
    pub(crate) parms_id: ParmsId,
}

impl KSwitchKeys {
    #[inline]
    pub fn data(&self) -> &[Vec<Ciphertext>] {
        &self.keys
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        &self.parms_id
    }
}

/// Relinearization keys: the key collapsing the ciphertext component that
/// multiplies secret power p sits at index p - 2.
#[derive(Clone, Debug)]
pub struct RelinKeys(pub(crate) KSwitchKeys);

impl RelinKeys {
    #[inline]
    pub fn get_index(key_power: usize) -> usize {
        debug_assert!(key_power >= 2);
        key_power - 2
    }

    pub fn has_key(&self, key_power: usize) -> bool {
        let index = Self::get_index(key_power);
        index < self.0.keys.len() && !self.0.keys[index].is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[Vec<Ciphertext>] {
        self.0.data()
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        self.0.parms_id()
    }

    #[inline]
    pub fn as_kswitch_keys(&self) -> &KSwitchKeys {
        &self.0
    }
}

/// Galois keys: the key for the odd element e sits at index (e - 1)/2.
#[derive(Clone, Debug)]
pub struct GaloisKeys(pub(crate) KSwitchKeys);

impl GaloisKeys {
    #[inline]
    pub fn get_index(galois_elt: u64) -> usize {
        debug_assert!(galois_elt & 1 == 1);
        ((galois_elt - 1) >> 1) as usize
    }

    pub fn has_key(&self, galois_elt: u64) -> bool {
        let index = Self::get_index(galois_elt);
        index < self.0.keys.len() && !self.0.keys[index].is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[Vec<Ciphertext>] {
        self.0.data()
    }

    #[inline]
    pub fn parms_id(&self) -> &ParmsId {
        self.0.parms_id()
    }

    #[inline]
    pub fn as_kswitch_keys(&self) -> &KSwitchKeys {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_conventions() {
        assert_eq!(RelinKeys::get_index(2), 0);
        assert_eq!(RelinKeys::get_index(3), 1);
        assert_eq!(GaloisKeys::get_index(3), 1);
        assert_eq!(GaloisKeys::get_index(15), 7);
    }
}
