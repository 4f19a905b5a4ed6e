//! # Rabin Signatures
//!
//! Verification of oracle-signed messages under the Rabin scheme, plus the
//! oracle-side signer used by the demo and tests.
//!
//! A signature `(s, padding)` is valid for `message` under modulus `n` iff
//!
//! ```text
//! s² mod n == H(message || padding) mod n
//! ```
//!
//! where `H` is a full-domain hash: SHA-256 in counter mode expanded to the byte
//! length of `n` and read little-endian. Bare `s² == m` matching is forgeable by
//! anyone (pick `s`, publish `s²` as the message); hashing to the full modulus
//! width is the redundancy that rules this out. The padding exists because only a
//! quarter of digests are squares mod `n`; the signer appends zero bytes until it
//! finds one.

use crate::config::rabin::{MAX_PADDING_LEN, MIN_MODULUS_BITS};
use crate::error::{ContractError, ContractResult};
use crate::utils::{serde_biguint, serde_hex};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Oracle public key: the modulus `n = p·q`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RabinPublicKey {
    #[serde(with = "serde_biguint")]
    pub n: BigUint,
}

/// Signature over an oracle message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RabinSignature {
    #[serde(with = "serde_biguint")]
    pub s: BigUint,
    #[serde(with = "serde_hex")]
    pub padding: Vec<u8>,
}

impl RabinPublicKey {
    pub fn new(n: BigUint) -> Self {
        Self { n }
    }

    /// See [`verify`]
    pub fn verify(&self, message: &[u8], signature: &RabinSignature) -> bool {
        verify(message, signature, self)
    }
}

/// Full-domain digest of `message || padding`, reduced mod `modulus`
pub fn rabin_digest(message: &[u8], padding: &[u8], modulus: &BigUint) -> BigUint {
    let width = ((modulus.bits() + 7) / 8) as usize;
    let mut expanded = Vec::with_capacity(width + 32);
    let mut counter: u32 = 0;
    while expanded.len() < width {
        let mut hasher = Sha256::new();
        hasher.update(message);
        hasher.update(padding);
        hasher.update(counter.to_le_bytes());
        expanded.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    expanded.truncate(width);
    BigUint::from_bytes_le(&expanded) % modulus
}

/// Verify a Rabin signature. Returns `false` on any mismatch, never errors.
pub fn verify(message: &[u8], signature: &RabinSignature, public_key: &RabinPublicKey) -> bool {
    let n = &public_key.n;

    if n.bits() < MIN_MODULUS_BITS || !(n % 2u32).is_one() {
        log::warn!("Rejecting Rabin key with {}-bit modulus", n.bits());
        return false;
    }
    if signature.padding.len() > MAX_PADDING_LEN {
        log::debug!("Rabin padding too long: {} bytes", signature.padding.len());
        return false;
    }
    if signature.s.is_zero() || &signature.s >= n {
        log::debug!("Rabin signature out of range");
        return false;
    }

    let square = (&signature.s * &signature.s) % n;
    square == rabin_digest(message, &signature.padding, n)
}

/// Oracle-side key pair. Both primes must be congruent to 3 mod 4.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RabinPrivateKey {
    #[serde(with = "serde_biguint")]
    p: BigUint,
    #[serde(with = "serde_biguint")]
    q: BigUint,
}

impl RabinPrivateKey {
    pub fn new(p: BigUint, q: BigUint) -> ContractResult<Self> {
        let three = BigUint::from(3u32);
        if &p % 4u32 != three || &q % 4u32 != three {
            return Err(ContractError::crypto("Rabin primes must be 3 mod 4"));
        }
        if p == q {
            return Err(ContractError::crypto("Rabin primes must be distinct"));
        }
        if (&p * &q).bits() < MIN_MODULUS_BITS {
            return Err(ContractError::crypto(format!(
                "Rabin modulus must be at least {} bits",
                MIN_MODULUS_BITS
            )));
        }
        Ok(Self { p, q })
    }

    pub fn public_key(&self) -> RabinPublicKey {
        RabinPublicKey::new(&self.p * &self.q)
    }

    pub fn sign(&self, message: &[u8]) -> ContractResult<RabinSignature> {
        let n = &self.p * &self.q;
        for pad_len in 0..=MAX_PADDING_LEN {
            let padding = vec![0u8; pad_len];
            let digest = rabin_digest(message, &padding, &n);
            let (Some(root_p), Some(root_q)) =
                (sqrt_mod_prime(&digest, &self.p), sqrt_mod_prime(&digest, &self.q))
            else {
                continue;
            };
            let s = self.combine(&root_p, &root_q, &n);
            return Ok(RabinSignature { s, padding });
        }
        Err(ContractError::crypto(
            "No padding up to the maximum length yields a quadratic residue",
        ))
    }

    /// Chinese remainder combination of the two prime-field roots
    fn combine(&self, root_p: &BigUint, root_q: &BigUint, n: &BigUint) -> BigUint {
        // inverses via Fermat, both moduli are prime
        let q_inv = self.q.modpow(&(&self.p - 2u32), &self.p);
        let p_inv = self.p.modpow(&(&self.q - 2u32), &self.q);
        (root_p * &self.q * q_inv + root_q * &self.p * p_inv) % n
    }
}

/// Square root modulo a prime `p ≡ 3 (mod 4)`, if `value` is a non-zero residue
fn sqrt_mod_prime(value: &BigUint, p: &BigUint) -> Option<BigUint> {
    let value = value % p;
    if value.is_zero() {
        return None;
    }
    let euler = (p - 1u32) >> 1usize;
    if !value.modpow(&euler, p).is_one() {
        return None;
    }
    Some(value.modpow(&((p + 1u32) >> 2usize), p))
}
