//! XEd25519 signatures under X25519 keys.
//!
//! The pairing protocol signs device-identity blobs with the account
//! identity key, which is an X25519 keypair. XEd25519 maps that key onto
//! the Edwards curve so it can produce and check Ed25519-shaped
//! signatures. Curve arithmetic is `curve25519-dalek`; this module only
//! fixes the message composition and the key mapping.

use crate::{CryptoError, KeyPair};
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::Scalar;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Signature length in bytes (`R ‖ s`).
pub const SIGNATURE_LENGTH: usize = 64;

/// Sign `message` with the X25519 private key.
///
/// A fresh 64-byte nonce is drawn from the OS RNG for every signature, so
/// two signatures over the same message differ.
#[must_use]
pub fn sign(key: &KeyPair, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
    let mut random = [0u8; 64];
    OsRng.fill_bytes(&mut random);
    sign_with_nonce(key, message, &random)
}

fn sign_with_nonce(key: &KeyPair, message: &[u8], random: &[u8; 64]) -> [u8; SIGNATURE_LENGTH] {
    let (mut a, public) = edwards_keypair(key);

    // r = hash1(a ‖ M ‖ Z) mod q, with the hash1 domain prefix
    let mut hasher = Sha512::new();
    hasher.update([0xFE]);
    hasher.update([0xFF; 31]);
    hasher.update(a.as_bytes());
    hasher.update(message);
    hasher.update(random);
    let r = Scalar::from_bytes_mod_order_wide(&hasher.finalize().into());

    let r_point = (&r * ED25519_BASEPOINT_TABLE).compress();

    // h = hash(R ‖ A ‖ M) mod q
    let h = challenge(&r_point, &public, message);

    // s = r + h·a mod q
    let s = r + h * a;
    a.zeroize();

    let mut signature = [0u8; SIGNATURE_LENGTH];
    signature[..32].copy_from_slice(r_point.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());
    signature
}

/// Verify `signature` over `message` under an X25519 public key.
///
/// Malformed points, non-canonical scalars and failed equations all return
/// `false`; callers treat the signature as opaque.
#[must_use]
pub fn verify(public: &[u8; 32], message: &[u8], signature: &[u8; SIGNATURE_LENGTH]) -> bool {
    let Ok(a_compressed) = edwards_public(public) else {
        return false;
    };
    let Some(a_point) = a_compressed.decompress() else {
        return false;
    };
    if !a_point.is_torsion_free() {
        return false;
    }

    let mut r_bytes = [0u8; 32];
    r_bytes.copy_from_slice(&signature[..32]);
    let r_compressed = CompressedEdwardsY(r_bytes);
    if r_compressed.decompress().is_none() {
        return false;
    }

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&signature[32..]);
    // s must be canonical (top three bits clear for the curve order).
    if s_bytes[31] & 0xE0 != 0 {
        return false;
    }
    let s = Scalar::from_bytes_mod_order(s_bytes);

    let h = challenge(&r_compressed, &a_compressed, message);
    let r_check = EdwardsPoint::vartime_double_scalar_mul_basepoint(&h, &-a_point, &s);

    r_check.compress().as_bytes().ct_eq(&r_bytes).into()
}

fn challenge(r: &CompressedEdwardsY, a: &CompressedEdwardsY, message: &[u8]) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(r.as_bytes());
    hasher.update(a.as_bytes());
    hasher.update(message);
    Scalar::from_bytes_mod_order_wide(&hasher.finalize().into())
}

/// Derive the Edwards scalar and sign-normalized public point for an
/// X25519 private key.
fn edwards_keypair(key: &KeyPair) -> (Scalar, CompressedEdwardsY) {
    let mut clamped = *key.private();
    clamped[0] &= 248;
    clamped[31] &= 127;
    clamped[31] |= 64;
    let k = Scalar::from_bytes_mod_order(clamped);
    clamped.zeroize();

    // Negate the scalar when kB has its sign bit set, so A always
    // compresses with sign bit zero and matches the Montgomery-mapped
    // public key the verifier reconstructs.
    let e = (&k * ED25519_BASEPOINT_TABLE).compress();
    let sign = e.as_bytes()[31] >> 7;
    let a = if sign == 1 { -k } else { k };

    let mut a_bytes = *e.as_bytes();
    a_bytes[31] &= 0x7F;
    (a, CompressedEdwardsY(a_bytes))
}

/// Map an X25519 public key onto the Edwards curve with sign bit zero.
fn edwards_public(public: &[u8; 32]) -> Result<CompressedEdwardsY, CryptoError> {
    let mut u = *public;
    u[31] &= 0x7F;
    let edwards = MontgomeryPoint(u)
        .to_edwards(0)
        .ok_or(CryptoError::InvalidPublicKey)?;
    let mut bytes = *edwards.compress().as_bytes();
    bytes[31] &= 0x7F;
    Ok(CompressedEdwardsY(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let key = KeyPair::generate();
        let message = b"device identity details";
        let signature = sign(&key, message);
        assert!(verify(key.public(), message, &signature));
    }

    #[test]
    fn test_wrong_message_rejected() {
        let key = KeyPair::generate();
        let signature = sign(&key, b"original");
        assert!(!verify(key.public(), b"tampered", &signature));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = sign(&key, b"message");
        assert!(!verify(other.public(), b"message", &signature));
    }

    #[test]
    fn test_bitflip_rejected() {
        let key = KeyPair::generate();
        let message = b"message";
        let good = sign(&key, message);
        for byte in 0..SIGNATURE_LENGTH {
            let mut bad = good;
            bad[byte] ^= 0x01;
            assert!(!verify(key.public(), message, &bad), "byte {byte}");
        }
    }

    #[test]
    fn test_signatures_randomized() {
        let key = KeyPair::generate();
        let a = sign(&key, b"same message");
        let b = sign(&key, b"same message");
        assert_ne!(a, b);
        assert!(verify(key.public(), b"same message", &a));
        assert!(verify(key.public(), b"same message", &b));
    }

    #[test]
    fn test_deterministic_with_fixed_nonce() {
        let key = KeyPair::from_private_bytes([7u8; 32]);
        let nonce = [9u8; 64];
        let a = sign_with_nonce(&key, b"m", &nonce);
        let b = sign_with_nonce(&key, b"m", &nonce);
        assert_eq!(a, b);
        assert!(verify(key.public(), b"m", &a));
    }
}
