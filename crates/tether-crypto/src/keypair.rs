//! X25519 keypairs.
//!
//! The same keypair shape backs both the transport identity (Noise static)
//! and the account identity (double-ratchet + device signatures); the two
//! keys are generated independently and never mixed.

use crate::CryptoError;
use rand_core::{CryptoRng, OsRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An X25519 keypair.
///
/// The private half is zeroized on drop. Callers outside the store and the
/// handshake only ever see the public half.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    private: [u8; 32],
    #[zeroize(skip)]
    public: [u8; 32],
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a fresh keypair from the given RNG.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut private = [0u8; 32];
        rng.fill_bytes(&mut private);
        Self::from_private_bytes(private)
    }

    /// Rebuild a keypair from stored private-key bytes.
    #[must_use]
    pub fn from_private_bytes(private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        let public = PublicKey::from(&secret);
        Self {
            private,
            public: *public.as_bytes(),
        }
    }

    /// Rebuild a keypair from a stored private-key slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] unless the slice is exactly
    /// 32 bytes.
    pub fn from_private_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let private: [u8; 32] = slice
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(slice.len()))?;
        Ok(Self::from_private_bytes(private))
    }

    /// Public key bytes.
    #[must_use]
    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }

    /// Private key bytes.
    ///
    /// Only the store serializer and the Noise builder read this.
    #[must_use]
    pub fn private(&self) -> &[u8; 32] {
        &self.private
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        bool::from(self.private.ct_eq(&other.private))
    }
}

impl Eq for KeyPair {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_distinct() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public(), b.public());
    }

    #[test]
    fn test_restore_from_private() {
        let original = KeyPair::generate();
        let restored = KeyPair::from_private_bytes(*original.private());
        assert_eq!(original.public(), restored.public());
        assert_eq!(original, restored);
    }

    #[test]
    fn test_bad_slice_length() {
        assert_eq!(
            KeyPair::from_private_slice(&[0u8; 31]).unwrap_err(),
            CryptoError::InvalidKeyLength(31)
        );
    }

    #[test]
    fn test_debug_redacts_private() {
        let pair = KeyPair::generate();
        assert!(!format!("{pair:?}").contains(&format!("{:?}", pair.private())));
    }
}
