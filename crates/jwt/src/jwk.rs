use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::{SecretKey, SigningKey, VerifyingKey};
use rand_core::{CryptoRng, OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::convert::TryFrom;
use zeroize::Zeroize;

use crate::error::{JwtError, Result};

/// Ed25519 key pair used for EdDSA tokens.
pub struct Ed25519KeyPair {
    kid: String,
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl Clone for Ed25519KeyPair {
    fn clone(&self) -> Self {
        let secret = self.signing.to_bytes();
        let signing = SigningKey::from_bytes(&secret);
        let verifying = signing.verifying_key();
        Self {
            kid: self.kid.clone(),
            signing,
            verifying,
        }
    }
}

impl Ed25519KeyPair {
    /// Generates a random key.
    ///
    /// # Errors
    ///
    /// Returns `JwtError` if the generated seed is rejected.
    pub fn generate(kid: impl Into<String>) -> Result<Self> {
        let mut rng = OsRng;
        Self::generate_with_rng(kid, &mut rng)
    }

    /// Generates a key from the given RNG.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::from_seed`].
    pub fn generate_with_rng(
        kid: impl Into<String>,
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<Self> {
        let mut seed = [0_u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(kid, seed)
    }

    /// Builds a key from a 32 byte seed.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Key` for an invalid Ed25519 secret.
    pub fn from_seed(kid: impl Into<String>, mut seed: [u8; 32]) -> Result<Self> {
        let secret = SecretKey::try_from(&seed[..])
            .map_err(|_| JwtError::Key("invalid ed25519 secret key".to_owned()))?;
        seed.zeroize();
        let signing = SigningKey::from(&secret);
        Ok(Self::from_signing_key(kid, signing))
    }

    /// Loads an unencrypted PKCS#8 PEM private key. Without `kid` the key
    /// thumbprint is used.
    ///
    /// # Errors
    ///
    /// Returns `JwtError::Key` when the PEM is not an Ed25519 PKCS#8 key.
    pub fn from_pkcs8_pem(kid: Option<String>, pem: &str) -> Result<Self> {
        let signing =
            SigningKey::from_pkcs8_pem(pem).map_err(|err| JwtError::Key(err.to_string()))?;
        let kid = kid.unwrap_or_else(|| thumbprint(&signing.verifying_key()));
        Ok(Self::from_signing_key(kid, signing))
    }

    fn from_signing_key(kid: impl Into<String>, signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        Self {
            kid: kid.into(),
            signing,
            verifying,
        }
    }

    /// Key id.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// Public half, keeping the key id.
    #[must_use]
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey {
            kid: self.kid.clone(),
            verifying: self.verifying,
        }
    }
}

/// Ed25519 verification key.
#[derive(Clone, Debug)]
pub struct Ed25519PublicKey {
    kid: String,
    verifying: VerifyingKey,
}

impl Ed25519PublicKey {
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }
}

fn thumbprint(key: &VerifyingKey) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key.as_bytes()))
}
