//! Cipher-scheme collaborator seam.
//!
//! The questionnaire core treats the additive-homomorphic primitives as an
//! opaque, externally supplied collaborator: it only needs key generation,
//! integer-vector encode/decode, encryption, component-wise homomorphic
//! addition, and decryption. [`CipherScheme`] is that contract; the daemon
//! holds an `Arc<dyn CipherScheme>` and never looks inside a ciphertext.
//!
//! [`bfv::BfvScheme`] is the bundled reference implementation. Deployments
//! with a hardware or remote crypto provider implement the trait against
//! the same wire types.
//!
//! Homomorphic addition is associative and commutative, which is what makes
//! the tally order-independent under concurrent submissions.

pub mod bfv;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::model::CryptoParams;
use crate::wire::{CiphertextWire, PolynomialWire, PublicKeyWire, SecretKeyWire};

pub use bfv::BfvScheme;

/// A freshly generated keypair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Public key handed to clients for encryption.
    pub public: PublicKeyWire,
    /// Secret key; read only by the result revealer.
    pub secret: SecretKeyWire,
}

/// Errors from the cipher scheme collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemeError {
    /// The scheme parameters are unusable.
    #[error("invalid cipher parameters: {0}")]
    InvalidParameters(String),

    /// An input vector or polynomial has the wrong length.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        /// Expected length.
        expected: usize,
        /// Observed length.
        got: usize,
    },

    /// Two ciphertexts cannot be combined because their metadata differs.
    #[error("ciphertext mismatch: {0}")]
    CiphertextMismatch(String),
}

/// Additive-homomorphic cipher operations over the JSON wire types.
///
/// Implementations must make `add` associative and commutative so that the
/// final accumulator is independent of submission interleaving, and
/// `decode(encode(v))` must round-trip exactly for all-zero and one-hot
/// vectors.
pub trait CipherScheme: Send + Sync {
    /// The parameters this scheme instance was built with.
    fn params(&self) -> CryptoParams;

    /// Generates a fresh keypair.
    fn generate_keypair(&self) -> Result<KeyPair, SchemeError>;

    /// Encodes an integer vector (one slot per option) into a plaintext
    /// polynomial.
    fn encode(&self, values: &[u64]) -> Result<PolynomialWire, SchemeError>;

    /// Decodes a plaintext polynomial back into its integer vector.
    fn decode(&self, plain: &PolynomialWire) -> Result<Vec<u64>, SchemeError>;

    /// Encrypts a plaintext polynomial under a public key.
    fn encrypt(
        &self,
        plain: &PolynomialWire,
        public_key: &PublicKeyWire,
    ) -> Result<CiphertextWire, SchemeError>;

    /// Homomorphically adds two ciphertexts.
    fn add(&self, a: &CiphertextWire, b: &CiphertextWire) -> Result<CiphertextWire, SchemeError>;

    /// Decrypts a ciphertext with the secret key.
    fn decrypt(
        &self,
        ciphertext: &CiphertextWire,
        secret_key: &SecretKeyWire,
    ) -> Result<PolynomialWire, SchemeError>;
}

/// Supplies a scheme instance for a given parameter set.
///
/// Questionnaires persist the parameters they were created under, so every
/// operation on an existing questionnaire must use a scheme built from the
/// stored row, not from whatever the daemon's current default happens to
/// be. Otherwise changing the configured defaults would strand every
/// pre-existing questionnaire behind a ciphertext-metadata mismatch.
pub trait SchemeProvider: Send + Sync {
    /// Returns a scheme for the given parameters.
    fn scheme_for(&self, params: CryptoParams) -> Result<Arc<dyn CipherScheme>, SchemeError>;
}

/// [`SchemeProvider`] for the bundled reference scheme, caching one
/// [`BfvScheme`] instance per parameter set.
#[derive(Default)]
pub struct BfvProvider {
    cache: Mutex<HashMap<CryptoParams, Arc<BfvScheme>>>,
}

impl BfvProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemeProvider for BfvProvider {
    fn scheme_for(&self, params: CryptoParams) -> Result<Arc<dyn CipherScheme>, SchemeError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(scheme) = cache.get(&params) {
            return Ok(scheme.clone());
        }
        let scheme = Arc::new(BfvScheme::new(params)?);
        cache.insert(params, scheme.clone());
        Ok(scheme)
    }
}
