//! JSON wire types for polynomials, ciphertexts, and keys.
//!
//! Clients encrypt in the browser and post ciphertexts as JSON. Historically
//! two key spellings exist on the wire (`ring_degree` from the server,
//! `ringDegree` from the JS client), so inbound deserialization accepts
//! both via serde aliases. Outbound serialization always uses the canonical
//! snake_case spelling; the dual tolerance exists only at the boundary and
//! never internally.
//!
//! These types are deliberately dumb carriers. Interpreting the
//! coefficients is the cipher scheme's job; the only validation here is
//! structural (declared degree matches coefficient count).

use serde::{Deserialize, Serialize};

use crate::error::PollError;

/// A polynomial in the quotient ring `Z_q[x]/(x^d + 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolynomialWire {
    /// Degree `d` of the quotient ring.
    #[serde(alias = "ringDegree")]
    pub ring_degree: usize,
    /// Coefficients, lowest order first; length must equal `ring_degree`.
    pub coeffs: Vec<i64>,
}

impl PolynomialWire {
    /// Structural check: declared degree equals coefficient count.
    pub fn validate(&self, context: &str) -> Result<(), PollError> {
        if self.coeffs.len() != self.ring_degree {
            return Err(PollError::Validation {
                field: context.to_string(),
                reason: format!(
                    "polynomial declares degree {} but carries {} coefficients",
                    self.ring_degree,
                    self.coeffs.len()
                ),
            });
        }
        Ok(())
    }
}

/// A ciphertext: a pair of ring polynomials plus the encryption metadata
/// the scheme needs to interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextWire {
    /// First ciphertext polynomial.
    pub c0: PolynomialWire,
    /// Second ciphertext polynomial.
    pub c1: PolynomialWire,
    /// Plaintext scaling factor (`delta = q / t`).
    #[serde(alias = "scalingFactor")]
    pub scaling_factor: i64,
    /// Ciphertext coefficient modulus `q`.
    pub modulus: i64,
}

impl CiphertextWire {
    /// Structural check on both component polynomials.
    pub fn validate(&self, context: &str) -> Result<(), PollError> {
        self.c0.validate(context)?;
        self.c1.validate(context)?;
        if self.c0.ring_degree != self.c1.ring_degree {
            return Err(PollError::Validation {
                field: context.to_string(),
                reason: "ciphertext components disagree on ring degree".to_string(),
            });
        }
        Ok(())
    }
}

/// Public encryption key: the pair `(p0, p1)` clients encrypt under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyWire {
    /// First key polynomial.
    pub p0: PolynomialWire,
    /// Second key polynomial.
    pub p1: PolynomialWire,
}

/// Secret decryption key. Sensitive: persisted encrypted-at-rest by the
/// store's column discipline and only ever deserialized inside a reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyWire {
    /// Degree of the quotient ring.
    #[serde(alias = "ringDegree")]
    pub ring_degree: usize,
    /// Secret polynomial coefficients.
    pub coeffs: Vec<i64>,
}
