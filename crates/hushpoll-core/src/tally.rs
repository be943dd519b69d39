//! Homomorphic tally accumulation.
//!
//! [`merge`] folds one incoming ballot into the running per-question sum.
//! It is pure with respect to its inputs and performs no persistence;
//! writing the merged accumulator atomically (together with the response
//! counter and submission record) is the submission gate's job.
//!
//! Because the underlying homomorphic addition is associative and
//! commutative, the final accumulator is identical for every interleaving
//! of concurrent submissions.

use crate::error::PollError;
use crate::scheme::CipherScheme;
use crate::wire::CiphertextWire;

/// Merges an incoming ballot into the current accumulator.
///
/// With no current accumulator the first ballot seeds it verbatim.
/// Otherwise each question index is combined independently with
/// homomorphic addition.
///
/// The caller has already checked the ballot's length against the question
/// count; a length disagreement between accumulator and ballot here means
/// stored state is corrupt and is reported as such.
pub fn merge(
    scheme: &dyn CipherScheme,
    current: Option<&[CiphertextWire]>,
    incoming: &[CiphertextWire],
) -> Result<Vec<CiphertextWire>, PollError> {
    for (i, ct) in incoming.iter().enumerate() {
        ct.validate(&format!("ballot[{i}]"))?;
    }

    let Some(current) = current else {
        return Ok(incoming.to_vec());
    };

    if current.len() != incoming.len() {
        return Err(PollError::Internal(format!(
            "accumulator holds {} ciphertexts but ballot has {}",
            current.len(),
            incoming.len()
        )));
    }

    current
        .iter()
        .zip(incoming)
        .enumerate()
        .map(|(i, (acc, ballot))| {
            scheme.add(acc, ballot).map_err(|e| PollError::Validation {
                field: format!("ballot[{i}]"),
                reason: e.to_string(),
            })
        })
        .collect()
}
