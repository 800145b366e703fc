//! Error types for capped-value circuits
//!
//! Provides structured error handling for proving, merging and verification.

use ark_relations::r1cs::SynthesisError;
use thiserror::Error;

/// Error types for circuit operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CircuitError {
    /// Value outside the open interval (0, limit), or an aggregate that no
    /// longer fits in 64 bits
    #[error("Constraint violation: {reason}")]
    ConstraintViolation { reason: String },

    /// Malformed or forged proof
    #[error("Proof verification failed: {reason}")]
    ProofVerificationFailure { reason: String },

    /// Two proofs disagree on the limit they were created under
    #[error("Limit mismatch: {left} != {right}")]
    LimitMismatch { left: u64, right: u64 },

    /// Constraint synthesis or proving backend failure
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// Canonical (de)serialization of keys or proofs failed
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Reading or writing key material failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl CircuitError {
    pub fn verification(reason: impl Into<String>) -> Self {
        CircuitError::ProofVerificationFailure {
            reason: reason.into(),
        }
    }
}

impl From<SynthesisError> for CircuitError {
    fn from(err: SynthesisError) -> Self {
        CircuitError::Synthesis(err.to_string())
    }
}

impl From<ark_serialize::SerializationError> for CircuitError {
    fn from(err: ark_serialize::SerializationError) -> Self {
        CircuitError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CircuitError {
    fn from(err: serde_json::Error) -> Self {
        CircuitError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CircuitError {
    fn from(err: std::io::Error) -> Self {
        CircuitError::Io(err.to_string())
    }
}

/// Result type for circuit operations
pub type CircuitResult<T> = Result<T, CircuitError>;

/// Input validation utilities
///
/// These run before any witness is synthesized so that an unsatisfiable
/// statement is rejected without spending proving time on it.
pub mod validation {
    use super::*;

    /// Validate `0 < value < limit`
    pub fn validate_add_value(value: u64, limit: u64) -> CircuitResult<()> {
        if value == 0 {
            return Err(CircuitError::ConstraintViolation {
                reason: "Value must be positive".to_string(),
            });
        }
        if value >= limit {
            return Err(CircuitError::ConstraintViolation {
                reason: format!("Value exceeds limit: {} >= {}", value, limit),
            });
        }
        Ok(())
    }

    /// Validate that two outputs were created under the same limit
    pub fn validate_same_limit(left: u64, right: u64) -> CircuitResult<()> {
        if left != right {
            return Err(CircuitError::LimitMismatch { left, right });
        }
        Ok(())
    }

    /// Sum two accumulated values, rejecting 64-bit overflow
    pub fn checked_sum(left: u64, right: u64) -> CircuitResult<u64> {
        left.checked_add(right)
            .ok_or_else(|| CircuitError::ConstraintViolation {
                reason: format!("Aggregate value overflows u64: {} + {}", left, right),
            })
    }
}
