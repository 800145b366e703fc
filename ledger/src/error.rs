//! Error Handling Module
//!
//! Every contract operation either commits in full or fails with one of
//! these variants; nothing is partially applied. Circuit failures keep their
//! names when they cross into the ledger.

use capped_value_circuits::CircuitError;
use thiserror::Error;

use crate::types::AccountId;

/// Ledger error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ============ Proof / statement ============
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Proof verification failed: {0}")]
    ProofVerificationFailure(String),

    #[error("Limit mismatch: expected {expected}, got {actual}")]
    LimitMismatch { expected: u64, actual: u64 },

    // ============ State ============
    #[error("Stale state: {0}")]
    StaleState(String),

    #[error("Double initialization: {0}")]
    DoubleInitialization(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    // ============ Access ============
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unknown contract: {0}")]
    UnknownContract(AccountId),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ============ Backend ============
    #[error("Proof synthesis failed: {0}")]
    Synthesis(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Short stable code, used in receipts and logs
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            LedgerError::ProofVerificationFailure(_) => "PROOF_VERIFICATION_FAILURE",
            LedgerError::LimitMismatch { .. } => "LIMIT_MISMATCH",
            LedgerError::StaleState(_) => "STALE_STATE",
            LedgerError::DoubleInitialization(_) => "DOUBLE_INITIALIZATION",
            LedgerError::PolicyViolation(_) => "POLICY_VIOLATION",
            LedgerError::Unauthorized(_) => "UNAUTHORIZED",
            LedgerError::UnknownContract(_) => "UNKNOWN_CONTRACT",
            LedgerError::InvalidInput(_) => "INVALID_INPUT",
            LedgerError::Synthesis(_) => "SYNTHESIS",
            LedgerError::Serialization(_) => "SERIALIZATION",
            LedgerError::Io(_) => "IO",
            LedgerError::Internal(_) => "INTERNAL",
        }
    }
}

/// Circuit errors keep their meaning in the ledger
impl From<CircuitError> for LedgerError {
    fn from(err: CircuitError) -> Self {
        match err {
            CircuitError::ConstraintViolation { reason } => LedgerError::ConstraintViolation(reason),
            CircuitError::ProofVerificationFailure { reason } => {
                LedgerError::ProofVerificationFailure(reason)
            }
            CircuitError::LimitMismatch { left, right } => LedgerError::LimitMismatch {
                expected: left,
                actual: right,
            },
            CircuitError::Synthesis(msg) => LedgerError::Synthesis(msg),
            CircuitError::Serialization(msg) => LedgerError::Serialization(msg),
            CircuitError::Io(msg) => LedgerError::Io(msg),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LedgerError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("Proving task failed: {:?}", err);
        LedgerError::Synthesis(err.to_string())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_errors_keep_their_kind() {
        let err: LedgerError = CircuitError::LimitMismatch {
            left: 1000,
            right: 2000,
        }
        .into();
        assert_eq!(
            err,
            LedgerError::LimitMismatch {
                expected: 1000,
                actual: 2000
            }
        );

        let err: LedgerError = CircuitError::verification("bad pairing").into();
        assert_eq!(err.code(), "PROOF_VERIFICATION_FAILURE");
        assert!(err.to_string().contains("bad pairing"));
    }

    #[test]
    fn test_display() {
        let err = LedgerError::PolicyViolation("transfers are not allowed".to_string());
        assert_eq!(err.to_string(), "Policy violation: transfers are not allowed");
    }
}
