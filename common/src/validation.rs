//! Validation verdicts for pending blocks

use thiserror::Error;

/// Reasons the validator can reject a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Error)]
pub enum ValidationError {
    #[error("previous hash does not match the local head")]
    IncorrectPreviousHash,

    #[error("parent block is unknown")]
    OrphanBlock,

    #[error("block produced outside the miner's time slot")]
    InvalidTimeSlot,

    #[error("producer signature is invalid")]
    InvalidSignature,

    #[error("merkle root does not match the transactions")]
    InvalidMerkleRoot,

    #[error("transaction execution failed")]
    ExecutionFailed,
}

/// Validation outcome attached to a pending block
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ValidationResult {
    /// Not seen by the validator yet
    #[default]
    Unvalidated,

    /// All good
    Valid,

    /// Rejected
    Invalid(ValidationError),
}

impl ValidationResult {
    pub fn is_failure(&self) -> bool {
        matches!(self, ValidationResult::Invalid(_))
    }
}
