//! Error types for the Wingo round engine
//!
//! Every rejection the engine can produce falls into one family. Validation
//! and state conflicts are business rejections and are never retried; only
//! storage faults are transient.

use crate::games::types::{BetId, BetType, Digit, RoundId, RoundStatus};
use rust_decimal::Decimal;
use thiserror::Error;

/// Root error type for all engine operations
#[derive(Debug, Error)]
pub enum WingoError {
    #[error("Validation rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("State conflict: {0}")]
    StateConflict(#[from] StateConflict),

    #[error("Policy breach: {0}")]
    PolicyBreach(#[from] PolicyBreach),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Malformed input; nothing was mutated
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("stake must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("stake {amount} is below the minimum of {min}")]
    BelowMinimum { amount: Decimal, min: Decimal },

    #[error("stake {amount} is above the maximum of {max}")]
    AboveMaximum { amount: Decimal, max: Decimal },

    #[error("stake {amount} has more than {max_scale} decimal places")]
    TooPrecise { amount: Decimal, max_scale: u32 },

    #[error("unknown bet type '{0}'")]
    UnknownBetType(String),

    #[error("'{selection}' is not a valid {bet_type} selection")]
    InvalidSelection { bet_type: BetType, selection: String },

    #[error("digit {0} is outside 0-9")]
    InvalidDigit(u8),

    #[error("'{0}' is not a digit, color or size")]
    InvalidTarget(String),

    #[error("'{0}' is not a valid period code")]
    InvalidPeriodCode(String),

    #[error("user id must not be empty")]
    EmptyUserId,
}

/// The request is well-formed but the current state forbids it
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateConflict {
    #[error("round {0} not found")]
    RoundNotFound(RoundId),

    #[error("bet {0} not found")]
    BetNotFound(BetId),

    #[error("round {round_id} is {status}, not accepting bets")]
    RoundNotOpen { round_id: RoundId, status: RoundStatus },

    #[error("round {0} already has a declared result")]
    AlreadyDeclared(RoundId),

    #[error("round {0} is already cancelled")]
    AlreadyCancelled(RoundId),

    #[error("cannot {action} round {round_id} while it is {from}")]
    InvalidTransition {
        round_id: RoundId,
        from: RoundStatus,
        action: &'static str,
    },

    #[error("user {user_id} already has a bet on round {round_id}")]
    DuplicateBet { user_id: String, round_id: RoundId },
}

/// A forced outcome would exceed the configured loss bound
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolicyBreach {
    #[error("declaring {digit} loses {loss}, above the max loss of {max_loss}")]
    MaxLossExceeded {
        digit: Digit,
        loss: Decimal,
        max_loss: Decimal,
    },
}

/// Wallet balance mutations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WalletError {
    #[error("insufficient balance for {user_id}: has {balance}, needs {required}")]
    InsufficientBalance {
        user_id: String,
        balance: Decimal,
        required: Decimal,
    },

    #[error("wallet amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("no wallet for user {0}")]
    UnknownWallet(String),
}

/// Persistence faults
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("settlement of round {round_id} incomplete: {failed} bet(s) still pending")]
    PartialSettlement { round_id: RoundId, failed: usize },
}

/// Configuration loading and validation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("failed to load configuration: {0}")]
    LoadFailed(String),
}

impl WingoError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, WingoError::Storage(_))
    }

    /// Stable machine-readable code for transports
    pub fn code(&self) -> &'static str {
        match self {
            WingoError::Validation(_) => "VALIDATION",
            WingoError::StateConflict(_) => "STATE_CONFLICT",
            WingoError::PolicyBreach(_) => "POLICY_BREACH",
            WingoError::Wallet(_) => "WALLET",
            WingoError::Storage(_) => "STORAGE",
            WingoError::Configuration(_) => "CONFIGURATION",
        }
    }
}

// External error conversions
impl From<std::io::Error> for WingoError {
    fn from(e: std::io::Error) -> Self {
        WingoError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<toml::de::Error> for WingoError {
    fn from(e: toml::de::Error) -> Self {
        WingoError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<serde_json::Error> for WingoError {
    fn from(e: serde_json::Error) -> Self {
        WingoError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

// Convenience type alias for Results
pub type WingoResult<T> = Result<T, WingoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err: WingoError = ValidationError::BelowMinimum {
            amount: dec!(5),
            min: dec!(10),
        }
        .into();

        assert!(err.to_string().contains("Validation rejected"));
        assert!(err.to_string().contains("below the minimum of 10"));
    }

    #[test]
    fn test_only_storage_is_retryable() {
        let conflict: WingoError = StateConflict::AlreadyDeclared(RoundId::nil()).into();
        assert!(!conflict.is_retryable());
        assert_eq!(conflict.code(), "STATE_CONFLICT");

        let storage: WingoError = StorageError::WriteFailed("disk".to_string()).into();
        assert!(storage.is_retryable());
    }

    #[test]
    fn test_error_source() {
        let err: WingoError = WalletError::NonPositiveAmount(dec!(0)).into();
        assert!(err.source().is_some());
    }
}
