pub mod types;
pub mod period;
pub mod taxonomy;
pub mod liability;
pub mod selector;
pub mod round;
pub mod settlement;

pub use types::*;
pub use period::PeriodCode;
pub use liability::{LiabilityReport, OutcomeCandidate, RiskPolicy};
pub use selector::{OutcomeDecision, OutcomeSelector, PolicyWarning, SelectionBucket, TargetSelector};
pub use round::RoundCommand;
pub use settlement::{RefundReport, SettlementEngine, SettlementReport};
