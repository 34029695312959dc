//! Round, bet, wallet and ledger storage contract
//!
//! Every method is one atomic unit. Implementations must make the compound
//! calls (`insert_bet_atomically`, `settle_bet`, `refund_bet`) indivisible
//! with respect to each other and to balance reads.

pub mod memory;

pub use memory::MemoryStore;

use crate::errors::WingoResult;
use crate::games::round::RoundCommand;
use crate::games::types::{
    Bet, BetId, BetResult, LedgerEntry, Round, RoundId, RoundStatus, Selection, TransactionKind,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A wager that has passed validation and is ready to insert
#[derive(Debug, Clone)]
pub struct NewBet {
    pub user_id: UserId,
    pub round_id: RoundId,
    pub selection: Selection,
    pub amount: Decimal,
    pub potential_win: Decimal,
    pub placed_at: DateTime<Utc>,
}

/// Final state to write onto a pending bet
#[derive(Debug, Clone)]
pub struct BetSettlement {
    pub bet_id: BetId,
    /// `Won` or `Lost`
    pub result: BetResult,
    /// Zero when lost
    pub win_amount: Decimal,
    pub settled_at: DateTime<Utc>,
}

/// Result of a settle or refund call
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// The bet moved out of PENDING in this call
    Applied(Bet),
    /// The bet was already final and was left untouched
    AlreadyFinal(Bet),
}

impl SettleOutcome {
    pub fn bet(&self) -> &Bet {
        match self {
            SettleOutcome::Applied(bet) | SettleOutcome::AlreadyFinal(bet) => bet,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, SettleOutcome::Applied(_))
    }
}

/// Append-only audit record to write
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub reference_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// What a retention pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub rounds_removed: usize,
    pub bets_removed: usize,
}

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Create the next OPEN round unless a non-terminal round already exists.
    /// Returns the current round and whether it was created by this call.
    async fn open_round(&self, now: DateTime<Utc>) -> WingoResult<(Round, bool)>;

    /// The single non-terminal round, if any
    async fn current_round(&self) -> WingoResult<Option<Round>>;

    async fn get_round(&self, round_id: RoundId) -> WingoResult<Option<Round>>;

    /// Apply a state-machine command, returning the prior status and the new round
    async fn transition_round(
        &self,
        round_id: RoundId,
        command: RoundCommand,
    ) -> WingoResult<(RoundStatus, Round)>;

    /// OPEN rounds whose `window` has elapsed at `now`, plus any round
    /// stranded in CLOSED
    async fn rounds_due(&self, now: DateTime<Utc>, window: Duration) -> WingoResult<Vec<Round>>;

    /// Terminal rounds that still have PENDING bets
    async fn rounds_with_pending_bets(&self) -> WingoResult<Vec<Round>>;

    /// Most recently started rounds, newest first
    async fn recent_rounds(&self, limit: usize) -> WingoResult<Vec<Round>>;

    /// Delete the oldest declared rounds, and their bets, beyond `keep`
    async fn prune_declared_rounds(&self, keep: usize) -> WingoResult<PruneReport>;

    /// Round-open check, uniqueness check, stake debit, insert and ledger
    /// record as one unit
    async fn insert_bet_atomically(&self, bet: NewBet) -> WingoResult<Bet>;

    async fn bets_for_round(&self, round_id: RoundId) -> WingoResult<Vec<Bet>>;

    /// Bets on the round whose result is still PENDING
    async fn open_bets_for_round(&self, round_id: RoundId) -> WingoResult<Vec<Bet>>;

    async fn bets_for_user(&self, user_id: &str) -> WingoResult<Vec<Bet>>;

    /// Mark a pending bet WON or LOST; credit and record the payout if won
    async fn settle_bet(&self, settlement: BetSettlement) -> WingoResult<SettleOutcome>;

    /// Mark a pending bet CANCELLED and return its stake
    async fn refund_bet(&self, bet_id: BetId, at: DateTime<Utc>) -> WingoResult<SettleOutcome>;

    async fn balance(&self, user_id: &str) -> WingoResult<Decimal>;

    /// Returns the new balance
    async fn credit_wallet(&self, user_id: &str, amount: Decimal) -> WingoResult<Decimal>;

    /// Returns the new balance; fails on insufficient funds
    async fn debit_wallet(&self, user_id: &str, amount: Decimal) -> WingoResult<Decimal>;

    async fn append_ledger_transaction(&self, entry: NewLedgerEntry) -> WingoResult<LedgerEntry>;

    /// Ledger entries of a user, oldest first
    async fn ledger_for_user(&self, user_id: &str) -> WingoResult<Vec<LedgerEntry>>;
}
