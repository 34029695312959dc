//! Settlement engine
//!
//! Resolves every still-pending bet of a declared round against the declared
//! digit, and refunds pending bets of a cancelled round. Each bet is one
//! atomic store call and bets are processed concurrently. A bet that is
//! already final is skipped, so re-running either pass after a partial
//! failure only touches what is left.

use crate::errors::{StateConflict, StorageError, WingoResult};
use crate::games::taxonomy;
use crate::games::types::{Bet, BetResult, Digit, Round, RoundId};
use crate::store::{BetSettlement, GameStore, SettleOutcome};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Tally of one settlement pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub round_id: RoundId,
    pub settled: usize,
    pub won: usize,
    pub lost: usize,
    /// Bets another pass had already finalised
    pub skipped: usize,
    /// Bets left PENDING because their store call failed
    pub failed: usize,
    pub total_paid: Decimal,
}

impl SettlementReport {
    fn new(round_id: RoundId) -> Self {
        Self {
            round_id,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// `PartialSettlement` if any bet is still pending
    pub fn ensure_complete(&self) -> Result<(), StorageError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(StorageError::PartialSettlement {
                round_id: self.round_id,
                failed: self.failed,
            })
        }
    }
}

/// Tally of one refund pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundReport {
    pub round_id: RoundId,
    pub refunded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_refunded: Decimal,
}

/// Win/loss and payout of `bet` if `digit` is declared
pub fn resolve(bet: &Bet, digit: Digit) -> (BetResult, Decimal) {
    match taxonomy::winning_multiplier(&bet.selection, digit) {
        Some(multiplier) => (BetResult::Won, bet.amount * multiplier),
        None => (BetResult::Lost, Decimal::ZERO),
    }
}

pub struct SettlementEngine {
    store: Arc<dyn GameStore>,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        Self { store }
    }

    /// Settle the pending bets of a declared round
    pub async fn settle_round(
        &self,
        round: &Round,
        at: DateTime<Utc>,
    ) -> WingoResult<SettlementReport> {
        let outcome = round.outcome.ok_or(StateConflict::InvalidTransition {
            round_id: round.id,
            from: round.status,
            action: "settle",
        })?;

        let pending = self.store.open_bets_for_round(round.id).await?;
        debug!(round_id = %round.id, pending = pending.len(), "Settling round");

        let results = join_all(pending.iter().map(|bet| {
            let (result, win_amount) = resolve(bet, outcome.digit);
            self.store.settle_bet(BetSettlement {
                bet_id: bet.id,
                result,
                win_amount,
                settled_at: at,
            })
        }))
        .await;

        let mut report = SettlementReport::new(round.id);
        for (bet, result) in pending.iter().zip(results) {
            match result {
                Ok(SettleOutcome::Applied(settled)) => {
                    report.settled += 1;
                    if settled.result == BetResult::Won {
                        report.won += 1;
                        report.total_paid += settled.win_amount.unwrap_or(Decimal::ZERO);
                    } else {
                        report.lost += 1;
                    }
                }
                Ok(SettleOutcome::AlreadyFinal(_)) => report.skipped += 1,
                Err(e) => {
                    error!(round_id = %round.id, bet_id = %bet.id, error = %e, "Bet settlement failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            round_id = %round.id,
            period = %round.period,
            digit = %outcome.digit,
            won = report.won,
            lost = report.lost,
            skipped = report.skipped,
            failed = report.failed,
            paid = %report.total_paid,
            "Round settled"
        );
        Ok(report)
    }

    /// Refund every pending bet of a cancelled round
    pub async fn refund_round(
        &self,
        round_id: RoundId,
        at: DateTime<Utc>,
    ) -> WingoResult<RefundReport> {
        let pending = self.store.open_bets_for_round(round_id).await?;
        let results = join_all(pending.iter().map(|bet| self.store.refund_bet(bet.id, at))).await;

        let mut report = RefundReport {
            round_id,
            ..Default::default()
        };
        for (bet, result) in pending.iter().zip(results) {
            match result {
                Ok(SettleOutcome::Applied(refunded)) => {
                    report.refunded += 1;
                    report.total_refunded += refunded.amount;
                }
                Ok(SettleOutcome::AlreadyFinal(_)) => report.skipped += 1,
                Err(e) => {
                    error!(round_id = %round_id, bet_id = %bet.id, error = %e, "Bet refund failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            round_id = %round_id,
            refunded = report.refunded,
            failed = report.failed,
            total = %report.total_refunded,
            "Round refunded"
        );
        Ok(report)
    }
}
