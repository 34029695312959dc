//! Live event feed for admin dashboards
//!
//! The engine publishes a [`GameEvent`] after every placement, state change,
//! declaration and cancellation. Transports subscribe to the broadcast
//! channel; the engine keeps no per-subscriber state.

use crate::games::liability::{LiabilityReport, OutcomeCandidate};
use crate::games::period::PeriodCode;
use crate::games::selector::{PolicyWarning, SelectionBucket};
use crate::games::types::{
    BetId, Declarer, Outcome, Round, RoundId, RoundStatus, Selection, UserId,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Candidate table of a round at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiabilitySnapshot {
    pub round_id: RoundId,
    pub period: PeriodCode,
    pub status: RoundStatus,
    pub total_bets: usize,
    pub collection: Decimal,
    /// Highest profit first; empty when the round has no bets
    pub candidates: Vec<OutcomeCandidate>,
    pub generated_at: DateTime<Utc>,
}

impl LiabilitySnapshot {
    pub fn new(
        round: &Round,
        total_bets: usize,
        report: &LiabilityReport,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            round_id: round.id,
            period: round.period,
            status: round.status,
            total_bets,
            collection: report.collection(),
            candidates: report.candidates().to_vec(),
            generated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    RoundOpened {
        round_id: RoundId,
        period: PeriodCode,
        started_at: DateTime<Utc>,
    },
    BetPlaced {
        round_id: RoundId,
        bet_id: BetId,
        user_id: UserId,
        selection: Selection,
        amount: Decimal,
        liability: LiabilitySnapshot,
    },
    RoundPaused {
        round_id: RoundId,
        period: PeriodCode,
    },
    RoundResumed {
        round_id: RoundId,
        period: PeriodCode,
    },
    RoundDeclared {
        round_id: RoundId,
        period: PeriodCode,
        outcome: Outcome,
        declared_by: Declarer,
        bucket: SelectionBucket,
        profit: Decimal,
        profit_percent: Decimal,
        warning: Option<PolicyWarning>,
        liability: LiabilitySnapshot,
    },
    RoundCancelled {
        round_id: RoundId,
        period: PeriodCode,
        refunded: usize,
        total_refunded: Decimal,
        liability: LiabilitySnapshot,
    },
}

impl GameEvent {
    pub fn round_id(&self) -> RoundId {
        match self {
            GameEvent::RoundOpened { round_id, .. }
            | GameEvent::BetPlaced { round_id, .. }
            | GameEvent::RoundPaused { round_id, .. }
            | GameEvent::RoundResumed { round_id, .. }
            | GameEvent::RoundDeclared { round_id, .. }
            | GameEvent::RoundCancelled { round_id, .. } => *round_id,
        }
    }
}

/// Broadcast feed of game events
#[derive(Debug, Clone)]
pub struct LiabilityFeed {
    tx: broadcast::Sender<GameEvent>,
}

impl LiabilityFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver to current subscribers. Having none is not an error.
    pub fn publish(&self, event: GameEvent) {
        match self.tx.send(event) {
            Ok(receivers) => trace!(receivers, "Event published"),
            Err(_) => trace!("Event dropped, no subscribers"),
        }
    }
}
