//! Round lifecycle state machine
//!
//! ```text
//!            pause            close             declare
//!   OPEN  <-------->  PAUSED ------> CLOSED -----------> RESULT_DECLARED
//!     |     resume       |             | reopen (aborted
//!     |                  |             |  admin declare)
//!     +-------+----------+             v
//!             | cancel             OPEN / PAUSED
//!             v
//!         CANCELLED
//! ```
//!
//! `CLOSED` freezes the bet set while an outcome is chosen. Declaration is
//! also legal straight from OPEN or PAUSED. Nothing leaves CANCELLED or
//! RESULT_DECLARED, and `result_status` flips to DECLARED exactly once.

use crate::errors::StateConflict;
use crate::games::period::PeriodCode;
use crate::games::types::{
    Declarer, Outcome, ProfitSnapshot, ResultStatus, Round, RoundStatus,
};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// A requested change to a round
#[derive(Debug, Clone, PartialEq)]
pub enum RoundCommand {
    Pause,
    Resume,
    /// Freeze betting ahead of a declaration
    Close,
    /// Undo a `Close` whose declaration was rejected
    Reopen(RoundStatus),
    Declare {
        outcome: Outcome,
        declared_by: Declarer,
        snapshot: ProfitSnapshot,
        at: DateTime<Utc>,
    },
    Cancel { at: DateTime<Utc> },
}

impl RoundCommand {
    fn action(&self) -> &'static str {
        match self {
            RoundCommand::Pause => "pause",
            RoundCommand::Resume => "resume",
            RoundCommand::Close => "close",
            RoundCommand::Reopen(_) => "reopen",
            RoundCommand::Declare { .. } => "declare",
            RoundCommand::Cancel { .. } => "cancel",
        }
    }
}

impl Round {
    /// A fresh round in OPEN / PENDING
    pub fn open(period: PeriodCode, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            period,
            status: RoundStatus::Open,
            result_status: ResultStatus::Pending,
            started_at,
            ended_at: None,
            outcome: None,
            declared_by: None,
            declared_at: None,
            snapshot: None,
        }
    }

    pub fn accepts_bets(&self) -> bool {
        self.status == RoundStatus::Open && self.result_status == ResultStatus::Pending
    }

    pub fn is_declared(&self) -> bool {
        self.result_status == ResultStatus::Declared
    }

    /// OPEN rounds whose betting window has elapsed. PAUSED rounds never expire.
    pub fn is_expired(&self, now: DateTime<Utc>, duration: Duration) -> bool {
        self.status == RoundStatus::Open
            && self.result_status == ResultStatus::Pending
            && now - self.started_at >= duration
    }

    /// Apply `command`, returning the status the round had before.
    /// On error the round is left untouched.
    pub fn apply(&mut self, command: RoundCommand) -> Result<RoundStatus, StateConflict> {
        let previous = self.status;
        self.check(&command)?;

        match command {
            RoundCommand::Pause => self.status = RoundStatus::Paused,
            RoundCommand::Resume => self.status = RoundStatus::Open,
            RoundCommand::Close => self.status = RoundStatus::Closed,
            RoundCommand::Reopen(status) => self.status = status,
            RoundCommand::Declare {
                outcome,
                declared_by,
                snapshot,
                at,
            } => {
                self.status = RoundStatus::ResultDeclared;
                self.result_status = ResultStatus::Declared;
                self.outcome = Some(outcome);
                self.declared_by = Some(declared_by);
                self.declared_at = Some(at);
                self.ended_at = Some(at);
                self.snapshot = Some(snapshot);
            }
            RoundCommand::Cancel { at } => {
                self.status = RoundStatus::Cancelled;
                self.ended_at = Some(at);
            }
        }

        Ok(previous)
    }

    fn check(&self, command: &RoundCommand) -> Result<(), StateConflict> {
        if self.is_declared() {
            return Err(StateConflict::AlreadyDeclared(self.id));
        }
        if self.status == RoundStatus::Cancelled {
            return Err(StateConflict::AlreadyCancelled(self.id));
        }

        let allowed = match command {
            RoundCommand::Pause => self.status == RoundStatus::Open,
            RoundCommand::Resume => self.status == RoundStatus::Paused,
            RoundCommand::Close => {
                matches!(self.status, RoundStatus::Open | RoundStatus::Paused)
            }
            RoundCommand::Reopen(target) => {
                self.status == RoundStatus::Closed
                    && matches!(target, RoundStatus::Open | RoundStatus::Paused)
            }
            RoundCommand::Declare { .. } => matches!(
                self.status,
                RoundStatus::Open | RoundStatus::Paused | RoundStatus::Closed
            ),
            RoundCommand::Cancel { .. } => {
                matches!(self.status, RoundStatus::Open | RoundStatus::Paused)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(StateConflict::InvalidTransition {
                round_id: self.id,
                from: self.status,
                action: command.action(),
            })
        }
    }
}
