//! Outcome selector
//!
//! Picks the digit to declare from a liability ranking, either autonomously
//! (weighted towards profit, never above the loss bound unless nothing else
//! is possible) or on behalf of an admin who names a digit, color or size.

use crate::errors::{PolicyBreach, ValidationError};
use crate::games::liability::{LiabilityReport, OutcomeCandidate, RiskPolicy};
use crate::games::taxonomy::{first_digit_with_color, first_digit_with_size};
use crate::games::types::{Color, Digit, Outcome, ProfitSnapshot, Size};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Weight (out of 100) of picking the most profitable acceptable outcome
const HIGHEST_PROFIT_WEIGHT: u32 = 70;
/// Weight of picking the middle-ranked profitable outcome
const MIDDLE_PROFITABLE_WEIGHT: u32 = 20;

/// Which branch of the selection procedure produced the outcome
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionBucket {
    NoBets,
    HighestProfit,
    MiddleProfitable,
    RandomAcceptable,
    /// Every candidate breached the loss bound
    LeastLoss,
    AdminForced,
}

impl fmt::Display for SelectionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionBucket::NoBets => write!(f, "no bets"),
            SelectionBucket::HighestProfit => write!(f, "highest profit"),
            SelectionBucket::MiddleProfitable => write!(f, "middle profitable"),
            SelectionBucket::RandomAcceptable => write!(f, "random acceptable"),
            SelectionBucket::LeastLoss => write!(f, "least loss"),
            SelectionBucket::AdminForced => write!(f, "admin forced"),
        }
    }
}

/// What an admin asks to declare
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum TargetSelector {
    Digit(Digit),
    Color(Color),
    Size(Size),
}

impl TargetSelector {
    /// Digit the target resolves to: the digit itself, or the first digit
    /// in natural order carrying the requested color or size
    pub fn representative_digit(&self) -> Digit {
        match *self {
            TargetSelector::Digit(digit) => digit,
            TargetSelector::Color(color) => first_digit_with_color(color),
            TargetSelector::Size(size) => first_digit_with_size(size),
        }
    }
}

impl FromStr for TargetSelector {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(digit) = s.parse::<Digit>() {
            return Ok(TargetSelector::Digit(digit));
        }
        if let Ok(color) = s.parse::<Color>() {
            return Ok(TargetSelector::Color(color));
        }
        if let Ok(size) = s.parse::<Size>() {
            return Ok(TargetSelector::Size(size));
        }
        Err(ValidationError::InvalidTarget(s.to_string()))
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelector::Digit(digit) => write!(f, "{}", digit),
            TargetSelector::Color(color) => write!(f, "{}", color),
            TargetSelector::Size(size) => write!(f, "{}", size),
        }
    }
}

/// Non-blocking notice that a declared outcome misses the profit floor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyWarning {
    pub digit: Digit,
    pub profit: Decimal,
    pub profit_percent: Decimal,
    pub profit_floor_percent: Decimal,
}

impl fmt::Display for PolicyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "declaring {} yields {} ({}%), below the {}% profit floor",
            self.digit, self.profit, self.profit_percent, self.profit_floor_percent
        )
    }
}

/// A chosen outcome plus everything needed to audit the choice
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeDecision {
    pub outcome: Outcome,
    /// `None` when the round had no bets
    pub candidate: Option<OutcomeCandidate>,
    pub rank: Option<usize>,
    pub bucket: SelectionBucket,
    pub warning: Option<PolicyWarning>,
    pub report: LiabilityReport,
}

impl OutcomeDecision {
    pub fn profit(&self) -> Decimal {
        self.candidate
            .as_ref()
            .map(|c| c.profit)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn profit_percent(&self) -> Decimal {
        self.candidate
            .as_ref()
            .map(|c| c.profit_percent)
            .unwrap_or(Decimal::ZERO)
    }

    /// Liability owed for the chosen outcome; settlement must pay exactly this
    pub fn liability(&self) -> Decimal {
        self.candidate
            .as_ref()
            .map(|c| c.liability)
            .unwrap_or(Decimal::ZERO)
    }

    /// Build the profit snapshot persisted on the round
    pub fn snapshot(&self) -> Result<ProfitSnapshot, serde_json::Error> {
        let ranking = serde_json::to_string(self.report.candidates())?;
        let total = self.report.candidates().len();
        let rank_label = match self.rank {
            Some(rank) => format!("{} of {}", rank, total),
            None => "unranked".to_string(),
        };

        Ok(ProfitSnapshot {
            collection: self.report.collection(),
            payout: self.liability(),
            profit: self.profit(),
            profit_percent: self.profit_percent(),
            rank: self.rank,
            rank_label,
            bucket: self.bucket,
            ranking,
        })
    }
}

/// Chooses outcomes under a risk policy
#[derive(Debug, Clone)]
pub struct OutcomeSelector {
    policy: RiskPolicy,
}

impl OutcomeSelector {
    pub fn new(policy: RiskPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// Autonomous selection. Always produces an outcome.
    pub fn select_system<R: Rng + ?Sized>(
        &self,
        report: LiabilityReport,
        rng: &mut R,
    ) -> OutcomeDecision {
        if report.is_empty() {
            let digit = Digit::ALL[rng.gen_range(0..Digit::ALL.len())];
            return OutcomeDecision {
                outcome: Outcome::from_digit(digit),
                candidate: None,
                rank: None,
                bucket: SelectionBucket::NoBets,
                warning: None,
                report,
            };
        }

        let ranked = report.candidates();
        let acceptable: Vec<&OutcomeCandidate> = ranked.iter().filter(|c| c.is_acceptable).collect();

        let (chosen, bucket) = if acceptable.is_empty() {
            let least_loss = &ranked[0];
            warn!(
                digit = %least_loss.digit,
                profit = %least_loss.profit,
                max_loss = %self.policy.max_loss,
                "No outcome within the loss bound; declaring least-loss candidate"
            );
            (least_loss.clone(), SelectionBucket::LeastLoss)
        } else {
            let roll = rng.gen_range(0..100u32);
            Self::pick_acceptable(&acceptable, roll, rng)
        };

        let warning = self.warning_for(&chosen);
        OutcomeDecision {
            outcome: Outcome::from_digit(chosen.digit),
            rank: report.rank_of(chosen.digit),
            candidate: Some(chosen),
            bucket,
            warning,
            report,
        }
    }

    /// Admin-forced selection. Rejects any outcome beyond the loss bound;
    /// accepts unprofitable outcomes with a warning.
    pub fn select_admin(
        &self,
        report: LiabilityReport,
        target: TargetSelector,
    ) -> Result<OutcomeDecision, PolicyBreach> {
        let digit = target.representative_digit();
        let candidate = report.candidate_for(digit).cloned();

        let warning = match &candidate {
            Some(c) if !c.is_acceptable => {
                return Err(PolicyBreach::MaxLossExceeded {
                    digit,
                    loss: -c.profit,
                    max_loss: self.policy.max_loss,
                });
            }
            Some(c) => self.warning_for(c),
            None => None,
        };

        Ok(OutcomeDecision {
            outcome: Outcome::from_digit(digit),
            rank: report.rank_of(digit),
            candidate,
            bucket: SelectionBucket::AdminForced,
            warning,
            report,
        })
    }

    /// Weighted pick among acceptable candidates (highest profit first).
    /// `roll` is in 0..100.
    fn pick_acceptable<R: Rng + ?Sized>(
        acceptable: &[&OutcomeCandidate],
        roll: u32,
        rng: &mut R,
    ) -> (OutcomeCandidate, SelectionBucket) {
        if roll < HIGHEST_PROFIT_WEIGHT {
            return (acceptable[0].clone(), SelectionBucket::HighestProfit);
        }

        if roll < HIGHEST_PROFIT_WEIGHT + MIDDLE_PROFITABLE_WEIGHT {
            let profitable: Vec<&OutcomeCandidate> =
                acceptable.iter().copied().filter(|c| c.is_profitable).collect();
            let pick = if profitable.len() < 2 {
                profitable.first().copied().unwrap_or(acceptable[0])
            } else {
                profitable[profitable.len() / 2]
            };
            return (pick.clone(), SelectionBucket::MiddleProfitable);
        }

        let pick = acceptable[rng.gen_range(0..acceptable.len())];
        (pick.clone(), SelectionBucket::RandomAcceptable)
    }

    fn warning_for(&self, candidate: &OutcomeCandidate) -> Option<PolicyWarning> {
        (!candidate.is_profitable).then(|| PolicyWarning {
            digit: candidate.digit,
            profit: candidate.profit,
            profit_percent: candidate.profit_percent,
            profit_floor_percent: self.policy.profit_floor_percent,
        })
    }
}
