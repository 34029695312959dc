//! Liability calculator
//!
//! For every candidate digit, works out what the house would owe if that
//! digit were declared, and ranks the ten candidates by profit. Stakes are
//! bucketed once per bet (per color, per size, per digit) and each candidate
//! is then priced from the buckets, so a round with many bets costs
//! O(bets + 10) rather than O(bets x 10).

use crate::games::taxonomy::{self, color_of, size_of};
use crate::games::types::{Bet, BetResult, Color, Digit, Selection, Size};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Thresholds used to flag candidates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskPolicy {
    /// Minimum profit-percent for a candidate to count as profitable
    pub profit_floor_percent: Decimal,
    /// Largest loss (positive number) the house accepts
    pub max_loss: Decimal,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            profit_floor_percent: dec!(10),
            max_loss: Decimal::ZERO,
        }
    }
}

/// House position if one particular digit is declared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeCandidate {
    pub digit: Digit,
    pub color: Color,
    pub size: Size,
    pub color_payout: Decimal,
    pub number_payout: Decimal,
    pub size_payout: Decimal,
    pub liability: Decimal,
    /// Total staked on the round; identical for every candidate
    pub collection: Decimal,
    pub profit: Decimal,
    pub profit_percent: Decimal,
    pub is_profitable: bool,
    pub is_acceptable: bool,
}

/// Output of a liability run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "candidates", rename_all = "snake_case")]
pub enum LiabilityReport {
    NoBets,
    /// All ten candidates, highest profit first; ties keep digit order
    Ranked(Vec<OutcomeCandidate>),
}

impl LiabilityReport {
    pub fn candidates(&self) -> &[OutcomeCandidate] {
        match self {
            LiabilityReport::NoBets => &[],
            LiabilityReport::Ranked(candidates) => candidates,
        }
    }

    pub fn candidate_for(&self, digit: Digit) -> Option<&OutcomeCandidate> {
        self.candidates().iter().find(|c| c.digit == digit)
    }

    /// 1-based position of `digit` in the ranking
    pub fn rank_of(&self, digit: Digit) -> Option<usize> {
        self.candidates()
            .iter()
            .position(|c| c.digit == digit)
            .map(|index| index + 1)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, LiabilityReport::NoBets)
    }

    /// Total staked on the round
    pub fn collection(&self) -> Decimal {
        self.candidates()
            .first()
            .map(|c| c.collection)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Stake totals per selection
#[derive(Debug, Default)]
struct Exposure {
    color: [Decimal; 3],
    size: [Decimal; 2],
    digit: [Decimal; 10],
    total: Decimal,
}

impl Exposure {
    fn from_bets<'a>(bets: impl IntoIterator<Item = &'a Bet>) -> Self {
        let mut exposure = Exposure::default();
        for bet in bets {
            if bet.result == BetResult::Cancelled {
                continue;
            }
            match bet.selection {
                Selection::Color(color) => exposure.color[color_index(color)] += bet.amount,
                Selection::Size(size) => exposure.size[size_index(size)] += bet.amount,
                Selection::Digit(digit) => exposure.digit[digit.value() as usize] += bet.amount,
            }
            exposure.total += bet.amount;
        }
        exposure
    }

    fn price(&self, digit: Digit, policy: &RiskPolicy) -> OutcomeCandidate {
        let color_payout: Decimal = Color::ALL
            .into_iter()
            .map(|c| taxonomy::payout(&Selection::Color(c), self.color[color_index(c)], digit))
            .sum();
        let size_payout: Decimal = Size::ALL
            .into_iter()
            .map(|s| taxonomy::payout(&Selection::Size(s), self.size[size_index(s)], digit))
            .sum();
        let number_payout = taxonomy::payout(
            &Selection::Digit(digit),
            self.digit[digit.value() as usize],
            digit,
        );

        let liability = color_payout + size_payout + number_payout;
        let profit = self.total - liability;
        let profit_percent = profit_percent(profit, self.total);

        OutcomeCandidate {
            digit,
            color: color_of(digit),
            size: size_of(digit),
            color_payout,
            number_payout,
            size_payout,
            liability,
            collection: self.total,
            profit,
            profit_percent,
            is_profitable: profit >= Decimal::ZERO
                && profit_percent >= policy.profit_floor_percent,
            is_acceptable: profit >= -policy.max_loss,
        }
    }
}

fn color_index(color: Color) -> usize {
    match color {
        Color::Green => 0,
        Color::Red => 1,
        Color::Violet => 2,
    }
}

fn size_index(size: Size) -> usize {
    match size {
        Size::Big => 0,
        Size::Small => 1,
    }
}

/// Profit as a percentage of collection, two decimal places
pub fn profit_percent(profit: Decimal, collection: Decimal) -> Decimal {
    if collection.is_zero() {
        return Decimal::ZERO;
    }
    (profit / collection * dec!(100)).round_dp(2)
}

/// Rank all ten outcomes for the given bets. Cancelled bets are ignored.
pub fn calculate<'a>(
    bets: impl IntoIterator<Item = &'a Bet>,
    policy: &RiskPolicy,
) -> LiabilityReport {
    let exposure = Exposure::from_bets(bets);
    if exposure.total.is_zero() {
        return LiabilityReport::NoBets;
    }

    let mut candidates: Vec<OutcomeCandidate> = Digit::ALL
        .into_iter()
        .map(|digit| exposure.price(digit, policy))
        .collect();
    // sort_by is stable, so equal profits stay in digit order
    candidates.sort_by(|a, b| b.profit.cmp(&a.profit));

    LiabilityReport::Ranked(candidates)
}
