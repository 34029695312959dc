use crate::errors::ValidationError;
use crate::games::period::PeriodCode;
use crate::games::selector::SelectionBucket;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type RoundId = Uuid;
pub type BetId = Uuid;
pub type UserId = String;

/// A drawn number, always within 0-9
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Digit(u8);

impl Digit {
    /// All ten outcomes in natural order
    pub const ALL: [Digit; 10] = [
        Digit(0),
        Digit(1),
        Digit(2),
        Digit(3),
        Digit(4),
        Digit(5),
        Digit(6),
        Digit(7),
        Digit(8),
        Digit(9),
    ];

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value <= 9 {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidDigit(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Digit {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Digit::new(value)
    }
}

impl From<Digit> for u8 {
    fn from(digit: Digit) -> Self {
        digit.0
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Digit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 1 {
            return Err(ValidationError::InvalidTarget(s.to_string()));
        }
        let value: u8 = trimmed
            .parse()
            .map_err(|_| ValidationError::InvalidTarget(s.to_string()))?;
        Digit::new(value)
    }
}

/// Derived color of a digit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Color {
    Green,
    Red,
    Violet,
}

impl Color {
    pub const ALL: [Color; 3] = [Color::Green, Color::Red, Color::Violet];
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Green => write!(f, "GREEN"),
            Color::Red => write!(f, "RED"),
            Color::Violet => write!(f, "VIOLET"),
        }
    }
}

impl FromStr for Color {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GREEN" => Ok(Color::Green),
            "RED" => Ok(Color::Red),
            "VIOLET" => Ok(Color::Violet),
            _ => Err(ValidationError::InvalidSelection {
                bet_type: BetType::Color,
                selection: s.to_string(),
            }),
        }
    }
}

/// Derived size of a digit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Size {
    Big,
    Small,
}

impl Size {
    pub const ALL: [Size; 2] = [Size::Big, Size::Small];
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Big => write!(f, "BIG"),
            Size::Small => write!(f, "SMALL"),
        }
    }
}

impl FromStr for Size {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BIG" => Ok(Size::Big),
            "SMALL" => Ok(Size::Small),
            _ => Err(ValidationError::InvalidSelection {
                bet_type: BetType::Size,
                selection: s.to_string(),
            }),
        }
    }
}

/// Bet family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetType {
    Color,
    Number,
    Size,
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Color => write!(f, "COLOR"),
            BetType::Number => write!(f, "NUMBER"),
            BetType::Size => write!(f, "SIZE"),
        }
    }
}

impl FromStr for BetType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "COLOR" | "COLOUR" => Ok(BetType::Color),
            "NUMBER" => Ok(BetType::Number),
            "SIZE" => Ok(BetType::Size),
            _ => Err(ValidationError::UnknownBetType(s.to_string())),
        }
    }
}

/// What a bet wagers on, resolved once at placement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "bet_type", content = "selection", rename_all = "UPPERCASE")]
pub enum Selection {
    Color(Color),
    #[serde(rename = "NUMBER")]
    Digit(Digit),
    Size(Size),
}

impl Selection {
    /// Parse a raw selection string for the given bet family
    pub fn parse(bet_type: BetType, raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidSelection {
            bet_type,
            selection: raw.to_string(),
        };

        match bet_type {
            BetType::Color => raw.parse().map(Selection::Color),
            BetType::Size => raw.parse().map(Selection::Size),
            BetType::Number => raw
                .parse::<Digit>()
                .map(Selection::Digit)
                .map_err(|_| invalid()),
        }
    }

    pub fn bet_type(&self) -> BetType {
        match self {
            Selection::Color(_) => BetType::Color,
            Selection::Digit(_) => BetType::Number,
            Selection::Size(_) => BetType::Size,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Color(color) => write!(f, "{}", color),
            Selection::Digit(digit) => write!(f, "{}", digit),
            Selection::Size(size) => write!(f, "{}", size),
        }
    }
}

/// A declared (or candidate) outcome with its derived attributes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    pub digit: Digit,
    pub color: Color,
    pub size: Size,
}

impl Outcome {
    pub fn from_digit(digit: Digit) -> Self {
        Self {
            digit,
            color: crate::games::taxonomy::color_of(digit),
            size: crate::games::taxonomy::size_of(digit),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.digit, self.color, self.size)
    }
}

/// Lifecycle status of a round
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Open,
    Paused,
    /// Betting frozen while an outcome is being declared
    Closed,
    Cancelled,
    ResultDeclared,
}

impl RoundStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Cancelled | RoundStatus::ResultDeclared)
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::Open => write!(f, "OPEN"),
            RoundStatus::Paused => write!(f, "PAUSED"),
            RoundStatus::Closed => write!(f, "CLOSED"),
            RoundStatus::Cancelled => write!(f, "CANCELLED"),
            RoundStatus::ResultDeclared => write!(f, "RESULT_DECLARED"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResultStatus {
    Pending,
    Declared,
}

/// Who declared a round's outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "actor", rename_all = "UPPERCASE")]
pub enum Declarer {
    Admin { admin_id: String },
    System,
}

impl fmt::Display for Declarer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declarer::Admin { admin_id } => write!(f, "ADMIN({})", admin_id),
            Declarer::System => write!(f, "SYSTEM"),
        }
    }
}

/// Profit figures recorded on a round at declaration time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfitSnapshot {
    pub collection: Decimal,
    pub payout: Decimal,
    pub profit: Decimal,
    pub profit_percent: Decimal,
    /// 1-based position of the chosen outcome in the profit ranking
    pub rank: Option<usize>,
    pub rank_label: String,
    pub bucket: SelectionBucket,
    /// Serialized candidate ranking, kept for audit only
    pub ranking: String,
}

/// One timed betting period
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub period: PeriodCode,
    pub status: RoundStatus,
    pub result_status: ResultStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<Outcome>,
    pub declared_by: Option<Declarer>,
    pub declared_at: Option<DateTime<Utc>>,
    pub snapshot: Option<ProfitSnapshot>,
}

/// Lifecycle of a single wager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetResult {
    Pending,
    Won,
    Lost,
    Cancelled,
}

impl BetResult {
    pub fn is_final(self) -> bool {
        !matches!(self, BetResult::Pending)
    }
}

/// A player's single wager on a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub id: BetId,
    pub user_id: UserId,
    pub round_id: RoundId,
    pub selection: Selection,
    pub amount: Decimal,
    /// Stake times the standard multiplier at placement time
    pub potential_win: Decimal,
    pub result: BetResult,
    pub win_amount: Option<Decimal>,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn bet_type(&self) -> BetType {
        self.selection.bet_type()
    }
}

/// Kind of wallet movement recorded in the ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    BetPlaced,
    BetWon,
    BetRefund,
    Adjustment,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::BetPlaced => write!(f, "BET_PLACED"),
            TransactionKind::BetWon => write!(f, "BET_WON"),
            TransactionKind::BetRefund => write!(f, "BET_REFUND"),
            TransactionKind::Adjustment => write!(f, "ADJUSTMENT"),
        }
    }
}

/// Immutable audit record of a wallet movement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Signed: debits are negative
    pub amount: Decimal,
    pub reference_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
