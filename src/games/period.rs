//! Human-readable round period codes
//!
//! A period code is the round's calendar date followed by a daily sequence
//! number of at least four digits, e.g. `202610160042`. Codes are strictly
//! increasing within a day and restart at `0001` on a new date.

use crate::errors::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DATE_LEN: usize = 8;
const MIN_SEQUENCE_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeriodCode {
    date: NaiveDate,
    sequence: u32,
}

impl PeriodCode {
    pub fn new(date: NaiveDate, sequence: u32) -> Self {
        Self { date, sequence }
    }

    /// The code that follows `last` on `today`
    pub fn next_after(last: Option<&PeriodCode>, today: NaiveDate) -> Self {
        match last {
            Some(prev) if prev.date == today => Self::new(today, prev.sequence + 1),
            // A clock step backwards must not reuse a code that already exists
            Some(prev) if prev.date > today => Self::new(prev.date, prev.sequence + 1),
            _ => Self::new(today, 1),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for PeriodCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            self.date.format("%Y%m%d"),
            self.sequence,
            width = MIN_SEQUENCE_WIDTH
        )
    }
}

impl FromStr for PeriodCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidPeriodCode(s.to_string());

        if s.len() < DATE_LEN + MIN_SEQUENCE_WIDTH || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let (date_part, seq_part) = s.split_at(DATE_LEN);
        let date = NaiveDate::parse_from_str(date_part, "%Y%m%d").map_err(|_| invalid())?;
        let sequence: u32 = seq_part.parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }

        Ok(Self::new(date, sequence))
    }
}

impl TryFrom<String> for PeriodCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeriodCode> for String {
    fn from(code: PeriodCode) -> Self {
        code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    #[test]
    fn test_first_code_of_day() {
        let code = PeriodCode::next_after(None, day(16));
        assert_eq!(code.to_string(), "202610160001");
    }

    #[test]
    fn test_sequence_increments_within_day() {
        let first = PeriodCode::next_after(None, day(16));
        let second = PeriodCode::next_after(Some(&first), day(16));
        assert_eq!(second.to_string(), "202610160002");
        assert!(second > first);
    }

    #[test]
    fn test_sequence_resets_on_new_day() {
        let late = PeriodCode::new(day(16), 1440);
        let next = PeriodCode::next_after(Some(&late), day(17));
        assert_eq!(next.to_string(), "202610170001");
    }

    #[test]
    fn test_sequence_widens_past_four_digits() {
        let code = PeriodCode::new(day(16), 12345);
        assert_eq!(code.to_string(), "2026101612345");
        assert_eq!("2026101612345".parse::<PeriodCode>().unwrap(), code);
    }

    #[test]
    fn test_clock_going_backwards_keeps_increasing() {
        let last = PeriodCode::new(day(17), 3);
        let next = PeriodCode::next_after(Some(&last), day(16));
        assert!(next > last);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("2026101".parse::<PeriodCode>().is_err());
        assert!("20261016abcd".parse::<PeriodCode>().is_err());
        assert!("202613010001".parse::<PeriodCode>().is_err());
        assert!("202610160000".parse::<PeriodCode>().is_err());
    }
}
