//! Outcome taxonomy and payout table
//!
//! Fixed mapping from a digit to its color and size, and the multiplier a
//! selection earns when a digit is declared. Liability, preview and
//! settlement all price bets through [`winning_multiplier`] so the three can
//! never disagree.

use crate::games::types::{Color, Digit, Selection, Size};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// GREEN or RED on a single-color digit
pub const COLOR_MULTIPLIER: Decimal = dec!(1.95);
/// VIOLET on 0 or 5
pub const VIOLET_MULTIPLIER: Decimal = dec!(4.5);
/// GREEN on 0 or RED on 5
pub const DUAL_COLOR_MULTIPLIER: Decimal = dec!(1.45);
pub const NUMBER_MULTIPLIER: Decimal = dec!(8.5);
pub const SIZE_MULTIPLIER: Decimal = dec!(1.95);

/// Decimal places a stake may carry. Stake times any multiplier then has at
/// most four places and never needs rounding.
pub const STAKE_SCALE: u32 = 2;

const COLORS: [Color; 10] = [
    Color::Violet,
    Color::Green,
    Color::Red,
    Color::Green,
    Color::Red,
    Color::Violet,
    Color::Red,
    Color::Green,
    Color::Red,
    Color::Green,
];

pub fn color_of(digit: Digit) -> Color {
    COLORS[digit.value() as usize]
}

pub fn size_of(digit: Digit) -> Size {
    if digit.value() <= 4 {
        Size::Small
    } else {
        Size::Big
    }
}

/// 0 and 5 satisfy VIOLET and one of GREEN/RED at once
pub fn is_dual_color(digit: Digit) -> bool {
    matches!(digit.value(), 0 | 5)
}

/// Multiplier quoted to the player when the bet is placed
pub fn placement_multiplier(selection: &Selection) -> Decimal {
    match selection {
        Selection::Color(Color::Violet) => VIOLET_MULTIPLIER,
        Selection::Color(_) => COLOR_MULTIPLIER,
        Selection::Digit(_) => NUMBER_MULTIPLIER,
        Selection::Size(_) => SIZE_MULTIPLIER,
    }
}

/// Multiplier paid if `digit` is declared, or `None` if the selection loses
pub fn winning_multiplier(selection: &Selection, digit: Digit) -> Option<Decimal> {
    match *selection {
        Selection::Digit(picked) => (picked == digit).then_some(NUMBER_MULTIPLIER),
        Selection::Size(size) => (size_of(digit) == size).then_some(SIZE_MULTIPLIER),
        Selection::Color(Color::Violet) => is_dual_color(digit).then_some(VIOLET_MULTIPLIER),
        Selection::Color(Color::Green) if digit.value() == 0 => Some(DUAL_COLOR_MULTIPLIER),
        Selection::Color(Color::Red) if digit.value() == 5 => Some(DUAL_COLOR_MULTIPLIER),
        Selection::Color(color) => (color_of(digit) == color).then_some(COLOR_MULTIPLIER),
    }
}

/// Amount owed on `stake` if `digit` is declared (zero when the bet loses)
pub fn payout(selection: &Selection, stake: Decimal, digit: Digit) -> Decimal {
    winning_multiplier(selection, digit)
        .map(|multiplier| stake * multiplier)
        .unwrap_or(Decimal::ZERO)
}

/// First digit in natural order with the given color
pub fn first_digit_with_color(color: Color) -> Digit {
    Digit::ALL
        .into_iter()
        .find(|d| color_of(*d) == color)
        .unwrap_or(Digit::ALL[0])
}

/// First digit in natural order with the given size
pub fn first_digit_with_size(size: Size) -> Digit {
    Digit::ALL
        .into_iter()
        .find(|d| size_of(*d) == size)
        .unwrap_or(Digit::ALL[0])
}
