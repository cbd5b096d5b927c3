use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------        Cents          ---------------------------------------------------------
/// A signed amount of money in minor currency units (cents). Every amount the engine stores or sums is a `Cents`, so
/// totals are exact and re-summing a breakdown always reproduces its stored total.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Cents(i64);

op!(binary Cents: Add::add, Sub::sub);
op!(inplace Cents: AddAssign::add_assign, SubAssign::sub_assign);
op!(unary Cents: Neg::neg);

impl Mul<i64> for Cents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a Cents> for Cents {
    fn sum<I: Iterator<Item = &'a Cents>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct CentsConversionError(String);

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Parses a decimal amount such as `"-3.42"`, `"39.99"`, `"7"` or `"1.234,56"`.
///
/// The last `.` or `,` in the string is the decimal separator; any earlier separators are treated as digit grouping.
/// Fractions beyond two places are rounded half away from zero.
impl FromStr for Cents {
    type Err = CentsConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (negative, body) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };
        if body.is_empty() {
            return Err(CentsConversionError(format!("'{s}' is not a number")));
        }
        let is_separator = |c: char| c == '.' || c == ',';
        let (int_part, frac_part) = match body.rfind(is_separator) {
            Some(pos) => (&body[..pos], &body[pos + 1..]),
            None => (body, ""),
        };
        let int_digits = int_part.chars().filter(|c| !is_separator(*c)).collect::<String>();
        if !int_digits.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(CentsConversionError(format!("'{s}' is not a number")));
        }
        if int_digits.is_empty() && frac_part.is_empty() {
            return Err(CentsConversionError(format!("'{s}' is not a number")));
        }
        let units = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse::<i64>().map_err(|e| CentsConversionError(format!("{s}: {e}")))?
        };
        let mut frac = frac_part.bytes().map(|b| i64::from(b - b'0'));
        let tenths = frac.next().unwrap_or(0);
        let hundredths = frac.next().unwrap_or(0);
        let round_up = frac.next().map(|d| d >= 5).unwrap_or(false);
        let magnitude = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(tenths * 10 + hundredths + i64::from(round_up)))
            .ok_or_else(|| CentsConversionError(format!("{s} is too large")))?;
        Ok(Self(if negative { -magnitude } else { magnitude }))
    }
}

impl Cents {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Converts a JSON-style floating point amount into cents, using its shortest decimal representation so that
    /// `3.42` becomes exactly 342 cents.
    pub fn from_f64(value: f64) -> Result<Self, CentsConversionError> {
        if !value.is_finite() {
            return Err(CentsConversionError(format!("{value} is not a finite amount")));
        }
        Self::from_str(&value.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cents(s: &str) -> i64 {
        Cents::from_str(s).unwrap_or_else(|e| panic!("{s} should parse: {e}")).value()
    }

    #[test]
    fn parse_plain_amounts() {
        assert_eq!(cents("3.42"), 342);
        assert_eq!(cents("-1.10"), -110);
        assert_eq!(cents("+39.99"), 3999);
        assert_eq!(cents("7"), 700);
        assert_eq!(cents(".5"), 50);
        assert_eq!(cents("0.00"), 0);
        assert_eq!(cents(" -0.07 "), -7);
    }

    #[test]
    fn parse_rounds_half_away_from_zero() {
        assert_eq!(cents("1.005"), 101);
        assert_eq!(cents("-1.005"), -101);
        assert_eq!(cents("1.0049"), 100);
    }

    #[test]
    fn parse_decimal_comma_and_grouping() {
        assert_eq!(cents("3,42"), 342);
        assert_eq!(cents("1.234,56"), 123_456);
        assert_eq!(cents("1,234.56"), 123_456);
    }

    #[test]
    fn parse_rejects_garbage() {
        for s in ["", "-", "abc", "1.2.x", "12e3", "$4.00", ","] {
            assert!(Cents::from_str(s).is_err(), "{s} should not parse");
        }
    }

    #[test]
    fn from_floats() {
        assert_eq!(Cents::from_f64(3.42).unwrap().value(), 342);
        assert_eq!(Cents::from_f64(-0.1).unwrap().value(), -10);
        assert!(Cents::from_f64(f64::NAN).is_err());
    }

    #[test]
    fn display_and_arithmetic() {
        let total: Cents = [Cents::from(342), Cents::from(110)].iter().sum();
        assert_eq!(total.to_string(), "4.52");
        assert_eq!((-Cents::from(5)).to_string(), "-0.05");
        assert_eq!((Cents::from(1999) * 2).to_string(), "39.98");
        let mut running = Cents::default();
        running += Cents::from(250);
        running -= Cents::from(300);
        assert_eq!(running, Cents::from(-50));
    }
}
