//! Signed money amounts in integer cents.

use std::{
  fmt,
  iter::Sum,
  ops::{Add, AddAssign, Neg, Sub, SubAssign},
  str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::Error;

/// A signed amount of money, stored as integer cents to avoid floating-point
/// drift. Balances may go negative; transaction amounts must be positive.
///
/// Arithmetic saturates at the `i64` bounds. Stored amounts are capped at
/// [`MoneyCents::MAX_AMOUNT`], so sums over a book stay far from them.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(transparent)]
pub struct MoneyCents(i64);

impl MoneyCents {
  pub const ZERO: MoneyCents = MoneyCents(0);

  /// Largest amount a single transaction, payment, request or starting
  /// balance may carry: one hundred billion dollars.
  pub const MAX_AMOUNT: MoneyCents = MoneyCents(10_000_000_000_000);

  pub const fn new(cents: i64) -> Self { Self(cents) }

  /// Whole dollars, for fixtures and seed data.
  pub const fn dollars(dollars: i64) -> Self { Self(dollars * 100) }

  pub const fn cents(self) -> i64 { self.0 }

  pub const fn is_positive(self) -> bool { self.0 > 0 }
}

impl fmt::Display for MoneyCents {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if self.0 < 0 { "-" } else { "" };
    let abs = self.0.unsigned_abs();
    write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
  }
}

/// Parses user input such as `"12"`, `"12.5"`, `"12,50"` or `"$1250.00"`.
/// More than two decimal places is rejected.
impl FromStr for MoneyCents {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || Error::Validation(format!("invalid amount: {s:?}"));

    let trimmed = s.trim();
    let (negative, rest) = match trimmed.strip_prefix('-') {
      Some(rest) => (true, rest),
      None => (false, trimmed),
    };
    let rest = rest.strip_prefix('$').unwrap_or(rest).replace(',', ".");

    let (whole, frac) = match rest.split_once('.') {
      Some((whole, frac)) => (whole, frac),
      None => (rest.as_str(), ""),
    };
    if whole.is_empty()
      || frac.len() > 2
      || !whole.chars().all(|c| c.is_ascii_digit())
      || !frac.chars().all(|c| c.is_ascii_digit())
    {
      return Err(invalid());
    }

    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac: i64 = match frac.len() {
      0 => 0,
      1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
      _ => frac.parse().map_err(|_| invalid())?,
    };

    let cents = whole
      .checked_mul(100)
      .and_then(|c| c.checked_add(frac))
      .ok_or_else(invalid)?;
    Ok(Self(if negative { -cents } else { cents }))
  }
}

/// Accepts integer cents (`1250`) or a decimal string (`"12.50"`, `"12,50"`).
impl<'de> Deserialize<'de> for MoneyCents {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      Cents(i64),
      Text(String),
    }

    match Raw::deserialize(deserializer)? {
      Raw::Cents(cents) => Ok(Self(cents)),
      Raw::Text(text) => text.parse().map_err(de::Error::custom),
    }
  }
}

impl Add for MoneyCents {
  type Output = MoneyCents;

  fn add(self, rhs: MoneyCents) -> Self::Output {
    MoneyCents(self.0.saturating_add(rhs.0))
  }
}

impl AddAssign for MoneyCents {
  fn add_assign(&mut self, rhs: MoneyCents) { *self = *self + rhs; }
}

impl Sub for MoneyCents {
  type Output = MoneyCents;

  fn sub(self, rhs: MoneyCents) -> Self::Output {
    MoneyCents(self.0.saturating_sub(rhs.0))
  }
}

impl SubAssign for MoneyCents {
  fn sub_assign(&mut self, rhs: MoneyCents) { *self = *self - rhs; }
}

impl Neg for MoneyCents {
  type Output = MoneyCents;

  fn neg(self) -> Self::Output { MoneyCents(self.0.saturating_neg()) }
}

impl Sum for MoneyCents {
  fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
    iter.fold(MoneyCents::ZERO, Add::add)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_common_inputs() {
    assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
    assert_eq!("10,5".parse::<MoneyCents>().unwrap().cents(), 1050);
    assert_eq!("$12.34".parse::<MoneyCents>().unwrap().cents(), 1234);
    assert_eq!("-0.07".parse::<MoneyCents>().unwrap().cents(), -7);
  }

  #[test]
  fn rejects_malformed_inputs() {
    for input in ["", "12.345", "abc", "1.2.3", ".50", "12.-1"] {
      assert!(input.parse::<MoneyCents>().is_err(), "{input:?} parsed");
    }
  }

  #[test]
  fn arithmetic_saturates_instead_of_overflowing() {
    let huge = MoneyCents::new(i64::MAX);
    assert_eq!((huge + MoneyCents::new(1)).cents(), i64::MAX);
    assert_eq!((-huge - MoneyCents::new(10)).cents(), i64::MIN);
    assert_eq!((-MoneyCents::new(i64::MIN)).cents(), i64::MAX);
    let total: MoneyCents = [huge, huge, MoneyCents::new(5)].into_iter().sum();
    assert_eq!(total.cents(), i64::MAX);
  }

  #[test]
  fn deserializes_cents_or_decimal_text() {
    let parse = |json: &str| serde_json::from_str::<MoneyCents>(json);
    assert_eq!(parse("1250").unwrap().cents(), 1250);
    assert_eq!(parse(r#""12,50""#).unwrap().cents(), 1250);
    assert_eq!(parse(r#""$3.07""#).unwrap().cents(), 307);
    assert!(parse(r#""12.345""#).is_err());
    assert!(parse("12.5").is_err());
    assert_eq!(serde_json::to_string(&MoneyCents::new(1250)).unwrap(), "1250");
  }

  #[test]
  fn display_formats_sign_and_cents() {
    assert_eq!(MoneyCents::new(123_456).to_string(), "$1234.56");
    assert_eq!(MoneyCents::new(-1200).to_string(), "-$12.00");
    assert_eq!(MoneyCents::ZERO.to_string(), "$0.00");
  }
}
