use crate::error::{Error, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed-point amount. Stored as decimal text so SQLite never rounds it through a float.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(pub Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(units: i64, scale: u32) -> Self {
        Money(Decimal::new(units, scale))
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn times(self, quantity: i64) -> Result<Money> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Money)
            .ok_or_else(out_of_range)
    }

    pub fn plus(self, other: Money) -> Result<Money> {
        self.0.checked_add(other.0).map(Money).ok_or_else(out_of_range)
    }

    /// `self - discount`, never below zero.
    pub fn less_discount(self, discount: Money) -> Money {
        let net = self.0 - discount.0;
        if net.is_sign_negative() {
            Money::ZERO
        } else {
            Money(net)
        }
    }

    /// Half-cents round away from zero.
    pub fn round_cents(self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

pub(crate) fn out_of_range() -> Error {
    Error::validation("amount out of range")
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.normalize().to_string()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Text(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                Money::from_str(text).map_err(|e| FromSqlError::Other(Box::new(e)))
            }
            ValueRef::Integer(i) => Ok(Money(Decimal::from(i))),
            ValueRef::Real(f) => Decimal::try_from(f)
                .map(Money)
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_never_drives_amount_negative() {
        let total = Money::new(50, 0);
        assert_eq!(total.less_discount(Money::new(70, 0)), Money::ZERO);
        assert_eq!(total.less_discount(Money::new(1250, 2)), Money::new(3750, 2));
    }

    #[test]
    fn line_sums_do_not_drift() {
        let price = Money::from_str("0.10").unwrap();
        let total = (0..30).try_fold(Money::ZERO, |acc, _| acc.plus(price.times(1)?)).unwrap();
        assert_eq!(total, Money::new(3, 0));
    }

    #[test]
    fn half_cents_round_up() {
        assert_eq!(Money::new(12345, 3).round_cents(), Money::new(1235, 2));
        assert_eq!(Money::new(12344, 3).round_cents(), Money::new(1234, 2));
    }

    #[test]
    fn overflow_is_an_error() {
        let huge = Money::from_str("100000000000000000000").unwrap();
        let err = huge.times(1_000_000_000).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);

        let max = Money(Decimal::MAX);
        assert!(max.plus(Money::new(1, 0)).is_err());
    }

    #[test]
    fn sign_helpers() {
        assert!(Money::new(-1, 2).is_negative());
        assert!(!Money::ZERO.is_negative());
        assert!(!Money::ZERO.is_positive());
        assert!(Money::new(1, 2).is_positive());
    }
}
