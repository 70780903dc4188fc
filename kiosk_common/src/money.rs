use std::{cmp::Ordering, fmt::Display, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Cannot combine {0} with {1}")]
    CurrencyMismatch(Currency, Currency),
    #[error("The operation would result in a negative amount")]
    NegativeAmount,
    #[error("The operation overflows the representable range")]
    Overflow,
    #[error("{0} is not a valid ISO-4217 style currency code")]
    InvalidCurrencyCode(String),
    #[error("{0} is not a valid decimal amount")]
    InvalidAmount(String),
}

//--------------------------------------      Currency      ----------------------------------------------------------

/// A 3-letter uppercase currency code, stored inline so that [`Money`] stays `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Currency([u8; 3]);

impl Currency {
    pub const EUR: Currency = Currency(*b"EUR");
    pub const RUB: Currency = Currency(*b"RUB");
    pub const USD: Currency = Currency(*b"USD");
    /// Telegram Stars.
    pub const XTR: Currency = Currency(*b"XTR");

    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let code = code.trim();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCurrencyCode(code.to_string()));
        }
        let mut bytes = [0u8; 3];
        for (i, b) in code.bytes().enumerate() {
            bytes[i] = b.to_ascii_uppercase();
        }
        Ok(Self(bytes))
    }

    pub fn as_str(&self) -> &str {
        // Only constructed from validated ASCII
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Currency::new(&s).map_err(de::Error::custom)
    }
}

//--------------------------------------        Money       ----------------------------------------------------------

/// An immutable amount of money in a single currency.
///
/// The amount is stored in minor units (cents), so `Money::from_cents(2999, Currency::USD)` is $29.99.
/// All arithmetic is checked and returns a new value; amounts can never go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    cents: i64,
    currency: Currency,
}

impl Money {
    pub fn from_cents(cents: i64, currency: Currency) -> Result<Self, MoneyError> {
        if cents < 0 {
            return Err(MoneyError::NegativeAmount);
        }
        Ok(Self { cents, currency })
    }

    pub fn zero(currency: Currency) -> Self {
        Self { cents: 0, currency }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, MoneyError> {
        self.require_same_currency(rhs)?;
        let cents = self.cents.checked_add(rhs.cents).ok_or(MoneyError::Overflow)?;
        Money::from_cents(cents, self.currency)
    }

    pub fn checked_sub(self, rhs: Money) -> Result<Money, MoneyError> {
        self.require_same_currency(rhs)?;
        let cents = self.cents.checked_sub(rhs.cents).ok_or(MoneyError::Overflow)?;
        Money::from_cents(cents, self.currency)
    }

    pub fn checked_mul(self, scalar: i64) -> Result<Money, MoneyError> {
        let cents = self.cents.checked_mul(scalar).ok_or(MoneyError::Overflow)?;
        Money::from_cents(cents, self.currency)
    }

    /// The amount in major units, for gateway APIs that want `"29.99"`.
    pub fn to_decimal_string(&self) -> String {
        format!("{}.{:02}", self.cents / 100, self.cents % 100)
    }

    /// Parses a major-unit decimal string such as `"29.99"` or `"30"`, as gateways report amounts.
    /// At most two fractional digits are accepted.
    pub fn from_decimal_str(s: &str, currency: Currency) -> Result<Self, MoneyError> {
        let s = s.trim();
        let invalid = || MoneyError::InvalidAmount(s.to_string());
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, ""),
        };
        if major.is_empty() || minor.len() > 2 || !major.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let major: i64 = major.parse().map_err(|_| invalid())?;
        let minor: i64 = match minor {
            "" => 0,
            m if m.bytes().all(|b| b.is_ascii_digit()) => {
                let v: i64 = m.parse().map_err(|_| invalid())?;
                if m.len() == 1 {
                    v * 10
                } else {
                    v
                }
            },
            _ => return Err(invalid()),
        };
        let cents = major.checked_mul(100).and_then(|c| c.checked_add(minor)).ok_or(MoneyError::Overflow)?;
        Money::from_cents(cents, currency)
    }

    fn require_same_currency(&self, rhs: Money) -> Result<(), MoneyError> {
        if self.currency == rhs.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch(self.currency, rhs.currency))
        }
    }
}

impl PartialOrd for Money {
    /// Amounts in different currencies are not comparable and yield `None`.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.currency == other.currency {
            self.cents.partial_cmp(&other.cents)
        } else {
            None
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.currency)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn usd(cents: i64) -> Money {
        Money::from_cents(cents, Currency::USD).unwrap()
    }

    #[test]
    fn currency_codes_are_validated() {
        assert_eq!(Currency::new("usd").unwrap(), Currency::USD);
        assert_eq!(Currency::new(" eur ").unwrap(), Currency::EUR);
        assert!(matches!(Currency::new("US"), Err(MoneyError::InvalidCurrencyCode(_))));
        assert!(matches!(Currency::new("U$D"), Err(MoneyError::InvalidCurrencyCode(_))));
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert_eq!(Money::from_cents(-1, Currency::USD), Err(MoneyError::NegativeAmount));
    }

    #[test]
    fn addition_requires_matching_currencies() {
        let a = usd(1000);
        let b = Money::from_cents(500, Currency::EUR).unwrap();
        let err = a.checked_add(b).unwrap_err();
        assert_eq!(err, MoneyError::CurrencyMismatch(Currency::USD, Currency::EUR));
        // Neither operand changed
        assert_eq!(a, usd(1000));
        assert_eq!(b.cents(), 500);
    }

    #[test]
    fn subtraction_cannot_go_negative() {
        assert_eq!(usd(100).checked_sub(usd(250)), Err(MoneyError::NegativeAmount));
        assert_eq!(usd(250).checked_sub(usd(100)).unwrap(), usd(150));
    }

    #[test]
    fn multiplication_is_checked() {
        assert_eq!(usd(1000).checked_mul(2).unwrap(), usd(2000));
        assert_eq!(usd(1000).checked_mul(-1), Err(MoneyError::NegativeAmount));
        assert_eq!(usd(i64::MAX).checked_mul(2), Err(MoneyError::Overflow));
    }

    #[test]
    fn cross_currency_comparisons_are_undefined() {
        let a = usd(100);
        let b = Money::from_cents(100, Currency::EUR).unwrap();
        assert_eq!(a.partial_cmp(&b), None);
        assert!(usd(200) > usd(100));
    }

    #[test]
    fn decimal_strings_parse_into_minor_units() {
        assert_eq!(Money::from_decimal_str("29.99", Currency::USD).unwrap(), usd(2999));
        assert_eq!(Money::from_decimal_str("30", Currency::USD).unwrap(), usd(3000));
        assert_eq!(Money::from_decimal_str("0.5", Currency::USD).unwrap(), usd(50));
        assert_eq!(Money::from_decimal_str(" 1.05 ", Currency::USD).unwrap(), usd(105));
        assert!(Money::from_decimal_str("1.999", Currency::USD).is_err());
        assert!(Money::from_decimal_str("-1.00", Currency::USD).is_err());
        assert!(Money::from_decimal_str("abc", Currency::USD).is_err());
        assert!(Money::from_decimal_str("", Currency::USD).is_err());
    }

    #[test]
    fn display_uses_major_units() {
        assert_eq!(usd(2999).to_string(), "29.99 USD");
        assert_eq!(usd(5).to_string(), "0.05 USD");
        assert_eq!(Money::zero(Currency::XTR).to_string(), "0.00 XTR");
    }
}
