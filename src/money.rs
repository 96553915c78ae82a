//! Exact monetary amounts in integer minor units

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::types::{ReconError, ReconResult};

/// ISO 4217 currency code (three upper-case ASCII letters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a currency from its ISO code, normalising to upper case
    pub fn new(code: &str) -> ReconResult<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ReconError::Validation(format!(
                "'{}' is not an ISO 4217 currency code",
                code
            )));
        }
        Ok(Self(code))
    }

    /// The three-letter code
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Number of decimal digits in one major unit
    pub fn minor_exponent(&self) -> u32 {
        match self.0.as_str() {
            "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF"
            | "UGX" | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
            "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
            _ => 2,
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = ReconError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed amount of money in integer minor units (cents for EUR).
///
/// Arithmetic is checked: mixing currencies yields
/// [`ReconError::CurrencyMismatch`] and overflow yields
/// [`ReconError::InvalidAmount`]. On the wire an amount is an exact decimal
/// string plus its currency:
///
/// ```rust
/// use reconciliation_core::{Currency, Money};
///
/// let eur = Currency::new("EUR").unwrap();
/// let amount = Money::new(50_000, eur);
/// assert_eq!(amount.to_string(), "500.00 EUR");
/// assert_eq!(
///     serde_json::to_string(&amount).unwrap(),
///     r#"{"amount":"500.00","currency":"EUR"}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    /// Create an amount from minor units
    pub fn new(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    /// Zero in the given currency
    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Parse a decimal string such as `"500.00"` in the given currency
    pub fn parse(value: &str, currency: Currency) -> ReconResult<Self> {
        let decimal = BigDecimal::from_str(value.trim())
            .map_err(|e| ReconError::InvalidAmount(format!("'{}': {}", value, e)))?;
        Self::from_decimal(&decimal, currency)
    }

    /// Convert an exact decimal into minor units, rejecting sub-minor precision
    pub fn from_decimal(decimal: &BigDecimal, currency: Currency) -> ReconResult<Self> {
        let factor = BigDecimal::from(10_i64.pow(currency.minor_exponent()));
        let scaled = decimal.clone() * factor;
        if scaled.with_scale(0) != scaled {
            return Err(ReconError::InvalidAmount(format!(
                "{} has more precision than {} allows",
                decimal, currency
            )));
        }
        let minor = scaled.to_i64().ok_or_else(|| {
            ReconError::InvalidAmount(format!("{} {} is out of range", decimal, currency))
        })?;
        Ok(Self::new(minor, currency))
    }

    pub fn minor_units(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// Absolute value; fails only for the most negative representable amount
    pub fn checked_abs(&self) -> ReconResult<Money> {
        self.minor
            .checked_abs()
            .map(|minor| Money::new(minor, self.currency.clone()))
            .ok_or_else(|| ReconError::InvalidAmount(format!("|{}| overflows", self)))
    }

    pub fn ensure_currency(&self, currency: &Currency) -> ReconResult<()> {
        if &self.currency != currency {
            return Err(ReconError::CurrencyMismatch(format!(
                "expected {}, got {}",
                currency, self
            )));
        }
        Ok(())
    }

    pub fn checked_add(&self, rhs: &Money) -> ReconResult<Money> {
        rhs.ensure_currency(&self.currency)?;
        self.minor
            .checked_add(rhs.minor)
            .map(|minor| Money::new(minor, self.currency.clone()))
            .ok_or_else(|| ReconError::InvalidAmount(format!("{} + {} overflows", self, rhs)))
    }

    pub fn checked_sub(&self, rhs: &Money) -> ReconResult<Money> {
        rhs.ensure_currency(&self.currency)?;
        self.minor
            .checked_sub(rhs.minor)
            .map(|minor| Money::new(minor, self.currency.clone()))
            .ok_or_else(|| ReconError::InvalidAmount(format!("{} - {} overflows", self, rhs)))
    }

    /// Compare two amounts of the same currency
    pub fn try_cmp(&self, rhs: &Money) -> ReconResult<std::cmp::Ordering> {
        rhs.ensure_currency(&self.currency)?;
        Ok(self.minor.cmp(&rhs.minor))
    }

    /// Exact decimal value, scaled to the currency's minor exponent
    pub fn to_decimal(&self) -> BigDecimal {
        BigDecimal::new(self.minor.into(), i64::from(self.currency.minor_exponent()))
    }

    /// Plain decimal string without currency, e.g. `-12.50`
    pub fn format_amount(&self) -> String {
        let exponent = self.currency.minor_exponent();
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        if exponent == 0 {
            return format!("{sign}{abs}");
        }
        let factor = 10_u64.pow(exponent);
        let width = exponent as usize;
        format!("{sign}{}.{:0width$}", abs / factor, abs % factor)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format_amount(), self.currency)
    }
}

#[derive(Serialize, Deserialize)]
struct MoneyRepr {
    amount: String,
    currency: Currency,
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MoneyRepr {
            amount: self.format_amount(),
            currency: self.currency.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = MoneyRepr::deserialize(deserializer)?;
        Money::parse(&repr.amount, repr.currency).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eur() -> Currency {
        Currency::new("EUR").unwrap()
    }

    #[test]
    fn test_currency_validation() {
        assert_eq!(Currency::new("eur").unwrap().code(), "EUR");
        assert!(Currency::new("EURO").is_err());
        assert!(Currency::new("E1R").is_err());
        assert_eq!(Currency::new("JPY").unwrap().minor_exponent(), 0);
        assert_eq!(Currency::new("KWD").unwrap().minor_exponent(), 3);
    }

    #[test]
    fn test_parse_and_format() {
        let amount = Money::parse("500", eur()).unwrap();
        assert_eq!(amount.minor_units(), 50_000);
        assert_eq!(amount.format_amount(), "500.00");

        let negative = Money::parse("-12.5", eur()).unwrap();
        assert_eq!(negative.minor_units(), -1250);
        assert_eq!(negative.to_string(), "-12.50 EUR");

        let yen = Money::parse("1200", Currency::new("JPY").unwrap()).unwrap();
        assert_eq!(yen.to_string(), "1200 JPY");

        assert_eq!(amount.to_decimal(), BigDecimal::from(500));
    }

    #[test]
    fn test_parse_rejects_sub_minor_precision() {
        let result = Money::parse("10.005", eur());
        assert!(matches!(result, Err(ReconError::InvalidAmount(_))));
    }

    #[test]
    fn test_arithmetic_rejects_mixed_currencies() {
        let a = Money::new(100, eur());
        let b = Money::new(100, Currency::new("USD").unwrap());
        assert!(matches!(a.checked_add(&b), Err(ReconError::CurrencyMismatch(_))));
        assert!(matches!(a.try_cmp(&b), Err(ReconError::CurrencyMismatch(_))));
        assert_eq!(a.checked_add(&a).unwrap().minor_units(), 200);
    }

    #[test]
    fn test_overflow_is_invalid_amount() {
        let max = Money::new(i64::MAX, eur());
        assert!(matches!(
            max.checked_add(&Money::new(1, eur())),
            Err(ReconError::InvalidAmount(_))
        ));
        assert!(Money::new(i64::MIN, eur()).checked_abs().is_err());
    }

    #[test]
    fn test_serde_uses_decimal_strings() {
        let amount = Money::new(-30_000, eur());
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, r#"{"amount":"-300.00","currency":"EUR"}"#);

        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);

        let too_precise = r#"{"amount":"1.234","currency":"EUR"}"#;
        assert!(serde_json::from_str::<Money>(too_precise).is_err());
    }
}
