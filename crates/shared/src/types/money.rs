//! Money stored as integer minor units.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Amounts are persisted as `MinorUnits` (e.g. cents). Conversion to and
//! from major units happens only at display/input boundaries, and that is
//! the only place rounding is allowed.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by money conversions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Amount does not fit into 64-bit minor units.
    #[error("Amount out of range: {0}")]
    OutOfRange(Decimal),

    /// More decimal places than 64-bit minor units can carry.
    #[error("Unsupported scale: {0} decimal places (at most 18)")]
    UnsupportedScale(u32),

    /// Exchange rate must be positive.
    #[error("Exchange rate must be positive, got {0}")]
    InvalidExchangeRate(Decimal),

    /// Arithmetic between different currencies.
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        /// Left-hand currency.
        left: Currency,
        /// Right-hand currency.
        right: Currency,
    },
}

/// Largest scale accepted by [`MinorUnits`] conversions; `10^18` is the
/// biggest power of ten an `i64` holds.
pub const MAX_DECIMAL_PLACES: u32 = 18;

/// An amount expressed in a currency's smallest unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    /// Zero minor units.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw minor-unit count.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw minor-unit count.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Converts a major-unit amount, rounding to `decimal_places` with
    /// banker's rounding.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::UnsupportedScale`] if `decimal_places` exceeds
    /// [`MAX_DECIMAL_PLACES`] and [`MoneyError::OutOfRange`] if the result
    /// does not fit in `i64`.
    pub fn from_major(amount: Decimal, decimal_places: u32) -> Result<Self, MoneyError> {
        let factor = checked_scale_factor(decimal_places)?;
        let rounded =
            amount.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointNearestEven);
        rounded
            .checked_mul(factor)
            .and_then(|minor| minor.to_i64())
            .map(Self)
            .ok_or(MoneyError::OutOfRange(amount))
    }

    /// Converts back to major units. Exact.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::UnsupportedScale`] if `decimal_places` exceeds
    /// [`MAX_DECIMAL_PLACES`].
    pub fn to_major(self, decimal_places: u32) -> Result<Decimal, MoneyError> {
        if decimal_places > MAX_DECIMAL_PLACES {
            return Err(MoneyError::UnsupportedScale(decimal_places));
        }
        Decimal::try_new(self.0, decimal_places)
            .map_err(|_| MoneyError::UnsupportedScale(decimal_places))
    }

    /// Checked addition.
    #[must_use]
    pub const fn checked_add(self, rhs: Self) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

fn checked_scale_factor(decimal_places: u32) -> Result<Decimal, MoneyError> {
    if decimal_places > MAX_DECIMAL_PLACES {
        return Err(MoneyError::UnsupportedScale(decimal_places));
    }
    10_i64
        .checked_pow(decimal_places)
        .map(Decimal::from)
        .ok_or(MoneyError::UnsupportedScale(decimal_places))
}

/// ISO 4217 currency codes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// US Dollar
    Usd,
    /// Indonesian Rupiah
    Idr,
    /// Euro
    Eur,
    /// Singapore Dollar
    Sgd,
    /// Japanese Yen
    Jpy,
}

impl Currency {
    /// Number of decimal places of the currency's minor unit.
    #[must_use]
    pub const fn decimal_places(self) -> u32 {
        match self {
            Self::Jpy => 0,
            Self::Usd | Self::Idr | Self::Eur | Self::Sgd => 2,
        }
    }
}

/// A positive conversion rate from one currency to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRate(Decimal);

impl ExchangeRate {
    /// Creates an exchange rate.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::InvalidExchangeRate`] unless `rate > 0`.
    pub fn new(rate: Decimal) -> Result<Self, MoneyError> {
        if rate > Decimal::ZERO {
            Ok(Self(rate))
        } else {
            Err(MoneyError::InvalidExchangeRate(rate))
        }
    }

    /// Returns the rate.
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }
}

/// Represents a monetary amount with currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount in the smallest currency unit (e.g., cents).
    pub amount: MinorUnits,
    /// ISO 4217 currency code (e.g., "USD", "IDR").
    pub currency: Currency,
}

impl Money {
    /// Creates a new Money instance.
    #[must_use]
    pub const fn new(amount: MinorUnits, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Creates a zero amount in the specified currency.
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            amount: MinorUnits::ZERO,
            currency,
        }
    }

    /// Builds money from a major-unit amount (input boundary).
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::OutOfRange`] if the amount does not fit.
    pub fn from_major(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        Ok(Self::new(
            MinorUnits::from_major(amount, currency.decimal_places())?,
            currency,
        ))
    }

    /// Major-unit amount (display boundary).
    #[must_use]
    pub fn to_major(&self) -> Decimal {
        // Currency scales are at most 2
        Decimal::new(self.amount.value(), self.currency.decimal_places())
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.amount.value() == 0
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.amount.value() < 0
    }

    /// Adds two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or overflow.
    pub fn checked_add(&self, other: &Self) -> Result<Self, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: other.currency,
            });
        }
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::new(amount, self.currency))
            .ok_or_else(|| MoneyError::OutOfRange(self.to_major() + other.to_major()))
    }

    /// Converts into another currency with an explicit rate.
    ///
    /// The result is rounded to the target currency's decimal places using
    /// banker's rounding. Converting to the same currency is the identity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::OutOfRange`] if the converted amount overflows.
    pub fn convert(&self, to: Currency, rate: ExchangeRate) -> Result<Self, MoneyError> {
        if to == self.currency {
            return Ok(*self);
        }
        let converted = self
            .to_major()
            .checked_mul(rate.value())
            .ok_or(MoneyError::OutOfRange(self.to_major()))?;
        Self::from_major(converted, to)
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usd => write!(f, "USD"),
            Self::Idr => write!(f, "IDR"),
            Self::Eur => write!(f, "EUR"),
            Self::Sgd => write!(f, "SGD"),
            Self::Jpy => write!(f, "JPY"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "IDR" => Ok(Self::Idr),
            "EUR" => Ok(Self::Eur),
            "SGD" => Ok(Self::Sgd),
            "JPY" => Ok(Self::Jpy),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}
