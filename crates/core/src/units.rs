//! Units of measure.
//!
//! A unit is defined by its ratio to the product's base unit (e.g. a box of
//! 12 pieces has ratio 12) and by how many fractional digits it is counted in.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use stockreg_shared::types::Quantity;
use stockreg_shared::types::quantity::FRACTION_DIGITS;

use crate::error::RegisterError;

/// A unit of measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOfMeasure {
    /// Short code (e.g. `pcs`, `box12`, `kg`).
    pub code: String,
    /// How many base units one of this unit holds. Must be positive.
    pub ratio_to_base: Decimal,
    /// Fractional digits quantities in this unit are rounded to.
    pub precision: u32,
}

impl UnitOfMeasure {
    /// Creates a unit.
    pub fn new(
        code: impl Into<String>,
        ratio_to_base: Decimal,
        precision: u32,
    ) -> Result<Self, RegisterError> {
        if ratio_to_base <= Decimal::ZERO {
            return Err(RegisterError::validation(
                "ratio_to_base",
                format!("unit ratio must be positive, got {ratio_to_base}"),
            ));
        }
        Ok(Self {
            code: code.into(),
            ratio_to_base,
            precision,
        })
    }

    /// Converts `quantity` expressed in `self` into `target`.
    ///
    /// The result is rounded to the target's precision, capped at the four
    /// digits a `Quantity` holds, midpoint away from zero.
    pub fn convert_to(
        &self,
        quantity: Quantity,
        target: &Self,
    ) -> Result<Quantity, RegisterError> {
        let overflow = || {
            RegisterError::validation(
                "quantity",
                format!("{quantity} {} does not fit in {}", self.code, target.code),
            )
        };
        let in_base = quantity
            .to_decimal()
            .checked_mul(self.ratio_to_base)
            .ok_or_else(overflow)?;
        let converted = in_base
            .checked_div(target.ratio_to_base)
            .ok_or_else(overflow)?
            .round_dp_with_strategy(
                target.precision.min(FRACTION_DIGITS),
                RoundingStrategy::MidpointAwayFromZero,
            );
        Quantity::from_decimal(converted).map_err(RegisterError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn pcs() -> UnitOfMeasure {
        UnitOfMeasure::new("pcs", dec!(1), 0).unwrap()
    }

    fn box12() -> UnitOfMeasure {
        UnitOfMeasure::new("box12", dec!(12), 2).unwrap()
    }

    fn kg() -> UnitOfMeasure {
        UnitOfMeasure::new("kg", dec!(1), 4).unwrap()
    }

    fn gram() -> UnitOfMeasure {
        UnitOfMeasure::new("g", dec!(0.001), 0).unwrap()
    }

    #[rstest]
    #[case(box12(), pcs(), "2", "24")]
    #[case(pcs(), box12(), "10", "0.83")]
    #[case(pcs(), box12(), "18", "1.5")]
    #[case(gram(), kg(), "1234", "1.234")]
    #[case(kg(), gram(), "0.00051", "1")]
    fn test_convert_rounds_to_target_precision(
        #[case] from: UnitOfMeasure,
        #[case] to: UnitOfMeasure,
        #[case] input: &str,
        #[case] expected: &str,
    ) {
        let converted = from.convert_to(input.parse().unwrap(), &to).unwrap();
        assert_eq!(converted, expected.parse::<Quantity>().unwrap());
    }

    #[test]
    fn test_precision_capped_at_quantity_scale() {
        let fine = UnitOfMeasure::new("fine", dec!(3), 8).unwrap();
        let converted = fine.convert_to(Quantity::ONE, &UnitOfMeasure::new("x", dec!(7), 8).unwrap()).unwrap();
        // 3/7 = 0.428571... -> 0.4286
        assert_eq!(converted.scaled(), 4_286);
    }

    #[test]
    fn test_ratio_must_be_positive() {
        assert!(UnitOfMeasure::new("bad", Decimal::ZERO, 0).is_err());
    }
}
