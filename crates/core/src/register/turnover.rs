//! Turnover math.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockreg_shared::types::{ProductId, Quantity, WarehouseId};

use super::movement::{Movement, RecordType};
use crate::error::RegisterError;

/// Selects the movements a turnover covers.
///
/// The window is `[from, to)`. Unset dimensions mean "all".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnoverFilter {
    /// Restrict to one warehouse.
    pub warehouse_id: Option<WarehouseId>,
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
    /// Window start, inclusive.
    pub from: DateTime<Utc>,
    /// Window end, exclusive.
    pub to: DateTime<Utc>,
}

impl TurnoverFilter {
    /// Rejects windows that end before they start.
    pub fn validate(&self) -> Result<(), RegisterError> {
        if self.to < self.from {
            return Err(RegisterError::validation(
                "to",
                format!("window end {} is before start {}", self.to, self.from),
            ));
        }
        Ok(())
    }

    /// Returns true if the movement's dimension pair is selected.
    #[must_use]
    pub fn selects(&self, movement: &Movement) -> bool {
        self.warehouse_id.is_none_or(|w| w == movement.warehouse_id)
            && self.product_id.is_none_or(|p| p == movement.product_id)
    }
}

/// Opening, in, out and closing quantities over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turnover {
    /// Net of everything before the window.
    pub opening: Quantity,
    /// Receipts inside the window.
    pub receipt: Quantity,
    /// Expenses inside the window.
    pub expense: Quantity,
    /// `opening + receipt − expense`.
    pub closing: Quantity,
}

impl Turnover {
    /// Builds a turnover, deriving `closing`.
    pub fn new(opening: Quantity, receipt: Quantity, expense: Quantity) -> Result<Self, RegisterError> {
        let closing = opening
            .checked_add(receipt)
            .and_then(|q| q.checked_sub(expense))
            .ok_or_else(|| RegisterError::validation("closing", "quantity overflow"))?;
        Ok(Self {
            opening,
            receipt,
            expense,
            closing,
        })
    }

    /// Computes a turnover in memory. Movements at or after `to` are ignored.
    pub fn from_movements<'a>(
        filter: &TurnoverFilter,
        movements: impl IntoIterator<Item = &'a Movement>,
    ) -> Result<Self, RegisterError> {
        filter.validate()?;
        let overflow = || RegisterError::validation("quantity", "quantity overflow");

        let (mut opening, mut receipt, mut expense) = (Quantity::ZERO, Quantity::ZERO, Quantity::ZERO);
        for movement in movements.into_iter().filter(|m| filter.selects(m)) {
            if movement.period < filter.from {
                opening = opening
                    .checked_add(movement.signed_quantity())
                    .ok_or_else(overflow)?;
            } else if movement.period < filter.to {
                match movement.record_type {
                    RecordType::Receipt => {
                        receipt = receipt.checked_add(movement.quantity).ok_or_else(overflow)?;
                    }
                    RecordType::Expense => {
                        expense = expense.checked_add(movement.quantity).ok_or_else(overflow)?;
                    }
                }
            }
        }
        Self::new(opening, receipt, expense)
    }

    /// Returns true if `opening + receipt − expense == closing`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.opening
            .checked_add(self.receipt)
            .and_then(|q| q.checked_sub(self.expense))
            == Some(self.closing)
    }
}
