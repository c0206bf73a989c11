//! Movement ledger domain types.
//!
//! A movement is an immutable fact: "this recorder, at this posting
//! iteration, moved this quantity in or out of this warehouse/product pair".
//! Corrections are always delete-and-recreate, never update.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockreg_shared::types::{DocumentId, MovementId, ProductId, Quantity, WarehouseId};

use crate::error::RegisterError;

/// Direction of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Stock comes in.
    Receipt,
    /// Stock goes out.
    Expense,
}

impl RecordType {
    /// Returns the string representation of the record type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::Expense => "expense",
        }
    }

    /// Parses a record type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(Self::Receipt),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    /// Applies the direction to a positive quantity.
    #[must_use]
    pub fn signed(self, quantity: Quantity) -> Quantity {
        match self {
            Self::Receipt => quantity,
            Self::Expense => -quantity,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A warehouse × product pair.
///
/// Ordered warehouse-first, then product. Balance rows are always locked in
/// this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dimension {
    /// Warehouse.
    pub warehouse_id: WarehouseId,
    /// Product.
    pub product_id: ProductId,
}

impl Dimension {
    /// Creates a dimension pair.
    #[must_use]
    pub const fn new(warehouse_id: WarehouseId, product_id: ProductId) -> Self {
        Self {
            warehouse_id,
            product_id,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.warehouse_id, self.product_id)
    }
}

/// One ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Line id.
    pub id: MovementId,
    /// Document that produced this movement.
    pub recorder_id: DocumentId,
    /// Kind of the recorder (e.g. `goods_receipt`).
    pub recorder_type: String,
    /// Posting iteration of the recorder.
    pub recorder_version: i32,
    /// Position within the posting, starting at 1.
    pub line_number: i32,
    /// Effective instant of the movement.
    pub period: DateTime<Utc>,
    /// Receipt or expense.
    pub record_type: RecordType,
    /// Warehouse.
    pub warehouse_id: WarehouseId,
    /// Product.
    pub product_id: ProductId,
    /// Always strictly positive; direction comes from `record_type`.
    pub quantity: Quantity,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// The dimension pair this movement affects.
    #[must_use]
    pub const fn dimension(&self) -> Dimension {
        Dimension::new(self.warehouse_id, self.product_id)
    }

    /// Quantity with direction applied (receipts positive, expenses negative).
    #[must_use]
    pub fn signed_quantity(&self) -> Quantity {
        self.record_type.signed(self.quantity)
    }
}

/// Checks a batch before it is written. The whole batch is rejected on the
/// first bad movement.
pub fn validate_batch(movements: &[Movement]) -> Result<(), RegisterError> {
    for (index, movement) in movements.iter().enumerate() {
        if movement.recorder_id.is_nil() {
            return Err(RegisterError::validation(
                format!("movements[{index}].recorder_id"),
                "recorder id is required",
            ));
        }
        if !movement.quantity.is_positive() {
            return Err(RegisterError::validation(
                format!("movements[{index}].quantity"),
                format!("quantity must be positive, got {}", movement.quantity),
            ));
        }
        if movement.recorder_version < 1 {
            return Err(RegisterError::validation(
                format!("movements[{index}].recorder_version"),
                "recorder version must be at least 1",
            ));
        }
        if movement.warehouse_id.is_nil() || movement.product_id.is_nil() {
            return Err(RegisterError::validation(
                format!("movements[{index}].dimension"),
                "warehouse and product are required",
            ));
        }
    }
    Ok(())
}

/// Net signed quantity per dimension pair.
///
/// Overflow is reported rather than wrapped.
pub fn net_by_dimension<'a>(
    movements: impl IntoIterator<Item = &'a Movement>,
) -> Result<BTreeMap<Dimension, Quantity>, RegisterError> {
    let mut net: BTreeMap<Dimension, Quantity> = BTreeMap::new();
    for movement in movements {
        let entry = net.entry(movement.dimension()).or_default();
        *entry = entry
            .checked_add(movement.signed_quantity())
            .ok_or_else(|| overflow(movement.dimension()))?;
    }
    Ok(net)
}

/// Per-dimension change needed to go from `old` to `new`, zero entries dropped.
pub fn net_delta(
    old: &[Movement],
    new: &[Movement],
) -> Result<BTreeMap<Dimension, Quantity>, RegisterError> {
    let mut delta = net_by_dimension(new)?;
    for (dimension, quantity) in net_by_dimension(old)? {
        let entry = delta.entry(dimension).or_default();
        *entry = entry
            .checked_sub(quantity)
            .ok_or_else(|| overflow(dimension))?;
    }
    delta.retain(|_, quantity| !quantity.is_zero());
    Ok(delta)
}

fn overflow(dimension: Dimension) -> RegisterError {
    RegisterError::validation("quantity", format!("quantity overflow on {dimension}"))
}

/// Filter for movement history queries.
///
/// `period_from` is inclusive, `period_to` exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    /// Restrict to one warehouse.
    pub warehouse_id: Option<WarehouseId>,
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
    /// Restrict to one recorder.
    pub recorder_id: Option<DocumentId>,
    /// Restrict to receipts or expenses.
    pub record_type: Option<RecordType>,
    /// Lower bound on `period`.
    pub period_from: Option<DateTime<Utc>>,
    /// Upper bound on `period`.
    pub period_to: Option<DateTime<Utc>>,
}
