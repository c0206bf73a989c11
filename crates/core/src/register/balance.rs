//! Balance store domain types.
//!
//! A balance row caches `Σ receipts − Σ expenses` for one dimension pair. It
//! is never the source of truth: the ledger is, and the balance can always
//! be recomputed from it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stockreg_shared::types::{ProductId, Quantity, WarehouseId};

use super::movement::Dimension;
use crate::error::RegisterError;

/// Materialized balance of one dimension pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Warehouse.
    pub warehouse_id: WarehouseId,
    /// Product.
    pub product_id: ProductId,
    /// Quantity on hand.
    pub quantity: Quantity,
    /// Period of the latest movement applied, if any.
    pub last_movement_at: Option<DateTime<Utc>>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// A balance for a pair with no row. Absence means zero.
    #[must_use]
    pub const fn zero(dimension: Dimension, now: DateTime<Utc>) -> Self {
        Self {
            warehouse_id: dimension.warehouse_id,
            product_id: dimension.product_id,
            quantity: Quantity::ZERO,
            last_movement_at: None,
            updated_at: now,
        }
    }

    /// The dimension pair of this balance.
    #[must_use]
    pub const fn dimension(&self) -> Dimension {
        Dimension::new(self.warehouse_id, self.product_id)
    }
}

/// Filter for balance list queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceFilter {
    /// Restrict to one warehouse.
    pub warehouse_id: Option<WarehouseId>,
    /// Restrict to one product.
    pub product_id: Option<ProductId>,
    /// Skip rows whose quantity is zero.
    #[serde(default)]
    pub exclude_zero: bool,
    /// Inclusive lower bound on quantity.
    pub min_quantity: Option<Quantity>,
    /// Inclusive upper bound on quantity.
    pub max_quantity: Option<Quantity>,
}

impl BalanceFilter {
    /// All balances of a warehouse.
    #[must_use]
    pub fn by_warehouse(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id: Some(warehouse_id),
            ..Self::default()
        }
    }

    /// All balances of a product.
    #[must_use]
    pub fn by_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    /// Sets `exclude_zero`.
    #[must_use]
    pub const fn non_zero(mut self) -> Self {
        self.exclude_zero = true;
        self
    }

    /// Returns true if `balance` passes every set criterion.
    #[must_use]
    pub fn matches(&self, balance: &Balance) -> bool {
        self.warehouse_id.is_none_or(|w| w == balance.warehouse_id)
            && self.product_id.is_none_or(|p| p == balance.product_id)
            && !(self.exclude_zero && balance.quantity.is_zero())
            && self.min_quantity.is_none_or(|min| balance.quantity >= min)
            && self.max_quantity.is_none_or(|max| balance.quantity <= max)
    }
}

/// Which balance rows a recalculation or verification touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceScope {
    /// Every row.
    All,
    /// Rows of one warehouse.
    Warehouse(WarehouseId),
    /// Rows of one product.
    Product(ProductId),
    /// A single pair.
    Dimension(Dimension),
}

impl BalanceScope {
    /// Returns true if the pair falls inside this scope.
    #[must_use]
    pub fn contains(&self, dimension: Dimension) -> bool {
        match self {
            Self::All => true,
            Self::Warehouse(w) => dimension.warehouse_id == *w,
            Self::Product(p) => dimension.product_id == *p,
            Self::Dimension(d) => *d == dimension,
        }
    }
}

/// Disagreement between the materialized table and the ledger for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDrift {
    /// The pair.
    pub dimension: Dimension,
    /// Value stored in the balance table (zero when the row is missing).
    pub materialized: Quantity,
    /// Value recomputed from movements.
    pub recomputed: Quantity,
}

impl BalanceDrift {
    /// `recomputed − materialized`.
    #[must_use]
    pub fn difference(&self) -> Quantity {
        self.recomputed - self.materialized
    }
}

/// Outcome of a recalculation or verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculationReport {
    /// Number of pairs compared.
    pub checked: usize,
    /// Pairs whose stored value disagreed with the ledger.
    pub drifts: Vec<BalanceDrift>,
}

impl RecalculationReport {
    /// Returns true when the table matched the ledger everywhere.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.drifts.is_empty()
    }
}

/// Compares materialized against recomputed values.
///
/// Pairs missing on one side count as zero there. Both maps may contain
/// pairs outside `scope`; those are ignored.
#[must_use]
pub fn compare_balances(
    scope: BalanceScope,
    materialized: &BTreeMap<Dimension, Quantity>,
    recomputed: &BTreeMap<Dimension, Quantity>,
) -> RecalculationReport {
    let mut report = RecalculationReport::default();
    let dimensions = materialized
        .keys()
        .chain(recomputed.keys())
        .copied()
        .filter(|d| scope.contains(*d))
        .collect::<std::collections::BTreeSet<_>>();

    for dimension in dimensions {
        report.checked += 1;
        let stored = materialized.get(&dimension).copied().unwrap_or_default();
        let actual = recomputed.get(&dimension).copied().unwrap_or_default();
        if stored != actual {
            report.drifts.push(BalanceDrift {
                dimension,
                materialized: stored,
                recomputed: actual,
            });
        }
    }
    report
}

/// One line of a stock reservation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequirement {
    /// Warehouse.
    pub warehouse_id: WarehouseId,
    /// Product.
    pub product_id: ProductId,
    /// Quantity that must be on hand.
    pub required: Quantity,
}

impl StockRequirement {
    /// The dimension pair of this requirement.
    #[must_use]
    pub const fn dimension(&self) -> Dimension {
        Dimension::new(self.warehouse_id, self.product_id)
    }

    /// Fails with `InsufficientStock` when `available < required`.
    pub fn check(&self, available: Quantity) -> Result<(), RegisterError> {
        if available < self.required {
            return Err(RegisterError::InsufficientStock {
                warehouse_id: self.warehouse_id,
                product_id: self.product_id,
                requested: self.required,
                available,
            });
        }
        Ok(())
    }
}

/// Merges requirements per pair and sorts them into lock order.
///
/// Non-positive requirements are rejected: a reservation of nothing is a
/// caller bug.
pub fn reservation_plan(
    items: &[StockRequirement],
) -> Result<Vec<StockRequirement>, RegisterError> {
    let mut merged: BTreeMap<Dimension, Quantity> = BTreeMap::new();
    for (index, item) in items.iter().enumerate() {
        if !item.required.is_positive() {
            return Err(RegisterError::validation(
                format!("items[{index}].required"),
                "required quantity must be positive",
            ));
        }
        let entry = merged.entry(item.dimension()).or_default();
        *entry = entry.checked_add(item.required).ok_or_else(|| {
            RegisterError::validation(format!("items[{index}].required"), "quantity overflow")
        })?;
    }
    Ok(merged
        .into_iter()
        .map(|(dimension, required)| StockRequirement {
            warehouse_id: dimension.warehouse_id,
            product_id: dimension.product_id,
            required,
        })
        .collect())
}

/// Stock requirements implied by per-pair deltas: every decrease needs its
/// magnitude on hand. Output is already in lock order.
#[must_use]
pub fn requirements_for_deltas(deltas: &BTreeMap<Dimension, Quantity>) -> Vec<StockRequirement> {
    deltas
        .iter()
        .filter(|(_, delta)| delta.is_negative())
        .map(|(dimension, delta)| StockRequirement {
            warehouse_id: dimension.warehouse_id,
            product_id: dimension.product_id,
            required: delta.abs(),
        })
        .collect()
}
