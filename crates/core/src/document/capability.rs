//! Capability traits shared by documents and catalog entries.
//!
//! Entities implement only what they need: a counterparty is validatable and
//! version-locked but never posted.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use stockreg_shared::types::{DocumentId, MovementId, ProductId, Quantity, WarehouseId};
use uuid::Uuid;

use super::types::{Counterparty, Document, DocumentDraft, DocumentKind, DocumentLine};
use crate::clock::IdGenerator;
use crate::error::RegisterError;
use crate::register::{Movement, RecordType};

/// Maximum length of a counterparty code.
pub const MAX_CODE_LEN: usize = 32;

/// Field-level validation, run before anything is written.
pub trait Validatable {
    /// Returns the first problem found.
    fn validate(&self) -> Result<(), RegisterError>;
}

/// Optimistic concurrency metadata.
pub trait VersionLocked {
    /// Entity name used in conflict errors.
    fn entity_name(&self) -> &'static str;

    /// Row id.
    fn entity_id(&self) -> Uuid;

    /// Stored version.
    fn version(&self) -> i32;

    /// Fails with `ConcurrentModification` unless `expected` is the stored version.
    fn check_version(&self, expected: i32) -> Result<(), RegisterError> {
        if expected == self.version() {
            Ok(())
        } else {
            Err(RegisterError::ConcurrentModification {
                entity: self.entity_name(),
                id: self.entity_id(),
                expected,
                actual: self.version(),
            })
        }
    }
}

/// Inputs a posting needs besides the document itself.
pub struct PostingContext<'a> {
    /// Posting iteration the movements belong to.
    pub recorder_version: i32,
    /// Stamp for `created_at`.
    pub now: DateTime<Utc>,
    /// Source of movement ids.
    pub ids: &'a dyn IdGenerator,
    /// Book quantity per product in the document's warehouse, excluding the
    /// document's own movements. Only inventory counts read it.
    pub book: &'a BTreeMap<ProductId, Quantity>,
}

/// Something that turns into ledger movements.
pub trait Postable {
    /// Recorder id stamped on the movements.
    fn recorder_id(&self) -> DocumentId;

    /// Computes this posting iteration's movements. Deterministic for equal
    /// inputs apart from generated ids.
    fn compute_movements(&self, ctx: &PostingContext<'_>) -> Result<Vec<Movement>, RegisterError>;
}

fn validate_document(
    kind: DocumentKind,
    number: &str,
    warehouse_id: WarehouseId,
    lines: &[DocumentLine],
) -> Result<(), RegisterError> {
    if number.trim().is_empty() {
        return Err(RegisterError::validation("number", "document number is required"));
    }
    if warehouse_id.is_nil() {
        return Err(RegisterError::validation("warehouse_id", "warehouse is required"));
    }
    if lines.is_empty() {
        return Err(RegisterError::validation("lines", "at least one line is required"));
    }

    let mut line_numbers = HashSet::new();
    let mut products = HashSet::new();
    for (index, line) in lines.iter().enumerate() {
        if line.line_number < 1 || !line_numbers.insert(line.line_number) {
            return Err(RegisterError::validation(
                format!("lines[{index}].line_number"),
                "line numbers must be positive and unique",
            ));
        }
        if line.product_id.is_nil() {
            return Err(RegisterError::validation(
                format!("lines[{index}].product_id"),
                "product is required",
            ));
        }
        match kind {
            DocumentKind::GoodsReceipt | DocumentKind::GoodsIssue => {
                if !line.quantity.is_positive() {
                    return Err(RegisterError::validation(
                        format!("lines[{index}].quantity"),
                        format!("quantity must be positive, got {}", line.quantity),
                    ));
                }
            }
            DocumentKind::InventoryCount => {
                if line.quantity.is_negative() {
                    return Err(RegisterError::validation(
                        format!("lines[{index}].quantity"),
                        format!("counted quantity cannot be negative, got {}", line.quantity),
                    ));
                }
                if !products.insert(line.product_id) {
                    return Err(RegisterError::validation(
                        format!("lines[{index}].product_id"),
                        "a product may be counted only once per document",
                    ));
                }
            }
        }
    }
    Ok(())
}

impl Validatable for DocumentDraft {
    fn validate(&self) -> Result<(), RegisterError> {
        validate_document(self.kind, &self.number, self.warehouse_id, &self.lines)
    }
}

impl Validatable for Document {
    fn validate(&self) -> Result<(), RegisterError> {
        validate_document(self.kind, &self.number, self.warehouse_id, &self.lines)
    }
}

impl VersionLocked for Document {
    fn entity_name(&self) -> &'static str {
        "document"
    }

    fn entity_id(&self) -> Uuid {
        self.id.into_inner()
    }

    fn version(&self) -> i32 {
        self.version
    }
}

impl Postable for Document {
    fn recorder_id(&self) -> DocumentId {
        self.id
    }

    fn compute_movements(&self, ctx: &PostingContext<'_>) -> Result<Vec<Movement>, RegisterError> {
        self.validate()?;
        let period = self.period();

        let mut movements = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            let (record_type, quantity) = match self.kind {
                DocumentKind::GoodsReceipt => (RecordType::Receipt, line.quantity),
                DocumentKind::GoodsIssue => (RecordType::Expense, line.quantity),
                DocumentKind::InventoryCount => {
                    let book = ctx.book.get(&line.product_id).copied().unwrap_or_default();
                    let difference = line.quantity.checked_sub(book).ok_or_else(|| {
                        RegisterError::validation(
                            format!("lines[{}].quantity", line.line_number),
                            "quantity overflow",
                        )
                    })?;
                    if difference.is_zero() {
                        continue;
                    }
                    if difference.is_positive() {
                        (RecordType::Receipt, difference)
                    } else {
                        (RecordType::Expense, difference.abs())
                    }
                }
            };

            movements.push(Movement {
                id: MovementId::from_uuid(ctx.ids.next_id()),
                recorder_id: self.id,
                recorder_type: self.kind.as_str().to_string(),
                recorder_version: ctx.recorder_version,
                line_number: line.line_number,
                period,
                record_type,
                warehouse_id: self.warehouse_id,
                product_id: line.product_id,
                quantity,
                created_at: ctx.now,
            });
        }
        Ok(movements)
    }
}

impl Validatable for Counterparty {
    fn validate(&self) -> Result<(), RegisterError> {
        let code = self.code.trim();
        if code.is_empty() {
            return Err(RegisterError::validation("code", "code is required"));
        }
        if code.len() > MAX_CODE_LEN {
            return Err(RegisterError::validation(
                "code",
                format!("code must be at most {MAX_CODE_LEN} characters"),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(RegisterError::validation("name", "name is required"));
        }
        Ok(())
    }
}

impl VersionLocked for Counterparty {
    fn entity_name(&self) -> &'static str {
        "counterparty"
    }

    fn entity_id(&self) -> Uuid {
        self.id.into_inner()
    }

    fn version(&self) -> i32 {
        self.version
    }
}
