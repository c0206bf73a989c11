//! Document and catalog types.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use stockreg_shared::types::{CounterpartyId, DocumentId, ProductId, Quantity, WarehouseId};

/// What a document does to stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Every line is a receipt into the warehouse.
    GoodsReceipt,
    /// Every line is an expense out of the warehouse.
    GoodsIssue,
    /// Every line holds a counted quantity; posting books the difference.
    InventoryCount,
}

impl DocumentKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GoodsReceipt => "goods_receipt",
            Self::GoodsIssue => "goods_issue",
            Self::InventoryCount => "inventory_count",
        }
    }

    /// Parses a kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "goods_receipt" => Some(Self::GoodsReceipt),
            "goods_issue" => Some(Self::GoodsIssue),
            "inventory_count" => Some(Self::InventoryCount),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a document.
///
/// Valid transitions:
/// - Draft → Posted (post)
/// - Posted → Posted (re-post in place)
/// - Posted → Unposted (unpost)
/// - Unposted → Posted (post)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Never posted.
    Draft,
    /// Movements of the current posting iteration are in the ledger.
    Posted,
    /// Was posted once, currently has no movements. Editable like a draft.
    Unposted,
}

impl DocumentStatus {
    /// Derives the status from the stored flags.
    #[must_use]
    pub const fn from_flags(posted: bool, posted_version: i32) -> Self {
        match (posted, posted_version) {
            (true, _) => Self::Posted,
            (false, 0) => Self::Draft,
            (false, _) => Self::Unposted,
        }
    }

    /// Returns true if lines and header may be edited.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Unposted)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Draft => "draft",
            Self::Posted => "posted",
            Self::Unposted => "unposted",
        })
    }
}

/// One document line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    /// Position, starting at 1.
    pub line_number: i32,
    /// Product.
    pub product_id: ProductId,
    /// Quantity moved, or counted for an inventory count.
    pub quantity: Quantity,
}

/// Header and lines supplied when creating or editing a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    /// Kind.
    pub kind: DocumentKind,
    /// Human-facing number (e.g. `GR-0001`).
    pub number: String,
    /// Business date.
    pub date: NaiveDate,
    /// Warehouse every line refers to.
    pub warehouse_id: WarehouseId,
    /// Supplier or customer.
    pub counterparty_id: Option<CounterpartyId>,
    /// Free text.
    pub comment: Option<String>,
    /// Lines.
    pub lines: Vec<DocumentLine>,
}

/// A stored business document (the recorder of its movements).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Id.
    pub id: DocumentId,
    /// Kind.
    pub kind: DocumentKind,
    /// Human-facing number.
    pub number: String,
    /// Business date.
    pub date: NaiveDate,
    /// Warehouse.
    pub warehouse_id: WarehouseId,
    /// Supplier or customer.
    pub counterparty_id: Option<CounterpartyId>,
    /// Free text.
    pub comment: Option<String>,
    /// Lines, ordered by line number.
    pub lines: Vec<DocumentLine>,
    /// Optimistic lock counter, bumped on every mutation.
    pub version: i32,
    /// Whether the current lines are in the ledger.
    pub posted: bool,
    /// Posting iteration of the movements in the ledger (0 = never posted).
    pub posted_version: i32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Lifecycle state.
    #[must_use]
    pub const fn status(&self) -> DocumentStatus {
        DocumentStatus::from_flags(self.posted, self.posted_version)
    }

    /// Instant stamped on this document's movements: midnight UTC of its date.
    #[must_use]
    pub fn period(&self) -> DateTime<Utc> {
        self.date.and_time(NaiveTime::MIN).and_utc()
    }
}

/// A counterparty catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    /// Id.
    pub id: CounterpartyId,
    /// Unique short code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Optimistic lock counter.
    pub version: i32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}
