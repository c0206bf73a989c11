//! String-backed enums shared by several entities.
//!
//! Stored as short strings rather than native enum types so the schema is
//! the same on PostgreSQL and SQLite.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use stockreg_core::document::DocumentKind as CoreDocumentKind;
use stockreg_core::register::RecordType as CoreRecordType;

/// Direction of a movement row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum RecordType {
    /// Stock in.
    #[sea_orm(string_value = "receipt")]
    Receipt,
    /// Stock out.
    #[sea_orm(string_value = "expense")]
    Expense,
}

impl From<CoreRecordType> for RecordType {
    fn from(value: CoreRecordType) -> Self {
        match value {
            CoreRecordType::Receipt => Self::Receipt,
            CoreRecordType::Expense => Self::Expense,
        }
    }
}

impl From<RecordType> for CoreRecordType {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::Receipt => Self::Receipt,
            RecordType::Expense => Self::Expense,
        }
    }
}

/// Kind of a document row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum DocumentKind {
    /// Goods receipt.
    #[sea_orm(string_value = "goods_receipt")]
    GoodsReceipt,
    /// Goods issue.
    #[sea_orm(string_value = "goods_issue")]
    GoodsIssue,
    /// Inventory count.
    #[sea_orm(string_value = "inventory_count")]
    InventoryCount,
}

impl From<CoreDocumentKind> for DocumentKind {
    fn from(value: CoreDocumentKind) -> Self {
        match value {
            CoreDocumentKind::GoodsReceipt => Self::GoodsReceipt,
            CoreDocumentKind::GoodsIssue => Self::GoodsIssue,
            CoreDocumentKind::InventoryCount => Self::InventoryCount,
        }
    }
}

impl From<DocumentKind> for CoreDocumentKind {
    fn from(value: DocumentKind) -> Self {
        match value {
            DocumentKind::GoodsReceipt => Self::GoodsReceipt,
            DocumentKind::GoodsIssue => Self::GoodsIssue,
            DocumentKind::InventoryCount => Self::InventoryCount,
        }
    }
}
