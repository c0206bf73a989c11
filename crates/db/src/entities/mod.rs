//! `SeaORM` entities.

pub mod balances;
pub mod counterparties;
pub mod document_lines;
pub mod documents;
pub mod movements;
pub mod sea_orm_active_enums;
