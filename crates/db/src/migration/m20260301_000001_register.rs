//! Initial register schema: documents, lines, counterparties, movements and balances.
//!
//! Built with the schema builder so the same migration runs on PostgreSQL and
//! SQLite. Quantities are `BIGINT` scaled by 10,000.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ============================================================
        // PART 1: CATALOGS
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Counterparties::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Counterparties::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Counterparties::Code).string_len(32).not_null())
                    .col(ColumnDef::new(Counterparties::Name).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Counterparties::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Counterparties::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Counterparties::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_counterparties_code")
                    .table(Counterparties::Table)
                    .col(Counterparties::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // PART 2: DOCUMENTS
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Documents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Documents::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Documents::Kind).string_len(32).not_null())
                    .col(ColumnDef::new(Documents::Number).string_len(64).not_null())
                    .col(ColumnDef::new(Documents::Date).date().not_null())
                    .col(ColumnDef::new(Documents::WarehouseId).uuid().not_null())
                    .col(ColumnDef::new(Documents::CounterpartyId).uuid().null())
                    .col(ColumnDef::new(Documents::Comment).text().null())
                    .col(ColumnDef::new(Documents::Version).integer().not_null().default(1))
                    .col(ColumnDef::new(Documents::Posted).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Documents::PostedVersion)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Documents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Documents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_documents_counterparty")
                            .from(Documents::Table, Documents::CounterpartyId)
                            .to(Counterparties::Table, Counterparties::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_documents_kind_number")
                    .table(Documents::Table)
                    .col(Documents::Kind)
                    .col(Documents::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DocumentLines::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(DocumentLines::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(DocumentLines::DocumentId).uuid().not_null())
                    .col(ColumnDef::new(DocumentLines::LineNumber).integer().not_null())
                    .col(ColumnDef::new(DocumentLines::ProductId).uuid().not_null())
                    .col(ColumnDef::new(DocumentLines::Quantity).big_integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_document_lines_document")
                            .from(DocumentLines::Table, DocumentLines::DocumentId)
                            .to(Documents::Table, Documents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_document_lines_document_line")
                    .table(DocumentLines::Table)
                    .col(DocumentLines::DocumentId)
                    .col(DocumentLines::LineNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // PART 3: MOVEMENT LEDGER (append/delete only)
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Movements::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Movements::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Movements::RecorderId).uuid().not_null())
                    .col(ColumnDef::new(Movements::RecorderType).string_len(32).not_null())
                    .col(ColumnDef::new(Movements::RecorderVersion).integer().not_null())
                    .col(ColumnDef::new(Movements::LineNumber).integer().not_null())
                    .col(
                        ColumnDef::new(Movements::Period)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Movements::RecordType).string_len(16).not_null())
                    .col(ColumnDef::new(Movements::WarehouseId).uuid().not_null())
                    .col(ColumnDef::new(Movements::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(Movements::Quantity)
                            .big_integer()
                            .not_null()
                            .check(Expr::col(Movements::Quantity).gt(0)),
                    )
                    .col(
                        ColumnDef::new(Movements::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Cleanup of superseded postings: recorder_id = ? AND recorder_version < ?
        manager
            .create_index(
                Index::create()
                    .name("idx_movements_recorder")
                    .table(Movements::Table)
                    .col(Movements::RecorderId)
                    .col(Movements::RecorderVersion)
                    .to_owned(),
            )
            .await?;

        // Point-in-time sums and turnovers per dimension pair
        manager
            .create_index(
                Index::create()
                    .name("idx_movements_dimension_period")
                    .table(Movements::Table)
                    .col(Movements::WarehouseId)
                    .col(Movements::ProductId)
                    .col(Movements::Period)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movements_period")
                    .table(Movements::Table)
                    .col(Movements::Period)
                    .to_owned(),
            )
            .await?;

        // ============================================================
        // PART 4: BALANCE STORE
        // ============================================================
        manager
            .create_table(
                Table::create()
                    .table(Balances::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Balances::WarehouseId).uuid().not_null())
                    .col(ColumnDef::new(Balances::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(Balances::Quantity)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Balances::LastMovementAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Balances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(Balances::WarehouseId)
                            .col(Balances::ProductId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_balances_product")
                    .table(Balances::Table)
                    .col(Balances::ProductId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            Balances::Table.into_iden(),
            Movements::Table.into_iden(),
            DocumentLines::Table.into_iden(),
            Documents::Table.into_iden(),
            Counterparties::Table.into_iden(),
        ] {
            manager
                .drop_table(Table::drop().table(table).if_exists().to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Counterparties {
    Table,
    Id,
    Code,
    Name,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Documents {
    Table,
    Id,
    Kind,
    Number,
    Date,
    WarehouseId,
    CounterpartyId,
    Comment,
    Version,
    Posted,
    PostedVersion,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DocumentLines {
    Table,
    Id,
    DocumentId,
    LineNumber,
    ProductId,
    Quantity,
}

#[derive(DeriveIden)]
enum Movements {
    Table,
    Id,
    RecorderId,
    RecorderType,
    RecorderVersion,
    LineNumber,
    Period,
    RecordType,
    WarehouseId,
    ProductId,
    Quantity,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Balances {
    Table,
    WarehouseId,
    ProductId,
    Quantity,
    LastMovementAt,
    UpdatedAt,
}
