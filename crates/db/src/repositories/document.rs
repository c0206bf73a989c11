//! Document repository.
//!
//! Documents are versioned: every write bumps `version` and is conditioned
//! on the version the caller read, so a stale writer gets
//! `ConcurrentModification` instead of silently overwriting.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DbBackend, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, SqlErr,
};
use stockreg_core::{IdGenerator, RegisterError};
use stockreg_core::document::{Document, DocumentDraft, DocumentKind, DocumentLine};
use stockreg_shared::types::{
    CounterpartyId, DocumentId, PageRequest, PageResponse, ProductId, Quantity, WarehouseId,
};

use crate::entities::{document_lines, documents, sea_orm_active_enums};
use crate::tx::internal;

const ENTITY: &str = "document";

fn to_document(model: documents::Model, lines: Vec<document_lines::Model>) -> Document {
    Document {
        id: DocumentId::from_uuid(model.id),
        kind: model.kind.into(),
        number: model.number,
        date: model.date,
        warehouse_id: WarehouseId::from_uuid(model.warehouse_id),
        counterparty_id: model.counterparty_id.map(CounterpartyId::from_uuid),
        comment: model.comment,
        lines: lines
            .into_iter()
            .map(|line| DocumentLine {
                line_number: line.line_number,
                product_id: ProductId::from_uuid(line.product_id),
                quantity: Quantity::from_scaled(line.quantity),
            })
            .collect(),
        version: model.version,
        posted: model.posted,
        posted_version: model.posted_version,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// Maps a unique-key violation on the document number to a validation error.
fn on_write_error(draft: &DocumentDraft) -> impl FnOnce(DbErr) -> RegisterError + '_ {
    move |err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => RegisterError::validation(
            "number",
            format!("{} {} already exists", draft.kind, draft.number),
        ),
        _ => internal(err),
    }
}

/// Document repository.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> DocumentRepository<'c, C> {
    /// Creates a repository over `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Inserts a new draft at version 1. The draft is expected to be
    /// validated already. Run inside a transaction: the header and the lines
    /// are separate statements. Line ids come from `ids`.
    pub async fn create(
        &self,
        id: DocumentId,
        draft: &DocumentDraft,
        now: DateTime<Utc>,
        ids: &dyn IdGenerator,
    ) -> Result<Document, RegisterError> {
        let model = documents::ActiveModel {
            id: Set(id.into_inner()),
            kind: Set(draft.kind.into()),
            number: Set(draft.number.clone()),
            date: Set(draft.date),
            warehouse_id: Set(draft.warehouse_id.into_inner()),
            counterparty_id: Set(draft.counterparty_id.map(CounterpartyId::into_inner)),
            comment: Set(draft.comment.clone()),
            version: Set(1),
            posted: Set(false),
            posted_version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        documents::Entity::insert(model)
            .exec_without_returning(self.conn)
            .await
            .map_err(on_write_error(draft))?;
        self.insert_lines(id, &draft.lines, ids).await?;
        self.get(id).await
    }

    /// Loads a document with its lines.
    pub async fn find(&self, id: DocumentId) -> Result<Option<Document>, RegisterError> {
        self.load(id, false).await
    }

    /// Loads a document, failing with `NotFound` if it does not exist.
    pub async fn get(&self, id: DocumentId) -> Result<Document, RegisterError> {
        self.load(id, false).await?.ok_or_else(|| not_found(id))
    }

    /// Loads a document and locks its header row until the enclosing
    /// transaction ends (PostgreSQL only).
    pub async fn get_for_update(&self, id: DocumentId) -> Result<Document, RegisterError> {
        self.load(id, true).await?.ok_or_else(|| not_found(id))
    }

    async fn load(&self, id: DocumentId, lock: bool) -> Result<Option<Document>, RegisterError> {
        let mut query = documents::Entity::find_by_id(id.into_inner());
        if lock && self.conn.get_database_backend() == DbBackend::Postgres {
            query = query.lock_exclusive();
        }
        let Some(model) = query.one(self.conn).await.map_err(internal)? else {
            return Ok(None);
        };
        let lines = document_lines::Entity::find()
            .filter(document_lines::Column::DocumentId.eq(model.id))
            .order_by_asc(document_lines::Column::LineNumber)
            .all(self.conn)
            .await
            .map_err(internal)?;
        Ok(Some(to_document(model, lines)))
    }

    /// Lists document headers, newest date first. Lines are loaded too.
    pub async fn list(
        &self,
        kind: Option<DocumentKind>,
        page: PageRequest,
    ) -> Result<PageResponse<Document>, RegisterError> {
        let mut query = documents::Entity::find();
        if let Some(kind) = kind {
            query = query
                .filter(documents::Column::Kind.eq(sea_orm_active_enums::DocumentKind::from(kind)));
        }
        let total = query.clone().count(self.conn).await.map_err(internal)?;
        let headers = query
            .order_by_desc(documents::Column::Date)
            .order_by_asc(documents::Column::Number)
            .offset(page.offset())
            .limit(page.limit())
            .all(self.conn)
            .await
            .map_err(internal)?;

        let mut data = Vec::with_capacity(headers.len());
        for header in headers {
            let lines = document_lines::Entity::find()
                .filter(document_lines::Column::DocumentId.eq(header.id))
                .order_by_asc(document_lines::Column::LineNumber)
                .all(self.conn)
                .await
                .map_err(internal)?;
            data.push(to_document(header, lines));
        }
        Ok(PageResponse::new(data, page, total))
    }

    /// Overwrites a draft's header and lines if its version is still
    /// `expected_version`.
    pub async fn update(
        &self,
        id: DocumentId,
        expected_version: i32,
        draft: &DocumentDraft,
        now: DateTime<Utc>,
        ids: &dyn IdGenerator,
    ) -> Result<Document, RegisterError> {
        let result = documents::Entity::update_many()
            .col_expr(documents::Column::Kind, Expr::value(sea_orm_active_enums::DocumentKind::from(draft.kind)))
            .col_expr(documents::Column::Number, Expr::value(draft.number.clone()))
            .col_expr(documents::Column::Date, Expr::value(draft.date))
            .col_expr(documents::Column::WarehouseId, Expr::value(draft.warehouse_id.into_inner()))
            .col_expr(
                documents::Column::CounterpartyId,
                Expr::value(draft.counterparty_id.map(CounterpartyId::into_inner)),
            )
            .col_expr(documents::Column::Comment, Expr::value(draft.comment.clone()))
            .col_expr(documents::Column::Version, Expr::col(documents::Column::Version).add(1))
            .col_expr(documents::Column::UpdatedAt, Expr::value(now))
            .filter(documents::Column::Id.eq(id.into_inner()))
            .filter(documents::Column::Version.eq(expected_version))
            .exec(self.conn)
            .await
            .map_err(on_write_error(draft))?;
        if result.rows_affected == 0 {
            return Err(self.stale(id, expected_version).await);
        }

        document_lines::Entity::delete_many()
            .filter(document_lines::Column::DocumentId.eq(id.into_inner()))
            .exec(self.conn)
            .await
            .map_err(internal)?;
        self.insert_lines(id, &draft.lines, ids).await?;
        self.get(id).await
    }

    /// Marks a document posted at `posted_version`.
    pub async fn mark_posted(
        &self,
        id: DocumentId,
        expected_version: i32,
        posted_version: i32,
        now: DateTime<Utc>,
    ) -> Result<(), RegisterError> {
        let result = documents::Entity::update_many()
            .col_expr(documents::Column::Posted, Expr::value(true))
            .col_expr(documents::Column::PostedVersion, Expr::value(posted_version))
            .col_expr(documents::Column::Version, Expr::col(documents::Column::Version).add(1))
            .col_expr(documents::Column::UpdatedAt, Expr::value(now))
            .filter(documents::Column::Id.eq(id.into_inner()))
            .filter(documents::Column::Version.eq(expected_version))
            .exec(self.conn)
            .await
            .map_err(internal)?;
        if result.rows_affected == 0 {
            return Err(self.stale(id, expected_version).await);
        }
        Ok(())
    }

    /// Marks a document unposted. `posted_version` is kept so the next
    /// posting continues the sequence.
    pub async fn mark_unposted(
        &self,
        id: DocumentId,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<(), RegisterError> {
        let result = documents::Entity::update_many()
            .col_expr(documents::Column::Posted, Expr::value(false))
            .col_expr(documents::Column::Version, Expr::col(documents::Column::Version).add(1))
            .col_expr(documents::Column::UpdatedAt, Expr::value(now))
            .filter(documents::Column::Id.eq(id.into_inner()))
            .filter(documents::Column::Version.eq(expected_version))
            .exec(self.conn)
            .await
            .map_err(internal)?;
        if result.rows_affected == 0 {
            return Err(self.stale(id, expected_version).await);
        }
        Ok(())
    }

    /// Deletes a document and its lines if its version is still
    /// `expected_version`.
    pub async fn delete(&self, id: DocumentId, expected_version: i32) -> Result<(), RegisterError> {
        document_lines::Entity::delete_many()
            .filter(document_lines::Column::DocumentId.eq(id.into_inner()))
            .exec(self.conn)
            .await
            .map_err(internal)?;
        let result = documents::Entity::delete_many()
            .filter(documents::Column::Id.eq(id.into_inner()))
            .filter(documents::Column::Version.eq(expected_version))
            .exec(self.conn)
            .await
            .map_err(internal)?;
        if result.rows_affected == 0 {
            return Err(self.stale(id, expected_version).await);
        }
        Ok(())
    }

    async fn insert_lines(
        &self,
        id: DocumentId,
        lines: &[DocumentLine],
        ids: &dyn IdGenerator,
    ) -> Result<(), RegisterError> {
        if lines.is_empty() {
            return Ok(());
        }
        let models = lines.iter().map(|line| document_lines::ActiveModel {
            id: Set(ids.next_id()),
            document_id: Set(id.into_inner()),
            line_number: Set(line.line_number),
            product_id: Set(line.product_id.into_inner()),
            quantity: Set(line.quantity.scaled()),
        });
        document_lines::Entity::insert_many(models)
            .exec_without_returning(self.conn)
            .await
            .map_err(internal)?;
        Ok(())
    }

    /// Builds the error for a conditional write that matched no row.
    async fn stale(&self, id: DocumentId, expected: i32) -> RegisterError {
        let current = documents::Entity::find_by_id(id.into_inner())
            .one(self.conn)
            .await;
        match current {
            Ok(Some(model)) => RegisterError::ConcurrentModification {
                entity: ENTITY,
                id: id.into_inner(),
                expected,
                actual: model.version,
            },
            Ok(None) => not_found(id),
            Err(err) => internal(err),
        }
    }
}

fn not_found(id: DocumentId) -> RegisterError {
    RegisterError::NotFound {
        entity: ENTITY,
        id: id.into_inner(),
    }
}
