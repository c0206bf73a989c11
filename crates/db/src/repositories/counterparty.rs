//! Counterparty catalog repository.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, SqlErr,
};
use stockreg_core::RegisterError;
use stockreg_core::document::{Counterparty, Validatable};
use stockreg_shared::types::{CounterpartyId, PageRequest, PageResponse};

use crate::entities::{counterparties, documents};
use crate::tx::internal;

const ENTITY: &str = "counterparty";

impl From<counterparties::Model> for Counterparty {
    fn from(model: counterparties::Model) -> Self {
        Self {
            id: CounterpartyId::from_uuid(model.id),
            code: model.code,
            name: model.name,
            version: model.version,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

fn duplicate_code(code: &str) -> impl FnOnce(DbErr) -> RegisterError + '_ {
    move |err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            RegisterError::validation("code", format!("counterparty code {code} already exists"))
        }
        _ => internal(err),
    }
}

/// Counterparty repository.
#[derive(Debug, Clone, Copy)]
pub struct CounterpartyRepository<'c, C> {
    conn: &'c C,
}

impl<'c, C: ConnectionTrait> CounterpartyRepository<'c, C> {
    /// Creates a repository over `conn`.
    #[must_use]
    pub const fn new(conn: &'c C) -> Self {
        Self { conn }
    }

    /// Inserts a new counterparty at version 1.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank or duplicate code, or a blank name.
    pub async fn create(
        &self,
        id: CounterpartyId,
        code: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Counterparty, RegisterError> {
        let counterparty = Counterparty {
            id,
            code: code.trim().to_owned(),
            name: name.trim().to_owned(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        counterparty.validate()?;

        counterparties::Entity::insert(counterparties::ActiveModel {
            id: Set(id.into_inner()),
            code: Set(counterparty.code.clone()),
            name: Set(counterparty.name.clone()),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .exec_without_returning(self.conn)
        .await
        .map_err(duplicate_code(&counterparty.code))?;
        Ok(counterparty)
    }

    /// Loads a counterparty, failing with `NotFound` if it does not exist.
    pub async fn get(&self, id: CounterpartyId) -> Result<Counterparty, RegisterError> {
        counterparties::Entity::find_by_id(id.into_inner())
            .one(self.conn)
            .await
            .map_err(internal)?
            .map(Counterparty::from)
            .ok_or_else(|| not_found(id))
    }

    /// Counterparties ordered by code.
    pub async fn list(&self, page: PageRequest) -> Result<PageResponse<Counterparty>, RegisterError> {
        let query = counterparties::Entity::find();
        let total = query.clone().count(self.conn).await.map_err(internal)?;
        let rows = query
            .order_by_asc(counterparties::Column::Code)
            .offset(page.offset())
            .limit(page.limit())
            .all(self.conn)
            .await
            .map_err(internal)?;
        Ok(PageResponse::new(
            rows.into_iter().map(Counterparty::from).collect(),
            page,
            total,
        ))
    }

    /// Renames a counterparty if its version is still `expected_version`.
    pub async fn update(
        &self,
        id: CounterpartyId,
        expected_version: i32,
        code: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Counterparty, RegisterError> {
        let mut counterparty = self.get(id).await?;
        counterparty.code = code.trim().to_owned();
        counterparty.name = name.trim().to_owned();
        counterparty.validate()?;

        let result = counterparties::Entity::update_many()
            .col_expr(counterparties::Column::Code, Expr::value(counterparty.code.clone()))
            .col_expr(counterparties::Column::Name, Expr::value(counterparty.name.clone()))
            .col_expr(
                counterparties::Column::Version,
                Expr::col(counterparties::Column::Version).add(1),
            )
            .col_expr(counterparties::Column::UpdatedAt, Expr::value(now))
            .filter(counterparties::Column::Id.eq(id.into_inner()))
            .filter(counterparties::Column::Version.eq(expected_version))
            .exec(self.conn)
            .await
            .map_err(duplicate_code(&counterparty.code))?;
        if result.rows_affected == 0 {
            return Err(RegisterError::ConcurrentModification {
                entity: ENTITY,
                id: id.into_inner(),
                expected: expected_version,
                actual: counterparty.version,
            });
        }
        self.get(id).await
    }

    /// Deletes a counterparty no document refers to.
    pub async fn delete(&self, id: CounterpartyId) -> Result<(), RegisterError> {
        let referenced = documents::Entity::find()
            .filter(documents::Column::CounterpartyId.eq(id.into_inner()))
            .count(self.conn)
            .await
            .map_err(internal)?;
        if referenced > 0 {
            return Err(RegisterError::validation(
                "counterparty_id",
                format!("counterparty is used by {referenced} document(s)"),
            ));
        }
        let result = counterparties::Entity::delete_by_id(id.into_inner())
            .exec(self.conn)
            .await
            .map_err(internal)?;
        if result.rows_affected == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}

fn not_found(id: CounterpartyId) -> RegisterError {
    RegisterError::NotFound {
        entity: ENTITY,
        id: id.into_inner(),
    }
}
