//! Posting engine: document lifecycle on top of the stock register.
//!
//! Every public operation runs through
//! [`TransactionManager::run_in_transaction`]: one transaction, bounded by
//! the manager's time limit. The `*_in` variants join a scope the
//! caller already holds, so a posting can be part of a larger unit of work.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use sea_orm::{DatabaseConnection, DatabaseTransaction};
use stockreg_core::document::{
    Document, DocumentDraft, DocumentKind, PostingContext, Postable, Validatable, VersionLocked,
};
use stockreg_core::posting::{DocumentStateMachine, PostingPolicy};
use stockreg_core::register::{
    BalanceScope, Dimension, Movement, RecalculationReport, net_by_dimension, net_delta,
    requirements_for_deltas,
};
use stockreg_core::{Clock, IdGenerator, RegisterError};
use stockreg_shared::types::{DocumentId, ProductId, Quantity};
use tracing::{debug, info};

use crate::register::StockRegister;
use crate::repositories::{CounterpartyRepository, DocumentRepository, MovementRepository};
use crate::tx::{TransactionManager, TxFuture, TxScope};

/// Drives documents through Draft → Posted → Unposted.
#[derive(Clone)]
pub struct PostingEngine {
    tm: TransactionManager,
    policy: Arc<dyn PostingPolicy>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl PostingEngine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        tm: TransactionManager,
        policy: Arc<dyn PostingPolicy>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            tm,
            policy,
            clock,
            ids,
        }
    }

    /// The transaction manager the engine opens scopes with.
    #[must_use]
    pub const fn transaction_manager(&self) -> &TransactionManager {
        &self.tm
    }

    /// The register for reads outside any transaction.
    #[must_use]
    pub fn register(&self) -> StockRegister<'_, DatabaseConnection> {
        StockRegister::new(self.tm.connection(), self.clock.as_ref())
    }

    /// The register joined to `scope`.
    #[must_use]
    pub fn register_in<'s>(&'s self, scope: &'s TxScope) -> StockRegister<'s, DatabaseTransaction> {
        StockRegister::new(scope.conn(), self.clock.as_ref())
    }

    /// Loads a document.
    pub async fn get_document(&self, id: DocumentId) -> Result<Document, RegisterError> {
        DocumentRepository::new(self.tm.connection()).get(id).await
    }

    /// Saves a new draft.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed draft or duplicate number, `NotFound`
    /// for an unknown counterparty, `PeriodClosed` for a date in a closed
    /// period.
    pub async fn create_document(&self, draft: &DocumentDraft) -> Result<Document, RegisterError> {
        draft.validate()?;
        self.policy.can_modify(draft.date)?;

        let draft = draft.clone();
        self.transact(move |engine, scope| {
            Box::pin(async move { engine.create_document_in(scope, &draft).await })
        })
        .await
    }

    async fn create_document_in(
        &self,
        scope: &TxScope,
        draft: &DocumentDraft,
    ) -> Result<Document, RegisterError> {
        self.check_counterparty(scope, draft).await?;
        let id = DocumentId::from_uuid(self.ids.next_id());
        let document = DocumentRepository::new(scope.conn())
            .create(id, draft, self.clock.now(), self.ids.as_ref())
            .await?;
        info!(document_id = %id, kind = %draft.kind, number = %draft.number, "Document created");
        Ok(document)
    }

    /// Replaces the contents of an unposted document.
    ///
    /// `expected_version` is the version the caller read; a stale one fails
    /// with `ConcurrentModification`. Posted documents must be unposted first.
    pub async fn update_document(
        &self,
        id: DocumentId,
        expected_version: i32,
        draft: &DocumentDraft,
    ) -> Result<Document, RegisterError> {
        draft.validate()?;

        let draft = draft.clone();
        self.transact(move |engine, scope| {
            Box::pin(async move {
                engine
                    .update_document_in(scope, id, expected_version, &draft)
                    .await
            })
        })
        .await
    }

    async fn update_document_in(
        &self,
        scope: &TxScope,
        id: DocumentId,
        expected_version: i32,
        draft: &DocumentDraft,
    ) -> Result<Document, RegisterError> {
        let documents = DocumentRepository::new(scope.conn());
        let current = documents.get_for_update(id).await?;
        current.check_version(expected_version)?;
        DocumentStateMachine::modify(&current, draft.date, self.policy.as_ref())?;
        if current.kind != draft.kind {
            return Err(RegisterError::validation(
                "kind",
                format!("a {} cannot become a {}", current.kind, draft.kind),
            ));
        }
        self.check_counterparty(scope, draft).await?;

        let updated = documents
            .update(id, expected_version, draft, self.clock.now(), self.ids.as_ref())
            .await?;
        info!(document_id = %id, version = updated.version, "Document updated");
        Ok(updated)
    }

    /// Deletes a never-posted draft.
    pub async fn delete_document(
        &self,
        id: DocumentId,
        expected_version: i32,
    ) -> Result<(), RegisterError> {
        self.transact(move |engine, scope| {
            Box::pin(async move { engine.delete_document_in(scope, id, expected_version).await })
        })
        .await
    }

    async fn delete_document_in(
        &self,
        scope: &TxScope,
        id: DocumentId,
        expected_version: i32,
    ) -> Result<(), RegisterError> {
        let documents = DocumentRepository::new(scope.conn());
        let current = documents.get_for_update(id).await?;
        current.check_version(expected_version)?;
        DocumentStateMachine::delete(&current, self.policy.as_ref())?;
        documents.delete(id, expected_version).await?;
        info!(document_id = %id, "Document deleted");
        Ok(())
    }

    /// Posts a document, or re-posts one that is already posted.
    ///
    /// Either everything happens (movements written, balances adjusted,
    /// document flagged) or nothing does.
    ///
    /// # Errors
    ///
    /// * `Validation` - malformed or future-dated document
    /// * `PeriodClosed` - date rejected by the posting policy
    /// * `InsufficientStock` - an expense would exceed what is on hand
    /// * `NotFound` - no such document
    pub async fn post(&self, id: DocumentId) -> Result<Document, RegisterError> {
        self.transact(move |engine, scope| {
            Box::pin(async move { engine.post_in(scope, id).await })
        })
        .await
    }

    /// [`Self::post`] inside the caller's scope.
    pub async fn post_in(&self, scope: &TxScope, id: DocumentId) -> Result<Document, RegisterError> {
        let documents = DocumentRepository::new(scope.conn());
        let register = self.register_in(scope);

        let doc = documents.get_for_update(id).await?;
        let transition = DocumentStateMachine::post(&doc, self.policy.as_ref(), self.clock.today())?;

        let old = MovementRepository::new(scope.conn())
            .get_by_recorder_before(id, transition.supersede_before)
            .await?;
        let book = if doc.kind == DocumentKind::InventoryCount {
            self.book_quantities(&register, &doc, &old).await?
        } else {
            BTreeMap::new()
        };

        let now = self.clock.now();
        let ctx = PostingContext {
            recorder_version: transition.new_posted_version,
            now,
            ids: self.ids.as_ref(),
            book: &book,
        };
        let new = doc.compute_movements(&ctx)?;
        let delta = net_delta(&old, &new)?;
        debug!(
            document_id = %id,
            old = old.len(),
            new = new.len(),
            changed_pairs = delta.len(),
            "Posting computed"
        );

        register
            .check_and_reserve_stock(&requirements_for_deltas(&delta))
            .await?;
        register.record_movements(&new).await?;
        let superseded = register
            .reverse_movements(id, transition.supersede_before)
            .await?;
        documents
            .mark_posted(id, doc.version, transition.new_posted_version, now)
            .await?;

        info!(
            document_id = %id,
            number = %doc.number,
            posted_version = transition.new_posted_version,
            movements = new.len(),
            superseded,
            repost = transition.is_repost(),
            "Document posted"
        );
        documents.get(id).await
    }

    /// Unposts a document, removing every movement it produced.
    pub async fn unpost(&self, id: DocumentId) -> Result<Document, RegisterError> {
        self.transact(move |engine, scope| {
            Box::pin(async move { engine.unpost_in(scope, id).await })
        })
        .await
    }

    /// [`Self::unpost`] inside the caller's scope.
    pub async fn unpost_in(
        &self,
        scope: &TxScope,
        id: DocumentId,
    ) -> Result<Document, RegisterError> {
        let documents = DocumentRepository::new(scope.conn());
        let doc = documents.get_for_update(id).await?;
        let transition = DocumentStateMachine::unpost(&doc, self.policy.as_ref())?;

        let removed = self
            .register_in(scope)
            .reverse_movements(id, transition.supersede_before)
            .await?;
        documents
            .mark_unposted(id, doc.version, self.clock.now())
            .await?;

        info!(
            document_id = %id,
            number = %doc.number,
            posted_version = doc.posted_version,
            removed,
            "Document unposted"
        );
        documents.get(id).await
    }

    /// Rebuilds balances in `scope` from the ledger in its own transaction.
    pub async fn recalculate_balances(
        &self,
        scope: BalanceScope,
    ) -> Result<RecalculationReport, RegisterError> {
        self.transact(move |engine, tx| {
            Box::pin(async move { engine.register_in(tx).recalculate_balances(scope).await })
        })
        .await
    }

    /// Runs `op` on a handle to this engine inside a new transaction bounded
    /// by the manager's time limit.
    async fn transact<T, F>(&self, op: F) -> Result<T, RegisterError>
    where
        F: for<'c> FnOnce(Self, &'c TxScope) -> TxFuture<'c, T, RegisterError> + Send,
        T: Send,
    {
        let engine = self.clone();
        self.tm
            .run_in_transaction(move |scope| op(engine, scope))
            .await
    }

    /// Book quantity per counted product: the locked balance minus what this
    /// document's own earlier posting contributed.
    async fn book_quantities(
        &self,
        register: &StockRegister<'_, DatabaseTransaction>,
        doc: &Document,
        old: &[Movement],
    ) -> Result<BTreeMap<ProductId, Quantity>, RegisterError> {
        let own = net_by_dimension(old)?;
        let products: BTreeSet<ProductId> = doc.lines.iter().map(|l| l.product_id).collect();

        let mut book = BTreeMap::new();
        for product_id in products {
            let balance = register
                .get_balance_for_update(doc.warehouse_id, product_id)
                .await?;
            let own_part = own
                .get(&Dimension::new(doc.warehouse_id, product_id))
                .copied()
                .unwrap_or_default();
            let quantity = balance.quantity.checked_sub(own_part).ok_or_else(|| {
                RegisterError::validation("quantity", format!("book quantity overflow for {product_id}"))
            })?;
            book.insert(product_id, quantity);
        }
        Ok(book)
    }

    async fn check_counterparty(
        &self,
        scope: &TxScope,
        draft: &DocumentDraft,
    ) -> Result<(), RegisterError> {
        if let Some(counterparty_id) = draft.counterparty_id {
            CounterpartyRepository::new(scope.conn())
                .get(counterparty_id)
                .await?;
        }
        Ok(())
    }
}
