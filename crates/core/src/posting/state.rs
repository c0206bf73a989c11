//! Document state machine.
//!
//! Pure transition checks. The db crate's posting engine runs them inside a
//! transaction and applies the resulting action.

use chrono::NaiveDate;
use uuid::Uuid;

use super::policy::PostingPolicy;
use crate::document::{Document, DocumentStatus, Validatable};
use crate::error::RegisterError;

/// Result of a successful post check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostTransition {
    /// State before posting.
    pub from: DocumentStatus,
    /// Posting iteration the new movements get.
    pub new_posted_version: i32,
    /// Movements with `recorder_version` strictly below this are superseded.
    pub supersede_before: i32,
}

impl PostTransition {
    /// True when the document already had movements in the ledger.
    #[must_use]
    pub const fn is_repost(&self) -> bool {
        matches!(self.from, DocumentStatus::Posted)
    }
}

/// Result of a successful unpost check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpostTransition {
    /// Every movement below this version belongs to the document and is removed.
    pub supersede_before: i32,
}

/// Stateless transition rules for documents.
pub struct DocumentStateMachine;

impl DocumentStateMachine {
    /// Checks that `doc` may be posted (or re-posted) on `today`.
    ///
    /// # Errors
    /// * `Validation` for malformed documents or documents dated after `today`
    /// * `PeriodClosed` from the policy
    pub fn post(
        doc: &Document,
        policy: &dyn PostingPolicy,
        today: NaiveDate,
    ) -> Result<PostTransition, RegisterError> {
        doc.validate()?;
        if doc.date > today {
            return Err(RegisterError::validation(
                "date",
                format!("cannot post a document dated {} before that day", doc.date),
            ));
        }
        policy.can_post(doc.date)?;

        let new_posted_version = doc.posted_version.checked_add(1).ok_or_else(|| {
            RegisterError::Internal(format!("posted version overflow on document {}", doc.id))
        })?;
        Ok(PostTransition {
            from: doc.status(),
            new_posted_version,
            supersede_before: new_posted_version,
        })
    }

    /// Checks that `doc` may be unposted.
    ///
    /// # Errors
    /// * `InvalidState` if the document is not posted
    /// * `PeriodClosed` from the policy
    pub fn unpost(
        doc: &Document,
        policy: &dyn PostingPolicy,
    ) -> Result<UnpostTransition, RegisterError> {
        if doc.status() != DocumentStatus::Posted {
            return Err(invalid_state(doc, "only a posted document can be unposted"));
        }
        policy.can_unpost(doc.date)?;
        Ok(UnpostTransition {
            supersede_before: doc.posted_version + 1,
        })
    }

    /// Checks that `doc` may be edited, moving it to `new_date`.
    ///
    /// Both the old and the new date must be open: an edit may neither pull a
    /// document out of a closed period nor push one into it.
    pub fn modify(
        doc: &Document,
        new_date: NaiveDate,
        policy: &dyn PostingPolicy,
    ) -> Result<(), RegisterError> {
        if !doc.status().is_editable() {
            return Err(invalid_state(doc, "unpost the document before editing it"));
        }
        policy.can_modify(doc.date)?;
        policy.can_modify(new_date)
    }

    /// Checks that `doc` may be deleted. Only never-posted drafts can be.
    pub fn delete(doc: &Document, policy: &dyn PostingPolicy) -> Result<(), RegisterError> {
        if doc.status() != DocumentStatus::Draft {
            return Err(invalid_state(doc, "only a never-posted draft can be deleted"));
        }
        policy.can_modify(doc.date)
    }
}

fn invalid_state(doc: &Document, message: &str) -> RegisterError {
    RegisterError::InvalidState {
        id: Uuid::from(doc.id),
        message: format!("{message} (document {} is {})", doc.number, doc.status()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentKind, DocumentLine};
    use crate::posting::policy::{OpenPolicy, StrictPolicy};
    use chrono::Utc;
    use stockreg_shared::types::{DocumentId, ProductId, Quantity, WarehouseId};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn document(posted: bool, posted_version: i32) -> Document {
        Document {
            id: DocumentId::new(),
            kind: DocumentKind::GoodsReceipt,
            number: "GR-1".into(),
            date: date(10),
            warehouse_id: WarehouseId::new(),
            counterparty_id: None,
            comment: None,
            lines: vec![DocumentLine {
                line_number: 1,
                product_id: ProductId::new(),
                quantity: Quantity::ONE,
            }],
            version: 1,
            posted,
            posted_version,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_post() {
        let transition = DocumentStateMachine::post(&document(false, 0), &OpenPolicy, date(31)).unwrap();
        assert_eq!(transition.new_posted_version, 1);
        assert_eq!(transition.supersede_before, 1);
        assert!(!transition.is_repost());
    }

    #[test]
    fn test_repost_bumps_version() {
        let transition = DocumentStateMachine::post(&document(true, 3), &OpenPolicy, date(31)).unwrap();
        assert_eq!(transition.new_posted_version, 4);
        assert!(transition.is_repost());
    }

    #[test]
    fn test_post_after_unpost_continues_versioning() {
        let transition = DocumentStateMachine::post(&document(false, 2), &OpenPolicy, date(31)).unwrap();
        assert_eq!(transition.from, DocumentStatus::Unposted);
        assert_eq!(transition.new_posted_version, 3);
    }

    #[test]
    fn test_post_rejects_future_date() {
        assert!(matches!(
            DocumentStateMachine::post(&document(false, 0), &OpenPolicy, date(9)),
            Err(RegisterError::Validation { .. })
        ));
    }

    #[test]
    fn test_post_respects_policy() {
        let policy = StrictPolicy::new(date(11));
        assert!(matches!(
            DocumentStateMachine::post(&document(false, 0), &policy, date(31)),
            Err(RegisterError::PeriodClosed { .. })
        ));
    }

    #[test]
    fn test_unpost_requires_posted() {
        assert!(matches!(
            DocumentStateMachine::unpost(&document(false, 1), &OpenPolicy),
            Err(RegisterError::InvalidState { .. })
        ));
        let transition = DocumentStateMachine::unpost(&document(true, 2), &OpenPolicy).unwrap();
        assert_eq!(transition.supersede_before, 3);
    }

    #[test]
    fn test_modify_rejected_while_posted() {
        assert!(matches!(
            DocumentStateMachine::modify(&document(true, 1), date(10), &OpenPolicy),
            Err(RegisterError::InvalidState { .. })
        ));
        assert!(DocumentStateMachine::modify(&document(false, 1), date(12), &OpenPolicy).is_ok());
    }

    #[test]
    fn test_modify_cannot_move_into_closed_period() {
        let policy = StrictPolicy::new(date(5));
        assert!(DocumentStateMachine::modify(&document(false, 0), date(4), &policy).is_err());
    }

    #[test]
    fn test_delete_only_drafts() {
        assert!(DocumentStateMachine::delete(&document(false, 0), &OpenPolicy).is_ok());
        assert!(DocumentStateMachine::delete(&document(false, 1), &OpenPolicy).is_err());
    }
}
