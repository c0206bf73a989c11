//! Posting policies guarding closed periods.
//!
//! The engine asks the policy before every post, unpost and edit. A policy
//! only looks at the document date; it knows nothing about stock.

use std::sync::Arc;

use chrono::NaiveDate;
use stockreg_shared::config::{PolicyMode, PostingConfig};
use tracing::warn;

use crate::clock::Clock;
use crate::error::RegisterError;

/// Decides whether a document dated `date` may be touched.
pub trait PostingPolicy: Send + Sync {
    /// May a document with this date be posted?
    fn can_post(&self, date: NaiveDate) -> Result<(), RegisterError>;

    /// May a document with this date be edited?
    fn can_modify(&self, date: NaiveDate) -> Result<(), RegisterError>;

    /// May a document with this date be unposted?
    fn can_unpost(&self, date: NaiveDate) -> Result<(), RegisterError>;

    /// Dates strictly before this one are closed, if any cutoff is set.
    fn closed_period(&self) -> Option<NaiveDate>;
}

fn check_cutoff(date: NaiveDate, closed_before: Option<NaiveDate>) -> Result<(), RegisterError> {
    match closed_before {
        Some(cutoff) if date < cutoff => Err(RegisterError::PeriodClosed {
            date,
            closed_before: cutoff,
        }),
        _ => Ok(()),
    }
}

/// Hard cutoff for every operation.
#[derive(Debug, Clone, Copy)]
pub struct StrictPolicy {
    closed_before: NaiveDate,
}

impl StrictPolicy {
    /// Closes every date before `closed_before`.
    #[must_use]
    pub const fn new(closed_before: NaiveDate) -> Self {
        Self { closed_before }
    }
}

impl PostingPolicy for StrictPolicy {
    fn can_post(&self, date: NaiveDate) -> Result<(), RegisterError> {
        check_cutoff(date, Some(self.closed_before))
    }

    fn can_modify(&self, date: NaiveDate) -> Result<(), RegisterError> {
        check_cutoff(date, Some(self.closed_before))
    }

    fn can_unpost(&self, date: NaiveDate) -> Result<(), RegisterError> {
        check_cutoff(date, Some(self.closed_before))
    }

    fn closed_period(&self) -> Option<NaiveDate> {
        Some(self.closed_before)
    }
}

/// Warns about old documents, optionally rejects closed ones.
pub struct FlexiblePolicy {
    warning_days: u32,
    closed_before: Option<NaiveDate>,
    clock: Arc<dyn Clock>,
}

impl FlexiblePolicy {
    /// Warns for documents older than `warning_days` (relative to the
    /// clock's today) and rejects anything before `closed_before`.
    pub fn new(warning_days: u32, closed_before: Option<NaiveDate>, clock: Arc<dyn Clock>) -> Self {
        Self {
            warning_days,
            closed_before,
            clock,
        }
    }

    /// Returns true if `date` is old enough to warn about.
    #[must_use]
    pub fn is_stale(&self, date: NaiveDate) -> bool {
        (self.clock.today() - date).num_days() > i64::from(self.warning_days)
    }

    fn check(&self, operation: &str, date: NaiveDate) -> Result<(), RegisterError> {
        check_cutoff(date, self.closed_before)?;
        if self.is_stale(date) {
            warn!(
                %date,
                operation,
                warning_days = self.warning_days,
                "Operating on a document older than the warning threshold"
            );
        }
        Ok(())
    }
}

impl PostingPolicy for FlexiblePolicy {
    fn can_post(&self, date: NaiveDate) -> Result<(), RegisterError> {
        self.check("post", date)
    }

    fn can_modify(&self, date: NaiveDate) -> Result<(), RegisterError> {
        self.check("modify", date)
    }

    fn can_unpost(&self, date: NaiveDate) -> Result<(), RegisterError> {
        self.check("unpost", date)
    }

    fn closed_period(&self) -> Option<NaiveDate> {
        self.closed_before
    }
}

/// Allows everything. Development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPolicy;

impl PostingPolicy for OpenPolicy {
    fn can_post(&self, _date: NaiveDate) -> Result<(), RegisterError> {
        Ok(())
    }

    fn can_modify(&self, _date: NaiveDate) -> Result<(), RegisterError> {
        Ok(())
    }

    fn can_unpost(&self, _date: NaiveDate) -> Result<(), RegisterError> {
        Ok(())
    }

    fn closed_period(&self) -> Option<NaiveDate> {
        None
    }
}

/// Default soft threshold when `flexible` is configured without one.
pub const DEFAULT_WARNING_DAYS: u32 = 30;

/// Builds the configured policy.
///
/// `strict` without `closed_before` is a configuration error.
pub fn build_policy(
    config: &PostingConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn PostingPolicy>, RegisterError> {
    match config.policy {
        PolicyMode::Strict => {
            let closed_before = config.closed_before.ok_or_else(|| {
                RegisterError::validation(
                    "posting.closed_before",
                    "strict policy requires a closing date",
                )
            })?;
            Ok(Arc::new(StrictPolicy::new(closed_before)))
        }
        PolicyMode::Flexible => Ok(Arc::new(FlexiblePolicy::new(
            config.warning_days.unwrap_or(DEFAULT_WARNING_DAYS),
            config.closed_before,
            clock,
        ))),
        PolicyMode::Open => Ok(Arc::new(OpenPolicy)),
    }
}
