//! Aggregate status derivation.
//!
//! An order's status is a pure function of the multiset of its tests' statuses. The
//! functions here never look at anything else, so the same answer comes out whether
//! they run inside a database transaction or in a unit test.

use crate::types::{OrderStatus, TestStatus};
use serde::{Deserialize, Serialize};

/// Counts over an order's tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTally {
    /// Number of tests on the order
    pub total: usize,
    /// Tests still PENDING or `IN_PROGRESS`
    pub pending: usize,
    /// Tests in CRITICAL status
    pub critical: usize,
    /// Tests in COMPLETED or CRITICAL status
    pub terminal: usize,
}

impl OrderTally {
    /// Status an order takes after a result has been recorded against it.
    ///
    /// CRITICAL tests do not hold an order back from `RESULT_READY`.
    #[must_use]
    pub const fn status_after_submission(&self) -> OrderStatus {
        if self.all_resolved() {
            OrderStatus::ResultReady
        } else {
            OrderStatus::InProgress
        }
    }

    /// Whether every test has a result.
    #[must_use]
    pub const fn all_resolved(&self) -> bool {
        self.pending == 0
    }
}

/// Count test statuses.
pub fn tally<I>(statuses: I) -> OrderTally
where
    I: IntoIterator<Item = TestStatus>,
{
    statuses
        .into_iter()
        .fold(OrderTally::default(), |mut acc, status| {
            acc.total += 1;
            match status {
                TestStatus::Pending | TestStatus::InProgress => acc.pending += 1,
                TestStatus::Completed => acc.terminal += 1,
                TestStatus::Critical => {
                    acc.critical += 1;
                    acc.terminal += 1;
                },
            }
            acc
        })
}
