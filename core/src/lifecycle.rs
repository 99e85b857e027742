//! Order lifecycle rules.
//!
//! Pure functions that build a new order aggregate and apply one result submission to an
//! existing aggregate. Store implementations call [`apply_result`] while holding the order
//! lock, persist whatever it changed, and roll back if it returns an error.
//!
//! ```text
//! NEW ──first submission──▶ IN_PROGRESS ──last pending test resolves──▶ RESULT_READY
//!  └───────────────single-test order resolves──────────────────────────────▲
//! ```

use crate::error::LabOrderError;
use crate::status::{OrderTally, tally};
use crate::types::{
    AbnormalFlag, LabOrder, LabTest, NewOrder, OrderId, OrderNumber, OrderStatus,
    ResultSubmission, TestId, TestResult, TestStatus, UserId,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A submission could not be applied to the order it named.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The test does not belong to the order.
    #[error("test {test_id} not found on order {order_id}")]
    TestNotFound {
        /// Order that was searched
        order_id: OrderId,
        /// Test that was requested
        test_id: TestId,
    },

    /// The order is cancelled or verified.
    #[error("order {order_id} is {status} and no longer accepts results")]
    OrderClosed {
        /// Order
        order_id: OrderId,
        /// Its current status
        status: OrderStatus,
    },

    /// The transition would move a test backwards.
    #[error("test {test_id} cannot move from {from} to {to}")]
    StatusRegression {
        /// Test
        test_id: TestId,
        /// Current status
        from: TestStatus,
        /// Requested status
        to: TestStatus,
    },
}

impl From<TransitionError> for LabOrderError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::TestNotFound { .. } => Self::NotFound(err.to_string()),
            TransitionError::OrderClosed { .. } | TransitionError::StatusRegression { .. } => {
                Self::Validation(err.to_string())
            },
        }
    }
}

/// What [`apply_result`] changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResultApplied {
    /// Test the result was recorded against
    pub test_id: TestId,
    /// Effective flag of this submission
    pub abnormal_flag: AbnormalFlag,
    /// This submission was flagged CRITICAL
    pub critical: bool,
    /// This submission moved the order into `RESULT_READY`
    pub became_ready: bool,
    /// Counts after the submission
    pub tally: OrderTally,
}

/// Check a creation payload before anything is written.
///
/// # Errors
///
/// Returns [`LabOrderError::Validation`] when the order has no tests, a test is missing its
/// code or name, or a test is supplied with a terminal initial status.
pub fn validate_new_order(order: &NewOrder) -> Result<(), LabOrderError> {
    if order.tests.is_empty() {
        return Err(LabOrderError::Validation(
            "an order requires at least one test".to_string(),
        ));
    }

    for (index, test) in order.tests.iter().enumerate() {
        if test.test_code.trim().is_empty() {
            return Err(LabOrderError::Validation(format!(
                "test #{index} is missing its test code"
            )));
        }
        if test.test_name.trim().is_empty() {
            return Err(LabOrderError::Validation(format!(
                "test #{index} ({}) is missing its display name",
                test.test_code
            )));
        }
        if let Some(status) = test.status {
            if status.is_terminal() {
                return Err(LabOrderError::Validation(format!(
                    "test #{index} ({}) cannot be created as {status}",
                    test.test_code
                )));
            }
        }
    }

    Ok(())
}

/// Check a result payload before the transaction opens.
///
/// # Errors
///
/// Returns [`LabOrderError::Validation`] when the value is blank.
pub fn validate_submission(submission: &ResultSubmission) -> Result<(), LabOrderError> {
    if submission.value.trim().is_empty() {
        return Err(LabOrderError::Validation(format!(
            "result for test {} has no value",
            submission.test_id
        )));
    }
    Ok(())
}

/// Build a NEW order aggregate with freshly identified tests.
#[must_use]
pub fn build_order(
    id: OrderId,
    order_number: OrderNumber,
    order: NewOrder,
    created_at: DateTime<Utc>,
) -> LabOrder {
    let tests = order
        .tests
        .into_iter()
        .map(|test| LabTest {
            id: TestId::new(),
            order_id: id,
            test_code: test.test_code,
            test_name: test.test_name,
            specimen_type: test.specimen_type,
            status: test.status.unwrap_or(TestStatus::Pending),
            performed_at: None,
            result: None,
        })
        .collect();

    LabOrder {
        id,
        order_number,
        patient_id: order.patient_id,
        provider_id: order.provider_id,
        encounter_id: order.encounter_id,
        priority: order.priority,
        status: OrderStatus::New,
        clinical_notes: order.clinical_notes,
        created_at,
        resulted_at: None,
        tests,
    }
}

/// Record one result against `order`.
///
/// Upserts the test's result, resolves the test to COMPLETED or CRITICAL, then re-derives the
/// order status from the full test set. `resulted_at` is stamped only on the transition into
/// `RESULT_READY`.
///
/// On error `order` is left untouched.
///
/// # Errors
///
/// - [`TransitionError::OrderClosed`] if the order is cancelled or verified
/// - [`TransitionError::TestNotFound`] if the test is not on this order
/// - [`TransitionError::StatusRegression`] if the test would move backwards
pub fn apply_result(
    order: &mut LabOrder,
    submission: &ResultSubmission,
    verified_by: UserId,
    now: DateTime<Utc>,
) -> Result<ResultApplied, TransitionError> {
    if !order.status.accepts_results() {
        return Err(TransitionError::OrderClosed {
            order_id: order.id,
            status: order.status,
        });
    }

    let order_id = order.id;
    let flag = submission.effective_flag();
    let next = TestStatus::resolved_by(flag);

    let test = order
        .tests
        .iter_mut()
        .find(|t| t.id == submission.test_id)
        .ok_or(TransitionError::TestNotFound {
            order_id,
            test_id: submission.test_id,
        })?;

    if !test.status.can_transition_to(next) {
        return Err(TransitionError::StatusRegression {
            test_id: test.id,
            from: test.status,
            to: next,
        });
    }

    test.result = Some(TestResult {
        test_id: test.id,
        value: submission.value.clone(),
        unit: submission.unit.clone(),
        reference_range: submission.reference_range.clone(),
        abnormal_flag: flag,
        comment: submission.comment.clone(),
        verified_by,
        verified_at: now,
    });
    test.status = next;
    test.performed_at = Some(now);

    let counts = tally(order.tests.iter().map(|t| t.status));
    let was_ready = order.status == OrderStatus::ResultReady;
    order.status = counts.status_after_submission();

    let became_ready = order.status == OrderStatus::ResultReady && !was_ready;
    if became_ready && order.resulted_at.is_none() {
        order.resulted_at = Some(now);
    }

    Ok(ResultApplied {
        test_id: submission.test_id,
        abnormal_flag: flag,
        critical: flag == AbnormalFlag::Critical,
        became_ready,
        tally: counts,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{EncounterId, NewTest, PatientId, Priority};
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, minute, 0).unwrap()
    }

    fn order_with(tests: Vec<NewTest>) -> LabOrder {
        let new_order = NewOrder {
            patient_id: PatientId::new(),
            provider_id: UserId::new(),
            encounter_id: EncounterId::new(),
            priority: Priority::Routine,
            clinical_notes: None,
            tests,
        };
        build_order(OrderId::new(), OrderNumber::new("LAB-TEST-0001"), new_order, at(0))
    }

    fn two_test_order() -> LabOrder {
        order_with(vec![
            NewTest::new("2345-7", "Glucose"),
            NewTest::new("2160-0", "Creatinine"),
        ])
    }

    #[test]
    fn build_order_starts_new_with_pending_tests() {
        let order = two_test_order();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.tests.len(), 2);
        assert!(order.tests.iter().all(|t| t.status == TestStatus::Pending));
        assert!(order.tests.iter().all(|t| t.order_id == order.id));
        assert!(order.resulted_at.is_none());
    }

    #[test]
    fn explicit_initial_status_is_kept() {
        let mut test = NewTest::new("2345-7", "Glucose");
        test.status = Some(TestStatus::InProgress);
        let order = order_with(vec![test]);
        assert_eq!(order.tests[0].status, TestStatus::InProgress);
    }

    #[test]
    fn first_result_moves_order_in_progress() {
        let mut order = two_test_order();
        let glucose = order.tests[0].id;
        let applied = apply_result(
            &mut order,
            &ResultSubmission::new(glucose, "95", "mg/dL"),
            UserId::new(),
            at(5),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::InProgress);
        assert_eq!(order.tests[0].status, TestStatus::Completed);
        assert_eq!(order.tests[0].performed_at, Some(at(5)));
        assert!(!applied.became_ready);
        assert!(!applied.critical);
        assert_eq!(applied.tally.pending, 1);
        assert!(order.resulted_at.is_none());
    }

    #[test]
    fn last_result_makes_order_ready_even_when_critical() {
        let mut order = two_test_order();
        let (glucose, creatinine) = (order.tests[0].id, order.tests[1].id);
        let tech = UserId::new();

        apply_result(&mut order, &ResultSubmission::new(glucose, "95", "mg/dL"), tech, at(5))
            .unwrap();
        let applied = apply_result(
            &mut order,
            &ResultSubmission::new(creatinine, "7.5", "mmol/L").flagged(AbnormalFlag::Critical),
            tech,
            at(9),
        )
        .unwrap();

        assert_eq!(order.status, OrderStatus::ResultReady);
        assert_eq!(order.resulted_at, Some(at(9)));
        assert_eq!(order.tests[1].status, TestStatus::Critical);
        assert!(applied.became_ready);
        assert!(applied.critical);
        assert_eq!(applied.tally.critical, 1);
        assert_eq!(applied.tally.terminal, 2);
    }

    #[test]
    fn resubmission_overwrites_result_and_keeps_resulted_at() {
        let mut order = order_with(vec![NewTest::new("2345-7", "Glucose")]);
        let glucose = order.tests[0].id;
        let tech = UserId::new();

        let first =
            apply_result(&mut order, &ResultSubmission::new(glucose, "95", "mg/dL"), tech, at(5))
                .unwrap();
        assert!(first.became_ready);

        let second = apply_result(
            &mut order,
            &ResultSubmission::new(glucose, "250", "mg/dL").flagged(AbnormalFlag::High),
            tech,
            at(20),
        )
        .unwrap();

        assert!(!second.became_ready);
        assert_eq!(order.resulted_at, Some(at(5)));
        let result = order.tests[0].result.as_ref().unwrap();
        assert_eq!(result.value, "250");
        assert_eq!(result.abnormal_flag, AbnormalFlag::High);
        assert_eq!(result.verified_at, at(20));
    }

    #[test]
    fn unknown_test_is_rejected_without_changes() {
        let mut order = two_test_order();
        let before = order.clone();
        let err = apply_result(
            &mut order,
            &ResultSubmission::new(TestId::new(), "1", "g"),
            UserId::new(),
            at(1),
        )
        .unwrap_err();

        assert!(matches!(err, TransitionError::TestNotFound { .. }));
        assert_eq!(order, before);
    }

    #[test]
    fn cancelled_order_rejects_results() {
        let mut order = two_test_order();
        order.status = OrderStatus::Cancelled;
        let test_id = order.tests[0].id;
        let err = apply_result(
            &mut order,
            &ResultSubmission::new(test_id, "1", "g"),
            UserId::new(),
            at(1),
        )
        .unwrap_err();

        assert!(matches!(err, TransitionError::OrderClosed { status: OrderStatus::Cancelled, .. }));
        assert!(matches!(LabOrderError::from(err), LabOrderError::Validation(_)));
    }

    #[test]
    fn validation_rejects_empty_and_incomplete_orders() {
        let mut order = NewOrder {
            patient_id: PatientId::new(),
            provider_id: UserId::new(),
            encounter_id: EncounterId::new(),
            priority: Priority::Stat,
            clinical_notes: None,
            tests: vec![],
        };
        assert!(matches!(validate_new_order(&order), Err(LabOrderError::Validation(_))));

        order.tests.push(NewTest::new("2345-7", " "));
        assert!(matches!(validate_new_order(&order), Err(LabOrderError::Validation(_))));

        order.tests[0].test_name = "Glucose".to_string();
        order.tests[0].status = Some(TestStatus::Completed);
        assert!(matches!(validate_new_order(&order), Err(LabOrderError::Validation(_))));

        order.tests[0].status = None;
        assert!(validate_new_order(&order).is_ok());
    }

    #[test]
    fn blank_value_is_invalid() {
        let submission = ResultSubmission::new(TestId::new(), "  ", "mg/dL");
        assert!(matches!(validate_submission(&submission), Err(LabOrderError::Validation(_))));
    }
}
