//! Test data builders.

use crate::mocks::test_clock;
use lab_orders_core::environment::Clock;
use lab_orders_core::lifecycle::build_order;
use lab_orders_core::types::{
    EncounterId, LabOrder, NewOrder, NewTest, OrderId, OrderNumber, PatientId, Priority, UserId,
};

/// Serum glucose, LOINC 2345-7.
#[must_use]
pub fn glucose() -> NewTest {
    NewTest::new("2345-7", "Glucose").with_specimen("Serum")
}

/// Serum creatinine, LOINC 2160-0.
#[must_use]
pub fn creatinine() -> NewTest {
    NewTest::new("2160-0", "Creatinine").with_specimen("Serum")
}

/// Serum potassium, LOINC 2823-3.
#[must_use]
pub fn potassium() -> NewTest {
    NewTest::new("2823-3", "Potassium").with_specimen("Serum")
}

/// A routine order placed by `provider` for a fresh patient.
#[must_use]
pub fn new_order(provider: UserId, tests: Vec<NewTest>) -> NewOrder {
    NewOrder {
        patient_id: PatientId::new(),
        provider_id: provider,
        encounter_id: EncounterId::new(),
        priority: Priority::Routine,
        clinical_notes: None,
        tests,
    }
}

/// Glucose and creatinine, the basic metabolic scenario.
#[must_use]
pub fn metabolic_panel(provider: UserId) -> NewOrder {
    new_order(provider, vec![glucose(), creatinine()])
}

/// A NEW order with glucose and creatinine, as the store would hold it after creation.
#[must_use]
pub fn persisted_order() -> LabOrder {
    let id = OrderId::new();
    build_order(
        id,
        OrderNumber::new(format!("LAB-250101000000-{}", &id.to_string()[..4])),
        metabolic_panel(UserId::new()),
        test_clock().now(),
    )
}
