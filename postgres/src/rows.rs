//! Mapping between rows and the domain model.

use lab_orders_core::store::StoreError;
use lab_orders_core::types::{
    EncounterId, LabOrder, LabTest, OrderId, OrderNumber, PatientId, TestId, TestResult, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, patient_id, provider_id, encounter_id, \
     priority, status, clinical_notes, created_at, resulted_at";

pub(crate) fn db_error(err: &sqlx::Error) -> StoreError {
    StoreError::DatabaseError(err.to_string())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::CorruptRow(format!("{name}: {e}")))
}

fn parsed<T>(row: &PgRow, name: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = column(row, name)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::CorruptRow(e.to_string()))
}

/// Map a `lab_orders` row; tests are attached separately.
pub(crate) fn order_from_row(row: &PgRow) -> Result<LabOrder, StoreError> {
    Ok(LabOrder {
        id: OrderId::from_uuid(column(row, "id")?),
        order_number: OrderNumber::new(column::<String>(row, "order_number")?),
        patient_id: PatientId::from_uuid(column(row, "patient_id")?),
        provider_id: UserId::from_uuid(column(row, "provider_id")?),
        encounter_id: EncounterId::from_uuid(column(row, "encounter_id")?),
        priority: parsed(row, "priority")?,
        status: parsed(row, "status")?,
        clinical_notes: column(row, "clinical_notes")?,
        created_at: column(row, "created_at")?,
        resulted_at: column(row, "resulted_at")?,
        tests: Vec::new(),
    })
}

fn test_from_row(row: &PgRow) -> Result<LabTest, StoreError> {
    let id = TestId::from_uuid(column(row, "id")?);

    let result = match column::<Option<String>>(row, "value")? {
        None => None,
        Some(value) => Some(TestResult {
            test_id: id,
            value,
            unit: column(row, "unit")?,
            reference_range: column(row, "reference_range")?,
            abnormal_flag: parsed(row, "abnormal_flag")?,
            comment: column(row, "comment")?,
            verified_by: UserId::from_uuid(column(row, "verified_by")?),
            verified_at: column(row, "verified_at")?,
        }),
    };

    Ok(LabTest {
        id,
        order_id: OrderId::from_uuid(column(row, "order_id")?),
        test_code: column(row, "test_code")?,
        test_name: column(row, "test_name")?,
        specimen_type: column(row, "specimen_type")?,
        status: parsed(row, "status")?,
        performed_at: column(row, "performed_at")?,
        result,
    })
}

/// Load the tests (with results) of every order in `order_ids`, grouped by order, each group
/// in creation order.
pub(crate) async fn load_tests(
    conn: &mut PgConnection,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<LabTest>>, StoreError> {
    let rows = sqlx::query(
        r"
        SELECT
            t.id, t.order_id, t.test_code, t.test_name, t.specimen_type, t.status, t.performed_at,
            r.value, r.unit, r.reference_range, r.abnormal_flag, r.comment,
            r.verified_by, r.verified_at
        FROM lab_tests t
        LEFT JOIN lab_results r ON r.test_id = t.id
        WHERE t.order_id = ANY($1)
        ORDER BY t.order_id, t.position
        ",
    )
    .bind(order_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| db_error(&e))?;

    let mut grouped: HashMap<Uuid, Vec<LabTest>> = HashMap::new();
    for row in &rows {
        let test = test_from_row(row)?;
        grouped.entry(*test.order_id.as_uuid()).or_default().push(test);
    }
    Ok(grouped)
}

/// Attach loaded tests to their orders. An order without tests is corrupt.
pub(crate) fn attach_tests(
    orders: &mut [LabOrder],
    mut tests: HashMap<Uuid, Vec<LabTest>>,
) -> Result<(), StoreError> {
    for order in orders {
        order.tests = tests.remove(order.id.as_uuid()).ok_or_else(|| {
            StoreError::CorruptRow(format!("order {} has no tests", order.id))
        })?;
    }
    Ok(())
}
