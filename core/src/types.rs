//! Domain types for laboratory orders.
//!
//! An [`LabOrder`] owns one or more [`LabTest`]s, and each test owns at most one
//! [`TestResult`]. Status enums serialize as their `SCREAMING_SNAKE_CASE` names, which is also
//! the representation used in storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a laboratory order
    OrderId
);
uuid_id!(
    /// Unique identifier for one test within an order
    TestId
);
uuid_id!(
    /// Identifier of the patient the order is for
    PatientId
);
uuid_id!(
    /// Identifier of the encounter the order was placed in
    EncounterId
);
uuid_id!(
    /// Identifier of a portal user (ordering providers and lab technicians alike)
    UserId
);

/// Human-readable order number, e.g. `LAB-261019093012-0042`.
///
/// Assigned once at creation and never changed.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Wrap an already-generated order number.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// A stored or transmitted string did not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    /// Which enumeration was being parsed
    pub kind: &'static str,
    /// The offending input
    pub value: String,
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Storage and wire representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant { kind: $kind, value: s.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// How urgently the lab should process an order.
    Priority, "priority" {
        /// Normal turnaround
        Routine => "ROUTINE",
        /// Expedited
        Urgent => "URGENT",
        /// Immediate
        Stat => "STAT",
    }
);

string_enum!(
    /// Aggregate status of an order, derived from its tests.
    OrderStatus, "order status" {
        /// Created, no result submitted yet
        New => "NEW",
        /// At least one result submitted, tests still outstanding
        InProgress => "IN_PROGRESS",
        /// Every test has a result
        ResultReady => "RESULT_READY",
        /// Results reviewed downstream
        Verified => "VERIFIED",
        /// Logically deleted
        Cancelled => "CANCELLED",
    }
);

string_enum!(
    /// Status of one test within an order.
    TestStatus, "test status" {
        /// Awaiting specimen or processing
        Pending => "PENDING",
        /// Being processed
        InProgress => "IN_PROGRESS",
        /// Result recorded
        Completed => "COMPLETED",
        /// Result recorded and flagged critical
        Critical => "CRITICAL",
    }
);

string_enum!(
    /// Interpretation of a result against its reference range.
    AbnormalFlag, "abnormal flag" {
        /// Within range
        Normal => "NORMAL",
        /// Below range
        Low => "LOW",
        /// Above range
        High => "HIGH",
        /// Life-threatening, requires immediate notification
        Critical => "CRITICAL",
    }
);

impl Default for AbnormalFlag {
    fn default() -> Self {
        Self::Normal
    }
}

impl OrderStatus {
    /// Orders in these states still have outstanding work.
    pub const PENDING: [Self; 2] = [Self::New, Self::InProgress];

    /// Whether results may still be recorded against the order.
    #[must_use]
    pub const fn accepts_results(&self) -> bool {
        !matches!(self, Self::Verified | Self::Cancelled)
    }
}

impl TestStatus {
    /// PENDING or `IN_PROGRESS`.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// COMPLETED or CRITICAL.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// The status a test takes once a result with `flag` is recorded.
    #[must_use]
    pub const fn resolved_by(flag: AbnormalFlag) -> Self {
        match flag {
            AbnormalFlag::Critical => Self::Critical,
            AbnormalFlag::Normal | AbnormalFlag::Low | AbnormalFlag::High => Self::Completed,
        }
    }

    /// Test status only moves forward: a terminal test never becomes pending again.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        !(self.is_terminal() && next.is_pending())
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// The value produced for one test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Owning test (one result per test)
    pub test_id: TestId,
    /// Numeric or qualitative value
    pub value: String,
    /// Unit of measure, may be empty for qualitative results
    pub unit: String,
    /// Reference range as reported by the analyser
    pub reference_range: Option<String>,
    /// Interpretation
    pub abnormal_flag: AbnormalFlag,
    /// Free-text comment
    pub comment: Option<String>,
    /// User who recorded the result
    pub verified_by: UserId,
    /// When the result was recorded
    pub verified_at: DateTime<Utc>,
}

/// One analyte or panel within an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabTest {
    /// Test identifier
    pub id: TestId,
    /// Owning order
    pub order_id: OrderId,
    /// Coded identifier, e.g. LOINC `2345-7`
    pub test_code: String,
    /// Display name, e.g. "Glucose"
    pub test_name: String,
    /// Specimen type, e.g. "Serum"
    pub specimen_type: Option<String>,
    /// Current status
    pub status: TestStatus,
    /// When the result was recorded
    pub performed_at: Option<DateTime<Utc>>,
    /// Recorded result, if any
    pub result: Option<TestResult>,
}

/// A laboratory requisition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabOrder {
    /// Order identifier
    pub id: OrderId,
    /// Unique human-readable number
    pub order_number: OrderNumber,
    /// Patient the order is for
    pub patient_id: PatientId,
    /// Ordering provider
    pub provider_id: UserId,
    /// Encounter the order belongs to
    pub encounter_id: EncounterId,
    /// Requested urgency
    pub priority: Priority,
    /// Aggregate status
    pub status: OrderStatus,
    /// Free-text clinical notes
    pub clinical_notes: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Set once, when the order first becomes `RESULT_READY`
    pub resulted_at: Option<DateTime<Utc>>,
    /// Requested tests, in request order
    pub tests: Vec<LabTest>,
}

impl LabOrder {
    /// Look up a test belonging to this order.
    #[must_use]
    pub fn test(&self, test_id: TestId) -> Option<&LabTest> {
        self.tests.iter().find(|t| t.id == test_id)
    }

    /// Any test currently CRITICAL.
    #[must_use]
    pub fn has_critical_values(&self) -> bool {
        self.tests.iter().any(|t| t.status == TestStatus::Critical)
    }

    /// Any recorded result flagged other than NORMAL.
    #[must_use]
    pub fn has_abnormal_results(&self) -> bool {
        self.tests
            .iter()
            .filter_map(|t| t.result.as_ref())
            .any(|r| r.abnormal_flag != AbnormalFlag::Normal)
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// One requested test in a [`NewOrder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTest {
    /// Coded identifier (required)
    pub test_code: String,
    /// Display name (required)
    pub test_name: String,
    /// Specimen type
    #[serde(default)]
    pub specimen_type: Option<String>,
    /// Initial status, PENDING when omitted
    #[serde(default)]
    pub status: Option<TestStatus>,
}

impl NewTest {
    /// A pending test with no specimen type.
    #[must_use]
    pub fn new(test_code: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            test_code: test_code.into(),
            test_name: test_name.into(),
            specimen_type: None,
            status: None,
        }
    }

    /// Set the specimen type.
    #[must_use]
    pub fn with_specimen(mut self, specimen_type: impl Into<String>) -> Self {
        self.specimen_type = Some(specimen_type.into());
        self
    }
}

/// Payload for creating an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    /// Patient
    pub patient_id: PatientId,
    /// Ordering provider
    pub provider_id: UserId,
    /// Encounter
    pub encounter_id: EncounterId,
    /// Urgency
    pub priority: Priority,
    /// Clinical notes
    #[serde(default)]
    pub clinical_notes: Option<String>,
    /// Requested tests (at least one)
    pub tests: Vec<NewTest>,
}

/// Payload for recording one test's result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSubmission {
    /// Test the result is for
    pub test_id: TestId,
    /// Value (required, non-blank)
    pub value: String,
    /// Unit of measure
    #[serde(default)]
    pub unit: String,
    /// Reference range
    #[serde(default)]
    pub reference_range: Option<String>,
    /// Interpretation, NORMAL when omitted
    #[serde(default)]
    pub abnormal_flag: Option<AbnormalFlag>,
    /// Free-text comment
    #[serde(default)]
    pub comment: Option<String>,
}

impl ResultSubmission {
    /// A result with only the required fields set.
    #[must_use]
    pub fn new(test_id: TestId, value: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            test_id,
            value: value.into(),
            unit: unit.into(),
            reference_range: None,
            abnormal_flag: None,
            comment: None,
        }
    }

    /// Set the abnormal flag.
    #[must_use]
    pub const fn flagged(mut self, flag: AbnormalFlag) -> Self {
        self.abnormal_flag = Some(flag);
        self
    }

    /// Set the reference range.
    #[must_use]
    pub fn with_reference_range(mut self, range: impl Into<String>) -> Self {
        self.reference_range = Some(range.into());
        self
    }

    /// The effective flag (NORMAL when none was supplied).
    #[must_use]
    pub fn effective_flag(&self) -> AbnormalFlag {
        self.abnormal_flag.unwrap_or_default()
    }
}
