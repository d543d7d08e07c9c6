// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Requested,
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::Requested => write!(f, "requested"),
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in-progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Withdrawn,
    Refunded,
}

/// One billed service on a home-care visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLine {
    pub service_id: Uuid,
    pub base_price: f64,
    pub fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentHistoryEntry {
    pub status: PaymentStatus,
    pub changed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Payment breakdown stored on the appointment. `status` only moves forward:
/// pending, then completed at settlement, then withdrawn at payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub estimated_amount: f64,
    #[serde(default)]
    pub platform_fee: f64,
    #[serde(default)]
    pub services_breakdown: Vec<ServiceLine>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub history: Vec<PaymentHistoryEntry>,
}

impl PaymentRecord {
    pub fn pending(breakdown: Vec<ServiceLine>) -> Self {
        let amount: f64 = breakdown.iter().map(|line| line.base_price + line.fee).sum();
        let platform_fee = amount * 0.10;
        Self {
            amount,
            estimated_amount: amount + platform_fee,
            platform_fee,
            services_breakdown: breakdown,
            status: PaymentStatus::Pending,
            history: Vec::new(),
        }
    }

    pub fn advanced(&self, status: PaymentStatus, note: &str) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.history.push(PaymentHistoryEntry {
            status,
            changed_at: Utc::now(),
            note: Some(note.to_string()),
        });
        next
    }
}

impl Default for PaymentRecord {
    fn default() -> Self {
        Self::pending(Vec::new())
    }
}

/// A booked visit, remote consultation or home-care request. Completion
/// confirmations are flat columns so one conditional UPDATE can claim a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub practitioner_id: Option<Uuid>,
    #[serde(default)]
    pub service_ids: Vec<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub queue_order: i32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub is_home_care: bool,
    #[serde(default)]
    pub is_present: bool,
    #[serde(default)]
    pub payment: PaymentRecord,
    #[serde(default)]
    pub practitioner_confirmed: bool,
    #[serde(default)]
    pub patient_confirmed: bool,
    pub practitioner_confirmed_at: Option<DateTime<Utc>>,
    pub patient_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub legacy_confirmed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ==============================================================================
// COMPLETION PROTOCOL MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmerRole {
    Practitioner,
    Patient,
}

impl ConfirmerRole {
    /// Column claimed by this role's key.
    pub fn flag_column(&self) -> &'static str {
        match self {
            ConfirmerRole::Practitioner => "practitioner_confirmed",
            ConfirmerRole::Patient => "patient_confirmed",
        }
    }

    pub fn timestamp_column(&self) -> &'static str {
        match self {
            ConfirmerRole::Practitioner => "practitioner_confirmed_at",
            ConfirmerRole::Patient => "patient_confirmed_at",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfirmerRole::Practitioner => "practitioner",
            ConfirmerRole::Patient => "patient",
        }
    }

    /// Action name for the notification sent to the other party when only
    /// this key has turned.
    pub fn confirmation_action(&self) -> &'static str {
        match self {
            ConfirmerRole::Practitioner => "PRACTITIONER_CONFIRMED_COMPLETION",
            ConfirmerRole::Patient => "PATIENT_CONFIRMED_COMPLETION",
        }
    }

    pub fn other(&self) -> ConfirmerRole {
        match self {
            ConfirmerRole::Practitioner => ConfirmerRole::Patient,
            ConfirmerRole::Patient => ConfirmerRole::Practitioner,
        }
    }
}

/// Result of turning one completion key.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    /// This role had already confirmed; nothing changed.
    AlreadyConfirmed,
    /// Key recorded, the other party has not confirmed yet.
    AwaitingOtherParty(Appointment),
    /// Both keys present; the appointment completed and settled.
    Completed(Appointment),
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentRequest {
    /// Defaults to the caller for patient bookings.
    pub patient_id: Option<Uuid>,
    pub practitioner_id: Option<Uuid>,
    pub service_ids: Vec<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub is_remote: bool,
    #[serde(default)]
    pub is_home_care: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub status: Option<AppointmentStatus>,
    pub is_present: Option<bool>,
    pub queue_order: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderQueueRequest {
    pub appointment_ids: Vec<Uuid>,
}

/// Actor-scoped listing split by the regional clock.
#[derive(Debug, Clone, Serialize)]
pub struct MyAppointments {
    pub next: Vec<Appointment>,
    pub archive: Vec<Appointment>,
}

/// Patient-facing view of a practitioner's queue for today.
#[derive(Debug, Clone, Serialize)]
pub struct QueueView {
    pub success: bool,
    pub in_queue: bool,
    pub message: Option<String>,
    pub position: Option<usize>,
    pub estimated_wait_minutes: Option<i64>,
    pub appointment_time: Option<NaiveTime>,
    pub next_patient_name: Option<String>,
    pub queue_length: usize,
}

impl QueueView {
    pub fn not_in_queue(queue_length: usize) -> Self {
        Self {
            success: true,
            in_queue: false,
            message: Some("You have no appointment in this queue today".to_string()),
            position: None,
            estimated_wait_minutes: None,
            appointment_time: None,
            next_patient_name: None,
            queue_length,
        }
    }
}

/// Priced service row used to build the home-care payment breakdown.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRow {
    pub id: Uuid,
    pub name: Option<String>,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub home_care_fee: f64,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Not authorized for this appointment")]
    Unauthorized,

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Settlement failed: {0}")]
    Settlement(#[from] settlement_cell::models::SettlementError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::supabase::SupabaseError> for AppointmentError {
    fn from(e: shared_database::supabase::SupabaseError) -> Self {
        use shared_database::supabase::SupabaseError;
        match e {
            SupabaseError::Auth(_) => AppointmentError::Unauthorized,
            SupabaseError::NotFound(_) => AppointmentError::NotFound,
            SupabaseError::Conflict(msg) => AppointmentError::Conflict(msg),
            other => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

/// Metadata payload attached to completion notifications.
pub fn completion_metadata(appointment: &Appointment) -> Value {
    serde_json::json!({
        "date": appointment.date,
        "time": appointment.time,
        "amount": appointment.payment.amount,
        "is_home_care": appointment.is_home_care,
    })
}
