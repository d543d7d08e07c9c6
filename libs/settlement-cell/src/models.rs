// libs/settlement-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::practitioner::Practitioner;

// ==============================================================================
// LEDGER MODELS
// ==============================================================================

/// Append-only ledger entry. Settlement, withdrawals, debt repayments and
/// manual corrections all land here; rows are never rewritten once their
/// status reaches a terminal value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub practitioner_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub amount: f64,
    #[serde(default)]
    pub fee: f64,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub appointment_id: Option<Uuid>,
    pub status: TransactionStatus,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    Consultation,
    HomeCare,
    Withdrawal,
    Refund,
    Payment,
    ManualCorrection,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Consultation => write!(f, "consultation"),
            TransactionType::HomeCare => write!(f, "home-care"),
            TransactionType::Withdrawal => write!(f, "withdrawal"),
            TransactionType::Refund => write!(f, "refund"),
            TransactionType::Payment => write!(f, "payment"),
            TransactionType::ManualCorrection => write!(f, "manual-correction"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Requested,
    Approved,
    Rejected,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Requested => write!(f, "requested"),
            TransactionStatus::Approved => write!(f, "approved"),
            TransactionStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Running balance, one row per practitioner, upserted lazily on the first
/// settlement. `current_debt` only moves through settlement increments,
/// approved-payment decrements, or an audited manual correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub practitioner_id: Uuid,
    #[serde(default)]
    pub current_debt: f64,
    #[serde(default)]
    pub total_income: f64,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_withdrawal: Option<DateTime<Utc>>,
    pub last_payment_date: Option<DateTime<Utc>>,
}

impl Balance {
    pub fn zero(practitioner_id: Uuid) -> Self {
        Self {
            practitioner_id,
            current_debt: 0.0,
            total_income: 0.0,
            last_updated: None,
            last_withdrawal: None,
            last_payment_date: None,
        }
    }
}

/// Admin listing view: the balance row, the practitioner it belongs to, and
/// the debt-ban flag derived at read time (never stored).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceView {
    #[serde(flatten)]
    pub balance: Balance,
    pub practitioner: Option<Practitioner>,
    pub to_be_banned: bool,
}

// ==============================================================================
// SETTLEMENT MODELS
// ==============================================================================

/// What a completed appointment owes the ledger. Built by the appointment
/// cell from the payment breakdown at the completed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementInput {
    pub appointment_id: Uuid,
    pub practitioner_id: Uuid,
    pub patient_id: Uuid,
    pub kind: ServiceKind,
    pub amount: f64,
    pub platform_fee: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    Consultation,
    HomeCare,
}

impl From<ServiceKind> for TransactionType {
    fn from(kind: ServiceKind) -> Self {
        match kind {
            ServiceKind::Consultation => TransactionType::Consultation,
            ServiceKind::HomeCare => TransactionType::HomeCare,
        }
    }
}

/// Result of the `settle_appointment` storage transaction. The function is
/// idempotent per appointment; a raced or repeated call comes back with
/// `already_settled` set and no second ledger entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SettlementOutcome {
    pub transaction: Transaction,
    pub already_settled: bool,
}

// ==============================================================================
// WITHDRAWAL / PAYMENT FLOW MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WithdrawalRequestOutcome {
    Created(WithdrawalReceipt),
    Rejected {
        success: bool,
        message: String,
        status: Option<TransactionStatus>,
    },
}

impl WithdrawalRequestOutcome {
    pub fn rejected(message: &str, status: Option<TransactionStatus>) -> Self {
        Self::Rejected {
            success: false,
            message: message.to_string(),
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalReceipt {
    pub success: bool,
    pub withdrawal_id: Uuid,
    pub total_amount: f64,
    pub total_fee: f64,
    pub transaction_count: usize,
    pub request_date: DateTime<Utc>,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequestBody {
    pub amount: f64,
    pub receipt_image: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub success: bool,
    pub payment_id: Uuid,
    pub amount: f64,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectBody {
    pub reason: Option<String>,
}

// ==============================================================================
// BALANCE CORRECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBalanceRequest {
    pub new_amount: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub enum BalanceUpdateOutcome {
    NoChange(Balance),
    Updated(Balance),
}

// ==============================================================================
// QUERY / PAGINATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HistoryQuery {
    pub status: Option<TransactionStatus>,
    #[serde(rename = "type")]
    pub tx_type: Option<TransactionType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<TransactionStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl PageMeta {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            total,
            page,
            limit,
            pages,
        }
    }
}

/// Per-type totals over completed ledger entries.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TypeSummary {
    pub total_amount: f64,
    pub total_fee: f64,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionHistory {
    pub transactions: Vec<Transaction>,
    pub summary: HistorySummary,
    pub total: f64,
    pub fee: f64,
    pub pagination: PageMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub by_type: std::collections::HashMap<String, TypeSummary>,
    pub overall: TypeSummary,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum SettlementError {
    #[error("Transaction not found")]
    NotFound,

    #[error("Balance not found")]
    BalanceNotFound,

    #[error("Unauthorized access to ledger")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::supabase::SupabaseError> for SettlementError {
    fn from(e: shared_database::supabase::SupabaseError) -> Self {
        use shared_database::supabase::SupabaseError;
        match e {
            SupabaseError::Auth(msg) => {
                tracing::debug!("Datastore rejected credentials: {}", msg);
                SettlementError::Unauthorized
            }
            SupabaseError::Conflict(msg) => SettlementError::Conflict(msg),
            other => SettlementError::DatabaseError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_type_uses_kebab_case() {
        assert_eq!(
            serde_json::to_string(&TransactionType::HomeCare).unwrap(),
            "\"home-care\""
        );
        assert_eq!(
            serde_json::to_string(&TransactionType::ManualCorrection).unwrap(),
            "\"manual-correction\""
        );
        let parsed: TransactionType = serde_json::from_str("\"consultation\"").unwrap();
        assert_eq!(parsed, TransactionType::Consultation);
    }

    #[test]
    fn service_kind_maps_to_ledger_type() {
        assert_eq!(
            TransactionType::from(ServiceKind::HomeCare),
            TransactionType::HomeCare
        );
        assert_eq!(
            TransactionType::from(ServiceKind::Consultation),
            TransactionType::Consultation
        );
    }

    #[test]
    fn page_meta_rounds_up() {
        let meta = PageMeta::new(21, 1, 10);
        assert_eq!(meta.pages, 3);
        let empty = PageMeta::new(0, 1, 10);
        assert_eq!(empty.pages, 0);
    }
}
