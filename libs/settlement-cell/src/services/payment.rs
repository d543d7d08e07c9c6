// libs/settlement-cell/src/services/payment.rs
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use notification_cell::dispatch::NotificationDispatcher;
use notification_cell::models::{DocumentType, NotificationEvent};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    PageMeta, PaymentReceipt, PaymentRequestBody, SettlementError, Transaction, TransactionStatus,
    TransactionType,
};
use crate::services::ledger::LedgerService;

/// Debt repayment: a practitioner submits a receipt for money paid back to
/// the platform, and an admin approves or rejects it. Approval is the only
/// path that touches the balance.
pub struct PaymentService {
    supabase: Arc<SupabaseClient>,
    ledger: LedgerService,
    notifier: NotificationDispatcher,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            ledger: LedgerService::new(Arc::clone(&supabase)),
            notifier: NotificationDispatcher::with_client(
                Arc::clone(&supabase),
                &config.supabase_service_role_key,
            ),
            supabase,
        }
    }

    pub async fn request_payment(
        &self,
        practitioner_id: Uuid,
        body: PaymentRequestBody,
        auth_token: &str,
    ) -> Result<PaymentReceipt, SettlementError> {
        if body.amount <= 0.0 {
            return Err(SettlementError::ValidationError(
                "Payment amount must be greater than zero".to_string(),
            ));
        }

        let payment = self
            .ledger
            .create_transaction(
                json!({
                    "practitioner_id": practitioner_id,
                    "amount": body.amount,
                    "type": TransactionType::Payment,
                    "status": TransactionStatus::Requested,
                    "metadata": {
                        "receipt_image": body.receipt_image,
                        "notes": body.notes,
                        "request_date": Utc::now(),
                    },
                }),
                auth_token,
            )
            .await?;

        info!(
            "Payment {} requested by practitioner {} for {}",
            payment.id, practitioner_id, body.amount
        );

        Ok(PaymentReceipt {
            success: true,
            payment_id: payment.id,
            amount: payment.amount,
            status: payment.status,
        })
    }

    /// Admin approval. The requested→completed transition and the balance
    /// adjustment are conditional on the current status, so a re-approval
    /// finds nothing and fails instead of deducting twice.
    pub async fn approve_payment(
        &self,
        payment_id: Uuid,
        auth_token: &str,
    ) -> Result<Transaction, SettlementError> {
        let request = self
            .ledger
            .find_transaction(payment_id, Some(TransactionType::Payment), auth_token)
            .await?;

        let mut metadata = request.metadata.clone();
        if !metadata.is_object() {
            metadata = json!({});
        }
        metadata["approved_date"] = json!(Utc::now());

        let approved = self
            .ledger
            .transition_status(
                payment_id,
                TransactionType::Payment,
                TransactionStatus::Requested,
                TransactionStatus::Completed,
                metadata,
                auth_token,
            )
            .await?
            .ok_or(SettlementError::NotFound)?;

        // Shrink the debt and stamp last_payment_date in one storage
        // transaction.
        let _: serde_json::Value = self
            .supabase
            .rpc(
                "adjust_balance",
                json!({
                    "p_practitioner_id": approved.practitioner_id,
                    "p_debt_delta": -approved.amount,
                    "p_mark_payment": true,
                }),
                Some(auth_token),
            )
            .await?;

        self.notifier.dispatch(NotificationEvent::new(
            approved.practitioner_id,
            approved.id,
            DocumentType::Payment,
            "PAYMENT_APPROVED",
            json!({
                "amount": approved.amount,
                "approved_date": Utc::now(),
            }),
        ));

        info!(
            "Payment {} approved for practitioner {} ({})",
            approved.id, approved.practitioner_id, approved.amount
        );
        Ok(approved)
    }

    pub async fn reject_payment(
        &self,
        payment_id: Uuid,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Transaction, SettlementError> {
        let request = self
            .ledger
            .find_transaction(payment_id, Some(TransactionType::Payment), auth_token)
            .await?;

        let mut metadata = request.metadata.clone();
        if !metadata.is_object() {
            metadata = json!({});
        }
        metadata["rejected_date"] = json!(Utc::now());
        metadata["rejection_reason"] =
            json!(reason.unwrap_or_else(|| "No reason provided".to_string()));

        let rejected = self
            .ledger
            .transition_status(
                payment_id,
                TransactionType::Payment,
                TransactionStatus::Requested,
                TransactionStatus::Rejected,
                metadata,
                auth_token,
            )
            .await?
            .ok_or(SettlementError::NotFound)?;

        self.notifier.dispatch(NotificationEvent::new(
            rejected.practitioner_id,
            rejected.id,
            DocumentType::Payment,
            "PAYMENT_REJECTED",
            json!({
                "amount": rejected.amount,
                "reason": rejected.metadata["rejection_reason"],
            }),
        ));

        info!("Payment {} rejected", payment_id);
        Ok(rejected)
    }

    pub async fn list_requests(
        &self,
        status: TransactionStatus,
        page: i64,
        limit: i64,
        auth_token: &str,
    ) -> Result<(Vec<Transaction>, PageMeta), SettlementError> {
        self.ledger
            .list_requests(TransactionType::Payment, status, page, limit, auth_token)
            .await
    }
}
