// libs/settlement-cell/src/services/withdrawal.rs
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use notification_cell::dispatch::NotificationDispatcher;
use notification_cell::models::{DocumentType, NotificationEvent};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    PageMeta, SettlementError, Transaction, TransactionStatus, TransactionType, WithdrawalReceipt,
    WithdrawalRequestOutcome,
};
use crate::services::ledger::LedgerService;

/// Withdrawal lifecycle: practitioner request, admin approval/rejection, and
/// the processing step that pays earned income out.
pub struct WithdrawalService {
    supabase: Arc<SupabaseClient>,
    ledger: LedgerService,
    notifier: NotificationDispatcher,
}

impl WithdrawalService {
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

    /// Practitioner claims their earned income. At most one withdrawal may be
    /// in flight per practitioner; both the pre-check and the partial unique
    /// constraint behind the insert enforce that, so the raced double-request
    /// degrades to a structured rejection rather than a duplicate.
    pub async fn request_withdrawal(
        &self,
        practitioner_id: Uuid,
        auth_token: &str,
    ) -> Result<WithdrawalRequestOutcome, SettlementError> {
        let pending_path = format!(
            "/rest/v1/transactions?practitioner_id=eq.{}&type=eq.withdrawal&status=in.(requested,approved)&is_deleted=is.false&limit=1",
            practitioner_id
        );
        let pending: Vec<Transaction> = self
            .supabase
            .request(reqwest::Method::GET, &pending_path, Some(auth_token), None)
            .await?;

        if let Some(existing) = pending.first() {
            debug!(
                "Practitioner {} already has a {} withdrawal",
                practitioner_id, existing.status
            );
            return Ok(WithdrawalRequestOutcome::rejected(
                "You already have a pending withdrawal request. Please wait until we process your previous request.",
                Some(existing.status),
            ));
        }

        let withdrawable = self
            .ledger
            .withdrawable_transactions(practitioner_id, auth_token)
            .await?;

        if withdrawable.is_empty() {
            return Ok(WithdrawalRequestOutcome::rejected(
                "No completed transactions available for withdrawal.",
                None,
            ));
        }

        let total_amount: f64 = withdrawable.iter().map(|tx| tx.amount).sum();
        let total_fee: f64 = withdrawable.iter().map(|tx| tx.fee).sum();
        let transaction_ids: Vec<Uuid> = withdrawable.iter().map(|tx| tx.id).collect();
        let now = Utc::now();

        let insert = self
            .ledger
            .create_transaction(
                json!({
                    "practitioner_id": practitioner_id,
                    "amount": total_amount,
                    "fee": total_fee,
                    "type": TransactionType::Withdrawal,
                    "status": TransactionStatus::Requested,
                    "metadata": {
                        "transaction_ids": transaction_ids,
                        "transaction_count": withdrawable.len(),
                        "total_amount": total_amount,
                        "total_fee": total_fee,
                        "request_date": now,
                    },
                }),
                auth_token,
            )
            .await;

        let request = match insert {
            Ok(tx) => tx,
            // The partial unique index caught a racing request.
            Err(SettlementError::Conflict(_)) => {
                return Ok(WithdrawalRequestOutcome::rejected(
                    "You already have a pending withdrawal request. Please wait until we process your previous request.",
                    Some(TransactionStatus::Requested),
                ));
            }
            Err(e) => return Err(e),
        };

        info!(
            "Withdrawal {} requested by practitioner {} for {} ({} transactions)",
            request.id,
            practitioner_id,
            total_amount,
            withdrawable.len()
        );

        Ok(WithdrawalRequestOutcome::Created(WithdrawalReceipt {
            success: true,
            withdrawal_id: request.id,
            total_amount,
            total_fee,
            transaction_count: withdrawable.len(),
            request_date: now,
            status: TransactionStatus::Requested,
        }))
    }

    /// Admin approval. The requested→approved transition is conditional on
    /// the current status, so re-approval finds nothing and is rejected.
    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: Uuid,
        auth_token: &str,
    ) -> Result<WithdrawalReceipt, SettlementError> {
        let request = self
            .ledger
            .find_transaction(withdrawal_id, Some(TransactionType::Withdrawal), auth_token)
            .await?;

        let mut metadata = object_or_empty(&request.metadata);
        metadata["approved_date"] = json!(Utc::now());

        let approved = self
            .ledger
            .transition_status(
                withdrawal_id,
                TransactionType::Withdrawal,
                TransactionStatus::Requested,
                TransactionStatus::Approved,
                metadata,
                auth_token,
            )
            .await?
            .ok_or(SettlementError::NotFound)?;

        self.notifier.dispatch(NotificationEvent::new(
            approved.practitioner_id,
            approved.id,
            DocumentType::Withdrawal,
            "WITHDRAWAL_APPROVED",
            json!({
                "amount": approved.amount,
                "fee": approved.fee,
                "approved_date": Utc::now(),
            }),
        ));

        self.process_withdrawal(&approved, auth_token).await
    }

    /// Pay the approved request out: a completed withdrawal entry in the
    /// ledger, and every referenced appointment flipped to "withdrawn" in one
    /// storage transaction.
    async fn process_withdrawal(
        &self,
        request: &Transaction,
        auth_token: &str,
    ) -> Result<WithdrawalReceipt, SettlementError> {
        let transaction_ids: Vec<Uuid> = request.metadata["transaction_ids"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                    .collect()
            })
            .unwrap_or_default();

        if transaction_ids.is_empty() {
            return Err(SettlementError::ValidationError(
                "Withdrawal request references no transactions".to_string(),
            ));
        }

        let now = Utc::now();
        let withdrawal = self
            .ledger
            .create_transaction(
                json!({
                    "practitioner_id": request.practitioner_id,
                    "amount": request.amount,
                    "fee": request.fee,
                    "type": TransactionType::Withdrawal,
                    "status": TransactionStatus::Completed,
                    "metadata": {
                        "transaction_ids": transaction_ids,
                        "transaction_count": transaction_ids.len(),
                        "request_id": request.id,
                        "withdrawal_date": now,
                    },
                }),
                auth_token,
            )
            .await?;

        // Settled entries carry their appointment refs; mark each referenced
        // appointment withdrawn, all-or-nothing.
        let ids_path = format!(
            "/rest/v1/transactions?id=in.({})&select=appointment_id",
            transaction_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        let refs: Vec<serde_json::Value> = self
            .supabase
            .request(reqwest::Method::GET, &ids_path, Some(auth_token), None)
            .await?;
        let appointment_ids: Vec<Uuid> = refs
            .iter()
            .filter_map(|row| {
                row["appointment_id"]
                    .as_str()
                    .and_then(|s| Uuid::parse_str(s).ok())
            })
            .collect();

        if !appointment_ids.is_empty() {
            let marked: i64 = self
                .supabase
                .rpc(
                    "mark_payments_withdrawn",
                    json!({
                        "p_practitioner_id": request.practitioner_id,
                        "p_appointment_ids": appointment_ids,
                        "p_amount": request.amount,
                        "p_fee": request.fee,
                    }),
                    Some(auth_token),
                )
                .await?;
            debug!(
                "Marked {} appointments withdrawn for withdrawal {}",
                marked, withdrawal.id
            );
        }

        self.notifier.dispatch(NotificationEvent::new(
            request.practitioner_id,
            withdrawal.id,
            DocumentType::Withdrawal,
            "WITHDRAWAL_PROCESSED",
            json!({
                "amount": request.amount,
                "fee": request.fee,
                "transaction_count": transaction_ids.len(),
                "withdrawal_date": now,
            }),
        ));

        info!(
            "Withdrawal {} processed for practitioner {} ({})",
            withdrawal.id, request.practitioner_id, request.amount
        );

        Ok(WithdrawalReceipt {
            success: true,
            withdrawal_id: withdrawal.id,
            total_amount: request.amount,
            total_fee: request.fee,
            transaction_count: transaction_ids.len(),
            request_date: now,
            status: TransactionStatus::Completed,
        })
    }

    /// Admin rejection. Stores the reason, never touches the balance.
    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: Uuid,
        reason: Option<String>,
        auth_token: &str,
    ) -> Result<Transaction, SettlementError> {
        let request = self
            .ledger
            .find_transaction(withdrawal_id, Some(TransactionType::Withdrawal), auth_token)
            .await?;

        let mut metadata = object_or_empty(&request.metadata);
        metadata["rejected_date"] = json!(Utc::now());
        metadata["rejection_reason"] =
            json!(reason.unwrap_or_else(|| "No reason provided".to_string()));

        let rejected = self
            .ledger
            .transition_status(
                withdrawal_id,
                TransactionType::Withdrawal,
                TransactionStatus::Requested,
                TransactionStatus::Rejected,
                metadata,
                auth_token,
            )
            .await?
            .ok_or(SettlementError::NotFound)?;

        info!("Withdrawal {} rejected", withdrawal_id);
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
            .list_requests(TransactionType::Withdrawal, status, page, limit, auth_token)
            .await
    }
}

fn object_or_empty(metadata: &serde_json::Value) -> serde_json::Value {
    if metadata.is_object() {
        metadata.clone()
    } else {
        json!({})
    }
}
