// libs/settlement-cell/src/services/ledger.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    HistoryQuery, HistorySummary, PageMeta, SettlementError, Transaction, TransactionHistory,
    TransactionStatus, TransactionType, TypeSummary,
};

const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Ledger store primitives shared by the settlement, withdrawal and payment
/// flows. The transaction log is append-only: inserts and forward-only status
/// transitions, nothing else.
pub struct LedgerService {
    supabase: Arc<SupabaseClient>,
}

impl LedgerService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Append a ledger entry and return the stored row.
    pub async fn create_transaction(
        &self,
        body: Value,
        auth_token: &str,
    ) -> Result<Transaction, SettlementError> {
        let rows: Vec<Transaction> = self
            .supabase
            .request_with_prefer(
                Method::POST,
                "/rest/v1/transactions",
                Some(auth_token),
                Some(body),
                Some("return=representation"),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| SettlementError::DatabaseError("Insert returned no row".to_string()))
    }

    /// Load one ledger entry by id, optionally pinned to a type, skipping
    /// soft-deleted rows.
    pub async fn find_transaction(
        &self,
        transaction_id: Uuid,
        tx_type: Option<TransactionType>,
        auth_token: &str,
    ) -> Result<Transaction, SettlementError> {
        let mut path = format!(
            "/rest/v1/transactions?id=eq.{}&is_deleted=is.false",
            transaction_id
        );
        if let Some(tx_type) = tx_type {
            path.push_str(&format!("&type=eq.{}", tx_type));
        }

        let rows: Vec<Transaction> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        rows.into_iter().next().ok_or(SettlementError::NotFound)
    }

    /// Forward-only status transition, conditional on the current status so
    /// two admins racing on the same request cannot both win.
    pub async fn transition_status(
        &self,
        transaction_id: Uuid,
        tx_type: TransactionType,
        from: TransactionStatus,
        to: TransactionStatus,
        metadata: Value,
        auth_token: &str,
    ) -> Result<Option<Transaction>, SettlementError> {
        let path = format!(
            "/rest/v1/transactions?id=eq.{}&type=eq.{}&status=eq.{}&is_deleted=is.false",
            transaction_id, tx_type, from
        );
        let body = json!({
            "status": to,
            "metadata": metadata,
            "updated_at": Utc::now(),
        });

        let rows: Vec<Transaction> = self
            .supabase
            .request_with_prefer(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some("return=representation"),
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    /// Completed consultation/home-care entries for a practitioner, minus the
    /// ones already referenced by a completed withdrawal. Prior entries are
    /// never rewritten, so "already withdrawn" is reconstructed from the
    /// withdrawal metadata.
    pub async fn withdrawable_transactions(
        &self,
        practitioner_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Transaction>, SettlementError> {
        let path = format!(
            "/rest/v1/transactions?practitioner_id=eq.{}&status=eq.completed&type=in.(consultation,home-care)&is_deleted=is.false&order=created_at.asc",
            practitioner_id
        );
        let earned: Vec<Transaction> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let withdrawals_path = format!(
            "/rest/v1/transactions?practitioner_id=eq.{}&type=eq.withdrawal&status=eq.completed&is_deleted=is.false&select=metadata",
            practitioner_id
        );
        let withdrawals: Vec<Value> = self
            .supabase
            .request(Method::GET, &withdrawals_path, Some(auth_token), None)
            .await?;

        let mut withdrawn_ids = std::collections::HashSet::new();
        for withdrawal in withdrawals {
            if let Some(ids) = withdrawal["metadata"]["transaction_ids"].as_array() {
                for id in ids {
                    if let Some(id) = id.as_str().and_then(|s| Uuid::parse_str(s).ok()) {
                        withdrawn_ids.insert(id);
                    }
                }
            }
        }

        Ok(earned
            .into_iter()
            .filter(|tx| !withdrawn_ids.contains(&tx.id))
            .collect())
    }

    /// Admin listing of withdrawal or payment requests, newest first.
    pub async fn list_requests(
        &self,
        tx_type: TransactionType,
        status: TransactionStatus,
        page: i64,
        limit: i64,
        auth_token: &str,
    ) -> Result<(Vec<Transaction>, PageMeta), SettlementError> {
        let filters = format!(
            "type=eq.{}&status=eq.{}&is_deleted=is.false",
            tx_type, status
        );
        let total = self.count(&filters, auth_token).await?;

        let path = format!(
            "/rest/v1/transactions?{}&order=created_at.desc&limit={}&offset={}",
            filters,
            limit,
            (page - 1) * limit
        );
        let rows: Vec<Transaction> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok((rows, PageMeta::new(total, page, limit)))
    }

    /// Paginated transaction history with a completed-entries summary. A
    /// `None` practitioner means an admin asking for the whole ledger.
    pub async fn transaction_history(
        &self,
        practitioner_id: Option<Uuid>,
        query: &HistoryQuery,
        auth_token: &str,
    ) -> Result<TransactionHistory, SettlementError> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(1);

        let mut filters = vec!["is_deleted=is.false".to_string()];
        if let Some(practitioner_id) = practitioner_id {
            filters.push(format!("practitioner_id=eq.{}", practitioner_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(tx_type) = query.tx_type {
            filters.push(format!("type=eq.{}", tx_type));
        }
        if let Some(start) = query.start_date {
            filters.push(format!("created_at=gte.{}", encode_ts(start)));
        }
        if let Some(end) = query.end_date {
            filters.push(format!("created_at=lte.{}", encode_ts(end)));
        }
        let filters = filters.join("&");

        let total = self.count(&filters, auth_token).await?;

        let path = format!(
            "/rest/v1/transactions?{}&order=created_at.desc&limit={}&offset={}",
            filters,
            limit,
            (page - 1) * limit
        );
        let transactions: Vec<Transaction> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        // Summary spans every completed entry matching the filters, not just
        // the current page.
        let completed_path = format!(
            "/rest/v1/transactions?{}&status=eq.completed&select=amount,fee,type",
            filters
        );
        let completed: Vec<Value> = self
            .supabase
            .request(Method::GET, &completed_path, Some(auth_token), None)
            .await?;

        let summary = summarize(&completed);
        debug!(
            "Ledger history: {} rows, {} completed in summary",
            transactions.len(),
            summary.overall.count
        );

        Ok(TransactionHistory {
            transactions,
            total: summary.overall.total_amount,
            fee: summary.overall.total_fee,
            summary,
            pagination: PageMeta::new(total, page, limit),
        })
    }

    async fn count(&self, filters: &str, auth_token: &str) -> Result<i64, SettlementError> {
        let path = format!("/rest/v1/transactions?{}&select=count", filters);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(rows
            .first()
            .and_then(|row| row["count"].as_i64())
            .unwrap_or(0))
    }
}

fn summarize(completed: &[Value]) -> HistorySummary {
    let mut by_type: HashMap<String, TypeSummary> = HashMap::new();
    let mut overall = TypeSummary::default();

    for row in completed {
        let amount = row["amount"].as_f64().unwrap_or(0.0);
        let fee = row["fee"].as_f64().unwrap_or(0.0);
        let tx_type = row["type"].as_str().unwrap_or("unknown").to_string();

        let entry = by_type.entry(tx_type).or_default();
        entry.total_amount += amount;
        entry.total_fee += fee;
        entry.count += 1;

        overall.total_amount += amount;
        overall.total_fee += fee;
        overall.count += 1;
    }

    HistorySummary { by_type, overall }
}

fn encode_ts(instant: DateTime<Utc>) -> String {
    urlencoding::encode(&instant.to_rfc3339()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_groups_by_type_and_totals() {
        let rows = vec![
            json!({"amount": 1000.0, "fee": 100.0, "type": "consultation"}),
            json!({"amount": 500.0, "fee": 50.0, "type": "home-care"}),
            json!({"amount": 250.0, "fee": 25.0, "type": "home-care"}),
        ];

        let summary = summarize(&rows);
        assert_eq!(summary.overall.count, 3);
        assert_eq!(summary.overall.total_amount, 1750.0);
        assert_eq!(summary.overall.total_fee, 175.0);
        assert_eq!(summary.by_type["home-care"].count, 2);
        assert_eq!(summary.by_type["home-care"].total_amount, 750.0);
        assert_eq!(summary.by_type["consultation"].total_amount, 1000.0);
    }
}
