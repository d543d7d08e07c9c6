// libs/settlement-cell/src/services/balance.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};
use shared_utils::time::{regional_now, to_regional};

use crate::models::{
    Balance, BalanceUpdateOutcome, BalanceView, PageMeta, PageQuery, SettlementError, Transaction,
    TransactionStatus, TransactionType, UpdateBalanceRequest,
};
use crate::services::ledger::LedgerService;

const DEFAULT_PAGE_LIMIT: i64 = 20;

/// Practitioner balances: platform-fee debt, lifetime income, and the
/// month-start payment deadline that drives the ban flag.
pub struct BalanceService {
    supabase: Arc<SupabaseClient>,
    ledger: LedgerService,
}

impl BalanceService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            ledger: LedgerService::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// A practitioner with no balance row simply has a zero balance.
    pub async fn get_balance(
        &self,
        practitioner_id: Uuid,
        auth_token: &str,
    ) -> Result<Balance, SettlementError> {
        let path = format!(
            "/rest/v1/balances?practitioner_id=eq.{}&limit=1",
            practitioner_id
        );
        let rows: Vec<Balance> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(rows
            .into_iter()
            .next()
            .unwrap_or_else(|| Balance::zero(practitioner_id)))
    }

    /// Admin listing of practitioners who owe platform fees, largest debt
    /// first, each annotated with the derived ban flag.
    pub async fn list_balances(
        &self,
        query: &PageQuery,
        auth_token: &str,
    ) -> Result<(Vec<BalanceView>, PageMeta), SettlementError> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);

        let mut filters = "current_debt=gt.0&total_income=gt.0".to_string();
        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            let ids = self.search_practitioner_ids(search, auth_token).await?;
            if ids.is_empty() {
                return Ok((Vec::new(), PageMeta::new(0, page, limit)));
            }
            filters.push_str(&format!(
                "&practitioner_id=in.({})",
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ));
        }

        let count_path = format!("/rest/v1/balances?{}&select=count", filters);
        let count_rows: Vec<serde_json::Value> = self
            .supabase
            .request(Method::GET, &count_path, Some(auth_token), None)
            .await?;
        let total = count_rows
            .first()
            .and_then(|row| row["count"].as_i64())
            .unwrap_or(0);

        let path = format!(
            "/rest/v1/balances?{}&select=*,practitioner:practitioners(*)&order=current_debt.desc&limit={}&offset={}",
            filters,
            limit,
            (page - 1) * limit
        );
        let rows: Vec<serde_json::Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let now = regional_now();
        let views = rows
            .into_iter()
            .filter_map(|row| {
                let balance: Balance = serde_json::from_value(row.clone()).ok()?;
                let practitioner = serde_json::from_value(row["practitioner"].clone()).ok();
                let to_be_banned = payment_overdue(&balance, now);
                Some(BalanceView {
                    balance,
                    practitioner,
                    to_be_banned,
                })
            })
            .collect();

        Ok((views, PageMeta::new(total, page, limit)))
    }

    async fn search_practitioner_ids(
        &self,
        search: &str,
        auth_token: &str,
    ) -> Result<Vec<Uuid>, SettlementError> {
        let path = format!(
            "/rest/v1/practitioners?full_name=ilike.*{}*&select=id",
            urlencoding::encode(search)
        );
        let rows: Vec<serde_json::Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row["id"].as_str().and_then(|s| Uuid::parse_str(s).ok()))
            .collect())
    }

    /// Manual debt correction, the only direct-write path on a balance.
    /// Every change leaves a manual-correction entry naming the admin.
    pub async fn update_balance(
        &self,
        practitioner_id: Uuid,
        admin_id: Uuid,
        request: UpdateBalanceRequest,
        auth_token: &str,
    ) -> Result<BalanceUpdateOutcome, SettlementError> {
        let current = self.get_balance(practitioner_id, auth_token).await?;
        let diff = request.new_amount - current.current_debt;

        if diff == 0.0 {
            return Ok(BalanceUpdateOutcome::NoChange(current));
        }

        let upsert: Result<Vec<Balance>, SupabaseError> = self
            .supabase
            .request_with_prefer(
                Method::POST,
                "/rest/v1/balances",
                Some(auth_token),
                Some(json!({
                    "practitioner_id": practitioner_id,
                    "current_debt": request.new_amount,
                    "total_income": current.total_income,
                    "last_updated": Utc::now(),
                })),
                Some("resolution=merge-duplicates,return=representation"),
            )
            .await;
        let updated = upsert?
            .into_iter()
            .next()
            .ok_or_else(|| SettlementError::DatabaseError("Upsert returned no row".to_string()))?;

        let correction: Transaction = self
            .ledger
            .create_transaction(
                json!({
                    "practitioner_id": practitioner_id,
                    "amount": diff.abs(),
                    "type": TransactionType::ManualCorrection,
                    "status": TransactionStatus::Completed,
                    "metadata": {
                        "previous_debt": current.current_debt,
                        "new_debt": request.new_amount,
                        "correction_amount": diff,
                        "notes": request.notes,
                        "admin_id": admin_id,
                    },
                }),
                auth_token,
            )
            .await?;

        info!(
            "Balance correction {} for practitioner {}: {} -> {}",
            correction.id, practitioner_id, current.current_debt, request.new_amount
        );

        Ok(BalanceUpdateOutcome::Updated(updated))
    }
}

/// Debt becomes a ban candidate once the monthly grace window (through the
/// 5th, regional time) has passed without a payment dated in the current
/// month. Derived at read time from the record and the clock.
pub fn payment_overdue(balance: &Balance, now: DateTime<FixedOffset>) -> bool {
    if now.day() <= 5 {
        return false;
    }

    match balance.last_payment_date {
        None => true,
        Some(paid) => {
            let paid = to_regional(paid);
            paid.year() < now.year() || (paid.year() == now.year() && paid.month() < now.month())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared_utils::time::regional_offset;

    fn balance_with_payment(paid: Option<DateTime<Utc>>) -> Balance {
        Balance {
            last_payment_date: paid,
            ..Balance::zero(Uuid::new_v4())
        }
    }

    fn regional(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        regional_offset().with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn grace_window_protects_through_the_fifth() {
        let balance = balance_with_payment(None);
        assert!(!payment_overdue(&balance, regional(2026, 7, 5, 12)));
        assert!(payment_overdue(&balance, regional(2026, 7, 6, 0)));
    }

    #[test]
    fn payment_this_month_clears_the_flag() {
        let paid = Utc.with_ymd_and_hms(2026, 7, 2, 10, 0, 0).unwrap();
        let balance = balance_with_payment(Some(paid));
        assert!(!payment_overdue(&balance, regional(2026, 7, 20, 12)));
    }

    #[test]
    fn payment_last_month_does_not_count() {
        let paid = Utc.with_ymd_and_hms(2026, 6, 28, 10, 0, 0).unwrap();
        let balance = balance_with_payment(Some(paid));
        assert!(payment_overdue(&balance, regional(2026, 7, 10, 12)));
    }

    #[test]
    fn utc_payment_near_month_boundary_uses_regional_day() {
        // 23:30 UTC on June 30 is already July 1 at UTC+1.
        let paid = Utc.with_ymd_and_hms(2026, 6, 30, 23, 30, 0).unwrap();
        let balance = balance_with_payment(Some(paid));
        assert!(!payment_overdue(&balance, regional(2026, 7, 10, 12)));
    }
}
