// libs/settlement-cell/src/services/settlement.rs
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{SettlementError, SettlementInput, SettlementOutcome, TransactionType};

/// Converts a completed service into a ledger entry plus a balance delta.
/// The whole effect runs inside the `settle_appointment` storage transaction:
/// either the transaction row exists AND the balance moved, or neither did.
pub struct SettlementService {
    supabase: Arc<SupabaseClient>,
}

impl SettlementService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Settle a completed appointment exactly once. Idempotent at the storage
    /// layer: repeat calls for the same appointment return the original entry
    /// with `already_settled` set, without double-applying the delta.
    ///
    /// Failures here are hard errors. Money is involved; the caller must
    /// never treat a failed settlement as done.
    pub async fn settle(
        &self,
        input: &SettlementInput,
        auth_token: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        if input.amount < 0.0 || input.platform_fee < 0.0 {
            return Err(SettlementError::ValidationError(
                "Settlement amounts cannot be negative".to_string(),
            ));
        }

        let tx_type = TransactionType::from(input.kind);
        info!(
            "Settling appointment {} for practitioner {} ({} / fee {})",
            input.appointment_id, input.practitioner_id, input.amount, input.platform_fee
        );

        let outcome: SettlementOutcome = self
            .supabase
            .rpc(
                "settle_appointment",
                json!({
                    "p_appointment_id": input.appointment_id,
                    "p_practitioner_id": input.practitioner_id,
                    "p_patient_id": input.patient_id,
                    "p_type": tx_type,
                    "p_amount": input.amount,
                    "p_fee": input.platform_fee,
                }),
                Some(auth_token),
            )
            .await?;

        if outcome.already_settled {
            warn!(
                "Appointment {} was already settled by transaction {}; skipping",
                input.appointment_id, outcome.transaction.id
            );
        } else {
            info!(
                "Appointment {} settled: transaction {} (debt +{}, income +{})",
                input.appointment_id, outcome.transaction.id, input.platform_fee, input.amount
            );
        }

        Ok(outcome)
    }
}
