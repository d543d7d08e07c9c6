// libs/appointment-cell/src/services/completion.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use notification_cell::dispatch::NotificationDispatcher;
use notification_cell::models::{DocumentType, NotificationEvent};
use settlement_cell::models::{ServiceKind, SettlementInput};
use settlement_cell::services::settlement::SettlementService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    completion_metadata, Appointment, AppointmentError, AppointmentStatus, CompletionOutcome,
    ConfirmerRole, PaymentStatus,
};
use crate::services::appointments::AppointmentService;
use crate::services::lifecycle;

/// Two-key completion. Each party turns its own key through an atomic
/// conditional update; whoever observes both keys set drives the completed
/// transition and settlement, exactly once.
pub struct CompletionService {
    supabase: Arc<SupabaseClient>,
    appointments: AppointmentService,
    settlement: SettlementService,
    notifier: NotificationDispatcher,
}

impl CompletionService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            appointments: AppointmentService::with_client(Arc::clone(&supabase)),
            settlement: SettlementService::with_client(Arc::clone(&supabase)),
            notifier: NotificationDispatcher::with_client(
                Arc::clone(&supabase),
                &config.supabase_service_role_key,
            ),
            supabase,
        }
    }

    pub async fn confirm_completion(
        &self,
        appointment_id: Uuid,
        user: &User,
        role: ConfirmerRole,
        auth_token: &str,
    ) -> Result<CompletionOutcome, AppointmentError> {
        let actor = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::ValidationError("Invalid actor id".to_string()))?;

        let appointment = self
            .appointments
            .find_appointment(appointment_id, auth_token)
            .await?;
        Self::authorize_confirmer(&appointment, actor, role)?;
        lifecycle::validate_transition(appointment.status, AppointmentStatus::Completed)?;

        // Claim this role's key. The filters on the flag and the status make
        // the write atomic: only one request per role ever sees a row back,
        // a concurrently cancelled appointment matches nothing, and the
        // returned row carries the other flag as of the same write.
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&{}=is.false&status=in.(confirmed,in-progress)&is_deleted=is.false",
            appointment_id,
            role.flag_column()
        );
        let now = Utc::now();
        let body = json!({
            role.flag_column(): true,
            role.timestamp_column(): now,
            "updated_at": now,
        });
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_prefer(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(body),
                Some("return=representation"),
            )
            .await?;

        let Some(updated) = rows.into_iter().next() else {
            // Row exists in a confirmable state (we just validated it), so
            // the key was already turned.
            debug!(
                "Appointment {} already confirmed by {}",
                appointment_id,
                role.label()
            );
            return Ok(CompletionOutcome::AlreadyConfirmed);
        };

        self.record_confirmation(appointment_id, actor, role, auth_token)
            .await?;

        let other_confirmed = match role {
            ConfirmerRole::Practitioner => updated.patient_confirmed,
            ConfirmerRole::Patient => updated.practitioner_confirmed,
        };

        if other_confirmed {
            let completed = self.finalize(&updated, auth_token).await?;
            Ok(CompletionOutcome::Completed(completed))
        } else {
            self.notify_other_party(&updated, role);
            Ok(CompletionOutcome::AwaitingOtherParty(updated))
        }
    }

    /// Single-key practitioner path kept for clients that predate the
    /// two-key flow. Completes and settles in one call.
    pub async fn complete_legacy(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<CompletionOutcome, AppointmentError> {
        let actor = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::ValidationError("Invalid actor id".to_string()))?;

        let appointment = self
            .appointments
            .find_appointment(appointment_id, auth_token)
            .await?;

        let is_assigned = appointment.practitioner_id == Some(actor);
        if !is_assigned && !user.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }
        if appointment.status == AppointmentStatus::Completed {
            return Ok(CompletionOutcome::AlreadyConfirmed);
        }
        lifecycle::validate_transition(appointment.status, AppointmentStatus::Completed)?;

        let now = Utc::now();
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}&is_deleted=is.false",
            appointment_id, appointment.status
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_prefer(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({
                    "status": AppointmentStatus::Completed,
                    "legacy_confirmed": true,
                    "completed_at": now,
                    "payment": appointment
                        .payment
                        .advanced(PaymentStatus::Completed, "Completed by practitioner"),
                    "updated_at": now,
                })),
                Some("return=representation"),
            )
            .await?;

        let completed = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::Conflict("Appointment was updated concurrently".to_string())
        })?;

        self.settle(&completed, auth_token).await?;
        self.notify_completed(&completed);

        info!(
            "Appointment {} completed through the single-key path by {}",
            appointment_id, actor
        );
        Ok(CompletionOutcome::Completed(completed))
    }

    fn authorize_confirmer(
        appointment: &Appointment,
        actor: Uuid,
        role: ConfirmerRole,
    ) -> Result<(), AppointmentError> {
        let authorized = match role {
            ConfirmerRole::Practitioner => appointment.practitioner_id == Some(actor),
            ConfirmerRole::Patient => appointment.patient_id == actor,
        };
        if authorized {
            Ok(())
        } else {
            Err(AppointmentError::Unauthorized)
        }
    }

    /// Confirmation audit trail, append-only.
    async fn record_confirmation(
        &self,
        appointment_id: Uuid,
        actor: Uuid,
        role: ConfirmerRole,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let _: Vec<Value> = self
            .supabase
            .request_with_prefer(
                Method::POST,
                "/rest/v1/completion_confirmations",
                Some(auth_token),
                Some(json!({
                    "appointment_id": appointment_id,
                    "user_id": actor,
                    "user_type": role.label(),
                    "confirmed_at": Utc::now(),
                })),
                Some("return=representation"),
            )
            .await?;
        Ok(())
    }

    /// Both keys turned: complete, settle, tell both parties.
    async fn finalize(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let now = Utc::now();
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=in.(confirmed,in-progress)&is_deleted=is.false",
            appointment.id
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_prefer(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({
                    "status": AppointmentStatus::Completed,
                    "completed_at": now,
                    "payment": appointment
                        .payment
                        .advanced(PaymentStatus::Completed, "Both parties confirmed"),
                    "updated_at": now,
                })),
                Some("return=representation"),
            )
            .await?;

        let completed = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::Conflict("Appointment was updated concurrently".to_string())
        })?;

        self.settle(&completed, auth_token).await?;
        self.notify_completed(&completed);

        info!("Appointment {} completed and settled", completed.id);
        Ok(completed)
    }

    async fn settle(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let practitioner_id = appointment.practitioner_id.ok_or_else(|| {
            AppointmentError::ValidationError(
                "Cannot settle an appointment without a practitioner".to_string(),
            )
        })?;

        let input = SettlementInput {
            appointment_id: appointment.id,
            practitioner_id,
            patient_id: appointment.patient_id,
            kind: if appointment.is_home_care {
                ServiceKind::HomeCare
            } else {
                ServiceKind::Consultation
            },
            amount: appointment.payment.amount,
            platform_fee: appointment.payment.platform_fee,
        };

        self.settlement.settle(&input, auth_token).await?;
        Ok(())
    }

    fn notify_other_party(&self, appointment: &Appointment, confirmer: ConfirmerRole) {
        let recipient = match confirmer {
            ConfirmerRole::Practitioner => Some(appointment.patient_id),
            ConfirmerRole::Patient => appointment.practitioner_id,
        };
        if let Some(recipient) = recipient {
            self.notifier.dispatch(NotificationEvent::new(
                recipient,
                appointment.id,
                DocumentType::Appointment,
                confirmer.confirmation_action(),
                completion_metadata(appointment),
            ));
        }
    }

    fn notify_completed(&self, appointment: &Appointment) {
        let mut recipients = vec![appointment.patient_id];
        if let Some(practitioner_id) = appointment.practitioner_id {
            recipients.push(practitioner_id);
        }
        for recipient in recipients {
            self.notifier.dispatch(NotificationEvent::new(
                recipient,
                appointment.id,
                DocumentType::Appointment,
                "APPOINTMENT_COMPLETED",
                completion_metadata(appointment),
            ));
        }
    }
}
