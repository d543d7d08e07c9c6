// libs/appointment-cell/src/services/queue.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_utils::time::regional_now;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, QueueView};

const MINUTES_PER_SLOT: i64 = 15;

/// Day-of queue math for a practitioner's visits. All wall-clock decisions
/// use the regional offset.
pub struct QueueService {
    supabase: Arc<SupabaseClient>,
}

impl QueueService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    /// Where the calling patient stands in the practitioner's queue today.
    pub async fn get_practitioner_queue(
        &self,
        practitioner_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<QueueView, AppointmentError> {
        let actor = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::ValidationError("Invalid actor id".to_string()))?;

        let now = regional_now();
        let today = now.date_naive();

        let path = format!(
            "/rest/v1/appointments?practitioner_id=eq.{}&date=eq.{}&status=in.(pending,confirmed,in-progress)&is_deleted=is.false&order=queue_order.asc,time.asc",
            practitioner_id, today
        );
        let queue: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let Some(mine) = queue.iter().find(|a| a.patient_id == actor) else {
            debug!(
                "Patient {} has no appointment with practitioner {} today",
                actor, practitioner_id
            );
            return Ok(QueueView::not_in_queue(queue.len()));
        };

        // Entries already past their slot and underway no longer count
        // toward the wait.
        let upcoming: Vec<&Appointment> = queue
            .iter()
            .filter(|a| {
                a.time >= now.time()
                    || matches!(
                        a.status,
                        AppointmentStatus::Pending | AppointmentStatus::Confirmed
                    )
            })
            .collect();

        let position = upcoming
            .iter()
            .position(|a| a.id == mine.id)
            .map(|index| index + 1)
            .unwrap_or(1);
        let estimated_wait = estimated_wait_minutes(position);
        let next_patient_name = match upcoming.first() {
            Some(first) => self.patient_name(first.patient_id, auth_token).await?,
            None => None,
        };

        Ok(QueueView {
            success: true,
            in_queue: true,
            message: None,
            position: Some(position),
            estimated_wait_minutes: Some(estimated_wait),
            appointment_time: Some(mine.time),
            next_patient_name,
            queue_length: queue.len(),
        })
    }

    async fn patient_name(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<String>, AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}&select=full_name", patient_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        Ok(rows
            .first()
            .and_then(|row| row["full_name"].as_str())
            .map(|name| name.to_string()))
    }

    /// Rewrite today's ordering in one storage transaction. The caller must
    /// own every listed appointment.
    pub async fn reorder_queue(
        &self,
        appointment_ids: &[Uuid],
        user: &User,
        auth_token: &str,
    ) -> Result<usize, AppointmentError> {
        if !user.is_practitioner() && !user.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }
        if appointment_ids.is_empty() {
            return Err(AppointmentError::ValidationError(
                "appointment_ids must not be empty".to_string(),
            ));
        }
        let actor = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::ValidationError("Invalid actor id".to_string()))?;

        let id_list = appointment_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let mut path = format!(
            "/rest/v1/appointments?id=in.({})&is_deleted=is.false&select=id",
            id_list
        );
        if !user.is_admin() {
            path.push_str(&format!("&practitioner_id=eq.{}", actor));
        }
        let owned: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        if owned.len() != appointment_ids.len() {
            return Err(AppointmentError::Unauthorized);
        }

        let reordered: i64 = self
            .supabase
            .rpc(
                "reorder_queue",
                json!({ "p_appointment_ids": appointment_ids }),
                Some(auth_token),
            )
            .await?;

        info!(
            "Queue reordered: {} appointments for practitioner {}",
            reordered, actor
        );
        Ok(reordered as usize)
    }
}

/// Wait estimate for a 1-based queue position.
pub fn estimated_wait_minutes(position: usize) -> i64 {
    (position as i64 - 1).max(0) * MINUTES_PER_SLOT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_grows_fifteen_minutes_per_slot() {
        assert_eq!(estimated_wait_minutes(1), 0);
        assert_eq!(estimated_wait_minutes(2), 15);
        assert_eq!(estimated_wait_minutes(5), 60);
    }

    #[test]
    fn first_slot_never_waits() {
        assert_eq!(estimated_wait_minutes(0), 0);
    }
}
