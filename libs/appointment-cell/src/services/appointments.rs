// libs/appointment-cell/src/services/appointments.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_utils::time::regional_now;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, CreateAppointmentRequest, MyAppointments,
    PaymentRecord, ServiceLine, ServiceRow, UpdateAppointmentRequest,
};
use crate::services::lifecycle;

/// Appointment CRUD and the simple lifecycle moves (accept, cancel, soft
/// delete). The two-key completion path lives in the completion service.
pub struct AppointmentService {
    supabase: Arc<SupabaseClient>,
}

impl AppointmentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn find_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&is_deleted=is.false",
            appointment_id
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    fn authorize_view(appointment: &Appointment, user: &User) -> Result<(), AppointmentError> {
        if user.is_admin() {
            return Ok(());
        }
        let actor = user.id.as_str();
        let is_patient = appointment.patient_id.to_string() == actor;
        let is_practitioner = appointment
            .practitioner_id
            .map(|id| id.to_string() == actor)
            .unwrap_or(false);

        if is_patient || is_practitioner {
            Ok(())
        } else {
            Err(AppointmentError::Unauthorized)
        }
    }

    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let actor = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::ValidationError("Invalid actor id".to_string()))?;

        // Patients book for themselves; practitioners and admins must name
        // the patient.
        let patient_id = if user.is_patient() {
            actor
        } else {
            request.patient_id.ok_or_else(|| {
                AppointmentError::ValidationError("patient_id is required".to_string())
            })?
        };

        if request.service_ids.is_empty() {
            return Err(AppointmentError::ValidationError(
                "At least one service is required".to_string(),
            ));
        }

        let payment = self
            .price_services(&request.service_ids, request.is_home_care, auth_token)
            .await?;
        let status = lifecycle::initial_status(request.is_home_care);

        let body = json!({
            "patient_id": patient_id,
            "practitioner_id": request.practitioner_id,
            "service_ids": request.service_ids,
            "date": request.date,
            "time": request.time,
            "status": status,
            "is_remote": request.is_remote,
            "is_home_care": request.is_home_care,
            "payment": payment,
            "notes": request.notes,
        });

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_prefer(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some("return=representation"),
            )
            .await?;

        let appointment = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Insert returned no row".to_string())
        })?;

        info!(
            "Appointment {} created for patient {} ({}, estimated {})",
            appointment.id, patient_id, status, appointment.payment.estimated_amount
        );
        Ok(appointment)
    }

    /// Price the requested services. The visit fee only applies to home-care
    /// appointments; the 10% platform fee always does.
    async fn price_services(
        &self,
        service_ids: &[Uuid],
        is_home_care: bool,
        auth_token: &str,
    ) -> Result<PaymentRecord, AppointmentError> {
        let path = format!(
            "/rest/v1/services?id=in.({})&select=id,name,price,home_care_fee",
            service_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        let rows: Vec<ServiceRow> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;
        let priced: HashMap<Uuid, &ServiceRow> = rows.iter().map(|row| (row.id, row)).collect();

        let mut breakdown = Vec::with_capacity(service_ids.len());
        for service_id in service_ids {
            let row = priced.get(service_id).ok_or_else(|| {
                AppointmentError::ValidationError(format!("Unknown service {}", service_id))
            })?;
            breakdown.push(ServiceLine {
                service_id: *service_id,
                base_price: row.price,
                fee: if is_home_care { row.home_care_fee } else { 0.0 },
            });
        }

        Ok(PaymentRecord::pending(breakdown))
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.find_appointment(appointment_id, auth_token).await?;
        Self::authorize_view(&appointment, user)?;
        Ok(appointment)
    }

    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        mut patch: UpdateAppointmentRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.find_appointment(appointment_id, auth_token).await?;
        Self::authorize_view(&appointment, user)?;

        // Patients cannot drive the lifecycle or practitioner-side fields.
        if user.is_patient() {
            patch.status = None;
            patch.is_present = None;
            patch.queue_order = None;
        }

        if let Some(status) = patch.status {
            lifecycle::validate_transition(appointment.status, status)?;
        }

        let mut body = Map::new();
        if let Some(date) = patch.date {
            body.insert("date".to_string(), json!(date));
        }
        if let Some(time) = patch.time {
            body.insert("time".to_string(), json!(time));
        }
        if let Some(status) = patch.status {
            body.insert("status".to_string(), json!(status));
        }
        if let Some(is_present) = patch.is_present {
            body.insert("is_present".to_string(), json!(is_present));
        }
        if let Some(queue_order) = patch.queue_order {
            body.insert("queue_order".to_string(), json!(queue_order));
        }
        if let Some(notes) = patch.notes {
            body.insert("notes".to_string(), json!(notes));
        }
        if body.is_empty() {
            debug!("Appointment {} patch had no applicable fields", appointment_id);
            return Ok(appointment);
        }
        body.insert("updated_at".to_string(), json!(Utc::now()));

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&is_deleted=is.false",
            appointment_id
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_prefer(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(body)),
                Some("return=representation"),
            )
            .await?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    /// Practitioner accepts a booking. Accepting an unassigned home-care
    /// request also claims it; the status filter makes two practitioners
    /// racing for one request resolve to a single winner.
    pub async fn accept_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !user.is_practitioner() && !user.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }
        let actor = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::ValidationError("Invalid actor id".to_string()))?;

        let appointment = self.find_appointment(appointment_id, auth_token).await?;

        let claims_request = match appointment.practitioner_id {
            Some(assigned) => {
                if assigned != actor && !user.is_admin() {
                    return Err(AppointmentError::Unauthorized);
                }
                false
            }
            None => {
                if !appointment.is_home_care {
                    return Err(AppointmentError::ValidationError(
                        "Appointment has no practitioner assigned".to_string(),
                    ));
                }
                true
            }
        };

        lifecycle::validate_transition(appointment.status, AppointmentStatus::Confirmed)?;

        let mut body = json!({
            "status": AppointmentStatus::Confirmed,
            "updated_at": Utc::now(),
        });
        if claims_request {
            body["practitioner_id"] = json!(actor);
        }

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
                Some(body),
                Some("return=representation"),
            )
            .await?;

        let accepted = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::Conflict("Appointment was claimed or updated concurrently".to_string())
        })?;

        info!(
            "Appointment {} accepted by practitioner {}",
            appointment_id, actor
        );
        Ok(accepted)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.find_appointment(appointment_id, auth_token).await?;
        Self::authorize_view(&appointment, user)?;
        lifecycle::validate_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let audit = format!(
            "Cancelled by {} ({}): {}",
            user.role.as_deref().unwrap_or("unknown"),
            user.id,
            reason.as_deref().unwrap_or("no reason given")
        );
        let notes = match &appointment.notes {
            Some(existing) => format!("{}\n{}", existing, audit),
            None => audit,
        };

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
                    "status": AppointmentStatus::Cancelled,
                    "notes": notes,
                    "updated_at": Utc::now(),
                })),
                Some("return=representation"),
            )
            .await?;

        let cancelled = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::Conflict("Appointment was updated concurrently".to_string())
        })?;

        info!("Appointment {} cancelled by {}", appointment_id, user.id);
        Ok(cancelled)
    }

    pub async fn delete_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        if !user.is_admin() {
            return Err(AppointmentError::Unauthorized);
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&is_deleted=is.false",
            appointment_id
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_prefer(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({
                    "is_deleted": true,
                    "updated_at": Utc::now(),
                })),
                Some("return=representation"),
            )
            .await?;

        if rows.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        info!("Appointment {} soft-deleted", appointment_id);
        Ok(())
    }

    /// Actor-scoped listing split into upcoming and archive by the regional
    /// clock. Terminal appointments always land in the archive.
    pub async fn list_my(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<MyAppointments, AppointmentError> {
        let actor = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::ValidationError("Invalid actor id".to_string()))?;

        let scope = if user.is_practitioner() {
            format!("practitioner_id=eq.{}", actor)
        } else {
            format!("patient_id=eq.{}", actor)
        };
        let path = format!(
            "/rest/v1/appointments?{}&is_deleted=is.false&order=date.asc,time.asc",
            scope
        );
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let now = regional_now();
        let today = now.date_naive();
        let now_time = now.time();

        let (next, archive) = rows.into_iter().partition(|appointment| {
            !appointment.status.is_terminal()
                && (appointment.date > today
                    || (appointment.date == today && appointment.time >= now_time))
        });

        Ok(MyAppointments { next, archive })
    }
}
