use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::NotificationEvent;

/// Best-effort notification fan-out. State transitions enqueue an event and
/// return immediately; delivery failures are logged, never propagated.
#[derive(Clone)]
pub struct NotificationDispatcher {
    supabase: Arc<SupabaseClient>,
    service_role_key: String,
}

impl NotificationDispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, service_role_key: &str) -> Self {
        Self {
            supabase,
            service_role_key: service_role_key.to_string(),
        }
    }

    /// Fire-and-forget dispatch. Spawns the delivery so the caller's latency
    /// and correctness never depend on the notification backend.
    pub fn dispatch(&self, event: NotificationEvent) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.send(&event).await {
                warn!(
                    "Failed to deliver {} notification for user {}: {}",
                    event.action, event.user_id, e
                );
            }
        });
    }

    /// Synchronous delivery path, used directly by tests.
    pub async fn send(&self, event: &NotificationEvent) -> Result<(), String> {
        debug!(
            "Dispatching {} ({}) to user {}",
            event.action, event.doc_type, event.user_id
        );

        let body = json!({
            "user_id": event.user_id,
            "doc_id": event.doc_id,
            "doc_type": event.doc_type,
            "action": event.action,
            "metadata": event.metadata,
        });

        self.supabase
            .request_with_prefer::<Vec<Value>>(
                Method::POST,
                "/rest/v1/notifications",
                Some(&self.service_role_key),
                Some(body),
                Some("return=representation"),
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(())
    }
}
