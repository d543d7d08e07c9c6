use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What kind of record a notification points at.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Appointment,
    Withdrawal,
    Payment,
    SosAlert,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::Appointment => write!(f, "APPOINTMENT"),
            DocumentType::Withdrawal => write!(f, "WITHDRAWAL"),
            DocumentType::Payment => write!(f, "PAYMENT"),
            DocumentType::SosAlert => write!(f, "SOS_ALERT"),
        }
    }
}

/// A structured event handed to the dispatcher. Delivery is best-effort;
/// nothing downstream of a state change waits on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub user_id: Uuid,
    pub doc_id: Uuid,
    pub doc_type: DocumentType,
    pub action: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NotificationEvent {
    pub fn new(
        user_id: Uuid,
        doc_id: Uuid,
        doc_type: DocumentType,
        action: &str,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            user_id,
            doc_id,
            doc_type,
            action: action.to_string(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doc_type_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&DocumentType::SosAlert).unwrap(),
            "\"SOS_ALERT\""
        );
        assert_eq!(
            serde_json::to_string(&DocumentType::Withdrawal).unwrap(),
            "\"WITHDRAWAL\""
        );
    }

    #[test]
    fn event_carries_action_and_metadata() {
        let event = NotificationEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            DocumentType::Payment,
            "PAYMENT_APPROVED",
            json!({ "amount": 500.0 }),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["action"], "PAYMENT_APPROVED");
        assert_eq!(value["doc_type"], "PAYMENT");
        assert_eq!(value["metadata"]["amount"], 500.0);
    }
}
