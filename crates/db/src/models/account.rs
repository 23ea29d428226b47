//! Provider account rows.

use atelier_core::capability::Capability;
use atelier_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `accounts` table.
///
/// Account records are owned by the admin collaborator; the broker only
/// reads them. Secrets never serialize into API responses.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: DbId,
    pub name: String,
    pub video_endpoint_id: Option<String>,
    pub image_endpoint_id: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub edit_base_url: Option<String>,
    #[serde(skip_serializing)]
    pub edit_api_key: Option<String>,
    pub edit_model: Option<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Account {
    /// Whether this account carries the configuration a capability needs.
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Video => self.video_endpoint_id.is_some(),
            Capability::Image => self.image_endpoint_id.is_some(),
            Capability::Edit => self.edit_base_url.is_some() && self.edit_api_key.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account() -> Account {
        Account {
            id: 1,
            name: "primary".into(),
            video_endpoint_id: Some("ep-video".into()),
            image_endpoint_id: None,
            api_key: "k".into(),
            edit_base_url: Some("https://edit.example".into()),
            edit_api_key: None,
            edit_model: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn capability_support_follows_configuration() {
        let acc = account();
        assert!(acc.supports(Capability::Video));
        assert!(!acc.supports(Capability::Image));
        // Edit needs both a base URL and a key.
        assert!(!acc.supports(Capability::Edit));
    }

    #[test]
    fn secrets_do_not_serialize() {
        let json = serde_json::to_value(account()).unwrap();
        assert!(json.get("api_key").is_none());
        assert!(json.get("edit_api_key").is_none());
        assert_eq!(json["name"], "primary");
    }
}
