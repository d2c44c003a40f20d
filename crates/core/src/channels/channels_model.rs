//! Channel domain models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use stockclerk_channels::ChannelKind;

use crate::errors::{Error, Result, ValidationError};

/// A merchant's connection to one external sales surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub tenant_id: String,
    pub kind: ChannelKind,
    pub name: String,
    /// The vendor-side account/shop/location identifier. Webhooks are routed
    /// to the channel via `(tenant, kind, external_instance_id)`.
    pub external_instance_id: String,
    /// Sealed credential blob; see `secrets::SecretBox`.
    pub credentials_encrypted: String,
    pub webhook_secret: Option<String>,
    pub is_active: bool,
    pub last_sync_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// Input model for registering a new channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChannel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub tenant_id: String,
    pub kind: ChannelKind,
    pub name: String,
    pub external_instance_id: String,
    pub credentials_encrypted: String,
    pub webhook_secret: Option<String>,
}

impl NewChannel {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Channel name cannot be empty".to_string(),
            )));
        }
        if self.external_instance_id.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "externalInstanceId".to_string(),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_channel_requires_instance_id() {
        let channel = NewChannel {
            id: None,
            tenant_id: "t1".to_string(),
            kind: ChannelKind::Pos,
            name: "Front register".to_string(),
            external_instance_id: "  ".to_string(),
            credentials_encrypted: "blob".to_string(),
            webhook_secret: None,
        };
        assert!(channel.validate().is_err());
    }
}
