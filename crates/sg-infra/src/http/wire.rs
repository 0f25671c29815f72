//! Wire DTOs of the badge backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct BindRequest<'a> {
    pub device_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BindResponse {
    pub token: String,
    #[serde(default)]
    pub badge_user_ref: Option<String>,
    #[serde(default)]
    pub badge_display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyRequest<'a> {
    pub badge_user_ref: &'a str,
    pub badge_display_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyResponse {
    pub member_id: String,
    pub member_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ActionResponse {
    #[serde(default, alias = "id")]
    pub record_id: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Error body `{code, message}`; both fields optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub async fn read(response: reqwest::Response) -> Self {
        response.json::<ErrorBody>().await.unwrap_or_default()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }

    pub fn describe(&self, status: reqwest::StatusCode) -> String {
        match (&self.code, &self.message) {
            (_, Some(message)) if !message.is_empty() => message.clone(),
            (Some(code), _) => code.clone(),
            _ => status.to_string(),
        }
    }
}
