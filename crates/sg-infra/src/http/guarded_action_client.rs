use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{StatusCode, Url};

use sg_core::handshake::{ActionKind, ActionReceipt, GuardedPayload, ResolvedMember, SessionToken};
use sg_core::ports::{GuardedActionError, GuardedActionPort};

use super::endpoint;
use super::wire::{ActionResponse, ErrorBody};

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Domain write endpoints, one per guarded action.
#[derive(Debug, Clone)]
pub struct HttpGuardedActionClient {
    client: reqwest::Client,
    base_url: Url,
    timeout: Option<Duration>,
}

impl HttpGuardedActionClient {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            timeout: None,
        }
    }

    /// Bound on each write. A timed-out write fails the handshake; the
    /// idempotency key makes a restarted write safe.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn path(kind: ActionKind) -> &'static [&'static str] {
        match kind {
            ActionKind::RecordPurchase => &["purchases"],
            ActionKind::SaveRating => &["ratings"],
            ActionKind::ConfirmLabResult => &["lab-results", "confirm"],
            ActionKind::AuthorizeDestruction => &["destructions", "authorize"],
        }
    }
}

fn map_action_status(status: StatusCode, body: &ErrorBody) -> GuardedActionError {
    if status == StatusCode::CONFLICT && body.has_code("already_consumed") {
        return GuardedActionError::AlreadyConsumed;
    }
    if status.is_client_error() {
        GuardedActionError::Rejected(body.describe(status))
    } else {
        GuardedActionError::Transport(format!("{status}: {}", body.describe(status)))
    }
}

#[async_trait]
impl GuardedActionPort for HttpGuardedActionClient {
    async fn execute(
        &self,
        token: &SessionToken,
        member: &ResolvedMember,
        payload: &GuardedPayload,
    ) -> Result<ActionReceipt, GuardedActionError> {
        let kind = payload.kind();
        let url = endpoint(&self.base_url, Self::path(kind));
        tracing::debug!(%url, action = %kind, member_id = %member.member_id, "POST guarded action");

        let mut request = self
            .client
            .post(url)
            .header(IDEMPOTENCY_KEY, token.token.as_str())
            .json(&payload.to_request_body(&member.member_id));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| GuardedActionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = ErrorBody::read(response).await;
            return Err(map_action_status(status, &body));
        }

        // Some endpoints answer 204 without a body.
        let body = response.bytes().await.unwrap_or_default();
        let parsed: ActionResponse = if body.is_empty() {
            ActionResponse::default()
        } else {
            serde_json::from_slice(&body)
                .map_err(|e| GuardedActionError::Transport(format!("invalid action response: {e}")))?
        };

        Ok(ActionReceipt {
            kind,
            member_id: member.member_id.clone(),
            record_id: parsed.record_id,
            completed_at: parsed.completed_at.unwrap_or_else(Utc::now),
        })
    }
}
