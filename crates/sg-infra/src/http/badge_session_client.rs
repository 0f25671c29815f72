use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use sg_core::handshake::{PendingIdentity, ResolvedMember, SessionToken};
use sg_core::ids::{DeviceId, MemberId};
use sg_core::ports::{BadgeSessionPort, BindError, BoundSession, ReleaseError, VerifyError};

use super::endpoint;
use super::wire::{BindRequest, BindResponse, ErrorBody, VerifyRequest, VerifyResponse};

/// `BadgeSessionPort` against the backend's `/badge-sessions` resource.
///
/// Bind and verify wait as long as the backend does; they end early only
/// through the handshake's cancellation signal.
#[derive(Debug, Clone)]
pub struct HttpBadgeSessionClient {
    client: reqwest::Client,
    base_url: Url,
    release_timeout: Option<Duration>,
}

impl HttpBadgeSessionClient {
    pub fn new(client: reqwest::Client, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            release_timeout: None,
        }
    }

    /// Bound on the best-effort `DELETE` that releases a session.
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = Some(timeout);
        self
    }
}

fn map_bind_transport(error: reqwest::Error) -> BindError {
    if error.is_connect() || error.is_timeout() {
        BindError::Unreachable(error.to_string())
    } else {
        BindError::Transport(error.to_string())
    }
}

fn map_bind_status(status: StatusCode, device_id: &DeviceId, body: &ErrorBody) -> BindError {
    match status {
        StatusCode::NOT_FOUND => BindError::DeviceUnknown(device_id.to_string()),
        StatusCode::CONFLICT => BindError::DeviceBusy,
        status if status.is_server_error() => BindError::Unreachable(body.describe(status)),
        status => BindError::Transport(format!("{status}: {}", body.describe(status))),
    }
}

fn map_verify_status(status: StatusCode, body: &ErrorBody) -> VerifyError {
    if body.has_code("unknown_badge") {
        return VerifyError::UnknownBadge;
    }
    if body.has_code("session_expired") {
        return VerifyError::SessionExpired;
    }
    match status {
        StatusCode::NOT_FOUND => VerifyError::UnknownBadge,
        StatusCode::GONE => VerifyError::SessionExpired,
        status => VerifyError::Transport(format!("{status}: {}", body.describe(status))),
    }
}

fn pending_from(response: &BindResponse) -> Option<PendingIdentity> {
    match (&response.badge_user_ref, &response.badge_display_name) {
        (Some(user_ref), Some(display_name)) if !user_ref.trim().is_empty() => {
            Some(PendingIdentity {
                badge_user_ref: user_ref.clone(),
                badge_display_name: display_name.clone(),
            })
        }
        _ => None,
    }
}

#[async_trait]
impl BadgeSessionPort for HttpBadgeSessionClient {
    async fn bind_session(&self, device_id: &DeviceId) -> Result<BoundSession, BindError> {
        let url = endpoint(&self.base_url, &["badge-sessions"]);
        tracing::debug!(%url, %device_id, "POST bind session");

        let response = self
            .client
            .post(url)
            .json(&BindRequest {
                device_id: device_id.as_str(),
            })
            .send()
            .await
            .map_err(map_bind_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = ErrorBody::read(response).await;
            return Err(map_bind_status(status, device_id, &body));
        }

        let body: BindResponse = response
            .json()
            .await
            .map_err(|e| BindError::Transport(format!("invalid bind response: {e}")))?;
        Ok(BoundSession {
            pending: pending_from(&body),
            token: body.token,
        })
    }

    async fn verify_identity(
        &self,
        token: &SessionToken,
        pending: &PendingIdentity,
    ) -> Result<ResolvedMember, VerifyError> {
        let url = endpoint(&self.base_url, &["badge-sessions", &token.token, "verify"]);
        tracing::debug!(token = %token.redacted(), "POST verify identity");

        let response = self
            .client
            .post(url)
            .json(&VerifyRequest {
                badge_user_ref: &pending.badge_user_ref,
                badge_display_name: &pending.badge_display_name,
            })
            .send()
            .await
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = ErrorBody::read(response).await;
            return Err(map_verify_status(status, &body));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| VerifyError::Transport(format!("invalid verify response: {e}")))?;
        Ok(ResolvedMember {
            member_id: MemberId::from(body.member_id),
            member_name: body.member_name,
        })
    }

    async fn cancel_session(&self, token: &SessionToken) -> Result<(), ReleaseError> {
        let url = endpoint(&self.base_url, &["badge-sessions", &token.token]);
        tracing::debug!(token = %token.redacted(), "DELETE session");

        let mut request = self.client.delete(url);
        if let Some(timeout) = self.release_timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ReleaseError::Transport(e.to_string()))?;

        let status = response.status();
        // Already released or expired on the backend.
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(());
        }
        let body = ErrorBody::read(response).await;
        Err(ReleaseError::Transport(format!(
            "{status}: {}",
            body.describe(status)
        )))
    }
}
