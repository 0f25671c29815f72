use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockall::mock;

use sg_core::handshake::{
    ActionReceipt, GuardedPayload, PendingIdentity, ResolvedMember, SessionToken,
};
use sg_core::ids::{DeviceId, LocationId, MemberId};
use sg_core::ports::{
    BadgeSessionPort, BindError, BoundSession, ClockPort, DeviceDirectoryError,
    DeviceDirectoryPort, GuardedActionError, GuardedActionPort, ReleaseError, VerifyError,
};

mock! {
    pub BadgeSessions {}

    #[async_trait]
    impl BadgeSessionPort for BadgeSessions {
        async fn bind_session(&self, device_id: &DeviceId) -> Result<BoundSession, BindError>;
        async fn verify_identity(
            &self,
            token: &SessionToken,
            pending: &PendingIdentity,
        ) -> Result<ResolvedMember, VerifyError>;
        async fn cancel_session(&self, token: &SessionToken) -> Result<(), ReleaseError>;
    }
}

mock! {
    pub GuardedActions {}

    #[async_trait]
    impl GuardedActionPort for GuardedActions {
        async fn execute(
            &self,
            token: &SessionToken,
            member: &ResolvedMember,
            payload: &GuardedPayload,
        ) -> Result<ActionReceipt, GuardedActionError>;
    }
}

/// Badge backend that never answers.
pub struct StalledBadgeSessions;

#[async_trait]
impl BadgeSessionPort for StalledBadgeSessions {
    async fn bind_session(&self, _device_id: &DeviceId) -> Result<BoundSession, BindError> {
        std::future::pending().await
    }

    async fn verify_identity(
        &self,
        _token: &SessionToken,
        _pending: &PendingIdentity,
    ) -> Result<ResolvedMember, VerifyError> {
        std::future::pending().await
    }

    async fn cancel_session(&self, _token: &SessionToken) -> Result<(), ReleaseError> {
        Ok(())
    }
}

/// Directory with a single mapped location.
pub struct OneReader {
    pub location: &'static str,
    pub device: &'static str,
}

#[async_trait]
impl DeviceDirectoryPort for OneReader {
    async fn reader_for(
        &self,
        location: &LocationId,
    ) -> Result<Option<DeviceId>, DeviceDirectoryError> {
        Ok((location.as_str() == self.location).then(|| DeviceId::from(self.device)))
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(Utc.with_ymd_and_hms(2026, 4, 20, 16, 20, 0).unwrap())
    }
}

impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn token(value: &str) -> SessionToken {
    SessionToken::new(value, DeviceId::from("D1"), FixedClock::default().0)
}

pub fn pending() -> PendingIdentity {
    PendingIdentity {
        badge_user_ref: "badge-42".to_string(),
        badge_display_name: "alice-badge".to_string(),
    }
}

pub fn alice() -> ResolvedMember {
    ResolvedMember {
        member_id: MemberId::from("m-7"),
        member_name: "Alice".to_string(),
    }
}
