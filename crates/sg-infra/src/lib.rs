//! # sg-infra
//!
//! Adapters behind the `sg-core` ports: the badge backend over HTTP,
//! the guarded write endpoints, the room → reader directory and the clock.

pub mod clock;
pub mod device;
pub mod http;

pub use clock::SystemClock;
pub use device::StaticDeviceDirectory;
pub use http::{
    build_http_client, HttpBackendConfig, HttpBadgeSessionClient, HttpGuardedActionClient,
};
