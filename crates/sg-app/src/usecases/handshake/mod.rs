//! Card-scan handshake use cases.

pub mod cancellation;
pub mod config;
pub mod device_resolver;
pub mod events;
pub mod flow;
pub mod guarded_executor;
pub mod identity_verifier;
pub mod orchestrator;
pub mod session_binder;
#[cfg(test)]
pub(crate) mod test_support;

pub use cancellation::CancellationController;
pub use config::HandshakeConfig;
pub use device_resolver::DeviceResolver;
pub use events::{HandshakeDomainEvent, HandshakeEventPort};
pub use flow::HandshakeFlow;
pub use guarded_executor::GuardedActionExecutor;
pub use identity_verifier::IdentityVerifier;
pub use orchestrator::{HandshakeOrchestrator, HandshakeRequest};
pub use session_binder::{BoundToken, SessionBinder};
