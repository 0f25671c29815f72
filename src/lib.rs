//! # ScanGate
//!
//! Card-scan identity binding for guarded club actions: recording a purchase,
//! saving a rating, confirming a lab result or authorizing a destruction only
//! happens after the backend resolved a tapped member card to a member.
//!
//! The domain and state machine live in `sg-core`, the use cases in `sg-app`,
//! the HTTP adapters in `sg-infra`. This crate assembles them.

pub mod bootstrap;

pub use bootstrap::{build_orchestrator, init_tracing_subscriber, load_config};
pub use sg_app::{
    GuardedForm, HandshakeConfig, HandshakeDomainEvent, HandshakeEventPort, HandshakeFlow,
    HandshakeOrchestrator, HandshakeRequest,
};
pub use sg_core::{AppConfig, HandshakeOutcome, HandshakeState};
