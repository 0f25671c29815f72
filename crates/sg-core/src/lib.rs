//! # sg-core
//!
//! Core domain models and the pure handshake state machine for ScanGate.
//!
//! This crate contains pure business logic without any infrastructure dependencies.

pub mod config;
pub mod handshake;
pub mod ids;
pub mod ports;

// Re-export commonly used types at the crate root
pub use config::AppConfig;
pub use handshake::{
    GuardedPayload, HandshakeOutcome, HandshakeState, ResolvedMember, SessionToken,
};
pub use ids::{AttemptId, DeviceId, LocationId, MemberId};
