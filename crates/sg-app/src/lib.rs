//! ScanGate application layer
//!
//! Handshake use cases: device resolution, session binding, identity
//! verification, cancellation, guarded execution and the flow that
//! sequences them.

pub mod deps;
pub mod usecases;

pub use deps::HandshakeDeps;
pub use usecases::guarded::{
    DestructionForm, GuardedForm, LabResultForm, PurchaseForm, PurchaseLine, RatingForm,
};
pub use usecases::handshake::{
    HandshakeConfig, HandshakeDomainEvent, HandshakeEventPort, HandshakeFlow,
    HandshakeOrchestrator, HandshakeRequest,
};
