//! Card-scan identity-binding handshake domain.

pub mod domain;
pub mod error;
pub mod state_machine;

pub use domain::{
    ActionKind, ActionReceipt, GuardedPayload, PendingIdentity, ResolvedMember, SessionToken,
};
pub use error::{PayloadError, PreconditionError};
pub use state_machine::{
    FailureClass, FailureReason, HandshakeAction, HandshakeEvent, HandshakeOutcome,
    HandshakePolicy, HandshakeState, HandshakeStateMachine,
};
