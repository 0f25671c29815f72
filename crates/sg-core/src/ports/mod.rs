//! Port interfaces for the application layer
//!
//! Ports define the contract between the handshake use cases and the
//! infrastructure that talks to the device gateway and the backend.

mod badge_session;
mod clock;
mod device_directory;
pub mod errors;
mod guarded_action;

pub use badge_session::{BadgeSessionPort, BoundSession};
pub use clock::ClockPort;
pub use device_directory::DeviceDirectoryPort;
pub use errors::{BindError, DeviceDirectoryError, GuardedActionError, ReleaseError, VerifyError};
pub use guarded_action::GuardedActionPort;
