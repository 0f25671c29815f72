//! ID type wrappers for type safety.

pub mod attempt_id;
pub mod device_id;
mod id_macro;
pub mod location_id;
pub mod member_id;

pub use attempt_id::AttemptId;
pub use device_id::DeviceId;
pub use location_id::LocationId;
pub use member_id::MemberId;
