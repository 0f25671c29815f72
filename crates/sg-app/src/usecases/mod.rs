pub mod guarded;
pub mod handshake;
