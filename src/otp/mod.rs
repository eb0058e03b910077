//! One-time passcode challenges: generation, storage, cooldown, attempt limiting and verification

pub mod keys;
pub mod secret;
pub mod service;

pub use keys::ChallengeKeys;
pub use service::{OtpConfig, OtpRequestAck, OtpService, OTP_SENT_MESSAGE};
