pub mod credential_issuer;
pub mod livekit_service;

pub use credential_issuer::*;
pub use livekit_service::*;
