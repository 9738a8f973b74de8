use chrono::{DateTime, Utc};

use crate::{
    domain::{Credential, CredentialRequest},
    utils::errors::Result,
};

/// Produces signed credentials. Implementations hold no per-request state.
pub trait CredentialIssuer: Send + Sync {
    fn issue(&self, request: &CredentialRequest, now: DateTime<Utc>) -> Result<Credential>;
}
