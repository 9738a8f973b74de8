use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    errors::{DeviceError, Result},
    events::MediaEvent,
    models::Credential,
};

/// Where session credentials come from
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_credential(&self) -> Result<Credential>;
}

/// Capability set the controller needs from the external media SDK.
///
/// `connect` hands back the lifecycle event stream for the new session; the
/// stream ending is treated like a `Disconnected` event.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Resolves once the SDK can be used. The controller bounds this wait.
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn connect(&self, credential: &Credential)
        -> Result<mpsc::UnboundedReceiver<MediaEvent>>;

    /// Must be safe to call when not connected.
    async fn disconnect(&self) -> Result<()>;

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<()>;

    /// Mutes or unmutes local playback of one remote track. Local only.
    async fn set_output_muted(&self, track_sid: &str, muted: bool) -> Result<()>;
}

/// Capture-device permission check
#[async_trait]
pub trait MicrophoneAccess: Send + Sync {
    /// Acquires the capture device once and releases it immediately.
    async fn probe(&self) -> std::result::Result<(), DeviceError>;
}
