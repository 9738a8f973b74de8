use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

use crate::{errors::DeviceError, traits::MicrophoneAccess};

const DEFAULT_DEVICE_DIR: &str = "/dev/snd";

/// Probes ALSA capture nodes (`pcmC<card>D<device>c`).
///
/// The first capture node is opened and closed straight away; the open result
/// decides between granted, denied and missing.
#[derive(Debug, Clone)]
pub struct SystemMicrophone {
    device_dir: PathBuf,
}

impl Default for SystemMicrophone {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_DIR)
    }
}

impl SystemMicrophone {
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    async fn capture_nodes(&self) -> Result<Vec<PathBuf>, DeviceError> {
        let mut entries = match tokio::fs::read_dir(&self.device_dir).await {
            Ok(entries) => entries,
            Err(e) => return Err(classify(e)),
        };

        let mut nodes = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(classify)? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("pcmC") && name.ends_with('c') {
                nodes.push(entry.path());
            }
        }
        nodes.sort();
        Ok(nodes)
    }
}

#[async_trait]
impl MicrophoneAccess for SystemMicrophone {
    async fn probe(&self) -> Result<(), DeviceError> {
        let nodes = self.capture_nodes().await?;
        let node = nodes.first().ok_or(DeviceError::NotFound)?;

        debug!("Probing capture device {}", node.display());
        let handle = tokio::fs::File::open(node).await.map_err(classify)?;
        drop(handle);
        Ok(())
    }
}

fn classify(err: std::io::Error) -> DeviceError {
    match err.kind() {
        ErrorKind::PermissionDenied => DeviceError::PermissionDenied,
        ErrorKind::NotFound => DeviceError::NotFound,
        _ => DeviceError::Other(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "voice-client-mic-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let mic = SystemMicrophone::new("/nonexistent/voice-client/snd");
        assert_matches!(mic.probe().await, Err(DeviceError::NotFound));
    }

    #[tokio::test]
    async fn playback_only_nodes_are_not_found() {
        let dir = scratch_dir("playback");
        std::fs::write(dir.join("pcmC0D0p"), b"").unwrap();
        std::fs::write(dir.join("controlC0"), b"").unwrap();

        let mic = SystemMicrophone::new(&dir);
        assert_matches!(mic.probe().await, Err(DeviceError::NotFound));
    }

    #[tokio::test]
    async fn readable_capture_node_is_granted() {
        let dir = scratch_dir("capture");
        std::fs::write(dir.join("pcmC0D0c"), b"").unwrap();

        let mic = SystemMicrophone::new(&dir);
        assert!(mic.probe().await.is_ok());
    }

    #[test]
    fn io_errors_map_to_causes() {
        assert_eq!(
            classify(std::io::Error::from(ErrorKind::PermissionDenied)),
            DeviceError::PermissionDenied
        );
        assert_matches!(
            classify(std::io::Error::new(ErrorKind::Other, "busy")),
            DeviceError::Other(msg) if msg == "busy"
        );
    }
}
