//! Upload heap settings

use super::FenceQueue;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Sizing and policy for the upload heap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Size of the backing block in bytes.
    pub capacity: usize,
    /// Alignment of the block base; caps per-allocation alignment.
    pub base_alignment: usize,
    /// Alignment used by callers that don't ask for one.
    pub default_alignment: usize,
    /// Warn when a single frame uploads more than this.
    pub frame_budget: Option<usize>,
    /// Give up waiting on the GPU after this long.
    pub wait_timeout_ms: Option<u64>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            capacity: 4 * 1024 * 1024,
            base_alignment: 256,
            default_alignment: 16,
            frame_budget: None,
            wait_timeout_ms: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("capacity must be non-zero")]
    ZeroCapacity,

    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: usize },

    #[error("default alignment {default_alignment} exceeds base alignment {base_alignment}")]
    AlignmentMismatch {
        default_alignment: usize,
        base_alignment: usize,
    },
}

impl UploadSettings {
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.capacity == 0 {
            return Err(SettingsError::ZeroCapacity);
        }
        for (field, value) in [
            ("base_alignment", self.base_alignment),
            ("default_alignment", self.default_alignment),
        ] {
            if !value.is_power_of_two() {
                return Err(SettingsError::NotPowerOfTwo { field, value });
            }
        }
        if self.default_alignment > self.base_alignment {
            return Err(SettingsError::AlignmentMismatch {
                default_alignment: self.default_alignment,
                base_alignment: self.base_alignment,
            });
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Fence queue honouring the configured wait timeout.
    pub fn fence_queue(&self) -> FenceQueue {
        match self.wait_timeout() {
            Some(timeout) => FenceQueue::new().with_timeout(timeout),
            None => FenceQueue::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings = UploadSettings::from_json(r#"{ "capacity": 65536 }"#).unwrap();
        assert_eq!(settings.capacity, 65536);
        assert_eq!(settings.base_alignment, 256);
        assert_eq!(settings.frame_budget, None);
    }

    #[test]
    fn parses_every_field() {
        let json = r#"{
            "capacity": 1048576,
            "base_alignment": 512,
            "default_alignment": 64,
            "frame_budget": 262144,
            "wait_timeout_ms": 250
        }"#;
        let settings = UploadSettings::from_json(json).unwrap();
        assert_eq!(settings.frame_budget, Some(262144));
        assert_eq!(settings.wait_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            UploadSettings::from_json(r#"{ "capacity": 0 }"#),
            Err(SettingsError::ZeroCapacity)
        ));
        assert!(matches!(
            UploadSettings::from_json(r#"{ "base_alignment": 100 }"#),
            Err(SettingsError::NotPowerOfTwo { field: "base_alignment", value: 100 })
        ));
        assert!(matches!(
            UploadSettings::from_json(r#"{ "default_alignment": 1024 }"#),
            Err(SettingsError::AlignmentMismatch { .. })
        ));
        assert!(matches!(
            UploadSettings::from_json("not json"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn fence_queue_uses_configured_timeout() {
        use crate::memory::{ExecutionQueue, QueueError};

        let settings = UploadSettings {
            wait_timeout_ms: Some(5),
            ..UploadSettings::default()
        };
        let fence = settings.fence_queue();
        let tag = fence.submit();
        assert!(matches!(
            fence.wait_until_retired(tag),
            Err(QueueError::Timeout { .. })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = UploadSettings::load("/nonexistent/upload.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/upload.json"));
    }

    #[test]
    fn defaults_round_trip_through_json() {
        let json = serde_json::to_string(&UploadSettings::default()).unwrap();
        assert_eq!(UploadSettings::from_json(&json).unwrap(), UploadSettings::default());
    }
}
