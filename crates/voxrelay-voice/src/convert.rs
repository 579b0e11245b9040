//! Audio normalisation to a mono 16 kHz PCM wave file.

use crate::config::AudioConfig;
use crate::error::VoiceError;
use crate::process;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Converts an uploaded clip of arbitrary encoding into a transcription-ready
/// waveform, returning the path of the new file.
///
/// Implementations never delete `input`; the caller owns both files.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    async fn convert(&self, input: &Path) -> Result<PathBuf, VoiceError>;
}

/// Converter backed by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    binary: PathBuf,
    timeout: Duration,
}

impl FfmpegConverter {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(&config.ffmpeg_binary, config.timeout())
    }

    /// The converted file sits next to the input with a `.wav` suffix appended.
    pub fn output_path(input: &Path) -> PathBuf {
        let mut name = input.as_os_str().to_os_string();
        name.push(".wav");
        PathBuf::from(name)
    }
}

#[async_trait]
impl AudioConverter for FfmpegConverter {
    async fn convert(&self, input: &Path) -> Result<PathBuf, VoiceError> {
        let output_path = Self::output_path(input);

        let mut command = Command::new(&self.binary);
        command
            .arg("-i")
            .arg(input)
            .args(["-ar", "16000", "-ac", "1", "-f", "wav", "-y"])
            .arg(&output_path);

        match process::run(command, self.timeout).await {
            Ok(_) => {
                tracing::debug!(input = %input.display(), output = %output_path.display(), "converted upload to wav");
                Ok(output_path)
            }
            Err(failure) => {
                // A partial output file is useless to the caller.
                let _ = tokio::fs::remove_file(&output_path).await;
                Err(VoiceError::Convert(failure.describe("ffmpeg")))
            }
        }
    }
}
