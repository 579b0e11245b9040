use crate::config::SttConfig;
use crate::error::VoiceError;
use crate::process;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Turns a normalized audio file into text.
///
/// An empty string means no speech was recognised; that is not an error.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn transcribe(&self, audio: &Path) -> Result<String, VoiceError>;
}

/// Remote OpenAI-compatible transcription endpoint.
#[derive(Debug, Clone)]
pub struct CloudTranscriber {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl CloudTranscriber {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SttConfig) -> Self {
        Self::new(
            &config.api_url,
            &config.api_key,
            &config.model,
            Duration::from_secs(config.cloud_timeout_secs),
        )
    }
}

/// Extracts the transcript from a transcription API response body.
fn parse_cloud_response(status: reqwest::StatusCode, body: &str) -> Result<String, VoiceError> {
    let json: Value = serde_json::from_str(body).map_err(|e| {
        VoiceError::Stt(format!(
            "malformed transcription response (HTTP {}): {}",
            status, e
        ))
    })?;

    if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(VoiceError::Stt(format!("transcription API error: {}", message)));
    }

    if !status.is_success() {
        return Err(VoiceError::Stt(format!(
            "transcription API returned HTTP {}",
            status
        )));
    }

    json.get("text")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_string())
        .ok_or_else(|| VoiceError::Stt("transcription response has no text field".to_string()))
}

#[async_trait]
impl Transcriber for CloudTranscriber {
    fn name(&self) -> &'static str {
        "cloud"
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, VoiceError> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("model", self.model.clone())
            .text("response_format", "json");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| VoiceError::Stt(format!("transcription request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VoiceError::Stt(format!("failed to read transcription body: {}", e)))?;

        parse_cloud_response(status, &body)
    }
}

/// Local whisper.cpp style binary run against a fixed model file.
#[derive(Debug, Clone)]
pub struct LocalTranscriber {
    binary: PathBuf,
    model_path: PathBuf,
    timeout: Duration,
}

impl LocalTranscriber {
    pub fn new(binary: impl Into<PathBuf>, model_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            model_path: model_path.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SttConfig) -> Self {
        Self::new(
            &config.whisper_binary,
            &config.model_path,
            Duration::from_secs(config.local_timeout_secs),
        )
    }
}

#[async_trait]
impl Transcriber for LocalTranscriber {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, VoiceError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("--no-timestamps")
            .arg("-np")
            .arg("-f")
            .arg(audio);

        let output = process::run(command, self.timeout)
            .await
            .map_err(|f| VoiceError::Stt(f.describe("whisper")))?;

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Tries the cloud strategy first (when configured) and falls back to the
/// local strategy on any cloud failure. Cloud errors are logged, never
/// returned; a local failure is returned as-is.
#[derive(Clone)]
pub struct TranscriptionRouter {
    cloud: Option<Arc<dyn Transcriber>>,
    local: Arc<dyn Transcriber>,
}

impl TranscriptionRouter {
    pub fn new(cloud: Option<Arc<dyn Transcriber>>, local: Arc<dyn Transcriber>) -> Self {
        Self { cloud, local }
    }

    pub fn from_config(config: &SttConfig) -> Self {
        let cloud: Option<Arc<dyn Transcriber>> = if config.cloud_enabled() {
            Some(Arc::new(CloudTranscriber::from_config(config)))
        } else {
            None
        };
        Self::new(cloud, Arc::new(LocalTranscriber::from_config(config)))
    }
}

#[async_trait]
impl Transcriber for TranscriptionRouter {
    fn name(&self) -> &'static str {
        "router"
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, VoiceError> {
        if let Some(cloud) = &self.cloud {
            match cloud.transcribe(audio).await {
                Ok(text) => {
                    tracing::debug!(strategy = cloud.name(), chars = text.len(), "transcribed");
                    return Ok(text);
                }
                Err(e) => {
                    tracing::warn!(
                        strategy = cloud.name(),
                        error = %e,
                        "cloud transcription failed, falling back to local"
                    );
                }
            }
        }

        let text = self.local.transcribe(audio).await?;
        tracing::debug!(strategy = self.local.name(), chars = text.len(), "transcribed");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        result: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn ok(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(text),
                calls: AtomicUsize::new(0),
            })
        }

        fn err(msg: &'static str) -> Arc<Self> {
            Arc::new(Self {
                result: Err(msg),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transcriber for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn transcribe(&self, _audio: &Path) -> Result<String, VoiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .map(str::to_string)
                .map_err(|m| VoiceError::Stt(m.to_string()))
        }
    }

    #[tokio::test]
    async fn cloud_failure_falls_back_to_local() {
        let cloud = Fixed::err("503 from provider");
        let local = Fixed::ok("hello");
        let router = TranscriptionRouter::new(Some(cloud.clone()), local.clone());

        let text = router.transcribe(Path::new("clip.wav")).await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 1);
        assert_eq!(local.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cloud_success_skips_local() {
        let cloud = Fixed::ok("from cloud");
        let local = Fixed::ok("from local");
        let router = TranscriptionRouter::new(Some(cloud), local.clone());

        assert_eq!(
            router.transcribe(Path::new("clip.wav")).await.unwrap(),
            "from cloud"
        );
        assert_eq!(local.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_cloud_uses_local_only() {
        let router = TranscriptionRouter::new(None, Fixed::ok("local"));
        assert_eq!(
            router.transcribe(Path::new("clip.wav")).await.unwrap(),
            "local"
        );
    }

    #[tokio::test]
    async fn both_failing_returns_local_error() {
        let router =
            TranscriptionRouter::new(Some(Fixed::err("cloud down")), Fixed::err("model missing"));
        match router.transcribe(Path::new("clip.wav")).await {
            Err(VoiceError::Stt(msg)) => assert_eq!(msg, "model missing"),
            other => panic!("expected local error, got {:?}", other),
        }
    }

    #[test]
    fn parses_text_field() {
        let text = parse_cloud_response(StatusCode::OK, r#"{"text":"  hello world "}"#).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn api_error_field_aborts() {
        let result = parse_cloud_response(
            StatusCode::OK,
            r#"{"error":{"message":"invalid api key"}}"#,
        );
        match result {
            Err(VoiceError::Stt(msg)) => assert!(msg.contains("invalid api key")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_cloud_response(StatusCode::OK, "<html>").is_err());
        assert!(parse_cloud_response(StatusCode::OK, r#"{"segments":[]}"#).is_err());
        assert!(parse_cloud_response(StatusCode::BAD_GATEWAY, r#"{"text":"x"}"#).is_err());
    }
}
