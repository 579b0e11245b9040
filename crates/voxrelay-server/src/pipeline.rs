//! Per-request orchestration: upload, normalize, transcribe, forward, wait,
//! clean, synthesize.
//!
//! Every stage talks to a capability trait, so the whole flow runs against
//! fakes in tests. Degraded outcomes (conversion failure, synthesis failure,
//! failed echo, failed summary) are logged and absorbed here; only
//! transcription failure and gateway errors reach the caller.

use crate::config::Config;
use crate::multipart::UploadedPart;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use voxrelay_gateway::{
    ChatMessage, ConversationGateway, GatewayClient, GatewayConfig, GatewayError, ReplyMode,
    ReplyWaiter,
};
use voxrelay_types::{MessageRules, VoiceCatalog};
use voxrelay_voice::{
    filter_voices, AudioConverter, EdgeTtsSynthesizer, FfmpegConverter, SpeechSanitizer,
    SpeechSynthesizer, Transcriber, TranscriptionRouter, TtsService, VoiceError,
};

/// Transcripts shorter than this many characters count as silence.
const MIN_TRANSCRIPT_CHARS: usize = 2;

const DEFAULT_UPLOAD_EXTENSION: &str = "webm";

const SUMMARY_PROMPT: &str = "Summarize this in 1-2 short spoken sentences for someone driving. \
No markdown, no lists, just natural speech:";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, PipelineError::Gateway(e) if e.is_unauthorized())
    }
}

/// The body of a successful voice or text exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceReply {
    pub transcript: String,
    /// Speech-ready text; what `audio_url` says.
    pub reply: String,
    /// The agent's reply as it appeared in the session.
    pub full_reply: String,
    pub audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceOutcome {
    /// The transcript was empty or too short to forward.
    NoSpeech,
    Replied(VoiceReply),
}

/// The external engines the pipeline drives.
pub struct Capabilities {
    pub converter: Arc<dyn AudioConverter>,
    pub transcriber: Arc<dyn Transcriber>,
    pub gateway: Arc<dyn ConversationGateway>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Capabilities {
    /// Process- and HTTP-backed engines as configured.
    pub fn from_config(config: &Config, rules: Arc<MessageRules>) -> Result<Self, PipelineError> {
        let gateway = GatewayClient::new(config.gateway.clone(), rules)?;
        Ok(Self {
            converter: Arc::new(FfmpegConverter::from_config(&config.audio)),
            transcriber: Arc::new(TranscriptionRouter::from_config(&config.stt)),
            gateway: Arc::new(gateway),
            synthesizer: Arc::new(EdgeTtsSynthesizer::new(
                &config.tts.binary,
                std::time::Duration::from_secs(config.tts.timeout_secs),
            )),
        })
    }
}

pub struct VoicePipeline {
    converter: Arc<dyn AudioConverter>,
    transcriber: Arc<dyn Transcriber>,
    gateway: Arc<dyn ConversationGateway>,
    waiter: ReplyWaiter,
    tts: TtsService,
    sanitizer: SpeechSanitizer,
    rules: Arc<MessageRules>,
    gateway_config: GatewayConfig,
    no_response_text: String,
    temp_dir: PathBuf,
    voice_locales: Vec<String>,
}

impl VoicePipeline {
    pub fn new(capabilities: Capabilities, config: &Config, rules: Arc<MessageRules>) -> Self {
        let waiter = ReplyWaiter::new(
            Arc::clone(&capabilities.gateway),
            config.reply_wait.clone(),
            config.gateway.history_limit,
        );
        let tts = TtsService::new(
            capabilities.synthesizer,
            &config.tts.output_dir,
            &config.tts.url_prefix,
            &config.tts.default_voice,
            config.tts.max_chars,
        );

        Self {
            converter: capabilities.converter,
            transcriber: capabilities.transcriber,
            gateway: capabilities.gateway,
            waiter,
            tts,
            sanitizer: SpeechSanitizer::new((*rules).clone()),
            rules,
            gateway_config: config.gateway.clone(),
            no_response_text: config.reply_wait.no_response_text.clone(),
            temp_dir: config.storage.temp_dir.clone(),
            voice_locales: config.tts.voice_locales.clone(),
        }
    }

    pub fn tts(&self) -> &TtsService {
        &self.tts
    }

    /// Runs a recorded clip through the full pipeline.
    pub async fn handle_audio(
        &self,
        token: &str,
        audio: &UploadedPart,
        voice: Option<&str>,
    ) -> Result<VoiceOutcome, PipelineError> {
        let upload = self.store_upload(audio).await?;
        tracing::debug!(path = %upload.display(), bytes = audio.data.len(), "stored upload");

        let normalized = self.normalize_upload(&upload).await;
        let transcript = self.transcriber.transcribe(&normalized).await;
        remove_quietly(&normalized).await;
        let transcript = transcript?.trim().to_string();

        if transcript.chars().count() < MIN_TRANSCRIPT_CHARS {
            tracing::info!(chars = transcript.chars().count(), "no speech detected");
            return Ok(VoiceOutcome::NoSpeech);
        }
        tracing::info!(chars = transcript.chars().count(), "transcribed upload");

        self.respond(token, &transcript, voice)
            .await
            .map(VoiceOutcome::Replied)
    }

    /// Runs typed text through everything after transcription.
    pub async fn handle_text(
        &self,
        token: &str,
        message: &str,
        voice: Option<&str>,
    ) -> Result<VoiceReply, PipelineError> {
        self.respond(token, message.trim(), voice).await
    }

    pub async fn reset_session(&self, token: &str) -> Result<(), PipelineError> {
        self.gateway.reset_session(token).await?;
        Ok(())
    }

    /// Available synthesis voices in the configured locales.
    ///
    /// An engine failure yields an empty list rather than an error.
    pub async fn voice_catalog(&self) -> VoiceCatalog {
        let voices = match self.tts.synthesizer().list_voices().await {
            Ok(voices) => filter_voices(voices, &self.voice_locales),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list synthesis voices");
                Vec::new()
            }
        };
        VoiceCatalog {
            voices,
            default: self.tts.default_voice().to_string(),
        }
    }

    async fn store_upload(&self, audio: &UploadedPart) -> Result<PathBuf, PipelineError> {
        let extension = audio
            .filename
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(DEFAULT_UPLOAD_EXTENSION);
        let path = self.temp_dir.join(format!(
            "voice_{}.{}",
            chrono::Utc::now().timestamp_micros(),
            extension
        ));
        tokio::fs::write(&path, &audio.data).await?;
        Ok(path)
    }

    /// Converts the upload to wav, deleting the upload on success. On
    /// failure the upload itself is transcribed as-is.
    async fn normalize_upload(&self, upload: &Path) -> PathBuf {
        match self.converter.convert(upload).await {
            Ok(converted) => {
                remove_quietly(upload).await;
                converted
            }
            Err(e) => {
                tracing::warn!(error = %e, "audio conversion failed, transcribing raw upload");
                upload.to_path_buf()
            }
        }
    }

    async fn respond(
        &self,
        token: &str,
        text: &str,
        voice: Option<&str>,
    ) -> Result<VoiceReply, PipelineError> {
        self.spawn_echo(token, self.rules.transcript_echo(text));

        let full_reply = match self.gateway_config.reply_mode {
            ReplyMode::Poll => self
                .waiter
                .send_and_wait(token, text)
                .await?
                .into_text(&self.no_response_text),
            ReplyMode::Complete => self.complete(token, text).await?,
        };

        let cleaned = self.sanitizer.sanitize(&full_reply);
        let spoken = self.summarize(token, cleaned).await;

        let audio_url = if spoken.is_empty() {
            None
        } else {
            match self.tts.render(&spoken, voice).await {
                Ok(audio) => Some(audio.url_path),
                Err(e) => {
                    tracing::warn!(error = %e, "speech synthesis failed, replying without audio");
                    None
                }
            }
        };

        self.spawn_echo(token, self.rules.reply_echo(&full_reply));

        Ok(VoiceReply {
            transcript: text.to_string(),
            reply: spoken,
            full_reply,
            audio_url,
        })
    }

    /// Synchronous reply through chat completion, with recent history as
    /// context.
    async fn complete(&self, token: &str, text: &str) -> Result<String, PipelineError> {
        let history = match self
            .gateway
            .fetch_history(token, self.gateway_config.history_limit)
            .await
        {
            Ok(history) => history,
            Err(GatewayError::Unauthorized) => return Err(GatewayError::Unauthorized.into()),
            Err(e) => {
                tracing::warn!(error = %e, "history unavailable, completing without context");
                Vec::new()
            }
        };

        let mut messages = ChatMessage::from_history(&history);
        messages.push(ChatMessage::user(text));

        let reply = self
            .gateway
            .chat_complete(token, &messages, Some(&self.gateway_config.session_key))
            .await?;
        Ok(reply.unwrap_or_else(|| self.no_response_text.clone()))
    }

    /// Replaces a long reply with a short spoken summary when one is
    /// available and actually shorter.
    async fn summarize(&self, token: &str, cleaned: String) -> String {
        let threshold = self.gateway_config.summary_threshold_chars;
        if threshold == 0 || cleaned.chars().count() <= threshold {
            return cleaned;
        }

        let prompt = ChatMessage::user(format!("{}\n\n{}", SUMMARY_PROMPT, cleaned));
        match self.gateway.chat_complete(token, &[prompt], None).await {
            Ok(Some(summary)) => {
                let summary = self.sanitizer.sanitize(&summary);
                if !summary.is_empty() && summary.chars().count() < cleaned.chars().count() {
                    tracing::debug!(
                        from = cleaned.chars().count(),
                        to = summary.chars().count(),
                        "speaking summary"
                    );
                    return summary;
                }
                cleaned
            }
            Ok(None) => cleaned,
            Err(e) => {
                tracing::warn!(error = %e, "summary request failed, speaking full reply");
                cleaned
            }
        }
    }

    fn spawn_echo(&self, token: &str, text: String) {
        if !self.gateway_config.echo_enabled() {
            return;
        }
        let gateway = Arc::clone(&self.gateway);
        let token = token.to_string();
        tokio::spawn(async move {
            if let Err(e) = gateway.echo(&token, &text).await {
                tracing::warn!(error = %e, "side-channel echo failed");
            }
        });
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "failed to remove temp file");
        }
    }
}
