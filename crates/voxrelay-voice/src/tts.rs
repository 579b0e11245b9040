use crate::error::VoiceError;
use crate::process;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use voxrelay_types::VoiceInfo;

/// Appended to text cut short before synthesis.
const TRUNCATION_MARKER: &str = "...";

/// Renders text to an audio file using some synthesis engine.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Writes speech for `text` spoken by `voice` to `output`.
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<(), VoiceError>;

    /// Lists every voice the engine offers.
    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, VoiceError>;
}

/// Synthesizer backed by the `edge-tts` command line tool.
#[derive(Debug, Clone)]
pub struct EdgeTtsSynthesizer {
    binary: PathBuf,
    timeout: Duration,
}

impl EdgeTtsSynthesizer {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTtsSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<(), VoiceError> {
        let mut command = Command::new(&self.binary);
        command
            .arg("--voice")
            .arg(voice)
            .arg("--text")
            .arg(text)
            .arg("--write-media")
            .arg(output);

        if let Err(failure) = process::run(command, self.timeout).await {
            let _ = tokio::fs::remove_file(output).await;
            return Err(VoiceError::Tts(failure.describe("edge-tts")));
        }
        Ok(())
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, VoiceError> {
        let mut command = Command::new(&self.binary);
        command.arg("--list-voices");

        let output = process::run(command, self.timeout)
            .await
            .map_err(|f| VoiceError::Tts(f.describe("edge-tts")))?;

        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parses `edge-tts --list-voices` output.
///
/// Accepts both the older `Name: ...` / `Gender: ...` record format and the
/// tabular format (`Name  Gender  ...` header, dashed rule, one voice per row).
pub fn parse_voice_list(output: &str) -> Vec<VoiceInfo> {
    let mut voices = Vec::new();
    let mut pending: Option<String> = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Name:") {
            if let Some(prev) = pending.take() {
                voices.push(VoiceInfo::from_name(prev, None));
            }
            pending = Some(name.trim().to_string());
        } else if let Some(gender) = line.strip_prefix("Gender:") {
            if let Some(name) = pending.take() {
                voices.push(VoiceInfo::from_name(name, Some(gender.trim().to_string())));
            }
        } else {
            let mut columns = line.split_whitespace();
            let Some(name) = columns.next() else {
                continue;
            };
            if looks_like_voice_name(name) {
                let gender = columns.next().map(str::to_string);
                voices.push(VoiceInfo::from_name(name, gender));
            }
        }
    }

    if let Some(name) = pending {
        voices.push(VoiceInfo::from_name(name, None));
    }
    voices
}

fn looks_like_voice_name(token: &str) -> bool {
    token.matches('-').count() >= 2 && token.ends_with("Neural")
}

/// Keeps voices whose locale starts with one of `locales`, sorted by name.
/// An empty locale list keeps everything.
pub fn filter_voices(voices: Vec<VoiceInfo>, locales: &[String]) -> Vec<VoiceInfo> {
    let mut kept: Vec<VoiceInfo> = voices
        .into_iter()
        .filter(|v| locales.is_empty() || locales.iter().any(|l| v.locale.starts_with(l.as_str())))
        .collect();
    kept.sort_by(|a, b| a.name.cmp(&b.name));
    kept
}

/// Cuts `text` to at most `max_chars` characters, appending an ellipsis
/// marker when anything was removed.
pub fn truncate_for_speech(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars <= TRUNCATION_MARKER.len() {
        return text.chars().take(max_chars).collect();
    }
    let keep = max_chars - TRUNCATION_MARKER.len();
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str(TRUNCATION_MARKER);
    cut
}

/// A rendered reply waiting to be fetched by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub filename: String,
    pub url_path: String,
    pub created_at: DateTime<Utc>,
}

/// Owns the synthesis output directory and names files inside it.
#[derive(Clone)]
pub struct TtsService {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    output_dir: PathBuf,
    url_prefix: String,
    default_voice: String,
    max_chars: usize,
}

impl TtsService {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        output_dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        default_voice: impl Into<String>,
        max_chars: usize,
    ) -> Self {
        Self {
            synthesizer,
            output_dir: output_dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            default_voice: default_voice.into(),
            max_chars,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    pub fn synthesizer(&self) -> &Arc<dyn SpeechSynthesizer> {
        &self.synthesizer
    }

    /// Synthesizes `text` into a fresh file and returns where it can be fetched.
    ///
    /// Filenames embed a microsecond timestamp; two requests landing in the
    /// same microsecond would collide.
    pub async fn render(&self, text: &str, voice: Option<&str>) -> Result<SynthesizedAudio, VoiceError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VoiceError::Tts("nothing to synthesize".to_string()));
        }

        let voice = voice
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.default_voice);
        let text = truncate_for_speech(text, self.max_chars);

        let created_at = Utc::now();
        let filename = format!("reply_{}.mp3", created_at.timestamp_micros());
        let path = self.output_dir.join(&filename);

        self.synthesizer.synthesize(&text, voice, &path).await?;

        tracing::debug!(file = %filename, voice, chars = text.chars().count(), "synthesized reply");

        Ok(SynthesizedAudio {
            url_path: format!("{}/{}", self.url_prefix, filename),
            filename,
            created_at,
        })
    }
}
