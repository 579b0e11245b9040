use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

fn default_ffmpeg_binary() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_convert_timeout_secs() -> u64 {
    15
}

fn default_stt_api_url() -> String {
    "https://api.groq.com/openai/v1/audio/transcriptions".to_string()
}

fn default_stt_model() -> String {
    "whisper-large-v3-turbo".to_string()
}

fn default_stt_timeout_secs() -> u64 {
    30
}

fn default_whisper_binary() -> PathBuf {
    PathBuf::from("whisper-cli")
}

fn default_whisper_model() -> PathBuf {
    PathBuf::from("models/ggml-base.en.bin")
}

fn default_tts_binary() -> PathBuf {
    PathBuf::from("edge-tts")
}

fn default_voice() -> String {
    "en-US-AriaNeural".to_string()
}

fn default_tts_output_dir() -> PathBuf {
    PathBuf::from("/tmp/voxrelay/tts")
}

fn default_url_prefix() -> String {
    "/audio".to_string()
}

fn default_max_chars() -> usize {
    3000
}

fn default_tts_timeout_secs() -> u64 {
    30
}

fn default_max_age_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    600
}

fn default_voice_locales() -> Vec<String> {
    vec![
        "en-US".to_string(),
        "en-GB".to_string(),
        "en-AU".to_string(),
        "en-IE".to_string(),
    ]
}

/// Settings for the external audio conversion utility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: PathBuf,

    #[serde(default = "default_convert_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: default_ffmpeg_binary(),
            timeout_secs: default_convert_timeout_secs(),
        }
    }
}

impl AudioConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for the cloud and local transcription strategies.
#[derive(Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// Credential for the cloud endpoint. The cloud strategy is skipped when
    /// this is empty.
    #[serde(default, skip_serializing)]
    pub api_key: String,

    #[serde(default = "default_stt_api_url")]
    pub api_url: String,

    #[serde(default = "default_stt_model")]
    pub model: String,

    #[serde(default = "default_stt_timeout_secs")]
    pub cloud_timeout_secs: u64,

    #[serde(default = "default_whisper_binary")]
    pub whisper_binary: PathBuf,

    /// Path to the GGML model used by the local transcription binary.
    #[serde(default = "default_whisper_model")]
    pub model_path: PathBuf,

    #[serde(default = "default_stt_timeout_secs")]
    pub local_timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_stt_api_url(),
            model: default_stt_model(),
            cloud_timeout_secs: default_stt_timeout_secs(),
            whisper_binary: default_whisper_binary(),
            model_path: default_whisper_model(),
            local_timeout_secs: default_stt_timeout_secs(),
        }
    }
}

impl fmt::Debug for SttConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("cloud_timeout_secs", &self.cloud_timeout_secs)
            .field("whisper_binary", &self.whisper_binary)
            .field("model_path", &self.model_path)
            .field("local_timeout_secs", &self.local_timeout_secs)
            .finish()
    }
}

impl SttConfig {
    pub fn cloud_enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Settings for speech synthesis and its output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Directory synthesized files are written to and served from.
    #[serde(default = "default_tts_output_dir")]
    pub output_dir: PathBuf,

    /// URL path prefix under which `output_dir` is served.
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,

    /// Text longer than this many characters is truncated before synthesis.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,

    /// Synthesized files older than this are removed by the sweeper.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Locale prefixes exposed by the voice catalog.
    #[serde(default = "default_voice_locales")]
    pub voice_locales: Vec<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            binary: default_tts_binary(),
            default_voice: default_voice(),
            output_dir: default_tts_output_dir(),
            url_prefix: default_url_prefix(),
            max_chars: default_max_chars(),
            timeout_secs: default_tts_timeout_secs(),
            max_age_secs: default_max_age_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            voice_locales: default_voice_locales(),
        }
    }
}
