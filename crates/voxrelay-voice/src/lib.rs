//! Voice capabilities for the relay.
//!
//! Every external engine sits behind a small async trait so orchestration
//! code never deals with process execution directly:
//!
//! | Capability | Trait | Default implementation |
//! |------------|-------|------------------------|
//! | Normalize an upload to mono 16 kHz wav | [`AudioConverter`] | [`FfmpegConverter`] |
//! | Speech to text | [`Transcriber`] | [`TranscriptionRouter`] (cloud, then local) |
//! | Text to speech | [`SpeechSynthesizer`] | [`EdgeTtsSynthesizer`] |
//!
//! The crate also holds the pure [`SpeechSanitizer`] and the sweeper that
//! removes stale synthesized output.

pub mod config;
pub mod convert;
pub mod error;
mod process;
pub mod speech_text;
pub mod stt;
pub mod sweep;
pub mod tts;

pub use config::{AudioConfig, SttConfig, TtsConfig};
pub use convert::{AudioConverter, FfmpegConverter};
pub use error::VoiceError;
pub use speech_text::SpeechSanitizer;
pub use stt::{CloudTranscriber, LocalTranscriber, Transcriber, TranscriptionRouter};
pub use sweep::sweep_stale_files;
pub use tts::{
    filter_voices, parse_voice_list, truncate_for_speech, EdgeTtsSynthesizer, SpeechSynthesizer,
    SynthesizedAudio, TtsService,
};
