use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Audio conversion error: {0}")]
    Convert(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
