//! Multimodal tooling: downloads, frames, audio, transcription, analysis.

pub mod audio;
pub mod llm;
pub mod video;

pub use self::llm::LlmClient;
