/// Storyreel - book-to-shorts content pipeline
///
/// Extracts chapters from an e-book, turns each into short narrated
/// substories via a language model, generates one background image and one
/// narration clip per chunk, and assembles vertical videos with burned-in
/// captions.

pub mod audio;
pub mod captions;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod llm;
pub mod media;
pub mod package;
pub mod processing;
pub mod script;
pub mod video;

// Re-export main types for easy access
pub use crate::audio::{AudioInfo, AudioProbe};
pub use crate::captions::{CaptionCue, CaptionSegmenter};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::errors::PipelineError;
pub use crate::extraction::{Chapter, ChapterExtractor};
pub use crate::llm::{LlmConfig, LlmProvider};
pub use crate::media::{ImageGenerator, SpeechSynthesizer};
pub use crate::package::{Package, PackageStage, PackageStore};
pub use crate::processing::{BatchProcessor, ProcessingResult, RunOptions, StageTarget};
pub use crate::script::{parse_script, validate_script, Script, ScriptGenerator, Substory};
pub use crate::video::VideoCompositor;
