use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::llm::LlmConfig;

/// Configuration for the storyreel pipeline.
///
/// Every generator receives its section by value at construction time;
/// nothing reads credentials from ambient global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chapter extraction settings
    pub extraction: ExtractionConfig,

    /// Script generation and validation settings
    pub script: ScriptConfig,

    /// Image generation settings
    pub image: ImageConfig,

    /// Speech synthesis settings
    pub speech: SpeechConfig,

    /// Video composition and caption settings
    pub video: VideoConfig,

    /// Filesystem layout settings
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Chapters below this word count are treated as non-narrative
    pub min_word_count: usize,

    /// Title stop-words marking non-narrative sections
    pub excluded_title_words: Vec<String>,

    /// Chapters above this token estimate are split into fragments
    pub max_fragment_tokens: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Substories requested per chapter
    pub substories_per_chapter: usize,

    /// Minimum narration lines and image prompts per substory
    pub min_chunks: usize,

    /// Reject substories whose line and prompt counts differ
    pub enforce_prompt_parity: bool,

    /// Regenerate raw scripts that already exist on disk
    pub overwrite_existing: bool,

    /// Narration model settings
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image generation endpoint
    pub endpoint: String,

    /// API key for the image service
    pub api_key: Option<String>,

    /// Image model
    pub model: String,

    /// Requested image size
    pub size: String,

    /// Requested render quality
    pub quality: String,

    /// File extension for stored images
    pub extension: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speech synthesis endpoint
    pub endpoint: String,

    /// API key for the speech service
    pub api_key: Option<String>,

    /// Speech model
    pub model: String,

    /// Narration voice
    pub voice: String,

    /// File extension for stored clips
    pub extension: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Output frame width
    pub width: u32,

    /// Output frame height
    pub height: u32,

    /// Output frame rate
    pub fps: u32,

    /// Caption font
    pub font_name: String,

    /// Caption font size (libass units)
    pub font_size: u32,

    /// Maximum characters per caption display line
    pub chars_per_line: usize,

    /// Maximum display lines per caption cue
    pub max_lines_per_cue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the stage-directory layout
    pub base_dir: PathBuf,
}

impl Config {
    /// Load configuration from file, falling back to environment
    /// variables over the defaults.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "storyreel.toml",
            "config/storyreel.toml",
            "/etc/storyreel/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config.apply_env();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Err(anyhow!("No configuration file found"))
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply environment overrides. `STORYREEL_API_KEY` (or the service's
    /// own `OPENAI_API_KEY`) feeds all three hosted generators, matching
    /// the single-key setup the `.env` file carries.
    fn apply_env(&mut self) {
        let api_key = std::env::var("STORYREEL_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();

        if let Some(key) = api_key {
            self.script.llm.api_key = Some(key.clone());
            self.image.api_key = Some(key.clone());
            self.speech.api_key = Some(key);
        }

        if let Ok(base_dir) = std::env::var("STORYREEL_BASE_DIR") {
            self.storage.base_dir = PathBuf::from(base_dir);
        }

        if let Ok(count) = std::env::var("STORYREEL_SUBSTORIES") {
            if let Ok(parsed) = count.parse() {
                self.script.substories_per_chapter = parsed;
            }
        }
    }

    /// Save configuration to file.
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.script.substories_per_chapter == 0 {
            return Err(anyhow!("substories_per_chapter must be greater than 0"));
        }

        if self.script.min_chunks == 0 {
            return Err(anyhow!("min_chunks must be greater than 0"));
        }

        // yuv420p output requires even frame dimensions.
        if self.video.width % 2 != 0 || self.video.height % 2 != 0 {
            return Err(anyhow!("video width and height must be even"));
        }

        if self.video.fps == 0 {
            return Err(anyhow!("video fps must be greater than 0"));
        }

        if self.video.chars_per_line == 0 || self.video.max_lines_per_cue == 0 {
            return Err(anyhow!("caption geometry must be greater than 0"));
        }

        if !self.storage.base_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(&self.storage.base_dir) {
                return Err(anyhow!("Cannot create base directory: {}", e));
            }
        }

        Ok(())
    }

    /// Runtime configuration summary.
    pub fn summary(&self) -> String {
        format!(
            "Storyreel Configuration:\n\
            - Base Directory: {}\n\
            - Substories per Chapter: {}\n\
            - Narration Model: {}\n\
            - Image Model: {} ({})\n\
            - Voice: {} ({})\n\
            - Frame: {}x{} @ {}fps\n\
            - Captions: {} chars/line, {} lines/cue",
            self.storage.base_dir.display(),
            self.script.substories_per_chapter,
            self.script.llm.model,
            self.image.model,
            self.image.size,
            self.speech.voice,
            self.speech.model,
            self.video.width,
            self.video.height,
            self.video.fps,
            self.video.chars_per_line,
            self.video.max_lines_per_cue,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig {
                min_word_count: 200,
                excluded_title_words: vec![
                    "license".to_string(),
                    "about".to_string(),
                    "untitled".to_string(),
                ],
                max_fragment_tokens: 6000,
            },
            script: ScriptConfig {
                substories_per_chapter: 3,
                min_chunks: 5,
                enforce_prompt_parity: true,
                overwrite_existing: false,
                llm: LlmConfig::default(),
            },
            image: ImageConfig::default(),
            speech: SpeechConfig::default(),
            video: VideoConfig::default(),
            storage: StorageConfig {
                base_dir: PathBuf::from("./data"),
            },
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/images/generations".to_string(),
            api_key: None,
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
            extension: "png".to_string(),
            timeout_seconds: 180,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/audio/speech".to_string(),
            api_key: None,
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            extension: "mp3".to_string(),
            timeout_seconds: 60,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 24,
            font_name: "Arial".to_string(),
            font_size: 20,
            chars_per_line: 30,
            max_lines_per_cue: 2,
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_base_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.base_dir = dir;
        self
    }

    /// One key serves the narration, image and speech services.
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.config.script.llm.api_key = Some(api_key.clone());
        self.config.image.api_key = Some(api_key.clone());
        self.config.speech.api_key = Some(api_key);
        self
    }

    pub fn with_substories_per_chapter(mut self, count: usize) -> Self {
        self.config.script.substories_per_chapter = count;
        self
    }

    pub fn with_voice(mut self, voice: String) -> Self {
        self.config.speech.voice = voice;
        self
    }

    pub fn with_frame(mut self, width: u32, height: u32) -> Self {
        self.config.video.width = width;
        self.config.video.height = height;
        self
    }

    pub fn enforce_prompt_parity(mut self, enforce: bool) -> Self {
        self.config.script.enforce_prompt_parity = enforce;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.video.width, 1080);
        assert_eq!(config.video.height, 1920);
        assert_eq!(config.script.min_chunks, 5);
        assert!(config.script.enforce_prompt_parity);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_api_key("test-key".to_string())
            .with_substories_per_chapter(5)
            .with_frame(720, 1280)
            .build();

        assert_eq!(config.script.llm.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.image.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.speech.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.script.substories_per_chapter, 5);
        assert_eq!(config.video.width, 720);
    }

    #[test]
    fn test_validation_rejects_odd_frame() {
        let temp = tempfile::tempdir().unwrap();
        let config = ConfigBuilder::new()
            .with_base_dir(temp.path().to_path_buf())
            .with_frame(1081, 1920)
            .build();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_passes_for_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = ConfigBuilder::new()
            .with_base_dir(temp.path().to_path_buf())
            .build();

        assert!(config.validate().is_ok());
    }
}
