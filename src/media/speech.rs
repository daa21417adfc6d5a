use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::errors::PipelineError;

#[derive(Debug, Serialize)]
struct SpeechRequest {
    model: String,
    voice: String,
    input: String,
}

/// Synthesizes one narration clip per line into a package's `audio/`
/// directory. Clip durations later drive caption timing, so clips are
/// written strictly in line order under indexed names.
pub struct SpeechSynthesizer {
    config: SpeechConfig,
    client: reqwest::Client,
}

impl SpeechSynthesizer {
    pub fn new(config: SpeechConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("Speech API key required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    /// Generate `audio/audio_<i>.<ext>` for every narration line.
    ///
    /// Clips already on disk are kept. Each failed request is re-prompted
    /// once; a second failure aborts this package's remaining stages.
    pub async fn synthesize_lines(
        &self,
        audio_dir: &Path,
        lines: &[String],
    ) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(audio_dir).await?;

        for (index, line) in lines.iter().enumerate() {
            let target = audio_dir.join(format!("audio_{}.{}", index, self.config.extension));
            if target.exists() {
                debug!("Audio clip already present, skipping: {}", target.display());
                continue;
            }

            let bytes = match self.synthesize_line(line).await {
                Ok(bytes) => bytes,
                Err(first) => {
                    warn!("Speech request {} failed, re-prompting once: {}", index, first);
                    self.synthesize_line(line).await.map_err(|second| {
                        PipelineError::Generation {
                            kind: "audio",
                            index,
                            message: second.to_string(),
                        }
                    })?
                }
            };

            tokio::fs::write(&target, bytes).await?;
            debug!("🔊 Wrote {}", target.display());
        }

        info!(
            "🔊 Audio complete: {} lines in {}",
            lines.len(),
            audio_dir.display()
        );
        Ok(())
    }

    /// One synthesis request; the response body is the encoded clip.
    async fn synthesize_line(&self, line: &str) -> Result<Vec<u8>> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Speech API key not configured"))?;

        let request = SpeechRequest {
            model: self.config.model.clone(),
            voice: self.config.voice.clone(),
            input: line.to_string(),
        };

        debug!("Requesting speech for {} chars", line.len());

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Speech API error {}: {}", status, text));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpeechConfig;

    #[test]
    fn test_synthesizer_requires_api_key() {
        let config = SpeechConfig::default();
        assert!(SpeechSynthesizer::new(config).is_err());
    }

    #[tokio::test]
    async fn test_existing_clips_are_kept() {
        let config = SpeechConfig {
            api_key: Some("test-key".to_string()),
            ..SpeechConfig::default()
        };
        let synthesizer = SpeechSynthesizer::new(config).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("audio_0.mp3");
        std::fs::write(&existing, b"already voiced").unwrap();

        synthesizer
            .synthesize_lines(dir.path(), &["hello there".to_string()])
            .await
            .unwrap();

        assert_eq!(std::fs::read(&existing).unwrap(), b"already voiced");
    }
}
