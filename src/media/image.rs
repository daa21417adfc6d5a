use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ImageConfig;
use crate::errors::PipelineError;

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    quality: String,
    response_format: String,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: String,
}

/// Generates one background image per prompt into a package's `images/`
/// directory. The substory's general prompt is prepended to every request
/// so the set renders in a consistent style.
pub struct ImageGenerator {
    config: ImageConfig,
    client: reqwest::Client,
}

impl ImageGenerator {
    pub fn new(config: ImageConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("Image API key required"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, client })
    }

    /// Generate `images/image_<i>.<ext>` for every prompt.
    ///
    /// Images already on disk are kept, so a partially generated package
    /// resumes where it stopped. Each failed request is re-prompted once;
    /// a second failure aborts this package's remaining stages.
    pub async fn generate_images(
        &self,
        images_dir: &Path,
        prompts: &[String],
        general_prompt: &str,
    ) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(images_dir).await?;

        for (index, prompt) in prompts.iter().enumerate() {
            let target = images_dir.join(format!("image_{}.{}", index, self.config.extension));
            if target.exists() {
                debug!("Image already present, skipping: {}", target.display());
                continue;
            }

            let full_prompt = format!("{} {}", general_prompt, prompt);

            let bytes = match self.generate_image(&full_prompt).await {
                Ok(bytes) => bytes,
                Err(first) => {
                    warn!("Image request {} failed, re-prompting once: {}", index, first);
                    self.generate_image(&full_prompt).await.map_err(|second| {
                        PipelineError::Generation {
                            kind: "image",
                            index,
                            message: second.to_string(),
                        }
                    })?
                }
            };

            tokio::fs::write(&target, bytes).await?;
            debug!("🖼️ Wrote {}", target.display());
        }

        info!(
            "🖼️ Images complete: {} prompts in {}",
            prompts.len(),
            images_dir.display()
        );
        Ok(())
    }

    /// One image request, decoded from the API's base64 payload.
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Image API key not configured"))?;

        let request = ImageRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            size: self.config.size.clone(),
            quality: self.config.quality.clone(),
            response_format: "b64_json".to_string(),
        };

        debug!("Requesting image ({} chars of prompt)", prompt.len());

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
            return Err(anyhow!("Image API error {}: {}", status, text));
        }

        let parsed: ImageResponse = response.json().await?;
        let payload = parsed
            .data
            .first()
            .ok_or_else(|| anyhow!("Image API returned no data"))?;

        Ok(BASE64.decode(&payload.b64_json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageConfig;

    #[test]
    fn test_generator_requires_api_key() {
        let config = ImageConfig::default();
        assert!(ImageGenerator::new(config).is_err());
    }

    #[tokio::test]
    async fn test_existing_images_are_kept() {
        let config = ImageConfig {
            api_key: Some("test-key".to_string()),
            ..ImageConfig::default()
        };
        let generator = ImageGenerator::new(config).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("image_0.png");
        std::fs::write(&existing, b"already rendered").unwrap();

        // The only requested image exists, so no network call is made.
        generator
            .generate_images(dir.path(), &["a city".to_string()], "oil painting")
            .await
            .unwrap();

        assert_eq!(std::fs::read(&existing).unwrap(), b"already rendered");
    }
}
