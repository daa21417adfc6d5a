use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Probed facts about one generated narration clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    pub path: PathBuf,
    /// Clip length in seconds
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: u32,
    pub format: String,
}

/// Reads clip durations back out of a package's `audio/` directory.
///
/// Caption timing and segment lengths are derived entirely from what the
/// TTS service actually produced, so the probe is the single source of
/// narration timing.
#[derive(Debug, Clone, Default)]
pub struct AudioProbe;

impl AudioProbe {
    pub fn new() -> Self {
        Self
    }

    /// Probe one clip with ffprobe.
    pub async fn probe(&self, audio_path: &Path) -> Result<AudioInfo> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
                "-select_streams", "a:0",
                audio_path.to_str().ok_or_else(|| anyhow!("non-utf8 path"))?,
            ])
            .output()
            .await?;

        if !output.status.success() {
            return Err(anyhow!("ffprobe failed for {}", audio_path.display()));
        }

        let json_str = String::from_utf8(output.stdout)?;
        let ffprobe_data: serde_json::Value = serde_json::from_str(&json_str)?;

        let format = &ffprobe_data["format"];
        let streams = ffprobe_data["streams"]
            .as_array()
            .ok_or_else(|| anyhow!("ffprobe returned no streams for {}", audio_path.display()))?;
        let audio_stream = streams
            .first()
            .ok_or_else(|| anyhow!("No audio stream found in {}", audio_path.display()))?;

        let duration: f64 = format["duration"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        let info = AudioInfo {
            path: audio_path.to_path_buf(),
            duration,
            sample_rate: audio_stream["sample_rate"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            channels: audio_stream["channels"].as_u64().unwrap_or(1) as u32,
            format: audio_stream["codec_name"]
                .as_str()
                .unwrap_or("unknown")
                .to_string(),
        };

        debug!(
            "Probed {}: {:.2}s {} {}Hz",
            info.path.display(),
            info.duration,
            info.format,
            info.sample_rate
        );

        Ok(info)
    }

    /// Ordered per-line durations for `audio_0 .. audio_{count-1}`.
    ///
    /// A missing clip is an error: the compositor pairs clips with images
    /// by index and a hole would desynchronize every later caption.
    pub async fn line_durations(
        &self,
        audio_dir: &Path,
        count: usize,
        extension: &str,
    ) -> Result<Vec<f64>> {
        let mut durations = Vec::with_capacity(count);

        for index in 0..count {
            let clip = audio_dir.join(format!("audio_{}.{}", index, extension));
            if !clip.exists() {
                return Err(anyhow!("Missing narration clip: {}", clip.display()));
            }
            durations.push(self.probe(&clip).await?.duration);
        }

        Ok(durations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_clip_is_an_error() {
        let probe = AudioProbe::new();
        let dir = tempfile::tempdir().unwrap();

        let result = probe.line_durations(dir.path(), 1, "mp3").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("audio_0.mp3"));
    }
}
