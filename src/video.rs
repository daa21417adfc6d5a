use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

use crate::captions::{to_srt, CaptionCue};
use crate::config::VideoConfig;
use crate::errors::PipelineError;

/// Renders one vertical video per package from its ordered image/audio
/// pairs, with the caption track burned in.
///
/// Every ffmpeg invocation runs with the package directory as its working
/// directory so the commands only ever see relative paths.
#[derive(Debug, Clone)]
pub struct VideoCompositor {
    /// Output frame width
    pub width: u32,
    /// Output frame height
    pub height: u32,
    /// Output frame rate
    pub fps: u32,
    font_name: String,
    font_size: u32,
}

impl VideoCompositor {
    pub fn new(config: &VideoConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
            font_name: config.font_name.clone(),
            font_size: config.font_size,
        }
    }

    /// Assemble `video.mp4` inside a package directory.
    ///
    /// `pair_count` indexed image/audio pairs are rendered into still-image
    /// segments, concatenated in order, and overlaid with `cues`. Any
    /// failure is reported as an assembly failure so the batch can leave
    /// the package in place and move on.
    pub async fn assemble(
        &self,
        package_dir: &Path,
        pair_count: usize,
        image_ext: &str,
        audio_ext: &str,
        cues: &[CaptionCue],
    ) -> Result<PathBuf, PipelineError> {
        if pair_count == 0 {
            return Err(PipelineError::Assembly {
                package: package_dir.to_path_buf(),
                message: "no image/audio pairs to assemble".to_string(),
            });
        }

        let result = self
            .assemble_inner(package_dir, pair_count, image_ext, audio_ext, cues)
            .await;

        // Working files are removed on success and failure alike; a stale
        // segments directory would confuse the readiness sweep.
        let _ = tokio::fs::remove_dir_all(package_dir.join("segments")).await;

        result.map_err(|e| PipelineError::Assembly {
            package: package_dir.to_path_buf(),
            message: e.to_string(),
        })
    }

    async fn assemble_inner(
        &self,
        package_dir: &Path,
        pair_count: usize,
        image_ext: &str,
        audio_ext: &str,
        cues: &[CaptionCue],
    ) -> Result<PathBuf> {
        let segments_dir = package_dir.join("segments");
        tokio::fs::create_dir_all(&segments_dir).await?;

        info!(
            "🎬 Assembling {} segments in {}",
            pair_count,
            package_dir.display()
        );

        let mut concat_list = String::new();
        for index in 0..pair_count {
            let image = format!("images/image_{}.{}", index, image_ext);
            let audio = format!("audio/audio_{}.{}", index, audio_ext);
            let segment = format!("segments/segment_{}.mp4", index);

            if !package_dir.join(&image).exists() {
                return Err(anyhow!("missing asset: {}", image));
            }
            if !package_dir.join(&audio).exists() {
                return Err(anyhow!("missing asset: {}", audio));
            }

            self.render_segment(package_dir, &image, &audio, &segment)
                .await?;
            concat_list.push_str(&format!("file 'segment_{}.mp4'\n", index));
        }

        tokio::fs::write(segments_dir.join("concat.txt"), concat_list).await?;

        // Concatenate the uniform segments without re-encoding.
        let combined = "segments/combined.mp4";
        self.run_ffmpeg(
            package_dir,
            &[
                "-f", "concat",
                "-safe", "0",
                "-i", "segments/concat.txt",
                "-c", "copy",
                "-y", combined,
            ],
        )
        .await?;

        let video_path = package_dir.join("video.mp4");

        if cues.is_empty() {
            tokio::fs::rename(package_dir.join(combined), &video_path).await?;
        } else {
            tokio::fs::write(package_dir.join("captions.srt"), to_srt(cues)).await?;
            self.burn_captions(package_dir, combined, "video.mp4").await?;
        }

        info!("🎬 Rendered {}", video_path.display());
        Ok(video_path)
    }

    /// Render one still-image segment: the image scaled and center-cropped
    /// to cover the vertical frame, with the narration clip muxed in and
    /// the segment lasting exactly as long as the clip.
    async fn render_segment(
        &self,
        package_dir: &Path,
        image: &str,
        audio: &str,
        segment: &str,
    ) -> Result<()> {
        let cover_filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h}",
            w = self.width,
            h = self.height
        );
        let fps = self.fps.to_string();

        self.run_ffmpeg(
            package_dir,
            &[
                "-loop", "1",
                "-i", image,
                "-i", audio,
                "-vf", &cover_filter,
                "-r", &fps,
                "-c:v", "libx264",
                "-tune", "stillimage",
                "-pix_fmt", "yuv420p",
                "-c:a", "aac",
                "-shortest",
                "-y", segment,
            ],
        )
        .await
    }

    /// Burn the SRT caption track into the combined video, centered in the
    /// frame in the configured font.
    async fn burn_captions(&self, package_dir: &Path, input: &str, output: &str) -> Result<()> {
        let style = format!(
            "subtitles=captions.srt:force_style='FontName={},Fontsize={},PrimaryColour=&HFFFFFF&,Alignment=10'",
            self.font_name, self.font_size
        );

        self.run_ffmpeg(
            package_dir,
            &[
                "-i", input,
                "-vf", &style,
                "-c:a", "copy",
                "-y", output,
            ],
        )
        .await
    }

    async fn run_ffmpeg(&self, working_dir: &Path, args: &[&str]) -> Result<()> {
        debug!("ffmpeg {}", args.join(" "));

        let output = tokio::process::Command::new("ffmpeg")
            .args(args)
            .current_dir(working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("; ");
            return Err(anyhow!("ffmpeg failed: {}", tail));
        }

        Ok(())
    }

    /// Cheap integrity check for a rendered video.
    pub async fn validate_video(&self, video_path: &Path) -> Result<bool> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "stream=codec_name",
                "-of", "csv=p=0",
                video_path.to_str().ok_or_else(|| anyhow!("non-utf8 path"))?,
            ])
            .output()
            .await?;

        Ok(output.status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoConfig;

    #[tokio::test]
    async fn test_zero_pairs_is_assembly_failure() {
        let compositor = VideoCompositor::new(&VideoConfig::default());
        let dir = tempfile::tempdir().unwrap();

        let err = compositor
            .assemble(dir.path(), 0, "png", "mp3", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Assembly { .. }));
    }

    #[tokio::test]
    async fn test_missing_asset_is_assembly_failure() {
        let compositor = VideoCompositor::new(&VideoConfig::default());
        let dir = tempfile::tempdir().unwrap();

        let err = compositor
            .assemble(dir.path(), 1, "png", "mp3", &[])
            .await
            .unwrap_err();

        match err {
            PipelineError::Assembly { message, .. } => {
                assert!(message.contains("image_0.png"));
            }
            other => panic!("expected assembly failure, got {:?}", other),
        }
    }
}
