use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::audio::AudioProbe;
use crate::captions::CaptionSegmenter;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::extraction::ChapterExtractor;
use crate::media::{ImageGenerator, SpeechSynthesizer};
use crate::package::{Package, PackageStore};
use crate::script::generator::{discover_raw_scripts, ScriptGenerator};
use crate::script::{parse_script, validate_script, Substory, ValidationOptions};
use crate::video::VideoCompositor;

/// How far a pipeline run goes before stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageTarget {
    /// Generate and process scripts only
    Scripts,
    /// Scripts plus image generation
    Images,
    /// Scripts, images and speech synthesis
    Audio,
    /// The full pipeline through video assembly
    Video,
}

impl std::str::FromStr for StageTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scripts" => Ok(StageTarget::Scripts),
            "images" => Ok(StageTarget::Images),
            "audio" => Ok(StageTarget::Audio),
            "video" => Ok(StageTarget::Video),
            other => Err(anyhow!("unknown stage: {}", other)),
        }
    }
}

/// One pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Source document; None resumes from scripts already on disk
    pub source: Option<PathBuf>,
    /// Last stage to run
    pub stage: StageTarget,
    /// Stop after audio even when the stage target is Video
    pub skip_video: bool,
    /// Only sweep existing packages and assemble the ready ones
    pub video_only: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            source: None,
            stage: StageTarget::Video,
            skip_video: false,
            video_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageStatus {
    Completed,
    Failed,
    Skipped,
}

/// Outcome for a single package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageOutcome {
    pub package_id: String,
    pub title: String,
    pub status: PackageStatus,
    pub error_message: Option<String>,
    pub processing_time: Duration,
}

/// Overall batch results, persisted as `processing_results.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_time: Duration,
    pub results: Vec<PackageOutcome>,
}

impl ProcessingResult {
    fn from_outcomes(outcomes: Vec<PackageOutcome>, total_time: Duration) -> Self {
        let successful = outcomes
            .iter()
            .filter(|o| o.status == PackageStatus::Completed)
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| o.status == PackageStatus::Failed)
            .count();

        Self {
            total: outcomes.len(),
            successful,
            failed,
            total_time,
            results: outcomes,
        }
    }
}

/// Drives packages from validated script to rendered video, one package at
/// a time. A failure inside one package never aborts its siblings; every
/// stage checks the disk first so interrupted batches resume where they
/// stopped.
pub struct BatchProcessor {
    config: Config,
    store: PackageStore,
    extractor: ChapterExtractor,
    probe: AudioProbe,
    segmenter: CaptionSegmenter,
    compositor: VideoCompositor,
}

impl BatchProcessor {
    pub fn new(config: Config) -> Self {
        let extractor = ChapterExtractor::new(
            config.extraction.min_word_count,
            config.extraction.excluded_title_words.clone(),
            config.extraction.max_fragment_tokens,
        );
        let segmenter = CaptionSegmenter::new(
            config.video.chars_per_line,
            config.video.max_lines_per_cue,
        );
        let compositor = VideoCompositor::new(&config.video);
        let store = PackageStore::new(config.storage.base_dir.clone());

        Self {
            config,
            store,
            extractor,
            probe: AudioProbe::new(),
            segmenter,
            compositor,
        }
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    /// Run one batch according to the options.
    pub async fn run(&self, options: &RunOptions) -> Result<ProcessingResult> {
        let start_time = Instant::now();

        if options.video_only {
            let outcomes = self.sweep_ready_packages().await?;
            let result = ProcessingResult::from_outcomes(outcomes, start_time.elapsed());
            self.persist_results(&result).await?;
            return Ok(result);
        }

        self.store.ensure_layout().await?;

        if let Some(source) = &options.source {
            self.generate_raw_scripts(source).await?;
        }

        let processed = self.process_raw_scripts().await?;
        info!("📚 {} scripts ready for packaging", processed);

        if options.stage == StageTarget::Scripts {
            let result =
                ProcessingResult::from_outcomes(Vec::new(), start_time.elapsed());
            return Ok(result);
        }

        let outcomes = self.package_and_generate(options).await?;
        let result = ProcessingResult::from_outcomes(outcomes, start_time.elapsed());
        self.persist_results(&result).await?;

        Ok(result)
    }

    /// Extract chapters from the source document and request one raw
    /// script per chapter fragment. A failed model call skips its chapter.
    async fn generate_raw_scripts(&self, source: &Path) -> Result<()> {
        let chapters = self.extractor.extract(source)?;
        info!("\n{}", self.extractor.summary(&chapters));

        let generator =
            ScriptGenerator::new(&self.config.script.llm, self.store.scripts_dir())?;

        for chapter in &chapters {
            for fragment in self.extractor.split_into_fragments(chapter) {
                generator
                    .create_script(
                        &fragment,
                        self.config.script.substories_per_chapter,
                        self.config.script.overwrite_existing,
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Parse and validate every raw script in `scripts/`.
    ///
    /// Valid scripts move to `used_scripts/` with their JSON persisted to
    /// `processed_scripts/`; rejected scripts are logged and left alone so
    /// the failure can be inspected. Returns the number accepted.
    async fn process_raw_scripts(&self) -> Result<usize> {
        let validation = ValidationOptions {
            min_chunks: self.config.script.min_chunks,
            enforce_prompt_parity: self.config.script.enforce_prompt_parity,
        };

        let mut accepted = 0;
        for raw_path in discover_raw_scripts(&self.store.scripts_dir())? {
            let text = tokio::fs::read_to_string(&raw_path)
                .await
                .with_context(|| format!("reading {}", raw_path.display()))?;

            let script = parse_script(&text);
            match validate_script(&script, &validation) {
                Ok(()) => {
                    let stem = raw_path
                        .file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default();

                    self.store.persist_processed_script(&stem, &script).await?;
                    self.store.consume_raw_script(&raw_path).await?;
                    accepted += 1;
                }
                Err(e) => {
                    warn!("Rejected {}: {}", raw_path.display(), e);
                }
            }
        }

        Ok(accepted)
    }

    /// Package every not-yet-packaged substory and run the asset stages.
    async fn package_and_generate(&self, options: &RunOptions) -> Result<Vec<PackageOutcome>> {
        let packaged = self.already_packaged().await?;
        let mut outcomes = Vec::new();

        for (stem, script) in self.store.load_processed_scripts().await? {
            for substory in &script.substories {
                let key = (stem.clone(), substory.title.clone());
                if packaged.contains(&key) {
                    debug!("Already packaged: '{}' from {}", substory.title, stem);
                    continue;
                }

                let package = self.store.create_package(substory, &stem).await?;
                outcomes.push(self.drive_package(package, substory, options).await);
            }
        }

        Ok(outcomes)
    }

    /// Run one package through the requested stages, converting failures
    /// into an outcome instead of letting them escape the batch.
    async fn drive_package(
        &self,
        package: Package,
        substory: &Substory,
        options: &RunOptions,
    ) -> PackageOutcome {
        let start_time = Instant::now();
        let package_id = package.id.clone();
        let title = substory.title.clone();

        info!("📦 Processing package {} ('{}')", package_id, title);

        let result = self.run_package_stages(package, substory, options).await;

        match result {
            Ok(()) => PackageOutcome {
                package_id,
                title,
                status: PackageStatus::Completed,
                error_message: None,
                processing_time: start_time.elapsed(),
            },
            Err(e) => {
                warn!("❌ Package {} failed: {}", package_id, e);
                PackageOutcome {
                    package_id,
                    title,
                    status: PackageStatus::Failed,
                    error_message: Some(e.to_string()),
                    processing_time: start_time.elapsed(),
                }
            }
        }
    }

    async fn run_package_stages(
        &self,
        package: Package,
        substory: &Substory,
        options: &RunOptions,
    ) -> Result<(), PipelineError> {
        if options.stage >= StageTarget::Images {
            let images = ImageGenerator::new(self.config.image.clone())
                .map_err(|e| PipelineError::Generation {
                    kind: "image",
                    index: 0,
                    message: e.to_string(),
                })?;
            images
                .generate_images(
                    &package.images_dir(),
                    &substory.prompts,
                    &substory.general_prompt,
                )
                .await?;
        }

        if options.stage >= StageTarget::Audio {
            let speech = SpeechSynthesizer::new(self.config.speech.clone())
                .map_err(|e| PipelineError::Generation {
                    kind: "audio",
                    index: 0,
                    message: e.to_string(),
                })?;
            speech
                .synthesize_lines(&package.audio_dir(), &substory.lines)
                .await?;
        }

        if options.stage >= StageTarget::Video && !options.skip_video {
            self.claim_assemble_promote(package).await?;
        }

        Ok(())
    }

    /// Assemble the video for one claimed package and promote it.
    ///
    /// The claim rename is the concurrency guard: a package that cannot be
    /// claimed is being processed elsewhere and is skipped. On assembly
    /// failure the package is released back in place for a later retry.
    async fn claim_assemble_promote(&self, package: Package) -> Result<(), PipelineError> {
        let claimed = self
            .store
            .claim(package)
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;

        match self.assemble_video(&claimed).await {
            Ok(()) => {
                self.store
                    .promote(claimed)
                    .await
                    .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?;
                Ok(())
            }
            Err(assembly_error) => {
                error!("Video assembly failed: {}", assembly_error);
                if let Err(release_error) = self.store.release(claimed).await {
                    warn!("Failed to release claimed package: {}", release_error);
                }
                Err(assembly_error)
            }
        }
    }

    /// Probe narration timing, derive the caption track, render the video.
    async fn assemble_video(&self, package: &Package) -> Result<(), PipelineError> {
        let manifest = package
            .manifest()
            .await
            .map_err(|e| PipelineError::Assembly {
                package: package.path.clone(),
                message: format!("unreadable manifest: {}", e),
            })?;
        let lines = &manifest.substory.lines;

        let durations = self
            .probe
            .line_durations(
                &package.audio_dir(),
                lines.len(),
                &self.config.speech.extension,
            )
            .await
            .map_err(|e| PipelineError::Assembly {
                package: package.path.clone(),
                message: e.to_string(),
            })?;

        let cues = self.segmenter.segment(lines, &durations);

        self.compositor
            .assemble(
                &package.path,
                lines.len(),
                &self.config.image.extension,
                &self.config.speech.extension,
                &cues,
            )
            .await?;

        Ok(())
    }

    /// Sweep `packages/` and assemble every package satisfying the
    /// readiness predicate. Unready and already-claimed packages are left
    /// alone; a promoted package disappears from the namespace, so a
    /// second sweep finds nothing to redo.
    async fn sweep_ready_packages(&self) -> Result<Vec<PackageOutcome>> {
        let packages = self.store.list_packages().await?;
        info!("🔍 Sweep found {} in-progress packages", packages.len());

        let mut outcomes = Vec::new();
        for package in packages {
            let start_time = Instant::now();
            let package_id = package.id.clone();

            if !package.is_ready_for_video() {
                debug!("Package {} not ready ({:?})", package_id, package.stage());
                outcomes.push(PackageOutcome {
                    package_id,
                    title: String::new(),
                    status: PackageStatus::Skipped,
                    error_message: None,
                    processing_time: start_time.elapsed(),
                });
                continue;
            }

            let title = package
                .manifest()
                .await
                .map(|m| m.substory.title)
                .unwrap_or_default();

            let outcome = match self.claim_assemble_promote(package).await {
                Ok(()) => PackageOutcome {
                    package_id,
                    title,
                    status: PackageStatus::Completed,
                    error_message: None,
                    processing_time: start_time.elapsed(),
                },
                Err(e) => PackageOutcome {
                    package_id,
                    title,
                    status: PackageStatus::Failed,
                    error_message: Some(e.to_string()),
                    processing_time: start_time.elapsed(),
                },
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// (source stem, substory title) pairs that already own a package in
    /// either namespace, so re-runs do not duplicate work.
    async fn already_packaged(&self) -> Result<HashSet<(String, String)>> {
        let mut seen = HashSet::new();

        for namespace in [self.store.packages_dir(), self.store.ready_dir()] {
            if !namespace.exists() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(&namespace).await?;
            while let Some(entry) = entries.next_entry().await? {
                if !entry.path().is_dir() {
                    continue;
                }
                let package = Package::from_dir(&entry.path())?;
                if let Ok(manifest) = package.manifest().await {
                    seen.insert((manifest.source, manifest.substory.title));
                }
            }
        }

        Ok(seen)
    }

    async fn persist_results(&self, result: &ProcessingResult) -> Result<()> {
        let path = self.config.storage.base_dir.join("processing_results.json");
        let json = serde_json::to_string_pretty(result)?;
        tokio::fs::write(&path, json).await?;
        info!("💾 Results saved to: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use std::str::FromStr;

    fn test_config(base: &Path) -> Config {
        ConfigBuilder::new()
            .with_base_dir(base.to_path_buf())
            .with_api_key("test-key".to_string())
            .build()
    }

    fn substory(title: &str) -> Substory {
        Substory {
            title: title.to_string(),
            lines: (0..5).map(|i| format!("Line {}", i)).collect(),
            prompts: (0..5).map(|i| format!("Prompt {}", i)).collect(),
            general_prompt: "charcoal sketch".to_string(),
        }
    }

    fn well_formed_raw() -> String {
        let mut text = String::from("- **Substory Title**: The Siege\n- **Script**:\n");
        for i in 1..=5 {
            text.push_str(&format!("  - Chunk {}: Narration {}.\n", i, i));
        }
        text.push_str("- **Image Prompts**:\n");
        for i in 1..=5 {
            text.push_str(&format!("  - Chunk {} Prompt: Scene {}.\n", i, i));
        }
        text.push_str("- **General Prompt**: grim dark style\n");
        text
    }

    #[test]
    fn test_stage_target_ordering() {
        assert!(StageTarget::Scripts < StageTarget::Images);
        assert!(StageTarget::Images < StageTarget::Audio);
        assert!(StageTarget::Audio < StageTarget::Video);
    }

    #[test]
    fn test_stage_target_parsing() {
        assert_eq!(StageTarget::from_str("video").unwrap(), StageTarget::Video);
        assert_eq!(StageTarget::from_str("SCRIPTS").unwrap(), StageTarget::Scripts);
        assert!(StageTarget::from_str("everything").is_err());
    }

    #[tokio::test]
    async fn test_valid_raw_script_is_processed_and_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(test_config(dir.path()));
        processor.store().ensure_layout().await.unwrap();

        let raw = processor.store().scripts_dir().join("Chapter_One.txt");
        tokio::fs::write(&raw, well_formed_raw()).await.unwrap();

        let accepted = processor.process_raw_scripts().await.unwrap();
        assert_eq!(accepted, 1);
        assert!(!raw.exists());
        assert!(processor
            .store()
            .used_scripts_dir()
            .join("Chapter_One.txt")
            .exists());
        assert!(processor
            .store()
            .processed_scripts_dir()
            .join("Chapter_One.json")
            .exists());
    }

    #[tokio::test]
    async fn test_invalid_raw_script_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(test_config(dir.path()));
        processor.store().ensure_layout().await.unwrap();

        let raw = processor.store().scripts_dir().join("Broken.txt");
        tokio::fs::write(&raw, "no markers at all").await.unwrap();

        let accepted = processor.process_raw_scripts().await.unwrap();
        assert_eq!(accepted, 0);
        assert!(raw.exists());
        assert!(!processor
            .store()
            .processed_scripts_dir()
            .join("Broken.json")
            .exists());
    }

    #[tokio::test]
    async fn test_video_only_sweep_on_missing_namespace_errors() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(test_config(&dir.path().join("empty")));

        let options = RunOptions {
            video_only: true,
            ..RunOptions::default()
        };
        assert!(processor.run(&options).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_skips_unready_packages() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(test_config(dir.path()));
        processor.store().ensure_layout().await.unwrap();

        // Script copy only: fails the readiness predicate.
        processor
            .store()
            .create_package(&substory("Half Done"), "Chapter_One")
            .await
            .unwrap();

        let options = RunOptions {
            video_only: true,
            ..RunOptions::default()
        };
        let result = processor.run(&options).await.unwrap();

        assert_eq!(result.total, 1);
        assert_eq!(result.successful, 0);
        assert_eq!(result.failed, 0);
        assert_eq!(result.results[0].status, PackageStatus::Skipped);

        // The package is still in place for a later run.
        assert_eq!(processor.store().list_packages().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_already_packaged_substories_are_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let processor = BatchProcessor::new(test_config(dir.path()));
        processor.store().ensure_layout().await.unwrap();

        let story = substory("The Siege");
        processor
            .store()
            .create_package(&story, "Chapter_One")
            .await
            .unwrap();

        let packaged = processor.already_packaged().await.unwrap();
        assert!(packaged.contains(&("Chapter_One".to_string(), "The Siege".to_string())));
    }
}
