use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::extraction::Chapter;
use crate::llm::{create_llm, ChatMessage, Llm, LlmConfig};

const SYSTEM_PROMPT: &str = "\
You are a professional scriptwriter specializing in short-form content creation.

Your task is to:
1. Receive a chapter from a book.
2. Identify a given number, x, of substories from the chapter.
3. Write a short script for each substory.

Requirements for each script:
- Each script should narrate a story in a clear and engaging style suitable for a single narrator.
- The narration should be concise, designed to be read aloud in 60 seconds.
- Give a minimum of 5 chunks of narration for each script.
- Divide the script into chunks of 5 to 10 seconds each. Each chunk should contain a single cohesive idea or scene that aligns with the story.
- For each chunk, provide a detailed and imaginative prompt for an image generation model to create a relevant background image.
- Provide exactly one image prompt per narration chunk.
- Add a general prompt to be applied to the entire script to ensure consistency in the image generation.

Output format for each script:
- **Substory Title**: [Title of the substory]
- **Script**:
  - Chunk 1: [Narration text for 5-10 seconds]
  - Chunk 2: [Narration text for 5-10 seconds]
  - ...
- **Image Prompts**:
  - Chunk 1 Prompt: [Prompt describing the scene for chunk 1]
  - Chunk 2 Prompt: [Prompt describing the scene for chunk 2]
  - ...
- **General Prompt**: [Style prompt applied to every image]

Ensure the output is well-structured and easy to process programmatically.";

/// Asks the narration model for substory scripts and files the raw
/// responses into the scripts directory for the parser to consume.
pub struct ScriptGenerator {
    llm: Box<dyn Llm>,
    scripts_dir: PathBuf,
}

impl ScriptGenerator {
    pub fn new(config: &LlmConfig, scripts_dir: impl Into<PathBuf>) -> Result<Self> {
        let llm = create_llm(config)?;

        Ok(Self {
            llm,
            scripts_dir: scripts_dir.into(),
        })
    }

    /// Whether the configured provider currently answers.
    pub async fn is_available(&self) -> bool {
        self.llm.is_available().await
    }

    /// Path a chapter's raw script is written to.
    pub fn script_path(&self, chapter_title: &str) -> PathBuf {
        self.scripts_dir
            .join(format!("{}.txt", clean_title_name(chapter_title)))
    }

    /// Generate the raw script for one chapter and persist it.
    ///
    /// A raw script already on disk for the same cleaned title is kept and
    /// generation is skipped unless `overwrite` is set, so re-runs resume
    /// instead of paying for the model call again. Returns the raw script
    /// path, or `None` when the model call failed (the chapter is skipped,
    /// never the batch).
    pub async fn create_script(
        &self,
        chapter: &Chapter,
        num_substories: usize,
        overwrite: bool,
    ) -> Result<Option<PathBuf>> {
        let path = self.script_path(&chapter.title);

        if !overwrite && path.exists() {
            info!("📜 Script already exists for '{}', skipping", chapter.title);
            return Ok(Some(path));
        }

        tokio::fs::create_dir_all(&self.scripts_dir)
            .await
            .with_context(|| format!("creating {}", self.scripts_dir.display()))?;

        match self.generate_script(chapter, num_substories).await {
            Ok(raw) => {
                tokio::fs::write(&path, raw)
                    .await
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("📜 Wrote raw script: {}", path.display());
                Ok(Some(path))
            }
            Err(e) => {
                warn!("Script generation failed for '{}': {}", chapter.title, e);
                Ok(None)
            }
        }
    }

    /// One model round trip: chapter in, raw substory scripts out.
    pub async fn generate_script(&self, chapter: &Chapter, num_substories: usize) -> Result<String> {
        debug!(
            "Requesting {} substories for '{}' ({} tokens)",
            num_substories, chapter.title, chapter.token_count
        );

        let user_prompt = format!(
            "Give me {} scripts.\nGenerate the scripts for the following chapter.\nTitle:\n{}\nChapter:\n{}",
            num_substories, chapter.title, chapter.text
        );

        let response = self
            .llm
            .chat(vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(user_prompt),
            ])
            .await?;

        debug!(
            "Narration model responded ({} chars, tokens: {:?})",
            response.content.len(),
            response.tokens_used
        );

        Ok(response.content)
    }
}

/// Make a chapter title safe as a file stem: spaces to underscores,
/// filesystem-hostile characters stripped, stray underscores trimmed.
pub fn clean_title_name(title: &str) -> String {
    let forbidden = Regex::new(r#"[\\/:*?"<>|]"#).expect("filename pattern is valid");

    let cleaned = title.replace(' ', "_");
    let cleaned = forbidden.replace_all(&cleaned, "");

    cleaned.trim_matches('_').to_string()
}

/// Raw script files present in a scripts directory, in name order.
pub fn discover_raw_scripts(scripts_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut scripts: Vec<PathBuf> = walkdir::WalkDir::new(scripts_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "txt"))
        .collect();

    scripts.sort();
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_title_name() {
        assert_eq!(clean_title_name("The Fall of Cadia"), "The_Fall_of_Cadia");
        assert_eq!(clean_title_name("What? No: \"Really\""), "What_No_Really");
        assert_eq!(clean_title_name(" padded "), "padded");
    }

    #[test]
    fn test_script_path_uses_cleaned_title() {
        let generator = ScriptGenerator::new(
            &LlmConfig {
                api_key: Some("test-key".to_string()),
                ..LlmConfig::default()
            },
            "/tmp/scripts",
        )
        .unwrap();

        assert_eq!(
            generator.script_path("Chapter One: Omens"),
            PathBuf::from("/tmp/scripts/Chapter_One_Omens.txt")
        );
    }

    #[tokio::test]
    async fn test_discover_raw_scripts_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.txt", "a.txt", "notes.json"] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }

        let scripts = discover_raw_scripts(dir.path()).unwrap();
        let names: Vec<_> = scripts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }
}
