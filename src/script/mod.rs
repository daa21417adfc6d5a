pub mod generator;

pub use generator::ScriptGenerator;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One short narrated unit derived from a chapter: narration lines, one
/// image prompt per line, and a style prompt shared by every image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Substory {
    /// Substory title
    pub title: String,
    /// Ordered narration chunks, read aloud one clip each
    pub lines: Vec<String>,
    /// Ordered image-generation prompts, one per narration line
    pub prompts: Vec<String>,
    /// Style prompt prepended to every image prompt
    pub general_prompt: String,
}

impl Substory {
    fn new(title: String) -> Self {
        Self {
            title,
            lines: Vec::new(),
            prompts: Vec::new(),
            general_prompt: String::new(),
        }
    }
}

/// A parsed script: the ordered substories found in one raw model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub substories: Vec<Substory>,
}

/// Classification of one raw script line.
///
/// All marker matching lives here so the parser state machine stays
/// grammar-agnostic and the substring matching can be tightened without
/// touching it. Matching is case-insensitive and substring-based to
/// tolerate minor formatting drift from the model; it is therefore
/// order-sensitive, and the checks below are arranged so that known
/// collisions ("Chunk 1 Prompt:", "General Prompt:") resolve correctly.
#[derive(Debug, Clone, PartialEq)]
pub enum LineMarker {
    /// Opens a new substory; carries the title text
    Title(String),
    /// Start of the narration section
    ScriptSection,
    /// Start of the image-prompts section
    PromptSection,
    /// The shared style prompt; carries its text
    GeneralPrompt(String),
    /// A numbered chunk; carries the text after the first colon
    Chunk(String),
    /// Anything else, ignored by the parser
    Other,
}

/// Classify one line of raw script text.
pub fn classify_line(line: &str) -> LineMarker {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineMarker::Other;
    }

    let lower = trimmed.to_lowercase();

    if lower.contains("substory title") {
        return LineMarker::Title(marker_value(trimmed));
    }
    if lower.contains("image prompts") {
        return LineMarker::PromptSection;
    }
    if lower.contains("general prompt") {
        return LineMarker::GeneralPrompt(marker_value(trimmed));
    }
    if lower.contains("chunk") && trimmed.contains(':') {
        return LineMarker::Chunk(marker_value(trimmed));
    }
    if lower.contains("script") {
        return LineMarker::ScriptSection;
    }

    LineMarker::Other
}

/// Text after the first colon, stripped of markdown bold markers, list
/// bullets and bracket placeholders.
fn marker_value(line: &str) -> String {
    let value = match line.split_once(':') {
        Some((_, rest)) => rest,
        None => "",
    };

    value
        .trim()
        .trim_matches(|c| c == '*' || c == '[' || c == ']')
        .trim()
        .to_string()
}

/// Parse raw narration text into substories.
///
/// Line-scanning state machine: a title marker closes the substory in
/// progress and opens a new one; section markers switch which sequence
/// chunk lines append to; the general prompt is a single value, not
/// accumulated; everything else is ignored. The parse itself never fails —
/// structural problems are caught by [`validate_script`].
pub fn parse_script(text: &str) -> Script {
    #[derive(PartialEq)]
    enum Mode {
        None,
        Lines,
        Prompts,
    }

    let mut substories = Vec::new();
    let mut current: Option<Substory> = None;
    let mut mode = Mode::None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        match classify_line(line) {
            LineMarker::Title(title) => {
                if let Some(done) = current.take() {
                    substories.push(done);
                }
                current = Some(Substory::new(title));
                mode = Mode::None;
            }
            LineMarker::ScriptSection => {
                if let Some(story) = current.as_mut() {
                    story.lines.clear();
                    mode = Mode::Lines;
                }
            }
            LineMarker::PromptSection => {
                if let Some(story) = current.as_mut() {
                    story.prompts.clear();
                    mode = Mode::Prompts;
                }
            }
            LineMarker::GeneralPrompt(prompt) => {
                if let Some(story) = current.as_mut() {
                    story.general_prompt = prompt;
                }
                mode = Mode::None;
            }
            LineMarker::Chunk(content) => {
                if let Some(story) = current.as_mut() {
                    match mode {
                        Mode::Lines => story.lines.push(content),
                        Mode::Prompts => story.prompts.push(content),
                        Mode::None => {}
                    }
                }
            }
            LineMarker::Other => {}
        }
    }

    if let Some(done) = current {
        substories.push(done);
    }

    Script { substories }
}

/// Why a parsed script was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptValidationError {
    #[error("script contains no substories")]
    NoSubstories,

    #[error("substory #{0} has an empty title")]
    EmptyTitle(usize),

    #[error("substory '{title}' has {count} narration lines, minimum is {min}")]
    TooFewLines {
        title: String,
        count: usize,
        min: usize,
    },

    #[error("substory '{title}' has {count} image prompts, minimum is {min}")]
    TooFewPrompts {
        title: String,
        count: usize,
        min: usize,
    },

    #[error("substory '{0}' has no general prompt")]
    MissingGeneralPrompt(String),

    #[error("substory '{title}' has {lines} narration lines but {prompts} image prompts")]
    PromptParityMismatch {
        title: String,
        lines: usize,
        prompts: usize,
    },
}

/// Validation policy for parsed scripts.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Minimum narration lines and image prompts per substory
    pub min_chunks: usize,
    /// Require `lines.len() == prompts.len()`; the downstream compositor
    /// pairs `image_i` with `audio_i`, so disabling this restores the
    /// permissive behavior at the cost of unpaired assets
    pub enforce_prompt_parity: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            min_chunks: 5,
            enforce_prompt_parity: true,
        }
    }
}

/// Check a parsed script for structural completeness.
///
/// A rejected script is discarded by the caller, never persisted or
/// retried; rejection is per-script, not per-batch.
pub fn validate_script(
    script: &Script,
    options: &ValidationOptions,
) -> Result<(), ScriptValidationError> {
    if script.substories.is_empty() {
        return Err(ScriptValidationError::NoSubstories);
    }

    for (index, story) in script.substories.iter().enumerate() {
        if story.title.trim().is_empty() {
            return Err(ScriptValidationError::EmptyTitle(index));
        }
        if story.lines.len() < options.min_chunks {
            return Err(ScriptValidationError::TooFewLines {
                title: story.title.clone(),
                count: story.lines.len(),
                min: options.min_chunks,
            });
        }
        if story.prompts.len() < options.min_chunks {
            return Err(ScriptValidationError::TooFewPrompts {
                title: story.title.clone(),
                count: story.prompts.len(),
                min: options.min_chunks,
            });
        }
        if story.general_prompt.trim().is_empty() {
            return Err(ScriptValidationError::MissingGeneralPrompt(
                story.title.clone(),
            ));
        }
        if options.enforce_prompt_parity && story.lines.len() != story.prompts.len() {
            return Err(ScriptValidationError::PromptParityMismatch {
                title: story.title.clone(),
                lines: story.lines.len(),
                prompts: story.prompts.len(),
            });
        }
    }

    Ok(())
}
