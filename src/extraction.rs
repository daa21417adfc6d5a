use anyhow::{anyhow, Result};
use epub::doc::EpubDoc;
use html2text::from_read;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// One narrative chapter extracted from a source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title (first heading, or a positional fallback)
    pub title: String,
    /// Plain chapter text
    pub text: String,
    /// Whitespace-separated word count
    pub word_count: usize,
    /// Token estimate: one token per ~4 characters
    pub token_count: usize,
}

impl Chapter {
    pub fn new(title: String, text: String) -> Self {
        let word_count = text.split_whitespace().count();
        let token_count = text.len() / 4;

        Self {
            title,
            text,
            word_count,
            token_count,
        }
    }
}

/// Parses an e-book into ordered chapter records and filters out
/// non-narrative sections (front matter, licensing, stubs).
#[derive(Debug, Clone)]
pub struct ChapterExtractor {
    /// Chapters below this word count are dropped
    pub min_word_count: usize,
    /// Chapters whose title contains one of these (case-insensitive) are dropped
    pub excluded_title_words: Vec<String>,
    /// Chapters above this token estimate are split into fragments
    pub max_fragment_tokens: usize,
}

impl ChapterExtractor {
    pub fn new(
        min_word_count: usize,
        excluded_title_words: Vec<String>,
        max_fragment_tokens: usize,
    ) -> Self {
        Self {
            min_word_count,
            excluded_title_words,
            max_fragment_tokens,
        }
    }

    /// Extract all narrative chapters from an EPUB file, in spine order.
    pub fn extract(&self, path: &Path) -> Result<Vec<Chapter>> {
        if path.extension().map_or(true, |ext| ext != "epub") {
            return Err(anyhow!(
                "Unsupported source format: {} (only .epub is handled)",
                path.display()
            ));
        }

        let mut doc = EpubDoc::new(path)
            .map_err(|e| anyhow!("Failed to open epub {}: {}", path.display(), e))?;

        let mut chapters = Vec::new();
        let mut order = 0usize;

        // Walk the spine in reading order, one document per chapter.
        loop {
            if let Some((html, _mime)) = doc.get_current_str() {
                let title = extract_title(&html, order);
                let text = from_read(html.as_bytes(), 80);
                let text = text.trim().to_string();
                order += 1;

                if !text.is_empty() {
                    let chapter = Chapter::new(title, text);
                    debug!(
                        "Spine item {}: '{}' ({} words)",
                        order, chapter.title, chapter.word_count
                    );
                    chapters.push(chapter);
                }
            }

            if !doc.go_next() {
                break;
            }
        }

        let chapters = self.filter_chapters(chapters);

        info!(
            "📖 Extracted {} narrative chapters from {}",
            chapters.len(),
            path.display()
        );

        Ok(chapters)
    }

    /// Drop non-narrative sections: excluded title words and short stubs.
    pub fn filter_chapters(&self, chapters: Vec<Chapter>) -> Vec<Chapter> {
        chapters
            .into_iter()
            .filter(|chapter| {
                let title = chapter.title.to_lowercase();
                let excluded = self
                    .excluded_title_words
                    .iter()
                    .any(|word| title.contains(&word.to_lowercase()));
                !excluded && chapter.word_count > self.min_word_count
            })
            .collect()
    }

    /// Split an oversized chapter into fragments on paragraph boundaries so
    /// each stays within the generation token budget. Fragments inherit the
    /// chapter title with a part suffix; a chapter within budget comes back
    /// unchanged as a single fragment.
    pub fn split_into_fragments(&self, chapter: &Chapter) -> Vec<Chapter> {
        if chapter.token_count <= self.max_fragment_tokens {
            return vec![chapter.clone()];
        }

        let budget_chars = self.max_fragment_tokens * 4;
        let mut fragments = Vec::new();
        let mut buffer = String::new();

        for paragraph in chapter.text.split("\n\n") {
            if !buffer.is_empty() && buffer.len() + paragraph.len() + 2 > budget_chars {
                fragments.push(std::mem::take(&mut buffer));
            }
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
            }
            buffer.push_str(paragraph);
        }
        if !buffer.trim().is_empty() {
            fragments.push(buffer);
        }

        fragments
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                Chapter::new(format!("{} (part {})", chapter.title, i + 1), text)
            })
            .collect()
    }

    /// Human-readable chapter listing (title, token and word counts).
    pub fn summary(&self, chapters: &[Chapter]) -> String {
        let mut out = String::from("Chapter              Tokens   Words\n");
        for chapter in chapters {
            out.push_str(&format!(
                "{:<20} {:>6} {:>7}\n",
                truncate(&chapter.title, 20),
                chapter.token_count,
                chapter.word_count
            ));
        }
        out
    }
}

impl Default for ChapterExtractor {
    fn default() -> Self {
        Self {
            min_word_count: 200,
            excluded_title_words: vec![
                "license".to_string(),
                "about".to_string(),
                "untitled".to_string(),
            ],
            max_fragment_tokens: 6000,
        }
    }
}

/// First h1–h3 or title element in the chapter HTML, with a positional
/// fallback when the markup carries no heading.
fn extract_title(html: &str, order: usize) -> String {
    let heading = Regex::new(r"<(?:h[1-3]|title)[^>]*>([^<]+)</(?:h[1-3]|title)>")
        .expect("heading pattern is valid");

    if let Some(captures) = heading.captures(html) {
        let title = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        let title = title.trim();
        if !title.is_empty() {
            return title.to_string();
        }
    }

    format!("Chapter {}", order + 1)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
