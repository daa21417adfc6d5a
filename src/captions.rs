use serde::{Deserialize, Serialize};
use std::fmt;

/// One timestamped caption display window.
///
/// Times are seconds from the start of the substory's narration track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionCue {
    /// Start of the display window
    pub start: f64,
    /// End of the display window
    pub end: f64,
    /// Text shown on screen (display lines joined with '\n')
    pub text: String,
}

impl fmt::Display for CaptionCue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} --> {}\n{}",
            format_timestamp(self.start),
            format_timestamp(self.end),
            self.text
        )
    }
}

/// Maps narration lines plus their per-line audio durations into caption
/// cues suitable for on-screen display.
///
/// Pure function of its inputs: identical lines and durations always yield
/// the identical cue sequence.
#[derive(Debug, Clone)]
pub struct CaptionSegmenter {
    /// Maximum characters per display line
    pub chars_per_line: usize,
    /// Maximum display lines per cue
    pub max_lines_per_cue: usize,
}

impl CaptionSegmenter {
    pub fn new(chars_per_line: usize, max_lines_per_cue: usize) -> Self {
        Self {
            chars_per_line,
            max_lines_per_cue,
        }
    }

    /// Compute the cue sequence for one substory.
    ///
    /// `durations[i]` is the length in seconds of the audio clip narrating
    /// `lines[i]`. Each line's window `[S_i, E_i)` is divided evenly across
    /// the cues produced for that line, so the cues of line `i` end exactly
    /// where line `i + 1` begins and the whole sequence covers
    /// `[0, sum(durations))` with no gap or overlap.
    pub fn segment(&self, lines: &[String], durations: &[f64]) -> Vec<CaptionCue> {
        let mut cues = Vec::new();
        let mut line_start = 0.0_f64;

        for (line, &duration) in lines.iter().zip(durations.iter()) {
            let line_end = line_start + duration;
            let groups = self.group_display_lines(line);

            // Even time slice per cue; reading speed is deliberately not modeled.
            let slice = duration / groups.len().max(1) as f64;
            let mut start = line_start;

            for (i, text) in groups.iter().enumerate() {
                let end = if i + 1 == groups.len() {
                    // Last cue of the line lands exactly on the line boundary.
                    line_end
                } else {
                    start + slice
                };
                cues.push(CaptionCue {
                    start,
                    end,
                    text: text.clone(),
                });
                start = end;
            }

            line_start = line_end;
        }

        cues
    }

    /// Wrap one narration line and bundle the wrapped lines into cue texts
    /// of at most `max_lines_per_cue` display lines each.
    ///
    /// A whitespace-only line yields a single-space placeholder so the
    /// caption track still accounts for the clip's duration.
    fn group_display_lines(&self, line: &str) -> Vec<String> {
        let wrapped = self.wrap_words(line);

        if wrapped.is_empty() {
            return vec![" ".to_string()];
        }

        wrapped
            .chunks(self.max_lines_per_cue.max(1))
            .map(|chunk| chunk.join("\n"))
            .collect()
    }

    /// Greedy word wrap: accumulate words while they fit, starting a new
    /// display line otherwise. A single word wider than the line is split
    /// at the width boundary so no display line ever exceeds it.
    fn wrap_words(&self, line: &str) -> Vec<String> {
        let width = self.chars_per_line.max(1);
        let mut display_lines = Vec::new();
        let mut current = String::new();

        for word in line.split_whitespace() {
            for piece in split_oversized(word, width) {
                if current.is_empty() {
                    current = piece;
                } else if current.chars().count() + 1 + piece.chars().count() <= width {
                    current.push(' ');
                    current.push_str(&piece);
                } else {
                    display_lines.push(std::mem::take(&mut current));
                    current = piece;
                }
            }
        }

        if !current.is_empty() {
            display_lines.push(current);
        }

        display_lines
    }
}

impl Default for CaptionSegmenter {
    fn default() -> Self {
        Self::new(30, 2)
    }
}

/// Break a word longer than `width` into width-sized chunks on char
/// boundaries; shorter words pass through whole.
fn split_oversized(word: &str, width: usize) -> Vec<String> {
    if word.chars().count() <= width {
        return vec![word.to_string()];
    }

    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(width)
        .map(|c| c.iter().collect::<String>())
        .collect()
}

/// Render cues as an SRT document (1-based indices, `HH:MM:SS,mmm` stamps).
pub fn to_srt(cues: &[CaptionCue]) -> String {
    let mut out = String::new();

    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start),
            format_timestamp(cue.end),
            cue.text
        ));
    }

    out
}

/// Format seconds as an SRT timestamp (HH:MM:SS,mmm).
fn format_timestamp(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let total_seconds = total_millis / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
