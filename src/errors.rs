use std::path::PathBuf;
use thiserror::Error;

/// Failure classes for the content pipeline.
///
/// Failures local to one script or package never abort sibling work in a
/// batch sweep; only `Io` indicates a broken precondition worth surfacing
/// to the caller.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Raw script text did not survive structural validation
    #[error("script rejected: {0}")]
    Parse(String),

    /// An external asset call (image/speech) failed after the retry
    #[error("asset generation failed for {kind} #{index}: {message}")]
    Generation {
        /// Asset kind ("image" or "audio")
        kind: &'static str,
        /// Index of the prompt/line within the substory
        index: usize,
        /// Underlying failure description
        message: String,
    },

    /// Video composition failed (missing asset, encoder error)
    #[error("video assembly failed for package {package}: {message}")]
    Assembly {
        /// Package directory the assembly ran against
        package: PathBuf,
        /// Underlying failure description
        message: String,
    },

    /// Missing directories/files during stage transitions
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True when the failure should leave the package in place for a
    /// later retry instead of counting it as permanently broken.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Generation { .. } | PipelineError::Assembly { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Generation {
            kind: "image",
            index: 2,
            message: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "asset generation failed for image #2: timeout"
        );
    }

    #[test]
    fn test_retryable_classes() {
        let assembly = PipelineError::Assembly {
            package: PathBuf::from("packages/x"),
            message: "codec".to_string(),
        };
        assert!(assembly.is_retryable());

        let parse = PipelineError::Parse("empty title".to_string());
        assert!(!parse.is_retryable());
    }
}
