//! Error classification
//!
//! Maps a raised failure to an [`ErrorKind`] by message pattern. Host errors
//! are opaque strings, so matching is generic and case-insensitive. Anything
//! unrecognized is `Persistent`, which the retry policy never retries.

use crate::error::ErrorKind;
use regex::{Regex, RegexSet, RegexSetBuilder};

const TRANSIENT_PATTERNS: &[&str] = &[
    r"time[d]?[\s_-]*out",
    r"rate[\s_-]*limit",
    r"too many requests",
    r"\bnetwork\b",
    r"connection",
    r"connectivity",
    r"temporar(il)?y",
    r"unavailable",
    r"try again",
    r"\b(429|503)\b",
];

const PARTIAL_PATTERNS: &[&str] = &[
    r"\blocked\b",
    r"read[\s_-]*only",
    r"node type",
    r"cannot be modified",
    r"not supported (on|for)",
];

const VALIDATION_PATTERNS: &[&str] = &[
    r"invalid",
    r"malformed",
    r"not found",
    r"does not exist",
    r"same source and target",
];

const PERSISTENT_PATTERNS: &[&str] = &[
    r"permission",
    r"unauthori[sz]ed",
    r"forbidden",
    r"access denied",
    r"not allowed",
];

/// Message-pattern error classifier
///
/// Rules are checked in precedence order: caller-supplied patterns first, then
/// transient, partial, validation and persistent built-ins.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    custom: Vec<(ErrorKind, Regex)>,
    rules: Vec<(ErrorKind, RegexSet)>,
}

impl ErrorClassifier {
    /// Classifier with the built-in pattern tables
    #[must_use]
    pub fn new() -> Self {
        let rules = [
            (ErrorKind::Transient, TRANSIENT_PATTERNS),
            (ErrorKind::Partial, PARTIAL_PATTERNS),
            (ErrorKind::Validation, VALIDATION_PATTERNS),
            (ErrorKind::Persistent, PERSISTENT_PATTERNS),
        ]
        .into_iter()
        .map(|(kind, patterns)| {
            let set = RegexSetBuilder::new(patterns)
                .case_insensitive(true)
                .build()
                .expect("built-in classifier patterns are valid");
            (kind, set)
        })
        .collect();

        Self {
            custom: Vec::new(),
            rules,
        }
    }

    /// Add a host-specific pattern, checked before the built-ins
    ///
    /// # Errors
    /// Returns the regex compile error for an invalid pattern.
    pub fn with_pattern(mut self, kind: ErrorKind, pattern: &str) -> Result<Self, regex::Error> {
        let regex = regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()?;
        self.custom.push((kind, regex));
        Ok(self)
    }

    /// Classify an error, including its `source()` chain
    #[must_use]
    pub fn classify(&self, error: &(dyn std::error::Error + 'static)) -> ErrorKind {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        self.classify_message(&message)
    }

    /// Classify a raw message
    #[must_use]
    pub fn classify_message(&self, message: &str) -> ErrorKind {
        if let Some((kind, _)) = self.custom.iter().find(|(_, re)| re.is_match(message)) {
            return *kind;
        }
        self.rules
            .iter()
            .find(|(_, set)| set.is_match(message))
            .map_or(ErrorKind::Persistent, |(kind, _)| *kind)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}
