//! Loop detection types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Signal that flagged a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    /// Identical batch seen repeatedly
    Exact,
    /// Near-identical batch seen repeatedly
    Semantic,
    /// Registered pattern matched often enough
    Pattern,
}

impl fmt::Display for LoopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Semantic => write!(f, "semantic"),
            Self::Pattern => write!(f, "pattern"),
        }
    }
}

/// What the caller should do about a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopAction {
    /// Continue, but tell the user
    #[default]
    Warn,
    /// Abort the conversation
    Stop,
}

/// How a pattern's text is matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Plain substring
    #[default]
    Exact,
    /// Regular expression
    Regex,
}

/// A registered detection rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopPattern {
    /// Pattern id
    pub id: String,
    /// Match type
    #[serde(default)]
    pub match_type: MatchType,
    /// Substring or regular expression
    pub pattern: String,
    /// Matches needed within the window to flag a loop
    pub threshold: u32,
    /// Most recent history entries to scan; 0 scans the whole history
    #[serde(default)]
    pub window: usize,
    /// Action to surface
    #[serde(default)]
    pub action: LoopAction,
}

impl LoopPattern {
    /// Substring pattern
    #[must_use]
    pub fn exact(id: impl Into<String>, pattern: impl Into<String>, threshold: u32) -> Self {
        Self {
            id: id.into(),
            match_type: MatchType::Exact,
            pattern: pattern.into(),
            threshold,
            window: 0,
            action: LoopAction::Warn,
        }
    }

    /// Regular-expression pattern
    #[must_use]
    pub fn regex(id: impl Into<String>, pattern: impl Into<String>, threshold: u32) -> Self {
        Self {
            match_type: MatchType::Regex,
            ..Self::exact(id, pattern, threshold)
        }
    }

    /// Limit the scan to the most recent entries
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Set the surfaced action
    #[must_use]
    pub fn with_action(mut self, action: LoopAction) -> Self {
        self.action = action;
        self
    }
}

/// Detection thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopDetectionConfig {
    /// History entries kept per conversation
    pub window_size: usize,
    /// Identical entries needed for an exact loop
    pub exact_match_threshold: usize,
    /// Similarity at which an entry counts as near-identical
    pub similarity_threshold: f64,
    /// Near-identical entries needed for a semantic loop
    pub similar_match_threshold: usize,
    /// Seconds without new messages before a conversation is forgotten
    pub history_ttl_secs: u64,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            exact_match_threshold: 3,
            similarity_threshold: 0.8,
            similar_match_threshold: 2,
            history_ttl_secs: 3_600,
        }
    }
}

/// Outcome of a detection pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopDetection {
    /// Whether a loop was flagged
    pub is_loop: bool,
    /// Signal that fired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_type: Option<LoopType>,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// Suggested action
    pub action: LoopAction,
    /// Pattern that fired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    /// Human-readable explanation
    pub reason: String,
}

impl LoopDetection {
    pub(crate) fn none(confidence: f64) -> Self {
        Self {
            is_loop: false,
            loop_type: None,
            confidence,
            action: LoopAction::Warn,
            pattern_id: None,
            reason: "no loop detected".to_string(),
        }
    }

    pub(crate) fn flagged(loop_type: LoopType, confidence: f64, reason: String) -> Self {
        Self {
            is_loop: true,
            loop_type: Some(loop_type),
            confidence,
            action: LoopAction::Warn,
            pattern_id: None,
            reason,
        }
    }
}
