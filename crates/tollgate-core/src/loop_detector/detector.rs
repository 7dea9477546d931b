//! Loop detector implementation

use super::similarity::{batch_text, jaccard};
use super::types::{
    LoopAction, LoopDetection, LoopDetectionConfig, LoopPattern, LoopType, MatchType,
};
use crate::error::{Error, Result};
use dashmap::DashMap;
use regex::Regex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tollgate_llm::Message;
use tracing::{debug, warn};

/// Confidence ceiling for exact matches
const MAX_EXACT_CONFIDENCE: f64 = 0.99;

/// Semantic confidence is the best similarity scaled by this factor
const SEMANTIC_WEIGHT: f64 = 0.9;

#[derive(Debug)]
struct History {
    entries: VecDeque<String>,
    last_seen: Instant,
}

#[derive(Debug)]
struct CompiledPattern {
    pattern: LoopPattern,
    regex: Option<Regex>,
}

impl CompiledPattern {
    fn count_in(&self, text: &str) -> usize {
        match &self.regex {
            Some(re) => re.find_iter(text).count(),
            None => text.matches(self.pattern.pattern.as_str()).count(),
        }
    }
}

/// Flags conversations that keep repeating themselves
///
/// Histories are bounded per conversation and stored under separate map
/// entries; the pattern set is shared and read-mostly.
#[derive(Debug)]
pub struct LoopDetector {
    config: LoopDetectionConfig,
    histories: DashMap<String, History>,
    patterns: RwLock<BTreeMap<String, CompiledPattern>>,
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(LoopDetectionConfig::default())
    }
}

impl LoopDetector {
    /// Create a detector
    #[must_use]
    pub fn new(config: LoopDetectionConfig) -> Self {
        Self {
            config,
            histories: DashMap::new(),
            patterns: RwLock::new(BTreeMap::new()),
        }
    }

    /// Settings in effect
    #[must_use]
    pub fn config(&self) -> &LoopDetectionConfig {
        &self.config
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Append a batch, evicting the oldest past the window size
    pub fn add_to_history(&self, conversation_id: &str, messages: &[Message]) {
        self.add_to_history_at(conversation_id, messages, Instant::now());
    }

    pub(crate) fn add_to_history_at(
        &self,
        conversation_id: &str,
        messages: &[Message],
        now: Instant,
    ) {
        let text = batch_text(messages);
        let mut history = self
            .histories
            .entry(conversation_id.to_string())
            .or_insert_with(|| History {
                entries: VecDeque::new(),
                last_seen: now,
            });
        history.entries.push_back(text);
        history.last_seen = now;
        while history.entries.len() > self.config.window_size.max(1) {
            history.entries.pop_front();
        }
    }

    /// Entries held for a conversation
    #[must_use]
    pub fn history_len(&self, conversation_id: &str) -> usize {
        self.histories
            .get(conversation_id)
            .map(|h| h.entries.len())
            .unwrap_or(0)
    }

    /// Conversations currently tracked
    #[must_use]
    pub fn tracked_conversations(&self) -> usize {
        self.histories.len()
    }

    /// Forget one conversation
    pub fn clear_history(&self, conversation_id: &str) {
        self.histories.remove(conversation_id);
    }

    /// Forget every conversation
    pub fn clear_all_history(&self) {
        self.histories.clear();
    }

    /// Forget conversations idle for longer than `history_ttl_secs`,
    /// returning how many were removed
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Instant::now())
    }

    pub(crate) fn cleanup_at(&self, now: Instant) -> usize {
        let ttl = Duration::from_secs(self.config.history_ttl_secs);
        let initial_count = self.histories.len();
        self.histories
            .retain(|_, h| now.saturating_duration_since(h.last_seen) < ttl);
        let removed = initial_count.saturating_sub(self.histories.len());
        if removed > 0 {
            debug!(removed, "Cleaned up idle conversation histories");
        }
        removed
    }

    // ========================================================================
    // Patterns
    // ========================================================================

    /// Register (or replace) a pattern
    pub fn add_pattern(&self, pattern: LoopPattern) -> Result<()> {
        if pattern.pattern.is_empty() {
            return Err(Error::InvalidPattern {
                id: pattern.id,
                message: "pattern text must not be empty".to_string(),
            });
        }
        if pattern.threshold == 0 {
            return Err(Error::InvalidPattern {
                id: pattern.id,
                message: "threshold must be at least 1".to_string(),
            });
        }
        let regex = match pattern.match_type {
            MatchType::Regex => Some(Regex::new(&pattern.pattern).map_err(|e| {
                Error::InvalidPattern {
                    id: pattern.id.clone(),
                    message: e.to_string(),
                }
            })?),
            MatchType::Exact => None,
        };

        debug!(pattern_id = %pattern.id, "Registered loop pattern");
        self.patterns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pattern.id.clone(), CompiledPattern { pattern, regex });
        Ok(())
    }

    /// Remove a pattern, returning whether it existed
    pub fn remove_pattern(&self, id: &str) -> bool {
        self.patterns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    /// Registered patterns, ordered by id
    #[must_use]
    pub fn list_patterns(&self) -> Vec<LoopPattern> {
        self.patterns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|p| p.pattern.clone())
            .collect()
    }

    // ========================================================================
    // Detection
    // ========================================================================

    /// Score an incoming batch against the conversation's history
    ///
    /// Runs the exact, semantic and pattern signals and returns the
    /// strongest. Does not modify history.
    #[must_use]
    pub fn detect(&self, conversation_id: &str, messages: &[Message]) -> LoopDetection {
        let incoming = batch_text(messages);
        let history: Vec<String> = self
            .histories
            .get(conversation_id)
            .map(|h| h.entries.iter().cloned().collect())
            .unwrap_or_default();

        let mut candidates = vec![
            self.detect_exact(&history, &incoming),
            self.detect_semantic(&history, &incoming),
        ];
        candidates.extend(self.detect_patterns(&history, &incoming));

        let result = candidates
            .into_iter()
            .max_by(|a, b| {
                a.is_loop
                    .cmp(&b.is_loop)
                    .then_with(|| a.confidence.total_cmp(&b.confidence))
            })
            .unwrap_or_else(|| LoopDetection::none(0.0));

        if result.is_loop {
            warn!(
                conversation_id,
                loop_type = ?result.loop_type,
                confidence = result.confidence,
                action = ?result.action,
                "Loop detected"
            );
        }
        result
    }

    /// Detect, then append the batch to history
    pub fn check_and_record(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> LoopDetection {
        let result = self.detect(conversation_id, messages);
        self.add_to_history(conversation_id, messages);
        result
    }

    fn detect_exact(&self, history: &[String], incoming: &str) -> LoopDetection {
        let matches = history.iter().filter(|h| h.as_str() == incoming).count();
        if matches >= self.config.exact_match_threshold.max(1) {
            let confidence = (0.9 + 0.02 * matches as f64).min(MAX_EXACT_CONFIDENCE);
            LoopDetection::flagged(
                LoopType::Exact,
                confidence,
                format!("identical to {matches} recent exchanges"),
            )
        } else {
            LoopDetection::none(0.0)
        }
    }

    fn detect_semantic(&self, history: &[String], incoming: &str) -> LoopDetection {
        let scores: Vec<f64> = history.iter().map(|h| jaccard(h, incoming)).collect();
        let best = scores.iter().copied().fold(0.0_f64, f64::max);
        let similar = scores
            .iter()
            .filter(|s| **s >= self.config.similarity_threshold)
            .count();
        let confidence = best * SEMANTIC_WEIGHT;

        if similar >= self.config.similar_match_threshold.max(1) {
            LoopDetection::flagged(
                LoopType::Semantic,
                confidence,
                format!("{similar} recent exchanges are near-identical"),
            )
        } else {
            LoopDetection::none(confidence)
        }
    }

    fn detect_patterns(&self, history: &[String], incoming: &str) -> Vec<LoopDetection> {
        let patterns = self.patterns.read().unwrap_or_else(|e| e.into_inner());
        patterns
            .values()
            .filter_map(|compiled| {
                let window = compiled.pattern.window;
                let skip = if window == 0 {
                    0
                } else {
                    history.len().saturating_sub(window)
                };
                let count: usize = history[skip..]
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(incoming))
                    .map(|text| compiled.count_in(text))
                    .sum();

                (count >= compiled.pattern.threshold as usize).then(|| LoopDetection {
                    is_loop: true,
                    loop_type: Some(LoopType::Pattern),
                    confidence: 1.0,
                    action: compiled.pattern.action,
                    pattern_id: Some(compiled.pattern.id.clone()),
                    reason: format!(
                        "pattern {} matched {count} times",
                        compiled.pattern.id
                    ),
                })
            })
            .collect()
    }
}

impl LoopDetection {
    /// Whether the caller should abort
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.is_loop && self.action == LoopAction::Stop
    }
}
