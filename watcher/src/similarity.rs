//! Multi-signal similarity scoring
//!
//! Three independent views of a change are blended: word-set overlap
//! (Jaccard), character-level edit similarity, and structural tag-count
//! comparison. The blend classifies magnitude and, against the user's
//! threshold, decides whether to alert.

use crate::fingerprint::structure_profile;
use crate::store::{ChangeType, Fingerprint};
use serde::Serialize;
use similar::TextDiff;
use std::collections::{HashMap, HashSet};

const WEIGHT_JACCARD: f64 = 0.4;
const WEIGHT_LEVENSHTEIN: f64 = 0.4;
const WEIGHT_STRUCTURAL: f64 = 0.2;

const THRESHOLD_UI_TWEAK: f64 = 0.95;
const THRESHOLD_CONTENT_UPDATE: f64 = 0.70;

/// Score forced when structure is identical but the hashes disagree: the
/// text changed without the shape moving.
const STRUCTURAL_IDENTITY_CLAMP: f64 = 0.80;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimilarityMetrics {
    pub jaccard: f64,
    pub levenshtein: f64,
    pub structural: f64,
    pub final_score: f64,
}

pub struct SimilarityEngine;

impl SimilarityEngine {
    pub fn new() -> Self {
        Self
    }

    /// Word-level intersection over union, lowercased. Two empty texts
    /// are identical.
    pub fn jaccard(&self, a: &str, b: &str) -> f64 {
        let lowered_a = a.to_lowercase();
        let lowered_b = b.to_lowercase();
        let set_a: HashSet<&str> = lowered_a.split_whitespace().collect();
        let set_b: HashSet<&str> = lowered_b.split_whitespace().collect();
        let union = set_a.union(&set_b).count();
        if union == 0 {
            return 1.0;
        }
        set_a.intersection(&set_b).count() as f64 / union as f64
    }

    /// Character-level matching ratio in [0, 1], 2·M / (|a| + |b|) over
    /// longest-common-subsequence matches.
    pub fn levenshtein_ratio(&self, a: &str, b: &str) -> f64 {
        f64::from(TextDiff::from_chars(a, b).ratio())
    }

    /// How close the two documents' structural tag counts are.
    pub fn structural(&self, html_a: &str, html_b: &str) -> f64 {
        weight_overlap(&structure_profile(html_a), &structure_profile(html_b))
    }

    pub fn compare_content(
        &self,
        old_text: &str,
        new_text: &str,
        old_html: &str,
        new_html: &str,
    ) -> SimilarityMetrics {
        let jaccard = self.jaccard(old_text, new_text);
        let levenshtein = self.levenshtein_ratio(old_text, new_text);
        let structural = self.structural(old_html, new_html);
        let final_score = jaccard * WEIGHT_JACCARD
            + levenshtein * WEIGHT_LEVENSHTEIN
            + structural * WEIGHT_STRUCTURAL;
        SimilarityMetrics {
            jaccard: round4(jaccard),
            levenshtein: round4(levenshtein),
            structural: round4(structural),
            final_score: round4(final_score),
        }
    }

    pub fn classify(&self, score: f64) -> ChangeType {
        if score >= THRESHOLD_UI_TWEAK {
            ChangeType::UiTweak
        } else if score >= THRESHOLD_CONTENT_UPDATE {
            ChangeType::ContentUpdate
        } else {
            ChangeType::MajorOverhaul
        }
    }

    /// Lower similarity means more changed; the threshold is the minimum
    /// similarity the user still accepts as "unchanged enough".
    pub fn should_alert(&self, score: f64, user_threshold: f64) -> bool {
        score < user_threshold
    }

    /// Similarity from stored fingerprints alone, when no page body
    /// survives to compare. Equal hashes short-circuit to identical.
    pub fn calculate_similarity(&self, a: &Fingerprint, b: &Fingerprint) -> SimilarityMetrics {
        if a.hash == b.hash {
            return SimilarityMetrics {
                structural: 1.0,
                final_score: 1.0,
                ..SimilarityMetrics::default()
            };
        }
        if a.content_weights.is_empty() && b.content_weights.is_empty() {
            return SimilarityMetrics {
                final_score: 1.0,
                ..SimilarityMetrics::default()
            };
        }
        let structural = weight_overlap(&a.content_weights, &b.content_weights);
        let final_score = if structural >= 1.0 {
            STRUCTURAL_IDENTITY_CLAMP
        } else {
            structural
        };
        SimilarityMetrics {
            structural: round4(structural),
            final_score: round4(final_score),
            ..SimilarityMetrics::default()
        }
    }
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn weight_overlap(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let keys: HashSet<&String> = a.keys().chain(b.keys()).collect();
    if keys.is_empty() {
        return 1.0;
    }
    let mut diff = 0.0;
    let mut total = 0.0;
    for key in keys {
        let value_a = a.get(key).copied().unwrap_or(0.0);
        let value_b = b.get(key).copied().unwrap_or(0.0);
        diff += (value_a - value_b).abs();
        total += value_a + value_b;
    }
    if total == 0.0 {
        1.0
    } else {
        1.0 - diff / total
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
