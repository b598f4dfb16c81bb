//! Content fingerprinting
//!
//! Turns a raw page body into a stable identity: anti-bot walls are
//! rejected outright, dynamic noise (dates, session ids, countdowns) is
//! stripped, chrome zones (nav/footer/header/aside) are excluded, and the
//! remaining text hashes into a 128-bit digest alongside a structural
//! tag-count profile.

use crate::errors::FingerprintError;
use crate::store::Fingerprint;
use md5::{Digest, Md5};
use regex::{Regex, RegexBuilder};
use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};
use std::collections::HashMap;

pub const FINGERPRINT_VERSION: &str = "v2.0";
const ALGORITHM: &str = "weighted_semantic_v2";

/// Fixed vocabulary for the structural profile, shared with the
/// similarity engine.
pub const STRUCTURAL_TAGS: [&str; 12] = [
    "div", "p", "span", "h1", "h2", "h3", "table", "ul", "li", "article", "section", "nav",
];

const BLOCK_INDICATORS: [&str; 9] = [
    "cloudflare",
    "ddos-guard",
    "captcha",
    "please verify you are human",
    "just a moment...",
    "access denied",
    "security check",
    "attention required",
    "ray id",
];

const BLOCKED_TITLES: [&str; 5] = [
    "access denied",
    "blocked",
    "security check",
    "captcha",
    "just a moment",
];

/// Subtrees that never contribute text.
const REMOVED_TAGS: [&str; 7] = ["script", "style", "meta", "link", "noscript", "iframe", "svg"];

/// Zones excluded from the baseline hash.
const SKIPPED_ZONES: [&str; 4] = ["nav", "footer", "header", "aside"];

const NOISE_PATTERNS: [&str; 9] = [
    r"\d{4}-\d{2}-\d{2}",                  // YYYY-MM-DD
    r"\d{2}/\d{2}/\d{4}",                  // DD/MM/YYYY
    r"\d{1,2}:\d{2}(:\d{2})?",             // HH:MM(:SS)
    r"session[\s_-]?id\s*[:=]\s*[\w-]+",
    r"ray\s*id\s*[:=]\s*\w+",
    r"last updated\s*:?.*",
    r"copyright\s*©\s*\d{4}",
    r"time remaining:.*",
    r"token\s*[:=]\s*[\w-]+",
];

pub struct Fingerprinter {
    noise: Regex,
}

impl Fingerprinter {
    pub fn new() -> Self {
        let pattern = NOISE_PATTERNS.join("|");
        let noise = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .expect("noise patterns are valid regex");
        Self { noise }
    }

    /// Whether the document is an anti-bot wall rather than content.
    pub fn is_block_page(&self, html: &str) -> bool {
        let document = Html::parse_document(html);
        if let Ok(selector) = Selector::parse("title") {
            if let Some(title) = document.select(&selector).next() {
                let title_text = title.text().collect::<String>().to_lowercase();
                if BLOCKED_TITLES
                    .iter()
                    .any(|phrase| title_text.contains(phrase))
                {
                    return true;
                }
            }
        }
        let lowered = html.to_lowercase();
        BLOCK_INDICATORS
            .iter()
            .any(|indicator| lowered.contains(indicator))
    }

    pub fn generate(&self, html: &str) -> Result<Fingerprint, FingerprintError> {
        self.generate_scoped(html, None)
    }

    /// Fingerprint the document, optionally restricting text extraction
    /// to the first subtree matching a CSS selector. The structural
    /// profile always covers the whole document.
    pub fn generate_scoped(
        &self,
        html: &str,
        selector: Option<&str>,
    ) -> Result<Fingerprint, FingerprintError> {
        if self.is_block_page(html) {
            return Err(FingerprintError::BlockPage);
        }
        let document = Html::parse_document(html);
        let scope = selector
            .and_then(|raw| Selector::parse(raw).ok())
            .and_then(|parsed| document.select(&parsed).next().map(|element| *element))
            .unwrap_or_else(|| document.tree.root());

        let stable = self.collect_text(scope);
        let mut hasher = Md5::new();
        hasher.update(stable.as_bytes());

        Ok(Fingerprint {
            hash: hex::encode(hasher.finalize()),
            version: FINGERPRINT_VERSION.to_string(),
            algorithm: ALGORITHM.to_string(),
            content_weights: profile_document(&document),
            structure_signature: String::new(),
        })
    }

    /// The noise-stripped text the hash is computed over; also feeds the
    /// full similarity comparison when an old body is available.
    pub fn extract_stable_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        self.collect_text(document.tree.root())
    }

    fn collect_text(&self, scope: NodeRef<'_, Node>) -> String {
        let mut parts: Vec<String> = Vec::new();
        for node in scope.descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if in_removed_subtree(&node) || in_skipped_zone(&node) {
                continue;
            }
            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            let cleaned = self.noise.replace_all(trimmed, "");
            let cleaned = cleaned.trim();
            // Single characters left over after cleaning carry no signal.
            if cleaned.chars().count() > 2 {
                parts.push(cleaned.to_string());
            }
        }
        parts.join(" ")
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

fn in_removed_subtree(node: &NodeRef<'_, Node>) -> bool {
    node.ancestors().any(|ancestor| {
        ancestor
            .value()
            .as_element()
            .is_some_and(|element| REMOVED_TAGS.contains(&element.name()))
    })
}

/// Only the nearest enclosing element decides zone membership.
fn in_skipped_zone(node: &NodeRef<'_, Node>) -> bool {
    for ancestor in node.ancestors() {
        if let Some(element) = ancestor.value().as_element() {
            return SKIPPED_ZONES.contains(&element.name());
        }
    }
    false
}

/// Tag counts over the structural vocabulary for a parsed document.
fn profile_document(document: &Html) -> HashMap<String, f64> {
    let mut counts: HashMap<String, f64> = HashMap::new();
    for node in document.tree.root().descendants() {
        if let Some(element) = node.value().as_element() {
            let name = element.name();
            if STRUCTURAL_TAGS.contains(&name) {
                *counts.entry(name.to_string()).or_insert(0.0) += 1.0;
            }
        }
    }
    counts
}

/// Tag counts for a raw HTML string.
pub fn structure_profile(html: &str) -> HashMap<String, f64> {
    profile_document(&Html::parse_document(html))
}
