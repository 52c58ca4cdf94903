//! Denylist content filter.
//!
//! The filter is an ordered list of rules.  A rule matches when any of its
//! regular expressions or literal substrings occurs in the text; matching is
//! case-insensitive and nothing else is normalised.  Evaluation stops at the
//! first matching rule.  This is a denylist, not a classifier: spellings the
//! rule authors did not anticipate get through.

use std::sync::Arc;

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::Deserialize;

use crate::util::ac_for;

/// A rule as written in the rules file.
#[derive(Clone, Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    /// Free-form label reported in logs when the rule fires.
    pub category: String,
    /// Regular expressions, compiled case-insensitively.
    #[serde(default, rename = "regex")]
    pub patterns: Vec<String>,
    /// Literal substrings.
    #[serde(default)]
    pub contains: Vec<String>,
}

/// Rule set loaded from `WORDGATE_FILTER_RULES` or the built-in defaults.
#[derive(Clone, Debug, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

fn rule(category: &str, patterns: &[&str]) -> FilterRule {
    FilterRule {
        category: category.to_owned(),
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        contains: Vec::new(),
    }
}

/// Built-in rules.  The slur entries spell out the digit look-alikes
/// (`1` for `i`) explicitly.
pub fn default_rules() -> Vec<FilterRule> {
    vec![
        rule("sexual", &[r"\b(porn|porno|sex|xxx|nsfw|nude|naked)\b"]),
        rule(
            "hate",
            &[
                r"\b(hate|racist|discrimination|bigot|slur)\b",
                r"\b(n[1i]gg[ae]r|n[1i]gg[ae]rs?)\b",
                r"\b(k[1i]ke|k[1i]kes?)\b",
                r"\b(ch[1i]nk|ch[1i]nks?)\b",
                r"\b(sp[1i]c|sp[1i]cs?)\b",
                r"\b(wetback|towelhead|sandn[1i]gger)\b",
            ],
        ),
        rule("violence", &[r"\b(violence|kill|murder|suicide|harm)\b"]),
        rule("scam", &[r"\b(spam|scam|phishing)\b"]),
    ]
}

struct CompiledRule {
    category: String,
    regexes: Vec<Regex>,
    literals: Option<Arc<AhoCorasick>>,
}

impl CompiledRule {
    /// `folded` is `text` lowercased; literals are matched against it.
    fn is_match(&self, text: &str, folded: &str) -> bool {
        if let Some(ac) = &self.literals {
            if ac.is_match(folded) {
                return true;
            }
        }
        self.regexes.iter().any(|re| re.is_match(text))
    }
}

impl From<&FilterRule> for CompiledRule {
    fn from(r: &FilterRule) -> Self {
        let mut regexes = Vec::new();
        for pat in &r.patterns {
            match Regex::new(&format!("(?i){}", pat)) {
                Ok(re) => regexes.push(re),
                Err(err) => {
                    tracing::warn!(category = %r.category, pattern = %pat, error = ?err, "failed to compile filter regex, ignoring");
                }
            }
        }
        let literals = if r.contains.is_empty() {
            None
        } else {
            ac_for(&r.contains)
        };
        CompiledRule {
            category: r.category.clone(),
            regexes,
            literals,
        }
    }
}

/// Compiled, immutable rule set.  Cheap to share behind an `Arc`.
pub struct ContentFilter {
    rules: Vec<CompiledRule>,
}

impl ContentFilter {
    pub fn new(rules: &[FilterRule]) -> Self {
        const MAX_PATTERNS: usize = 50;
        const MAX_PATTERN_LEN: usize = 500;
        let mut compiled = Vec::with_capacity(rules.len());
        for r in rules {
            let mut safe = r.clone();
            if safe.patterns.len() > MAX_PATTERNS {
                tracing::warn!(
                    category = %safe.category,
                    pattern_count = safe.patterns.len(),
                    limit = MAX_PATTERNS,
                    "filter rule regex list truncated"
                );
                safe.patterns.truncate(MAX_PATTERNS);
            }
            safe.patterns.retain(|p| {
                if p.len() > MAX_PATTERN_LEN {
                    tracing::warn!(
                        len = p.len(),
                        limit = MAX_PATTERN_LEN,
                        "dropping oversized filter regex pattern"
                    );
                    return false;
                }
                true
            });
            compiled.push(CompiledRule::from(&safe));
        }
        Self { rules: compiled }
    }

    pub fn from_config(cfg: &FilterConfig) -> Self {
        Self::new(&cfg.rules)
    }

    /// Category of the first rule matching `text`, if any.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let folded = text.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.is_match(text, &folded))
            .map(|r| r.category.as_str())
    }

    pub fn is_blocked(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}
