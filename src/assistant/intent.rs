//! Keyword-gated, regex-confirmed intent classification.
//!
//! Each pattern carries groups of synonymous keywords. The overlap ratio is
//! the share of groups with at least one keyword present in the message;
//! only patterns with a ratio above [`KEYWORD_GATE`] have their regexes
//! tested. Among confirmed patterns the highest confidence wins and ties keep
//! table order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

pub const GENERAL_CONVERSATION: &str = "general_conversation";
pub const SLASH_COMMAND: &str = "slash_command";

/// Minimum keyword overlap ratio (exclusive) before regexes are tested
pub const KEYWORD_GATE: f64 = 0.5;

/// Added to `create_agenda` when the meeting has no agenda points yet
pub const EMPTY_AGENDA_BOOST: f64 = 0.1;

const GENERAL_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
    pub requires_function_call: bool,
}

impl IntentResult {
    fn general() -> Self {
        Self {
            intent: GENERAL_CONVERSATION.to_string(),
            confidence: GENERAL_CONFIDENCE,
            requires_function_call: false,
        }
    }
}

/// Application state the classifier may consult
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntentContext {
    pub agenda_count: usize,
    pub action_count: usize,
}

struct PatternDef {
    intent: &'static str,
    keywords: &'static [&'static [&'static str]],
    patterns: &'static [&'static str],
    base_confidence: f64,
    requires_function_call: bool,
}

const PATTERN_TABLE: &[PatternDef] = &[
    PatternDef {
        intent: "create_agenda",
        keywords: &[&["create", "add", "new", "make", "insert"], &["agenda"], &["point", "item", "topic", "entry"]],
        patterns: &[r"\b(?:create|add|new|make|insert)\b.*\bagenda"],
        base_confidence: 0.9,
        requires_function_call: true,
    },
    PatternDef {
        intent: "update_agenda",
        keywords: &[&["update", "rename", "change", "edit", "modify"], &["agenda"], &["point", "item", "topic", "entry"]],
        patterns: &[r"\b(?:update|rename|change|edit|modify)\b.*\bagenda"],
        base_confidence: 0.85,
        requires_function_call: true,
    },
    PatternDef {
        intent: "delete_agenda",
        keywords: &[&["delete", "remove", "drop"], &["agenda"], &["point", "item", "topic", "entry"]],
        patterns: &[r"\b(?:delete|remove|drop)\b.*\bagenda"],
        base_confidence: 0.85,
        requires_function_call: true,
    },
    PatternDef {
        intent: "list_agenda",
        keywords: &[&["list", "show", "display", "what"], &["agenda"]],
        patterns: &[r"\b(?:list|show|display|what)\b.*\bagenda"],
        base_confidence: 0.8,
        requires_function_call: true,
    },
    PatternDef {
        intent: "create_action",
        keywords: &[&["create", "add", "new", "make"], &["action", "task", "todo"]],
        patterns: &[r"\b(?:create|add|new|make)\b.*\b(?:action|task|todo)"],
        base_confidence: 0.9,
        requires_function_call: true,
    },
    PatternDef {
        intent: "assign_action",
        keywords: &[&["assign", "delegate"], &["action", "task", "todo"]],
        patterns: &[
            r"\b(?:assign|delegate)\w*\b.*\b(?:action|task|todo)",
            r"\b(?:action|task|todo)\b.*\b(?:assign|delegate)",
        ],
        base_confidence: 0.85,
        requires_function_call: true,
    },
    PatternDef {
        intent: "update_action_status",
        keywords: &[&["mark", "set", "complete", "finish", "close"], &["action", "task", "todo"]],
        patterns: &[r"\b(?:mark|set|complete|finish|close)\b.*\b(?:action|task|todo)"],
        base_confidence: 0.85,
        requires_function_call: true,
    },
    PatternDef {
        intent: "list_actions",
        keywords: &[&["list", "show", "display", "what"], &["action", "task", "todo"]],
        patterns: &[r"\b(?:list|show|display|what)\b.*\b(?:action|task|todo)"],
        base_confidence: 0.8,
        requires_function_call: true,
    },
    PatternDef {
        intent: "meeting_summary",
        keywords: &[&["summarize", "summary", "recap", "overview"]],
        patterns: &[r"\b(?:summari[sz]e|summary|recap|overview)\b"],
        base_confidence: 0.75,
        requires_function_call: false,
    },
];

struct CompiledPattern {
    def: &'static PatternDef,
    regexes: Vec<Regex>,
}

pub struct IntentClassifier {
    patterns: Vec<CompiledPattern>,
    cache: Mutex<HashMap<String, IntentResult>>,
}

impl IntentClassifier {
    pub fn new() -> Self {
        let patterns = PATTERN_TABLE
            .iter()
            .map(|def| CompiledPattern {
                def,
                regexes: def
                    .patterns
                    .iter()
                    .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
                    .collect(),
            })
            .collect();

        Self {
            patterns,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Classify a message; results are memoized by its trimmed lowercase text
    pub fn classify(&self, message: &str, ctx: &IntentContext) -> IntentResult {
        let key = message.trim().to_lowercase();

        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                tracing::debug!("Intent cache hit: {}", hit.intent);
                return hit.clone();
            }
        }

        let result = self.classify_uncached(&key, ctx);
        tracing::debug!(
            "Intent: {} ({:.2}) function_call={}",
            result.intent,
            result.confidence,
            result.requires_function_call
        );

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result.clone());
        }
        result
    }

    fn classify_uncached(&self, text: &str, ctx: &IntentContext) -> IntentResult {
        if text.starts_with('/') {
            return IntentResult {
                intent: SLASH_COMMAND.to_string(),
                confidence: 1.0,
                requires_function_call: false,
            };
        }

        let tokens = tokenize(text);
        let mut best: Option<IntentResult> = None;

        for pattern in &self.patterns {
            let ratio = keyword_overlap(&tokens, pattern.def.keywords);
            if ratio <= KEYWORD_GATE {
                continue;
            }
            if !pattern.regexes.iter().any(|re| re.is_match(text)) {
                continue;
            }

            let mut confidence = pattern.def.base_confidence * (0.5 + 0.5 * ratio);
            if pattern.def.intent == "create_agenda" && ctx.agenda_count == 0 {
                confidence += EMPTY_AGENDA_BOOST;
            }
            let confidence = confidence.clamp(0.0, 1.0);

            // Strictly greater: earlier table entries win ties
            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(IntentResult {
                    intent: pattern.def.intent.to_string(),
                    confidence,
                    requires_function_call: pattern.def.requires_function_call,
                });
            }
        }

        best.unwrap_or_else(IntentResult::general)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Share of keyword groups with at least one keyword prefixing a token
fn keyword_overlap(tokens: &[&str], groups: &[&[&str]]) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    let matched = groups
        .iter()
        .filter(|group| group.iter().any(|kw| tokens.iter().any(|t| t.starts_with(kw))))
        .count();
    matched as f64 / groups.len() as f64
}
