//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "agent",
    "context",
    "compaction",
    "queue",
    "session",
    "provider",
    "logging",
    "tools",
];

/// Known fields for each section, keyed by section name.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    (
        "agent",
        &[
            "model",
            "max_iterations",
            "temperature",
            "max_tokens",
            "system_prompt",
            "think_level",
            "history_turn_limit",
        ],
    ),
    (
        "context",
        &[
            "context_limit",
            "warn_percent",
            "tool_overhead_tokens",
            "image_chars",
        ],
    ),
    (
        "compaction",
        &[
            "enabled",
            "target_ratio",
            "recent_turns_to_keep",
            "summary_max_tokens",
        ],
    ),
    (
        "queue",
        &["max_concurrent", "warn_after_ms", "global_max_concurrent"],
    ),
    ("session", &["storage", "dir", "max_idle_secs"]),
    ("provider", &["api_base", "api_key", "timeout_secs"]),
    ("logging", &["level", "format", "file"]),
    ("tools", &["security", "allow"]),
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Warn,
    Error,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_field(path: String, key: &str, known: &[&str]) -> Diagnostic {
    let message = match suggest_field(key, known) {
        Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
        None => format!("Unknown field '{}'", key),
    };
    Diagnostic {
        level: DiagnosticLevel::Warn,
        path,
        message,
    }
}

/// Validate a raw JSON config value against known field names.
///
/// Returns an empty list when every field is recognized.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic {
                level: DiagnosticLevel::Error,
                path: String::new(),
                message: "Config must be a JSON object".to_string(),
            });
            return diagnostics;
        }
    };

    let known_set: HashSet<&str> = KNOWN_TOP_LEVEL.iter().copied().collect();
    for key in obj.keys() {
        if !known_set.contains(key.as_str()) {
            diagnostics.push(unknown_field(key.clone(), key, KNOWN_TOP_LEVEL));
        }
    }

    for (section, known) in KNOWN_SECTIONS {
        let Some(fields) = obj.get(*section).and_then(|v| v.as_object()) else {
            continue;
        };
        for key in fields.keys() {
            if !known.contains(&key.as_str()) {
                diagnostics.push(unknown_field(format!("{}.{}", section, key), key, known));
            }
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("queue", "queue"), 0);
    }

    #[test]
    fn test_valid_config_has_no_diagnostics() {
        let raw = json!({"agent": {"model": "llama3.1"}, "queue": {"warn_after_ms": 10}});
        assert!(validate_config(&raw).is_empty());
    }

    #[test]
    fn test_unknown_top_level_with_suggestion() {
        let raw = json!({"agnet": {}});
        let diags = validate_config(&raw);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].path, "agnet");
        assert!(diags[0].message.contains("did you mean 'agent'?"));
    }

    #[test]
    fn test_unknown_nested_field() {
        let raw = json!({"compaction": {"recent_turns": 4}});
        let diags = validate_config(&raw);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].path, "compaction.recent_turns");
        assert_eq!(diags[0].level, DiagnosticLevel::Warn);
    }

    #[test]
    fn test_non_object_is_error() {
        let diags = validate_config(&json!([1, 2]));
        assert_eq!(diags[0].level, DiagnosticLevel::Error);
        assert!(diags[0].to_string().starts_with("[ERROR]"));
    }
}
