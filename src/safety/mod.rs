//! Pattern-based static scan of generated source.
//!
//! Three independent heuristic passes (a blocklist scan, a required-marker
//! scan, and a secret scan) plus a hard byte ceiling. The passes are
//! explicitly best-effort: this is a guard rail for obviously bad output,
//! not a sandbox or a security boundary. Errors forbid the commit; warnings
//! are surfaced to the caller alongside it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for the validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Hard ceiling on candidate source size, in bytes
    pub max_source_bytes: usize,
    /// Entry-point names that must appear somewhere in the candidate
    pub required_markers: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: 1024 * 1024,
            required_markers: Vec::new(),
        }
    }
}

/// Structured result of a validation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Any error forbids the commit; warnings alone permit it.
    pub fn commit_allowed(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Constructs that are disallowed outright
const DANGEROUS_PATTERNS: &[(&str, &str)] = &[
    (r"\beval\s*\(", "dynamic code evaluation"),
    (r"new\s+Function\s*\(", "dynamic function construction"),
    (r"process\.exit\s*\(", "process termination call"),
    (r"std::process::exit", "process termination call"),
    (r"rm\s+-rf\s+/", "filesystem-destructive command"),
    (r"fs\.rm(dir)?Sync\s*\(", "filesystem-destructive call"),
];

/// Constructs that are merely suspicious
const SUSPICIOUS_PATTERNS: &[(&str, &str)] = &[
    (r"while\s*\(\s*true\s*\)", "potentially unbounded loop"),
    (r"loop\s*\{\s*\}", "empty infinite loop"),
    (r"child_process", "subprocess spawning"),
    (r#"XMLHttpRequest|fetch\s*\(\s*['"]http"#, "outbound network call"),
];

/// Shapes of credentials that should never land in committed source
const SECRET_PATTERNS: &[(&str, &str)] = &[
    (r"sk-[A-Za-z0-9_-]{20,}", "API key-shaped token"),
    (r"AKIA[0-9A-Z]{16}", "AWS access key-shaped token"),
    (r"ghp_[A-Za-z0-9]{36}", "GitHub token-shaped value"),
    (r"AIza[0-9A-Za-z_-]{35}", "Google API key-shaped token"),
];

/// Compiled pattern sets plus configuration.
pub struct SafetyValidator {
    config: SafetyConfig,
    dangerous: Vec<(Regex, &'static str)>,
    suspicious: Vec<(Regex, &'static str)>,
    secrets: Vec<(Regex, &'static str)>,
}

fn compile(patterns: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    patterns
        .iter()
        .map(|(pattern, label)| {
            (
                Regex::new(pattern).expect("static safety pattern must compile"),
                *label,
            )
        })
        .collect()
}

impl SafetyValidator {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            dangerous: compile(DANGEROUS_PATTERNS),
            suspicious: compile(SUSPICIOUS_PATTERNS),
            secrets: compile(SECRET_PATTERNS),
        }
    }

    /// Run all passes over the candidate source.
    ///
    /// The previous source is consulted only for proportion checks; the
    /// scans themselves judge the candidate alone.
    pub fn validate(&self, candidate: &str, previous: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        if candidate.len() > self.config.max_source_bytes {
            report.errors.push(format!(
                "candidate source is {} bytes, over the {}-byte ceiling",
                candidate.len(),
                self.config.max_source_bytes
            ));
        }

        for (pattern, label) in &self.dangerous {
            if pattern.is_match(candidate) {
                report.errors.push(format!("disallowed construct: {}", label));
            }
        }

        for (pattern, label) in &self.suspicious {
            if pattern.is_match(candidate) {
                report.warnings.push(format!("suspicious construct: {}", label));
            }
        }

        // Availability over strictness: a missing entry point is a warning,
        // not a hard failure.
        for marker in &self.config.required_markers {
            if !candidate.contains(marker.as_str()) {
                report
                    .warnings
                    .push(format!("required entry point '{}' is missing", marker));
            }
        }

        for (pattern, label) in &self.secrets {
            if pattern.is_match(candidate) {
                report.warnings.push(format!("possible secret: {}", label));
            }
        }

        if !previous.is_empty() && candidate.len() * 2 < previous.len() {
            report.warnings.push(format!(
                "candidate shrank from {} to {} bytes",
                previous.len(),
                candidate.len()
            ));
        }

        debug!(
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "safety validation finished"
        );
        report
    }
}
