//! Fixed-delimiter patch protocol: parsing and application.
//!
//! This is the wire contract between the orchestrator and any generation
//! backend: a narrow protocol, not a general diff format. A patch is a
//! sequence of blocks:
//!
//! ```text
//! REPLACE-START
//! <anchor lines>
//! WITH-MARK
//! <replacement lines>
//! BLOCK-END
//!
//! INSERT-AFTER-START
//! <anchor lines>
//! CONTENT-MARK
//! <content lines>
//! BLOCK-END
//! ```
//!
//! Application runs two clearly separated passes per operation: an exact
//! substring match first, then a whitespace-normalized sliding-window
//! fallback. An operation whose anchor matches neither way is a recorded
//! no-op: the [`ApplyReport`] carries it so callers can distinguish a
//! partially applied patch from a clean one.

use serde::{Deserialize, Serialize};

pub const REPLACE_START: &str = "REPLACE-START";
pub const WITH_MARK: &str = "WITH-MARK";
pub const BLOCK_END: &str = "BLOCK-END";
pub const INSERT_AFTER_START: &str = "INSERT-AFTER-START";
pub const CONTENT_MARK: &str = "CONTENT-MARK";

/// One parsed patch operation. Purely transient: parsed from patch text,
/// applied, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PatchOp {
    Replace { anchor: String, replacement: String },
    InsertAfter { anchor: String, content: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatchError {
    /// The text contains no recognized patch block
    #[error("patch contains no recognized operation blocks")]
    InvalidFormat,
    /// A block opened but its markers never balanced
    #[error("unterminated {block} block starting at line {line}")]
    Unterminated { block: &'static str, line: usize },
}

/// Outcome of applying a parsed patch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Count of operations that changed the source
    pub applied: usize,
    /// Indices (into the parsed op sequence) of anchors that matched nothing
    pub skipped: Vec<usize>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Whether the text contains at least one recognized block delimiter.
///
/// Generation replies are required to carry one before the patch is parsed
/// in earnest.
pub fn contains_marker(text: &str) -> bool {
    text.contains(REPLACE_START) || text.contains(INSERT_AFTER_START)
}

/// Parse patch text into its ordered operation sequence.
///
/// Markers must sit on their own lines. Text outside blocks (prose from the
/// generating backend) is ignored. A patch with no recognized block is
/// rejected.
pub fn parse(patch: &str) -> Result<Vec<PatchOp>, PatchError> {
    let lines: Vec<&str> = patch.lines().collect();
    let mut ops = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        match lines[i].trim() {
            REPLACE_START => {
                let (anchor, rest) = collect_until(&lines, i + 1, WITH_MARK)
                    .ok_or(PatchError::Unterminated {
                        block: REPLACE_START,
                        line: i + 1,
                    })?;
                let (replacement, end) = collect_until(&lines, rest, BLOCK_END)
                    .ok_or(PatchError::Unterminated {
                        block: REPLACE_START,
                        line: i + 1,
                    })?;
                ops.push(PatchOp::Replace {
                    anchor,
                    replacement,
                });
                i = end;
            }
            INSERT_AFTER_START => {
                let (anchor, rest) = collect_until(&lines, i + 1, CONTENT_MARK)
                    .ok_or(PatchError::Unterminated {
                        block: INSERT_AFTER_START,
                        line: i + 1,
                    })?;
                let (content, end) = collect_until(&lines, rest, BLOCK_END)
                    .ok_or(PatchError::Unterminated {
                        block: INSERT_AFTER_START,
                        line: i + 1,
                    })?;
                ops.push(PatchOp::InsertAfter { anchor, content });
                i = end;
            }
            _ => i += 1,
        }
    }

    if ops.is_empty() {
        return Err(PatchError::InvalidFormat);
    }
    Ok(ops)
}

/// Collect lines from `start` until a line equal to `marker`; returns the
/// joined section and the index just past the marker.
fn collect_until(lines: &[&str], start: usize, marker: &str) -> Option<(String, usize)> {
    let mut section = Vec::new();
    for (offset, line) in lines[start..].iter().enumerate() {
        if line.trim() == marker {
            return Some((section.join("\n"), start + offset + 1));
        }
        section.push(*line);
    }
    None
}

/// Apply operations in order, returning the new source and a report.
pub fn apply(source: &str, ops: &[PatchOp]) -> (String, ApplyReport) {
    let mut current = source.to_string();
    let mut report = ApplyReport::default();

    for (index, op) in ops.iter().enumerate() {
        let changed = match op {
            PatchOp::Replace {
                anchor,
                replacement,
            } => apply_replace(&mut current, anchor, replacement),
            PatchOp::InsertAfter { anchor, content } => {
                apply_insert_after(&mut current, anchor, content)
            }
        };
        if changed {
            report.applied += 1;
        } else {
            report.skipped.push(index);
        }
    }

    (current, report)
}

/// Exact pass first: replace the first verbatim occurrence. Fuzzy pass
/// second: whitespace-normalized window scan.
fn apply_replace(source: &mut String, anchor: &str, replacement: &str) -> bool {
    if source.contains(anchor) {
        *source = source.replacen(anchor, replacement, 1);
        return true;
    }
    fuzzy_replace(source, anchor, replacement)
}

/// Insertion has only the exact pass: content lands immediately after the
/// first verbatim occurrence of the anchor.
fn apply_insert_after(source: &mut String, anchor: &str, content: &str) -> bool {
    match source.find(anchor) {
        Some(position) => {
            let insert_at = position + anchor.len();
            source.insert_str(insert_at, &format!("\n{}", content));
            true
        }
        None => false,
    }
}

/// Collapse runs of whitespace to single spaces for tolerant comparison.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic first-match window scan: window sizes equal the anchor's
/// line count, windows compare after whitespace normalization, and the first
/// matching line range is replaced. No scoring, no ties.
fn fuzzy_replace(source: &mut String, anchor: &str, replacement: &str) -> bool {
    let anchor_norm = normalize(anchor);
    if anchor_norm.is_empty() {
        return false;
    }
    let window = anchor.lines().count().max(1);
    let lines: Vec<&str> = source.lines().collect();
    if lines.len() < window {
        return false;
    }

    for start in 0..=(lines.len() - window) {
        let candidate = lines[start..start + window].join("\n");
        if normalize(&candidate) == anchor_norm {
            let mut rebuilt: Vec<&str> = Vec::with_capacity(lines.len());
            rebuilt.extend_from_slice(&lines[..start]);
            rebuilt.extend(replacement.lines());
            rebuilt.extend_from_slice(&lines[start + window..]);
            let trailing_newline = source.ends_with('\n');
            *source = rebuilt.join("\n");
            if trailing_newline {
                source.push('\n');
            }
            return true;
        }
    }
    false
}
