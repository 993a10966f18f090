// =============================================================================
// TriggerCard file validator
// =============================================================================
//
// A process killed mid-write leaves a truncated final line in the JSONL
// file. That is expected and not an error: only a decode failure on any
// line *other* than the last is treated as real corruption.
// =============================================================================

use std::path::Path;

use crate::trigger_card::{TriggerCard, SCHEMA_VERSION};

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid_count: usize,
    pub has_truncated_line: bool,
    pub truncated_line_content: Option<String>,
    pub errors: Vec<String>,
    pub success: bool,
}

pub fn validate_triggercard_file(path: &Path) -> ValidationResult {
    let mut result = ValidationResult::default();

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            result.errors.push(format!("failed to read file: {err}"));
            return result;
        }
    };

    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    let last_index = lines.len().saturating_sub(1);

    for (idx, line) in lines.iter().enumerate() {
        match serde_json::from_str::<TriggerCard>(line) {
            Ok(card) => {
                if card.schema_version != SCHEMA_VERSION {
                    result
                        .errors
                        .push(format!("line {idx}: unexpected schema_version {}", card.schema_version));
                    continue;
                }
                result.valid_count += 1;
            }
            Err(err) => {
                if idx == last_index {
                    result.has_truncated_line = true;
                    result.truncated_line_content = Some(line.to_string());
                } else {
                    result
                        .errors
                        .push(format!("line {idx}: invalid json: {err}"));
                }
            }
        }
    }

    result.success = result.errors.is_empty();
    result
}
