use crate::document::{Row, StateDocument};
use crate::models::{StateChangeItem, ValidationResult};

const VALID_SECTIONS: &[&str] = &[
    "team_status",
    "agent_status",
    "active_locks",
    "pending_directives",
    "candidate_changes",
    "system_metrics",
];

fn section_key(section: &str) -> Option<&'static str> {
    match section {
        "team_status" => Some("Team"),
        "agent_status" => Some("Agent"),
        "active_locks" => Some("Sheet ID"),
        "pending_directives" => Some("Directive ID"),
        "candidate_changes" => Some("Change ID"),
        _ => None,
    }
}

fn section_rows<'a>(doc: &'a StateDocument, section: &str) -> Option<&'a Vec<Row>> {
    match section {
        "team_status" => Some(&doc.teams),
        "agent_status" => Some(&doc.agents),
        "active_locks" => Some(&doc.active_locks),
        "pending_directives" => Some(&doc.pending_directives),
        "candidate_changes" => Some(&doc.candidate_changes),
        _ => None,
    }
}

/// Checks proposed changes against the current document before they are
/// applied. Structural problems (unknown section, empty column, an attempt
/// to touch `change_history`) are errors; value-mismatch and no-op
/// conditions are warnings only — they never block the update.
pub struct StateValidator;

impl StateValidator {
    pub fn validate_change(current: &StateDocument, changes: &[StateChangeItem]) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if changes.is_empty() {
            errors.push("No changes provided".to_string());
            return ValidationResult { valid: false, errors, warnings };
        }

        for (i, change) in changes.iter().enumerate() {
            let prefix = format!("change[{i}]");

            if change.section == "change_history" {
                errors.push(format!(
                    "{prefix}: cannot modify change_history directly (append-only, managed internally)"
                ));
                continue;
            }

            if !VALID_SECTIONS.contains(&change.section.as_str()) {
                errors.push(format!("{prefix}: invalid section '{}'", change.section));
                continue;
            }

            if change.column.is_empty() {
                errors.push(format!("{prefix}: column is empty"));
                continue;
            }

            if change.new_value == change.old_value {
                warnings.push(format!("{prefix}: new_value == old_value (no-op)"));
            }

            if change.section == "system_metrics" {
                Self::validate_metrics(current, change, &prefix, &mut warnings);
            } else {
                Self::validate_table_row(current, change, &prefix, &mut warnings);
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_metrics(
        state: &StateDocument,
        change: &StateChangeItem,
        prefix: &str,
        warnings: &mut Vec<String>,
    ) {
        if change.old_value == "—" || change.old_value.is_empty() {
            return;
        }
        if state.system_metrics.is_empty() {
            return;
        }
        if let Some(current_val) = state.system_metrics.get(&change.column) {
            let current_str = current_val.to_string();
            let current_str = current_str.trim_matches('"');
            if current_str != change.old_value {
                warnings.push(format!(
                    "{prefix}: system_metrics.{} current='{current_str}' != old_value='{}'",
                    change.column, change.old_value
                ));
            }
        }
    }

    fn validate_table_row(
        state: &StateDocument,
        change: &StateChangeItem,
        prefix: &str,
        warnings: &mut Vec<String>,
    ) {
        let Some(rows) = section_rows(state, &change.section) else {
            return;
        };
        let Some(key_col) = section_key(&change.section) else {
            return;
        };
        if change.field.is_empty() {
            return;
        }
        let Some(target_row) = rows.iter().find(|r| r.get(key_col).map(String::as_str) == Some(change.field.as_str())) else {
            return;
        };
        let current_val = target_row.get(&change.column).map(String::as_str).unwrap_or("—");
        if change.old_value != "—" && !change.old_value.is_empty() && current_val != change.old_value {
            warnings.push(format!(
                "{prefix}: {}.{}.{} current='{current_val}' != old_value='{}'",
                change.section, change.field, change.column, change.old_value
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(section: &str, field: &str, column: &str, old: &str, new: &str) -> StateChangeItem {
        StateChangeItem {
            section: section.to_string(),
            field: field.to_string(),
            column: column.to_string(),
            old_value: old.to_string(),
            new_value: new.to_string(),
            reason: "test".to_string(),
            triggered_by: "req-1".to_string(),
        }
    }

    #[test]
    fn rejects_change_history_edits() {
        let doc = StateDocument::initial();
        let result = StateValidator::validate_change(&doc, &[change("change_history", "x", "y", "a", "b")]);
        assert!(!result.valid);
    }

    #[test]
    fn rejects_empty_changes() {
        let doc = StateDocument::initial();
        let result = StateValidator::validate_change(&doc, &[]);
        assert!(!result.valid);
    }

    #[test]
    fn no_op_changes_are_warnings_not_errors() {
        let doc = StateDocument::initial();
        let result = StateValidator::validate_change(&doc, &[change("agent_status", "a", "Status", "idle", "idle")]);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn old_value_mismatch_is_a_warning_not_an_error() {
        let mut doc = StateDocument::initial();
        let mut row = Row::new();
        row.insert("Agent".to_string(), "a".to_string());
        row.insert("Status".to_string(), "busy".to_string());
        doc.agents.push(row);

        let result = StateValidator::validate_change(&doc, &[change("agent_status", "a", "Status", "idle", "done")]);
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
