use crate::document::{trim_change_history, Row, StateDocument};
use crate::models::StateChangeItem;
use chrono::Utc;
use serde_json::Value;

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

fn section_rows_mut<'a>(doc: &'a mut StateDocument, section: &str) -> Option<&'a mut Vec<Row>> {
    match section {
        "team_status" => Some(&mut doc.teams),
        "agent_status" => Some(&mut doc.agents),
        "active_locks" => Some(&mut doc.active_locks),
        "pending_directives" => Some(&mut doc.pending_directives),
        "candidate_changes" => Some(&mut doc.candidate_changes),
        _ => None,
    }
}

fn coerce_metric(value: &str) -> Value {
    if let Ok(i) = value.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(value.to_string())
}

/// Applies `changes` to `doc` in place: for table sections, updates the
/// named cell of the row matched by its key column, inserting a new row if
/// absent; for `system_metrics`, coerces the new value to a number when
/// possible and updates the map. One change-history entry is appended per
/// applied change, trimmed to the last 10.
pub fn apply_state_changes(doc: &mut StateDocument, changes: &[StateChangeItem]) {
    let now = Utc::now().to_rfc3339();

    for change in changes {
        if change.section == "system_metrics" {
            doc.system_metrics
                .insert(change.column.clone(), coerce_metric(&change.new_value));
            append_history(doc, &now, change);
            continue;
        }

        let Some(key_col) = section_key(&change.section) else {
            continue;
        };
        let Some(rows) = section_rows_mut(doc, &change.section) else {
            continue;
        };

        match rows.iter_mut().find(|r| r.get(key_col).map(String::as_str) == Some(change.field.as_str())) {
            Some(row) => {
                row.insert(change.column.clone(), change.new_value.clone());
            }
            None => {
                let mut new_row = Row::new();
                new_row.insert(key_col.to_string(), change.field.clone());
                new_row.insert(change.column.clone(), change.new_value.clone());
                rows.push(new_row);
            }
        }

        append_history(doc, &now, change);
    }

    doc.last_updated = now.clone();
    doc.frontmatter
        .insert("last_updated".to_string(), now[..10.min(now.len())].to_string());
}

fn append_history(doc: &mut StateDocument, timestamp: &str, change: &StateChangeItem) {
    let mut entry = Row::new();
    entry.insert("Timestamp".to_string(), timestamp.to_string());
    entry.insert("Changed By".to_string(), change.triggered_by.clone());
    entry.insert(
        "Field".to_string(),
        format!("{}.{}.{}", change.section, change.field, change.column),
    );
    entry.insert("Old Value".to_string(), change.old_value.clone());
    entry.insert("New Value".to_string(), change.new_value.clone());
    doc.change_history.push(entry);
    trim_change_history(&mut doc.change_history);
}
