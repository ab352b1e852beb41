//! Per-agent-kind operation tables: a base risk/confidence classification
//! per named operation, plus the elevation rules carried over from the
//! reference report generator.

use platform_core::Risk;

/// Bulk-write row/change threshold above which risk is elevated to high,
/// carried over verbatim from the reference report generator rather than
/// invented for this codebase.
pub const BULK_WRITE_THRESHOLD: usize = 100;

/// Cell-count threshold above which a single range-shaped operation (e.g.
/// `clear_range`) is elevated to high risk regardless of its base table
/// entry.
pub const LARGE_RANGE_CELL_THRESHOLD: usize = 1000;

/// One operation's classification before or after elevation rules run.
#[derive(Debug, Clone, Copy)]
pub struct OperationProfile {
    pub risk: Risk,
    pub confidence: f64,
}

impl OperationProfile {
    const fn new(risk: Risk, confidence: f64) -> Self {
        Self { risk, confidence }
    }
}

/// Base classification for sheets-agent operations.
pub fn sheets_profile(op: &str) -> OperationProfile {
    match op {
        "update_cell" => OperationProfile::new(Risk::Low, 0.95),
        "append_row" => OperationProfile::new(Risk::Medium, 0.9),
        "format_range" => OperationProfile::new(Risk::Low, 0.92),
        "clear_range" => OperationProfile::new(Risk::Medium, 0.85),
        _ => OperationProfile::new(Risk::Medium, 0.8),
    }
}

/// Base classification for auth-agent operations, applying the
/// `revoke_token` + `service_account` elevation rule.
pub fn auth_profile(op: &str, auth_type: &str) -> OperationProfile {
    let base = match op {
        "grant_role" => OperationProfile::new(Risk::Medium, 0.9),
        "revoke_token" => OperationProfile::new(Risk::Medium, 0.88),
        "rotate_credential" => OperationProfile::new(Risk::Low, 0.93),
        _ => OperationProfile::new(Risk::Medium, 0.8),
    };
    if op == "revoke_token" && auth_type == "service_account" {
        OperationProfile::new(Risk::High, base.confidence)
    } else {
        base
    }
}

/// Base classification for backend-agent operations, applying the
/// bulk-write-over-threshold elevation rule.
pub fn backend_profile(op: &str, change_count: usize) -> OperationProfile {
    let base = match op {
        "write_row" => OperationProfile::new(Risk::Low, 0.92),
        "delete_row" => OperationProfile::new(Risk::Medium, 0.85),
        "bulk_update" => OperationProfile::new(Risk::Medium, 0.85),
        _ => OperationProfile::new(Risk::Medium, 0.8),
    };
    if change_count > BULK_WRITE_THRESHOLD {
        OperationProfile::new(Risk::High, base.confidence)
    } else {
        base
    }
}

/// Metrics queries are read-only: low risk, high confidence regardless of
/// the requested metric.
pub fn metrics_profile(_metric: &str) -> OperationProfile {
    OperationProfile::new(Risk::Low, 0.97)
}

/// UI render requests carry no state mutation.
pub fn ui_profile(_component: &str) -> OperationProfile {
    OperationProfile::new(Risk::Low, 0.9)
}

/// Parses an `A1`-style range (`"A1:Z100"`) into its cell count. Returns
/// `None` for anything that doesn't parse as `<col><row>:<col><row>`.
pub fn range_cell_count(range: &str) -> Option<usize> {
    let (start, end) = range.split_once(':')?;
    let (start_col, start_row) = split_cell(start)?;
    let (end_col, end_row) = split_cell(end)?;
    let cols = end_col.abs_diff(start_col) + 1;
    let rows = end_row.abs_diff(start_row) + 1;
    Some(cols * rows)
}

fn split_cell(cell: &str) -> Option<(usize, usize)> {
    let letters_end = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(letters_end);
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    let col = letters.chars().try_fold(0usize, |acc, c| {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        Some(acc * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1))
    })?;
    let row: usize = digits.parse().ok()?;
    Some((col, row))
}

/// Elevates a range-shaped operation's profile to high risk when its cell
/// count exceeds [`LARGE_RANGE_CELL_THRESHOLD`].
pub fn elevate_for_range(profile: OperationProfile, range: &str) -> OperationProfile {
    match range_cell_count(range) {
        Some(count) if count > LARGE_RANGE_CELL_THRESHOLD => {
            OperationProfile::new(Risk::High, profile.confidence)
        }
        _ => profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_range_cell_count() {
        assert_eq!(range_cell_count("A1:Z100"), Some(2600));
    }

    #[test]
    fn single_cell_range() {
        assert_eq!(range_cell_count("B5:B5"), Some(1));
    }

    #[test]
    fn unparseable_range_is_none() {
        assert_eq!(range_cell_count("not-a-range"), None);
    }

    #[test]
    fn revoke_token_on_service_account_is_elevated() {
        let profile = auth_profile("revoke_token", "service_account");
        assert_eq!(profile.risk, Risk::High);
    }

    #[test]
    fn revoke_token_on_user_is_not_elevated() {
        let profile = auth_profile("revoke_token", "user");
        assert_ne!(profile.risk, Risk::High);
    }

    #[test]
    fn bulk_write_over_threshold_is_elevated() {
        let profile = backend_profile("write_row", 101);
        assert_eq!(profile.risk, Risk::High);
    }

    #[test]
    fn bulk_write_at_threshold_is_not_elevated() {
        let profile = backend_profile("write_row", 100);
        assert_ne!(profile.risk, Risk::High);
    }

    #[test]
    fn clear_range_over_threshold_is_elevated() {
        let base = sheets_profile("clear_range");
        let elevated = elevate_for_range(base, "A1:Z100");
        assert_eq!(elevated.risk, Risk::High);
    }

    #[test]
    fn small_range_is_not_elevated() {
        let base = sheets_profile("clear_range");
        let elevated = elevate_for_range(base, "A1:B2");
        assert_eq!(elevated.risk, base.risk);
    }
}
