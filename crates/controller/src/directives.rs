//! Atomic, signed directive construction and filesystem placement, shared
//! by [`crate::retry_manager`] and [`crate::candidate`].

use chrono::Utc;
use platform_core::{Directive, DirectiveCommand, PlatformResult};
use platform_security::StateStore;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Builds a signed directive and writes it atomically to
/// `{dir}/<ts>_<filename_suffix>.json`, returning the path written.
pub fn emit_directive(
    dir: &Path,
    target_agent: impl Into<String>,
    command: DirectiveCommand,
    issued_by: impl Into<String>,
    filename_suffix: &str,
) -> PlatformResult<(Directive, PathBuf)> {
    let directive = Directive::new(Uuid::new_v4().to_string(), target_agent, command, issued_by)?;
    let filename = format!("{}_{filename_suffix}.json", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
    let path = dir.join(filename);
    StateStore::save(&path, &directive)?;
    Ok((directive, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn emits_a_signed_directive_file() {
        let dir = tempdir().unwrap();
        let (directive, path) = emit_directive(
            dir.path(),
            "sheets-agent",
            DirectiveCommand::RetryTask { original_task_id: "t-1".into(), retry_count: 1, max_retries: 3 },
            "controller-1",
            "retry_directive",
        )
        .unwrap();
        assert!(path.exists());
        assert!(directive.verify_signature().unwrap());
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("_retry_directive.json"));
    }
}
