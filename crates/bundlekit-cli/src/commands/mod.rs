pub mod check;
pub mod exec;
pub mod generate;
pub mod setup;
pub mod show;

use bundlekit_core::{Bundle, CoreError};
use std::fmt;
use std::path::Path;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_ARTIFACT_ERROR: u8 = 3;
pub const EXIT_BUNDLE_VIOLATION: u8 = 4;

/// A command error with the exit code it maps to.
#[derive(Debug)]
pub struct Failure {
    pub code: u8,
    pub message: String,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: EXIT_FAILURE,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<CoreError> for Failure {
    fn from(e: CoreError) -> Self {
        let code = if e.is_manifest_problem() {
            EXIT_MANIFEST_ERROR
        } else if e.is_artifact_problem() {
            EXIT_ARTIFACT_ERROR
        } else if e.is_bundle_violation() {
            EXIT_BUNDLE_VIOLATION
        } else {
            EXIT_FAILURE
        };
        Self {
            code,
            message: e.to_string(),
        }
    }
}

pub fn open_bundle(project: &Path) -> Result<Bundle, Failure> {
    Ok(Bundle::open(project)?)
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, Failure> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Failure::new(format!("JSON serialization failed: {e}")))
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "fresh" | "active" => Style::new().green().apply_to(status).to_string(),
        "regenerated" | "written" => Style::new().cyan().apply_to(status).to_string(),
        "stale" => Style::new().yellow().bold().apply_to(status).to_string(),
        "unchanged" | "already active" => Style::new().dim().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn json_pretty_serializes_string() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_status_keeps_text() {
        for status in ["fresh", "stale", "regenerated", "unchanged", "already active"] {
            assert!(colorize_status(status).contains(status));
        }
        assert_eq!(colorize_status("unknown"), "unknown");
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_MANIFEST_ERROR,
            EXIT_ARTIFACT_ERROR,
            EXIT_BUNDLE_VIOLATION,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn core_errors_map_to_exit_codes() {
        let relock = CoreError::DeclarationLockMismatch {
            declaration: "Gemfile".to_owned(),
        };
        assert_eq!(Failure::from(relock).code, EXIT_MANIFEST_ERROR);

        let stale = CoreError::ArtifactOutOfSync {
            path: PathBuf::from(".bundle/environment.toml"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(Failure::from(stale).code, EXIT_ARTIFACT_ERROR);

        let violation = CoreError::Resolve(bundlekit_runtime::ResolveError::BundleViolation {
            name: "thin".to_owned(),
            declaration: "Gemfile".to_owned(),
        });
        let failure = Failure::from(violation);
        assert_eq!(failure.code, EXIT_BUNDLE_VIOLATION);
        assert!(failure.message.contains("is not part of the bundle"));

        assert_eq!(Failure::from(CoreError::NotSetUp).code, EXIT_FAILURE);
    }
}
