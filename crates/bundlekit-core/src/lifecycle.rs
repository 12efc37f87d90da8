use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Where a bundle is on its way to an active sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupState {
    Uninitialized,
    Fresh,
    Stale,
    Regenerated,
    Active,
    Failed,
}

impl fmt::Display for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SetupState::Uninitialized => "uninitialized",
            SetupState::Fresh => "fresh",
            SetupState::Stale => "stale",
            SetupState::Regenerated => "regenerated",
            SetupState::Active => "active",
            SetupState::Failed => "failed",
        };
        f.write_str(s)
    }
}

pub fn validate_transition(from: SetupState, to: SetupState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (
            SetupState::Uninitialized,
            SetupState::Fresh | SetupState::Stale | SetupState::Failed
        ) | (
            SetupState::Fresh,
            SetupState::Active | SetupState::Regenerated | SetupState::Failed
        ) | (
            SetupState::Stale,
            SetupState::Regenerated | SetupState::Failed
        ) | (
            SetupState::Regenerated,
            SetupState::Active | SetupState::Failed
        ) | (
            SetupState::Active | SetupState::Failed,
            SetupState::Uninitialized
        )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
