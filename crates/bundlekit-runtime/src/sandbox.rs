//! The resolver strategy installed for this process.
//!
//! One value, swapped as a whole. Installing a restricted strategy while one
//! is already active is a no-op, so activation can be attempted any number of
//! times. Install before worker threads start resolving packages; afterwards
//! the installed strategy is only read.

use crate::strategy::ResolverStrategy;
use crate::ResolveError;
use bundlekit_schema::ArtifactEnvironment;
use std::env;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Install root exported by an active sandbox.
pub const INSTALL_ROOT_VAR: &str = "BUNDLEKIT_HOME";
/// Search path list exported by an active sandbox, platform separator joined.
pub const SEARCH_PATH_VAR: &str = "BUNDLEKIT_PATH";

static INSTALLED: RwLock<Option<Arc<ResolverStrategy>>> = RwLock::new(None);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Installed,
    AlreadyActive,
}

/// Swap in `strategy` unless a restricted one is already active.
///
/// Installing a restricted strategy also exports [`INSTALL_ROOT_VAR`] and
/// [`SEARCH_PATH_VAR`], which child processes inherit.
pub fn install(strategy: ResolverStrategy) -> Result<Activation, ResolveError> {
    let mut slot = INSTALLED.write().unwrap_or_else(PoisonError::into_inner);
    if slot.as_deref().is_some_and(ResolverStrategy::is_restricted) {
        debug!("sandbox already active, skipping install");
        return Ok(Activation::AlreadyActive);
    }
    if let Some(sandbox) = strategy.sandbox() {
        export_environment(sandbox.environment())?;
        info!(
            "sandbox active with {} package(s)",
            sandbox.names().len()
        );
    }
    *slot = Some(Arc::new(strategy));
    Ok(Activation::Installed)
}

/// The installed strategy, if any.
pub fn current() -> Option<Arc<ResolverStrategy>> {
    INSTALLED
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

pub fn is_active() -> bool {
    INSTALLED
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_deref()
        .is_some_and(ResolverStrategy::is_restricted)
}

/// Drop the installed strategy and the exported variables.
///
/// Only meant for test isolation; a process normally keeps its sandbox
/// until it exits.
pub fn teardown() {
    let mut slot = INSTALLED.write().unwrap_or_else(PoisonError::into_inner);
    if slot.take().is_some() {
        debug!("sandbox torn down");
    }
    env::remove_var(INSTALL_ROOT_VAR);
    env::remove_var(SEARCH_PATH_VAR);
}

fn export_environment(environment: &ArtifactEnvironment) -> Result<(), ResolveError> {
    let search_path = env::join_paths(&environment.search_path)?;
    env::set_var(INSTALL_ROOT_VAR, &environment.install_root);
    env::set_var(SEARCH_PATH_VAR, search_path);
    Ok(())
}
